use std::io::{self, Read, Write};
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;

use crate::domain::RemoteAsset;
use crate::error::CityscanError;
use crate::store;

pub const FETCH_CHUNK_SIZE: usize = 8 * 1024;

const LIST_URL: &str = "https://www.googleapis.com/drive/v3/files";
const DOWNLOAD_URL: &str = "https://drive.google.com/uc";
const PAGE_SIZE: &str = "1000";

pub trait AssetLister: Send + Sync {
    /// Every asset in `folder_id`. An empty folder is not an error.
    fn list_assets(&self, folder_id: &str) -> Result<Vec<RemoteAsset>, CityscanError>;
}

pub trait AssetFetcher: Send + Sync {
    /// Downloads one asset to `destination`, returning the number of bytes written.
    fn fetch(&self, asset_id: &str, destination: &Path) -> Result<u64, CityscanError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileListPage {
    #[serde(default)]
    pub files: Vec<RemoteAsset>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

impl FileListPage {
    pub fn parse(body: &str) -> Result<Self, CityscanError> {
        serde_json::from_str(body).map_err(|err| CityscanError::RemoteList(err.to_string()))
    }
}

/// Google Drive folder listing and download over HTTPS.
#[derive(Clone)]
pub struct DriveHttpClient {
    client: Client,
    list_url: String,
    download_url: String,
    api_key: Option<String>,
}

impl DriveHttpClient {
    pub fn new(api_key: Option<String>) -> Result<Self, CityscanError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("cityscan/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| CityscanError::RemoteList(err.to_string()))?,
        );
        // Downloads may be large; only the connect phase is bounded.
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(30))
            .timeout(None)
            .build()
            .map_err(|err| CityscanError::RemoteList(err.to_string()))?;

        Ok(Self {
            client,
            list_url: LIST_URL.to_string(),
            download_url: DOWNLOAD_URL.to_string(),
            api_key,
        })
    }

    fn list_page(&self, folder_id: &str, page_token: Option<&str>) -> Result<FileListPage, CityscanError> {
        let query = format!("'{folder_id}' in parents");
        let mut request = self.client.get(&self.list_url).query(&[
            ("q", query.as_str()),
            ("fields", "nextPageToken, files(id, name)"),
            ("pageSize", PAGE_SIZE),
        ]);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }
        if let Some(key) = &self.api_key {
            request = request.query(&[("key", key.as_str())]);
        }

        let response = request
            .send()
            .map_err(|err| CityscanError::RemoteList(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "remote listing failed".to_string());
            return Err(CityscanError::RemoteListStatus { status, message });
        }
        let body = response
            .text()
            .map_err(|err| CityscanError::RemoteList(err.to_string()))?;
        FileListPage::parse(&body)
    }
}

impl AssetLister for DriveHttpClient {
    fn list_assets(&self, folder_id: &str) -> Result<Vec<RemoteAsset>, CityscanError> {
        let mut assets = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = self.list_page(folder_id, page_token.as_deref())?;
            assets.extend(page.files);
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        tracing::debug!(folder_id, count = assets.len(), "listed remote assets");
        Ok(assets)
    }
}

impl AssetFetcher for DriveHttpClient {
    fn fetch(&self, asset_id: &str, destination: &Path) -> Result<u64, CityscanError> {
        let mut response = self
            .client
            .get(&self.download_url)
            .query(&[("id", asset_id), ("export", "download")])
            .send()
            .map_err(|err| CityscanError::Fetch(err.to_string()))?;
        if !response.status().is_success() {
            return Err(CityscanError::FetchStatus {
                status: response.status().as_u16(),
            });
        }

        store::write_atomic(destination, |file| {
            stream_chunks(&mut response, file).map_err(|err| CityscanError::Fetch(err.to_string()))
        })
    }
}

/// Copies `reader` into `writer` in `FETCH_CHUNK_SIZE` pieces, so memory stays
/// bounded whatever the payload size.
pub fn stream_chunks<R: Read, W: Write>(reader: &mut R, writer: &mut W) -> io::Result<u64> {
    let mut buffer = vec![0u8; FETCH_CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        writer.write_all(&buffer[..read])?;
        total += read as u64;
    }
    writer.flush()?;
    Ok(total)
}
