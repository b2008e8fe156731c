use std::fs::{self, File};
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tempfile::Builder;

use crate::domain::{Artifact, CacheKey};
use crate::error::CityscanError;
use crate::fs_util;

/// Completeness of one cache entry directory.
///
/// Presence is all the cache trusts; `Unverified` marks entries whose files
/// exist but at least one is empty, which is what an interrupted transfer
/// from an older writer looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheEntryStatus {
    Missing,
    Partial,
    Complete,
    Unverified,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntrySummary {
    pub city: String,
    pub group: String,
    pub analysis: String,
    pub status: CacheEntryStatus,
    pub path: String,
}

/// On-disk layout `<root>/<city>/<week_start>/<analysis>/{image.tif,stats.json}`.
#[derive(Debug, Clone)]
pub struct CacheLayout {
    root: Utf8PathBuf,
}

impl CacheLayout {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn entry_dir(&self, key: &CacheKey) -> Utf8PathBuf {
        self.root
            .join(&key.city)
            .join(key.week_dir_name())
            .join(key.analysis.as_str())
    }

    pub fn artifact_path(&self, key: &CacheKey, artifact: Artifact) -> Utf8PathBuf {
        self.entry_dir(key).join(artifact.file_name())
    }

    pub fn ensure_root(&self) -> Result<(), CityscanError> {
        self.ensure_dir(&self.root)
    }

    pub fn ensure_dir(&self, path: &Utf8Path) -> Result<(), CityscanError> {
        fs::create_dir_all(path.as_std_path())
            .map_err(|err| CityscanError::Filesystem(format!("create {path}: {err}")))
    }

    pub fn exists(&self, path: &Utf8Path) -> bool {
        path.as_std_path().exists()
    }

    pub fn entry_status(&self, key: &CacheKey) -> CacheEntryStatus {
        status_of_dir(&self.entry_dir(key))
    }

    /// City directories directly under the root. A missing root has no cities.
    pub fn city_dirs(&self) -> Result<Vec<Utf8PathBuf>, CityscanError> {
        if !self.root.as_std_path().is_dir() {
            return Ok(Vec::new());
        }
        utf8_subdirectories(&self.root)
    }

    pub fn scan_entries(&self) -> Result<Vec<EntrySummary>, CityscanError> {
        let mut entries = Vec::new();
        for city_dir in self.city_dirs()? {
            for group_dir in utf8_subdirectories(&city_dir)? {
                for analysis_dir in utf8_subdirectories(&group_dir)? {
                    entries.push(EntrySummary {
                        city: dir_name(&city_dir),
                        group: dir_name(&group_dir),
                        analysis: dir_name(&analysis_dir),
                        status: status_of_dir(&analysis_dir),
                        path: analysis_dir.to_string(),
                    });
                }
            }
        }
        Ok(entries)
    }
}

fn status_of_dir(dir: &Utf8Path) -> CacheEntryStatus {
    let sizes = Artifact::ALL
        .iter()
        .filter_map(|artifact| fs_util::file_len(dir.join(artifact.file_name()).as_std_path()))
        .collect::<Vec<_>>();

    match sizes.len() {
        0 => CacheEntryStatus::Missing,
        n if n < Artifact::ALL.len() => CacheEntryStatus::Partial,
        _ if sizes.contains(&0) => CacheEntryStatus::Unverified,
        _ => CacheEntryStatus::Complete,
    }
}

/// Writes `destination` through a temp file in the same directory, persisting
/// it only once `write` succeeds. A failed write leaves nothing behind.
pub fn write_atomic<F>(destination: &Path, write: F) -> Result<u64, CityscanError>
where
    F: FnOnce(&mut File) -> Result<u64, CityscanError>,
{
    let parent = destination
        .parent()
        .ok_or_else(|| CityscanError::Filesystem("invalid destination path".to_string()))?;
    fs::create_dir_all(parent).map_err(|err| CityscanError::Filesystem(err.to_string()))?;

    let mut temp = Builder::new()
        .prefix(".cityscan-")
        .suffix(".part")
        .tempfile_in(parent)
        .map_err(|err| CityscanError::Filesystem(err.to_string()))?;
    let written = write(temp.as_file_mut())?;
    temp.as_file()
        .sync_all()
        .map_err(|err| CityscanError::Filesystem(err.to_string()))?;
    temp.persist(destination)
        .map_err(|err| CityscanError::Filesystem(err.to_string()))?;
    Ok(written)
}

fn utf8_subdirectories(root: &Utf8Path) -> Result<Vec<Utf8PathBuf>, CityscanError> {
    fs_util::subdirectories(root.as_std_path())?
        .into_iter()
        .map(|path| {
            Utf8PathBuf::from_path_buf(path)
                .map_err(|path| CityscanError::Filesystem(format!("non-utf8 path {}", path.display())))
        })
        .collect()
}

fn dir_name(path: &Utf8Path) -> String {
    path.file_name().unwrap_or_default().to_string()
}
