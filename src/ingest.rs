use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ArtifactMapping;
use crate::domain::{AnalysisType, Artifact, CacheKey, ParsedKey, RemoteAsset};
use crate::drive::{AssetFetcher, AssetLister};
use crate::error::CityscanError;
use crate::store::{CacheEntryStatus, CacheLayout};

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub folder_id: String,
    pub mapping: ArtifactMapping,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum IngestAction {
    Downloaded,
    Cached,
    Planned,
    Duplicate,
    Failed,
    Malformed,
    Mismatch,
    Unmapped,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestItem {
    pub asset_id: String,
    pub asset_name: String,
    pub action: IngestAction,
    pub artifact: Option<Artifact>,
    pub cache_path: Option<String>,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub analysis: AnalysisType,
    pub listed: usize,
    pub items: Vec<IngestItem>,
    pub error: Option<String>,
}

impl IngestReport {
    fn new(analysis: AnalysisType) -> Self {
        Self {
            analysis,
            listed: 0,
            items: Vec::new(),
            error: None,
        }
    }

    pub fn count(&self, action: IngestAction) -> usize {
        self.items.iter().filter(|item| item.action == action).count()
    }
}

/// Pulls remote assets for one analysis type into the cache, skipping
/// anything already on disk.
pub struct Ingestor<L: AssetLister, F: AssetFetcher> {
    layout: CacheLayout,
    lister: L,
    fetcher: F,
    options: IngestOptions,
}

impl<L: AssetLister, F: AssetFetcher> Ingestor<L, F> {
    pub fn new(layout: CacheLayout, lister: L, fetcher: F, options: IngestOptions) -> Self {
        Self {
            layout,
            lister,
            fetcher,
            options,
        }
    }

    /// Runs each analysis type in turn. A listing failure stops that type only.
    pub fn run_all(&self, analyses: &[AnalysisType]) -> Vec<IngestReport> {
        analyses
            .iter()
            .map(|&analysis| {
                self.run(analysis).unwrap_or_else(|err| {
                    warn!(%analysis, error = %err, "listing failed, skipping analysis type");
                    let mut report = IngestReport::new(analysis);
                    report.error = Some(err.to_string());
                    report
                })
            })
            .collect()
    }

    pub fn run(&self, analysis: AnalysisType) -> Result<IngestReport, CityscanError> {
        let assets = self.lister.list_assets(&self.options.folder_id)?;
        let mut report = IngestReport::new(analysis);
        report.listed = assets.len();

        if !self.options.dry_run {
            self.layout.ensure_root()?;
        }

        let mut claimed = HashSet::<(CacheKey, Artifact)>::new();
        for asset in &assets {
            if !asset.name.contains(analysis.as_str()) {
                debug!(name = %asset.name, %analysis, "asset does not match analysis type");
                continue;
            }
            info!(name = %asset.name, "processing asset");
            self.ingest_asset(asset, analysis, &mut claimed, &mut report);
        }

        info!(
            %analysis,
            downloaded = report.count(IngestAction::Downloaded),
            cached = report.count(IngestAction::Cached),
            failed = report.count(IngestAction::Failed),
            "ingestion finished"
        );
        Ok(report)
    }

    fn ingest_asset(
        &self,
        asset: &RemoteAsset,
        analysis: AnalysisType,
        claimed: &mut HashSet<(CacheKey, Artifact)>,
        report: &mut IngestReport,
    ) {
        let parsed = match asset.name.parse::<ParsedKey>() {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(name = %asset.name, error = %err, "skipping asset");
                report.items.push(item(asset, IngestAction::Malformed, None, None, Some(err.to_string())));
                return;
            }
        };

        if parsed.analysis != analysis {
            debug!(name = %asset.name, parsed = %parsed.analysis, %analysis, "analysis mismatch");
            report.items.push(item(
                asset,
                IngestAction::Mismatch,
                None,
                None,
                Some(format!("asset is {}", parsed.analysis)),
            ));
            return;
        }

        let key = CacheKey::from(&parsed);
        let artifacts = self.options.mapping.artifacts_for(&asset.name);
        if artifacts.is_empty() {
            info!(name = %asset.name, "extension maps to no cache artifact, skipping");
            report.items.push(item(
                asset,
                IngestAction::Unmapped,
                None,
                None,
                Some("extension maps to no cache artifact".to_string()),
            ));
            return;
        }

        for &artifact in artifacts {
            let path = self.layout.artifact_path(&key, artifact);
            let cache_path = Some(path.to_string());

            if claimed.contains(&(key.clone(), artifact)) {
                info!(%path, "already supplied by an earlier asset in this run, skipping");
                report.items.push(item(asset, IngestAction::Duplicate, Some(artifact), cache_path, None));
                continue;
            }

            if self.layout.exists(&path) {
                info!(%path, "file already exists, skipping download");
                claimed.insert((key.clone(), artifact));
                report.items.push(item(asset, IngestAction::Cached, Some(artifact), cache_path, None));
                continue;
            }

            if self.options.dry_run {
                claimed.insert((key.clone(), artifact));
                report.items.push(item(asset, IngestAction::Planned, Some(artifact), cache_path, None));
                continue;
            }

            let outcome = self
                .layout
                .ensure_dir(&self.layout.entry_dir(&key))
                .and_then(|()| self.fetcher.fetch(&asset.id, path.as_std_path()));
            match outcome {
                Ok(bytes) => {
                    info!(%path, bytes, "downloaded");
                    claimed.insert((key.clone(), artifact));
                    report.items.push(item(asset, IngestAction::Downloaded, Some(artifact), cache_path, None));
                }
                Err(err) => {
                    warn!(%path, asset_id = %asset.id, error = %err, "download failed");
                    report.items.push(item(
                        asset,
                        IngestAction::Failed,
                        Some(artifact),
                        cache_path,
                        Some(err.to_string()),
                    ));
                }
            }
        }

        if !self.options.dry_run && self.layout.entry_status(&key) == CacheEntryStatus::Unverified {
            warn!(entry = %key, "cache entry has an empty artifact; it will not be re-fetched");
        }
    }
}

fn item(
    asset: &RemoteAsset,
    action: IngestAction,
    artifact: Option<Artifact>,
    cache_path: Option<String>,
    detail: Option<String>,
) -> IngestItem {
    IngestItem {
        asset_id: asset.id.clone(),
        asset_name: asset.name.clone(),
        action,
        artifact,
        cache_path,
        detail,
    }
}
