use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::domain::{AnalysisType, Artifact};
use crate::error::CityscanError;

pub const TILES_MOUNT: &str = "/tiles";
pub const STATS_GEOJSON: &str = "stats.geojson";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Zone {
    pub name: &'static str,
    pub lat: f64,
    pub lng: f64,
}

pub const ZONES: [Zone; 4] = [
    Zone {
        name: "riyadh",
        lat: 24.7136,
        lng: 46.6753,
    },
    Zone {
        name: "jiddah",
        lat: 21.2854,
        lng: 39.2376,
    },
    Zone {
        name: "mecca",
        lat: 21.4225,
        lng: 39.8262,
    },
    Zone {
        name: "dammam",
        lat: 26.4207,
        lng: 49.9777,
    },
];

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedArtifact {
    pub city: String,
    pub date: String,
    pub analysis: AnalysisType,
    pub file_path: String,
    pub stats_path: Option<String>,
    #[serde(skip)]
    pub local_path: Utf8PathBuf,
}

/// Read-side view of the cache, answering the same lookups as the tile API.
#[derive(Debug, Clone)]
pub struct Catalog {
    tiles_root: Utf8PathBuf,
    zones: Vec<Zone>,
}

impl Catalog {
    pub fn new(tiles_root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            tiles_root: tiles_root.into(),
            zones: ZONES.to_vec(),
        }
    }

    pub fn tiles_root(&self) -> &Utf8Path {
        &self.tiles_root
    }

    pub fn zone(&self, city: &str) -> Option<&Zone> {
        let city = city.to_lowercase();
        self.zones.iter().find(|zone| zone.name == city)
    }

    /// `date` is the directory name as stored, not re-bucketed.
    pub fn resolve(
        &self,
        city: &str,
        date: &str,
        analysis: AnalysisType,
    ) -> Result<ResolvedArtifact, CityscanError> {
        let city = city.to_lowercase();
        if self.zone(&city).is_none() {
            return Err(CityscanError::UnknownCity(city));
        }
        if date.is_empty() || date.contains(['/', '\\']) || date.starts_with('.') {
            return Err(CityscanError::InvalidDate(date.to_string()));
        }

        let relative_dir = Utf8PathBuf::from(&city).join(date).join(analysis.as_str());
        let relative = relative_dir.join(Artifact::Image.file_name());
        let local_path = self.tiles_root.join(&relative);
        if !local_path.as_std_path().is_file() {
            return Err(CityscanError::ArtifactNotFound(relative.to_string()));
        }

        let stats_relative = relative_dir.join(STATS_GEOJSON);
        let stats_path = self
            .tiles_root
            .join(&stats_relative)
            .as_std_path()
            .is_file()
            .then(|| format!("{TILES_MOUNT}/{stats_relative}"));

        Ok(ResolvedArtifact {
            city,
            date: date.to_string(),
            analysis,
            file_path: format!("{TILES_MOUNT}/{relative}"),
            stats_path,
            local_path,
        })
    }
}
