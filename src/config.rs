use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use camino::Utf8PathBuf;
use clap::ValueEnum;
use regex::Regex;
use serde::Serialize;

use crate::domain::{AnalysisType, Artifact};
use crate::error::CityscanError;

pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_ZOOM: &str = "6-15";
const MAX_ZOOM: u8 = 30;

/// Runtime settings, read from the environment once and passed down explicitly.
#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: Utf8PathBuf,
    pub tiles_dir: Utf8PathBuf,
    pub folder_id: Option<String>,
    pub default_analysis: AnalysisType,
    pub zoom: ZoomRange,
    pub resampling: Resampling,
    pub artifact_mapping: ArtifactMapping,
    pub tile_grouping: TileGrouping,
    pub drive_api_key: Option<String>,
    tiles_dir_set: bool,
}

impl Settings {
    pub fn from_env() -> Result<Self, CityscanError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, CityscanError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let data_dir = Utf8PathBuf::from(get("DATAPATH").unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()));
        let tiles_base_dir = get("TILES_BASE_DIR");
        let tiles_dir_set = tiles_base_dir.is_some();
        let tiles_dir = tiles_base_dir
            .map(Utf8PathBuf::from)
            .unwrap_or_else(|| data_dir.clone());

        Ok(Self {
            data_dir,
            tiles_dir,
            folder_id: get("FOLDER_ID"),
            default_analysis: parse_setting("ANALYSIS", get("ANALYSIS"), AnalysisType::Um)?,
            zoom: parse_setting("TILES_LEVEL", get("TILES_LEVEL"), ZoomRange::default())?,
            resampling: parse_setting("TILES_RESAMPLING", get("TILES_RESAMPLING"), Resampling::Bilinear)?,
            artifact_mapping: parse_setting(
                "ARTIFACT_MAPPING",
                get("ARTIFACT_MAPPING"),
                ArtifactMapping::Shared,
            )?,
            tile_grouping: parse_setting(
                "TILE_GROUPING",
                get("TILE_GROUPING"),
                TileGrouping::CalendarDay,
            )?,
            drive_api_key: get("DRIVE_API_KEY"),
            tiles_dir_set,
        })
    }

    /// Points the cache at `dir`. The tiles root follows unless `TILES_BASE_DIR` was set.
    pub fn override_data_dir(&mut self, dir: Utf8PathBuf) {
        if !self.tiles_dir_set {
            self.tiles_dir = dir.clone();
        }
        self.data_dir = dir;
    }

    pub fn require_folder_id(&self) -> Result<&str, CityscanError> {
        self.folder_id
            .as_deref()
            .ok_or_else(|| CityscanError::MissingConfig("FOLDER_ID".to_string()))
    }
}

fn parse_setting<T: FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T, CityscanError> {
    match raw {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| CityscanError::InvalidConfig {
            key: key.to_string(),
            value,
        }),
    }
}

/// Inclusive zoom levels handed to the tiling tool, written `min-max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ZoomRange {
    pub min: u8,
    pub max: u8,
}

impl Default for ZoomRange {
    fn default() -> Self {
        Self { min: 6, max: 15 }
    }
}

impl fmt::Display for ZoomRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

impl FromStr for ZoomRange {
    type Err = CityscanError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        let pattern = PATTERN.get_or_init(|| {
            Regex::new(r"^(\d{1,2})(?:-(\d{1,2}))?$").expect("zoom range pattern is valid")
        });

        let invalid = || CityscanError::InvalidZoomRange(value.to_string());
        let captures = pattern.captures(value.trim()).ok_or_else(invalid)?;
        let min: u8 = captures[1].parse().map_err(|_| invalid())?;
        let max: u8 = match captures.get(2) {
            Some(m) => m.as_str().parse().map_err(|_| invalid())?,
            None => min,
        };
        if min > max || max > MAX_ZOOM {
            return Err(invalid());
        }
        Ok(Self { min, max })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Resampling {
    Near,
    Bilinear,
    Cubic,
    Cubicspline,
    Lanczos,
    Average,
    Mode,
}

impl Resampling {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resampling::Near => "near",
            Resampling::Bilinear => "bilinear",
            Resampling::Cubic => "cubic",
            Resampling::Cubicspline => "cubicspline",
            Resampling::Lanczos => "lanczos",
            Resampling::Average => "average",
            Resampling::Mode => "mode",
        }
    }
}

impl fmt::Display for Resampling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resampling {
    type Err = CityscanError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        <Resampling as ValueEnum>::from_str(value.trim(), true).map_err(|_| {
            CityscanError::InvalidConfig {
                key: "resampling".to_string(),
                value: value.to_string(),
            }
        })
    }
}

/// Which cache artifacts a single remote asset supplies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactMapping {
    /// One remote id is fetched into both `image.tif` and `stats.json`.
    Shared,
    /// `.tif`/`.tiff` assets fill `image.tif`, `.json` assets fill `stats.json`.
    ByExtension,
}

impl ArtifactMapping {
    pub fn artifacts_for(&self, asset_name: &str) -> &'static [Artifact] {
        match self {
            ArtifactMapping::Shared => &Artifact::ALL,
            ArtifactMapping::ByExtension => {
                let ext = asset_name
                    .rsplit_once('.')
                    .map(|(_, ext)| ext.to_ascii_lowercase())
                    .unwrap_or_default();
                match ext.as_str() {
                    "tif" | "tiff" => &[Artifact::Image],
                    "json" => &[Artifact::Stats],
                    _ => &[],
                }
            }
        }
    }
}

impl FromStr for ArtifactMapping {
    type Err = CityscanError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        <ArtifactMapping as ValueEnum>::from_str(value.trim(), true).map_err(|_| {
            CityscanError::InvalidConfig {
                key: "artifact mapping".to_string(),
                value: value.to_string(),
            }
        })
    }
}

/// Which date directory the tiling pass looks under for each city.
///
/// Ingestion always writes under the Sunday week start. `CalendarDay` looks
/// under the literal processing date instead, so it only finds entries when the
/// processing date is itself a Sunday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum TileGrouping {
    CalendarDay,
    WeekStart,
}

impl FromStr for TileGrouping {
    type Err = CityscanError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        <TileGrouping as ValueEnum>::from_str(value.trim(), true).map_err(|_| {
            CityscanError::InvalidConfig {
                key: "tile grouping".to_string(),
                value: value.to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, CityscanError> {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let settings = settings(&[]).unwrap();
        assert_eq!(settings.data_dir, Utf8PathBuf::from("data"));
        assert_eq!(settings.tiles_dir, settings.data_dir);
        assert_eq!(settings.folder_id, None);
        assert_eq!(settings.default_analysis, AnalysisType::Um);
        assert_eq!(settings.zoom, ZoomRange { min: 6, max: 15 });
        assert_eq!(settings.resampling, Resampling::Bilinear);
        assert_eq!(settings.artifact_mapping, ArtifactMapping::Shared);
        assert_eq!(settings.tile_grouping, TileGrouping::CalendarDay);
        assert_matches!(
            settings.require_folder_id(),
            Err(CityscanError::MissingConfig(_))
        );
    }

    #[test]
    fn reads_overrides() {
        let settings = settings(&[
            ("DATAPATH", "/srv/rasters"),
            ("FOLDER_ID", "abc123"),
            ("ANALYSIS", "lst"),
            ("TILES_LEVEL", "8-12"),
            ("ARTIFACT_MAPPING", "by-extension"),
            ("TILE_GROUPING", "week-start"),
        ])
        .unwrap();
        assert_eq!(settings.tiles_dir, Utf8PathBuf::from("/srv/rasters"));
        assert_eq!(settings.require_folder_id().unwrap(), "abc123");
        assert_eq!(settings.default_analysis, AnalysisType::Lst);
        assert_eq!(settings.zoom, ZoomRange { min: 8, max: 12 });
        assert_eq!(settings.artifact_mapping, ArtifactMapping::ByExtension);
        assert_eq!(settings.tile_grouping, TileGrouping::WeekStart);
    }

    #[test]
    fn rejects_invalid_values() {
        let err = settings(&[("TILES_LEVEL", "15-6")]).unwrap_err();
        assert_matches!(err, CityscanError::InvalidConfig { key, .. } if key == "TILES_LEVEL");

        let err = settings(&[("ANALYSIS", "evi")]).unwrap_err();
        assert_matches!(err, CityscanError::InvalidConfig { key, .. } if key == "ANALYSIS");
    }

    #[test]
    fn zoom_range_parsing() {
        assert_eq!("6-15".parse::<ZoomRange>().unwrap().to_string(), "6-15");
        assert_eq!("10".parse::<ZoomRange>().unwrap(), ZoomRange { min: 10, max: 10 });
        for bad in ["", "6-", "a-b", "6-31", "12-3", "6..15"] {
            assert_matches!(bad.parse::<ZoomRange>(), Err(CityscanError::InvalidZoomRange(_)));
        }
    }

    #[test]
    fn artifact_mapping_by_extension() {
        let mapping = ArtifactMapping::ByExtension;
        assert_eq!(mapping.artifacts_for("riyadh_lst_2024-03-07.TIF"), &[Artifact::Image]);
        assert_eq!(mapping.artifacts_for("riyadh_lst_2024-03-07.json"), &[Artifact::Stats]);
        assert!(mapping.artifacts_for("riyadh_lst_2024-03-07").is_empty());
        assert_eq!(
            ArtifactMapping::Shared.artifacts_for("riyadh_lst_2024-03-07"),
            &Artifact::ALL
        );
    }
}
