use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{Resampling, TileGrouping, ZoomRange};
use crate::domain::{Artifact, DATE_FORMAT, WeekBucket};
use crate::error::CityscanError;
use crate::fs_util;
use crate::store::CacheLayout;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TileOptions {
    pub zoom: ZoomRange,
    pub resampling: Resampling,
}

impl Default for TileOptions {
    fn default() -> Self {
        Self {
            zoom: ZoomRange::default(),
            resampling: Resampling::Bilinear,
        }
    }
}

/// Raster in, tile pyramid out.
pub trait TileRenderer: Send + Sync {
    fn render_pyramid(
        &self,
        raster: &Path,
        output_dir: &Path,
        options: &TileOptions,
    ) -> Result<(), CityscanError>;
}

/// Shells out to GDAL's `gdal2tiles`.
#[derive(Clone)]
pub struct Gdal2TilesRenderer {
    program: Option<PathBuf>,
}

impl Gdal2TilesRenderer {
    pub fn new() -> Self {
        let program = std::env::var_os("GDAL2TILES")
            .map(PathBuf::from)
            .or_else(|| fs_util::find_in_path("gdal2tiles.py"))
            .or_else(|| fs_util::find_in_path("gdal2tiles"));
        Self { program }
    }

    pub fn program(&self) -> Option<&Path> {
        self.program.as_deref()
    }

    pub fn args(raster: &Path, output_dir: &Path, options: &TileOptions) -> Vec<String> {
        vec![
            "-z".to_string(),
            options.zoom.to_string(),
            "-r".to_string(),
            options.resampling.to_string(),
            raster.to_string_lossy().to_string(),
            output_dir.to_string_lossy().to_string(),
        ]
    }
}

impl Default for Gdal2TilesRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TileRenderer for Gdal2TilesRenderer {
    fn render_pyramid(
        &self,
        raster: &Path,
        output_dir: &Path,
        options: &TileOptions,
    ) -> Result<(), CityscanError> {
        let program = self
            .program
            .as_ref()
            .ok_or_else(|| CityscanError::MissingTool("gdal2tiles".to_string()))?;
        let output = Command::new(program)
            .args(Self::args(raster, output_dir, options))
            .output()
            .map_err(|err| CityscanError::Tiling(format!("{}: {err}", program.display())))?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("{} exited with {}", program.display(), output.status)
        } else {
            stderr
        };
        Err(CityscanError::Tiling(message))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TileAction {
    Rendered,
    AlreadyTiled,
    NoRaster,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct TileItem {
    pub city: String,
    pub directory: String,
    pub action: TileAction,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TileReport {
    pub processing_date: NaiveDate,
    pub group: String,
    pub grouping: TileGrouping,
    pub items: Vec<TileItem>,
    pub cities_without_group: Vec<String>,
}

impl TileReport {
    pub fn count(&self, action: TileAction) -> usize {
        self.items.iter().filter(|item| item.action == action).count()
    }
}

/// One tiling pass over the cache for a single processing date.
pub struct TileGenerator<R: TileRenderer> {
    layout: CacheLayout,
    renderer: R,
    options: TileOptions,
    grouping: TileGrouping,
    processing_date: NaiveDate,
}

impl<R: TileRenderer> TileGenerator<R> {
    pub fn new(
        layout: CacheLayout,
        renderer: R,
        options: TileOptions,
        grouping: TileGrouping,
        processing_date: NaiveDate,
    ) -> Self {
        Self {
            layout,
            renderer,
            options,
            grouping,
            processing_date,
        }
    }

    /// Name of the date directory this pass reads under each city.
    pub fn group_dir_name(&self) -> String {
        let date = match self.grouping {
            TileGrouping::CalendarDay => self.processing_date,
            TileGrouping::WeekStart => WeekBucket::containing(self.processing_date).start(),
        };
        date.format(DATE_FORMAT).to_string()
    }

    pub fn run(&self) -> Result<TileReport, CityscanError> {
        let group = self.group_dir_name();
        if self.grouping == TileGrouping::CalendarDay && self.processing_date.weekday() != Weekday::Sun {
            warn!(
                %group,
                "calendar-day grouping on a non-Sunday cannot match week-bucketed cache entries"
            );
        }

        let mut report = TileReport {
            processing_date: self.processing_date,
            group: group.clone(),
            grouping: self.grouping,
            items: Vec::new(),
            cities_without_group: Vec::new(),
        };

        for city_dir in self.layout.city_dirs()? {
            let city = city_dir.file_name().unwrap_or_default().to_string();
            let group_dir = city_dir.join(&group);
            if !group_dir.as_std_path().is_dir() {
                info!(%city, %group, "no folder for processing date, skipping city");
                report.cities_without_group.push(city);
                continue;
            }
            info!(%city, "generating tiles");

            for analysis_dir in fs_util::subdirectories(group_dir.as_std_path())? {
                let item = self.tile_directory(&city, &analysis_dir);
                report.items.push(item);
            }
        }

        info!(
            rendered = report.count(TileAction::Rendered),
            already_tiled = report.count(TileAction::AlreadyTiled),
            failed = report.count(TileAction::Failed),
            "tiling pass finished"
        );
        Ok(report)
    }

    fn tile_directory(&self, city: &str, analysis_dir: &Path) -> TileItem {
        let directory = analysis_dir.display().to_string();
        let make = |action, detail| TileItem {
            city: city.to_string(),
            directory: directory.clone(),
            action,
            detail,
        };

        let raster = analysis_dir.join(Artifact::Image.file_name());
        if !raster.is_file() {
            info!(dir = %directory, "no image.tif, skipping");
            return make(TileAction::NoRaster, None);
        }
        if tileset_built(analysis_dir, self.options.zoom) {
            info!(dir = %directory, "tile pyramid already present");
            return make(TileAction::AlreadyTiled, None);
        }

        match self.renderer.render_pyramid(&raster, analysis_dir, &self.options) {
            Ok(()) => {
                info!(raster = %raster.display(), dir = %directory, "tiles generated");
                make(TileAction::Rendered, None)
            }
            Err(err) => {
                warn!(raster = %raster.display(), error = %err, "tiling failed");
                make(TileAction::Failed, Some(err.to_string()))
            }
        }
    }
}

/// A pyramid counts as built once any zoom-level directory in range holds tiles.
pub fn tileset_built(dir: &Path, zoom: ZoomRange) -> bool {
    (zoom.min..=zoom.max).any(|level| fs_util::dir_has_entries(&dir.join(level.to_string())))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::domain::parse_iso_date;

    #[test]
    fn gdal2tiles_arguments() {
        let options = TileOptions::default();
        let args = Gdal2TilesRenderer::args(Path::new("in/image.tif"), Path::new("in"), &options);
        assert_eq!(args, vec!["-z", "6-15", "-r", "bilinear", "in/image.tif", "in"]);
    }

    #[test]
    fn missing_tool_is_reported() {
        let renderer = Gdal2TilesRenderer { program: None };
        let err = renderer
            .render_pyramid(Path::new("image.tif"), Path::new("."), &TileOptions::default())
            .unwrap_err();
        assert!(matches!(err, CityscanError::MissingTool(_)));
    }

    #[test]
    fn tileset_built_needs_a_non_empty_zoom_dir_in_range() {
        let temp = tempfile::tempdir().unwrap();
        let zoom = ZoomRange { min: 6, max: 8 };
        assert!(!tileset_built(temp.path(), zoom));

        fs::create_dir(temp.path().join("7")).unwrap();
        assert!(!tileset_built(temp.path(), zoom));

        fs::create_dir_all(temp.path().join("12/1")).unwrap();
        assert!(!tileset_built(temp.path(), zoom));

        fs::create_dir_all(temp.path().join("7/40")).unwrap();
        assert!(tileset_built(temp.path(), zoom));
    }

    #[test]
    fn group_dir_follows_grouping() {
        let thursday = parse_iso_date("2024-03-07").unwrap();
        let layout = CacheLayout::new("data");
        let renderer = Gdal2TilesRenderer { program: None };

        let by_day = TileGenerator::new(
            layout.clone(),
            renderer.clone(),
            TileOptions::default(),
            TileGrouping::CalendarDay,
            thursday,
        );
        assert_eq!(by_day.group_dir_name(), "2024-03-07");

        let by_week = TileGenerator::new(
            layout,
            renderer,
            TileOptions::default(),
            TileGrouping::WeekStart,
            thursday,
        );
        assert_eq!(by_week.group_dir_name(), "2024-03-03");
    }
}
