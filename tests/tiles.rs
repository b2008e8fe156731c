use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use camino::Utf8PathBuf;

use cityscan::config::{Resampling, TileGrouping, ZoomRange};
use cityscan::domain::parse_iso_date;
use cityscan::error::CityscanError;
use cityscan::store::CacheLayout;
use cityscan::tiles::{TileAction, TileGenerator, TileOptions, TileRenderer};

#[derive(Debug, Clone)]
struct RenderCall {
    raster: PathBuf,
    output_dir: PathBuf,
    options: TileOptions,
}

/// Writes a single tile at the lowest zoom level, like a real pyramid would.
#[derive(Clone, Default)]
struct MockRenderer {
    calls: Arc<Mutex<Vec<RenderCall>>>,
    fail_for: Option<String>,
}

impl MockRenderer {
    fn calls(&self) -> Vec<RenderCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl TileRenderer for MockRenderer {
    fn render_pyramid(
        &self,
        raster: &Path,
        output_dir: &Path,
        options: &TileOptions,
    ) -> Result<(), CityscanError> {
        self.calls.lock().unwrap().push(RenderCall {
            raster: raster.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            options: *options,
        });
        if let Some(fragment) = &self.fail_for {
            if output_dir.to_string_lossy().contains(fragment.as_str()) {
                return Err(CityscanError::Tiling("gdal2tiles exited with 1".to_string()));
            }
        }
        let tile_dir = output_dir.join(options.zoom.min.to_string()).join("0");
        std::fs::create_dir_all(&tile_dir).unwrap();
        std::fs::write(tile_dir.join("0.png"), b"png").unwrap();
        Ok(())
    }
}

fn temp_layout() -> (tempfile::TempDir, CacheLayout) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().join("data")).unwrap();
    (temp, CacheLayout::new(root))
}

fn seed_raster(layout: &CacheLayout, city: &str, group: &str, analysis: &str) -> Utf8PathBuf {
    let dir = layout.root().join(city).join(group).join(analysis);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("image.tif"), b"tif").unwrap();
    std::fs::write(dir.join("stats.json"), b"{}").unwrap();
    dir
}

fn generator(
    layout: &CacheLayout,
    renderer: &MockRenderer,
    grouping: TileGrouping,
    date: &str,
) -> TileGenerator<MockRenderer> {
    TileGenerator::new(
        layout.clone(),
        renderer.clone(),
        TileOptions::default(),
        grouping,
        parse_iso_date(date).unwrap(),
    )
}

#[test]
fn renders_once_then_skips_built_pyramid() {
    let (_temp, layout) = temp_layout();
    let dir = seed_raster(&layout, "riyadh", "2024-03-03", "ndvi");
    let renderer = MockRenderer::default();
    let tiles = generator(&layout, &renderer, TileGrouping::CalendarDay, "2024-03-03");

    let first = tiles.run().unwrap();
    assert_eq!(first.count(TileAction::Rendered), 1);

    let calls = renderer.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].raster, dir.join("image.tif").into_std_path_buf());
    assert_eq!(calls[0].output_dir, dir.into_std_path_buf());
    assert_eq!(calls[0].options.zoom, ZoomRange { min: 6, max: 15 });
    assert_eq!(calls[0].options.resampling, Resampling::Bilinear);

    let second = tiles.run().unwrap();
    assert_eq!(second.count(TileAction::AlreadyTiled), 1);
    assert_eq!(renderer.calls().len(), 1);
}

#[test]
fn configured_zoom_range_is_passed_through() {
    let (_temp, layout) = temp_layout();
    seed_raster(&layout, "mecca", "2024-03-10", "lst");
    let renderer = MockRenderer::default();
    let options = TileOptions {
        zoom: "8-12".parse().unwrap(),
        resampling: Resampling::Bilinear,
    };
    let tiles = TileGenerator::new(
        layout,
        renderer.clone(),
        options,
        TileGrouping::CalendarDay,
        parse_iso_date("2024-03-10").unwrap(),
    );

    tiles.run().unwrap();

    let calls = renderer.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].options.zoom.to_string(), "8-12");
}

#[test]
fn directories_without_raster_are_skipped() {
    let (_temp, layout) = temp_layout();
    let dir = layout.root().join("dammam/2024-03-03/uhi");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("stats.json"), b"{}").unwrap();
    let renderer = MockRenderer::default();

    let report = generator(&layout, &renderer, TileGrouping::CalendarDay, "2024-03-03")
        .run()
        .unwrap();

    assert_eq!(report.count(TileAction::NoRaster), 1);
    assert!(renderer.calls().is_empty());
}

#[test]
fn only_the_processing_date_is_visited() {
    let (_temp, layout) = temp_layout();
    seed_raster(&layout, "riyadh", "2024-02-25", "ndvi");
    seed_raster(&layout, "riyadh", "2024-03-03", "ndvi");
    seed_raster(&layout, "jiddah", "2024-02-25", "ndvi");
    let renderer = MockRenderer::default();

    let report = generator(&layout, &renderer, TileGrouping::CalendarDay, "2024-03-03")
        .run()
        .unwrap();

    assert_eq!(renderer.calls().len(), 1);
    assert_eq!(report.cities_without_group, vec!["jiddah".to_string()]);
}

#[test]
fn calendar_day_misses_week_bucketed_entries_on_weekdays() {
    let (_temp, layout) = temp_layout();
    seed_raster(&layout, "riyadh", "2024-03-03", "ndvi");
    let renderer = MockRenderer::default();

    let by_day = generator(&layout, &renderer, TileGrouping::CalendarDay, "2024-03-07")
        .run()
        .unwrap();
    assert_eq!(by_day.group, "2024-03-07");
    assert!(by_day.items.is_empty());
    assert!(renderer.calls().is_empty());

    let by_week = generator(&layout, &renderer, TileGrouping::WeekStart, "2024-03-07")
        .run()
        .unwrap();
    assert_eq!(by_week.group, "2024-03-03");
    assert_eq!(by_week.count(TileAction::Rendered), 1);
}

#[test]
fn renderer_failure_does_not_stop_the_pass() {
    let (_temp, layout) = temp_layout();
    seed_raster(&layout, "riyadh", "2024-03-03", "albedo");
    seed_raster(&layout, "riyadh", "2024-03-03", "ndvi");
    let renderer = MockRenderer {
        fail_for: Some("albedo".to_string()),
        ..MockRenderer::default()
    };

    let report = generator(&layout, &renderer, TileGrouping::CalendarDay, "2024-03-03")
        .run()
        .unwrap();

    assert_eq!(report.count(TileAction::Failed), 1);
    assert_eq!(report.count(TileAction::Rendered), 1);
    assert_eq!(renderer.calls().len(), 2);

    // The failed pyramid stays unbuilt and is retried on the next pass.
    let retry = generator(&layout, &renderer, TileGrouping::CalendarDay, "2024-03-03")
        .run()
        .unwrap();
    assert_eq!(retry.count(TileAction::Failed), 1);
    assert_eq!(retry.count(TileAction::AlreadyTiled), 1);
}

#[test]
fn empty_cache_is_a_no_op() {
    let (_temp, layout) = temp_layout();
    let renderer = MockRenderer::default();
    let report = generator(&layout, &renderer, TileGrouping::WeekStart, "2024-03-07")
        .run()
        .unwrap();
    assert!(report.items.is_empty());
    assert!(renderer.calls().is_empty());
}
