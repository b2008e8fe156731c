use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use cityscan::catalog::Catalog;
use cityscan::config::{ArtifactMapping, Settings, TileGrouping, ZoomRange};
use cityscan::domain::{AnalysisType, WeekBucket, parse_iso_date};
use cityscan::drive::DriveHttpClient;
use cityscan::error::CityscanError;
use cityscan::ingest::{IngestAction, IngestOptions, IngestReport, Ingestor};
use cityscan::output::{JsonOutput, OutputMode};
use cityscan::store::CacheLayout;
use cityscan::tiles::{Gdal2TilesRenderer, TileAction, TileGenerator, TileOptions, TileReport};

#[derive(Parser)]
#[command(name = "cityscan")]
#[command(about = "Weekly city raster cache: ingest remote analysis rasters and build tile pyramids")]
#[command(version, author)]
struct Cli {
    /// Print machine-readable JSON reports on stdout.
    #[arg(long, global = true)]
    json: bool,

    /// Cache root (overrides DATAPATH; also the tiles root unless TILES_BASE_DIR is set).
    #[arg(long, global = true)]
    data_dir: Option<Utf8PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download new rasters from the remote folder into the cache")]
    Ingest(IngestArgs),
    #[command(about = "Build tile pyramids for the processing date")]
    Tiles(TilesArgs),
    #[command(about = "List cache entries and their completeness")]
    Status,
    #[command(about = "Resolve the raster path the tile API would serve")]
    Lookup(LookupArgs),
    #[command(about = "Print the Sunday week start for a date")]
    Week(WeekArgs),
}

#[derive(Args)]
struct IngestArgs {
    /// Only this analysis type (default: all of them).
    #[arg(long, value_enum)]
    analysis: Option<AnalysisType>,

    /// Remote folder id (overrides FOLDER_ID).
    #[arg(long)]
    folder: Option<String>,

    #[arg(long, value_enum)]
    mapping: Option<ArtifactMapping>,

    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct TilesArgs {
    /// Processing date, YYYY-MM-DD (default: today).
    #[arg(long)]
    date: Option<String>,

    /// Zoom range such as 6-15 (overrides TILES_LEVEL).
    #[arg(long)]
    zoom: Option<String>,

    #[arg(long, value_enum)]
    grouping: Option<TileGrouping>,
}

#[derive(Args)]
struct LookupArgs {
    city: String,
    date: String,
    #[arg(value_enum)]
    analysis: Option<AnalysisType>,
}

#[derive(Args)]
struct WeekArgs {
    date: String,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<CityscanError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &CityscanError) -> u8 {
    match error {
        CityscanError::MissingConfig(_)
        | CityscanError::InvalidConfig { .. }
        | CityscanError::InvalidZoomRange(_)
        | CityscanError::InvalidDate(_)
        | CityscanError::UnknownCity(_)
        | CityscanError::ArtifactNotFound(_) => 2,
        CityscanError::RemoteList(_)
        | CityscanError::RemoteListStatus { .. }
        | CityscanError::Fetch(_)
        | CityscanError::FetchStatus { .. }
        | CityscanError::MissingTool(_)
        | CityscanError::Tiling(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let mut settings = Settings::from_env()?;
    if let Some(dir) = cli.data_dir {
        settings.override_data_dir(dir);
    }

    match cli.command {
        Commands::Ingest(args) => run_ingest(args, &settings, output_mode),
        Commands::Tiles(args) => run_tiles(args, &settings, output_mode),
        Commands::Status => run_status(&settings, output_mode),
        Commands::Lookup(args) => run_lookup(args, &settings, output_mode),
        Commands::Week(args) => {
            let week = WeekBucket::from_iso(&args.date)?;
            println!("{week}");
            Ok(())
        }
    }
}

fn run_ingest(args: IngestArgs, settings: &Settings, output_mode: OutputMode) -> miette::Result<()> {
    let folder_id = match args.folder {
        Some(folder) => folder,
        None => settings.require_folder_id()?.to_string(),
    };
    let client = DriveHttpClient::new(settings.drive_api_key.clone())?;
    let options = IngestOptions {
        folder_id,
        mapping: args.mapping.unwrap_or(settings.artifact_mapping),
        dry_run: args.dry_run,
    };
    let ingestor = Ingestor::new(
        CacheLayout::new(settings.data_dir.clone()),
        client.clone(),
        client,
        options,
    );

    let analyses = match args.analysis {
        Some(analysis) => vec![analysis],
        None => AnalysisType::ALL.to_vec(),
    };
    let reports = ingestor.run_all(&analyses);

    match output_mode {
        OutputMode::Json => JsonOutput::print_ingest(&reports).into_diagnostic()?,
        OutputMode::Human => print_ingest_summary(&reports),
    }
    Ok(())
}

fn run_tiles(args: TilesArgs, settings: &Settings, output_mode: OutputMode) -> miette::Result<()> {
    let processing_date = match args.date {
        Some(date) => parse_iso_date(&date)?,
        None => chrono::Local::now().date_naive(),
    };
    let zoom = match args.zoom {
        Some(zoom) => zoom.parse::<ZoomRange>()?,
        None => settings.zoom,
    };
    let options = TileOptions {
        zoom,
        resampling: settings.resampling,
    };

    let renderer = Gdal2TilesRenderer::new();
    match renderer.program() {
        Some(program) => tracing::debug!(program = %program.display(), "using gdal2tiles"),
        None => tracing::warn!("gdal2tiles not found on PATH; set GDAL2TILES"),
    }

    let generator = TileGenerator::new(
        CacheLayout::new(settings.data_dir.clone()),
        renderer,
        options,
        args.grouping.unwrap_or(settings.tile_grouping),
        processing_date,
    );
    let report = generator.run()?;

    match output_mode {
        OutputMode::Json => JsonOutput::print_tiles(&report).into_diagnostic()?,
        OutputMode::Human => print_tiles_summary(&report),
    }
    Ok(())
}

fn run_status(settings: &Settings, output_mode: OutputMode) -> miette::Result<()> {
    let entries = CacheLayout::new(settings.data_dir.clone()).scan_entries()?;
    match output_mode {
        OutputMode::Json => JsonOutput::print_status(&entries).into_diagnostic()?,
        OutputMode::Human => {
            if entries.is_empty() {
                println!("cache at {} is empty", settings.data_dir);
            }
            for entry in &entries {
                println!(
                    "{:<10} {}/{}/{}",
                    format!("{:?}", entry.status).to_lowercase(),
                    entry.city,
                    entry.group,
                    entry.analysis
                );
            }
        }
    }
    Ok(())
}

fn run_lookup(args: LookupArgs, settings: &Settings, output_mode: OutputMode) -> miette::Result<()> {
    let catalog = Catalog::new(settings.tiles_dir.clone());
    let analysis = args.analysis.unwrap_or(settings.default_analysis);
    let resolved = catalog.resolve(&args.city, &args.date, analysis)?;
    match output_mode {
        OutputMode::Json => JsonOutput::print_lookup(&resolved).into_diagnostic()?,
        OutputMode::Human => {
            println!("{}", resolved.file_path);
            if let Some(stats) = &resolved.stats_path {
                println!("{stats}");
            }
        }
    }
    Ok(())
}

fn print_ingest_summary(reports: &[IngestReport]) {
    for report in reports {
        if let Some(error) = &report.error {
            println!("{}: listing failed: {error}", report.analysis);
            continue;
        }
        println!(
            "{}: listed {}, downloaded {}, cached {}, planned {}, failed {}, skipped {}",
            report.analysis,
            report.listed,
            report.count(IngestAction::Downloaded),
            report.count(IngestAction::Cached),
            report.count(IngestAction::Planned),
            report.count(IngestAction::Failed),
            report.count(IngestAction::Malformed)
                + report.count(IngestAction::Mismatch)
                + report.count(IngestAction::Duplicate)
                + report.count(IngestAction::Unmapped),
        );
        for item in &report.items {
            if item.action == IngestAction::Failed {
                println!(
                    "  failed {} -> {}: {}",
                    item.asset_name,
                    item.cache_path.as_deref().unwrap_or("-"),
                    item.detail.as_deref().unwrap_or("unknown error")
                );
            }
        }
    }
}

fn print_tiles_summary(report: &TileReport) {
    println!(
        "tiles for {} ({}): rendered {}, already tiled {}, no raster {}, failed {}",
        report.group,
        report.processing_date,
        report.count(TileAction::Rendered),
        report.count(TileAction::AlreadyTiled),
        report.count(TileAction::NoRaster),
        report.count(TileAction::Failed),
    );
    for item in &report.items {
        if item.action == TileAction::Failed {
            println!(
                "  failed {}: {}",
                item.directory,
                item.detail.as_deref().unwrap_or("unknown error")
            );
        }
    }
}
