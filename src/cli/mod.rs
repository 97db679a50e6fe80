//! Command-line interface for the LiDAR pipeline.

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::{ExportConfig, ExtentErrorPolicy, TileFormat, VoxelConfig};
use crate::core::loaders::{AnyReader, PointCloudReader};
use crate::core::projection::{ProjectionResolver, UtmResolver};
use crate::core::writers::{write_tile_polygons, write_voxel_layers};
use crate::processors::stitch::{par_apply_stitched, StitchError, StitchedTile};
use crate::processors::voxel::{Reducer, VoxelArray, VoxelGrid};
use crate::{PipelineConfig, TileIndex};

#[derive(Parser)]
#[command(name = "lidar-pipeline")]
#[command(about = "Tiled LiDAR point cloud processing pipeline", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command that indexes a tile directory.
#[derive(clap::Args)]
struct IndexArgs {
    /// Directory containing point cloud tiles
    directory: PathBuf,
    /// Number of worker threads
    #[arg(short, long)]
    jobs: Option<usize>,
    /// Index CSV tiles instead of LAS
    #[arg(long)]
    csv: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a tile directory and optionally export footprints to CSV
    Index {
        #[command(flatten)]
        index: IndexArgs,
        /// Output CSV of tile footprints
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Also export footprints buffered by this distance
        #[arg(short, long)]
        buffer: Option<f64>,
        /// Skip tiles with unreadable headers instead of aborting
        #[arg(long)]
        skip_bad: bool,
    },

    /// List the tiles within a buffer distance of one tile
    Neighbors {
        #[command(flatten)]
        index: IndexArgs,
        /// Position of the target tile in the index
        #[arg(short, long)]
        tile: usize,
        /// Buffer distance around the target tile
        #[arg(short, long)]
        buffer: Option<f64>,
    },

    /// Voxelize a single tile into per-layer ASCII grids
    Voxelize {
        /// Input LAS or CSV file
        file: PathBuf,
        /// Output directory for ASCII grids
        #[arg(short, long)]
        output: PathBuf,
        /// Voxel edge length
        #[arg(long)]
        cell_size: Option<f64>,
        /// Point field to aggregate
        #[arg(long)]
        field: Option<String>,
        /// Reducer: max, min, mean, sum, count or first
        #[arg(long)]
        reducer: Option<String>,
    },

    /// Stitch every tile with its neighbors, voxelize and export per tile
    Stitch {
        #[command(flatten)]
        index: IndexArgs,
        /// Output directory for ASCII grids
        #[arg(short, long)]
        output: PathBuf,
        /// Buffer distance used to collect neighbor points
        #[arg(short, long)]
        buffer: Option<f64>,
        /// Voxel edge length
        #[arg(long)]
        cell_size: Option<f64>,
        /// Point field to aggregate
        #[arg(long)]
        field: Option<String>,
        /// Reducer: max, min, mean, sum, count or first
        #[arg(long)]
        reducer: Option<String>,
    },

    /// Print the WKT projection string of a UTM zone (e.g. 10N)
    Utm {
        /// Zone label
        zone: String,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 39 {
            format!("{}...", value.chars().take(36).collect::<String>())
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

/// Log a failed command and exit non-zero
fn fail(what: &str, err: anyhow::Error) -> ! {
    error!("{} failed: {:#}", what, err);
    std::process::exit(1);
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    // Load config
    let mut config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("Failed to load config from {}: {}, using defaults", path.display(), e);
                PipelineConfig::default()
            }
        },
        None => PipelineConfig::default(),
    };

    // Dispatch to subcommands
    match cli.command {
        Commands::Index { index, output, buffer, skip_bad } => {
            apply_index_args(&mut config, &index);
            if skip_bad {
                config.index.on_extent_error = ExtentErrorPolicy::Skip;
            }
            if let Some(buffer) = buffer {
                config.stitch.buffer_distance = buffer;
            }
            validate(&config);
            cmd_index(&index.directory, output.as_deref(), buffer, &config);
        }
        Commands::Neighbors { index, tile, buffer } => {
            apply_index_args(&mut config, &index);
            if let Some(buffer) = buffer {
                config.stitch.buffer_distance = buffer;
            }
            validate(&config);
            cmd_neighbors(&index.directory, tile, &config);
        }
        Commands::Voxelize { file, output, cell_size, field, reducer } => {
            apply_voxel_args(&mut config, cell_size, field, reducer);
            validate(&config);
            cmd_voxelize(&file, &output, &config);
        }
        Commands::Stitch { index, output, buffer, cell_size, field, reducer } => {
            apply_index_args(&mut config, &index);
            if let Some(buffer) = buffer {
                config.stitch.buffer_distance = buffer;
            }
            apply_voxel_args(&mut config, cell_size, field, reducer);
            validate(&config);
            cmd_stitch(&index.directory, &output, &config);
        }
        Commands::Utm { zone } => {
            cmd_utm(&zone);
        }
    }
}

fn apply_index_args(config: &mut PipelineConfig, args: &IndexArgs) {
    if let Some(jobs) = args.jobs {
        config.index.n_jobs = jobs;
    }
    if args.csv {
        config.index.format = TileFormat::Csv;
    }
}

fn apply_voxel_args(
    config: &mut PipelineConfig,
    cell_size: Option<f64>,
    field: Option<String>,
    reducer: Option<String>,
) {
    if let Some(cell_size) = cell_size {
        config.voxel.cell_size = cell_size;
    }
    if let Some(field) = field {
        config.voxel.field = field;
    }
    if let Some(reducer) = reducer {
        match reducer.parse::<Reducer>() {
            Ok(reducer) => config.voxel.reducer = reducer,
            Err(e) => fail("Argument parsing", anyhow::Error::new(e)),
        }
    }
}

fn validate(config: &PipelineConfig) {
    if let Err(msg) = config.validate() {
        fail("Configuration", anyhow::anyhow!(msg));
    }
}

/// WKT for the configured UTM zone, if one is set
fn resolve_wkt(export: &ExportConfig) -> anyhow::Result<Option<String>> {
    export
        .utm_zone
        .as_deref()
        .map(|zone| UtmResolver.lookup(zone).with_context(|| format!("resolving UTM zone {}", zone)))
        .transpose()
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "tile".to_string())
}

fn cmd_index(directory: &Path, output: Option<&Path>, buffer: Option<f64>, config: &PipelineConfig) {
    let start = Instant::now();
    let reader = config.index.format.reader();

    let spinner = create_spinner("Reading tile extents...");

    let index = match TileIndex::build(directory, &reader, &config.index) {
        Ok(index) => index,
        Err(e) => {
            spinner.finish_and_clear();
            fail("Indexing", e.into());
        }
    };

    if let Some(output) = output {
        spinner.set_message("Writing tile footprints...");
        if let Err(e) = write_tile_polygons(output, &index, buffer) {
            spinner.finish_and_clear();
            fail("Footprint export", e.into());
        }
    }

    spinner.finish_and_clear();

    for skipped in index.skipped() {
        warn!("Skipped {}: {}", skipped.path.display(), skipped.reason);
    }

    print_summary(
        "Tile Index Complete",
        &[
            ("Directory", directory.display().to_string()),
            ("Tiles indexed", index.len().to_string()),
            ("Tiles skipped", index.skipped().len().to_string()),
            ("Workers", index.n_jobs().to_string()),
            (
                "Footprint CSV",
                output.map_or("-".to_string(), |p| p.display().to_string()),
            ),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
}

fn cmd_neighbors(directory: &Path, tile: usize, config: &PipelineConfig) {
    let start = Instant::now();
    let reader = config.index.format.reader();
    let buffer = config.stitch.buffer_distance;

    let spinner = create_spinner("Reading tile extents...");

    let result = TileIndex::build(directory, &reader, &config.index)
        .and_then(|index| {
            let target = index.get(tile)?.path().to_path_buf();
            Ok((target, index.intersecting(tile, buffer)?))
        });

    spinner.finish_and_clear();

    let (target, neighbors) = match result {
        Ok(found) => found,
        Err(e) => fail("Neighbor search", e.into()),
    };

    for path in neighbors.paths() {
        println!("{}", path.display());
    }

    print_summary(
        "Neighbor Search Complete",
        &[
            ("Target tile", target.display().to_string()),
            ("Buffer", buffer.to_string()),
            ("Intersecting tiles", neighbors.len().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
}

fn cmd_voxelize(file: &Path, output: &Path, config: &PipelineConfig) {
    let start = Instant::now();

    println!("Voxelizing point cloud...");
    println!("Input: {}", file.display());
    println!("Output directory: {}", output.display());
    println!("Cell size: {}", config.voxel.cell_size);
    println!("Field: {} ({})", config.voxel.field, config.voxel.reducer);

    let spinner = create_spinner("Loading points...");

    let result = (|| -> anyhow::Result<(usize, VoxelArray, usize)> {
        let reader = AnyReader::for_path(file)
            .with_context(|| format!("no reader for {}", file.display()))?;
        let cloud = reader.read_points(file)?;
        let wkt = resolve_wkt(&config.export)?;

        let grid = VoxelGrid::new(&cloud, config.voxel.cell_size)?;
        let array = grid.aggregate(&config.voxel.field, config.voxel.reducer)?;
        let origin = grid.origin();

        let written = write_voxel_layers(
            output,
            &file_stem(file),
            &array,
            config.voxel.cell_size,
            [origin[0], origin[1]],
            config.export.nodata,
            wkt.as_deref(),
        )?;
        Ok((cloud.len(), array, written.len()))
    })();

    spinner.finish_and_clear();

    let (points, array, layers) = match result {
        Ok(done) => done,
        Err(e) => fail("Voxelization", e),
    };

    let [rows, cols, depth] = array.shape();
    print_summary(
        "Voxelization Complete",
        &[
            ("Input file", file.display().to_string()),
            ("Points", points.to_string()),
            ("Grid (rows x cols x z)", format!("{} x {} x {}", rows, cols, depth)),
            ("Occupied voxels", array.occupied_count().to_string()),
            ("Grids written", layers.to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
}

/// Voxelize a stitched tile, crop to its footprint and write the layers
fn export_stitched(
    stitched: &StitchedTile,
    voxel: &VoxelConfig,
    export: &ExportConfig,
    output: &Path,
    wkt: Option<&str>,
) -> anyhow::Result<usize> {
    let grid = VoxelGrid::new(&stitched.cloud, voxel.cell_size)?;
    let array = grid.aggregate(&voxel.field, voxel.reducer)?;

    let Some((rows, cols)) = grid.window(stitched.footprint()) else {
        return Ok(0);
    };
    // Nominal cell_size spacing, not the bin edges: edge spacing is
    // extent / (dim - 1), so this can sit up to one cell off the binning.
    let lower_left = grid.nominal_corner(rows.start, cols.start);
    let cropped = array.window(rows, cols);

    let written = write_voxel_layers(
        output,
        &file_stem(stitched.tile.path()),
        &cropped,
        voxel.cell_size,
        lower_left,
        export.nodata,
        wkt,
    )?;
    Ok(written.len())
}

fn cmd_stitch(directory: &Path, output: &Path, config: &PipelineConfig) {
    let start = Instant::now();
    let reader = config.index.format.reader();
    let buffer = config.stitch.buffer_distance;

    println!("Stitching tiles...");
    println!("Input directory: {}", directory.display());
    println!("Output directory: {}", output.display());
    println!("Buffer: {}", buffer);
    println!("Workers: {}", config.index.n_jobs);

    let spinner = create_spinner("Reading tile extents...");

    let index = match TileIndex::build(directory, &reader, &config.index) {
        Ok(index) => index,
        Err(e) => {
            spinner.finish_and_clear();
            fail("Indexing", e.into());
        }
    };

    let wkt = match resolve_wkt(&config.export) {
        Ok(wkt) => wkt,
        Err(e) => {
            spinner.finish_and_clear();
            fail("Projection lookup", e);
        }
    };

    spinner.set_message(format!("Stitching and voxelizing {} tiles...", index.len()));

    let result = par_apply_stitched(&index, buffer, &reader, |stitched| {
        export_stitched(&stitched, &config.voxel, &config.export, output, wkt.as_deref())
            .map_err(|e| StitchError::Task(e.into()))
    });

    spinner.finish_and_clear();

    let layers = match result {
        Ok(layers) => layers,
        Err(e) => fail("Stitching", e),
    };

    print_summary(
        "Stitch Complete",
        &[
            ("Input directory", directory.display().to_string()),
            ("Output directory", output.display().to_string()),
            ("Tiles processed", index.len().to_string()),
            ("Tiles skipped", index.skipped().len().to_string()),
            ("Grids written", layers.iter().sum::<usize>().to_string()),
            ("Buffer", buffer.to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
}

fn cmd_utm(zone: &str) {
    match UtmResolver.lookup(zone) {
        Ok(wkt) => println!("{}", wkt),
        Err(e) => fail("UTM lookup", e.into()),
    }
}
