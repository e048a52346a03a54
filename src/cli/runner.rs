use std::path::{Path, PathBuf};

use tracing::info;
use tracing_subscriber::EnvFilter;

use geolr::core::params::load_params;
use geolr::io::tile_info::merge_tile_info_fragments;
use geolr::{
    BuildReport, DatasetPaths, MergeInput, PipelineParams, RechunkParams, StoreLayout,
    build_store_from_dir, compute_band_stats, create_splits, inspect_store, merge_stores,
    post_download, rechunk_store,
};

use super::args::{
    BuildArgs, CliArgs, Command, DataDirArg, InfoArgs, LayoutArgs, MergeArgs, MergeTileInfoArgs,
    PostDownloadArgs, RechunkArgs, SplitsArgs, StatsArgs,
};
use super::errors::AppError;

fn init_logging() {
    // Verbose by default; RUST_LOG narrows it, e.g. `RUST_LOG=geolr=info`
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn data_paths(data: &DataDirArg) -> Result<Option<DatasetPaths>, AppError> {
    Ok(match &data.data_dir {
        Some(dir) => Some(DatasetPaths::from_data_dir(dir)?),
        None => None,
    })
}

/// An explicit path, else the data folder's default, else an error naming `arg`
fn resolve(
    explicit: Option<PathBuf>,
    paths: Option<&DatasetPaths>,
    default: fn(&DatasetPaths) -> &PathBuf,
    arg: &str,
) -> Result<PathBuf, AppError> {
    explicit
        .or_else(|| paths.map(|p| default(p).clone()))
        .ok_or_else(|| AppError::MissingArgument {
            arg: arg.to_string(),
        })
}

fn apply_layout(layout: &mut StoreLayout, args: &LayoutArgs) {
    if let Some(rows) = args.chunk_rows {
        layout.chunk_rows = rows;
    }
    if let Some(level) = args.gzip_level {
        layout.gzip_level = level;
    }
}

/// `<dir>/<stem><suffix>` for a path `<dir>/<stem>.<ext>`
fn sibling(path: &Path, suffix: &str) -> Result<PathBuf, AppError> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| AppError::NoDefaultOutput {
            path: path.display().to_string(),
        })?;
    Ok(path.with_file_name(format!("{stem}{suffix}")))
}

fn log_build_report(report: &BuildReport) {
    info!("Build complete!");
    info!("Tile records: {}", report.total);
    info!("Admitted: {}", report.admitted);
    info!("Written: {}", report.written);
    info!("Mismatched: {}", report.mismatched);
    info!("Unreadable: {}", report.unreadable);
    info!("Bad tile ids: {}", report.bad_ids);
    info!("Rejected by assembler: {}", report.failed);
}

fn run_build(args: BuildArgs, params: PipelineParams) -> Result<(), AppError> {
    let paths = data_paths(&args.data)?;
    let raster_dir = resolve(args.raster_dir, paths.as_ref(), |p| &p.rasters, "--raster-dir")?;
    let tile_info = resolve(args.tile_info, paths.as_ref(), |p| &p.tile_info, "--tile-info")?;
    let output = resolve(args.output, paths.as_ref(), |p| &p.store, "--output")?;

    let mut build = params.build;
    if let Some(size) = args.image_size {
        if size == 0 {
            return Err(AppError::ZeroSize { size });
        }
        build.image_size = size;
    }
    apply_layout(&mut build.layout, &args.layout);

    info!("Building {:?} from {:?}", output, raster_dir);
    let report = build_store_from_dir(&raster_dir, &tile_info, &output, &build)?;
    log_build_report(&report);
    Ok(())
}

fn run_stats(args: StatsArgs, params: PipelineParams) -> Result<(), AppError> {
    let paths = data_paths(&args.data)?;
    let store = resolve(args.store, paths.as_ref(), |p| &p.store, "--store")?;
    let tile_info = resolve(args.tile_info, paths.as_ref(), |p| &p.tile_info, "--tile-info")?;
    let output = resolve(args.output, paths.as_ref(), |p| &p.band_stats, "--output")?;

    let mut stats = params.stats;
    if let Some(n) = args.subset_size {
        stats.subset_size = n;
    }
    if let Some(seed) = args.seed {
        stats.seed = seed;
    }

    let band_stats = compute_band_stats(&store, &tile_info, &output, &stats)?;
    info!("Wrote {} statistics entries to {:?}", band_stats.len(), output);
    Ok(())
}

fn run_splits(args: SplitsArgs, params: PipelineParams) -> Result<(), AppError> {
    let paths = data_paths(&args.data)?;
    let store = resolve(args.store, paths.as_ref(), |p| &p.store, "--store")?;
    let output = resolve(args.output, paths.as_ref(), |p| &p.splits, "--output")?;

    let mut split = params.splits;
    if let Some(v) = args.train {
        split.train = v;
    }
    if let Some(v) = args.val {
        split.val = v;
    }
    if let Some(v) = args.test {
        split.test = v;
    }
    if let Some(seed) = args.seed {
        split.seed = seed;
    }

    let splits = create_splits(&store, &output, &split)?;
    info!("Wrote {} row indices to {:?}", splits.len(), output);
    Ok(())
}

fn run_rechunk(args: RechunkArgs, params: RechunkParams) -> Result<(), AppError> {
    let output = match args.output {
        Some(o) => o,
        None => sibling(&args.input, "_chunked_gzip.zarr")?,
    };
    let mut params = params;
    apply_layout(&mut params.layout, &args.layout);
    let summary = rechunk_store(&args.input, &output, &params)?;
    info!("Rechunked store has {} rows", summary.tile_count);
    Ok(())
}

fn run_merge(args: MergeArgs, params: RechunkParams) -> Result<(), AppError> {
    let tile_info_output = sibling(&args.output, "_tile_info.json")?;
    let mut params = params;
    apply_layout(&mut params.layout, &args.layout);
    let first = MergeInput {
        store: args.first,
        tile_info: args.first_tile_info,
    };
    let second = MergeInput {
        store: args.second,
        tile_info: args.second_tile_info,
    };
    let summary = merge_stores(&first, &second, &args.output, &tile_info_output, &params)?;
    info!("Number of tiles: {}", summary.tile_count);
    Ok(())
}

fn run_merge_tile_info(args: MergeTileInfoArgs) -> Result<(), AppError> {
    let count = merge_tile_info_fragments(&args.input_dir, &args.output)?;
    info!("Merged {} tile records into {:?}", count, args.output);
    Ok(())
}

fn run_post_download(args: PostDownloadArgs, params: PipelineParams) -> Result<(), AppError> {
    let mut params = params;
    if let Some(size) = args.image_size {
        if size == 0 {
            return Err(AppError::ZeroSize { size });
        }
        params.build.image_size = size;
    }
    let report = post_download(&args.data_dir, &params)?;
    if let Some(n) = report.merged_records {
        info!("Merged fragments into {} tile records", n);
    }
    log_build_report(&report.build);
    info!("Statistics entries: {}", report.band_stats.len());
    info!(
        "Splits: train={}, val={}, test={}",
        report.splits.train.len(),
        report.splits.val.len(),
        report.splits.test.len()
    );
    Ok(())
}

fn run_info(args: InfoArgs) -> Result<(), Box<dyn std::error::Error>> {
    let summary = inspect_store(&args.store)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

pub fn run(args: CliArgs) -> Result<(), Box<dyn std::error::Error>> {
    if args.log {
        init_logging();
    }

    let params: PipelineParams = match &args.params {
        Some(path) => load_params(path)?,
        None => PipelineParams::default(),
    };
    let rechunk = RechunkParams {
        layout: params.build.layout,
    };

    match args.command {
        Command::Build(a) => run_build(a, params)?,
        Command::Stats(a) => run_stats(a, params)?,
        Command::Splits(a) => run_splits(a, params)?,
        Command::Rechunk(a) => run_rechunk(a, rechunk)?,
        Command::Merge(a) => run_merge(a, rechunk)?,
        Command::MergeTileInfo(a) => run_merge_tile_info(a)?,
        Command::PostDownload(a) => run_post_download(a, params)?,
        Command::Info(a) => run_info(a)?,
    }
    Ok(())
}
