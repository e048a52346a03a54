use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "geolr", version, about = "GEOLR dataset CLI")]
pub struct CliArgs {
    /// Enable logging (RUST_LOG overrides the default `debug` level)
    #[arg(long, global = true, default_value_t = false)]
    pub log: bool,

    /// JSON parameter file; command-line options override its values
    #[arg(long, global = true)]
    pub params: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Build a dataset store from downloaded tiles
    Build(BuildArgs),
    /// Compute per-band normalization statistics for a store
    Stats(StatsArgs),
    /// Write a seeded train/val/test partition of a store's rows
    Splits(SplitsArgs),
    /// Copy a store into a new chunk layout
    Rechunk(RechunkArgs),
    /// Concatenate two stores and their tile records
    Merge(MergeArgs),
    /// Merge `tile_info_*` fragments into one tile-record file
    MergeTileInfo(MergeTileInfoArgs),
    /// Merge fragments, build, then compute statistics and splits for a data folder
    PostDownload(PostDownloadArgs),
    /// Print a summary of a store as JSON
    Info(InfoArgs),
}

/// Data folder whose default file names fill in unspecified paths
#[derive(Args)]
pub struct DataDirArg {
    /// Data folder `<dir>/<name>`
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Args)]
pub struct LayoutArgs {
    /// Rows per chunk along the leading dimension
    #[arg(long)]
    pub chunk_rows: Option<u64>,

    /// gzip compression level (0-9)
    #[arg(long)]
    pub gzip_level: Option<u32>,
}

#[derive(Args)]
pub struct BuildArgs {
    #[command(flatten)]
    pub data: DataDirArg,

    /// Directory holding `<tile_id>.tif` rasters
    #[arg(long)]
    pub raster_dir: Option<PathBuf>,

    /// Tile-record JSON file
    #[arg(long)]
    pub tile_info: Option<PathBuf>,

    /// Output store path
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Side of the square centre crop, in pixels
    #[arg(long)]
    pub image_size: Option<usize>,

    #[command(flatten)]
    pub layout: LayoutArgs,
}

#[derive(Args)]
pub struct StatsArgs {
    #[command(flatten)]
    pub data: DataDirArg,

    /// Store to read
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// Tile-record JSON file
    #[arg(long)]
    pub tile_info: Option<PathBuf>,

    /// Output statistics JSON
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Rows sampled for the heavy imagery modalities
    #[arg(long)]
    pub subset_size: Option<usize>,

    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Args)]
pub struct SplitsArgs {
    #[command(flatten)]
    pub data: DataDirArg,

    #[arg(long)]
    pub store: Option<PathBuf>,

    /// Output splits JSON
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    #[arg(long)]
    pub train: Option<f64>,

    #[arg(long)]
    pub val: Option<f64>,

    #[arg(long)]
    pub test: Option<f64>,

    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Args)]
pub struct RechunkArgs {
    /// Store to copy
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output store; defaults to `<input>_chunked_gzip.zarr` next to the input
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub layout: LayoutArgs,
}

#[derive(Args)]
pub struct MergeArgs {
    #[arg(long)]
    pub first: PathBuf,

    #[arg(long)]
    pub first_tile_info: PathBuf,

    #[arg(long)]
    pub second: PathBuf,

    #[arg(long)]
    pub second_tile_info: PathBuf,

    /// Output store; its tile records go to `<output stem>_tile_info.json`
    #[arg(short, long)]
    pub output: PathBuf,

    #[command(flatten)]
    pub layout: LayoutArgs,
}

#[derive(Args)]
pub struct MergeTileInfoArgs {
    /// Directory holding the fragments
    #[arg(long)]
    pub input_dir: PathBuf,

    #[arg(short, long)]
    pub output: PathBuf,
}

#[derive(Args)]
pub struct PostDownloadArgs {
    /// Data folder `<dir>/<name>`
    #[arg(long)]
    pub data_dir: PathBuf,

    #[arg(long)]
    pub image_size: Option<usize>,
}

#[derive(Args)]
pub struct InfoArgs {
    pub store: PathBuf,
}
