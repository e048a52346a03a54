#![doc = r#"
GEOLR — assemble multi-modal Earth-observation tiles into a chunked array dataset.

This crate turns per-tile raster downloads (a band-stacked GeoTIFF per tile plus a JSON
map of tile records) into a single Zarr store with one fixed-shape array per modality,
then derives per-band normalization statistics and train/val/test splits from it. It
powers the GEOLR CLI and can be embedded in your own Rust applications.

Stability
---------
The public library API is experimental in initial releases and may evolve. Breaking
changes can occur.

Requirements
------------
- GDAL development headers and runtime available on your system.
- Rust 2024 edition toolchain.

Dataset layout
--------------
Every array in a store shares its leading dimension: row `i` of each modality array and
of the `metadata` table describe the same tile. Modalities, their storage types, band
lists and no-data values are declared once in [`core::schema::DESCRIPTORS`]. Bands a tile
never retrieved are filled with the modality's no-data value, so arrays are never ragged.

Quick start: the post-download pipeline
---------------------------------------
```rust,no_run
use std::path::Path;
use geolr::{post_download, PipelineParams};

fn main() -> geolr::Result<()> {
    // expects /data/run_1M/merged/<tile_id>.tif and /data/run_1M/run_1M_tile_info.json
    let report = post_download(Path::new("/data/run_1M"), &PipelineParams::default())?;
    println!(
        "{} of {} tiles written, {} mismatched",
        report.build.written, report.build.total, report.build.mismatched
    );
    Ok(())
}
```

Step by step
------------
```rust,no_run
use std::path::Path;
use geolr::{build_store_from_dir, compute_band_stats, BuildParams, StatsParams};

fn main() -> geolr::Result<()> {
    let params = BuildParams { image_size: 64, ..Default::default() };
    build_store_from_dir(
        Path::new("/data/run/merged"),
        Path::new("/data/run/run_tile_info.json"),
        Path::new("/data/run/run.zarr"),
        &params,
    )?;
    let stats = compute_band_stats(
        Path::new("/data/run/run.zarr"),
        Path::new("/data/run/run_tile_info.json"),
        Path::new("/data/run/run_band_stats.json"),
        &StatsParams::default(),
    )?;
    println!("{:?}", stats.get("sentinel2_l2a").map(|s| &s.mean));
    Ok(())
}
```

Reading a store
---------------
```rust,no_run
use std::path::Path;
use geolr::{DatasetStore, Modality};

fn main() -> geolr::Result<()> {
    let store = DatasetStore::open(Path::new("/data/run/run.zarr"))?;
    for row in 0..store.rows() {
        let meta = store.read_metadata(row)?;
        let s2 = store.read_tensor(Modality::Sentinel2, row)?;
        println!("{} {:?} {:?}", meta.tile_id, meta.mode(), s2.shape());
    }
    Ok(())
}
```

Error handling
--------------
All fallible APIs return `geolr::Result<T>`. Per-tile problems during a build (missing
rasters, channel-count mismatches, tiles the assembler rejects) are counted in
[`BuildReport`] rather than raised.

```rust,no_run
use std::path::Path;
use geolr::{compute_band_stats, Error, StatsParams};

fn main() {
    let out = compute_band_stats(
        Path::new("/data/run/run.zarr"),
        Path::new("/data/run/run_tile_info.json"),
        Path::new("/data/run/run_band_stats.json"),
        &StatsParams::default(),
    );
    match out {
        Ok(_) => {}
        Err(Error::StatisticsOverflow { modality, row }) => {
            eprintln!("{modality} overflowed at row {row}")
        }
        Err(other) => eprintln!("Other error: {other}"),
    }
}
```

Useful modules
--------------
- [`api`] — high-level, ergonomic entry points.
- [`core`] — modality registry, tile assembler, statistics and splits.
- [`io`] — GDAL tile reader, tile-record JSON and the Zarr store.
- [`types`] — element types, imaging modes and `TileTensor`.
- [`error`] — crate-level `Error` and `Result`.
"#]

// Core modules (public)
pub mod api;
pub mod core;
pub mod error;
pub mod io;
pub mod types;

// Curated public API surface
// Types
pub use core::params::{BuildParams, PipelineParams, RechunkParams, SplitParams, StatsParams};
pub use core::schema::{Modality, ModalityDescriptor, StackGroup, StatsPolicy};
pub use core::splits::Splits;
pub use core::stats::{BandStats, BandStatsMap};
pub use error::{Error, Result};
pub use types::{ElementType, ImagingMode, TileTensor};

// Readers and store
pub use io::gdal::{GdalTileReader, MemoryRasters, RasterError, RasterSource};
pub use io::store::{DatasetStore, MetadataRow, StoreError, StoreLayout, StoreSummary};
pub use io::tile_info::{TileRecord, TileRecords, WeatherStats};

// High-level API re-exports
pub use api::{
    BuildReport, DatasetPaths, MergeInput, PipelineReport, build_store, build_store_from_dir,
    compute_band_stats, create_splits, inspect_store, merge_stores, post_download,
    post_download_with_source, rechunk_store,
};
