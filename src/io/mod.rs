//! I/O layer: GDAL-backed tile rasters, tile-record JSON and the Zarr dataset store.
pub mod gdal;
pub use gdal::{GdalTileReader, MemoryRasters, RasterError, RasterSource};

pub mod tile_info;
pub use tile_info::{TileRecord, TileRecords, WeatherStats};

pub mod store;
pub use store::{DatasetStore, StoreError, StoreLayout, StoreSummary, paths_overlap};
