use gdal::raster::ResampleAlg;
use gdal::{Dataset, errors::GdalError as GdalCrateError};
use ndarray::{Array3, ArrayD, Axis};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors encountered when reading per-tile rasters
#[derive(Debug, Error)]
pub enum RasterError {
    #[error("GDAL error: {0}")]
    Gdal(#[from] GdalCrateError),
    #[error("Raster not found for tile {0}")]
    Missing(String),
    #[error("Unsupported raster: {0}")]
    UnsupportedFormat(String),
    #[error("Dimension mismatch: expected {0}x{1}, got {2}x{3}")]
    DimensionMismatch(usize, usize, usize, usize),
}

/// Source of stacked per-tile rasters (band axis last)
pub trait RasterSource {
    /// Number of channels in the tile's raster, without reading pixels
    fn band_count(&self, tile_id: &str) -> Result<usize, RasterError>;

    /// Full raster as `(rows, cols, bands)` or `(rows, cols)` for single-band files
    fn read(&self, tile_id: &str) -> Result<ArrayD<f64>, RasterError>;
}

/// Reads `<dir>/<tile_id>.tif` through GDAL
#[derive(Debug, Clone)]
pub struct GdalTileReader {
    pub dir: PathBuf,
}

impl GdalTileReader {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn tile_path(&self, tile_id: &str) -> PathBuf {
        self.dir.join(format!("{tile_id}.tif"))
    }

    fn open(&self, tile_id: &str) -> Result<Dataset, RasterError> {
        let path = self.tile_path(tile_id);
        if !path.is_file() {
            return Err(RasterError::Missing(tile_id.to_string()));
        }
        let dataset = Dataset::open(&path)?;
        if dataset.raster_count() == 0 {
            return Err(RasterError::UnsupportedFormat(format!(
                "{} has no raster bands",
                path.display()
            )));
        }
        Ok(dataset)
    }
}

impl RasterSource for GdalTileReader {
    fn band_count(&self, tile_id: &str) -> Result<usize, RasterError> {
        Ok(self.open(tile_id)?.raster_count() as usize)
    }

    fn read(&self, tile_id: &str) -> Result<ArrayD<f64>, RasterError> {
        let dataset = self.open(tile_id)?;
        let (size_x, size_y) = dataset.raster_size();
        let bands = dataset.raster_count() as usize;
        let mut stacked = Array3::<f64>::zeros((size_y, size_x, bands));
        for index in 1..=bands {
            let band = dataset.rasterband(index)?;
            let window = (size_x, size_y);
            let buf = band.read_as::<f64>((0, 0), window, window, Some(ResampleAlg::NearestNeighbour))?;
            let plane = ndarray::Array2::from_shape_vec((size_y, size_x), buf.data().to_vec())
                .map_err(|_| RasterError::DimensionMismatch(size_x, size_y, size_x, size_y))?;
            stacked.index_axis_mut(Axis(2), index - 1).assign(&plane);
        }
        Ok(stacked.into_dyn())
    }
}

/// In-memory rasters keyed by tile identifier, for embedding and tests
#[derive(Debug, Clone, Default)]
pub struct MemoryRasters {
    pub tiles: HashMap<String, ArrayD<f64>>,
}

impl MemoryRasters {
    pub fn insert(&mut self, tile_id: &str, raster: ArrayD<f64>) {
        self.tiles.insert(tile_id.to_string(), raster);
    }
}

impl RasterSource for MemoryRasters {
    fn band_count(&self, tile_id: &str) -> Result<usize, RasterError> {
        let raster = self
            .tiles
            .get(tile_id)
            .ok_or_else(|| RasterError::Missing(tile_id.to_string()))?;
        Ok(match raster.ndim() {
            2 => 1,
            _ => raster.shape().last().copied().unwrap_or(0),
        })
    }

    fn read(&self, tile_id: &str) -> Result<ArrayD<f64>, RasterError> {
        self.tiles
            .get(tile_id)
            .cloned()
            .ok_or_else(|| RasterError::Missing(tile_id.to_string()))
    }
}
