use ndarray::{Array3, ArrayD, Axis, Ix3, s};
use tracing::debug;

use crate::core::assemble::AssembleError;

/// View a raw raster as `(rows, cols, bands)`; 2-D rasters become a single trailing band
pub fn as_band_last(raster: ArrayD<f64>) -> Result<Array3<f64>, AssembleError> {
    let raster = match raster.ndim() {
        2 => raster.insert_axis(Axis(2)),
        3 => raster,
        n => return Err(AssembleError::RasterRank(n)),
    };
    raster
        .into_dimensionality::<Ix3>()
        .map_err(|e| AssembleError::Shape(e.to_string()))
}

/// Centre-crop both spatial axes to `size`.
/// Offsets are `(dim - size) / 2`, so odd margins leave the extra pixel at the end.
pub fn center_crop(raster: &Array3<f64>, size: usize) -> Result<Array3<f64>, AssembleError> {
    let (rows, cols, _) = raster.dim();
    if rows < size || cols < size {
        return Err(AssembleError::TooSmall { rows, cols, size });
    }
    let start_r = (rows - size) / 2;
    let start_c = (cols - size) / 2;

    debug!(
        "Cropping: rows={}, cols={}, start_r={}, start_c={}, size={}",
        rows, cols, start_r, start_c, size
    );

    Ok(raster
        .slice(s![start_r..start_r + size, start_c..start_c + size, ..])
        .to_owned())
}
