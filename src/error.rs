//! Crate-level error type and `Result` alias for stable, structured error handling.
//! Converts underlying I/O, JSON, raster, store and assembler errors, and provides
//! semantic variants for argument validation and the fatal statistics/schema cases.
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Raster error: {0}")]
    Raster(#[from] crate::io::RasterError),

    #[error("Store error: {0}")]
    Store(#[from] crate::io::StoreError),

    #[error("Assembler error: {0}")]
    Assemble(#[from] crate::core::assemble::AssembleError),

    #[error("Invalid argument: {arg}={value}")]
    InvalidArgument { arg: &'static str, value: String },

    #[error("Size must be greater than 0, got: {size}")]
    ZeroSize { size: usize },

    #[error("Assembled tensors and store arrays disagree on modality `{modality}`")]
    SchemaMismatch { modality: String },

    #[error(
        "Sum of squares overflowed for `{modality}` at row {row}; statistics cannot be computed"
    )]
    StatisticsOverflow { modality: String, row: usize },

    #[error("Tile `{tile_id}` is not present in the tile records")]
    UnknownTile { tile_id: String },

    #[error("Processing error: {0}")]
    Processing(String),
}
