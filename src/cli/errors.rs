use thiserror::Error;

/// Application-specific errors for the CLI
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Missing required argument: {arg} (or pass --data-dir)")]
    MissingArgument { arg: String },

    #[error("Size must be greater than 0, got: {size}")]
    ZeroSize { size: usize },

    #[error("Cannot derive a default output path from {path}")]
    NoDefaultOutput { path: String },

    #[error(transparent)]
    Library(#[from] geolr::Error),
}
