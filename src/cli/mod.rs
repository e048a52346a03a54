//! Command Line Interface (CLI) layer for GEOLR.
//!
//! This module defines argument parsing (`args`), error types (`errors`),
//! and the orchestration logic (`runner`) for every subcommand. It wires
//! user-provided options and `--params` files to the library functionality
//! exposed via `geolr::api`.
//!
//! If you are embedding GEOLR into another application, prefer using
//! the high-level `geolr::api` module instead of calling the CLI code.
pub mod args;
pub mod errors;
pub mod runner;

pub use args::CliArgs;
pub use runner::run;
