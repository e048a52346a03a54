//! Core building blocks: the modality registry, tile assembly, statistics and
//! splits. These are internal primitives consumed by the high-level `api` module.
pub mod assemble;
pub mod crop;
pub mod params;
pub mod schema;
pub mod splits;
pub mod stats;
