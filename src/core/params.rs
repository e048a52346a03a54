use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::io::store::StoreLayout;

/// Store build parameters suitable for config files
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildParams {
    /// Side of the square centre crop, in pixels
    pub image_size: usize,
    pub layout: StoreLayout,
}

impl Default for BuildParams {
    fn default() -> Self {
        Self {
            image_size: 128,
            layout: StoreLayout::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsParams {
    /// Upper bound on rows sampled for the heavy imagery modalities
    pub subset_size: usize,
    pub seed: u64,
}

impl Default for StatsParams {
    fn default() -> Self {
        Self {
            subset_size: 100_000,
            seed: 0,
        }
    }
}

/// Split fractions; they must sum to one
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitParams {
    pub train: f64,
    pub val: f64,
    pub test: f64,
    pub seed: u64,
}

impl Default for SplitParams {
    fn default() -> Self {
        Self {
            train: 1.0,
            val: 0.0,
            test: 0.0,
            seed: 0,
        }
    }
}

/// Layout of a rechunked or merged store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RechunkParams {
    pub layout: StoreLayout,
}

/// Every stage of the post-download pipeline, as one config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineParams {
    pub build: BuildParams,
    pub stats: StatsParams,
    pub splits: SplitParams,
}

/// Load parameters from a JSON file; missing fields take their defaults
pub fn load_params<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}
