//! Streaming per-band statistics over a finished store.
//!
//! Rows are read one at a time, so memory use is bounded by a single tile. No-data
//! sentinels and NaN values are masked in every policy. The sampled policies draw
//! row indices with replacement from an RNG reseeded for every modality, so repeated
//! runs over the same store see identical rows.
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use ndarray::{ArrayD, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::params::StatsParams;
use crate::core::schema::{DESCRIPTORS, ModalityDescriptor, StatsPolicy};
use crate::error::{Error, Result};
use crate::io::store::DatasetStore;
use crate::io::tile_info::{TileRecords, index_records};
use crate::types::ImagingMode;

/// Largest running sum of squares accepted before the run is aborted
pub const MAX_SUM_OF_SQUARES: f64 = 1.7e308;

/// Per-channel statistics; channels without a single valid value are `null`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandStats {
    pub mean: Vec<Option<f64>>,
    pub std: Vec<Option<f64>>,
    pub min: Vec<Option<f64>>,
    pub max: Vec<Option<f64>>,
}

/// Statistics keyed by modality name, with `_l1c`/`_l2a` entries for mode-split modalities
pub type BandStatsMap = BTreeMap<String, BandStats>;

#[derive(Debug, Clone)]
struct ChannelAccumulator {
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
    count: Vec<u64>,
    min: Vec<f64>,
    max: Vec<f64>,
}

impl ChannelAccumulator {
    fn new(channels: usize) -> Self {
        Self {
            sum: vec![0.0; channels],
            sum_sq: vec![0.0; channels],
            count: vec![0; channels],
            min: vec![f64::INFINITY; channels],
            max: vec![f64::NEG_INFINITY; channels],
        }
    }

    /// Add every valid element of a `(channels, ...)` row
    fn add_row(&mut self, row: &ArrayD<f64>, desc: &ModalityDescriptor) {
        for (c, plane) in row.axis_iter(Axis(0)).enumerate() {
            for &v in plane.iter().filter(|v| !desc.is_no_data(**v)) {
                self.sum[c] += v;
                self.sum_sq[c] += v * v;
                self.count[c] += 1;
                self.min[c] = self.min[c].min(v);
                self.max[c] = self.max[c].max(v);
            }
        }
    }

    /// Accumulate squared deviations from `mean` into `sum_sq`
    fn add_deviations(&mut self, row: &ArrayD<f64>, desc: &ModalityDescriptor, mean: &[f64]) {
        for (c, plane) in row.axis_iter(Axis(0)).enumerate() {
            for &v in plane.iter().filter(|v| !desc.is_no_data(**v)) {
                let d = v - mean[c];
                self.sum_sq[c] += d * d;
            }
        }
    }

    fn overflowed(&self) -> bool {
        self.sum_sq.iter().any(|s| *s > MAX_SUM_OF_SQUARES)
    }

    fn means(&self) -> Vec<f64> {
        self.sum
            .iter()
            .zip(&self.count)
            .map(|(s, n)| if *n == 0 { 0.0 } else { s / *n as f64 })
            .collect()
    }

    /// Population statistics; `centred` means `sum_sq` already holds squared deviations
    fn finish(&self, centred: bool) -> BandStats {
        let channels = self.count.len();
        let mut stats = BandStats {
            mean: Vec::with_capacity(channels),
            std: Vec::with_capacity(channels),
            min: Vec::with_capacity(channels),
            max: Vec::with_capacity(channels),
        };
        for c in 0..channels {
            if self.count[c] == 0 {
                stats.mean.push(None);
                stats.std.push(None);
                stats.min.push(None);
                stats.max.push(None);
                continue;
            }
            let n = self.count[c] as f64;
            let mean = self.sum[c] / n;
            let var = if centred {
                self.sum_sq[c] / n
            } else {
                self.sum_sq[c] / n - mean * mean
            };
            stats.mean.push(Some(mean));
            // rounding can push a zero variance slightly negative
            stats.std.push(Some(var.max(0.0).sqrt()));
            stats.min.push(Some(self.min[c]));
            stats.max.push(Some(self.max[c]));
        }
        stats
    }
}

fn overflow(desc: &ModalityDescriptor, row: usize) -> Error {
    Error::StatisticsOverflow {
        modality: desc.modality.name().to_string(),
        row,
    }
}

/// Every row, twice: sums and extrema first, then squared deviations from the mean
fn full_pass(store: &DatasetStore, desc: &ModalityDescriptor) -> Result<BandStats> {
    let mut acc = ChannelAccumulator::new(desc.n_bands);
    for row in 0..store.rows() {
        let data = store.read_tensor(desc.modality, row)?.to_f64();
        acc.add_row(&data, desc);
    }
    let mean = acc.means();
    acc.sum_sq.iter_mut().for_each(|s| *s = 0.0);
    for row in 0..store.rows() {
        let data = store.read_tensor(desc.modality, row)?.to_f64();
        acc.add_deviations(&data, desc, &mean);
        if acc.overflowed() {
            return Err(overflow(desc, row));
        }
    }
    Ok(acc.finish(true))
}

/// Row indices drawn uniformly with replacement from a freshly seeded RNG
pub fn sample_rows(rows: usize, subset_size: usize, seed: u64) -> Vec<usize> {
    if rows == 0 {
        return Vec::new();
    }
    let mut rng = StdRng::seed_from_u64(seed);
    (0..subset_size.min(rows))
        .map(|_| rng.gen_range(0..rows))
        .collect()
}

/// Sampled single-pass accumulation.
/// With `modes`, sampled rows are also accumulated per imaging mode.
fn subset_pass(
    store: &DatasetStore,
    desc: &ModalityDescriptor,
    params: &StatsParams,
    modes: Option<&[Option<ImagingMode>]>,
) -> Result<Vec<(String, BandStats)>> {
    let indices = sample_rows(store.rows(), params.subset_size, params.seed);
    debug!(
        "Sampling {} of {} rows for {}",
        indices.len(),
        store.rows(),
        desc.modality
    );

    let mut combined = ChannelAccumulator::new(desc.n_bands);
    let mut by_mode: BTreeMap<ImagingMode, ChannelAccumulator> = ImagingMode::ALL
        .into_iter()
        .map(|m| (m, ChannelAccumulator::new(desc.n_bands)))
        .collect();

    for &row in &indices {
        let data = store.read_tensor(desc.modality, row)?.to_f64();
        combined.add_row(&data, desc);
        if combined.overflowed() {
            return Err(overflow(desc, row));
        }
        let Some(modes) = modes else { continue };
        if let Some(acc) = modes
            .get(row)
            .copied()
            .flatten()
            .and_then(|m| by_mode.get_mut(&m))
        {
            acc.add_row(&data, desc);
            if acc.overflowed() {
                return Err(overflow(desc, row));
            }
        }
    }

    let name = desc.modality.name();
    let mut out = vec![(name.to_string(), combined.finish(false))];
    if modes.is_some() {
        for (mode, acc) in &by_mode {
            out.push((format!("{name}_{mode}"), acc.finish(false)));
        }
    }
    Ok(out)
}

/// Imaging mode of every row: the tile record's `S2_type` when the tile is known,
/// otherwise the tag stored in the metadata table
fn row_modes(store: &DatasetStore, records: &TileRecords) -> Result<Vec<Option<ImagingMode>>> {
    let index = index_records(records);
    let mut unknown = 0usize;
    let modes = store
        .metadata_rows(1024)?
        .into_iter()
        .map(|meta| match index.get(meta.tile_id.as_str()) {
            Some(record) => record.s2_type,
            None => {
                unknown += 1;
                meta.mode()
            }
        })
        .collect();
    if unknown > 0 {
        warn!(
            "{} stored tiles have no tile record; using their stored mode tags",
            unknown
        );
    }
    Ok(modes)
}

/// Compute statistics for every modality whose policy is not `Skip`
pub fn compute_band_stats(
    store: &DatasetStore,
    records: &TileRecords,
    params: &StatsParams,
) -> Result<BandStatsMap> {
    info!("Computing band statistics over {} rows", store.rows());
    let mut modes: Option<Vec<Option<ImagingMode>>> = None;
    let mut out = BandStatsMap::new();

    for desc in DESCRIPTORS.iter() {
        let entries = match desc.stats {
            StatsPolicy::Skip => continue,
            StatsPolicy::FullPass => {
                vec![(desc.modality.name().to_string(), full_pass(store, desc)?)]
            }
            StatsPolicy::Subset => subset_pass(store, desc, params, None)?,
            StatsPolicy::SubsetByMode => {
                if modes.is_none() {
                    modes = Some(row_modes(store, records)?);
                }
                subset_pass(store, desc, params, modes.as_deref())?
            }
        };
        for (name, stats) in entries {
            debug!("{}: mean={:?}", name, stats.mean);
            out.insert(name, stats);
        }
        info!("Statistics computed for {}", desc.modality);
    }
    Ok(out)
}

pub fn write_band_stats(path: &Path, stats: &BandStatsMap) -> Result<()> {
    let file = fs::File::create(path)?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), stats)?;
    Ok(())
}

pub fn read_band_stats(path: &Path) -> Result<BandStatsMap> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::Modality;
    use ndarray::IxDyn;

    fn row(values: &[f64]) -> ArrayD<f64> {
        ArrayD::from_shape_vec(IxDyn(&[values.len()]), values.to_vec()).unwrap()
    }

    #[test]
    fn sentinels_and_nan_are_masked() {
        let desc = Modality::Lat.descriptor();
        let mut acc = ChannelAccumulator::new(2);
        acc.add_row(&row(&[1.0, f64::NEG_INFINITY]), desc);
        acc.add_row(&row(&[3.0, f64::NAN]), desc);
        let stats = acc.finish(false);
        assert_eq!(stats.mean, vec![Some(2.0), None]);
        assert_eq!(stats.std[0], Some(1.0));
        assert_eq!(stats.min[0], Some(1.0));
        assert_eq!(stats.max[0], Some(3.0));
    }

    #[test]
    fn overflow_is_detected() {
        let desc = Modality::Sentinel1.descriptor();
        let mut acc = ChannelAccumulator::new(1);
        acc.add_row(&row(&[1e200]), desc);
        assert!(acc.overflowed());
    }

    #[test]
    fn sampling_is_reproducible_and_bounded() {
        let a = sample_rows(50, 20, 0);
        assert_eq!(a, sample_rows(50, 20, 0));
        assert_eq!(a.len(), 20);
        assert!(a.iter().all(|i| *i < 50));
        assert_eq!(sample_rows(5, 100, 0).len(), 5);
        assert!(sample_rows(0, 100, 0).is_empty());
    }
}
