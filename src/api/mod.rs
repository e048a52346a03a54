//! High-level, ergonomic library API: build a dataset store from downloaded tiles,
//! derive its statistics and splits, rechunk or merge stores, and run the whole
//! post-download pipeline. Prefer these entrypoints over the low-level `core` and
//! `io` modules when integrating GEOLR.
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use ndarray::ArrayD;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::core::assemble::{TileTensors, assemble_tile};
use crate::core::params::{BuildParams, PipelineParams, RechunkParams, SplitParams, StatsParams};
use crate::core::splits::{self, Splits};
use crate::core::stats::{self, BandStatsMap};
use crate::error::{Error, Result};
use crate::io::gdal::{GdalTileReader, RasterSource};
use crate::io::store::{DatasetStore, StoreError, StoreSummary, TILE_ID_BYTES, paths_overlap};
use crate::io::tile_info::{
    TileRecord, TileRecords, index_records, merge_tile_info_fragments, read_tile_records,
    write_tile_records,
};

/// Outcome of a store build
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    /// Tile records considered
    pub total: usize,
    /// Tiles whose raster matched their manifest; rows allocated
    pub admitted: usize,
    /// Rows actually written
    pub written: usize,
    /// Raster channel count differed from the manifest
    pub mismatched: usize,
    /// Raster missing or unreadable
    pub unreadable: usize,
    /// Tile identifier wider than the metadata table's id field
    pub bad_ids: usize,
    /// Admitted tiles the assembler rejected
    pub failed: usize,
}

fn raster_channels(raster: &ArrayD<f64>) -> usize {
    match raster.ndim() {
        2 => 1,
        _ => raster.shape().last().copied().unwrap_or(0),
    }
}

/// Read-only admission pass: one flag per record, true when the raster's channel
/// count equals the manifest's summed band count and the id fits the metadata table
fn admission_pass(
    source: &dyn RasterSource,
    records: &TileRecords,
    report: &mut BuildReport,
) -> Vec<bool> {
    records
        .iter()
        .map(|(tile_id, record)| {
            if tile_id.len() > TILE_ID_BYTES {
                warn!(
                    "Skipping tile {}: id longer than {} bytes",
                    tile_id, TILE_ID_BYTES
                );
                report.bad_ids += 1;
                return false;
            }
            let expected = record.expected_channels();
            match source.band_count(tile_id) {
                Ok(found) if found == expected => true,
                Ok(found) => {
                    warn!(
                        "Tile shape mismatch: {} has {} channels, manifest lists {}",
                        tile_id, found, expected
                    );
                    report.mismatched += 1;
                    false
                }
                Err(e) => {
                    debug!("Skipping tile {}: {}", tile_id, e);
                    report.unreadable += 1;
                    false
                }
            }
        })
        .collect()
}

/// Build a store at `output` from `records`, reading rasters from `source`.
/// Recoverable per-tile problems are counted in the report; a disagreement between
/// assembled tensors and the store's arrays aborts the build.
pub fn build_store(
    source: &dyn RasterSource,
    records: &TileRecords,
    output: &Path,
    params: &BuildParams,
) -> Result<BuildReport> {
    if params.image_size == 0 {
        return Err(Error::ZeroSize { size: 0 });
    }
    let mut report = BuildReport {
        total: records.len(),
        ..Default::default()
    };

    let admitted = admission_pass(source, records, &mut report);
    report.admitted = admitted.iter().filter(|a| **a).count();
    info!("Number of tiles: {}", report.admitted);
    info!("Number of entries in tile info: {}", report.total);
    info!(
        "Number of tiles skipped: {} mismatched, {} unreadable, {} bad ids",
        report.mismatched, report.unreadable, report.bad_ids
    );

    let store = DatasetStore::create(output, report.admitted, params.image_size, &params.layout)?;

    let mut j = 0;
    for (i, ((tile_id, record), _)) in records
        .iter()
        .zip(&admitted)
        .enumerate()
        .filter(|(_, (_, ok))| **ok)
    {
        if j == report.admitted {
            break;
        }
        debug!("Processing tile {}/{}, {}", i + 1, report.total, tile_id);

        let raster = match source.read(tile_id) {
            Ok(r) => r,
            Err(e) => {
                warn!("Skipping tile {}: {}", tile_id, e);
                report.failed += 1;
                continue;
            }
        };
        let channels = raster_channels(&raster);
        if channels != record.expected_channels() {
            warn!("Skipping tile {}: channel count changed to {}", tile_id, channels);
            report.failed += 1;
            continue;
        }
        let tensors = match assemble_tile(tile_id, record, raster, params.image_size) {
            Ok(t) => t,
            Err(e) => {
                warn!("Skipping tile {}: {}", tile_id, e);
                report.failed += 1;
                continue;
            }
        };

        write_row(&store, j, tile_id, record, &tensors)?;
        j += 1;
    }
    report.written = j;

    if report.written < report.admitted {
        warn!(
            "{} allocated rows were left at their fill values",
            report.admitted - report.written
        );
    }
    info!(
        "Done! {} of {} tiles written to {:?}",
        report.written, report.total, output
    );
    Ok(report)
}

/// Write one assembled tile at `row`. Tensors that do not match the store's
/// arrays are a schema mismatch and fatal for the build.
fn write_row(
    store: &DatasetStore,
    row: usize,
    tile_id: &str,
    record: &TileRecord,
    tensors: &TileTensors,
) -> Result<()> {
    match store.write_tile(row, tile_id, record.s2_type, tensors) {
        Ok(()) => Ok(()),
        Err(StoreError::MissingArray(modality) | StoreError::MissingTensor(modality)) => {
            error!("Error in modality: {} (tile {})", modality, tile_id);
            Err(Error::SchemaMismatch { modality })
        }
        Err(e) => Err(e.into()),
    }
}

/// Refuse an output that would replace or nest inside one of the inputs
fn check_output(output: &Path, inputs: &[&Path]) -> Result<()> {
    if inputs.iter().any(|input| paths_overlap(output, input)) {
        return Err(Error::InvalidArgument {
            arg: "output",
            value: output.display().to_string(),
        });
    }
    Ok(())
}

/// [`build_store`] over GeoTIFFs in `raster_dir` and a tile-record JSON file
pub fn build_store_from_dir(
    raster_dir: &Path,
    tile_info: &Path,
    output: &Path,
    params: &BuildParams,
) -> Result<BuildReport> {
    let records = read_tile_records(tile_info)?;
    let reader = GdalTileReader::new(raster_dir);
    build_store(&reader, &records, output, params)
}

/// Compute band statistics for the store at `store_path` and write them to `output`.
/// Nothing is written when the computation fails.
pub fn compute_band_stats(
    store_path: &Path,
    tile_info: &Path,
    output: &Path,
    params: &StatsParams,
) -> Result<BandStatsMap> {
    let store = DatasetStore::open(store_path)?;
    let records = read_tile_records(tile_info)?;
    let band_stats = stats::compute_band_stats(&store, &records, params)?;
    stats::write_band_stats(output, &band_stats)?;
    info!("Band statistics written to {:?}", output);
    Ok(band_stats)
}

/// Partition the rows of the store at `store_path` and write the splits to `output`
pub fn create_splits(store_path: &Path, output: &Path, params: &SplitParams) -> Result<Splits> {
    let store = DatasetStore::open(store_path)?;
    let splits = splits::create_splits(store.rows(), params)?;
    splits::write_splits(output, &splits)?;
    Ok(splits)
}

/// Copy a store into `output` with a new chunk layout; content is unchanged
pub fn rechunk_store(input: &Path, output: &Path, params: &RechunkParams) -> Result<StoreSummary> {
    check_output(output, &[input])?;
    let source = DatasetStore::open(input)?;
    let target = DatasetStore::create_like(output, &source, &params.layout)?;
    target.copy_rows_from(&source, 0, params.layout.chunk_rows as usize)?;
    info!(
        "Rechunked {} rows from {:?} into {:?}",
        source.rows(),
        input,
        output
    );
    Ok(target.summary())
}

/// One side of a store merge
#[derive(Debug, Clone)]
pub struct MergeInput {
    pub store: PathBuf,
    pub tile_info: PathBuf,
}

/// Append the tile record of every written row of `store`, in row order
fn records_for_rows(
    store: &DatasetStore,
    records: &TileRecords,
    seen: &mut HashSet<String>,
    merged: &mut TileRecords,
) -> Result<()> {
    let index: HashMap<&str, &TileRecord> = index_records(records);
    for meta in store.metadata_rows(1024)? {
        if meta.tile_id.is_empty() {
            continue;
        }
        let record = index
            .get(meta.tile_id.as_str())
            .ok_or_else(|| Error::UnknownTile {
                tile_id: meta.tile_id.clone(),
            })?;
        if seen.insert(meta.tile_id.clone()) {
            merged.push((meta.tile_id, (*record).clone()));
        }
    }
    Ok(())
}

/// Concatenate two stores (rows of `first`, then `second`) into `output` and write
/// the matching tile records to `tile_info_output`
pub fn merge_stores(
    first: &MergeInput,
    second: &MergeInput,
    output: &Path,
    tile_info_output: &Path,
    params: &RechunkParams,
) -> Result<StoreSummary> {
    let a = DatasetStore::open(&first.store)?;
    let b = DatasetStore::open(&second.store)?;
    if a.image_size() != b.image_size() {
        return Err(Error::Processing(format!(
            "cannot merge stores with image sizes {} and {}",
            a.image_size(),
            b.image_size()
        )));
    }
    check_output(output, &[first.store.as_path(), second.store.as_path()])?;

    // resolve records before touching the output
    let mut seen = HashSet::new();
    let mut merged = TileRecords::new();
    records_for_rows(&a, &read_tile_records(&first.tile_info)?, &mut seen, &mut merged)?;
    records_for_rows(&b, &read_tile_records(&second.tile_info)?, &mut seen, &mut merged)?;

    let rows = a.rows() + b.rows();
    let target = DatasetStore::create(output, rows, a.image_size(), &params.layout)?;
    let block = params.layout.chunk_rows as usize;
    target.copy_rows_from(&a, 0, block)?;
    target.copy_rows_from(&b, a.rows(), block)?;
    write_tile_records(tile_info_output, &merged)?;

    info!(
        "Merged {} + {} rows into {:?} ({} tile records)",
        a.rows(),
        b.rows(),
        output,
        merged.len()
    );
    Ok(target.summary())
}

/// Default file locations for a data folder `<dir>/<name>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetPaths {
    pub root: PathBuf,
    pub name: String,
    pub store: PathBuf,
    pub tile_info: PathBuf,
    pub band_stats: PathBuf,
    pub splits: PathBuf,
    /// Downloaded rasters, `<tile_id>.tif`
    pub rasters: PathBuf,
    /// Per-job `tile_info_*.json` fragments
    pub fragments: PathBuf,
}

impl DatasetPaths {
    pub fn from_data_dir(dir: &Path) -> Result<Self> {
        let name = dir
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::InvalidArgument {
                arg: "data_dir",
                value: dir.display().to_string(),
            })?
            .to_string();
        Ok(Self {
            root: dir.to_path_buf(),
            store: dir.join(format!("{name}.zarr")),
            tile_info: dir.join(format!("{name}_tile_info.json")),
            band_stats: dir.join(format!("{name}_band_stats.json")),
            splits: dir.join(format!("{name}_splits.json")),
            rasters: dir.join("merged"),
            fragments: dir.join("tile_info"),
            name,
        })
    }
}

/// Everything the post-download pipeline produced
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// Records merged from fragments, when a fragment directory was present
    pub merged_records: Option<usize>,
    pub build: BuildReport,
    pub band_stats: BandStatsMap,
    pub splits: Splits,
}

/// Merge tile-record fragments (when present), build the store, then derive its
/// statistics and splits, all at the default paths of `data_dir`
pub fn post_download_with_source(
    paths: &DatasetPaths,
    source: &dyn RasterSource,
    params: &PipelineParams,
) -> Result<PipelineReport> {
    let merged_records = if paths.fragments.is_dir() {
        info!("Merging tile info fragments from {:?}", paths.fragments);
        Some(merge_tile_info_fragments(&paths.fragments, &paths.tile_info)?)
    } else {
        None
    };

    info!("Building store {:?}", paths.store);
    let records = read_tile_records(&paths.tile_info)?;
    let build = build_store(source, &records, &paths.store, &params.build)?;

    info!("Computing band stats");
    let band_stats =
        compute_band_stats(&paths.store, &paths.tile_info, &paths.band_stats, &params.stats)?;

    info!("Computing splits");
    let splits = create_splits(&paths.store, &paths.splits, &params.splits)?;

    Ok(PipelineReport {
        merged_records,
        build,
        band_stats,
        splits,
    })
}

/// [`post_download_with_source`] reading GeoTIFFs from `<data_dir>/merged`
pub fn post_download(data_dir: &Path, params: &PipelineParams) -> Result<PipelineReport> {
    let paths = DatasetPaths::from_data_dir(data_dir)?;
    let reader = GdalTileReader::new(&paths.rasters);
    post_download_with_source(&paths, &reader, params)
}

pub fn inspect_store(path: &Path) -> Result<StoreSummary> {
    Ok(DatasetStore::open(path)?.summary())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{DESCRIPTORS, Modality};
    use crate::io::store::StoreLayout;
    use crate::types::TileTensor;
    use ndarray::IxDyn;

    fn record() -> TileRecord {
        serde_json::from_str(
            r#"{"S2_DATE": "2020-01-01", "lat": 0.0, "lon": 0.0, "biome": 0, "eco_region": 0}"#,
        )
        .unwrap()
    }

    #[test]
    fn a_missing_modality_is_a_schema_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let store =
            DatasetStore::create(&dir.path().join("ds.zarr"), 1, 2, &StoreLayout::default())
                .unwrap();
        let mut tensors: TileTensors = DESCRIPTORS
            .iter()
            .map(|d| {
                let data = ArrayD::from_elem(IxDyn(&d.row_shape(2)), 1.0);
                (d.modality, TileTensor::from_f64(d.element, data))
            })
            .collect();
        tensors.remove(&Modality::Aster);

        let err = write_row(&store, 0, "t0", &record(), &tensors).unwrap_err();
        assert!(matches!(err, Error::SchemaMismatch { ref modality } if modality == "aster"));
        assert_eq!(store.read_metadata(0).unwrap().tile_id, "");
    }

    #[test]
    fn dataset_paths_follow_the_folder_name() {
        let paths = DatasetPaths::from_data_dir(Path::new("/data/run_1M/")).unwrap();
        assert_eq!(paths.name, "run_1M");
        assert_eq!(paths.store, Path::new("/data/run_1M/run_1M.zarr"));
        assert_eq!(paths.tile_info, Path::new("/data/run_1M/run_1M_tile_info.json"));
        assert_eq!(paths.band_stats, Path::new("/data/run_1M/run_1M_band_stats.json"));
        assert_eq!(paths.splits, Path::new("/data/run_1M/run_1M_splits.json"));
        assert_eq!(paths.rasters, Path::new("/data/run_1M/merged"));
        assert!(DatasetPaths::from_data_dir(Path::new("/")).is_err());
    }
}
