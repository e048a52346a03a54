//! Tile records written by the acquisition step: one JSON object keyed by tile identifier.
//! Also merges the per-job `tile_info_*.json` fragments into a single map.
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::schema::StackGroup;
use crate::error::{Error, Result};
use crate::types::ImagingMode;

/// Weather aggregates sampled at the tile centre; `null` where the pixel had no data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherStats {
    /// previous month: avg/min/max temperature, total precipitation
    pub month1: Vec<Option<f64>>,
    /// acquisition month, same layout
    pub month2: Vec<Option<f64>>,
    /// trailing year, same layout
    pub year: Vec<Option<f64>>,
}

impl WeatherStats {
    /// All twelve values in storage order, NaN for missing ones
    pub fn flatten(&self) -> Vec<f64> {
        self.month1
            .iter()
            .chain(&self.month2)
            .chain(&self.year)
            .map(|v| v.unwrap_or(f64::NAN))
            .collect()
    }
}

/// Per-tile record produced by the acquisition step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileRecord {
    #[serde(rename = "S2_DATE")]
    pub s2_date: String,
    #[serde(rename = "S2_type", default)]
    pub s2_type: Option<ImagingMode>,
    #[serde(rename = "CRS", default, skip_serializing_if = "Option::is_none")]
    pub crs: Option<String>,
    pub lat: f64,
    pub lon: f64,
    pub biome: usize,
    pub eco_region: usize,
    #[serde(rename = "NO_DATA", default)]
    pub no_data: bool,
    /// Band names actually retrieved, per stack group; `null` means none
    #[serde(rename = "BANDS", default)]
    pub bands: HashMap<String, Option<Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub era5: Option<WeatherStats>,
}

impl TileRecord {
    /// Bands listed for a stack group, empty when absent
    pub fn group_bands(&self, group: StackGroup) -> &[String] {
        match self.bands.get(group.key()) {
            Some(Some(bands)) => bands,
            _ => &[],
        }
    }

    /// Number of raster channels the manifest accounts for
    pub fn expected_channels(&self) -> usize {
        StackGroup::ORDER
            .iter()
            .map(|g| self.group_bands(*g).len())
            .sum()
    }

    /// Acquisition month (1-12) parsed from `S2_DATE`
    pub fn month(&self) -> Result<u32> {
        // Dates may carry a time suffix; only the calendar day matters
        let day = self.s2_date.get(..10).unwrap_or(&self.s2_date);
        NaiveDate::parse_from_str(day, "%Y-%m-%d")
            .map(|d| d.month())
            .map_err(|_| Error::InvalidArgument {
                arg: "S2_DATE",
                value: self.s2_date.clone(),
            })
    }
}

/// Tile records keyed by identifier, in file order
pub type TileRecords = Vec<(String, TileRecord)>;

/// Read a tile-record JSON map, keeping the file's key order
pub fn read_tile_records(path: &Path) -> Result<TileRecords> {
    let text = fs::read_to_string(path)?;
    // relies on serde_json's `preserve_order` so the map keeps file order
    let raw: serde_json::Value = serde_json::from_str(&text)?;
    let object = raw.as_object().ok_or_else(|| {
        Error::Processing(format!("{} is not a JSON object", path.display()))
    })?;
    let mut records = Vec::with_capacity(object.len());
    for (tile_id, value) in object {
        let record: TileRecord = serde_json::from_value(value.clone())?;
        records.push((tile_id.clone(), record));
    }
    debug!("Loaded {} tile records from {:?}", records.len(), path);
    Ok(records)
}

/// Write records as one JSON object, keys in slice order
pub fn write_tile_records(path: &Path, records: &[(String, TileRecord)]) -> Result<()> {
    let mut object = serde_json::Map::with_capacity(records.len());
    for (tile_id, record) in records {
        object.insert(tile_id.clone(), serde_json::to_value(record)?);
    }
    let file = fs::File::create(path)?;
    serde_json::to_writer(std::io::BufWriter::new(file), &object)?;
    Ok(())
}

/// Index records by identifier for lookups
pub fn index_records(records: &TileRecords) -> HashMap<&str, &TileRecord> {
    records.iter().map(|(id, r)| (id.as_str(), r)).collect()
}

/// Merge every `tile_info_*` fragment in `dir` into one tile-record file.
/// Fragments are read in name order and tiles keep their order of first appearance;
/// a tile already seen keeps its first record.
pub fn merge_tile_info_fragments(dir: &Path, output: &Path) -> Result<usize> {
    let mut fragments: Vec<_> = fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("tile_info_"))
        })
        .collect();
    fragments.sort();

    let mut seen = HashSet::new();
    let mut merged = TileRecords::new();
    for fragment in &fragments {
        for (tile_id, record) in read_tile_records(fragment)? {
            if seen.insert(tile_id.clone()) {
                merged.push((tile_id, record));
            }
        }
    }

    write_tile_records(output, &merged)?;
    info!(
        "Merged {} fragments into {} tile records at {:?}",
        fragments.len(),
        merged.len(),
        output
    );
    Ok(merged.len())
}
