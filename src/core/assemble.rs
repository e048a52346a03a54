//! Tile tensor assembly: turn one tile's stacked raster and band manifest into one
//! fixed-shape tensor per modality.
//!
//! The raw raster holds the stack groups back to back along its last axis, in
//! [`StackGroup::ORDER`], each group occupying as many channels as its manifest lists.
//! Every modality is produced at its registry shape; bands that were not retrieved are
//! filled with the modality's no-data value so store arrays are never ragged.
use std::collections::{BTreeMap, HashMap};
use std::f64::consts::PI;

use ndarray::{Array3, ArrayD, ArrayView2, Axis, IxDyn};
use thiserror::Error;
use tracing::debug;

use crate::core::crop::{as_band_last, center_crop};
use crate::core::schema::{DESCRIPTORS, Modality, ModalityDescriptor, StackGroup};
use crate::io::RasterError;
use crate::io::gdal::RasterSource;
use crate::io::tile_info::TileRecord;
use crate::types::TileTensor;

/// Errors that make a single tile unusable
#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("Tile unavailable: {0}")]
    Unavailable(#[from] RasterError),
    #[error("Raster must be 2-D or 3-D, got {0} dimensions")]
    RasterRank(usize),
    #[error("Raster {rows}x{cols} is smaller than the {size}x{size} crop")]
    TooSmall { rows: usize, cols: usize, size: usize },
    #[error("Manifest lists {expected} channels but the raster has {found}")]
    ChannelCount { expected: usize, found: usize },
    #[error("Band `{band}` is not a known `{modality}` band")]
    UnknownBand { modality: Modality, band: String },
    #[error("Weather block has {found} values, expected {expected}")]
    WeatherLength { expected: usize, found: usize },
    #[error("Class {class} outside the {width}-wide `{modality}` encoding")]
    ClassOutOfRange {
        modality: Modality,
        class: usize,
        width: usize,
    },
    #[error("Invalid tile record: {0}")]
    Record(String),
    #[error("Shape error: {0}")]
    Shape(String),
}

/// Extraction routine registered per modality in the schema
pub type Extractor =
    fn(&TileContext<'_>, &ModalityDescriptor) -> Result<ArrayD<f64>, AssembleError>;

/// Assembled tensors for one tile, keyed by modality
pub type TileTensors = BTreeMap<Modality, TileTensor>;

/// Everything an extractor may read for one tile
pub struct TileContext<'a> {
    pub tile_id: &'a str,
    pub record: &'a TileRecord,
    /// Cropped raster, `(size, size, channels)`
    pub raster: &'a Array3<f64>,
    pub size: usize,
    groups: HashMap<StackGroup, (usize, &'a [String])>,
}

impl<'a> TileContext<'a> {
    pub fn new(
        tile_id: &'a str,
        record: &'a TileRecord,
        raster: &'a Array3<f64>,
        size: usize,
    ) -> Self {
        let mut groups = HashMap::with_capacity(StackGroup::ORDER.len());
        let mut cursor = 0;
        for group in StackGroup::ORDER {
            let bands = record.group_bands(group);
            groups.insert(group, (cursor, bands));
            cursor += bands.len();
        }
        Self {
            tile_id,
            record,
            raster,
            size,
            groups,
        }
    }

    /// First channel of a group and the band names it holds, in raster order
    pub fn group(&self, group: StackGroup) -> (usize, &'a [String]) {
        self.groups.get(&group).copied().unwrap_or((0, &[]))
    }

    pub fn channel(&self, index: usize) -> ArrayView2<'_, f64> {
        self.raster.index_axis(Axis(2), index)
    }

    fn placeholder(&self, desc: &ModalityDescriptor) -> ArrayD<f64> {
        ArrayD::from_elem(IxDyn(&desc.row_shape(self.size)), desc.fill_value())
    }
}

/// Copy bands into their canonical position by name; unknown names are ignored
/// (the primary group also carries the auxiliary mask layers).
pub fn bands_by_name(
    ctx: &TileContext<'_>,
    desc: &ModalityDescriptor,
) -> Result<ArrayD<f64>, AssembleError> {
    let mut out = ctx.placeholder(desc);
    for &group in desc.sources {
        let (offset, names) = ctx.group(group);
        for (pos, name) in names.iter().enumerate() {
            if let Some(ch) = desc.band_index(name) {
                out.index_axis_mut(Axis(0), ch)
                    .assign(&ctx.channel(offset + pos));
            }
        }
    }
    Ok(out)
}

/// Orbit-split groups: band `VV` of the ascending group lands in `asc_VV`, and so on
pub fn bands_by_orbit(
    ctx: &TileContext<'_>,
    desc: &ModalityDescriptor,
) -> Result<ArrayD<f64>, AssembleError> {
    let mut out = ctx.placeholder(desc);
    for &group in desc.sources {
        let (offset, names) = ctx.group(group);
        let prefix = group.orbit_prefix().unwrap_or(group.key());
        for (pos, name) in names.iter().enumerate() {
            let key = format!("{prefix}_{name}");
            let ch = desc
                .band_index(&key)
                .ok_or_else(|| AssembleError::UnknownBand {
                    modality: desc.modality,
                    band: name.clone(),
                })?;
            out.index_axis_mut(Axis(0), ch)
                .assign(&ctx.channel(offset + pos));
        }
    }
    Ok(out)
}

/// Take a group's channels in manifest order; channels it lacks stay no-data
pub fn band_block(
    ctx: &TileContext<'_>,
    desc: &ModalityDescriptor,
) -> Result<ArrayD<f64>, AssembleError> {
    let mut out = ctx.placeholder(desc);
    for &group in desc.sources {
        let (offset, names) = ctx.group(group);
        if names.len() > desc.n_bands {
            debug!(
                "Tile {}: {} lists {} bands, keeping the first {}",
                ctx.tile_id,
                group.key(),
                names.len(),
                desc.n_bands
            );
        }
        for pos in 0..names.len().min(desc.n_bands) {
            out.index_axis_mut(Axis(0), pos)
                .assign(&ctx.channel(offset + pos));
        }
    }
    Ok(out)
}

/// Weather aggregates come from the record, not the raster
pub fn weather(
    ctx: &TileContext<'_>,
    desc: &ModalityDescriptor,
) -> Result<ArrayD<f64>, AssembleError> {
    let Some(era5) = &ctx.record.era5 else {
        return Ok(ctx.placeholder(desc));
    };
    let values = era5.flatten();
    if values.len() != desc.n_bands {
        return Err(AssembleError::WeatherLength {
            expected: desc.n_bands,
            found: values.len(),
        });
    }
    vector(values)
}

pub fn latitude(
    ctx: &TileContext<'_>,
    _desc: &ModalityDescriptor,
) -> Result<ArrayD<f64>, AssembleError> {
    let rad = ctx.record.lat.to_radians();
    vector(vec![rad.sin(), rad.cos()])
}

pub fn longitude(
    ctx: &TileContext<'_>,
    _desc: &ModalityDescriptor,
) -> Result<ArrayD<f64>, AssembleError> {
    let rad = ctx.record.lon.to_radians();
    vector(vec![rad.sin(), rad.cos()])
}

pub fn month(
    ctx: &TileContext<'_>,
    _desc: &ModalityDescriptor,
) -> Result<ArrayD<f64>, AssembleError> {
    let m = ctx
        .record
        .month()
        .map_err(|e| AssembleError::Record(e.to_string()))?;
    let angle = 2.0 * PI * f64::from(m) / 12.0;
    vector(vec![angle.sin(), angle.cos()])
}

pub fn biome(
    ctx: &TileContext<'_>,
    desc: &ModalityDescriptor,
) -> Result<ArrayD<f64>, AssembleError> {
    one_hot(ctx.record.biome, desc)
}

pub fn eco_region(
    ctx: &TileContext<'_>,
    desc: &ModalityDescriptor,
) -> Result<ArrayD<f64>, AssembleError> {
    one_hot(ctx.record.eco_region, desc)
}

fn one_hot(class: usize, desc: &ModalityDescriptor) -> Result<ArrayD<f64>, AssembleError> {
    if class >= desc.n_bands {
        return Err(AssembleError::ClassOutOfRange {
            modality: desc.modality,
            class,
            width: desc.n_bands,
        });
    }
    let mut out = vec![0.0; desc.n_bands];
    out[class] = 1.0;
    vector(out)
}

fn vector(values: Vec<f64>) -> Result<ArrayD<f64>, AssembleError> {
    let n = values.len();
    ArrayD::from_shape_vec(IxDyn(&[n]), values).map_err(|e| AssembleError::Shape(e.to_string()))
}

/// Build every modality's tensor for one tile from an already-read raster.
/// Either all modalities succeed or the tile is rejected as a whole.
pub fn assemble_tile(
    tile_id: &str,
    record: &TileRecord,
    raster: ArrayD<f64>,
    size: usize,
) -> Result<TileTensors, AssembleError> {
    let raster = center_crop(&as_band_last(raster)?, size)?;
    let expected = record.expected_channels();
    let found = raster.dim().2;
    if found < expected {
        return Err(AssembleError::ChannelCount { expected, found });
    }

    let ctx = TileContext::new(tile_id, record, &raster, size);
    let mut tensors = TileTensors::new();
    for desc in DESCRIPTORS.iter() {
        let data = (desc.extract)(&ctx, desc)?;
        let shape = desc.row_shape(size);
        if data.shape() != shape.as_slice() {
            return Err(AssembleError::Shape(format!(
                "{} produced {:?}, registry expects {:?}",
                desc.modality,
                data.shape(),
                shape
            )));
        }
        tensors.insert(desc.modality, TileTensor::from_f64(desc.element, data));
    }
    Ok(tensors)
}

/// Read a tile from `source` and assemble it
pub fn read_tile(
    source: &dyn RasterSource,
    tile_id: &str,
    record: &TileRecord,
    size: usize,
) -> Result<TileTensors, AssembleError> {
    let raster = source.read(tile_id)?;
    assemble_tile(tile_id, record, raster, size)
}
