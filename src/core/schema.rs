//! Static registry of every modality stored in a dataset.
//!
//! Each entry names the storage type, band layout, no-data value, statistics policy and
//! the extractor the assembler runs for it. Adding a modality is an edit to [`DESCRIPTORS`].
use serde::{Deserialize, Serialize};

use crate::core::assemble::{self, Extractor};
use crate::types::ElementType;

/// Every modality held by a dataset store
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Sentinel2,
    Sentinel2Cloudmask,
    Sentinel2Cloudprod,
    Sentinel2Scl,
    Sentinel1,
    Aster,
    Era5,
    DynamicWorld,
    CanopyHeightEth,
    Lat,
    Lon,
    Biome,
    EcoRegion,
    Month,
    EsaWorldcover,
}

/// Band groups stacked along the raw raster's channel axis, in channel order
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum StackGroup {
    Sentinel2,
    Sentinel1Asc,
    Sentinel1Desc,
    Aster,
    DynamicWorld,
    CanopyHeightEth,
    EsaWorldcover,
}

impl StackGroup {
    pub const ORDER: [StackGroup; 7] = [
        StackGroup::Sentinel2,
        StackGroup::Sentinel1Asc,
        StackGroup::Sentinel1Desc,
        StackGroup::Aster,
        StackGroup::DynamicWorld,
        StackGroup::CanopyHeightEth,
        StackGroup::EsaWorldcover,
    ];

    /// Key of this group in a tile's `BANDS` manifest
    pub fn key(&self) -> &'static str {
        match self {
            StackGroup::Sentinel2 => "sentinel2",
            StackGroup::Sentinel1Asc => "sentinel1_asc",
            StackGroup::Sentinel1Desc => "sentinel1_desc",
            StackGroup::Aster => "aster",
            StackGroup::DynamicWorld => "dynamic_world",
            StackGroup::CanopyHeightEth => "canopy_height_eth",
            StackGroup::EsaWorldcover => "esa_worldcover",
        }
    }

    /// Prefix used by the registry's band names for orbit-split groups
    pub fn orbit_prefix(&self) -> Option<&'static str> {
        match self {
            StackGroup::Sentinel1Asc => Some("asc"),
            StackGroup::Sentinel1Desc => Some("desc"),
            _ => None,
        }
    }
}

/// Per-row shape rule of a modality
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Layout {
    /// `(bands, size, size)`
    Spatial,
    /// `(bands,)`
    Vector,
}

/// How band statistics are accumulated for a modality
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum StatsPolicy {
    /// Categorical or one-hot data; no statistics
    Skip,
    /// Every row, two passes
    FullPass,
    /// Seeded random subset of rows
    Subset,
    /// Seeded subset, also split by imaging mode
    SubsetByMode,
}

pub struct ModalityDescriptor {
    pub modality: Modality,
    pub element: ElementType,
    pub n_bands: usize,
    /// Canonical band names; empty for one-hot vectors
    pub bands: &'static [&'static str],
    pub layout: Layout,
    pub no_data: Option<f64>,
    /// Raster groups the extractor reads from
    pub sources: &'static [StackGroup],
    pub stats: StatsPolicy,
    pub extract: Extractor,
}

pub const SENTINEL2_BANDS: [&str; 13] = [
    "B1", "B2", "B3", "B4", "B5", "B6", "B7", "B8A", "B8", "B9", "B10", "B11", "B12",
];

pub const BIOME_CLASSES: usize = 14;
pub const ECO_REGION_CLASSES: usize = 846;

pub static DESCRIPTORS: [ModalityDescriptor; 15] = [
    ModalityDescriptor {
        modality: Modality::Sentinel2,
        element: ElementType::U16,
        n_bands: 13,
        bands: &SENTINEL2_BANDS,
        layout: Layout::Spatial,
        no_data: Some(0.0),
        sources: &[StackGroup::Sentinel2],
        stats: StatsPolicy::SubsetByMode,
        extract: assemble::bands_by_name,
    },
    ModalityDescriptor {
        modality: Modality::Sentinel2Cloudmask,
        element: ElementType::U16,
        n_bands: 1,
        bands: &["QA60"],
        layout: Layout::Spatial,
        no_data: Some(65535.0),
        sources: &[StackGroup::Sentinel2],
        stats: StatsPolicy::SubsetByMode,
        extract: assemble::bands_by_name,
    },
    ModalityDescriptor {
        modality: Modality::Sentinel2Cloudprod,
        element: ElementType::U16,
        n_bands: 1,
        bands: &["MSK_CLDPRB"],
        layout: Layout::Spatial,
        no_data: Some(65535.0),
        sources: &[StackGroup::Sentinel2],
        stats: StatsPolicy::SubsetByMode,
        extract: assemble::bands_by_name,
    },
    ModalityDescriptor {
        modality: Modality::Sentinel2Scl,
        element: ElementType::U8,
        n_bands: 1,
        bands: &["SCL"],
        layout: Layout::Spatial,
        no_data: Some(255.0),
        sources: &[StackGroup::Sentinel2],
        stats: StatsPolicy::Skip,
        extract: assemble::bands_by_name,
    },
    ModalityDescriptor {
        modality: Modality::Sentinel1,
        element: ElementType::F32,
        n_bands: 8,
        bands: &[
            "asc_VV", "asc_VH", "asc_HH", "asc_HV", "desc_VV", "desc_VH", "desc_HH", "desc_HV",
        ],
        layout: Layout::Spatial,
        no_data: Some(f64::NEG_INFINITY),
        sources: &[StackGroup::Sentinel1Asc, StackGroup::Sentinel1Desc],
        stats: StatsPolicy::Subset,
        extract: assemble::bands_by_orbit,
    },
    ModalityDescriptor {
        modality: Modality::Aster,
        element: ElementType::I16,
        n_bands: 2,
        bands: &["elevation", "slope"],
        layout: Layout::Spatial,
        no_data: Some(-32768.0),
        sources: &[StackGroup::Aster],
        stats: StatsPolicy::Subset,
        extract: assemble::band_block,
    },
    ModalityDescriptor {
        modality: Modality::Era5,
        element: ElementType::F32,
        n_bands: 12,
        bands: &[
            "prev_month_avg_temp",
            "prev_month_min_temp",
            "prev_month_max_temp",
            "prev_month_total_precip",
            "curr_month_avg_temp",
            "curr_month_min_temp",
            "curr_month_max_temp",
            "curr_month_total_precip",
            "year_avg_temp",
            "year_min_temp",
            "year_max_temp",
            "year_total_precip",
        ],
        layout: Layout::Vector,
        no_data: Some(f64::INFINITY),
        sources: &[],
        stats: StatsPolicy::FullPass,
        extract: assemble::weather,
    },
    ModalityDescriptor {
        modality: Modality::DynamicWorld,
        element: ElementType::U8,
        n_bands: 1,
        bands: &["landcover"],
        layout: Layout::Spatial,
        no_data: Some(0.0),
        sources: &[StackGroup::DynamicWorld],
        stats: StatsPolicy::Skip,
        extract: assemble::band_block,
    },
    ModalityDescriptor {
        modality: Modality::CanopyHeightEth,
        element: ElementType::U8,
        n_bands: 2,
        bands: &["height", "std"],
        layout: Layout::Spatial,
        no_data: Some(255.0),
        sources: &[StackGroup::CanopyHeightEth],
        stats: StatsPolicy::Subset,
        extract: assemble::band_block,
    },
    ModalityDescriptor {
        modality: Modality::Lat,
        element: ElementType::F32,
        n_bands: 2,
        bands: &["sin", "cos"],
        layout: Layout::Vector,
        no_data: Some(f64::NEG_INFINITY),
        sources: &[],
        stats: StatsPolicy::FullPass,
        extract: assemble::latitude,
    },
    ModalityDescriptor {
        modality: Modality::Lon,
        element: ElementType::F32,
        n_bands: 2,
        bands: &["sin", "cos"],
        layout: Layout::Vector,
        no_data: Some(f64::NEG_INFINITY),
        sources: &[],
        stats: StatsPolicy::FullPass,
        extract: assemble::longitude,
    },
    ModalityDescriptor {
        modality: Modality::Biome,
        element: ElementType::U8,
        n_bands: BIOME_CLASSES,
        bands: &[],
        layout: Layout::Vector,
        no_data: None,
        sources: &[],
        stats: StatsPolicy::Skip,
        extract: assemble::biome,
    },
    ModalityDescriptor {
        modality: Modality::EcoRegion,
        element: ElementType::U16,
        n_bands: ECO_REGION_CLASSES,
        bands: &[],
        layout: Layout::Vector,
        no_data: None,
        sources: &[],
        stats: StatsPolicy::Skip,
        extract: assemble::eco_region,
    },
    ModalityDescriptor {
        modality: Modality::Month,
        element: ElementType::F32,
        n_bands: 2,
        bands: &["sin", "cos"],
        layout: Layout::Vector,
        no_data: Some(f64::NEG_INFINITY),
        sources: &[],
        stats: StatsPolicy::FullPass,
        extract: assemble::month,
    },
    ModalityDescriptor {
        modality: Modality::EsaWorldcover,
        element: ElementType::U8,
        n_bands: 1,
        bands: &["map"],
        layout: Layout::Spatial,
        no_data: Some(255.0),
        sources: &[StackGroup::EsaWorldcover],
        stats: StatsPolicy::Skip,
        extract: assemble::band_block,
    },
];

impl Modality {
    pub const ALL: [Modality; 15] = [
        Modality::Sentinel2,
        Modality::Sentinel2Cloudmask,
        Modality::Sentinel2Cloudprod,
        Modality::Sentinel2Scl,
        Modality::Sentinel1,
        Modality::Aster,
        Modality::Era5,
        Modality::DynamicWorld,
        Modality::CanopyHeightEth,
        Modality::Lat,
        Modality::Lon,
        Modality::Biome,
        Modality::EcoRegion,
        Modality::Month,
        Modality::EsaWorldcover,
    ];

    /// Array name inside the store and key prefix in the statistics file
    pub fn name(&self) -> &'static str {
        match self {
            Modality::Sentinel2 => "sentinel2",
            Modality::Sentinel2Cloudmask => "sentinel2_cloudmask",
            Modality::Sentinel2Cloudprod => "sentinel2_cloudprod",
            Modality::Sentinel2Scl => "sentinel2_scl",
            Modality::Sentinel1 => "sentinel1",
            Modality::Aster => "aster",
            Modality::Era5 => "era5",
            Modality::DynamicWorld => "dynamic_world",
            Modality::CanopyHeightEth => "canopy_height_eth",
            Modality::Lat => "lat",
            Modality::Lon => "lon",
            Modality::Biome => "biome",
            Modality::EcoRegion => "eco_region",
            Modality::Month => "month",
            Modality::EsaWorldcover => "esa_worldcover",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Modality::ALL.into_iter().find(|m| m.name() == name)
    }

    pub fn descriptor(&self) -> &'static ModalityDescriptor {
        // DESCRIPTORS is declared in `ALL` order
        &DESCRIPTORS[*self as usize]
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl ModalityDescriptor {
    /// Shape of one row (one tile) of this modality for a given spatial size
    pub fn row_shape(&self, size: usize) -> Vec<usize> {
        match self.layout {
            Layout::Spatial => vec![self.n_bands, size, size],
            Layout::Vector => vec![self.n_bands],
        }
    }

    /// Position of a canonical band name
    pub fn band_index(&self, name: &str) -> Option<usize> {
        self.bands.iter().position(|b| *b == name)
    }

    /// Value written wherever data is missing; one-hot modalities fall back to zero
    pub fn fill_value(&self) -> f64 {
        self.no_data.unwrap_or(0.0)
    }

    /// True when `value` is this modality's no-data marker (or NaN)
    pub fn is_no_data(&self, value: f64) -> bool {
        if value.is_nan() {
            return true;
        }
        match self.no_data {
            Some(nd) => value == nd,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_table_matches_modality_order() {
        for (i, m) in Modality::ALL.iter().enumerate() {
            assert_eq!(DESCRIPTORS[i].modality, *m);
            assert_eq!(m.descriptor().modality, *m);
            assert_eq!(Modality::from_name(m.name()), Some(*m));
        }
    }

    #[test]
    fn band_lists_agree_with_band_counts() {
        for d in DESCRIPTORS.iter() {
            if !d.bands.is_empty() {
                assert_eq!(d.bands.len(), d.n_bands, "{}", d.modality);
            }
        }
    }

    #[test]
    fn sentinels_fit_their_storage_type() {
        for d in DESCRIPTORS.iter() {
            let Some(nd) = d.no_data else { continue };
            let ok = match d.element {
                ElementType::U8 => nd == f64::from(nd as u8),
                ElementType::I8 => nd == f64::from(nd as i8),
                ElementType::U16 => nd == f64::from(nd as u16),
                ElementType::I16 => nd == f64::from(nd as i16),
                ElementType::F32 => nd.is_infinite() || nd == f64::from(nd as f32),
            };
            assert!(ok, "{} sentinel {} does not fit {}", d.modality, nd, d.element);
        }
    }

    #[test]
    fn row_shapes() {
        let s2 = Modality::Sentinel2.descriptor();
        assert_eq!(s2.row_shape(64), vec![13, 64, 64]);
        assert_eq!(Modality::EcoRegion.descriptor().row_shape(64), vec![846]);
        assert_eq!(s2.band_index("B10"), Some(10));
    }
}
