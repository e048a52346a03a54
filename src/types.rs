//! Shared types and enums used across GEOLR.
//! Includes `ElementType`, `ImagingMode` and the dtype-tagged `TileTensor`.
use clap::ValueEnum;
use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};

/// Storage element type of a modality array
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Serialize, Deserialize)]
pub enum ElementType {
    U8,
    I8,
    U16,
    I16,
    F32,
}

impl std::fmt::Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ElementType::U8 => "uint8",
            ElementType::I8 => "int8",
            ElementType::U16 => "uint16",
            ElementType::I16 => "int16",
            ElementType::F32 => "float32",
        };
        write!(f, "{}", s)
    }
}

/// Processing level of the primary optical imagery
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImagingMode {
    L1c,
    L2a,
}

impl ImagingMode {
    pub const ALL: [ImagingMode; 2] = [ImagingMode::L1c, ImagingMode::L2a];

    pub fn tag(&self) -> &'static str {
        match self {
            ImagingMode::L1c => "l1c",
            ImagingMode::L2a => "l2a",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "l1c" => Some(ImagingMode::L1c),
            "l2a" => Some(ImagingMode::L2a),
            _ => None,
        }
    }
}

impl std::fmt::Display for ImagingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// One modality's data for one tile, in the modality's storage type
#[derive(Debug, Clone, PartialEq)]
pub enum TileTensor {
    U8(ArrayD<u8>),
    I8(ArrayD<i8>),
    U16(ArrayD<u16>),
    I16(ArrayD<i16>),
    F32(ArrayD<f32>),
}

impl TileTensor {
    /// Cast an f64 working array into the given storage type.
    /// Integer casts saturate, so out-of-range values clamp to the type bounds.
    pub fn from_f64(element: ElementType, data: ArrayD<f64>) -> Self {
        match element {
            ElementType::U8 => TileTensor::U8(data.mapv(|v| v as u8)),
            ElementType::I8 => TileTensor::I8(data.mapv(|v| v as i8)),
            ElementType::U16 => TileTensor::U16(data.mapv(|v| v as u16)),
            ElementType::I16 => TileTensor::I16(data.mapv(|v| v as i16)),
            ElementType::F32 => TileTensor::F32(data.mapv(|v| v as f32)),
        }
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            TileTensor::U8(_) => ElementType::U8,
            TileTensor::I8(_) => ElementType::I8,
            TileTensor::U16(_) => ElementType::U16,
            TileTensor::I16(_) => ElementType::I16,
            TileTensor::F32(_) => ElementType::F32,
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            TileTensor::U8(a) => a.shape(),
            TileTensor::I8(a) => a.shape(),
            TileTensor::U16(a) => a.shape(),
            TileTensor::I16(a) => a.shape(),
            TileTensor::F32(a) => a.shape(),
        }
    }

    pub fn to_f64(&self) -> ArrayD<f64> {
        match self {
            TileTensor::U8(a) => a.mapv(f64::from),
            TileTensor::I8(a) => a.mapv(f64::from),
            TileTensor::U16(a) => a.mapv(f64::from),
            TileTensor::I16(a) => a.mapv(f64::from),
            TileTensor::F32(a) => a.mapv(f64::from),
        }
    }

    /// Build a tensor of `shape` from row-major elements of the matching type
    pub(crate) fn from_shape_vec<T: TensorElement>(
        shape: &[usize],
        data: Vec<T>,
    ) -> Result<Self, ndarray::ShapeError> {
        ArrayD::from_shape_vec(IxDyn(shape), data).map(T::wrap)
    }
}

/// Element types that can live inside a `TileTensor`
pub trait TensorElement: Copy + Send + Sync + 'static {
    fn wrap(array: ArrayD<Self>) -> TileTensor;
}

macro_rules! tensor_element {
    ($ty:ty, $variant:ident) => {
        impl TensorElement for $ty {
            fn wrap(array: ArrayD<Self>) -> TileTensor {
                TileTensor::$variant(array)
            }
        }
    };
}

tensor_element!(u8, U8);
tensor_element!(i8, I8);
tensor_element!(u16, U16);
tensor_element!(i16, I16);
tensor_element!(f32, F32);
