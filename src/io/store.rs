//! Dataset store: a Zarr v3 hierarchy with one array per modality and a `metadata` table.
//!
//! Every array shares the leading (row) dimension, row `i` of each array and of `metadata`
//! describing the same tile. Metadata rows hold a NUL-padded tile identifier followed by
//! a NUL-padded imaging-mode tag.
use std::collections::BTreeMap;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use zarrs::array::codec::{BytesToBytesCodecTraits, GzipCodec};
use zarrs::array::{
    Array, ArrayBuilder, ArrayCreateError, ArrayError, ChunkGrid, DataType, Element,
    ElementOwned, FillValue,
};
use zarrs::array_subset::ArraySubset;
use zarrs::filesystem::{FilesystemStore, FilesystemStoreCreateError};
use zarrs::group::{Group, GroupBuilder, GroupCreateError};
use zarrs::storage::{
    ReadableWritableListableStorage, ReadableWritableListableStorageTraits, StorageError,
};

use crate::core::assemble::TileTensors;
use crate::core::schema::Modality;
use crate::types::{ElementType, ImagingMode, TileTensor};

pub const METADATA: &str = "metadata";
pub const TILE_ID_BYTES: usize = 100;
pub const MODE_BYTES: usize = 10;
pub const METADATA_WIDTH: usize = TILE_ID_BYTES + MODE_BYTES;

pub type ZarrArray = Array<dyn ReadableWritableListableStorageTraits>;

/// Errors raised by the array store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Filesystem store error: {0}")]
    Filesystem(#[from] FilesystemStoreCreateError),
    #[error("Group error: {0}")]
    Group(#[from] GroupCreateError),
    #[error("Array create error: {0}")]
    Create(#[from] ArrayCreateError),
    #[error("Array error: {0}")]
    Array(#[from] ArrayError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Store not found at {0}")]
    NotFound(PathBuf),
    #[error("Invalid layout: {0}")]
    Layout(String),
    #[error("No array named `{0}` in the store")]
    MissingArray(String),
    #[error("No tensor supplied for array `{0}`")]
    MissingTensor(String),
    #[error("Array `{name}` rows have shape {expected:?}, got {found:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<u64>,
        found: Vec<usize>,
    },
    #[error("Array `{name}` has {found} rows, metadata has {expected}")]
    RowCount {
        name: String,
        expected: u64,
        found: u64,
    },
    #[error("Unsupported data type in array `{0}`")]
    UnsupportedType(String),
    #[error("`{value}` does not fit the {width}-byte {field} field")]
    FieldTooLong {
        field: &'static str,
        value: String,
        width: usize,
    },
    #[error("Shape error: {0}")]
    Shape(String),
}

/// Physical layout of every array in a store
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreLayout {
    /// Rows per chunk along the leading dimension
    pub chunk_rows: u64,
    /// gzip level, 0-9
    pub gzip_level: u32,
}

impl Default for StoreLayout {
    fn default() -> Self {
        Self {
            chunk_rows: 1,
            gzip_level: 4,
        }
    }
}

/// One row of the metadata table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataRow {
    pub tile_id: String,
    /// Raw mode tag; empty when the tile had none
    pub mode_tag: String,
}

impl MetadataRow {
    pub fn mode(&self) -> Option<ImagingMode> {
        ImagingMode::from_tag(&self.mode_tag)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ArraySummary {
    pub name: String,
    pub shape: Vec<u64>,
    pub data_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreSummary {
    pub path: PathBuf,
    pub tile_count: usize,
    pub image_size: usize,
    pub arrays: Vec<ArraySummary>,
}

pub fn data_type_of(element: ElementType) -> DataType {
    match element {
        ElementType::U8 => DataType::UInt8,
        ElementType::I8 => DataType::Int8,
        ElementType::U16 => DataType::UInt16,
        ElementType::I16 => DataType::Int16,
        ElementType::F32 => DataType::Float32,
    }
}

pub fn element_type_of(data_type: &DataType) -> Option<ElementType> {
    match data_type {
        DataType::UInt8 => Some(ElementType::U8),
        DataType::Int8 => Some(ElementType::I8),
        DataType::UInt16 => Some(ElementType::U16),
        DataType::Int16 => Some(ElementType::I16),
        DataType::Float32 => Some(ElementType::F32),
        _ => None,
    }
}

fn fill_value_of(element: ElementType, value: f64) -> FillValue {
    match element {
        ElementType::U8 => FillValue::from(value as u8),
        ElementType::I8 => FillValue::from(value as i8),
        ElementType::U16 => FillValue::from(value as u16),
        ElementType::I16 => FillValue::from(value as i16),
        ElementType::F32 => FillValue::from(value as f32),
    }
}

/// Encode a metadata row as fixed-width NUL-padded bytes
pub fn encode_metadata(tile_id: &str, mode_tag: &str) -> Result<Vec<u8>, StoreError> {
    let mut row = vec![0u8; METADATA_WIDTH];
    put_field(&mut row[..TILE_ID_BYTES], "tile_id", tile_id)?;
    put_field(&mut row[TILE_ID_BYTES..], "mode", mode_tag)?;
    Ok(row)
}

fn put_field(dst: &mut [u8], field: &'static str, value: &str) -> Result<(), StoreError> {
    let bytes = value.as_bytes();
    if bytes.len() > dst.len() {
        return Err(StoreError::FieldTooLong {
            field,
            value: value.to_string(),
            width: dst.len(),
        });
    }
    dst[..bytes.len()].copy_from_slice(bytes);
    Ok(())
}

pub fn decode_metadata(row: &[u8]) -> MetadataRow {
    let field = |bytes: &[u8]| {
        let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
        String::from_utf8_lossy(&bytes[..end]).into_owned()
    };
    let split = TILE_ID_BYTES.min(row.len());
    MetadataRow {
        tile_id: field(&row[..split]),
        mode_tag: field(&row[split..]),
    }
}

/// Subset covering whole rows `rows` of an array
fn rows_subset(shape: &[u64], rows: Range<u64>) -> ArraySubset {
    let mut ranges = Vec::with_capacity(shape.len());
    ranges.push(rows);
    ranges.extend(shape.iter().skip(1).map(|&d| 0..d));
    ArraySubset::new_with_ranges(&ranges)
}

fn store_rows<T: Element>(
    array: &ZarrArray,
    rows: Range<u64>,
    elements: &[T],
) -> Result<(), StoreError> {
    let subset = rows_subset(array.shape(), rows);
    array.store_array_subset_elements::<T>(&subset, elements)?;
    Ok(())
}

fn retrieve_rows<T: ElementOwned>(
    array: &ZarrArray,
    rows: Range<u64>,
) -> Result<Vec<T>, StoreError> {
    let subset = rows_subset(array.shape(), rows);
    Ok(array.retrieve_array_subset_elements::<T>(&subset)?)
}

fn flat<T: Copy>(a: &ArrayD<T>) -> Vec<T> {
    a.iter().copied().collect()
}

/// Copy whole rows between arrays of the same element type and row shape
fn copy_rows(
    name: &str,
    src: &ZarrArray,
    src_rows: Range<u64>,
    dst: &ZarrArray,
    dst_start: u64,
) -> Result<(), StoreError> {
    let element = element_type_of(src.data_type())
        .ok_or_else(|| StoreError::UnsupportedType(name.to_string()))?;
    let dst_rows = dst_start..dst_start + (src_rows.end - src_rows.start);
    match element {
        ElementType::U8 => store_rows(dst, dst_rows, &retrieve_rows::<u8>(src, src_rows)?),
        ElementType::I8 => store_rows(dst, dst_rows, &retrieve_rows::<i8>(src, src_rows)?),
        ElementType::U16 => store_rows(dst, dst_rows, &retrieve_rows::<u16>(src, src_rows)?),
        ElementType::I16 => store_rows(dst, dst_rows, &retrieve_rows::<i16>(src, src_rows)?),
        ElementType::F32 => store_rows(dst, dst_rows, &retrieve_rows::<f32>(src, src_rows)?),
    }
}

/// Canonical form of `path`; a path that does not exist yet resolves through its parent
fn resolved(path: &Path) -> Option<PathBuf> {
    if let Ok(p) = fs::canonicalize(path) {
        return Some(p);
    }
    let name = path.file_name()?;
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::canonicalize(parent).ok().map(|p| p.join(name))
}

/// True when creating a store at `output` would replace `input`, a directory holding
/// it, or a directory inside it. Aliases (`..`, relative paths, symlinks) are resolved.
pub fn paths_overlap(output: &Path, input: &Path) -> bool {
    match (resolved(output), resolved(input)) {
        (Some(o), Some(i)) => o.starts_with(&i) || i.starts_with(&o),
        _ => output == input,
    }
}

fn remove_existing(path: &Path) -> Result<(), StoreError> {
    if path.is_dir() {
        info!("Removing existing store at {:?}", path);
        fs::remove_dir_all(path)?;
    } else if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}

fn build_array(
    storage: &ReadableWritableListableStorage,
    name: &str,
    shape: Vec<u64>,
    data_type: DataType,
    fill_value: FillValue,
    layout: &StoreLayout,
) -> Result<ZarrArray, StoreError> {
    let mut chunk = shape.clone();
    if let Some(first) = chunk.first_mut() {
        *first = layout.chunk_rows;
    }
    // chunk extents must be non-zero even for empty arrays
    for extent in chunk.iter_mut() {
        *extent = (*extent).max(1);
    }
    let grid = ChunkGrid::try_from(chunk)
        .map_err(|e| StoreError::Layout(format!("{name}: {e}")))?;
    let gzip: Arc<dyn BytesToBytesCodecTraits> = Arc::new(
        GzipCodec::new(layout.gzip_level)
            .map_err(|e| StoreError::Layout(format!("gzip level {}: {e}", layout.gzip_level)))?,
    );
    let array = ArrayBuilder::new(shape, data_type, grid, fill_value)
        .bytes_to_bytes_codecs(vec![gzip])
        .build(storage.clone(), &format!("/{name}"))?;
    array.store_metadata()?;
    Ok(array)
}

/// Handle on an open dataset store
pub struct DatasetStore {
    path: PathBuf,
    arrays: BTreeMap<Modality, ZarrArray>,
    metadata: ZarrArray,
    rows: usize,
    image_size: usize,
}

impl DatasetStore {
    /// Create an empty store sized for `rows` tiles, replacing anything at `path`.
    /// Unwritten rows read back as each modality's no-data value.
    pub fn create(
        path: &Path,
        rows: usize,
        image_size: usize,
        layout: &StoreLayout,
    ) -> Result<Self, StoreError> {
        Self::create_with(path, rows, image_size, layout, |m| {
            let desc = m.descriptor();
            let mut shape = vec![rows as u64];
            shape.extend(desc.row_shape(image_size).into_iter().map(|d| d as u64));
            Ok((
                shape,
                data_type_of(desc.element),
                fill_value_of(desc.element, desc.fill_value()),
            ))
        })
    }

    /// Create a store with the same arrays (shape, type, fill value) as `source`
    pub fn create_like(
        path: &Path,
        source: &DatasetStore,
        layout: &StoreLayout,
    ) -> Result<Self, StoreError> {
        Self::create_with(path, source.rows, source.image_size, layout, |m| {
            let array = source.array(m)?;
            Ok((
                array.shape().to_vec(),
                array.data_type().clone(),
                array.fill_value().clone(),
            ))
        })
    }

    fn create_with<F>(
        path: &Path,
        rows: usize,
        image_size: usize,
        layout: &StoreLayout,
        array_def: F,
    ) -> Result<Self, StoreError>
    where
        F: Fn(Modality) -> Result<(Vec<u64>, DataType, FillValue), StoreError>,
    {
        if layout.chunk_rows == 0 {
            return Err(StoreError::Layout("chunk_rows must be at least 1".into()));
        }
        remove_existing(path)?;
        fs::create_dir_all(path)?;
        let storage: ReadableWritableListableStorage = Arc::new(FilesystemStore::new(path)?);

        let mut attributes = serde_json::Map::new();
        attributes.insert("image_size".to_string(), image_size.into());
        attributes.insert("tile_count".to_string(), rows.into());
        GroupBuilder::new()
            .attributes(attributes)
            .build(storage.clone(), "/")?
            .store_metadata()?;

        let mut arrays = BTreeMap::new();
        for m in Modality::ALL {
            let (shape, data_type, fill_value) = array_def(m)?;
            debug!("Allocating {} with shape {:?}", m, shape);
            arrays.insert(
                m,
                build_array(&storage, m.name(), shape, data_type, fill_value, layout)?,
            );
        }
        let metadata = build_array(
            &storage,
            METADATA,
            vec![rows as u64, METADATA_WIDTH as u64],
            DataType::UInt8,
            FillValue::from(0u8),
            layout,
        )?;

        info!(
            "Created store at {:?}: {} rows, {}x{} pixels, {} rows per chunk",
            path, rows, image_size, image_size, layout.chunk_rows
        );
        Ok(Self {
            path: path.to_path_buf(),
            arrays,
            metadata,
            rows,
            image_size,
        })
    }

    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if !path.is_dir() {
            return Err(StoreError::NotFound(path.to_path_buf()));
        }
        let storage: ReadableWritableListableStorage = Arc::new(FilesystemStore::new(path)?);
        let group = Group::open(storage.clone(), "/")?;
        let metadata: ZarrArray = Array::open(storage.clone(), &format!("/{METADATA}"))?;
        let rows = metadata.shape().first().copied().unwrap_or(0);

        let mut arrays = BTreeMap::new();
        for m in Modality::ALL {
            let array: ZarrArray = Array::open(storage.clone(), &format!("/{}", m.name()))?;
            let found = array.shape().first().copied().unwrap_or(0);
            if found != rows {
                return Err(StoreError::RowCount {
                    name: m.name().to_string(),
                    expected: rows,
                    found,
                });
            }
            arrays.insert(m, array);
        }

        let image_size = group
            .attributes()
            .get("image_size")
            .and_then(|v| v.as_u64())
            .or_else(|| {
                arrays
                    .get(&Modality::Sentinel2)
                    .and_then(|a| a.shape().get(2).copied())
            })
            .unwrap_or(0) as usize;

        debug!("Opened store at {:?} with {} rows", path, rows);
        Ok(Self {
            path: path.to_path_buf(),
            arrays,
            metadata,
            rows: rows as usize,
            image_size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of tile rows shared by every array
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn image_size(&self) -> usize {
        self.image_size
    }

    pub fn array(&self, modality: Modality) -> Result<&ZarrArray, StoreError> {
        self.arrays
            .get(&modality)
            .ok_or_else(|| StoreError::MissingArray(modality.name().to_string()))
    }

    /// Write one tile's tensors and metadata at `row`.
    /// All tensors are checked against the store before anything is written.
    pub fn write_tile(
        &self,
        row: usize,
        tile_id: &str,
        mode: Option<ImagingMode>,
        tensors: &TileTensors,
    ) -> Result<(), StoreError> {
        for m in tensors.keys() {
            self.array(*m)?;
        }
        for m in self.arrays.keys() {
            let tensor = tensors
                .get(m)
                .ok_or_else(|| StoreError::MissingTensor(m.name().to_string()))?;
            self.check_shape(*m, tensor)?;
        }
        let meta = encode_metadata(tile_id, mode.map(|m| m.tag()).unwrap_or(""))?;

        for (m, tensor) in tensors {
            self.write_tensor(*m, row, tensor)?;
        }
        let r = row as u64;
        store_rows(&self.metadata, r..r + 1, &meta)
    }

    fn check_shape(&self, modality: Modality, tensor: &TileTensor) -> Result<(), StoreError> {
        let expected = &self.array(modality)?.shape()[1..];
        let found = tensor.shape();
        if expected.len() != found.len()
            || expected.iter().zip(found).any(|(e, f)| *e != *f as u64)
        {
            return Err(StoreError::ShapeMismatch {
                name: modality.name().to_string(),
                expected: expected.to_vec(),
                found: found.to_vec(),
            });
        }
        Ok(())
    }

    pub fn write_tensor(
        &self,
        modality: Modality,
        row: usize,
        tensor: &TileTensor,
    ) -> Result<(), StoreError> {
        self.check_shape(modality, tensor)?;
        let array = self.array(modality)?;
        let r = row as u64;
        match tensor {
            TileTensor::U8(a) => store_rows(array, r..r + 1, &flat(a)),
            TileTensor::I8(a) => store_rows(array, r..r + 1, &flat(a)),
            TileTensor::U16(a) => store_rows(array, r..r + 1, &flat(a)),
            TileTensor::I16(a) => store_rows(array, r..r + 1, &flat(a)),
            TileTensor::F32(a) => store_rows(array, r..r + 1, &flat(a)),
        }
    }

    /// Read one modality's row at its stored type and shape
    pub fn read_tensor(&self, modality: Modality, row: usize) -> Result<TileTensor, StoreError> {
        let array = self.array(modality)?;
        let shape: Vec<usize> = array.shape()[1..].iter().map(|&d| d as usize).collect();
        let element = element_type_of(array.data_type())
            .ok_or_else(|| StoreError::UnsupportedType(modality.name().to_string()))?;
        let r = row as u64..row as u64 + 1;
        let tensor = match element {
            ElementType::U8 => TileTensor::from_shape_vec(&shape, retrieve_rows::<u8>(array, r)?),
            ElementType::I8 => TileTensor::from_shape_vec(&shape, retrieve_rows::<i8>(array, r)?),
            ElementType::U16 => {
                TileTensor::from_shape_vec(&shape, retrieve_rows::<u16>(array, r)?)
            }
            ElementType::I16 => {
                TileTensor::from_shape_vec(&shape, retrieve_rows::<i16>(array, r)?)
            }
            ElementType::F32 => {
                TileTensor::from_shape_vec(&shape, retrieve_rows::<f32>(array, r)?)
            }
        };
        tensor.map_err(|e| StoreError::Shape(e.to_string()))
    }

    pub fn read_metadata(&self, row: usize) -> Result<MetadataRow, StoreError> {
        let r = row as u64;
        let bytes = retrieve_rows::<u8>(&self.metadata, r..r + 1)?;
        Ok(decode_metadata(&bytes))
    }

    /// Every metadata row, read `block` rows at a time
    pub fn metadata_rows(&self, block: usize) -> Result<Vec<MetadataRow>, StoreError> {
        let block = block.max(1) as u64;
        let total = self.rows as u64;
        let mut out = Vec::with_capacity(self.rows);
        let mut start = 0;
        while start < total {
            let end = (start + block).min(total);
            let bytes = retrieve_rows::<u8>(&self.metadata, start..end)?;
            out.extend(bytes.chunks(METADATA_WIDTH).map(decode_metadata));
            start = end;
        }
        Ok(out)
    }

    /// Copy every row of `src` into this store starting at `dst_start`, `block` rows at a time.
    /// Both stores must hold the same arrays with matching element types and row shapes.
    pub fn copy_rows_from(
        &self,
        src: &DatasetStore,
        dst_start: usize,
        block: usize,
    ) -> Result<(), StoreError> {
        let mut pairs = Vec::with_capacity(Modality::ALL.len() + 1);
        for m in Modality::ALL {
            pairs.push((m.name(), src.array(m)?, self.array(m)?));
        }
        pairs.push((METADATA, &src.metadata, &self.metadata));

        for (name, from, to) in &pairs {
            if element_type_of(from.data_type()) != element_type_of(to.data_type())
                || from.shape()[1..] != to.shape()[1..]
            {
                return Err(StoreError::ShapeMismatch {
                    name: name.to_string(),
                    expected: to.shape()[1..].to_vec(),
                    found: from.shape()[1..].iter().map(|&d| d as usize).collect(),
                });
            }
        }
        if dst_start + src.rows > self.rows {
            return Err(StoreError::RowCount {
                name: METADATA.to_string(),
                expected: self.rows as u64,
                found: (dst_start + src.rows) as u64,
            });
        }

        let total = src.rows as u64;
        let block = block.max(1) as u64;
        for (name, from, to) in &pairs {
            let mut start = 0;
            while start < total {
                let end = (start + block).min(total);
                copy_rows(name, from, start..end, to, dst_start as u64 + start)?;
                start = end;
            }
            debug!("Copied {} rows of {}", total, name);
        }
        Ok(())
    }

    pub fn summary(&self) -> StoreSummary {
        let describe = |name: &str, array: &ZarrArray| ArraySummary {
            name: name.to_string(),
            shape: array.shape().to_vec(),
            data_type: element_type_of(array.data_type())
                .map(|e| e.to_string())
                .unwrap_or_else(|| format!("{:?}", array.data_type())),
        };
        let mut arrays: Vec<ArraySummary> = self
            .arrays
            .iter()
            .map(|(m, a)| describe(m.name(), a))
            .collect();
        arrays.push(describe(METADATA, &self.metadata));
        StoreSummary {
            path: self.path.clone(),
            tile_count: self.rows,
            image_size: self.image_size,
            arrays,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::DESCRIPTORS;
    use ndarray::IxDyn;

    fn tensors_filled(size: usize, value: f64) -> TileTensors {
        DESCRIPTORS
            .iter()
            .map(|d| {
                let data = ArrayD::from_elem(IxDyn(&d.row_shape(size)), value);
                (d.modality, TileTensor::from_f64(d.element, data))
            })
            .collect()
    }

    #[test]
    fn metadata_rows_are_fixed_width() {
        let row = encode_metadata("tile_42", "l2a").unwrap();
        assert_eq!(row.len(), METADATA_WIDTH);
        let decoded = decode_metadata(&row);
        assert_eq!(decoded.tile_id, "tile_42");
        assert_eq!(decoded.mode(), Some(ImagingMode::L2a));

        let long = "x".repeat(TILE_ID_BYTES + 1);
        assert!(matches!(
            encode_metadata(&long, ""),
            Err(StoreError::FieldTooLong { .. })
        ));
    }

    #[test]
    fn unwritten_rows_read_as_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ds.zarr");
        let store = DatasetStore::create(&path, 3, 2, &StoreLayout::default()).unwrap();
        store
            .write_tile(0, "a", Some(ImagingMode::L1c), &tensors_filled(2, 7.0))
            .unwrap();

        let reopened = DatasetStore::open(&path).unwrap();
        assert_eq!(reopened.rows(), 3);
        assert_eq!(reopened.image_size(), 2);
        let written = reopened.read_tensor(Modality::Sentinel2, 0).unwrap();
        assert_eq!(written.shape(), &[13, 2, 2]);
        assert!(written.to_f64().iter().all(|v| *v == 7.0));
        let blank = reopened.read_tensor(Modality::Sentinel1, 2).unwrap();
        assert!(blank.to_f64().iter().all(|v| *v == f64::NEG_INFINITY));
        assert_eq!(reopened.read_metadata(0).unwrap().tile_id, "a");
        assert_eq!(reopened.read_metadata(1).unwrap().tile_id, "");
        assert_eq!(reopened.metadata_rows(2).unwrap().len(), 3);
    }

    #[test]
    fn incomplete_tiles_are_refused_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ds.zarr");
        let store = DatasetStore::create(&path, 1, 2, &StoreLayout::default()).unwrap();
        let mut tensors = tensors_filled(2, 3.0);
        tensors.remove(&Modality::Month);
        assert!(matches!(
            store.write_tile(0, "a", None, &tensors),
            Err(StoreError::MissingTensor(name)) if name == "month"
        ));
        // nothing reached the store
        let s2 = store.read_tensor(Modality::Sentinel2, 0).unwrap();
        assert!(s2.to_f64().iter().all(|v| *v == 0.0));

        let wrong = tensors_filled(3, 3.0);
        assert!(matches!(
            store.write_tile(0, "a", None, &wrong),
            Err(StoreError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn create_replaces_existing_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ds.zarr");
        DatasetStore::create(&path, 5, 2, &StoreLayout::default()).unwrap();
        DatasetStore::create(&path, 2, 2, &StoreLayout::default()).unwrap();
        let summary = DatasetStore::open(&path).unwrap().summary();
        assert_eq!(summary.tile_count, 2);
        assert_eq!(summary.arrays.len(), Modality::ALL.len() + 1);
        assert!(summary.arrays.iter().all(|a| a.shape[0] == 2));
    }

    #[test]
    fn aliased_paths_overlap() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("ds.zarr");
        DatasetStore::create(&store, 1, 2, &StoreLayout::default()).unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();

        assert!(paths_overlap(&dir.path().join("sub/../ds.zarr"), &store));
        assert!(paths_overlap(dir.path(), &store));
        assert!(paths_overlap(&store.join("nested.zarr"), &store));
        assert!(!paths_overlap(&dir.path().join("other.zarr"), &store));
        assert!(!paths_overlap(&dir.path().join("sub/ds.zarr"), &store));
    }
}
