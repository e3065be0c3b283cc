//! Named dense matrices sharing the container shape

use std::path::PathBuf;

use omx_core::{Codec, DataType, ElementType, EntryHeader, EntryKind, Shape, MAX_RANK};
use tracing::{debug, info};

use crate::array::{DenseArray, DynamicArray, DynamicElement};
use crate::container::{check_name, OpenMatrix};
use crate::error::{Error, Result};
use crate::storage::EntryFile;

/// A stored matrix, read from disk on demand
#[derive(Debug, Clone)]
pub struct MatrixHandle {
    name: String,
    path: PathBuf,
    header: EntryHeader,
}

impl MatrixHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dims(&self) -> &[u64] {
        self.header.dims()
    }

    pub fn data_type(&self) -> DataType {
        match self.header.element {
            ElementType::Numeric(data_type) => data_type,
            // Matrix entries are validated numeric on load
            ElementType::Label => DataType::F64,
        }
    }

    pub fn codec(&self) -> Codec {
        self.header.codec
    }

    pub fn header(&self) -> &EntryHeader {
        &self.header
    }

    /// Read the full matrix with its stored element type
    pub fn read_dynamic(&self) -> Result<DynamicArray> {
        let entry = EntryFile::open(&self.path)?;
        let payload = entry.read_payload()?;
        DynamicArray::from_bytes(self.data_type(), self.header.dims().to_vec(), &payload)
    }

    /// Read the full matrix as `T`, which must be the stored element type
    pub fn read<T: DynamicElement>(&self) -> Result<DenseArray<T>> {
        let found = self.data_type();
        if found != T::data_type() {
            return Err(Error::TypeMismatch {
                expected: ElementType::Numeric(T::data_type()),
                found: ElementType::Numeric(found),
            });
        }
        let entry = EntryFile::open(&self.path)?;
        let payload = entry.read_payload()?;
        DenseArray::from_bytes(self.header.dims().to_vec(), &payload)
    }

    /// Read the full matrix converted to f64
    pub fn read_f64(&self) -> Result<Vec<f64>> {
        Ok(self.read_dynamic()?.to_f64())
    }
}

impl OpenMatrix {
    /// Create a zero-filled matrix, or return the one already named `name`
    ///
    /// `extra_dims` extends the container shape with up to two trailing
    /// dimensions. An existing matrix is returned unchanged whatever its type.
    pub fn create_blank(
        &mut self,
        name: &str,
        data_type: DataType,
        extra_dims: &[u64],
    ) -> Result<MatrixHandle> {
        check_name(name)?;
        if self.matrices.contains_key(name) {
            return self.get(name);
        }
        self.ensure_writable()?;
        let shape = self.require_shape("creating a blank matrix")?;

        let mut dims = vec![shape.rows, shape.cols];
        dims.extend_from_slice(extra_dims);
        if dims.len() > MAX_RANK || extra_dims.contains(&0) {
            return Err(self.shape_mismatch(&dims));
        }

        let header = EntryHeader::new(EntryKind::Matrix, data_type, &dims).map_err(Error::Core)?;
        let path = self.entry_path(EntryKind::Matrix, name);
        let entry = EntryFile::write_zeroed(&path, header, self.config.codec, self.config.level)?;
        self.matrices.insert(name.to_string(), *entry.header());

        debug!(matrix = %name, dtype = %data_type, dims = ?dims, "created blank matrix");
        self.get(name)
    }

    /// Store a 2-D array under `name`
    ///
    /// The first matrix of a container establishes its shape; every later
    /// one must match it. With `overwrite` an existing matrix is replaced,
    /// otherwise its name fails with `AlreadyExists`.
    pub fn put<T: DynamicElement>(
        &mut self,
        name: &str,
        array: &DenseArray<T>,
        overwrite: bool,
    ) -> Result<MatrixHandle> {
        if array.rank() != 2 {
            return Err(self.shape_mismatch(array.dims()));
        }
        self.write_matrix(name, T::data_type(), array.dims(), array.as_bytes(), overwrite)
    }

    /// Store a 2-D array of any element type
    pub fn put_dynamic(
        &mut self,
        name: &str,
        array: &DynamicArray,
        overwrite: bool,
    ) -> Result<MatrixHandle> {
        if array.rank() != 2 {
            return Err(self.shape_mismatch(array.dims()));
        }
        self.write_matrix(name, array.data_type(), array.dims(), array.as_bytes(), overwrite)
    }

    /// Write a matrix entry whose leading dims match (or establish) the shape
    pub(crate) fn write_matrix(
        &mut self,
        name: &str,
        data_type: DataType,
        dims: &[u64],
        payload: &[u8],
        overwrite: bool,
    ) -> Result<MatrixHandle> {
        check_name(name)?;
        self.ensure_writable()?;

        let previous = self.matrices.get(name).copied();
        if previous.is_some() && !overwrite {
            return Err(Error::AlreadyExists {
                kind: EntryKind::Matrix,
                name: name.to_string(),
            });
        }
        if dims.len() < 2 || dims.len() > MAX_RANK || dims.contains(&0) {
            return Err(self.shape_mismatch(dims));
        }

        if self.matrices.is_empty() {
            let proposed = Shape::new(dims[0], dims[1]).map_err(Error::Core)?;
            self.establish_shape(proposed)?;
        } else {
            self.check_leading_dims(dims)?;
        }

        let mut header = EntryHeader::new(EntryKind::Matrix, data_type, dims).map_err(Error::Core)?;
        header.generation = previous.map_or(0, |p| p.generation.wrapping_add(1));

        let path = self.entry_path(EntryKind::Matrix, name);
        let entry = EntryFile::write(&path, header, payload, self.config.codec, self.config.level)?;
        self.matrices.insert(name.to_string(), *entry.header());

        debug!(
            matrix = %name,
            dtype = %data_type,
            dims = ?dims,
            codec = %entry.header().codec,
            replaced = previous.is_some(),
            "stored matrix"
        );
        self.get(name)
    }

    pub(crate) fn check_leading_dims(&self, dims: &[u64]) -> Result<()> {
        self.shape
            .check_matrix_dims(dims)
            .map_err(|_| self.shape_mismatch(dims))
    }

    /// Handle to the matrix named `name`
    pub fn get(&self, name: &str) -> Result<MatrixHandle> {
        let header = self
            .matrices
            .get(name)
            .ok_or_else(|| Error::not_found(EntryKind::Matrix, name))?;
        Ok(MatrixHandle {
            name: name.to_string(),
            path: self.entry_path(EntryKind::Matrix, name),
            header: *header,
        })
    }

    /// Read a matrix with its stored element type
    pub fn get_matrix(&self, name: &str) -> Result<DynamicArray> {
        self.get(name)?.read_dynamic()
    }

    /// Read a matrix as `T`
    pub fn matrix<T: DynamicElement>(&self, name: &str) -> Result<DenseArray<T>> {
        self.get(name)?.read::<T>()
    }

    /// Copy matrices from another container, replacing same-named ones
    ///
    /// Copies every matrix of `other` when `names` is `None`.
    pub fn import_matrices(
        &mut self,
        other: &OpenMatrix,
        names: Option<&[&str]>,
    ) -> Result<Vec<String>> {
        let names: Vec<String> = match names {
            Some(names) => names.iter().map(|n| n.to_string()).collect(),
            None => other.matrix_names(),
        };

        // Resolve every name before copying anything
        let handles = names
            .iter()
            .map(|name| other.get(name))
            .collect::<Result<Vec<_>>>()?;
        for handle in &handles {
            if self.shape.is_set() && !self.matrices.is_empty() {
                self.check_leading_dims(handle.dims())?;
            }
        }

        for handle in &handles {
            let array = handle.read_dynamic()?;
            self.write_matrix(handle.name(), array.data_type(), array.dims(), array.as_bytes(), true)?;
        }

        info!(
            source = %other.path().display(),
            matrices = handles.len(),
            "imported matrices from container"
        );
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContainerConfig;
    use omx_core::ErrorCategory;
    use tempfile::tempdir;

    fn container() -> (tempfile::TempDir, OpenMatrix) {
        let dir = tempdir().unwrap();
        let omx = OpenMatrix::create(dir.path().join("test.omx")).unwrap();
        (dir, omx)
    }

    #[test]
    fn test_first_put_sets_shape() {
        let (_dir, mut omx) = container();
        let array = DenseArray::from_rows(&[[1.0f64, 2.0, 3.0], [4.0, 5.0, 6.0]]).unwrap();

        let handle = omx.put("time", &array, false).unwrap();
        assert_eq!(omx.shape(), (2, 3));
        assert_eq!(handle.dims(), &[2, 3]);
        assert_eq!(omx.matrix::<f64>("time").unwrap(), array);
    }

    #[test]
    fn test_put_rejects_mismatched_shape() {
        let (_dir, mut omx) = container();
        omx.set_shape(3, 3).unwrap();
        omx.create_blank("zeros", DataType::F32, &[]).unwrap();

        let wide = DenseArray::<f32>::zeros(vec![3, 4]).unwrap();
        let err = omx.put("wide", &wide, false).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::IncompatibleShape);
        assert!(!omx.contains_matrix("wide"));
    }

    #[test]
    fn test_put_requires_two_dimensions() {
        let (_dir, mut omx) = container();
        let flat = DenseArray::new(vec![4], vec![1i32, 2, 3, 4]).unwrap();
        assert!(matches!(
            omx.put("flat", &flat, false),
            Err(Error::IncompatibleShape { .. })
        ));

        let cube = DenseArray::<i32>::zeros(vec![2, 2, 2]).unwrap();
        assert!(matches!(
            omx.put("cube", &cube, false),
            Err(Error::IncompatibleShape { .. })
        ));
        assert_eq!(omx.shape(), (0, 0));
    }

    #[test]
    fn test_overwrite_rules() {
        let (_dir, mut omx) = container();
        let ones = DenseArray::from_rows(&[[1i64, 1], [1, 1]]).unwrap();
        let twos = DenseArray::from_rows(&[[2i64, 2], [2, 2]]).unwrap();

        omx.put("m", &ones, false).unwrap();
        assert!(matches!(
            omx.put("m", &twos, false),
            Err(Error::AlreadyExists { kind: EntryKind::Matrix, .. })
        ));

        let handle = omx.put("m", &twos, true).unwrap();
        assert_eq!(handle.header().generation, 1);
        assert_eq!(omx.matrix::<i64>("m").unwrap(), twos);
    }

    #[test]
    fn test_overwrite_may_change_type() {
        let (_dir, mut omx) = container();
        omx.put("m", &DenseArray::from_rows(&[[1i32, 2]]).unwrap(), false).unwrap();
        omx.put("m", &DenseArray::from_rows(&[[0.5f32, 1.5]]).unwrap(), true).unwrap();

        let handle = omx.get("m").unwrap();
        assert_eq!(handle.data_type(), DataType::F32);
        assert_eq!(handle.read_f64().unwrap(), vec![0.5, 1.5]);
    }

    #[test]
    fn test_create_blank_is_idempotent() {
        let (_dir, mut omx) = container();
        assert!(matches!(
            omx.create_blank("zeros", DataType::F32, &[]),
            Err(Error::BadFormat(_))
        ));

        omx.set_shape(2, 3).unwrap();
        let first = omx.create_blank("zeros", DataType::F32, &[4]).unwrap();
        assert_eq!(first.dims(), &[2, 3, 4]);

        // A second call returns the existing matrix, ignoring the new type
        let second = omx.create_blank("zeros", DataType::I64, &[]).unwrap();
        assert_eq!(second.data_type(), DataType::F32);
        assert_eq!(second.dims(), &[2, 3, 4]);

        let values = omx.get_matrix("zeros").unwrap();
        assert_eq!(values.len(), 24);
        assert!(values.to_f64().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_create_blank_rank_limit() {
        let (_dir, mut omx) = container();
        omx.set_shape(2, 2).unwrap();
        assert!(omx.create_blank("m", DataType::U32, &[2, 2, 2]).is_err());
        assert!(omx.create_blank("z", DataType::U32, &[0]).is_err());
    }

    #[test]
    fn test_get_missing_and_type_mismatch() {
        let (_dir, mut omx) = container();
        assert!(matches!(
            omx.get("nope"),
            Err(Error::NotFound { kind: EntryKind::Matrix, .. })
        ));

        omx.put("m", &DenseArray::from_rows(&[[1u64]]).unwrap(), false).unwrap();
        assert!(matches!(
            omx.matrix::<f32>("m"),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_invalid_names_rejected_before_mutation() {
        let (_dir, mut omx) = container();
        let array = DenseArray::from_rows(&[[1.0f32]]).unwrap();
        for name in ["", "../escape", ".hidden", "with space"] {
            assert!(matches!(omx.put(name, &array, false), Err(Error::InvalidName(_))));
        }
        assert_eq!(omx.shape(), (0, 0));
    }

    #[test]
    fn test_compressed_matrices_survive_reopen() {
        let dir = tempdir().unwrap();
        let config = ContainerConfig::default()
            .with_mode(crate::config::Mode::Create)
            .with_compression(3);
        let array = DenseArray::from_rows(&[[1.0f32, 0.0, 0.0], [0.0, 2.0, 0.0]]).unwrap();
        {
            let mut omx = OpenMatrix::open_with(dir.path(), config).unwrap();
            let handle = omx.put("time", &array, false).unwrap();
            assert_eq!(handle.codec(), Codec::Zstd);
            omx.create_blank("blank", DataType::F64, &[]).unwrap();
        }

        let omx = OpenMatrix::open_read(dir.path()).unwrap();
        assert_eq!(omx.shape(), (2, 3));
        assert_eq!(omx.matrix_names(), vec!["blank", "time"]);
        assert_eq!(omx.matrix::<f32>("time").unwrap(), array);
        assert_eq!(omx.get("blank").unwrap().codec(), Codec::Zstd);
    }

    #[test]
    fn test_import_matrices() {
        let dir = tempdir().unwrap();
        let mut source = OpenMatrix::create(dir.path().join("a")).unwrap();
        source.put("time", &DenseArray::from_rows(&[[1u32, 2], [3, 4]]).unwrap(), false).unwrap();
        source.put("cost", &DenseArray::from_rows(&[[5u32, 6], [7, 8]]).unwrap(), false).unwrap();

        let mut target = OpenMatrix::create(dir.path().join("b")).unwrap();
        target.put("time", &DenseArray::from_rows(&[[0u32, 0], [0, 0]]).unwrap(), false).unwrap();

        let copied = target.import_matrices(&source, Some(&["time"][..])).unwrap();
        assert_eq!(copied, vec!["time"]);
        assert_eq!(target.matrix::<u32>("time").unwrap().as_slice(), &[1, 2, 3, 4]);
        assert!(!target.contains_matrix("cost"));

        target.import_matrices(&source, None).unwrap();
        assert_eq!(target.matrix_names(), vec!["cost", "time"]);

        assert!(matches!(
            target.import_matrices(&source, Some(&["missing"][..])),
            Err(Error::NotFound { .. })
        ));
    }
}
