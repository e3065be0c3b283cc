//! In-memory dense arrays exchanged with the container
//!
//! Matrices are stored row-major. [`DenseArray`] is the typed form and
//! [`DynamicArray`] carries any of the supported element types when the
//! type is only known at runtime.

use omx_core::{checked_byte_len, checked_element_count, CoreError, DataType, MatrixElement};

use crate::error::{Error, Result};

/// Row-major dense array with up to four dimensions
#[derive(Debug, Clone, PartialEq)]
pub struct DenseArray<T> {
    dims: Vec<u64>,
    data: Vec<T>,
}

impl<T: MatrixElement> DenseArray<T> {
    /// Wrap `data` with the given dimensions
    pub fn new(dims: Vec<u64>, data: Vec<T>) -> Result<Self> {
        let count = checked_element_count(&dims).map_err(Error::Core)?;
        if count != data.len() as u64 {
            return Err(Error::BadFormat(format!(
                "{} elements do not fill dimensions {:?}",
                data.len(),
                dims
            )));
        }
        Ok(Self { dims, data })
    }

    /// Zero-filled array
    pub fn zeros(dims: Vec<u64>) -> Result<Self> {
        let count = checked_element_count(&dims).map_err(Error::Core)?;
        let count = usize::try_from(count).map_err(|_| Error::Core(CoreError::ArraySizeOverflow))?;
        Ok(Self {
            dims,
            data: vec![T::default(); count],
        })
    }

    /// Build a 2-D array from equally long rows
    pub fn from_rows<R: AsRef<[T]>>(rows: &[R]) -> Result<Self> {
        let cols = rows.first().map_or(0, |row| row.as_ref().len());
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            let row = row.as_ref();
            if row.len() != cols {
                return Err(Error::BadFormat("rows differ in length".to_string()));
            }
            data.extend_from_slice(row);
        }
        Self::new(vec![rows.len() as u64, cols as u64], data)
    }

    pub(crate) fn from_bytes(dims: Vec<u64>, bytes: &[u8]) -> Result<Self> {
        let count = checked_element_count(&dims).map_err(Error::Core)?;
        let expected = checked_byte_len(count, T::size_bytes()).map_err(Error::Core)?;
        if bytes.len() != expected {
            return Err(Error::Core(CoreError::CorruptedData));
        }
        // Copies, so decoded buffers need not be aligned for T
        let data = bytemuck::pod_collect_to_vec::<u8, T>(bytes);
        Ok(Self { dims, data })
    }

    pub fn dims(&self) -> &[u64] {
        &self.dims
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data_type(&self) -> DataType {
        T::data_type()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    /// Element at a full multi-dimensional index
    pub fn get(&self, index: &[u64]) -> Option<T> {
        if index.len() != self.dims.len() {
            return None;
        }
        let mut flat = 0u64;
        for (&i, &dim) in index.iter().zip(&self.dims) {
            if i >= dim {
                return None;
            }
            flat = flat * dim + i;
        }
        self.data.get(flat as usize).copied()
    }

    /// Values converted to f64
    pub fn to_f64(&self) -> Vec<f64> {
        self.data.iter().map(|v| v.to_f64()).collect()
    }

    /// Convert every element to another element type
    pub fn cast<U: MatrixElement>(&self) -> DenseArray<U> {
        DenseArray {
            dims: self.dims.clone(),
            data: self.data.iter().map(|v| U::from_f64(v.to_f64())).collect(),
        }
    }
}

/// Dense array holding any supported element type
#[derive(Debug, Clone, PartialEq)]
pub enum DynamicArray {
    F32(DenseArray<f32>),
    F64(DenseArray<f64>),
    I32(DenseArray<i32>),
    I64(DenseArray<i64>),
    U32(DenseArray<u32>),
    U64(DenseArray<u64>),
}

macro_rules! dispatch {
    ($self:expr, $array:ident => $body:expr) => {
        match $self {
            DynamicArray::F32($array) => $body,
            DynamicArray::F64($array) => $body,
            DynamicArray::I32($array) => $body,
            DynamicArray::I64($array) => $body,
            DynamicArray::U32($array) => $body,
            DynamicArray::U64($array) => $body,
        }
    };
}

impl DynamicArray {
    /// Zero-filled array of `data_type`
    pub fn zeros(data_type: DataType, dims: Vec<u64>) -> Result<Self> {
        Ok(match data_type {
            DataType::F32 => DynamicArray::F32(DenseArray::zeros(dims)?),
            DataType::F64 => DynamicArray::F64(DenseArray::zeros(dims)?),
            DataType::I32 => DynamicArray::I32(DenseArray::zeros(dims)?),
            DataType::I64 => DynamicArray::I64(DenseArray::zeros(dims)?),
            DataType::U32 => DynamicArray::U32(DenseArray::zeros(dims)?),
            DataType::U64 => DynamicArray::U64(DenseArray::zeros(dims)?),
        })
    }

    pub(crate) fn from_bytes(data_type: DataType, dims: Vec<u64>, bytes: &[u8]) -> Result<Self> {
        Ok(match data_type {
            DataType::F32 => DynamicArray::F32(DenseArray::from_bytes(dims, bytes)?),
            DataType::F64 => DynamicArray::F64(DenseArray::from_bytes(dims, bytes)?),
            DataType::I32 => DynamicArray::I32(DenseArray::from_bytes(dims, bytes)?),
            DataType::I64 => DynamicArray::I64(DenseArray::from_bytes(dims, bytes)?),
            DataType::U32 => DynamicArray::U32(DenseArray::from_bytes(dims, bytes)?),
            DataType::U64 => DynamicArray::U64(DenseArray::from_bytes(dims, bytes)?),
        })
    }

    pub fn data_type(&self) -> DataType {
        dispatch!(self, a => a.data_type())
    }

    pub fn dims(&self) -> &[u64] {
        dispatch!(self, a => a.dims())
    }

    pub fn rank(&self) -> usize {
        self.dims().len()
    }

    pub fn len(&self) -> usize {
        dispatch!(self, a => a.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at a full index, as f64
    pub fn get_f64(&self, index: &[u64]) -> Option<f64> {
        dispatch!(self, a => a.get(index).map(|v| v.to_f64()))
    }

    pub fn to_f64(&self) -> Vec<f64> {
        dispatch!(self, a => a.to_f64())
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        dispatch!(self, a => a.as_bytes())
    }

    /// Typed view, if the element type is `T`
    pub fn as_typed<T: DynamicElement>(&self) -> Option<&DenseArray<T>> {
        T::view(self)
    }

    /// Typed array, if the element type is `T`
    pub fn into_typed<T: DynamicElement>(self) -> Option<DenseArray<T>> {
        T::unwrap(self)
    }
}

impl<T: DynamicElement> From<DenseArray<T>> for DynamicArray {
    fn from(array: DenseArray<T>) -> Self {
        T::wrap(array)
    }
}

/// Element types that can move in and out of [`DynamicArray`]
pub trait DynamicElement: MatrixElement + Sized {
    fn wrap(array: DenseArray<Self>) -> DynamicArray;
    fn unwrap(array: DynamicArray) -> Option<DenseArray<Self>>;
    fn view(array: &DynamicArray) -> Option<&DenseArray<Self>>;
}

macro_rules! impl_dynamic_element {
    ($type:ty, $variant:ident) => {
        impl DynamicElement for $type {
            fn wrap(array: DenseArray<Self>) -> DynamicArray {
                DynamicArray::$variant(array)
            }

            fn unwrap(array: DynamicArray) -> Option<DenseArray<Self>> {
                match array {
                    DynamicArray::$variant(a) => Some(a),
                    _ => None,
                }
            }

            fn view(array: &DynamicArray) -> Option<&DenseArray<Self>> {
                match array {
                    DynamicArray::$variant(a) => Some(a),
                    _ => None,
                }
            }
        }
    };
}

impl_dynamic_element!(f32, F32);
impl_dynamic_element!(f64, F64);
impl_dynamic_element!(i32, I32);
impl_dynamic_element!(i64, I64);
impl_dynamic_element!(u32, U32);
impl_dynamic_element!(u64, U64);
