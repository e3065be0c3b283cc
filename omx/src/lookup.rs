//! Lookups and identifier resolution
//!
//! A lookup is a one-dimensional array of identifiers aligned with one of
//! the container dimensions. Numeric lookups are stored like matrices;
//! label lookups are stored as fixed-width, NUL-padded UTF-8.
//!
//! Resolution maps identifier values to positions (see
//! [`omx_core::resolve`]). The reverse map (position to identifier) is
//! cached per lookup and checked against the entry's on-disk generation
//! before reuse.

use std::fmt;
use std::sync::Arc;

use hashbrown::HashMap;
use omx_core::{
    checked_byte_len, CoreError, DataType, ElementType, EntryHeader, EntryKind, LookupKey,
    Resolver, MAX_LABEL_STRIDE,
};
use rayon::prelude::*;
use tracing::debug;

use crate::container::{check_name, OpenMatrix};
use crate::error::{Error, Result};
use crate::storage::EntryFile;

/// Query batches at least this large are resolved in parallel
pub const PARALLEL_RESOLVE_THRESHOLD: usize = 1 << 14;

/// Identifiers of one lookup
#[derive(Debug, Clone, PartialEq)]
pub enum LookupArray {
    F32(Vec<f32>),
    F64(Vec<f64>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    U32(Vec<u32>),
    U64(Vec<u64>),
    Label(Vec<String>),
}

/// A single identifier
#[derive(Debug, Clone, PartialEq)]
pub enum LookupValue {
    F32(f32),
    F64(f64),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    Label(String),
}

impl fmt::Display for LookupValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupValue::F32(v) => write!(f, "{v}"),
            LookupValue::F64(v) => write!(f, "{v}"),
            LookupValue::I32(v) => write!(f, "{v}"),
            LookupValue::I64(v) => write!(f, "{v}"),
            LookupValue::U32(v) => write!(f, "{v}"),
            LookupValue::U64(v) => write!(f, "{v}"),
            LookupValue::Label(v) => write!(f, "{v}"),
        }
    }
}

macro_rules! dispatch_numeric {
    ($self:expr, $values:ident => $numeric:expr, $labels:ident => $label:expr) => {
        match $self {
            LookupArray::F32($values) => $numeric,
            LookupArray::F64($values) => $numeric,
            LookupArray::I32($values) => $numeric,
            LookupArray::I64($values) => $numeric,
            LookupArray::U32($values) => $numeric,
            LookupArray::U64($values) => $numeric,
            LookupArray::Label($labels) => $label,
        }
    };
}

impl LookupArray {
    pub fn len(&self) -> usize {
        dispatch_numeric!(self, v => v.len(), l => l.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            LookupArray::F32(_) => ElementType::Numeric(DataType::F32),
            LookupArray::F64(_) => ElementType::Numeric(DataType::F64),
            LookupArray::I32(_) => ElementType::Numeric(DataType::I32),
            LookupArray::I64(_) => ElementType::Numeric(DataType::I64),
            LookupArray::U32(_) => ElementType::Numeric(DataType::U32),
            LookupArray::U64(_) => ElementType::Numeric(DataType::U64),
            LookupArray::Label(_) => ElementType::Label,
        }
    }

    /// Identifier at `position`
    pub fn get(&self, position: usize) -> Option<LookupValue> {
        match self {
            LookupArray::F32(v) => v.get(position).copied().map(LookupValue::F32),
            LookupArray::F64(v) => v.get(position).copied().map(LookupValue::F64),
            LookupArray::I32(v) => v.get(position).copied().map(LookupValue::I32),
            LookupArray::I64(v) => v.get(position).copied().map(LookupValue::I64),
            LookupArray::U32(v) => v.get(position).copied().map(LookupValue::U32),
            LookupArray::U64(v) => v.get(position).copied().map(LookupValue::U64),
            LookupArray::Label(v) => v.get(position).cloned().map(LookupValue::Label),
        }
    }

    /// Typed identifiers, if the element type is `T`
    pub fn as_slice<T: LookupElement>(&self) -> Option<&[T]> {
        T::view(self)
    }

    /// Parse textual values as identifiers of `element`
    pub fn parse<S: AsRef<str>>(element: ElementType, values: &[S]) -> Result<Self> {
        fn parse_all<T: std::str::FromStr, S: AsRef<str>>(values: &[S]) -> Result<Vec<T>> {
            values
                .iter()
                .map(|v| {
                    let v = v.as_ref().trim();
                    v.parse()
                        .map_err(|_| Error::BadFormat(format!("'{v}' is not a valid identifier")))
                })
                .collect()
        }

        Ok(match element {
            ElementType::Numeric(DataType::F32) => LookupArray::F32(parse_all(values)?),
            ElementType::Numeric(DataType::F64) => LookupArray::F64(parse_all(values)?),
            ElementType::Numeric(DataType::I32) => LookupArray::I32(parse_all(values)?),
            ElementType::Numeric(DataType::I64) => LookupArray::I64(parse_all(values)?),
            ElementType::Numeric(DataType::U32) => LookupArray::U32(parse_all(values)?),
            ElementType::Numeric(DataType::U64) => LookupArray::U64(parse_all(values)?),
            ElementType::Label => {
                LookupArray::Label(values.iter().map(|v| v.as_ref().to_string()).collect())
            }
        })
    }

    /// Header and payload bytes for this lookup
    fn encode(&self) -> Result<(EntryHeader, Vec<u8>)> {
        let count = self.len() as u64;
        match self {
            LookupArray::Label(labels) => {
                let stride = label_stride(labels)?;
                let header = EntryHeader::for_labels(count, stride).map_err(Error::Core)?;
                let len = checked_byte_len(count, stride as usize).map_err(Error::Core)?;
                let mut payload = vec![0u8; len];
                for (slot, label) in payload.chunks_exact_mut(stride as usize).zip(labels) {
                    slot[..label.len()].copy_from_slice(label.as_bytes());
                }
                Ok((header, payload))
            }
            _ => {
                let ElementType::Numeric(data_type) = self.element_type() else {
                    return Err(Error::Core(CoreError::UnsupportedFormat));
                };
                let header = EntryHeader::new(EntryKind::Lookup, data_type, &[count])
                    .map_err(Error::Core)?;
                let payload: Vec<u8> = dispatch_numeric!(
                    self,
                    v => bytemuck::cast_slice::<_, u8>(v.as_slice()).to_vec(),
                    _labels => Vec::new()
                );
                Ok((header, payload))
            }
        }
    }

    fn decode(header: &EntryHeader, payload: &[u8]) -> Result<Self> {
        Ok(match header.element {
            ElementType::Numeric(DataType::F32) => {
                LookupArray::F32(bytemuck::pod_collect_to_vec(payload))
            }
            ElementType::Numeric(DataType::F64) => {
                LookupArray::F64(bytemuck::pod_collect_to_vec(payload))
            }
            ElementType::Numeric(DataType::I32) => {
                LookupArray::I32(bytemuck::pod_collect_to_vec(payload))
            }
            ElementType::Numeric(DataType::I64) => {
                LookupArray::I64(bytemuck::pod_collect_to_vec(payload))
            }
            ElementType::Numeric(DataType::U32) => {
                LookupArray::U32(bytemuck::pod_collect_to_vec(payload))
            }
            ElementType::Numeric(DataType::U64) => {
                LookupArray::U64(bytemuck::pod_collect_to_vec(payload))
            }
            ElementType::Label => {
                let labels = payload
                    .chunks_exact(header.label_stride as usize)
                    .map(|slot| {
                        let end = slot.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
                        String::from_utf8(slot[..end].to_vec())
                            .map_err(|_| Error::Core(CoreError::CorruptedData))
                    })
                    .collect::<Result<Vec<_>>>()?;
                LookupArray::Label(labels)
            }
        })
    }
}

/// Fixed width wide enough for every label
fn label_stride(labels: &[String]) -> Result<u32> {
    if let Some(label) = labels.iter().find(|l| l.contains('\0')) {
        return Err(Error::BadFormat(format!("label {label:?} contains a NUL byte")));
    }
    let widest = labels.iter().map(String::len).max().unwrap_or(0).max(1);
    match u32::try_from(widest) {
        Ok(stride) if stride <= MAX_LABEL_STRIDE => Ok(stride),
        _ => Err(Error::BadFormat(format!(
            "labels longer than {MAX_LABEL_STRIDE} bytes are not supported"
        ))),
    }
}

/// Identifier types that can be stored in and resolved against a lookup
pub trait LookupElement: LookupKey + Clone + Send + Sync + Sized + 'static {
    fn element_type() -> ElementType;
    fn wrap(values: Vec<Self>) -> LookupArray;
    fn view(array: &LookupArray) -> Option<&[Self]>;
}

macro_rules! impl_lookup_element {
    ($type:ty, $variant:ident, $element:expr) => {
        impl LookupElement for $type {
            fn element_type() -> ElementType {
                $element
            }

            fn wrap(values: Vec<Self>) -> LookupArray {
                LookupArray::$variant(values)
            }

            fn view(array: &LookupArray) -> Option<&[Self]> {
                match array {
                    LookupArray::$variant(values) => Some(values.as_slice()),
                    _ => None,
                }
            }
        }
    };
}

impl_lookup_element!(f32, F32, ElementType::Numeric(DataType::F32));
impl_lookup_element!(f64, F64, ElementType::Numeric(DataType::F64));
impl_lookup_element!(i32, I32, ElementType::Numeric(DataType::I32));
impl_lookup_element!(i64, I64, ElementType::Numeric(DataType::I64));
impl_lookup_element!(u32, U32, ElementType::Numeric(DataType::U32));
impl_lookup_element!(u64, U64, ElementType::Numeric(DataType::U64));
impl_lookup_element!(String, Label, ElementType::Label);

impl<T: LookupElement> From<Vec<T>> for LookupArray {
    fn from(values: Vec<T>) -> Self {
        T::wrap(values)
    }
}

impl From<Vec<&str>> for LookupArray {
    fn from(values: Vec<&str>) -> Self {
        LookupArray::Label(values.into_iter().map(str::to_string).collect())
    }
}

/// Position to identifier map of one lookup
#[derive(Debug, Clone)]
pub struct ReverseLookup {
    generation: u64,
    map: HashMap<usize, LookupValue>,
}

impl ReverseLookup {
    fn build(array: &LookupArray, generation: u64) -> Self {
        let map = (0..array.len())
            .filter_map(|position| array.get(position).map(|value| (position, value)))
            .collect();
        Self { generation, map }
    }

    /// Identifier stored at `position`
    pub fn get(&self, position: usize) -> Option<&LookupValue> {
        self.map.get(&position)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Generation of the lookup entry this map was built from
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl OpenMatrix {
    /// Add a lookup aligned with the rows or columns
    ///
    /// The shape must already be set. Values need not be unique; uniqueness
    /// is only required when resolving.
    pub fn add_lookup<A: Into<LookupArray>>(&mut self, name: &str, values: A) -> Result<()> {
        check_name(name)?;
        self.ensure_writable()?;
        if self.lookups.contains_key(name) {
            return Err(Error::AlreadyExists {
                kind: EntryKind::Lookup,
                name: name.to_string(),
            });
        }
        self.write_lookup(name, &values.into(), 0)
    }

    /// Replace the values of an existing lookup
    pub fn replace_lookup<A: Into<LookupArray>>(&mut self, name: &str, values: A) -> Result<()> {
        check_name(name)?;
        self.ensure_writable()?;
        let previous = self
            .lookups
            .get(name)
            .ok_or_else(|| Error::not_found(EntryKind::Lookup, name))?;
        let generation = previous.generation.wrapping_add(1);
        self.write_lookup(name, &values.into(), generation)
    }

    fn write_lookup(&mut self, name: &str, values: &LookupArray, generation: u64) -> Result<()> {
        let shape = self.require_shape("adding a lookup")?;
        let len = values.len() as u64;
        if !shape.accepts_lookup_len(len) {
            return Err(self.shape_mismatch(&[len]));
        }

        let (mut header, payload) = values.encode()?;
        header.generation = generation;
        let path = self.entry_path(EntryKind::Lookup, name);
        let entry = EntryFile::write(&path, header, &payload, self.config.codec, self.config.level)?;

        self.lookups.insert(name.to_string(), *entry.header());
        self.reverse_cache.remove(name);
        debug!(
            lookup = %name,
            element = %values.element_type(),
            len,
            generation,
            "stored lookup"
        );
        Ok(())
    }

    /// Read the identifiers of a lookup
    pub fn get_lookup(&self, name: &str) -> Result<LookupArray> {
        if !self.lookups.contains_key(name) {
            return Err(Error::not_found(EntryKind::Lookup, name));
        }
        let entry = EntryFile::open(self.entry_path(EntryKind::Lookup, name))?;
        let payload = entry.read_payload()?;
        LookupArray::decode(entry.header(), &payload)
    }

    /// Element type of a lookup
    pub fn lookup_element_type(&self, name: &str) -> Result<ElementType> {
        self.lookups
            .get(name)
            .map(|header| header.element)
            .ok_or_else(|| Error::not_found(EntryKind::Lookup, name))
    }

    /// Positions of `queries` in the lookup `name`
    ///
    /// Each query resolves to the position of the smallest identifier that
    /// is greater than or equal to it, or to the last position when it
    /// exceeds every identifier. Fails with `NonUniqueLookup` when the
    /// lookup holds duplicate identifiers.
    pub fn resolve<T: LookupElement>(&self, name: &str, queries: &[T]) -> Result<Vec<usize>> {
        let lookup = self.get_lookup(name)?;
        let labels = T::view(&lookup).ok_or_else(|| Error::TypeMismatch {
            expected: lookup.element_type(),
            found: T::element_type(),
        })?;

        let resolver = Resolver::new(labels).map_err(|e| match e {
            CoreError::NonUniqueLookup => Error::NonUniqueLookup {
                name: name.to_string(),
            },
            other => Error::Core(other),
        })?;

        if queries.len() >= PARALLEL_RESOLVE_THRESHOLD {
            Ok(queries.par_iter().map(|q| resolver.position(q)).collect())
        } else {
            Ok(resolver.resolve_all(queries))
        }
    }

    /// Resolve untyped queries, which must share the lookup's element type
    pub fn resolve_array(&self, name: &str, queries: &LookupArray) -> Result<Vec<usize>> {
        match queries {
            LookupArray::F32(q) => self.resolve(name, q),
            LookupArray::F64(q) => self.resolve(name, q),
            LookupArray::I32(q) => self.resolve(name, q),
            LookupArray::I64(q) => self.resolve(name, q),
            LookupArray::U32(q) => self.resolve(name, q),
            LookupArray::U64(q) => self.resolve(name, q),
            LookupArray::Label(q) => self.resolve(name, q),
        }
    }

    /// Position to identifier map for `name`, built on first use
    ///
    /// A cached map is reused only while the lookup entry on disk still
    /// carries the generation the map was built from.
    pub fn reverse(&mut self, name: &str) -> Result<Arc<ReverseLookup>> {
        if !self.lookups.contains_key(name) {
            return Err(Error::not_found(EntryKind::Lookup, name));
        }
        let current = EntryFile::read_header(self.entry_path(EntryKind::Lookup, name))?.generation;

        if let Some(cached) = self.reverse_cache.get(name) {
            if cached.generation == current {
                return Ok(Arc::clone(cached));
            }
        }

        let lookup = self.get_lookup(name)?;
        let reverse = Arc::new(ReverseLookup::build(&lookup, current));
        self.reverse_cache.insert(name.to_string(), Arc::clone(&reverse));
        debug!(lookup = %name, generation = current, len = reverse.len(), "built reverse lookup");
        Ok(reverse)
    }

    /// Drop the cached reverse map of one lookup
    pub fn invalidate_reverse(&mut self, name: &str) -> bool {
        self.reverse_cache.remove(name).is_some()
    }

    pub fn clear_reverse_cache(&mut self) {
        self.reverse_cache.clear();
    }
}
