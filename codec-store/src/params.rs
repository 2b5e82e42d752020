//! Configuration parameters and their structural descriptors.
//!
//! A parameter structure is identified by an opaque [`ParamIndex`]. Components
//! hand those indices back from their configuration surface; callers interpret
//! them through [`DescriptorResolver`], which asks the registered
//! [`ParamReflector`]s and caches every descriptor it builds.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::status::Status;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParamIndex(pub u32);

impl fmt::Display for ParamIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    Str(String),
    Blob(Bytes),
}

impl ParamValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            ParamValue::I32(_) => FieldType::Int32,
            ParamValue::U32(_) => FieldType::Uint32,
            ParamValue::I64(_) => FieldType::Int64,
            ParamValue::U64(_) => FieldType::Uint64,
            ParamValue::F32(_) => FieldType::Float,
            ParamValue::Str(_) => FieldType::String,
            ParamValue::Blob(_) => FieldType::Blob,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub index: ParamIndex,
    pub value: ParamValue,
}

impl Param {
    pub fn new(index: ParamIndex, value: ParamValue) -> Self {
        Self { index, value }
    }
}

/// Entry of a `supported_params` listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ParamDescriptor {
    pub index: ParamIndex,
    pub name: String,
    pub read_only: bool,
}

/// Why a single parameter in a `config` call was not applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SettingFailure {
    pub index: ParamIndex,
    pub status: Status,
    pub reason: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Int32,
    Uint32,
    Int64,
    Uint64,
    Float,
    String,
    Blob,
    /// Nested structure, described under its own index.
    Struct(ParamIndex),
}

impl FieldType {
    /// Byte size of one element, when the type fixes it.
    pub fn element_size(&self) -> Option<u32> {
        match self {
            FieldType::Int32 | FieldType::Uint32 | FieldType::Float => Some(4),
            FieldType::Int64 | FieldType::Uint64 => Some(8),
            FieldType::String | FieldType::Blob => Some(1),
            FieldType::Struct(_) => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: FieldType,
    /// Offset from the start of the structure, in bytes.
    pub offset: u32,
    /// Size of one element, in bytes.
    pub size: u32,
    /// Number of elements; 0 marks a flexible trailing array.
    pub extent: u32,
}

impl FieldDescriptor {
    /// Scalar field of a fixed-size type. Nested structures go through [`FieldDescriptor::nested`].
    pub fn scalar(name: impl Into<String>, field_type: FieldType, offset: u32) -> Self {
        Self {
            name: name.into(),
            field_type,
            offset,
            size: field_type.element_size().unwrap_or(0),
            extent: 1,
        }
    }

    pub fn array(name: impl Into<String>, field_type: FieldType, offset: u32, extent: u32) -> Self {
        Self {
            extent,
            ..Self::scalar(name, field_type, offset)
        }
    }

    pub fn nested(name: impl Into<String>, index: ParamIndex, offset: u32, size: u32) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::Struct(index),
            offset,
            size,
            extent: 1,
        }
    }

    /// First byte past the field; `None` when it would run past the offset space.
    fn end(&self) -> Option<u32> {
        self.size
            .checked_mul(self.extent.max(1))
            .and_then(|len| self.offset.checked_add(len))
    }
}

/// Field layout of one parameter structure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructDescriptor {
    pub index: ParamIndex,
    pub fields: Vec<FieldDescriptor>,
}

impl StructDescriptor {
    pub fn new(index: ParamIndex, fields: Vec<FieldDescriptor>) -> Self {
        Self { index, fields }
    }

    /// Minimum byte size, ignoring flexible trailing elements beyond the first.
    pub fn size(&self) -> u32 {
        self.fields
            .iter()
            .map(|f| f.end().unwrap_or(u32::MAX))
            .max()
            .unwrap_or(0)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields must fit in the offset space, must not overlap, and only the
    /// last one may be flexible.
    fn is_well_formed(&self) -> bool {
        let mut fields: Vec<&FieldDescriptor> = self.fields.iter().collect();
        fields.sort_by_key(|f| f.offset);
        let last = fields.len().saturating_sub(1);
        for (i, f) in fields.iter().enumerate() {
            let Some(end) = f.end() else {
                return false;
            };
            if f.extent == 0 && i != last {
                return false;
            }
            if let Some(next) = fields.get(i + 1) {
                if end > next.offset {
                    return false;
                }
            }
        }
        true
    }
}

/// Source of structural descriptors, usually backed by a component module.
pub trait ParamReflector: Send + Sync {
    /// Returns `None` when the index is unknown to this reflector.
    fn describe(&self, index: ParamIndex) -> Option<StructDescriptor>;
}

/// Reflector over a precomputed table.
#[derive(Default)]
pub struct StaticReflector {
    descriptors: HashMap<ParamIndex, StructDescriptor>,
}

impl StaticReflector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, descriptor: StructDescriptor) -> Self {
        self.descriptors.insert(descriptor.index, descriptor);
        self
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

impl ParamReflector for StaticReflector {
    fn describe(&self, index: ParamIndex) -> Option<StructDescriptor> {
        self.descriptors.get(&index).cloned()
    }
}

/// Outcome of a best-effort descriptor lookup.
#[derive(Clone, Debug, Default)]
pub struct DescriptorQuery {
    pub descriptors: Vec<Arc<StructDescriptor>>,
    pub unresolved: Vec<ParamIndex>,
}

impl DescriptorQuery {
    /// `NotFound` as soon as one requested index was not resolved.
    pub fn status(&self) -> Status {
        if self.unresolved.is_empty() {
            Status::Ok
        } else {
            Status::NotFound
        }
    }
}

/// Lazily resolves and caches descriptors.
///
/// A cache slot is only written once the descriptor is fully built, so
/// concurrent readers see either nothing or the complete `Arc`. Misses are
/// not cached; the reflectors are asked again next time, so the cache only
/// grows with descriptors that exist.
pub struct DescriptorResolver {
    reflectors: Vec<Arc<dyn ParamReflector>>,
    cache: RwLock<HashMap<ParamIndex, Arc<StructDescriptor>>>,
}

impl DescriptorResolver {
    pub fn new(reflectors: Vec<Arc<dyn ParamReflector>>) -> Self {
        Self {
            reflectors,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn resolve(&self, indices: &[ParamIndex]) -> DescriptorQuery {
        let mut query = DescriptorQuery::default();
        let mut seen = HashSet::with_capacity(indices.len());
        for &index in indices {
            if !seen.insert(index) {
                continue;
            }
            match self.describe(index) {
                Some(descriptor) => query.descriptors.push(descriptor),
                None => query.unresolved.push(index),
            }
        }
        if !query.unresolved.is_empty() {
            log::debug!("unresolved param indices: {:?}", query.unresolved);
        }
        query
    }

    pub fn describe(&self, index: ParamIndex) -> Option<Arc<StructDescriptor>> {
        if let Some(descriptor) = self.cache.read().get(&index) {
            return Some(descriptor.clone());
        }

        let computed = self
            .reflectors
            .iter()
            .filter_map(|r| r.describe(index))
            .find(|d| {
                if d.index != index {
                    log::warn!("reflector answered {} with descriptor for {}", index, d.index);
                    return false;
                }
                if !d.is_well_formed() {
                    log::warn!("reflector returned malformed descriptor for {}", index);
                    return false;
                }
                true
            })
            .map(Arc::new)?;

        // Another thread may have raced us here; keep whichever landed first.
        Some(
            self.cache
                .write()
                .entry(index)
                .or_insert(computed)
                .clone(),
        )
    }

    pub fn cached(&self) -> usize {
        self.cache.read().len()
    }
}
