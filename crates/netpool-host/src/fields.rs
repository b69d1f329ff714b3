//! Reflected fields: type tags, values and per-entity storage.
//!
//! The host exposes a small reflection facility so the pooling layer can put
//! a recycled entity's gameplay fields back to their class defaults without
//! knowing the concrete entity type. Classes declare [`FieldDescriptor`]s;
//! every live entity carries a [`FieldStore`] seeded from those defaults.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entity::EntityId;

// ---------------------------------------------------------------------------
// FieldType / FieldValue
// ---------------------------------------------------------------------------

/// Type tag of a reflected field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    Bool,
    Int,
    Float,
    Text,
    /// Reference to another entity.
    Reference,
    /// Aggregate of other fields. `plain_old_data` is set when the aggregate
    /// holds no references or owned resources and can be copied bytewise.
    Struct { plain_old_data: bool },
    Array(Box<FieldType>),
}

/// Value of a reflected field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Reference(Option<EntityId>),
    Struct(Vec<FieldValue>),
    Array(Vec<FieldValue>),
}

// ---------------------------------------------------------------------------
// FieldDescriptor
// ---------------------------------------------------------------------------

/// Declaration of a single reflected field on a class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub ty: FieldType,
    /// Value a freshly constructed instance holds.
    pub default: FieldValue,
    /// Transient fields are runtime-only state and never reset or saved.
    pub transient: bool,
}

impl FieldDescriptor {
    pub fn new(name: &str, ty: FieldType, default: FieldValue) -> Self {
        Self {
            name: name.to_owned(),
            ty,
            default,
            transient: false,
        }
    }

    /// Mark the field transient.
    pub fn transient(mut self) -> Self {
        self.transient = true;
        self
    }
}

// ---------------------------------------------------------------------------
// FieldStore
// ---------------------------------------------------------------------------

/// Live field values of one entity, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldStore {
    values: BTreeMap<String, FieldValue>,
}

impl FieldStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.values.get(name)
    }

    /// Overwrite (or insert) a field value.
    pub fn set(&mut self, name: &str, value: FieldValue) {
        self.values.insert(name.to_owned(), value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}
