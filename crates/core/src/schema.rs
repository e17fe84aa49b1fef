//! Per-type schema descriptions
//!
//! A `TypeDescription` is the full, immutable schema of a registered type:
//! the primary-key field, the unique-key fields, and the index descriptors
//! (scalar or list, ordered or not), each with a declared data kind. The
//! set of indexes a type carries is fixed here at registration; nothing is
//! inferred at runtime.

use crate::error::{GranaryError, Result};
use crate::key::KeyKind;
use crate::record::Record;
use serde::{Deserialize, Serialize};

/// A named field with a declared data kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Key name, unique within the type across all roles
    pub name: String,
    /// Declared data kind
    pub kind: KeyKind,
}

impl FieldDescriptor {
    /// Create a field descriptor
    pub fn new(name: impl Into<String>, kind: KeyKind) -> Self {
        FieldDescriptor {
            name: name.into(),
            kind,
        }
    }
}

/// An index declaration: the field plus how it is indexed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    /// The indexed field
    pub field: FieldDescriptor,
    /// Also maintain a sorted map for range predicates
    pub ordered: bool,
    /// The field holds a set of scalars; each element indexes the record
    pub list: bool,
}

impl IndexDescriptor {
    /// Declare an unordered dictionary index
    pub fn dictionary(name: impl Into<String>, kind: KeyKind) -> Self {
        IndexDescriptor {
            field: FieldDescriptor::new(name, kind),
            ordered: false,
            list: false,
        }
    }

    /// Declare an ordered index (dictionary + sorted map)
    pub fn ordered(name: impl Into<String>, kind: KeyKind) -> Self {
        IndexDescriptor {
            field: FieldDescriptor::new(name, kind),
            ordered: true,
            list: false,
        }
    }

    /// Declare a list index
    pub fn list(name: impl Into<String>, kind: KeyKind) -> Self {
        IndexDescriptor {
            field: FieldDescriptor::new(name, kind),
            ordered: false,
            list: true,
        }
    }
}

/// The full immutable schema of a registered type
///
/// Registering the same type name twice is an idempotent ack when the two
/// descriptions are equal, and a `SchemaMismatch` error when they differ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescription {
    /// Full type name, the identity of the collection
    pub type_name: String,
    /// Primary-key field (mandatory, unique within the type)
    pub primary: FieldDescriptor,
    /// Unique-key fields, in declaration order
    pub unique: Vec<FieldDescriptor>,
    /// Index declarations, in declaration order
    pub indexes: Vec<IndexDescriptor>,
}

impl TypeDescription {
    /// Create a description with only a primary key
    pub fn new(type_name: impl Into<String>, primary: FieldDescriptor) -> Self {
        TypeDescription {
            type_name: type_name.into(),
            primary,
            unique: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Add a unique-key field (builder style)
    pub fn with_unique(mut self, field: FieldDescriptor) -> Self {
        self.unique.push(field);
        self
    }

    /// Add an index declaration (builder style)
    pub fn with_index(mut self, index: IndexDescriptor) -> Self {
        self.indexes.push(index);
        self
    }

    /// Check the description itself is well formed
    ///
    /// Key names must be distinct across every role; a duplicate would make
    /// `Record::scalar` ambiguous and index maintenance ill-defined.
    pub fn check(&self) -> Result<()> {
        let mut seen = std::collections::BTreeSet::new();
        seen.insert(self.primary.name.as_str());
        for f in &self.unique {
            if !seen.insert(f.name.as_str()) {
                return Err(GranaryError::schema_mismatch(
                    &self.type_name,
                    format!("duplicate key name '{}'", f.name),
                ));
            }
        }
        for ix in &self.indexes {
            if !seen.insert(ix.field.name.as_str()) {
                return Err(GranaryError::schema_mismatch(
                    &self.type_name,
                    format!("duplicate key name '{}'", ix.field.name),
                ));
            }
        }
        Ok(())
    }

    /// Find the declared kind and shape of a key name
    ///
    /// Returns `(kind, is_list)` or None for an undeclared name.
    pub fn key_shape(&self, key_name: &str) -> Option<(KeyKind, bool)> {
        if self.primary.name == key_name {
            return Some((self.primary.kind, false));
        }
        if let Some(f) = self.unique.iter().find(|f| f.name == key_name) {
            return Some((f.kind, false));
        }
        self.indexes
            .iter()
            .find(|ix| ix.field.name == key_name)
            .map(|ix| (ix.field.kind, ix.list))
    }

    /// Whether the key name is the primary key
    pub fn is_primary(&self, key_name: &str) -> bool {
        self.primary.name == key_name
    }

    /// Whether the key name is a declared unique key
    pub fn is_unique(&self, key_name: &str) -> bool {
        self.unique.iter().any(|f| f.name == key_name)
    }

    /// Validate a record against this description
    ///
    /// Every key value the record carries must be declared with the same
    /// kind and shape. Unique and index keys are optional per record; the
    /// primary key is enforced structurally (a `Record` always has one).
    pub fn validate(&self, record: &Record) -> Result<()> {
        if record.primary.kind() != self.primary.kind {
            return Err(GranaryError::schema_mismatch(
                &self.type_name,
                format!(
                    "primary key '{}' declared {} but value is {}",
                    self.primary.name,
                    self.primary.kind,
                    record.primary.kind()
                ),
            ));
        }
        for (name, value) in &record.unique {
            match self.unique.iter().find(|f| &f.name == name) {
                Some(f) if f.kind == value.kind() => {}
                Some(f) => {
                    return Err(GranaryError::schema_mismatch(
                        &self.type_name,
                        format!("unique key '{}' declared {} but value is {}", name, f.kind, value.kind()),
                    ))
                }
                None => {
                    return Err(GranaryError::schema_mismatch(
                        &self.type_name,
                        format!("undeclared unique key '{}'", name),
                    ))
                }
            }
        }
        for (name, value) in &record.index {
            match self.indexes.iter().find(|ix| &ix.field.name == name) {
                Some(ix) if ix.list => {
                    return Err(GranaryError::schema_mismatch(
                        &self.type_name,
                        format!("key '{}' is a list index but carries a scalar", name),
                    ))
                }
                Some(ix) if ix.field.kind == value.kind() => {}
                Some(ix) => {
                    return Err(GranaryError::schema_mismatch(
                        &self.type_name,
                        format!(
                            "index key '{}' declared {} but value is {}",
                            name,
                            ix.field.kind,
                            value.kind()
                        ),
                    ))
                }
                None => {
                    return Err(GranaryError::schema_mismatch(
                        &self.type_name,
                        format!("undeclared index key '{}'", name),
                    ))
                }
            }
        }
        for (name, values) in &record.list {
            match self.indexes.iter().find(|ix| &ix.field.name == name) {
                Some(ix) if !ix.list => {
                    return Err(GranaryError::schema_mismatch(
                        &self.type_name,
                        format!("key '{}' is a scalar index but carries a list", name),
                    ))
                }
                Some(ix) => {
                    if let Some(bad) = values.iter().find(|v| v.kind() != ix.field.kind) {
                        return Err(GranaryError::schema_mismatch(
                            &self.type_name,
                            format!(
                                "list key '{}' declared {} but element is {}",
                                name,
                                ix.field.kind,
                                bad.kind()
                            ),
                        ));
                    }
                }
                None => {
                    return Err(GranaryError::schema_mismatch(
                        &self.type_name,
                        format!("undeclared list key '{}'", name),
                    ))
                }
            }
        }
        Ok(())
    }
}
