//! Index store schema declaration
//!
//! A `Schema` is a list of indexes, each holding typed fields. The same types
//! describe both what the handler declares and what `GET /schema` reports, so
//! the two can be diffed before syncing.

use crate::core::errors::{HandlerError, HandlerResult};
use serde::{Deserialize, Deserializer, Serialize};

/// Field kind plus its options, serialized the way the store expects them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldOptions {
    /// Set field; with `keys` the rows are addressed by string labels
    Set {
        #[serde(default)]
        keys: bool,
    },
    /// Bounded integer field
    Int { min: i64, max: i64 },
    /// Boolean field
    Bool,
    /// Any field type the handler never declares (time, mutex, ...)
    #[serde(other)]
    Other,
}

impl FieldOptions {
    pub fn keyed_set() -> Self {
        FieldOptions::Set { keys: true }
    }

    pub fn int(min: i64, max: i64) -> Self {
        FieldOptions::Int { min, max }
    }

    pub fn boolean() -> Self {
        FieldOptions::Bool
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            FieldOptions::Set { .. } => "set",
            FieldOptions::Int { .. } => "int",
            FieldOptions::Bool => "bool",
            FieldOptions::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub options: FieldOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub fields: Vec<Field>,
}

impl Index {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Declare a field, replacing any earlier declaration with the same name
    pub fn field<S: Into<String>>(&mut self, name: S, options: FieldOptions) -> &Field {
        let name = name.into();
        let pos = match self.fields.iter().position(|f| f.name == name) {
            Some(pos) => {
                self.fields[pos].options = options;
                pos
            }
            None => {
                self.fields.push(Field { name, options });
                self.fields.len() - 1
            }
        };
        &self.fields[pos]
    }

    pub fn get_field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub indexes: Vec<Index>,
}

/// What has to be created on the store to make it match a declared schema
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaDiff {
    pub missing_indexes: Vec<String>,
    /// `(index name, field)` pairs
    pub missing_fields: Vec<(String, Field)>,
}

impl SchemaDiff {
    pub fn is_empty(&self) -> bool {
        self.missing_indexes.is_empty() && self.missing_fields.is_empty()
    }
}

impl Schema {
    /// Get or declare an index
    pub fn index<S: Into<String>>(&mut self, name: S) -> &mut Index {
        let name = name.into();
        let pos = match self.indexes.iter().position(|i| i.name == name) {
            Some(pos) => pos,
            None => {
                self.indexes.push(Index::new(name));
                self.indexes.len() - 1
            }
        };
        &mut self.indexes[pos]
    }

    pub fn get_index(&self, name: &str) -> Option<&Index> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// Compare this declared schema with the store's.
    ///
    /// Fields that exist on both sides must agree on type and options,
    /// otherwise a `SchemaConflict` is returned.
    pub fn diff(&self, server: &Schema) -> HandlerResult<SchemaDiff> {
        let mut diff = SchemaDiff::default();

        for index in &self.indexes {
            let existing = server.get_index(&index.name);
            if existing.is_none() {
                diff.missing_indexes.push(index.name.clone());
            }

            for field in &index.fields {
                match existing.and_then(|i| i.get_field(&field.name)) {
                    Some(found) if found.options == field.options => {}
                    Some(found) => {
                        return Err(HandlerError::schema_conflict(
                            &index.name,
                            &field.name,
                            format!(
                                "store has {:?}, declared {:?}",
                                found.options, field.options
                            ),
                        ));
                    }
                    None => diff
                        .missing_fields
                        .push((index.name.clone(), field.clone())),
                }
            }
        }

        Ok(diff)
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
