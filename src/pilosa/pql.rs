//! PQL write queries and the per-transaction batch
//!
//! The handler only ever issues two kinds of writes: setting a row of a field
//! for a column, and setting column attributes. A batch serializes to the
//! concatenation of its queries, which the store executes in order.

use std::collections::BTreeMap;
use std::fmt;

/// Row coordinate of a `Set` call, typed by the field it targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowValue {
    /// Row key of a keyed set field
    Key(String),
    /// Value of an int field
    Int(i64),
    /// Value of a bool field
    Bool(bool),
}

/// A single write query against one index
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PqlQuery {
    Set {
        field: String,
        row: RowValue,
        column: i64,
    },
    /// A `None` attribute value is written as `null`, which clears it
    SetColumnAttrs {
        column: i64,
        attrs: BTreeMap<String, Option<String>>,
    },
}

impl PqlQuery {
    pub fn set<S: Into<String>>(field: S, row: RowValue, column: i64) -> Self {
        PqlQuery::Set {
            field: field.into(),
            row,
            column,
        }
    }

    pub fn set_column_attrs(column: i64, attrs: BTreeMap<String, Option<String>>) -> Self {
        PqlQuery::SetColumnAttrs { column, attrs }
    }
}

impl fmt::Display for PqlQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PqlQuery::Set { field, row, column } => {
                write!(f, "Set({},{}=", column, field)?;
                match row {
                    RowValue::Key(key) => write_quoted(f, key)?,
                    RowValue::Int(value) => write!(f, "{}", value)?,
                    RowValue::Bool(value) => write!(f, "{}", value)?,
                }
                write!(f, ")")
            }
            PqlQuery::SetColumnAttrs { column, attrs } => {
                write!(f, "SetColumnAttrs({}", column)?;
                for (name, value) in attrs {
                    write!(f, ",{}=", name)?;
                    match value {
                        Some(value) => write_quoted(f, value)?,
                        None => write!(f, "null")?,
                    }
                }
                write!(f, ")")
            }
        }
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    write!(f, "\"")?;
    for c in value.chars() {
        match c {
            '"' => write!(f, "\\\"")?,
            '\\' => write!(f, "\\\\")?,
            c => write!(f, "{}", c)?,
        }
    }
    write!(f, "\"")
}

/// Ordered writes for one index, submitted to the store as a single request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PqlBatchQuery {
    index: String,
    queries: Vec<PqlQuery>,
}

impl PqlBatchQuery {
    pub fn new<S: Into<String>>(index: S) -> Self {
        Self {
            index: index.into(),
            queries: Vec::new(),
        }
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn add(&mut self, query: PqlQuery) {
        self.queries.push(query);
    }

    /// Drop all queued writes, keeping the allocation
    pub fn clear(&mut self) {
        self.queries.clear();
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    #[cfg(test)]
    pub fn queries(&self) -> &[PqlQuery] {
        &self.queries
    }

    /// PQL request body
    pub fn serialize(&self) -> String {
        self.queries.iter().map(ToString::to_string).collect()
    }
}
