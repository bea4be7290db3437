//! Column position to index field mapping
//!
//! Row images arrive as positional string tuples. `ColumnMap` is the explicit
//! table saying which position feeds which field and how the text is parsed,
//! so a reordered source table is a configuration change (`COLUMN_MAP`).

use crate::core::errors::{HandlerError, HandlerResult};
use crate::pilosa::{FieldOptions, PqlQuery, RowValue};
use crate::protocol::messages::TableMetaData;
use std::collections::BTreeMap;
use std::str::FromStr;

pub const SALARY_MIN: i64 = 0;
pub const SALARY_MAX: i64 = 1_000_000;

/// How a column value is parsed and written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Row key of a keyed set field
    Key,
    /// Decimal text truncated toward zero into a bounded int field
    TruncatedInt { min: i64, max: i64 },
    /// Unindexed column attribute
    Attribute,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnBinding {
    pub name: String,
    pub column: usize,
    pub kind: ValueKind,
}

impl ColumnBinding {
    fn new(name: &str, column: usize, kind: ValueKind) -> Self {
        Self {
            name: name.to_string(),
            column,
            kind,
        }
    }

    /// Field declaration for this binding; attributes have none
    pub fn field_options(&self) -> Option<FieldOptions> {
        match self.kind {
            ValueKind::Key => Some(FieldOptions::keyed_set()),
            ValueKind::TruncatedInt { min, max } => Some(FieldOptions::int(min, max)),
            ValueKind::Attribute => None,
        }
    }

    /// Build the write for `raw` addressed to row `id`
    pub fn write(&self, raw: &str, id: i64) -> HandlerResult<PqlQuery> {
        match self.kind {
            ValueKind::Key => Ok(PqlQuery::set(
                &self.name,
                RowValue::Key(raw.to_string()),
                id,
            )),
            ValueKind::TruncatedInt { .. } => Ok(PqlQuery::set(
                &self.name,
                RowValue::Int(parse_truncated(self.column, raw)?),
                id,
            )),
            ValueKind::Attribute => Ok(self.attribute_write(Some(raw.to_string()), id)),
        }
    }

    /// Build the insert write for a value that may be NULL.
    ///
    /// A NULL attribute is written as `null`. A NULL key names no row, so no
    /// write is produced for it. A NULL int cannot be converted and is an error.
    pub fn write_nullable(&self, raw: Option<&str>, id: i64) -> HandlerResult<Option<PqlQuery>> {
        match (raw, self.kind) {
            (Some(raw), _) => self.write(raw, id).map(Some),
            (None, ValueKind::Key) => Ok(None),
            (None, ValueKind::TruncatedInt { .. }) => Err(HandlerError::malformed(
                self.column,
                "NULL",
                "value is NULL",
            )),
            (None, ValueKind::Attribute) => Ok(Some(self.attribute_write(None, id))),
        }
    }

    fn attribute_write(&self, value: Option<String>, id: i64) -> PqlQuery {
        PqlQuery::set_column_attrs(id, BTreeMap::from([(self.name.clone(), value)]))
    }
}

/// Identifier column plus the value bindings, in write order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    pub id_column: usize,
    pub bindings: Vec<ColumnBinding>,
}

impl Default for ColumnMap {
    /// Layout of the `EMPLOYEES` source table
    fn default() -> Self {
        Self {
            id_column: 0,
            bindings: vec![
                ColumnBinding::new("job", 6, ValueKind::Key),
                ColumnBinding::new(
                    "salary",
                    7,
                    ValueKind::TruncatedInt {
                        min: SALARY_MIN,
                        max: SALARY_MAX,
                    },
                ),
                ColumnBinding::new("email", 3, ValueKind::Attribute),
            ],
        }
    }
}

impl FromStr for ColumnMap {
    type Err = HandlerError;

    /// Parse position overrides such as `id=0,email=3,job=6,salary=7`.
    /// Names not mentioned keep their default position.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut map = ColumnMap::default();

        for entry in s.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (name, position) = entry.split_once('=').ok_or_else(|| {
                HandlerError::config(format!(
                    "COLUMN_MAP entry '{}' must look like name=position",
                    entry
                ))
            })?;
            let name = name.trim();
            let column = position.trim().parse::<usize>().map_err(|_| {
                HandlerError::config(format!(
                    "COLUMN_MAP position for '{}' is not a column number: {}",
                    name, position
                ))
            })?;

            if name == "id" {
                map.id_column = column;
                continue;
            }
            match map.bindings.iter_mut().find(|b| b.name == name) {
                Some(binding) => binding.column = column,
                None => {
                    return Err(HandlerError::config(format!(
                        "COLUMN_MAP names unknown column '{}' (expected id, {})",
                        name,
                        map.binding_names().join(", ")
                    )));
                }
            }
        }

        map.validate()?;
        Ok(map)
    }
}

impl ColumnMap {
    fn binding_names(&self) -> Vec<&str> {
        self.bindings.iter().map(|b| b.name.as_str()).collect()
    }

    /// Every position must feed exactly one target
    pub fn validate(&self) -> HandlerResult<()> {
        let mut seen = vec![self.id_column];
        for binding in &self.bindings {
            if seen.contains(&binding.column) {
                return Err(HandlerError::config(format!(
                    "COLUMN_MAP maps column {} more than once",
                    binding.column
                )));
            }
            seen.push(binding.column);
        }
        Ok(())
    }

    /// Fields the bindings need declared, in binding order
    pub fn fields(&self) -> impl Iterator<Item = (&str, FieldOptions)> {
        self.bindings
            .iter()
            .filter_map(|b| b.field_options().map(|options| (b.name.as_str(), options)))
    }

    /// Positions the source table does not have
    pub fn check_against(&self, table: &TableMetaData) -> Vec<String> {
        let width = table.columns.len();
        std::iter::once(("id", self.id_column))
            .chain(self.bindings.iter().map(|b| (b.name.as_str(), b.column)))
            .filter(|(_, column)| *column >= width)
            .map(|(name, column)| {
                format!(
                    "{} is mapped to column {} but {} has {} columns",
                    name, column, table.name, width
                )
            })
            .collect()
    }
}

/// Parse a row identifier
pub fn parse_identifier(column: usize, raw: &str) -> HandlerResult<i64> {
    raw.parse::<i64>()
        .map_err(|e| HandlerError::malformed(column, raw, e.to_string()))
}

/// Parse decimal text and truncate it toward zero
pub fn parse_truncated(column: usize, raw: &str) -> HandlerResult<i64> {
    let value = raw
        .trim()
        .parse::<f64>()
        .map_err(|e| HandlerError::malformed(column, raw, e.to_string()))?;
    if !value.is_finite() {
        return Err(HandlerError::malformed(column, raw, "value is not finite"));
    }
    Ok(value.trunc() as i64)
}
