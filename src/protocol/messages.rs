//! Data structures exchanged with the replication host
//! Contains types for table names, row images, operations and transactions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Fully qualified table name as reported by the host, e.g. `HR.EMPLOYEES`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct TableName {
    pub schema: Option<String>,
    pub short_name: String,
}

impl TableName {
    pub fn new<S: Into<String>>(schema: Option<S>, short_name: S) -> Self {
        Self {
            schema: schema.map(Into::into),
            short_name: short_name.into(),
        }
    }

    /// The table name without its schema qualifier
    pub fn short_name(&self) -> &str {
        &self.short_name
    }
}

impl From<&str> for TableName {
    fn from(name: &str) -> Self {
        match name.rsplit_once('.') {
            Some((schema, short)) => Self::new(Some(schema), short),
            None => Self::new(None, name),
        }
    }
}

impl From<String> for TableName {
    fn from(name: String) -> Self {
        Self::from(name.as_str())
    }
}

impl From<TableName> for String {
    fn from(name: TableName) -> Self {
        name.to_string()
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.short_name),
            None => write!(f, "{}", self.short_name),
        }
    }
}

/// Change kind of a single row mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Insert,
    Update,
    Delete,
    Truncate,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKind::Insert => write!(f, "INSERT"),
            OpKind::Update => write!(f, "UPDATE"),
            OpKind::Delete => write!(f, "DELETE"),
            OpKind::Truncate => write!(f, "TRUNCATE"),
            OpKind::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// A row image: column values by position, `None` for SQL NULL
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    values: Vec<Option<String>>,
}

impl Record {
    pub fn new(values: Vec<Option<String>>) -> Self {
        Self { values }
    }

    /// Value at a column position; `None` when NULL or out of range
    pub fn value(&self, column: usize) -> Option<&str> {
        self.values.get(column).and_then(|v| v.as_deref())
    }
}

impl<S: Into<String>> FromIterator<Option<S>> for Record {
    fn from_iter<I: IntoIterator<Item = Option<S>>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(|v| v.map(Into::into)).collect())
    }
}

/// A single row change with its before and after images
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub table: TableName,
    pub kind: OpKind,
    #[serde(default)]
    pub before: Record,
    #[serde(default)]
    pub after: Record,
}

/// A committed transaction as delivered by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    #[serde(default)]
    pub operations: Vec<Operation>,
    #[serde(default)]
    pub commit_time: Option<DateTime<Utc>>,
}

impl Transaction {
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }
}

/// Delivery envelope the host attaches to each callback
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostEvent {
    pub sequence: u64,
    pub received_at: DateTime<Utc>,
}

impl HostEvent {
    pub fn new(sequence: u64) -> Self {
        Self {
            sequence,
            received_at: Utc::now(),
        }
    }
}

impl fmt::Display for HostEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "event #{} at {}",
            self.sequence,
            self.received_at.to_rfc3339()
        )
    }
}

/// Column layout of one source table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMetaData {
    pub name: TableName,
    pub columns: Vec<String>,
}

/// Source schema known to the host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetaData {
    #[serde(default)]
    pub tables: Vec<TableMetaData>,
}

impl MetaData {
    pub fn table(&self, short_name: &str) -> Option<&TableMetaData> {
        self.tables
            .iter()
            .find(|t| t.name.short_name() == short_name)
    }
}

/// Host-level settings handed to the handler at startup
#[derive(Debug, Clone, Default)]
pub struct HostConfig {
    pub handler_name: String,
    pub properties: BTreeMap<String, String>,
}

/// Outcome a callback reports back to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Abend,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Ok => write!(f, "OK"),
            Status::Abend => write!(f, "ABEND"),
        }
    }
}
