//! Configuration management for the Pilosa replication handler
//!
//! This module handles loading configuration from environment variables.
//! It provides a centralized way to manage all application settings
//! with proper validation and default values.

use super::errors::{HandlerError, HandlerResult};
use crate::events::mapping::ColumnMap;
use std::env;
use std::time::Duration;

pub const DEFAULT_ADDRESS: &str = "http://localhost:10101";
pub const DEFAULT_WATCHED_TABLE: &str = "EMPLOYEES";
pub const DEFAULT_INDEX_NAME: &str = "employees";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

/// Configuration for the handler with validation
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    pub address: String,
    pub watched_table: String,
    pub index_name: String,
    pub column_map: ColumnMap,
    pub request_timeout: Duration,
    pub log_format: LogFormat,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            watched_table: DEFAULT_WATCHED_TABLE.to_string(),
            index_name: DEFAULT_INDEX_NAME.to_string(),
            column_map: ColumnMap::default(),
            request_timeout: Duration::from_secs(30),
            log_format: LogFormat::Text,
        }
    }
}

impl HandlerConfig {
    /// Load configuration from environment variables
    ///
    /// All variables are optional:
    /// - `PILOSA_ADDRESS`: index store endpoint (default: "http://localhost:10101")
    /// - `WATCHED_TABLE`: short name of the replicated table (default: "EMPLOYEES")
    /// - `INDEX_NAME`: target index (default: "employees")
    /// - `COLUMN_MAP`: column positions, e.g. "id=0,email=3,job=6,salary=7"
    /// - `PILOSA_TIMEOUT_SECS`: HTTP request timeout in seconds (default: 30)
    /// - `LOG_FORMAT`: "text" or "json" (default: "text")
    pub fn from_env() -> HandlerResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> HandlerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let address = lookup("PILOSA_ADDRESS").unwrap_or(defaults.address);
        let watched_table = lookup("WATCHED_TABLE").unwrap_or(defaults.watched_table);
        let index_name = lookup("INDEX_NAME").unwrap_or(defaults.index_name);

        let column_map = match lookup("COLUMN_MAP") {
            Some(raw) => raw.parse::<ColumnMap>()?,
            None => defaults.column_map,
        };

        let request_timeout = match lookup("PILOSA_TIMEOUT_SECS") {
            Some(secs) => {
                let secs = secs.trim().parse::<u64>().map_err(|_| {
                    HandlerError::config("PILOSA_TIMEOUT_SECS must be a whole number of seconds")
                })?;
                if secs == 0 {
                    return Err(HandlerError::config(
                        "PILOSA_TIMEOUT_SECS must be greater than zero",
                    ));
                }
                Duration::from_secs(secs)
            }
            None => defaults.request_timeout,
        };

        let log_format = match lookup("LOG_FORMAT").map(|s| s.to_lowercase()).as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(_) => {
                return Err(HandlerError::config(
                    "LOG_FORMAT must be one of: 'text' or 'json'",
                ));
            }
        };

        Self::validate_and_create(
            address,
            watched_table,
            index_name,
            column_map,
            request_timeout,
            log_format,
        )
    }

    /// Validate configuration parameters and create HandlerConfig
    fn validate_and_create(
        address: String,
        watched_table: String,
        index_name: String,
        column_map: ColumnMap,
        request_timeout: Duration,
        log_format: LogFormat,
    ) -> HandlerResult<Self> {
        if address.trim().is_empty() {
            return Err(HandlerError::config("PILOSA_ADDRESS cannot be empty"));
        }

        if watched_table.trim().is_empty() {
            return Err(HandlerError::config("WATCHED_TABLE cannot be empty"));
        }

        // Store naming rules: lowercase, starts with a letter, at most 64 characters
        if index_name.is_empty()
            || index_name.len() > 64
            || !index_name.starts_with(|c: char| c.is_ascii_lowercase())
            || !index_name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
        {
            return Err(HandlerError::config(
                "INDEX_NAME must start with a lowercase letter and contain only lowercase letters, digits, '_' or '-' (max 64)",
            ));
        }

        Ok(Self {
            address,
            watched_table,
            index_name,
            column_map,
            request_timeout,
            log_format,
        })
    }

    /// Override the index store address (e.g. from the command line)
    pub fn with_address<S: Into<String>>(mut self, address: S) -> Self {
        self.address = address.into();
        self
    }
}
