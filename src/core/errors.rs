//! Error types for the Pilosa replication handler
//! Provides structured error handling using thiserror for better error reporting

use thiserror::Error;

/// Main error type for the replication handler
#[derive(Error, Debug)]
pub enum HandlerError {
    /// Configuration related errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Index store connection related errors
    #[error("Index store connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A declared field already exists in the store with different options
    #[error("Schema conflict on {index}.{field}: {message}")]
    SchemaConflict {
        index: String,
        field: String,
        message: String,
    },

    /// A required column value was null
    #[error("Missing value for column {column} of table {table}")]
    MissingColumn { table: String, column: usize },

    /// A column value could not be parsed into the type its field expects
    #[error("Malformed value {value:?} in column {column}: {message}")]
    MalformedRow {
        column: usize,
        value: String,
        message: String,
    },

    /// A lifecycle callback arrived while the handler could not serve it
    #[error("Handler is not ready (state: {state})")]
    NotReady { state: String },

    /// The index store rejected a request
    #[error("Index store error: {message}")]
    Store {
        status: Option<u16>,
        message: String,
    },

    /// HTTP transport errors
    #[error("HTTP error")]
    Http(#[from] reqwest::Error),

    /// JSON encoding or decoding errors
    #[error("JSON error")]
    Json(#[from] serde_json::Error),

    /// Network/IO related errors
    #[error("Network IO error")]
    NetworkIO(#[from] std::io::Error),

    /// Generic error for compatibility
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for convenience
pub type HandlerResult<T> = std::result::Result<T, HandlerError>;

impl HandlerError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a connection error wrapping the underlying cause
    pub fn connection_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Connection {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a schema conflict error
    pub fn schema_conflict<I, F, M>(index: I, field: F, message: M) -> Self
    where
        I: Into<String>,
        F: Into<String>,
        M: Into<String>,
    {
        Self::SchemaConflict {
            index: index.into(),
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a malformed row error
    pub fn malformed<V: Into<String>, M: Into<String>>(column: usize, value: V, message: M) -> Self {
        Self::MalformedRow {
            column,
            value: value.into(),
            message: message.into(),
        }
    }

    /// Create a store error, optionally carrying the HTTP status
    pub fn store<S: Into<String>>(status: Option<u16>, message: S) -> Self {
        Self::Store {
            status,
            message: message.into(),
        }
    }
}
