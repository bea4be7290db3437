//! Replication host module
//!
//! A minimal host runtime that reads committed transactions from a JSON lines
//! stream and drives a `DataSourceHandler` through its lifecycle.

pub mod host;
pub mod state;

// Re-export for convenience
pub use host::ReplayHost;
