//! Index store boundary
//!
//! Schema declaration, PQL write batches and the HTTP client that submits them.

pub mod client;
#[cfg(test)]
pub mod memory;
pub mod pql;
pub mod schema;

// Re-export for convenience
pub use client::{IndexStore, PilosaConnector, StoreConnector};
pub use pql::{PqlBatchQuery, PqlQuery, RowValue};
pub use schema::{FieldOptions, Schema};
