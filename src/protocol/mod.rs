//! Protocol module for the replication host boundary
//!
//! Types the host hands to the handler: transactions, row operations,
//! source metadata and callback outcomes.

pub mod messages;
