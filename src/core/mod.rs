//! Core module containing fundamental types and configurations
//!
//! This module provides the basic building blocks for the cdc2pilosa application:
//! configuration management and error handling.

pub mod config;
pub mod errors;
