//! partsage-core
//!
//! Shared vocabulary for the parts assistant: catalog records, intents, the
//! fused context handed to the answer model, the error taxonomy, and the
//! boundary traits every adapter implements.

pub mod catalog;
pub mod config;
pub mod error;
pub mod traits;
pub mod types;
