//! # PunchSync Domain
//!
//! Business domain types and models for PunchSync.
//!
//! This crate contains:
//! - Domain data types (EquipmentMapping, ImportRecord, ProcessingResult, ...)
//! - Domain error types and Result definitions
//! - Configuration structures
//! - The static equipment catalog and company mirror tables
//!
//! ## Architecture
//! - No dependencies on other PunchSync crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod config;
pub mod constants;
pub mod errors;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
