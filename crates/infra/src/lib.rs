//! # PunchSync Infrastructure
//!
//! Infrastructure implementations of core domain ports.
//!
//! This crate contains:
//! - Database implementations (SQLite job queue and import repository)
//! - HTTP client implementations (terminal platform, ERP, archive, webhook)
//! - Queue workers and cron/interval schedulers
//! - Configuration loading
//!
//! ## Architecture
//! - Implements traits defined in `punchsync-core`
//! - Depends on `punchsync-domain` and `punchsync-core`
//! - Contains all "impure" code (I/O, external services)

pub mod config;
pub mod database;
pub mod errors;
pub mod http;
pub mod integrations;
pub mod scheduling;
pub mod workers;

// Re-export commonly used items
pub use config::*;
pub use database::*;
pub use errors::*;
pub use http::*;
pub use integrations::*;
pub use scheduling::*;
pub use workers::*;
