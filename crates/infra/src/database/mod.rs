//! Database implementations

pub mod import_repository;
pub mod job_queue;
pub mod manager;

pub use import_repository::*;
pub use job_queue::*;
pub use manager::*;
