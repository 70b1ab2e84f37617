//! # PunchSync Core
//!
//! Pure business logic layer - no infrastructure dependencies.
//!
//! This crate contains:
//! - The equipment catalog and company mirroring rules
//! - The per-device import pipeline state machine
//! - The routine producer and synchronous batch orchestrator
//! - The reconciliation/notification service
//! - Port/adapter interfaces (traits)
//!
//! ## Architecture Principles
//! - Only depends on `punchsync-domain`
//! - No database, HTTP, or platform code
//! - All external dependencies via traits
//! - Pure, testable business logic

pub mod catalog;
pub mod import;
pub mod notify;
pub mod ports;
pub mod queue;

// Re-export specific items to avoid ambiguity
pub use catalog::EquipmentCatalog;
pub use import::{ImportPipeline, ImportPipelineConfig, ImportRoutine, PipelineError};
pub use notify::{NotificationConfig, NotificationService, NotifyOutcome};
pub use ports::{ErpImporter, ImportRepository, Notifier, ObjectStore, TerminalGateway};
pub use queue::{EnqueueOutcome, FailureOutcome, JobDelivery, JobQueue, QueueName, RetryPolicy};
