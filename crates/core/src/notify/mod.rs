//! Operator notification: the reconciliation scan and the per-job worker
//! logic behind it.

pub mod service;

pub use service::{NotificationConfig, NotificationService, NotifyOutcome};
