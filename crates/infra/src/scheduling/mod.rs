//! Timer-driven producers.
//!
//! Two schedulers feed the queues:
//! - `RoutineScheduler` runs the daily import routine on a cron expression
//! - `ReconcileScheduler` rescans unnotified import records on an interval
//!
//! Both have explicit lifecycles: started tasks are tracked by join handle,
//! cancellation is token-based and every async step is wrapped in a timeout.

pub mod error;
pub mod reconcile_scheduler;
pub mod routine_scheduler;

pub use error::{SchedulerError, SchedulerResult};
pub use reconcile_scheduler::{ReconcileScheduler, ReconcileSchedulerConfig};
pub use routine_scheduler::{RoutineScheduler, RoutineSchedulerConfig};
