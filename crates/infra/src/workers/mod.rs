//! Queue consumers.
//!
//! One generic `QueueWorker` drives both queues; the per-queue semantics live
//! in `JobHandler` implementations. Workers poll, claim a batch, process the
//! claims concurrently and settle each one as completed or failed. Stale
//! claims left behind by a crashed process are released at the start of every
//! tick, so at-least-once delivery holds across restarts.

pub mod import_handler;
pub mod notify_handler;
pub mod queue_worker;

pub use import_handler::ImportJobHandler;
pub use notify_handler::NotificationJobHandler;
pub use queue_worker::{JobHandler, QueueWorker, QueueWorkerConfig};
