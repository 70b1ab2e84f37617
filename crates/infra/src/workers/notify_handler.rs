//! Notification queue handler: one delivery polls one ERP job's status.

use std::sync::Arc;

use async_trait::async_trait;
use punchsync_core::{JobDelivery, NotificationService, QueueName};
use punchsync_domain::{NotificationJob, PunchSyncError, Result};
use tracing::debug;

use crate::workers::queue_worker::JobHandler;

pub struct NotificationJobHandler {
    service: Arc<NotificationService>,
}

impl NotificationJobHandler {
    pub fn new(service: Arc<NotificationService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl JobHandler for NotificationJobHandler {
    fn queue(&self) -> QueueName {
        QueueName::Notification
    }

    async fn handle(&self, delivery: &JobDelivery) -> Result<()> {
        let job: NotificationJob = serde_json::from_value(delivery.payload.clone()).map_err(
            |e| PunchSyncError::InvalidInput(format!("malformed notification payload: {e}")),
        )?;

        let outcome = self.service.process(&job).await?;
        debug!(job_id = job.job_id, outcome = ?outcome, "notification job handled");
        Ok(())
    }
}
