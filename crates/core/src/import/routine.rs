//! Routine scheduling pass: fans the equipment catalog out into queued
//! import jobs, one per device and company.

use std::sync::Arc;

use chrono::NaiveDate;
use punchsync_domain::{EnqueueSummary, ImportJob, PunchSyncError, Result};
use tracing::{debug, info, instrument};

use crate::catalog::EquipmentCatalog;
use crate::queue::{EnqueueOutcome, JobQueue, QueueName};

/// Enqueues the daily import workload.
///
/// Companies in the mirror table get a second job per device under the
/// partner company code. The queue coalesces duplicate keys, so overlapping
/// passes for the same day are harmless.
pub struct ImportRoutine {
    catalog: Arc<EquipmentCatalog>,
    queue: Arc<dyn JobQueue>,
}

impl ImportRoutine {
    pub fn new(catalog: Arc<EquipmentCatalog>, queue: Arc<dyn JobQueue>) -> Self {
        Self { catalog, queue }
    }

    /// Enqueue one import job per cataloged device, plus the mirrored copy
    /// where the company has a partner.
    #[instrument(skip(self))]
    pub async fn enqueue_daily(&self, reference_date: NaiveDate) -> Result<EnqueueSummary> {
        let mut summary = EnqueueSummary::default();

        for mapping in self.catalog.entries() {
            self.enqueue_job(&ImportJob::new(*mapping, reference_date), &mut summary).await?;

            if let Some(mirror) = self.catalog.mirror_of(mapping.company_code) {
                let mirrored = ImportJob::new(mapping.with_company(mirror), reference_date);
                self.enqueue_job(&mirrored, &mut summary).await?;
            }
        }

        info!(
            enqueued = summary.enqueued,
            coalesced = summary.coalesced,
            "routine scheduling pass finished"
        );
        Ok(summary)
    }

    async fn enqueue_job(&self, job: &ImportJob, summary: &mut EnqueueSummary) -> Result<()> {
        let key = job.idempotency_key();
        let payload =
            serde_json::to_value(job).map_err(|e| PunchSyncError::Internal(e.to_string()))?;

        match self.queue.enqueue(QueueName::Import, &key, payload).await? {
            EnqueueOutcome::Enqueued => {
                debug!(key = %key, "import job enqueued");
                summary.enqueued += 1;
            }
            EnqueueOutcome::Duplicate => {
                debug!(key = %key, "import job already queued");
                summary.coalesced += 1;
            }
        }
        Ok(())
    }
}
