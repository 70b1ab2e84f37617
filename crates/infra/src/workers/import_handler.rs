//! Import queue handler: one delivery runs the pipeline for one device.

use std::sync::Arc;

use async_trait::async_trait;
use punchsync_core::{ImportPipeline, JobDelivery, QueueName};
use punchsync_domain::{ImportJob, PunchSyncError, Result};
use tracing::debug;

use crate::workers::queue_worker::JobHandler;

pub struct ImportJobHandler {
    pipeline: Arc<ImportPipeline>,
}

impl ImportJobHandler {
    pub fn new(pipeline: Arc<ImportPipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl JobHandler for ImportJobHandler {
    fn queue(&self) -> QueueName {
        QueueName::Import
    }

    async fn handle(&self, delivery: &JobDelivery) -> Result<()> {
        let job: ImportJob = serde_json::from_value(delivery.payload.clone())
            .map_err(|e| PunchSyncError::InvalidInput(format!("malformed import payload: {e}")))?;

        debug!(
            device_id = job.equipment.device_id,
            company = job.equipment.company_code,
            date = %job.reference_date,
            attempt = delivery.attempt,
            "running import pipeline"
        );

        let result = self.pipeline.process_device(job.equipment, job.reference_date).await;
        if result.success {
            Ok(())
        } else {
            // Propagate so the queue schedules a retry with backoff.
            Err(PunchSyncError::Internal(format!(
                "import for device {} stopped at {}: {}",
                result.equipment_id, result.stage, result.message
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use punchsync_core::{
        EquipmentCatalog, ErpImporter, ImportPipelineConfig, ImportRepository, ObjectStore,
        TerminalGateway,
    };
    use punchsync_domain::{
        DeviceLookup, ErpJobLog, ErpJobRef, ImportLogRecord, ImportProcessRequest, ImportRecord,
        JobStatus, PendingNotification, Result as DomainResult, StoredObject,
    };
    use serde_json::json;

    use super::*;

    struct UnreachableTerminal;

    #[async_trait]
    impl TerminalGateway for UnreachableTerminal {
        async fn ensure_session(&self) -> DomainResult<()> {
            Err(PunchSyncError::Network("connection refused".into()))
        }

        async fn find_devices(&self, _device_ids: &[i64]) -> DomainResult<DeviceLookup> {
            Err(PunchSyncError::Network("connection refused".into()))
        }

        async fn download_afd(&self, _device_id: i64, _date: NaiveDate) -> DomainResult<String> {
            Err(PunchSyncError::Network("connection refused".into()))
        }
    }

    struct UnusedErp;

    #[async_trait]
    impl ErpImporter for UnusedErp {
        async fn execute_import(&self, _request: &ImportProcessRequest) -> DomainResult<String> {
            Ok("1".into())
        }
    }

    struct UnusedStore;

    #[async_trait]
    impl ObjectStore for UnusedStore {
        async fn put(
            &self,
            bucket: &str,
            key: &str,
            _body: &[u8],
            _content_type: &str,
        ) -> DomainResult<StoredObject> {
            Ok(StoredObject {
                bucket: bucket.into(),
                key: key.into(),
                location_url: format!("http://store/{bucket}/{key}"),
            })
        }
    }

    struct UnusedRepo;

    #[async_trait]
    impl ImportRepository for UnusedRepo {
        async fn find_latest_erp_job(
            &self,
            _created_by: &str,
            _process_name: &str,
        ) -> DomainResult<Option<ErpJobRef>> {
            Ok(None)
        }

        async fn erp_job_status(&self, _job_id: i64) -> DomainResult<Option<JobStatus>> {
            Ok(None)
        }

        async fn erp_job_logs(&self, _job_id: i64) -> DomainResult<Vec<ErpJobLog>> {
            Ok(Vec::new())
        }

        async fn upsert_record(&self, _record: &ImportRecord) -> DomainResult<()> {
            Ok(())
        }

        async fn record_by_job(&self, _job_id: i64) -> DomainResult<Option<ImportRecord>> {
            Ok(None)
        }

        async fn update_status(&self, _job_id: i64, _status: JobStatus) -> DomainResult<()> {
            Ok(())
        }

        async fn mark_notified(&self, _job_id: i64) -> DomainResult<()> {
            Ok(())
        }

        async fn pending_notifications(&self) -> DomainResult<Vec<PendingNotification>> {
            Ok(Vec::new())
        }

        async fn insert_log_record(&self, _record: &ImportLogRecord) -> DomainResult<bool> {
            Ok(true)
        }

        async fn log_records(&self, _job_id: i64) -> DomainResult<Vec<ImportLogRecord>> {
            Ok(Vec::new())
        }
    }

    fn handler() -> ImportJobHandler {
        let pipeline = Arc::new(ImportPipeline::new(
            Arc::new(UnreachableTerminal),
            Arc::new(UnusedErp),
            Arc::new(UnusedStore),
            Arc::new(UnusedRepo),
            Arc::new(EquipmentCatalog::builtin()),
            ImportPipelineConfig::default(),
        ));
        ImportJobHandler::new(pipeline)
    }

    fn import_delivery(payload: serde_json::Value) -> JobDelivery {
        JobDelivery {
            id: 1,
            queue: QueueName::Import,
            key: "importacao-6-1-1709251200".into(),
            payload,
            attempt: 1,
        }
    }

    #[tokio::test]
    async fn malformed_payload_is_an_invalid_input_error() {
        let delivery = import_delivery(json!({"equipment": "not-a-mapping"}));
        let err = handler().handle(&delivery).await.expect_err("parse fails");
        assert!(matches!(err, PunchSyncError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn failed_pipeline_run_propagates_as_an_error() {
        let job = ImportJob::new(
            *EquipmentCatalog::builtin().resolve(6).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        );
        let delivery = import_delivery(serde_json::to_value(&job).unwrap());

        let err = handler().handle(&delivery).await.expect_err("pipeline fails");
        let text = err.to_string();
        assert!(text.contains("device 6"), "unexpected error text: {text}");
    }
}
