//! Per-device import pipeline and the synchronous batch orchestrator.
//!
//! One run moves through `lookup → download → save → import`; the record
//! step after the ERP trigger is best-effort and never fails the run. The
//! queue worker retries failed runs, so every stage must be safe to repeat:
//! the archive step replaces by name and the ERP trigger is correlated into
//! at most one record per ERP job.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use punchsync_domain::constants::{ERP_PROCESS_SERVER, ERP_PROCESS_USER, ERP_SUCCESS_SENTINEL};
use punchsync_domain::{
    BatchReport, EquipmentMapping, ImportProcessRequest, ImportRecord, JobStatus,
    ProcessingResult, RemoteDevice, Stage, StoredObject,
};
use tracing::{error, info, instrument, warn};

use crate::catalog::EquipmentCatalog;
use crate::import::error::PipelineError;
use crate::ports::{ErpImporter, ImportRepository, ObjectStore, TerminalGateway};

/// Tuning for the import pipeline.
#[derive(Debug, Clone)]
pub struct ImportPipelineConfig {
    /// Prefix (trailing separator included) under which the ERP server sees
    /// archived artifacts.
    pub erp_import_path: String,
    /// Bucket receiving AFD artifacts.
    pub artifact_bucket: String,
    /// Wait between archiving and the ERP read, and again between the
    /// trigger and the correlation lookup.
    pub settle_delay: Duration,
}

impl Default for ImportPipelineConfig {
    fn default() -> Self {
        Self {
            erp_import_path: String::new(),
            artifact_bucket: "afd-artifacts".to_string(),
            settle_delay: Duration::from_secs(5),
        }
    }
}

/// Executes the import pipeline for one device at a time.
pub struct ImportPipeline {
    terminal: Arc<dyn TerminalGateway>,
    erp: Arc<dyn ErpImporter>,
    store: Arc<dyn ObjectStore>,
    repository: Arc<dyn ImportRepository>,
    catalog: Arc<EquipmentCatalog>,
    config: ImportPipelineConfig,
}

/// Partial progress kept across stage failures so the outcome can still
/// report the device name and any archived artifact.
#[derive(Default)]
struct StageTrace {
    device_name: Option<String>,
    artifact_url: Option<String>,
}

impl ImportPipeline {
    pub fn new(
        terminal: Arc<dyn TerminalGateway>,
        erp: Arc<dyn ErpImporter>,
        store: Arc<dyn ObjectStore>,
        repository: Arc<dyn ImportRepository>,
        catalog: Arc<EquipmentCatalog>,
        config: ImportPipelineConfig,
    ) -> Self {
        Self { terminal, erp, store, repository, catalog, config }
    }

    /// Run the full pipeline for one equipment snapshot.
    ///
    /// Always returns a `ProcessingResult`; the stage field reflects how far
    /// the run got before stopping.
    #[instrument(skip(self))]
    pub async fn process_device(
        &self,
        equipment: EquipmentMapping,
        reference_date: NaiveDate,
    ) -> ProcessingResult {
        let mut trace = StageTrace::default();
        match self.run_stages(equipment, reference_date, &mut trace).await {
            Ok(()) => {
                info!(device_id = equipment.device_id, "import pipeline completed");
                ProcessingResult::succeeded(
                    equipment.device_id,
                    trace.device_name.unwrap_or_else(|| fallback_name(equipment.device_id)),
                    "import completed successfully",
                    trace.artifact_url,
                )
            }
            Err(e) => {
                error!(
                    device_id = equipment.device_id,
                    stage = %e.stage(),
                    error = %e,
                    "import pipeline failed"
                );
                ProcessingResult::failed(
                    equipment.device_id,
                    trace.device_name.unwrap_or_else(|| fallback_name(equipment.device_id)),
                    e.stage(),
                    e.to_string(),
                    trace.artifact_url,
                )
            }
        }
    }

    async fn run_stages(
        &self,
        equipment: EquipmentMapping,
        reference_date: NaiveDate,
        trace: &mut StageTrace,
    ) -> Result<(), PipelineError> {
        self.terminal
            .ensure_session()
            .await
            .map_err(|e| PipelineError::Auth(e.to_string()))?;

        let device = self.lookup_device(equipment.device_id).await?;
        trace.device_name = Some(device.name.clone());

        let afd = self
            .terminal
            .download_afd(equipment.device_id, reference_date)
            .await
            .map_err(|e| PipelineError::Download(e.to_string()))?;

        let file_name = afd_file_name(reference_date, &device.name);
        let stored = self
            .store
            .put(&self.config.artifact_bucket, &file_name, afd.as_bytes(), "text/plain")
            .await
            .map_err(|e| PipelineError::Archive(e.to_string()))?;
        trace.artifact_url = Some(stored.location_url.clone());
        info!(device_id = equipment.device_id, file_name = %file_name, "artifact archived");

        // The ERP reads the artifact through a mounted view of the archive;
        // give that view time to observe the write.
        tokio::time::sleep(self.config.settle_delay).await;

        let file_path = format!("{}{}", self.config.erp_import_path, file_name);
        let import_result = self.trigger_import(&equipment, &file_path, reference_date).await;

        self.record_import(&equipment, &device, &file_path, &stored).await;

        import_result
    }

    async fn lookup_device(&self, device_id: i64) -> Result<RemoteDevice, PipelineError> {
        let lookup = self
            .terminal
            .find_devices(&[device_id])
            .await
            .map_err(|e| PipelineError::Discovery(e.to_string()))?;

        if let Some(device) = lookup.healthy_device(device_id) {
            return Ok(device.clone());
        }
        match lookup.unhealthy_device(device_id) {
            Some(device) => Err(PipelineError::DeviceUnhealthy {
                device_id,
                name: device.name.clone(),
                status: device.status.clone(),
            }),
            None => Err(PipelineError::DeviceNotFound(device_id)),
        }
    }

    async fn trigger_import(
        &self,
        equipment: &EquipmentMapping,
        file_path: &str,
        reference_date: NaiveDate,
    ) -> Result<(), PipelineError> {
        let request = ImportProcessRequest {
            company_code: equipment.company_code,
            terminal_code: equipment.terminal_code,
            file_path: file_path.to_string(),
            reference_date,
        };

        let response = self
            .erp
            .execute_import(&request)
            .await
            .map_err(|e| PipelineError::ImportCall(e.to_string()))?;

        if is_sentinel_success(&response) {
            Ok(())
        } else {
            Err(PipelineError::ImportRejected { response })
        }
    }

    /// Correlate the trigger with the newest ERP job and persist one record
    /// for it. Runs whether or not the trigger itself succeeded; failures
    /// here are logged and swallowed.
    async fn record_import(
        &self,
        equipment: &EquipmentMapping,
        device: &RemoteDevice,
        file_path: &str,
        stored: &StoredObject,
    ) {
        // The job registry trails the trigger call.
        tokio::time::sleep(self.config.settle_delay).await;

        let job = match self
            .repository
            .find_latest_erp_job(ERP_PROCESS_USER, ERP_PROCESS_SERVER)
            .await
        {
            Ok(Some(job)) => job,
            Ok(None) => {
                warn!(
                    device_id = equipment.device_id,
                    "no correlating ERP job found; skipping import record"
                );
                return;
            }
            Err(e) => {
                warn!(
                    device_id = equipment.device_id,
                    error = %e,
                    "ERP job correlation lookup failed"
                );
                return;
            }
        };

        let record = ImportRecord {
            job_id: job.id,
            company_code: equipment.company_code,
            device_name: device.name.clone(),
            status: job.status.unwrap_or(JobStatus::NOT_STARTED),
            file_path: file_path.to_string(),
            archive_url: Some(stored.location_url.clone()),
            notified: false,
            created_by: job.created_by.clone(),
            created_at: Utc::now(),
        };

        match self.repository.upsert_record(&record).await {
            Ok(()) => {
                info!(job_id = job.id, device_id = equipment.device_id, "import record persisted");
            }
            Err(e) => {
                warn!(job_id = job.id, error = %e, "failed to persist import record");
            }
        }
    }

    /// Run the pipeline sequentially over a device selection.
    ///
    /// `selection = None` means every cataloged device. Individual failures
    /// never stop the batch; requested ids outside the catalog produce
    /// failed lookup rows.
    #[instrument(skip(self))]
    pub async fn process_batch(
        &self,
        selection: Option<&[i64]>,
        reference_date: NaiveDate,
    ) -> BatchReport {
        let mut results = Vec::new();

        match selection {
            None => {
                for mapping in self.catalog.entries().to_vec() {
                    results.push(self.process_device(mapping, reference_date).await);
                }
            }
            Some(ids) => {
                for &id in ids {
                    match self.catalog.resolve(id).copied() {
                        Some(mapping) => {
                            results.push(self.process_device(mapping, reference_date).await);
                        }
                        None => {
                            warn!(device_id = id, "device not present in the equipment catalog");
                            results.push(ProcessingResult::failed(
                                id,
                                fallback_name(id),
                                Stage::Lookup,
                                "device not present in the equipment catalog",
                                None,
                            ));
                        }
                    }
                }
            }
        }

        let report = BatchReport::from_results(reference_date, results);
        info!(
            total = report.total,
            succeeded = report.succeeded,
            failed = report.failed,
            "batch import finished"
        );
        report
    }
}

/// `DD-MM-YYYY <deviceName>.txt`
pub fn afd_file_name(date: NaiveDate, device_name: &str) -> String {
    format!("{} {}.txt", date.format("%d-%m-%Y"), device_name)
}

/// ERP responses are plain text; the body may arrive quoted or padded.
pub fn is_sentinel_success(body: &str) -> bool {
    body.trim().trim_matches('"') == ERP_SUCCESS_SENTINEL
}

fn fallback_name(device_id: i64) -> String {
    format!("device {device_id}")
}
