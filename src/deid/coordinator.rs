use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::deid::cancel::CancelToken;
use crate::deid::error::JobError;
use crate::deid::job::{JobId, JobReport, JobRequest, JobStatus};
use crate::healthcare::models::DicomStore;
use crate::healthcare::{HealthcareError, HealthcareGateway};

struct JobEntry {
    report: JobReport,
    cancel: CancelToken,
}

/// A submitted job: its id and the task running it
pub struct JobHandle {
    pub id: JobId,
    pub task: JoinHandle<Result<JobReport, JobError>>,
}

/// Finished jobs kept unless configured otherwise
pub const DEFAULT_MAX_FINISHED: usize = 1000;

/// Runs de-identification jobs, one tokio task each, and tracks their progress.
///
/// Running jobs are always tracked. Finished ones are kept for status queries
/// up to `max_finished`, evicting the least recently updated first.
#[derive(Clone)]
pub struct DeidentificationCoordinator {
    gateway: HealthcareGateway,
    jobs: Arc<Mutex<HashMap<JobId, JobEntry>>>,
    max_finished: usize,
}

impl DeidentificationCoordinator {
    pub fn new(gateway: HealthcareGateway) -> Self {
        Self {
            gateway,
            jobs: Arc::new(Mutex::new(HashMap::new())),
            max_finished: DEFAULT_MAX_FINISHED,
        }
    }

    pub fn with_max_finished(mut self, max_finished: usize) -> Self {
        self.max_finished = max_finished;
        self
    }

    pub fn gateway(&self) -> &HealthcareGateway {
        &self.gateway
    }

    /// Validate and register `request`, then start it on its own task
    pub async fn submit(&self, request: JobRequest) -> Result<JobHandle, JobError> {
        validate(&request)?;

        let id = Uuid::new_v4();
        let cancel = CancelToken::new();
        {
            let mut jobs = self.jobs.lock().await;
            jobs.insert(
                id,
                JobEntry {
                    report: JobReport::new(id, &request),
                    cancel: cancel.clone(),
                },
            );
        }
        info!(
            "[Job {}] Submitted: {} -> {}",
            id, request.source_store, request.destination_store
        );

        let coordinator = self.clone();
        let task = tokio::spawn(async move { coordinator.run_job(id, request, cancel).await });

        Ok(JobHandle { id, task })
    }

    pub async fn status(&self, id: JobId) -> Result<JobReport, JobError> {
        let jobs = self.jobs.lock().await;
        jobs.get(&id)
            .map(|entry| entry.report.clone())
            .ok_or(JobError::NotFound(id))
    }

    /// All known jobs, oldest first
    pub async fn list(&self) -> Vec<JobReport> {
        let jobs = self.jobs.lock().await;
        let mut reports: Vec<JobReport> = jobs.values().map(|e| e.report.clone()).collect();
        reports.sort_by_key(|r| r.created_at);
        reports
    }

    /// Signal a job to stop. Finished jobs are left as they are.
    pub async fn cancel(&self, id: JobId) -> Result<JobReport, JobError> {
        let jobs = self.jobs.lock().await;
        let entry = jobs.get(&id).ok_or(JobError::NotFound(id))?;
        if !entry.report.status.is_terminal() {
            info!("[Job {}] Cancellation requested", id);
            entry.cancel.cancel();
        }
        Ok(entry.report.clone())
    }

    /// Cancel every job that is still running
    pub async fn cancel_all(&self) {
        let jobs = self.jobs.lock().await;
        for entry in jobs.values() {
            if !entry.report.status.is_terminal() {
                entry.cancel.cancel();
            }
        }
    }

    async fn run_job(
        &self,
        id: JobId,
        request: JobRequest,
        cancel: CancelToken,
    ) -> Result<JobReport, JobError> {
        let result = self.execute(id, &request, &cancel).await;

        let final_status = match &result {
            Ok(()) => {
                info!("[Job {}] De-identification finished", id);
                JobStatus::Succeeded
            }
            Err(JobError::Cancelled) => {
                warn!("[Job {}] Cancelled", id);
                JobStatus::Cancelled
            }
            Err(e) => {
                error!("[Job {}] Failed: {}", id, e);
                JobStatus::Failed(e.to_string())
            }
        };
        let report = self
            .update(id, |report| {
                report.status = final_status;
                report.operation = None;
            })
            .await;
        self.evict_finished().await;

        result?;
        report.ok_or(JobError::NotFound(id))
    }

    async fn evict_finished(&self) {
        let mut jobs = self.jobs.lock().await;
        let mut finished: Vec<(DateTime<Utc>, JobId)> = jobs
            .iter()
            .filter(|(_, entry)| entry.report.status.is_terminal())
            .map(|(id, entry)| (entry.report.updated_at, *id))
            .collect();
        if finished.len() <= self.max_finished {
            return;
        }

        finished.sort();
        let excess = finished.len() - self.max_finished;
        for (_, id) in finished.into_iter().take(excess) {
            jobs.remove(&id);
            debug!("[Job {}] Evicted from the job table", id);
        }
    }

    async fn execute(
        &self,
        id: JobId,
        request: &JobRequest,
        cancel: &CancelToken,
    ) -> Result<(), JobError> {
        let source = DicomStore::new(&request.source_store);
        let destination = DicomStore::new(&request.destination_store);

        self.enter(id, JobStatus::CreatingSourceStore, cancel).await?;
        self.gateway
            .create_dicom_store(&source.store_id)
            .await
            .map_err(JobError::at(JobStatus::CreatingSourceStore))?;

        self.enter(id, JobStatus::Ingesting, cancel).await?;
        if !request.dicoms.is_empty() {
            let ingested = self
                .gateway
                .create_dicom_instances(&source, &request.dicoms)
                .await;
            let stored = match &ingested {
                Ok(stored) => *stored,
                Err(HealthcareError::PartialIngest { stored, .. }) => *stored,
                Err(_) => 0,
            };
            self.update(id, |report| report.instances_stored = stored)
                .await;
            ingested.map_err(JobError::at(JobStatus::Ingesting))?;
            debug!("[Job {}] Stored {} local instances", id, stored);
        }
        if let Some(content_uri) = &request.content_uri {
            let operation = self
                .gateway
                .import_dicom_instance(&source, content_uri)
                .await
                .map_err(JobError::at(JobStatus::Ingesting))?;
            self.update(id, |report| report.operation = Some(operation.name.clone()))
                .await;
            self.gateway
                .wait_for_operation(&operation, cancel)
                .await
                .map_err(JobError::at(JobStatus::Ingesting))?;
            debug!("[Job {}] Import from {} finished", id, content_uri);
        }

        self.enter(id, JobStatus::CreatingDestinationStore, cancel)
            .await?;
        self.gateway
            .create_dicom_store(&destination.store_id)
            .await
            .map_err(JobError::at(JobStatus::CreatingDestinationStore))?;

        self.enter(id, JobStatus::Deidentifying, cancel).await?;
        self.gateway
            .deidentify_dicom_store(&source, &destination, cancel)
            .await
            .map_err(JobError::at(JobStatus::Deidentifying))?;

        if let Some(export_destination) = &request.export_destination {
            self.enter(id, JobStatus::Exporting, cancel).await?;
            let operation = self
                .gateway
                .export_dicom_instance(&destination, export_destination)
                .await
                .map_err(JobError::at(JobStatus::Exporting))?;
            self.update(id, |report| report.operation = Some(operation.name.clone()))
                .await;
            self.gateway
                .wait_for_operation(&operation, cancel)
                .await
                .map_err(JobError::at(JobStatus::Exporting))?;
            debug!("[Job {}] Export to {} finished", id, export_destination);
        }

        Ok(())
    }

    /// Move to `status` unless the job has been cancelled
    async fn enter(
        &self,
        id: JobId,
        status: JobStatus,
        cancel: &CancelToken,
    ) -> Result<(), JobError> {
        if cancel.is_cancelled() {
            return Err(JobError::Cancelled);
        }
        debug!("[Job {}] {:?}", id, status);
        self.update(id, |report| {
            report.status = status;
            report.operation = None;
        })
        .await;
        Ok(())
    }

    async fn update<F>(&self, id: JobId, change: F) -> Option<JobReport>
    where
        F: FnOnce(&mut JobReport),
    {
        let mut jobs = self.jobs.lock().await;
        let entry = jobs.get_mut(&id)?;
        change(&mut entry.report);
        entry.report.updated_at = Utc::now();
        Some(entry.report.clone())
    }
}

fn validate(request: &JobRequest) -> Result<(), JobError> {
    if request.source_store.is_empty() || request.destination_store.is_empty() {
        return Err(JobError::InvalidRequest(
            "source_store and destination_store are required".to_string(),
        ));
    }
    if request.source_store == request.destination_store {
        return Err(JobError::InvalidRequest(
            "source and destination stores must differ".to_string(),
        ));
    }
    if request.dicoms.is_empty() && request.content_uri.is_none() {
        return Err(JobError::InvalidRequest(
            "nothing to ingest: give local files or a content_uri".to_string(),
        ));
    }
    Ok(())
}
