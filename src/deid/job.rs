use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::healthcare::models::Dicom;

pub type JobId = Uuid;

/// What a de-identification job should do
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    pub source_store: String,
    pub destination_store: String,
    /// Local files to upload into the source store. Never accepted over HTTP.
    #[serde(skip)]
    pub dicoms: Vec<Dicom>,
    /// `gs://` pattern imported into the source store after the local files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_uri: Option<String>,
    /// `gs://` prefix the de-identified store is exported to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_destination: Option<String>,
}

impl JobRequest {
    pub fn new(source_store: impl Into<String>, destination_store: impl Into<String>) -> Self {
        Self {
            source_store: source_store.into(),
            destination_store: destination_store.into(),
            dicoms: Vec::new(),
            content_uri: None,
            export_destination: None,
        }
    }

    pub fn with_files<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.dicoms
            .extend(paths.into_iter().map(|p| Dicom::from_path(p)));
        self
    }

    pub fn with_import(mut self, content_uri: impl Into<String>) -> Self {
        self.content_uri = Some(content_uri.into());
        self
    }

    pub fn with_export(mut self, destination: impl Into<String>) -> Self {
        self.export_destination = Some(destination.into());
        self
    }
}

/// The step a job is on, or the state it ended in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    CreatingSourceStore,
    Ingesting,
    CreatingDestinationStore,
    Deidentifying,
    Exporting,
    Succeeded,
    Failed(String),
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed(_) | JobStatus::Cancelled
        )
    }
}

/// Snapshot of one job as exposed to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobReport {
    pub id: JobId,
    pub source_store: String,
    pub destination_store: String,
    pub status: JobStatus,
    /// Name of the operation currently being waited on, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    pub instances_stored: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobReport {
    pub fn new(id: JobId, request: &JobRequest) -> Self {
        let now = Utc::now();
        Self {
            id,
            source_store: request.source_store.clone(),
            destination_store: request.destination_store.clone(),
            status: JobStatus::Queued,
            operation: None,
            instances_stored: 0,
            created_at: now,
            updated_at: now,
        }
    }
}
