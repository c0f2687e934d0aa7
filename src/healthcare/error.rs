use axum::http::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

use crate::error::ErrorKind;
use crate::gcp::CredentialError;

/// Errors that can occur when talking to the Cloud Healthcare API
#[derive(Error, Debug)]
pub enum HealthcareError {
    #[error("{operation}: status {status}: {message}")]
    Remote {
        operation: &'static str,
        status: u16,
        message: String,
    },

    #[error("{operation}: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("ReadFile {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Ingestion stopped at `path`; `stored` instances before it are already in the store
    #[error("ingest stopped at {path} after {stored} of {total} instances: {source}")]
    PartialIngest {
        path: PathBuf,
        stored: usize,
        total: usize,
        #[source]
        source: Box<HealthcareError>,
    },

    #[error("Invalid request: {0}")]
    Invalid(String),

    #[error("Failed to authenticate: {0}")]
    Credentials(#[from] CredentialError),

    #[error("operation {name} failed with code {code}: {message}")]
    OperationFailed {
        name: String,
        code: i32,
        message: String,
    },

    #[error("operation {name} did not finish after {attempts} polls")]
    PollTimeout { name: String, attempts: u32 },

    #[error("operation cancelled")]
    Cancelled,
}

impl HealthcareError {
    pub fn remote(operation: &'static str, status: u16, message: impl Into<String>) -> Self {
        HealthcareError::Remote {
            operation,
            status,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            HealthcareError::Remote { status, .. } => StatusCode::from_u16(*status)
                .map(ErrorKind::from_status_code)
                .unwrap_or(ErrorKind::Internal),
            HealthcareError::Invalid(_) => ErrorKind::Invalid,
            HealthcareError::PartialIngest { source, .. } => source.kind(),
            HealthcareError::Credentials(_) => ErrorKind::Unauthorized,
            HealthcareError::ReadFile { source, .. }
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                ErrorKind::NotFound
            }
            _ => ErrorKind::Internal,
        }
    }
}
