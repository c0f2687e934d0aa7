use thiserror::Error;

use crate::deid::job::{JobId, JobStatus};
use crate::error::ErrorKind;
use crate::healthcare::HealthcareError;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Invalid job request: {0}")]
    InvalidRequest(String),

    #[error("Job failed while {stage:?}: {source}")]
    Stage {
        stage: JobStatus,
        #[source]
        source: HealthcareError,
    },

    #[error("Job cancelled")]
    Cancelled,

    #[error("Job {0} not found")]
    NotFound(JobId),
}

impl JobError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            JobError::InvalidRequest(_) => ErrorKind::Invalid,
            JobError::Stage { source, .. } => source.kind(),
            JobError::Cancelled => ErrorKind::Conflict,
            JobError::NotFound(_) => ErrorKind::NotFound,
        }
    }

    /// Attach the stage a gateway error happened in; cancellation stays cancellation
    pub fn at(stage: JobStatus) -> impl FnOnce(HealthcareError) -> JobError {
        move |source| match source {
            HealthcareError::Cancelled => JobError::Cancelled,
            source => JobError::Stage { stage, source },
        }
    }
}
