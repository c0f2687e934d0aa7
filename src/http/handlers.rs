use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tracing::debug;

use crate::deid::{JobError, JobId, JobReport, JobRequest};
use crate::error::{AppError, ErrorKind};
use crate::http::AppState;
use crate::storage::{CloudStorageObject, SignedBucketUrl};

/// Only verb clients may use with URLs from the HTTP endpoint
const HTTP_SIGNED_METHOD: &str = "POST";

#[derive(Debug, Serialize)]
pub struct JobAccepted {
    pub job_id: JobId,
}

impl From<JobError> for AppError {
    fn from(err: JobError) -> Self {
        let kind = err.kind();
        let message = match kind {
            ErrorKind::Internal => "internal error".to_string(),
            _ => err.to_string(),
        };
        AppError::new(kind, message).with_detail(err)
    }
}

/// POST /get_presigned_url
pub async fn get_presigned_url(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SignedBucketUrl>, AppError> {
    let object: CloudStorageObject = serde_json::from_slice(&body)
        .map_err(|e| AppError::invalid("invalid request").with_detail(e))?;

    let signed = state
        .storage
        .generate_presigned_bucket_url(&state.bucket, &object, HTTP_SIGNED_METHOD)
        .await
        .map_err(|e| AppError::internal("signed URL could not be generated").with_detail(e))?;

    Ok(Json(signed))
}

/// POST /start_anonymisation
pub async fn start_anonymisation(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<JobAccepted>), AppError> {
    let request: JobRequest = serde_json::from_slice(&body)
        .map_err(|e| AppError::invalid("invalid request").with_detail(e))?;

    let handle = state.coordinator.submit(request).await?;
    debug!("Accepted job {}", handle.id);

    Ok((
        StatusCode::ACCEPTED,
        Json(JobAccepted { job_id: handle.id }),
    ))
}

/// GET /jobs
pub async fn list_jobs(State(state): State<AppState>) -> Json<Vec<JobReport>> {
    Json(state.coordinator.list().await)
}

/// GET /jobs/:id
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobReport>, AppError> {
    let id = parse_job_id(&id)?;
    Ok(Json(state.coordinator.status(id).await?))
}

/// DELETE /jobs/:id
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobReport>, AppError> {
    let id = parse_job_id(&id)?;
    Ok(Json(state.coordinator.cancel(id).await?))
}

fn parse_job_id(id: &str) -> Result<JobId, AppError> {
    id.parse::<JobId>()
        .map_err(|e| AppError::invalid("invalid job id").with_detail(e))
}
