use thiserror::Error;

use crate::gcp::CredentialError;

/// Errors that can occur when producing signed Cloud Storage URLs
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to resolve signing credentials: {0}")]
    Credentials(#[from] CredentialError),

    #[error("storage.SignedURL: {0}")]
    Signing(String),

    #[error("Invalid signing request: {0}")]
    InvalidRequest(String),
}
