use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use crate::gcp::ServiceAccountKey;
use crate::storage::error::StorageError;
use crate::storage::models::{CloudStorageBucket, CloudStorageObject, SignedBucketUrl};
use crate::storage::signer::{SignedUrlOptions, UrlSigner, SIGNED_CONTENT_TYPE, SIGNED_URL_TTL};

/// Hands out short-lived signed URLs for objects in Cloud Storage
#[derive(Clone)]
pub struct CloudStorageService {
    signer: Arc<dyn UrlSigner>,
    service_account: PathBuf,
}

impl CloudStorageService {
    pub fn new(signer: Arc<dyn UrlSigner>, service_account: impl Into<PathBuf>) -> Self {
        let service_account = service_account.into();
        info!(
            "Cloud Storage signing with service account key {}",
            service_account.display()
        );
        Self {
            signer,
            service_account,
        }
    }

    /// Generate a presigned URL limited to `method` on one object for a short period.
    ///
    /// The key file is read on every call; an unreadable or invalid key fails before
    /// the signer is consulted.
    pub async fn generate_presigned_bucket_url(
        &self,
        bucket: &CloudStorageBucket,
        object: &CloudStorageObject,
        method: &str,
    ) -> Result<SignedBucketUrl, StorageError> {
        let key = ServiceAccountKey::from_file(&self.service_account).await?;

        let opts = SignedUrlOptions {
            method: method.to_string(),
            content_type: SIGNED_CONTENT_TYPE.to_string(),
            access_id: key.client_email,
            private_key: key.private_key,
            expires: SIGNED_URL_TTL,
        };

        let url = self
            .signer
            .sign_url(&bucket.name, &object.name, &opts)
            .await?;

        debug!(
            "Generated {} URL for gs://{}/{}",
            method, bucket.name, object.name
        );
        Ok(SignedBucketUrl::new(url))
    }
}
