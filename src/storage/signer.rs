use async_trait::async_trait;
use std::time::Duration;

use crate::storage::error::StorageError;

/// Lifetime of every URL handed out to clients
pub const SIGNED_URL_TTL: Duration = Duration::from_secs(15 * 60);

/// Uploads are pinned to this content type
pub const SIGNED_CONTENT_TYPE: &str = "application/octet-stream";

/// Everything a signer needs besides the bucket/object pair
#[derive(Debug, Clone)]
pub struct SignedUrlOptions {
    pub method: String,
    /// Content type the client must send with the request
    pub content_type: String,
    /// Service account email the signature is issued for
    pub access_id: String,
    /// PKCS#8 PEM private key
    pub private_key: String,
    pub expires: Duration,
}

/// Signing capability for Cloud Storage object URLs
#[async_trait]
pub trait UrlSigner: Send + Sync + 'static {
    /// Produce a signed URL scoped to exactly one bucket/object pair
    async fn sign_url(
        &self,
        bucket: &str,
        object: &str,
        opts: &SignedUrlOptions,
    ) -> Result<String, StorageError>;
}
