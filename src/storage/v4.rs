//! V4 signed URLs (GOOG4-RSA-SHA256) through the Cloud Storage client.
//!
//! The client never authenticates: the access id and private key come with
//! every call, so signing stays local and always uses the key read for it.

use async_trait::async_trait;
use google_cloud_storage::client::{Client, ClientConfig};
use google_cloud_storage::sign::{SignBy, SignedURLMethod, SignedURLOptions};
use std::time::Duration;
use tracing::debug;

use crate::storage::error::StorageError;
use crate::storage::signer::{SignedUrlOptions, UrlSigner};

const MAX_EXPIRY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Real signer backed by the service account's RSA key
#[derive(Clone)]
pub struct V4Signer {
    client: Client,
}

impl Default for V4Signer {
    fn default() -> Self {
        Self::new()
    }
}

impl V4Signer {
    pub fn new() -> Self {
        Self {
            client: Client::new(ClientConfig::default().anonymous()),
        }
    }
}

fn signed_method(method: &str) -> Result<SignedURLMethod, StorageError> {
    match method.to_ascii_uppercase().as_str() {
        "GET" => Ok(SignedURLMethod::GET),
        "PUT" => Ok(SignedURLMethod::PUT),
        "POST" => Ok(SignedURLMethod::POST),
        "DELETE" => Ok(SignedURLMethod::DELETE),
        "HEAD" => Ok(SignedURLMethod::HEAD),
        "" => Err(StorageError::InvalidRequest(
            "missing required method option".to_string(),
        )),
        other => Err(StorageError::InvalidRequest(format!(
            "unsupported method {}",
            other
        ))),
    }
}

fn validate(bucket: &str, object: &str, opts: &SignedUrlOptions) -> Result<(), StorageError> {
    if bucket.is_empty() || object.is_empty() {
        return Err(StorageError::InvalidRequest(
            "bucket and object names are required".to_string(),
        ));
    }
    if opts.expires.is_zero() || opts.expires > MAX_EXPIRY {
        return Err(StorageError::InvalidRequest(format!(
            "expiry of {}s is outside 1..={}",
            opts.expires.as_secs(),
            MAX_EXPIRY.as_secs()
        )));
    }
    Ok(())
}

#[async_trait]
impl UrlSigner for V4Signer {
    async fn sign_url(
        &self,
        bucket: &str,
        object: &str,
        opts: &SignedUrlOptions,
    ) -> Result<String, StorageError> {
        validate(bucket, object, opts)?;
        let method = signed_method(&opts.method)?;

        let private_key = opts.private_key.replace("\\n", "\n");
        let options = SignedURLOptions {
            method,
            expires: opts.expires,
            content_type: Some(opts.content_type.clone()),
            ..Default::default()
        };

        let url = self
            .client
            .signed_url(
                bucket,
                object,
                Some(opts.access_id.clone()),
                Some(SignBy::PrivateKey(private_key.into_bytes())),
                options,
            )
            .await
            .map_err(|e| StorageError::Signing(e.to_string()))?;

        debug!("Signed {} URL for gs://{}/{}", opts.method, bucket, object);
        Ok(url)
    }
}
