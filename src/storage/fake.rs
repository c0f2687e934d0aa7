use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::storage::error::StorageError;
use crate::storage::signer::{SignedUrlOptions, UrlSigner};

/// A signing call as observed by the fake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignCall {
    pub bucket: String,
    pub object: String,
    pub method: String,
}

/// `FakeSigner` is an in-memory implementation of the `UrlSigner` trait for testing purposes.
/// It returns a fixed URL, or a fixed failure, and records every call it receives.
#[derive(Clone)]
pub struct FakeSigner {
    outcome: Arc<Mutex<Result<String, String>>>,
    calls: Arc<Mutex<Vec<SignCall>>>,
}

impl FakeSigner {
    /// Create a signer that always returns `url`
    pub fn returning(url: &str) -> Self {
        FakeSigner {
            outcome: Arc::new(Mutex::new(Ok(url.to_string()))),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a signer that always fails with `message`
    pub fn failing(message: &str) -> Self {
        let signer = Self::returning("");
        signer.fake_fail(message);
        signer
    }

    /// Make every subsequent call fail
    pub fn fake_fail(&self, message: &str) {
        *self.outcome.lock().unwrap() = Err(message.to_string());
    }

    pub fn calls(&self) -> Vec<SignCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl UrlSigner for FakeSigner {
    async fn sign_url(
        &self,
        bucket: &str,
        object: &str,
        opts: &SignedUrlOptions,
    ) -> Result<String, StorageError> {
        self.calls.lock().unwrap().push(SignCall {
            bucket: bucket.to_string(),
            object: object.to_string(),
            method: opts.method.clone(),
        });

        self.outcome
            .lock()
            .unwrap()
            .clone()
            .map_err(StorageError::Signing)
    }
}
