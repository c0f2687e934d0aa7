use serde::{Deserialize, Serialize};

/// A bucket in Cloud Storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudStorageBucket {
    pub name: String,
}

/// A single object inside a bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudStorageObject {
    pub name: String,
}

/// Time-boxed URL granting one HTTP method on one object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedBucketUrl {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl SignedBucketUrl {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: None,
        }
    }
}
