use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const MINIMAL_KEEP_LIST_PROFILE: &str = "MINIMAL_KEEP_LIST_PROFILE";
pub const REDACT_SENSITIVE_TEXT: &str = "REDACT_SENSITIVE_TEXT";

/// The dataset every store lives under, fixed for the life of the process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    pub project_id: String,
    pub location: String,
    pub dataset_id: String,
}

impl Dataset {
    pub fn new(project_id: &str, location: &str, dataset_id: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            location: location.to_string(),
            dataset_id: dataset_id.to_string(),
        }
    }

    /// `projects/{p}/locations/{l}/datasets/{d}`
    pub fn name(&self) -> String {
        format!(
            "projects/{}/locations/{}/datasets/{}",
            self.project_id, self.location, self.dataset_id
        )
    }

    pub fn store_name(&self, store_id: &str) -> String {
        format!("{}/dicomStores/{}", self.name(), store_id)
    }
}

/// A DICOM store in the Healthcare API. The remote service is authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DicomStore {
    pub store_id: String,
}

impl DicomStore {
    pub fn new(store_id: impl Into<String>) -> Self {
        Self {
            store_id: store_id.into(),
        }
    }

    /// Build from a full resource name, keeping only the trailing id
    pub fn from_resource_name(name: &str) -> Self {
        Self::new(name.rsplit('/').next().unwrap_or(name))
    }
}

/// A local DICOM file waiting to be uploaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dicom {
    pub name: String,
    pub path: PathBuf,
}

impl Dicom {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { name, path }
    }
}

/// Error payload of a finished long-running operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationError {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

/// A long-running operation handle as returned by the Healthcare API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Operation {
    #[cfg(test)]
    pub fn running(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            done: false,
            error: None,
            metadata: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DicomConfig {
    pub filter_profile: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageConfig {
    pub text_redaction_mode: String,
}

/// De-identification settings sent with every request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeidentifyConfig {
    pub dicom: DicomConfig,
    pub image: ImageConfig,
}

impl Default for DeidentifyConfig {
    fn default() -> Self {
        Self {
            dicom: DicomConfig {
                filter_profile: MINIMAL_KEEP_LIST_PROFILE.to_string(),
            },
            image: ImageConfig {
                text_redaction_mode: REDACT_SENSITIVE_TEXT.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeidentifyDicomStoreRequest {
    pub destination_store: String,
    pub config: DeidentifyConfig,
}
