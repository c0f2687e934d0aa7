use async_trait::async_trait;
use bytes::Bytes;

use crate::healthcare::error::HealthcareError;
use crate::healthcare::models::{DeidentifyConfig, DicomStore, Operation};

/// Raw calls against the Cloud Healthcare API, scoped to one dataset.
///
/// Store arguments are bare store ids; implementations resolve them against
/// their dataset.
#[async_trait]
pub trait HealthcareApi: Send + Sync + 'static {
    /// Create an empty DICOM store
    async fn create_store(&self, store_id: &str) -> Result<DicomStore, HealthcareError>;

    /// Delete a DICOM store and everything in it
    async fn delete_store(&self, store_id: &str) -> Result<(), HealthcareError>;

    /// List every DICOM store in the dataset
    async fn list_stores(&self) -> Result<Vec<DicomStore>, HealthcareError>;

    /// Upload one DICOM instance through the DICOMweb STOW-RS endpoint
    async fn store_instance(&self, store_id: &str, data: Bytes) -> Result<(), HealthcareError>;

    /// Start de-identification of `source` into `destination`
    async fn deidentify(
        &self,
        source: &str,
        destination: &str,
        config: &DeidentifyConfig,
    ) -> Result<Operation, HealthcareError>;

    /// Fetch the current state of a long-running operation
    async fn get_operation(&self, name: &str) -> Result<Operation, HealthcareError>;

    /// Start importing instances from Cloud Storage
    async fn import_instances(
        &self,
        store_id: &str,
        content_uri: &str,
    ) -> Result<Operation, HealthcareError>;

    /// Start exporting instances to Cloud Storage
    async fn export_instances(
        &self,
        store_id: &str,
        uri_prefix: &str,
    ) -> Result<Operation, HealthcareError>;
}
