use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::deid::cancel::CancelToken;
use crate::deid::poller::{OperationPoller, PollPolicy};
use crate::healthcare::api::HealthcareApi;
use crate::healthcare::error::HealthcareError;
use crate::healthcare::models::{DeidentifyConfig, Dicom, DicomStore, Operation};

const GCS_SCHEME: &str = "gs://";

/// DICOM store operations against one fixed dataset
#[derive(Clone)]
pub struct HealthcareGateway {
    api: Arc<dyn HealthcareApi>,
    poller: OperationPoller,
}

impl HealthcareGateway {
    pub fn new(api: Arc<dyn HealthcareApi>, policy: PollPolicy) -> Self {
        let poller = OperationPoller::new(api.clone(), policy);
        Self { api, poller }
    }

    /// Generate a store id that is unique within the dataset
    pub fn generate_dicom_store_id(prefix: &str) -> String {
        format!("{}-{}", prefix, uuid::Uuid::new_v4().simple())
    }

    pub async fn create_dicom_store(&self, store_id: &str) -> Result<DicomStore, HealthcareError> {
        validate_store_id(store_id)?;
        let store = self.api.create_store(store_id).await?;
        info!("Created DICOM store {}", store.store_id);
        Ok(store)
    }

    pub async fn delete_dicom_store(&self, store_id: &str) -> Result<(), HealthcareError> {
        validate_store_id(store_id)?;
        self.api.delete_store(store_id).await?;
        info!("Deleted DICOM store {}", store_id);
        Ok(())
    }

    pub async fn get_dicom_store_list(&self) -> Result<Vec<DicomStore>, HealthcareError> {
        self.api.list_stores().await
    }

    /// Upload `dicoms` into `store` in order, stopping at the first failure.
    ///
    /// Nothing is rolled back: instances uploaded before the failure stay in the
    /// store and the error reports how many there were.
    pub async fn create_dicom_instances(
        &self,
        store: &DicomStore,
        dicoms: &[Dicom],
    ) -> Result<usize, HealthcareError> {
        let total = dicoms.len();

        for (stored, dicom) in dicoms.iter().enumerate() {
            let result = match tokio::fs::read(&dicom.path).await {
                Ok(data) => {
                    self.api
                        .store_instance(&store.store_id, Bytes::from(data))
                        .await
                }
                Err(source) => Err(HealthcareError::ReadFile {
                    path: dicom.path.clone(),
                    source,
                }),
            };

            if let Err(e) = result {
                warn!(
                    "Ingest into {} stopped at {} after {}/{} instances: {}",
                    store.store_id,
                    dicom.path.display(),
                    stored,
                    total,
                    e
                );
                return Err(HealthcareError::PartialIngest {
                    path: dicom.path.clone(),
                    stored,
                    total,
                    source: Box::new(e),
                });
            }
            debug!("Stored {} in {}", dicom.name, store.store_id);
        }

        Ok(total)
    }

    /// Start de-identification and block until the operation finishes
    pub async fn deidentify_dicom_store(
        &self,
        source: &DicomStore,
        destination: &DicomStore,
        cancel: &CancelToken,
    ) -> Result<Operation, HealthcareError> {
        if source.store_id == destination.store_id {
            return Err(HealthcareError::Invalid(
                "source and destination stores must differ".to_string(),
            ));
        }

        let operation = self
            .api
            .deidentify(
                &source.store_id,
                &destination.store_id,
                &DeidentifyConfig::default(),
            )
            .await?;
        debug!("De-identify accepted as {}", operation.name);

        let finished = self.poller.wait(&operation, cancel).await?;
        info!(
            "Created de-identified store {} from {}",
            destination.store_id, source.store_id
        );
        Ok(finished)
    }

    /// Start an import from Cloud Storage. Returns once the request is accepted.
    pub async fn import_dicom_instance(
        &self,
        store: &DicomStore,
        content_uri: &str,
    ) -> Result<Operation, HealthcareError> {
        validate_gcs_uri(content_uri)?;
        let operation = self
            .api
            .import_instances(&store.store_id, content_uri)
            .await?;
        info!(
            "Import of {} into {} started as {}",
            content_uri, store.store_id, operation.name
        );
        Ok(operation)
    }

    /// Start an export to Cloud Storage. Returns once the request is accepted.
    pub async fn export_dicom_instance(
        &self,
        store: &DicomStore,
        gcs_destination: &str,
    ) -> Result<Operation, HealthcareError> {
        validate_gcs_uri(gcs_destination)?;
        let operation = self
            .api
            .export_instances(&store.store_id, gcs_destination)
            .await?;
        info!(
            "Export of {} to {} started as {}",
            store.store_id, gcs_destination, operation.name
        );
        Ok(operation)
    }

    /// Block until an operation returned by import/export finishes
    pub async fn wait_for_operation(
        &self,
        operation: &Operation,
        cancel: &CancelToken,
    ) -> Result<Operation, HealthcareError> {
        self.poller.wait(operation, cancel).await
    }
}

fn validate_store_id(store_id: &str) -> Result<(), HealthcareError> {
    if store_id.is_empty() || store_id.contains('/') {
        return Err(HealthcareError::Invalid(format!(
            "invalid DICOM store id {:?}",
            store_id
        )));
    }
    Ok(())
}

fn validate_gcs_uri(uri: &str) -> Result<(), HealthcareError> {
    match uri.strip_prefix(GCS_SCHEME) {
        Some(rest) if !rest.is_empty() && !rest.starts_with('/') => Ok(()),
        _ => Err(HealthcareError::Invalid(format!(
            "expected a gs://bucket/path URI, got {:?}",
            uri
        ))),
    }
}
