use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::healthcare::api::HealthcareApi;
use crate::healthcare::error::HealthcareError;
use crate::healthcare::models::{DeidentifyConfig, DicomStore, Operation, OperationError};

#[derive(Debug, Clone)]
struct FakeOperation {
    remaining_polls: u32,
    error: Option<OperationError>,
}

#[derive(Default)]
struct FakeState {
    stores: HashMap<String, Vec<Bytes>>,
    operations: HashMap<String, FakeOperation>,
    next_operation: u64,
    polls_until_done: u32,
    operation_error: Option<OperationError>,
    hang_operation_fetches: bool,
    failures: HashMap<&'static str, (u16, String)>,
    calls: Vec<String>,
    imports: Vec<(String, String)>,
    exports: Vec<(String, String)>,
    deidentify_configs: Vec<DeidentifyConfig>,
}

/// `FakeHealthcareApi` is an in-memory implementation of the `HealthcareApi` trait for testing
/// purposes. Stores live in a map, operations finish after a scripted number of polls, and any
/// call can be made to fail with a chosen HTTP status.
#[derive(Clone, Default)]
pub struct FakeHealthcareApi {
    state: Arc<Mutex<FakeState>>,
}

#[allow(dead_code)]
impl FakeHealthcareApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Operations started after this call report `done` on the `polls`-th fetch
    pub async fn fake_polls_until_done(&self, polls: u32) {
        self.state.lock().await.polls_until_done = polls;
    }

    /// Operations started after this call finish with the given error payload
    pub async fn fake_operation_error(&self, code: i32, message: &str) {
        self.state.lock().await.operation_error = Some(OperationError {
            code,
            message: message.to_string(),
        });
    }

    /// Operation status fetches are recorded and then never resolve
    pub async fn fake_hang_operation_fetches(&self) {
        self.state.lock().await.hang_operation_fetches = true;
    }

    /// Make every call to `operation` (e.g. "StoreInstances") fail with `status`
    pub async fn fake_fail(&self, operation: &'static str, status: u16, message: &str) {
        self.state
            .lock()
            .await
            .failures
            .insert(operation, (status, message.to_string()));
    }

    pub async fn add_store(&self, store_id: &str) {
        self.state
            .lock()
            .await
            .stores
            .insert(store_id.to_string(), Vec::new());
    }

    pub async fn has_store(&self, store_id: &str) -> bool {
        self.state.lock().await.stores.contains_key(store_id)
    }

    pub async fn instance_count(&self, store_id: &str) -> usize {
        self.state
            .lock()
            .await
            .stores
            .get(store_id)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Every call made so far, formatted as `Operation:argument`
    pub async fn calls(&self) -> Vec<String> {
        self.state.lock().await.calls.clone()
    }

    pub async fn calls_to(&self, operation: &str) -> usize {
        let prefix = format!("{}:", operation);
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| c.starts_with(&prefix))
            .count()
    }

    pub async fn imports(&self) -> Vec<(String, String)> {
        self.state.lock().await.imports.clone()
    }

    pub async fn exports(&self) -> Vec<(String, String)> {
        self.state.lock().await.exports.clone()
    }

    pub async fn deidentify_configs(&self) -> Vec<DeidentifyConfig> {
        self.state.lock().await.deidentify_configs.clone()
    }
}

impl FakeState {
    fn record(&mut self, operation: &'static str, arg: &str) -> Result<(), HealthcareError> {
        self.calls.push(format!("{}:{}", operation, arg));
        match self.failures.get(operation) {
            Some((status, message)) => Err(HealthcareError::remote(operation, *status, message)),
            None => Ok(()),
        }
    }

    fn require_store(&self, operation: &'static str, store_id: &str) -> Result<(), HealthcareError> {
        if self.stores.contains_key(store_id) {
            Ok(())
        } else {
            Err(HealthcareError::remote(
                operation,
                404,
                format!("dicom store {} not found", store_id),
            ))
        }
    }

    fn start_operation(&mut self) -> Operation {
        self.next_operation += 1;
        let name = format!(
            "projects/test-project/locations/us-central1/datasets/test-dataset/operations/{}",
            self.next_operation
        );
        self.operations.insert(
            name.clone(),
            FakeOperation {
                remaining_polls: self.polls_until_done.max(1),
                error: self.operation_error.clone(),
            },
        );
        Operation::running(name)
    }
}

#[async_trait]
impl HealthcareApi for FakeHealthcareApi {
    async fn create_store(&self, store_id: &str) -> Result<DicomStore, HealthcareError> {
        let mut state = self.state.lock().await;
        state.record("CreateDicomStore", store_id)?;
        if state.stores.contains_key(store_id) {
            return Err(HealthcareError::remote(
                "CreateDicomStore",
                409,
                format!("dicom store {} already exists", store_id),
            ));
        }
        state.stores.insert(store_id.to_string(), Vec::new());
        Ok(DicomStore::new(store_id))
    }

    async fn delete_store(&self, store_id: &str) -> Result<(), HealthcareError> {
        let mut state = self.state.lock().await;
        state.record("DeleteDicomStore", store_id)?;
        state.require_store("DeleteDicomStore", store_id)?;
        state.stores.remove(store_id);
        Ok(())
    }

    async fn list_stores(&self) -> Result<Vec<DicomStore>, HealthcareError> {
        let mut state = self.state.lock().await;
        state.record("ListDicomStores", "")?;
        let mut ids: Vec<&String> = state.stores.keys().collect();
        ids.sort();
        Ok(ids.into_iter().map(|id| DicomStore::new(id.clone())).collect())
    }

    async fn store_instance(&self, store_id: &str, data: Bytes) -> Result<(), HealthcareError> {
        let mut state = self.state.lock().await;
        state.record("StoreInstances", store_id)?;
        state.require_store("StoreInstances", store_id)?;
        if let Some(instances) = state.stores.get_mut(store_id) {
            instances.push(data);
        }
        Ok(())
    }

    async fn deidentify(
        &self,
        source: &str,
        destination: &str,
        config: &DeidentifyConfig,
    ) -> Result<Operation, HealthcareError> {
        let mut state = self.state.lock().await;
        state.record("Deidentify", source)?;
        state.require_store("Deidentify", source)?;
        state.require_store("Deidentify", destination)?;
        state.deidentify_configs.push(config.clone());

        let copied = state.stores.get(source).cloned().unwrap_or_default();
        if let Some(instances) = state.stores.get_mut(destination) {
            instances.extend(copied);
        }
        Ok(state.start_operation())
    }

    async fn get_operation(&self, name: &str) -> Result<Operation, HealthcareError> {
        let hang = {
            let mut state = self.state.lock().await;
            state.record("operations.get", name)?;
            state.hang_operation_fetches
        };
        if hang {
            std::future::pending::<()>().await;
        }

        let mut state = self.state.lock().await;
        let op = state.operations.get_mut(name).ok_or_else(|| {
            HealthcareError::remote("operations.get", 404, format!("operation {} not found", name))
        })?;

        op.remaining_polls = op.remaining_polls.saturating_sub(1);
        Ok(Operation {
            name: name.to_string(),
            done: op.remaining_polls == 0,
            error: if op.remaining_polls == 0 {
                op.error.clone()
            } else {
                None
            },
            metadata: None,
        })
    }

    async fn import_instances(
        &self,
        store_id: &str,
        content_uri: &str,
    ) -> Result<Operation, HealthcareError> {
        let mut state = self.state.lock().await;
        state.record("Import", store_id)?;
        state.require_store("Import", store_id)?;
        state
            .imports
            .push((store_id.to_string(), content_uri.to_string()));
        Ok(state.start_operation())
    }

    async fn export_instances(
        &self,
        store_id: &str,
        uri_prefix: &str,
    ) -> Result<Operation, HealthcareError> {
        let mut state = self.state.lock().await;
        state.record("Export", store_id)?;
        state.require_store("Export", store_id)?;
        state
            .exports
            .push((store_id.to_string(), uri_prefix.to_string()));
        Ok(state.start_operation())
    }
}
