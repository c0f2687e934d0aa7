//! Cloud Healthcare API v1 over REST.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::gcp::GcpAuth;
use crate::healthcare::api::HealthcareApi;
use crate::healthcare::error::HealthcareError;
use crate::healthcare::models::{
    Dataset, DeidentifyConfig, DeidentifyDicomStoreRequest, DicomStore, Operation,
};

const DICOM_CONTENT_TYPE: &str = "application/dicom";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDicomStoresResponse {
    #[serde(default)]
    dicom_stores: Vec<StoreResource>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct StoreResource {
    name: String,
}

#[derive(Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
}

impl ListDicomStoresResponse {
    /// Stores on this page and the token for the next one, if any
    fn into_page(self) -> (Vec<DicomStore>, Option<String>) {
        let stores = self
            .dicom_stores
            .iter()
            .map(|s| DicomStore::from_resource_name(&s.name))
            .collect();
        (stores, self.next_page_token.filter(|t| !t.is_empty()))
    }
}

/// Message from a Google error envelope, or the raw body when it is not one
fn error_message(body: String) -> String {
    match serde_json::from_str::<ApiErrorEnvelope>(&body) {
        Ok(envelope) if !envelope.error.message.is_empty() => envelope.error.message,
        _ => body,
    }
}

/// `HealthcareApi` backed by the real Google service
#[derive(Clone)]
pub struct GoogleHealthcareApi {
    client: reqwest::Client,
    auth: GcpAuth,
    endpoint: String,
    dataset: Dataset,
}

impl GoogleHealthcareApi {
    pub fn new(
        client: reqwest::Client,
        auth: GcpAuth,
        endpoint: impl Into<String>,
        dataset: Dataset,
    ) -> Self {
        Self {
            client,
            auth,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            dataset,
        }
    }

    fn url(&self, resource: &str) -> String {
        format!("{}/{}", self.endpoint, resource)
    }

    fn store_url(&self, store_id: &str) -> String {
        self.url(&self.dataset.store_name(store_id))
    }

    async fn send(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<Response, HealthcareError> {
        let token = self.auth.get_token().await?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|source| HealthcareError::Transport { operation, source })?;

        let status = response.status();
        if status.as_u16() > 299 {
            let body = response.text().await.unwrap_or_default();
            return Err(HealthcareError::remote(
                operation,
                status.as_u16(),
                error_message(body),
            ));
        }
        Ok(response)
    }

    async fn send_operation(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<Operation, HealthcareError> {
        let response = self.send(operation, request).await?;
        response
            .json::<Operation>()
            .await
            .map_err(|source| HealthcareError::Transport { operation, source })
    }
}

#[async_trait]
impl HealthcareApi for GoogleHealthcareApi {
    async fn create_store(&self, store_id: &str) -> Result<DicomStore, HealthcareError> {
        let url = format!("{}/dicomStores", self.url(&self.dataset.name()));
        let request = self
            .client
            .post(url)
            .query(&[("dicomStoreId", store_id)])
            .json(&json!({}));
        let response = self.send("CreateDicomStore", request).await?;
        let store: StoreResource =
            response
                .json()
                .await
                .map_err(|source| HealthcareError::Transport {
                    operation: "CreateDicomStore",
                    source,
                })?;
        debug!("Created DICOM store {}", store.name);
        Ok(DicomStore::from_resource_name(&store.name))
    }

    async fn delete_store(&self, store_id: &str) -> Result<(), HealthcareError> {
        let request = self.client.delete(self.store_url(store_id));
        self.send("DeleteDicomStore", request).await?;
        Ok(())
    }

    async fn list_stores(&self) -> Result<Vec<DicomStore>, HealthcareError> {
        let url = format!("{}/dicomStores", self.url(&self.dataset.name()));
        let mut stores = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.client.get(&url);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }
            let page: ListDicomStoresResponse = self
                .send("ListDicomStores", request)
                .await?
                .json()
                .await
                .map_err(|source| HealthcareError::Transport {
                    operation: "ListDicomStores",
                    source,
                })?;

            let (page_stores, next) = page.into_page();
            stores.extend(page_stores);
            match next {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(stores)
    }

    async fn store_instance(&self, store_id: &str, data: Bytes) -> Result<(), HealthcareError> {
        let url = format!("{}/dicomWeb/studies", self.store_url(store_id));
        let request = self
            .client
            .post(url)
            .header(header::CONTENT_TYPE, DICOM_CONTENT_TYPE)
            .body(data);
        self.send("StoreInstances", request).await?;
        Ok(())
    }

    async fn deidentify(
        &self,
        source: &str,
        destination: &str,
        config: &DeidentifyConfig,
    ) -> Result<Operation, HealthcareError> {
        let body = DeidentifyDicomStoreRequest {
            destination_store: self.dataset.store_name(destination),
            config: config.clone(),
        };
        let url = format!("{}:deidentify", self.store_url(source));
        self.send_operation("Deidentify", self.client.post(url).json(&body))
            .await
    }

    async fn get_operation(&self, name: &str) -> Result<Operation, HealthcareError> {
        self.send_operation("operations.get", self.client.get(self.url(name)))
            .await
    }

    async fn import_instances(
        &self,
        store_id: &str,
        content_uri: &str,
    ) -> Result<Operation, HealthcareError> {
        let url = format!("{}:import", self.store_url(store_id));
        let body = json!({ "gcsSource": { "uri": content_uri } });
        self.send_operation("Import", self.client.post(url).json(&body))
            .await
    }

    async fn export_instances(
        &self,
        store_id: &str,
        uri_prefix: &str,
    ) -> Result<Operation, HealthcareError> {
        let url = format!("{}:export", self.store_url(store_id));
        let body = json!({ "gcsDestination": { "uriPrefix": uri_prefix } });
        self.send_operation("Export", self.client.post(url).json(&body))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_envelope_message_is_extracted() {
        let body = r#"{"error": {"code": 409, "message": "already exists", "status": "ALREADY_EXISTS"}}"#;
        assert_eq!(error_message(body.to_string()), "already exists");
    }

    #[test]
    fn non_envelope_bodies_are_kept_verbatim() {
        for body in [
            "upstream connect error",
            "",
            r#"{"unexpected": true}"#,
            r#"{"error": {"code": 500}}"#,
        ] {
            assert_eq!(error_message(body.to_string()), body);
        }
    }

    #[test]
    fn list_page_yields_store_ids_and_next_token() {
        let page: ListDicomStoresResponse = serde_json::from_str(
            r#"{
                "dicomStores": [
                    {"name": "projects/p/locations/l/datasets/d/dicomStores/a"},
                    {"name": "projects/p/locations/l/datasets/d/dicomStores/b"}
                ],
                "nextPageToken": "page-2"
            }"#,
        )
        .unwrap();

        let (stores, next) = page.into_page();
        let ids: Vec<&str> = stores.iter().map(|s| s.store_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(next.as_deref(), Some("page-2"));
    }

    #[test]
    fn last_page_has_no_next_token() {
        for body in [r#"{}"#, r#"{"dicomStores": [], "nextPageToken": ""}"#] {
            let page: ListDicomStoresResponse = serde_json::from_str(body).unwrap();
            let (stores, next) = page.into_page();
            assert!(stores.is_empty());
            assert_eq!(next, None);
        }
    }
}
