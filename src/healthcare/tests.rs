use crate::config::GcpConfig;
use crate::deid::cancel::CancelToken;
use crate::deid::poller::PollPolicy;
use crate::error::ErrorKind;
use crate::gcp::GcpAuth;
use crate::healthcare::fake::FakeHealthcareApi;
use crate::healthcare::models::{Dataset, Dicom, DicomStore, MINIMAL_KEEP_LIST_PROFILE};
use crate::healthcare::api::HealthcareApi;
use crate::healthcare::{GoogleHealthcareApi, HealthcareError, HealthcareGateway};
use crate::test_utils::{is_gcp_enabled, load_gcp_test_config, write_dicom_files};
use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use std::time::Duration;

type ApiFactory = Box<dyn Fn() -> BoxFuture<'static, Arc<dyn HealthcareApi>>>;

fn fast_policy() -> PollPolicy {
    PollPolicy {
        interval: Duration::from_millis(1),
        max_attempts: Some(50),
        timeout: None,
    }
}

// Create test APIs using lazy factory pattern
fn get_test_apis() -> Vec<(&'static str, ApiFactory)> {
    let mut apis: Vec<(&'static str, ApiFactory)> = vec![];

    apis.push((
        "fake",
        Box::new(|| async { Arc::new(FakeHealthcareApi::new()) as Arc<dyn HealthcareApi> }.boxed()),
    ));

    if is_gcp_enabled() {
        let config = load_gcp_test_config().expect("Failed to load test config");
        let gcp: GcpConfig = config.gcp;

        apis.push((
            "google",
            Box::new(move || {
                let gcp = gcp.clone();
                async move {
                    let client = reqwest::Client::new();
                    let auth = GcpAuth::new(&gcp.service_account, client.clone());
                    let dataset = Dataset::new(&gcp.project_id, &gcp.location, &gcp.dataset_id);
                    Arc::new(GoogleHealthcareApi::new(
                        client,
                        auth,
                        &gcp.healthcare_endpoint,
                        dataset,
                    )) as Arc<dyn HealthcareApi>
                }
                .boxed()
            }),
        ));
    }

    apis
}

#[tokio::test]
async fn store_lifecycle() {
    for (name, factory) in get_test_apis() {
        let gateway = HealthcareGateway::new(factory().await, fast_policy());
        let store_id = HealthcareGateway::generate_dicom_store_id("lifecycle");

        let store = gateway.create_dicom_store(&store_id).await.unwrap();
        assert_eq!(store.store_id, store_id, "{}", name);

        let listed = gateway.get_dicom_store_list().await.unwrap();
        assert!(listed.contains(&store), "{}: store missing from list", name);

        let duplicate = gateway.create_dicom_store(&store_id).await.unwrap_err();
        assert_eq!(duplicate.kind(), ErrorKind::Conflict, "{}", name);

        gateway.delete_dicom_store(&store_id).await.unwrap();
        let listed = gateway.get_dicom_store_list().await.unwrap();
        assert!(!listed.contains(&store), "{}: store still listed", name);
    }
}

#[tokio::test]
async fn deleting_missing_store_is_not_found() {
    for (name, factory) in get_test_apis() {
        let gateway = HealthcareGateway::new(factory().await, fast_policy());
        let err = gateway
            .delete_dicom_store(&HealthcareGateway::generate_dicom_store_id("missing"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound, "{}", name);
    }
}

#[tokio::test]
async fn invalid_store_id_is_rejected_locally() {
    let api = FakeHealthcareApi::new();
    let gateway = HealthcareGateway::new(Arc::new(api.clone()), fast_policy());

    let err = gateway.create_dicom_store("a/b").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);
    assert!(api.calls().await.is_empty());
}

#[tokio::test]
async fn ingest_uploads_every_file() {
    let dir = tempfile::tempdir().unwrap();
    let paths = write_dicom_files(dir.path(), &["a.dcm", "b.dcm", "c.dcm"]);
    let dicoms: Vec<Dicom> = paths.into_iter().map(Dicom::from_path).collect();

    let api = FakeHealthcareApi::new();
    api.add_store("source").await;
    let gateway = HealthcareGateway::new(Arc::new(api.clone()), fast_policy());

    let stored = gateway
        .create_dicom_instances(&DicomStore::new("source"), &dicoms)
        .await
        .unwrap();
    assert_eq!(stored, 3);
    assert_eq!(api.instance_count("source").await, 3);
}

#[tokio::test]
async fn ingest_stops_at_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let first = write_dicom_files(dir.path(), &["first.dcm"]).remove(0);
    let third = write_dicom_files(dir.path(), &["third.dcm"]).remove(0);
    let missing = dir.path().join("second.dcm");
    let dicoms = vec![
        Dicom::from_path(first),
        Dicom::from_path(missing.clone()),
        Dicom::from_path(third),
    ];

    let api = FakeHealthcareApi::new();
    api.add_store("source").await;
    let gateway = HealthcareGateway::new(Arc::new(api.clone()), fast_policy());

    let err = gateway
        .create_dicom_instances(&DicomStore::new("source"), &dicoms)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("second.dcm"), "{}", err);
    match err {
        HealthcareError::PartialIngest {
            path,
            stored,
            total,
            source,
        } => {
            assert_eq!(path, missing);
            assert_eq!(stored, 1);
            assert_eq!(total, 3);
            assert!(matches!(*source, HealthcareError::ReadFile { .. }));
        }
        other => panic!("unexpected error: {:?}", other),
    }

    assert_eq!(api.calls_to("StoreInstances").await, 1);
    assert_eq!(api.instance_count("source").await, 1);
}

#[tokio::test]
async fn ingest_surfaces_remote_rejection() {
    let dir = tempfile::tempdir().unwrap();
    let dicoms: Vec<Dicom> = write_dicom_files(dir.path(), &["a.dcm", "b.dcm"])
        .into_iter()
        .map(Dicom::from_path)
        .collect();

    let api = FakeHealthcareApi::new();
    api.add_store("source").await;
    api.fake_fail("StoreInstances", 400, "not a DICOM file").await;
    let gateway = HealthcareGateway::new(Arc::new(api.clone()), fast_policy());

    let err = gateway
        .create_dicom_instances(&DicomStore::new("source"), &dicoms)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Invalid);
    assert!(err.to_string().contains("StoreInstances"), "{}", err);
    assert_eq!(api.calls_to("StoreInstances").await, 1);
}

#[tokio::test]
async fn deidentify_blocks_until_done() {
    let api = FakeHealthcareApi::new();
    api.add_store("source").await;
    api.add_store("destination").await;
    api.fake_polls_until_done(3).await;
    let gateway = HealthcareGateway::new(Arc::new(api.clone()), fast_policy());

    let op = gateway
        .deidentify_dicom_store(
            &DicomStore::new("source"),
            &DicomStore::new("destination"),
            &CancelToken::new(),
        )
        .await
        .unwrap();

    assert!(op.done);
    assert_eq!(api.calls_to("operations.get").await, 3);
    let configs = api.deidentify_configs().await;
    assert_eq!(configs[0].dicom.filter_profile, MINIMAL_KEEP_LIST_PROFILE);
}

#[tokio::test]
async fn deidentify_reports_operation_error() {
    let api = FakeHealthcareApi::new();
    api.add_store("source").await;
    api.add_store("destination").await;
    api.fake_operation_error(13, "redaction failed").await;
    let gateway = HealthcareGateway::new(Arc::new(api.clone()), fast_policy());

    let err = gateway
        .deidentify_dicom_store(
            &DicomStore::new("source"),
            &DicomStore::new("destination"),
            &CancelToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        HealthcareError::OperationFailed { code: 13, .. }
    ));
}

#[tokio::test]
async fn deidentify_into_same_store_is_invalid() {
    let api = FakeHealthcareApi::new();
    api.add_store("source").await;
    let gateway = HealthcareGateway::new(Arc::new(api.clone()), fast_policy());

    let store = DicomStore::new("source");
    let err = gateway
        .deidentify_dicom_store(&store, &store, &CancelToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Invalid);
    assert_eq!(api.calls_to("Deidentify").await, 0);
}

#[tokio::test]
async fn deidentify_without_destination_is_not_found() {
    let api = FakeHealthcareApi::new();
    api.add_store("source").await;
    let gateway = HealthcareGateway::new(Arc::new(api.clone()), fast_policy());

    let err = gateway
        .deidentify_dicom_store(
            &DicomStore::new("source"),
            &DicomStore::new("destination"),
            &CancelToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.to_string().starts_with("Deidentify"), "{}", err);
}

#[tokio::test]
async fn import_and_export_return_on_acceptance() {
    let api = FakeHealthcareApi::new();
    api.add_store("store").await;
    api.fake_polls_until_done(5).await;
    let gateway = HealthcareGateway::new(Arc::new(api.clone()), fast_policy());
    let store = DicomStore::new("store");

    let import = gateway
        .import_dicom_instance(&store, "gs://bucket/scans/**.dcm")
        .await
        .unwrap();
    let export = gateway
        .export_dicom_instance(&store, "gs://bucket/out")
        .await
        .unwrap();

    assert!(!import.done);
    assert!(!export.done);
    assert_eq!(api.calls_to("operations.get").await, 0);
    assert_eq!(
        api.imports().await,
        vec![("store".to_string(), "gs://bucket/scans/**.dcm".to_string())]
    );
    assert_eq!(
        api.exports().await,
        vec![("store".to_string(), "gs://bucket/out".to_string())]
    );

    let finished = gateway
        .wait_for_operation(&import, &CancelToken::new())
        .await
        .unwrap();
    assert!(finished.done);
}

#[tokio::test]
async fn non_gcs_uris_are_rejected() {
    let api = FakeHealthcareApi::new();
    api.add_store("store").await;
    let gateway = HealthcareGateway::new(Arc::new(api.clone()), fast_policy());
    let store = DicomStore::new("store");

    for uri in ["https://bucket/x", "gs://", "/local/path", "gs:///x"] {
        let err = gateway.import_dicom_instance(&store, uri).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid, "{}", uri);
        let err = gateway.export_dicom_instance(&store, uri).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid, "{}", uri);
    }
    assert!(api.imports().await.is_empty());
    assert!(api.exports().await.is_empty());
}

#[test]
fn generated_store_ids_are_unique() {
    let a = HealthcareGateway::generate_dicom_store_id("deid");
    let b = HealthcareGateway::generate_dicom_store_id("deid");
    assert!(a.starts_with("deid-"));
    assert_ne!(a, b);
}
