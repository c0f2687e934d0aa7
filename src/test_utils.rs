use crate::config::Config;
use std::path::{Path, PathBuf};

/// Check if a test is enabled via environment variable
fn is_test_enabled(env_var: &str) -> bool {
    std::env::var(env_var)
        .map(|v| v.to_lowercase() == "true")
        .unwrap_or(false)
}

/// Check if tests against the real Google Cloud APIs are enabled
pub fn is_gcp_enabled() -> bool {
    is_test_enabled("ENABLE_GCP_TESTS")
}

/// A throwaway service account key with a real RSA private key
pub fn test_service_account_json() -> &'static str {
    include_str!("../testdata/service-account.json")
}

/// Write the test service account key into `dir` and return its path
pub fn write_test_service_account(dir: &Path) -> PathBuf {
    let path = dir.join("service-account.json");
    std::fs::write(&path, test_service_account_json()).expect("write test service account");
    path
}

/// Write one fake DICOM file per name into `dir`, each with distinct content
pub fn write_dicom_files(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
    names
        .iter()
        .map(|name| {
            let path = dir.join(name);
            let mut content = vec![0u8; 128];
            content.extend_from_slice(b"DICM");
            content.extend_from_slice(name.as_bytes());
            std::fs::write(&path, content).expect("write test dicom file");
            path
        })
        .collect()
}

pub fn load_gcp_test_config() -> Result<Config, anyhow::Error> {
    crate::config::load_config(crate::config::DEFAULT_CONFIG_PATH)
        .map_err(|e| anyhow::anyhow!("Failed to load config.toml: {}", e))
}
