//! Service account key material.
//!
//! Keys are read from the JSON document Google issues for a service account and
//! used for RS256 signatures (OAuth2 JWT grants and V4 signed URLs).

use base64::Engine;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("ReadFile {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid service account key: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid private key: {0}")]
    Key(String),

    #[error("signing failed: {0}")]
    Sign(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),
}

/// The subset of a service account JSON key this service needs
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> Result<Self, CredentialError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse the key file; called on every use so rotated keys are picked up
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, CredentialError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| CredentialError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_json(&content)
    }

    pub fn sign_rs256(&self, data: &[u8]) -> Result<Vec<u8>, CredentialError> {
        rsa_sha256_sign(&self.private_key, data)
    }

    /// Build a signed JWT assertion for the OAuth2 jwt-bearer grant
    pub fn jwt_assertion(&self, scope: &str, issued_at: i64) -> Result<String, CredentialError> {
        let claims = serde_json::json!({
            "iss": self.client_email,
            "scope": scope,
            "aud": self.token_uri,
            "iat": issued_at,
            "exp": issued_at + 3600,
        });

        let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        let header = engine.encode(r#"{"alg":"RS256","typ":"JWT"}"#.as_bytes());
        let payload = engine.encode(claims.to_string().as_bytes());
        let signing_input = format!("{}.{}", header, payload);

        let signature = self.sign_rs256(signing_input.as_bytes())?;
        Ok(format!("{}.{}", signing_input, engine.encode(signature)))
    }
}

/// RSASSA-PKCS1-v1_5 with SHA-256 over `data`, using a PKCS#8 PEM private key
fn rsa_sha256_sign(private_key_pem: &str, data: &[u8]) -> Result<Vec<u8>, CredentialError> {
    let private_key = private_key_pem.replace("\\n", "\n");
    let parsed = pem::parse(&private_key)
        .map_err(|e| CredentialError::Key(format!("failed to parse PEM: {}", e)))?;
    let key_pair = ring::signature::RsaKeyPair::from_pkcs8(parsed.contents())
        .map_err(|e| CredentialError::Key(e.to_string()))?;

    let mut signature = vec![0u8; key_pair.public().modulus_len()];
    key_pair
        .sign(
            &ring::signature::RSA_PKCS1_SHA256,
            &ring::rand::SystemRandom::new(),
            data,
            &mut signature,
        )
        .map_err(|e| CredentialError::Sign(format!("{:?}", e)))?;
    Ok(signature)
}
