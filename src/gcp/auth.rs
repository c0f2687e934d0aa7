use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use tracing::debug;

use super::credentials::{CredentialError, ServiceAccountKey};

const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
const TOKEN_LIFETIME: Duration = Duration::from_secs(55 * 60);
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// OAuth2 access tokens minted from a service account key, cached until close to expiry
#[derive(Clone)]
pub struct GcpAuth {
    key_path: PathBuf,
    client: reqwest::Client,
    token: Arc<RwLock<Option<CachedToken>>>,
}

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

#[derive(serde::Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

impl GcpAuth {
    pub fn new(key_path: impl Into<PathBuf>, client: reqwest::Client) -> Self {
        Self {
            key_path: key_path.into(),
            client,
            token: Arc::new(RwLock::new(None)),
        }
    }

    /// Get a valid access token, refreshing if needed
    pub async fn get_token(&self) -> Result<String, CredentialError> {
        {
            let token = self.token.read().await;
            if let Some(ref cached) = *token {
                if cached.expires_at > Instant::now() + REFRESH_MARGIN {
                    return Ok(cached.access_token.clone());
                }
            }
        }

        let (access_token, lifetime) = self.refresh_token().await?;

        let mut token = self.token.write().await;
        *token = Some(CachedToken {
            access_token: access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });

        Ok(access_token)
    }

    async fn refresh_token(&self) -> Result<(String, Duration), CredentialError> {
        let key = ServiceAccountKey::from_file(&self.key_path).await?;

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| CredentialError::TokenExchange(e.to_string()))?
            .as_secs() as i64;
        let jwt = key.jwt_assertion(CLOUD_PLATFORM_SCOPE, now)?;

        debug!("Exchanging JWT assertion for access token as {}", key.client_email);

        let response = self
            .client
            .post(&key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", jwt.as_str()),
            ])
            .send()
            .await
            .map_err(|e| CredentialError::TokenExchange(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialError::TokenExchange(format!(
                "status {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| CredentialError::TokenExchange(e.to_string()))?;

        let lifetime = token
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(TOKEN_LIFETIME);

        Ok((token.access_token, lifetime))
    }
}
