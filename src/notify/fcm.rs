use super::messages::{FcmApiResponse, NotificationMessage};
use super::PushSender;
use crate::error::{RelayError, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::Mutex;
use tracing::{debug, info};

const FCM_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";

/// Refresh the access token when it has less than this left
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// Firebase service account key (the JSON downloaded from the console)
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub project_id: String,
    pub private_key: String,
    pub client_email: String,
    pub token_uri: String,
}

impl ServiceAccountKey {
    pub async fn from_file(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read(path).await?;
        serde_json::from_slice(&raw).map_err(|e| {
            RelayError::NotificationDelivery(format!(
                "invalid service account key {}: {}",
                path.display(),
                e
            ))
        })
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: i64,
}

/// JWT claims for the Google OAuth2 service-account flow
#[derive(Debug, Serialize)]
struct JwtClaims {
    iss: String,
    sub: String,
    scope: String,
    aud: String,
    exp: i64,
    iat: i64,
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Firebase Cloud Messaging HTTP v1 client
pub struct FcmClient {
    project_id: String,
    credentials: ServiceAccountKey,
    token_cache: Mutex<Option<CachedToken>>,
    http_client: reqwest::Client,
}

impl FcmClient {
    pub fn new(project_id: String, credentials: ServiceAccountKey) -> Self {
        Self {
            project_id,
            credentials,
            token_cache: Mutex::new(None),
            http_client: reqwest::Client::new(),
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    fn send_url(&self) -> String {
        format!(
            "https://fcm.googleapis.com/v1/projects/{}/messages:send",
            self.project_id
        )
    }

    /// Get an OAuth2 access token, reusing the cached one while it is valid
    async fn access_token(&self) -> Result<String> {
        let mut cache = self.token_cache.lock().await;

        if let Some(cached) = cache.as_ref() {
            if cached.expires_at > Utc::now().timestamp() + TOKEN_REFRESH_MARGIN_SECS {
                return Ok(cached.access_token.clone());
            }
        }

        let now = Utc::now();
        let claims = JwtClaims {
            iss: self.credentials.client_email.clone(),
            sub: self.credentials.client_email.clone(),
            scope: FCM_SCOPE.to_string(),
            aud: self.credentials.token_uri.clone(),
            exp: (now + Duration::hours(1)).timestamp(),
            iat: now.timestamp(),
        };

        let key = EncodingKey::from_rsa_pem(self.credentials.private_key.as_bytes())
            .map_err(|e| delivery_error("failed to parse private key", e))?;
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| delivery_error("failed to encode JWT", e))?;

        let params = [
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", assertion.as_str()),
        ];

        let response = self
            .http_client
            .post(&self.credentials.token_uri)
            .form(&params)
            .send()
            .await
            .map_err(|e| delivery_error("token request failed", e))?;

        if !response.status().is_success() {
            return Err(RelayError::NotificationDelivery(format!(
                "token request failed with status {}",
                response.status()
            )));
        }

        let token: GoogleTokenResponse = response
            .json()
            .await
            .map_err(|e| delivery_error("failed to parse token response", e))?;

        debug!("Refreshed FCM access token (expires in {}s)", token.expires_in);

        *cache = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at: Utc::now().timestamp() + token.expires_in,
        });

        Ok(token.access_token)
    }
}

#[async_trait::async_trait]
impl PushSender for FcmClient {
    async fn send(&self, message: &NotificationMessage) -> Result<String> {
        let access_token = self.access_token().await?;

        let response = self
            .http_client
            .post(self.send_url())
            .bearer_auth(access_token)
            .json(&message.to_fcm())
            .send()
            .await
            .map_err(|e| delivery_error("FCM send request failed", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RelayError::NotificationDelivery(format!(
                "FCM API error: {} - {}",
                status, body
            )));
        }

        let body: FcmApiResponse = response
            .json()
            .await
            .map_err(|e| delivery_error("failed to parse FCM response", e))?;

        Ok(body.name.unwrap_or_default())
    }

    fn name(&self) -> &str {
        "fcm"
    }
}

/// Load credentials and build a client
pub async fn connect(project_id: Option<String>, key_path: &Path) -> Result<FcmClient> {
    let credentials = ServiceAccountKey::from_file(key_path).await?;
    let project_id = project_id.unwrap_or_else(|| credentials.project_id.clone());
    info!("FCM push enabled for project {}", project_id);
    Ok(FcmClient::new(project_id, credentials))
}

fn delivery_error(context: &str, err: impl std::fmt::Display) -> RelayError {
    RelayError::NotificationDelivery(format!("{}: {}", context, err))
}
