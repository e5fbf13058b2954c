//! Session backend: redeems exchange artifacts for live credentials.
//!
//! `HttpSessionBackend` uses the custom-token sign-in flow: the artifact is
//! posted to `{session_url}?key={api_key}` as
//! `{"token": ..., "returnSecureToken": true}` and the response carries an id
//! token, a refresh token and a lifetime in seconds.

use crate::error::{BackendError, BackendResult};
use crate::types::SessionCredential;
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Lifetime assumed when the backend does not report one.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Result of redeeming an exchange artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangedSession {
    pub user_id: String,
    pub credential: SessionCredential,
}

/// Backend that turns exchange artifacts into session credentials.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Redeem `artifact`. The artifact is single-use.
    async fn exchange(&self, artifact: &str) -> BackendResult<ExchangedSession>;

    /// Release a credential previously returned by `exchange`.
    async fn sign_out(&self, credential: &SessionCredential) -> BackendResult<()>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CustomTokenRequest<'a> {
    token: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomTokenResponse {
    id_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    /// Seconds, sent as a string by most providers.
    #[serde(default)]
    expires_in: Option<serde_json::Value>,
    #[serde(default)]
    local_id: Option<String>,
}

/// Lifetime of the credential in seconds. Absent means the default; anything
/// present must be a non-negative integer.
fn parse_expires_in(value: Option<&serde_json::Value>) -> BackendResult<i64> {
    let secs = match value {
        None | Some(serde_json::Value::Null) => return Ok(DEFAULT_EXPIRES_IN_SECS),
        Some(serde_json::Value::String(s)) => s.trim().parse::<i64>().ok(),
        Some(serde_json::Value::Number(n)) => n.as_i64(),
        Some(_) => None,
    };
    match secs {
        Some(secs) if secs >= 0 => Ok(secs),
        _ => Err(BackendError::Malformed(format!(
            "unusable expiresIn {}",
            value.map(|v| v.to_string()).unwrap_or_default()
        ))),
    }
}

/// Absolute expiry `expires_in` seconds after `now`.
fn expiry_after(now: DateTime<Utc>, expires_in: i64) -> BackendResult<DateTime<Utc>> {
    ChronoDuration::try_seconds(expires_in)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .ok_or_else(|| BackendError::Malformed(format!("expiresIn {} is out of range", expires_in)))
}

/// Extract the user id (`user_id`, else `sub`) from a JWT payload without
/// verifying it. The token came straight from the session backend.
pub fn jwt_subject(token: &str) -> Option<String> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    claims
        .get("user_id")
        .or_else(|| claims.get("sub"))
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// HTTP session backend.
#[derive(Clone)]
pub struct HttpSessionBackend {
    http_client: reqwest::Client,
    session_url: String,
    api_key: Option<String>,
    revoke_url: Option<String>,
}

impl HttpSessionBackend {
    pub fn new(
        session_url: &str,
        api_key: Option<String>,
        revoke_url: Option<String>,
        timeout: Duration,
    ) -> BackendResult<Self> {
        Url::parse(session_url)?;
        if let Some(revoke) = revoke_url.as_deref() {
            Url::parse(revoke)?;
        }
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            session_url: session_url.to_string(),
            api_key,
            revoke_url,
        })
    }
}

#[async_trait]
impl SessionBackend for HttpSessionBackend {
    async fn exchange(&self, artifact: &str) -> BackendResult<ExchangedSession> {
        debug!("Exchanging verification token for a session");

        let mut request = self.http_client.post(&self.session_url).json(&CustomTokenRequest {
            token: artifact,
            return_secure_token: true,
        });
        if let Some(key) = self.api_key.as_deref() {
            request = request.query(&[("key", key)]);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "Session exchange rejected");
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: CustomTokenResponse = response.json().await?;
        let id_token = body
            .id_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| BackendError::Malformed("response has no idToken".to_string()))?;
        let user_id = body
            .local_id
            .filter(|id| !id.is_empty())
            .or_else(|| jwt_subject(&id_token))
            .ok_or_else(|| BackendError::Malformed("cannot determine user id".to_string()))?;

        let expires_in = parse_expires_in(body.expires_in.as_ref())?;
        let credential = SessionCredential {
            id_token,
            refresh_token: body.refresh_token,
            expires_at: expiry_after(Utc::now(), expires_in)?,
        };

        Ok(ExchangedSession {
            user_id,
            credential,
        })
    }

    async fn sign_out(&self, credential: &SessionCredential) -> BackendResult<()> {
        let Some(revoke_url) = self.revoke_url.as_deref() else {
            debug!("No revoke endpoint configured; dropping credential locally");
            return Ok(());
        };

        let response = self
            .http_client
            .post(revoke_url)
            .header("Authorization", format!("Bearer {}", credential.id_token))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}
