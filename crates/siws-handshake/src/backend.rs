//! Challenge and verification backend.
//!
//! `SignInBackend` is the RPC surface the challenge and verification clients
//! talk to. `HttpSignInBackend` speaks JSON over HTTP to a functions endpoint:
//!
//! - `POST {functions_url}/createSignInData` with `{}` returns `{"signInData": {...}}`
//! - `POST {functions_url}/verifySIWS` with `{"input", "output"}` returns `{"token": "..."}`

use crate::error::{BackendError, BackendResult};
use crate::types::{SignInChallenge, SignedResponse, VerificationVerdict};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Statuses that mean the backend looked at the proof and refused it.
const REJECTION_STATUSES: [u16; 6] = [400, 401, 403, 409, 410, 422];

/// Backend that issues and verifies sign-in challenges.
#[async_trait]
pub trait SignInBackend: Send + Sync {
    async fn create_challenge(&self) -> BackendResult<SignInChallenge>;

    /// Verify `response` against the challenge it claims to sign. Safe to
    /// call again with the same arguments after a transport failure.
    async fn verify(
        &self,
        challenge: &SignInChallenge,
        response: &SignedResponse,
    ) -> BackendResult<VerificationVerdict>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSignInDataResponse {
    sign_in_data: Option<SignInChallenge>,
}

#[derive(Debug, Serialize)]
struct VerifyRequest<'a> {
    input: &'a SignInChallenge,
    output: &'a SignedResponse,
}

#[derive(Debug, Default, Deserialize)]
struct VerifyResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

impl VerifyResponse {
    fn reason(&self) -> Option<String> {
        if let Some(message) = self.message.as_ref().filter(|m| !m.is_empty()) {
            return Some(message.clone());
        }
        match self.error.as_ref()? {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Object(obj) => obj
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string),
            _ => None,
        }
    }
}

/// JSON-over-HTTP sign-in backend.
#[derive(Clone)]
pub struct HttpSignInBackend {
    http_client: reqwest::Client,
    functions_url: String,
}

impl HttpSignInBackend {
    /// Create a backend rooted at `functions_url`, applying `timeout` to
    /// every request.
    pub fn new(functions_url: &str, timeout: Duration) -> BackendResult<Self> {
        Url::parse(functions_url)?;
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            functions_url: functions_url.trim_end_matches('/').to_string(),
        })
    }

    fn function_url(&self, name: &str) -> String {
        format!("{}/{}", self.functions_url, name)
    }
}

#[async_trait]
impl SignInBackend for HttpSignInBackend {
    async fn create_challenge(&self) -> BackendResult<SignInChallenge> {
        let url = self.function_url("createSignInData");
        debug!(url = %url, "Requesting sign-in challenge");

        let response = self
            .http_client
            .post(&url)
            .json(&serde_json::json!({}))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "Challenge request failed");
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: CreateSignInDataResponse = response.json().await?;
        body.sign_in_data
            .ok_or_else(|| BackendError::Malformed("response has no signInData".to_string()))
    }

    async fn verify(
        &self,
        challenge: &SignInChallenge,
        response: &SignedResponse,
    ) -> BackendResult<VerificationVerdict> {
        let url = self.function_url("verifySIWS");
        debug!(url = %url, address = %response.account.address, "Verifying signed challenge");

        let http_response = self
            .http_client
            .post(&url)
            .json(&VerifyRequest {
                input: challenge,
                output: response,
            })
            .send()
            .await?;

        let status = http_response.status();
        if REJECTION_STATUSES.contains(&status.as_u16()) {
            let body = http_response.text().await.unwrap_or_default();
            let parsed: VerifyResponse = serde_json::from_str(&body).unwrap_or_default();
            let reason = parsed
                .reason()
                .unwrap_or_else(|| format!("verification refused with HTTP {}", status.as_u16()));
            return Ok(VerificationVerdict::Rejected { reason });
        }
        if !status.is_success() {
            let body = http_response.text().await.unwrap_or_default();
            warn!(status = %status, "Verification request failed");
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: VerifyResponse = http_response.json().await?;
        match body.token {
            Some(token) if !token.is_empty() => Ok(VerificationVerdict::Verified {
                exchange_artifact: token,
            }),
            _ => Ok(VerificationVerdict::Rejected {
                reason: body
                    .reason()
                    .unwrap_or_else(|| "verification returned no token".to_string()),
            }),
        }
    }
}
