//! Verification client.

use crate::backend::SignInBackend;
use crate::error::{HandshakeError, HandshakeResult};
use crate::types::{SignInChallenge, SignedResponse, VerificationVerdict};
use std::sync::Arc;
use tracing::{debug, warn};

/// Submits signed responses for verification.
///
/// The original challenge travels with the response so the backend can
/// confirm the signature covers exactly what it issued.
#[derive(Clone)]
pub struct VerificationClient {
    backend: Option<Arc<dyn SignInBackend>>,
}

impl VerificationClient {
    pub fn new(backend: Option<Arc<dyn SignInBackend>>) -> Self {
        Self { backend }
    }

    pub fn is_configured(&self) -> bool {
        self.backend.is_some()
    }

    /// Verify a signed response. Does not touch the session state.
    pub async fn verify(
        &self,
        challenge: &SignInChallenge,
        response: &SignedResponse,
    ) -> HandshakeResult<VerificationVerdict> {
        let backend = self.backend.as_ref().ok_or_else(|| {
            HandshakeError::PreconditionUnmet("verification backend is not configured".to_string())
        })?;

        match backend.verify(challenge, response).await {
            Ok(verdict) => {
                if let VerificationVerdict::Rejected { reason } = &verdict {
                    debug!(reason = %reason, "Verification rejected");
                }
                Ok(verdict)
            }
            Err(e) => {
                warn!(error = %e, transient = e.is_transient(), "Verification request failed");
                Err(HandshakeError::VerificationUnavailable(e))
            }
        }
    }
}
