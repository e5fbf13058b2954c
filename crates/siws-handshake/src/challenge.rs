//! Challenge client.

use crate::backend::SignInBackend;
use crate::error::{HandshakeError, HandshakeResult};
use crate::types::SignInChallenge;
use std::sync::Arc;
use tracing::{debug, warn};

/// Requests single-use sign-in challenges.
#[derive(Clone)]
pub struct ChallengeClient {
    backend: Option<Arc<dyn SignInBackend>>,
}

impl ChallengeClient {
    pub fn new(backend: Option<Arc<dyn SignInBackend>>) -> Self {
        Self { backend }
    }

    /// Whether a backend has been configured.
    pub fn is_configured(&self) -> bool {
        self.backend.is_some()
    }

    /// Request a freshly minted challenge.
    ///
    /// An unconfigured backend is `PreconditionUnmet`; any transport or
    /// backend failure is `ChallengeUnavailable`.
    pub async fn request_challenge(&self) -> HandshakeResult<SignInChallenge> {
        let backend = self.backend.as_ref().ok_or_else(|| {
            HandshakeError::PreconditionUnmet("sign-in backend is not configured".to_string())
        })?;

        match backend.create_challenge().await {
            Ok(challenge) => {
                debug!(
                    has_nonce = challenge.nonce.is_some(),
                    "Received sign-in challenge"
                );
                Ok(challenge)
            }
            Err(e) => {
                warn!(error = %e, transient = e.is_transient(), "Challenge request failed");
                Err(HandshakeError::ChallengeUnavailable(e))
            }
        }
    }
}
