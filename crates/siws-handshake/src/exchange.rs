//! Session exchanger.
//!
//! Redeems a verified exchange artifact and publishes the resulting session.
//! The session store is only ever written here and in sign-out, and each
//! write replaces the whole value.

use crate::error::{BackendResult, HandshakeError, HandshakeResult};
use crate::session_backend::SessionBackend;
use crate::session_store::SessionStore;
use crate::types::{SessionState, UserIdentity};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct SessionExchanger {
    backend: Option<Arc<dyn SessionBackend>>,
    store: Arc<dyn SessionStore>,
}

impl SessionExchanger {
    pub fn new(backend: Option<Arc<dyn SessionBackend>>, store: Arc<dyn SessionStore>) -> Self {
        Self { backend, store }
    }

    pub fn is_configured(&self) -> bool {
        self.backend.is_some()
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Redeem `artifact` and publish `Authenticated`.
    ///
    /// Does not retry. If `cancel` fired while the backend call was running,
    /// the fresh credential is released and nothing is published.
    pub async fn exchange(
        &self,
        artifact: &str,
        wallet_address: &str,
        cancel: &CancellationToken,
    ) -> HandshakeResult<SessionState> {
        let backend = self.backend.as_ref().ok_or_else(|| {
            HandshakeError::PreconditionUnmet("session backend is not configured".to_string())
        })?;

        let exchanged = backend.exchange(artifact).await.map_err(|e| {
            warn!(error = %e, "Session exchange failed");
            HandshakeError::ExchangeFailed(e)
        })?;

        if cancel.is_cancelled() {
            debug!("Attempt abandoned during exchange; releasing credential");
            if let Err(e) = backend.sign_out(&exchanged.credential).await {
                warn!(error = %e, "Failed to release abandoned credential");
            }
            return Err(HandshakeError::Cancelled);
        }

        let state = SessionState::Authenticated {
            user: UserIdentity {
                user_id: exchanged.user_id,
                wallet_address: wallet_address.to_string(),
            },
            credential: exchanged.credential,
        };
        self.store.write(state.clone());
        info!(wallet = %wallet_address, "Session established");

        Ok(state)
    }

    /// Reset the store to `Unauthenticated`, then release the credential it
    /// held, if any. The store is reset even when the release fails.
    pub async fn sign_out(&self) -> BackendResult<()> {
        let previous = self.store.read();
        self.store.write(SessionState::Unauthenticated);

        match (previous.credential(), self.backend.as_ref()) {
            (Some(credential), Some(backend)) => backend.sign_out(credential).await,
            _ => Ok(()),
        }
    }
}
