//! Handshake orchestrator.
//!
//! Drives one connect or sign-in attempt per adapter through the handshake
//! state machine:
//!
//! - `connect`: silent auto-connect first, escalating to the interactive
//!   challenge/sign/verify/exchange handshake when auto-connect fails on an
//!   adapter that can sign in.
//! - `sign_in`: the interactive handshake directly.
//!
//! Any failure after the handshake has begun runs cleanup (reset the session,
//! release the credential, disconnect the adapter) before the error is
//! reported to the notification sink and returned.

use crate::adapter::{AdapterCapability, AdapterHandle};
use crate::backend::{HttpSignInBackend, SignInBackend};
use crate::challenge::ChallengeClient;
use crate::error::{HandshakeError, HandshakeResult, WalletError};
use crate::exchange::SessionExchanger;
use crate::gateway::SigningGateway;
use crate::handshake_fsm::{
    after_auto_connect, HandshakeMachine, HandshakeMachineInput, HandshakePhase, HandshakePolicy,
};
use crate::notify::{Notification, NotificationSink};
use crate::session_backend::{HttpSessionBackend, SessionBackend};
use crate::session_store::SessionStore;
use crate::types::{SessionState, UserIdentity, VerificationVerdict};
use crate::verification::VerificationClient;
use parking_lot::Mutex;
use siws_config_and_utils::BackendConfig;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Callback invoked with the adapter name and the new phase on every phase
/// change.
pub type PhaseCallback = Arc<dyn Fn(&str, HandshakePhase) + Send + Sync>;

/// How a `connect` or `sign_in` attempt ended without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Transport connection only; no backend session was established.
    Connected,
    /// Handshake completed and the session was published.
    Authenticated(UserIdentity),
    /// Auto-connect failed on an adapter that cannot sign in.
    SignInUnavailable,
    /// The caller cancelled; no session transition was published.
    Abandoned,
}

/// Backends the handshake talks to. `None` means not configured.
#[derive(Clone, Default)]
pub struct HandshakeServices {
    pub sign_in_backend: Option<Arc<dyn SignInBackend>>,
    pub session_backend: Option<Arc<dyn SessionBackend>>,
}

impl HandshakeServices {
    /// Build HTTP backends from configuration.
    ///
    /// An unconfigured backend yields empty services; every handshake will
    /// then fail with `PreconditionUnmet`.
    pub fn from_config(config: &BackendConfig) -> HandshakeResult<Self> {
        let (Some(functions_url), Some(session_url)) =
            (config.functions_url.as_deref(), config.session_url.as_deref())
        else {
            debug!("Sign-in backend not configured");
            return Ok(Self::default());
        };

        let timeout = config.request_timeout();
        let sign_in = HttpSignInBackend::new(functions_url, timeout).map_err(|e| {
            HandshakeError::PreconditionUnmet(format!("invalid functions URL: {}", e))
        })?;
        let session = HttpSessionBackend::new(
            session_url,
            config.session_api_key.clone(),
            config.revoke_url.clone(),
            timeout,
        )
        .map_err(|e| HandshakeError::PreconditionUnmet(format!("invalid session URL: {}", e)))?;

        Ok(Self {
            sign_in_backend: Some(Arc::new(sign_in)),
            session_backend: Some(Arc::new(session)),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.sign_in_backend.is_some() && self.session_backend.is_some()
    }
}

/// Coordinates the wallet agent, the backends and the session store.
pub struct HandshakeOrchestrator {
    challenges: ChallengeClient,
    verifier: VerificationClient,
    exchanger: SessionExchanger,
    notifier: Arc<dyn NotificationSink>,
    policy: HandshakePolicy,
    /// Names of adapters with an attempt in flight.
    in_flight: Mutex<HashSet<String>>,
    phase_callback: Mutex<Option<PhaseCallback>>,
}

impl HandshakeOrchestrator {
    pub fn new(
        services: HandshakeServices,
        session: Arc<dyn SessionStore>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            challenges: ChallengeClient::new(services.sign_in_backend.clone()),
            verifier: VerificationClient::new(services.sign_in_backend),
            exchanger: SessionExchanger::new(services.session_backend, session),
            notifier,
            policy: HandshakePolicy::default(),
            in_flight: Mutex::new(HashSet::new()),
            phase_callback: Mutex::new(None),
        }
    }

    pub fn with_policy(mut self, policy: HandshakePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set a callback to be notified of phase changes.
    ///
    /// The callback may itself replace the callback; it runs outside the lock.
    pub fn set_phase_callback<F>(&self, callback: F)
    where
        F: Fn(&str, HandshakePhase) + Send + Sync + 'static,
    {
        *self.phase_callback.lock() = Some(Arc::new(callback));
    }

    /// Current session state.
    pub fn session(&self) -> SessionState {
        self.exchanger.store().read()
    }

    /// Connect `adapter`, escalating to the sign-in handshake when silent
    /// reconnection fails and the adapter can sign in.
    pub async fn connect(
        &self,
        adapter: &AdapterHandle,
        cancel: CancellationToken,
    ) -> HandshakeResult<ConnectOutcome> {
        let _guard = self.begin_attempt(adapter)?;
        let mut attempt = Attempt::new(self, adapter.name());
        let gateway = SigningGateway::new(adapter);

        attempt.advance(&HandshakeMachineInput::AdapterSelected)?;
        attempt.advance(&HandshakeMachineInput::AutoConnectStarted)?;

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = gateway.auto_connect() => Some(result),
        };
        let Some(result) = result else {
            attempt.advance(&HandshakeMachineInput::Abandoned)?;
            self.release_adapter(&gateway).await;
            return Ok(ConnectOutcome::Abandoned);
        };

        if let Err(e) = &result {
            debug!(adapter = %adapter.name(), error = %e, "Auto-connect failed");
        }

        let has_session = self.session().is_authenticated();
        let input = after_auto_connect(&result, adapter.capability(), has_session, &self.policy);
        attempt.advance(&input)?;

        match input {
            HandshakeMachineInput::AutoConnected => {
                info!(adapter = %adapter.name(), "Wallet connected");
                Ok(ConnectOutcome::Connected)
            }
            HandshakeMachineInput::SignInUnavailable => {
                info!(adapter = %adapter.name(), "Wallet cannot sign in and did not reconnect");
                Ok(ConnectOutcome::SignInUnavailable)
            }
            HandshakeMachineInput::HandshakeRequired => {
                self.run_handshake(&mut attempt, &gateway, &cancel).await
            }
            other => Err(HandshakeError::InvalidStateTransition(format!(
                "Unexpected auto-connect decision {:?}",
                other
            ))),
        }
    }

    /// Run the sign-in handshake without trying auto-connect first.
    pub async fn sign_in(
        &self,
        adapter: &AdapterHandle,
        cancel: CancellationToken,
    ) -> HandshakeResult<ConnectOutcome> {
        let _guard = self.begin_attempt(adapter)?;

        if adapter.capability() != AdapterCapability::ConnectAndSignIn {
            let err = HandshakeError::PreconditionUnmet(format!(
                "{} does not support sign-in",
                adapter.name()
            ));
            self.report(&err);
            return Err(err);
        }

        let mut attempt = Attempt::new(self, adapter.name());
        let gateway = SigningGateway::new(adapter);
        attempt.advance(&HandshakeMachineInput::AdapterSelected)?;
        attempt.advance(&HandshakeMachineInput::SignInRequested)?;

        self.run_handshake(&mut attempt, &gateway, &cancel).await
    }

    /// Reset the session, release its credential and disconnect `adapter`.
    ///
    /// Never fails; secondary failures are logged. Safe to call repeatedly.
    pub async fn cleanup(&self, adapter: &AdapterHandle) {
        if let Err(e) = self.exchanger.sign_out().await {
            warn!(error = %e, "Failed to release session credential during cleanup");
        }
        self.release_adapter(&SigningGateway::new(adapter)).await;
    }

    /// Explicit sign-out, outside any handshake.
    pub async fn sign_out(&self, adapter: Option<&AdapterHandle>) {
        info!("Signing out");
        if let Err(e) = self.exchanger.sign_out().await {
            warn!(error = %e, "Failed to release session credential during sign-out");
        }
        if let Some(adapter) = adapter {
            self.release_adapter(&SigningGateway::new(adapter)).await;
        }
    }

    /// Forward a wallet-agent error raised outside a handshake.
    pub fn report_wallet_error(&self, wallet_error: &WalletError) {
        error!(kind = wallet_error.name(), error = %wallet_error, "Wallet error");
        self.notifier
            .notify(Notification::error(wallet_error.name(), wallet_error.to_string()));
    }

    async fn run_handshake(
        &self,
        attempt: &mut Attempt<'_>,
        gateway: &SigningGateway<'_>,
        cancel: &CancellationToken,
    ) -> HandshakeResult<ConnectOutcome> {
        if !self.challenges.is_configured() || !self.exchanger.is_configured() {
            let err =
                HandshakeError::PreconditionUnmet("sign-in backend is not configured".to_string());
            attempt.advance(&HandshakeMachineInput::PreconditionUnmet)?;
            self.report(&err);
            return Err(err);
        }

        info!(adapter = %attempt.adapter, "Starting sign-in handshake");
        match self.handshake_stages(gateway, cancel).await {
            Ok(user) => {
                attempt.advance(&HandshakeMachineInput::HandshakeSucceeded)?;
                info!(adapter = %attempt.adapter, user_id = %user.user_id, "Sign-in handshake complete");
                Ok(ConnectOutcome::Authenticated(user))
            }
            Err(HandshakeError::Cancelled) => {
                info!(adapter = %attempt.adapter, "Sign-in handshake abandoned");
                attempt.advance(&HandshakeMachineInput::Abandoned)?;
                self.release_adapter(gateway).await;
                Ok(ConnectOutcome::Abandoned)
            }
            Err(err) => {
                warn!(adapter = %attempt.adapter, kind = ?err.kind(), error = %err, "Sign-in handshake failed");
                attempt.advance(&HandshakeMachineInput::HandshakeFailed)?;
                self.cleanup(gateway.adapter()).await;
                attempt.advance(&HandshakeMachineInput::CleanupComplete)?;
                self.report(&err);
                Err(err)
            }
        }
    }

    /// Challenge, sign, verify, exchange; strictly in that order.
    async fn handshake_stages(
        &self,
        gateway: &SigningGateway<'_>,
        cancel: &CancellationToken,
    ) -> HandshakeResult<UserIdentity> {
        let challenge = until_cancelled(cancel, self.challenges.request_challenge()).await?;
        let signed = until_cancelled(cancel, gateway.sign_challenge(&challenge)).await?;
        let verdict = until_cancelled(cancel, self.verifier.verify(&challenge, &signed)).await?;

        let artifact = match verdict {
            VerificationVerdict::Verified { exchange_artifact } => exchange_artifact,
            VerificationVerdict::Rejected { reason } => {
                return Err(HandshakeError::Rejected { reason })
            }
        };

        if cancel.is_cancelled() {
            return Err(HandshakeError::Cancelled);
        }
        let state = self
            .exchanger
            .exchange(&artifact, &signed.account.address, cancel)
            .await?;

        state.user().cloned().ok_or_else(|| {
            HandshakeError::InvalidStateTransition("exchange published no user".to_string())
        })
    }

    async fn release_adapter(&self, gateway: &SigningGateway<'_>) {
        if !gateway.is_connected() {
            return;
        }
        if let Err(e) = gateway.disconnect().await {
            warn!(adapter = %gateway.adapter().name(), error = %e, "Failed to disconnect wallet");
        }
    }

    fn report(&self, err: &HandshakeError) {
        self.notifier
            .notify(Notification::error(err.title(), err.to_string()));
    }

    fn begin_attempt(&self, adapter: &AdapterHandle) -> HandshakeResult<InFlightGuard<'_>> {
        let name = adapter.name().to_string();
        if !self.in_flight.lock().insert(name.clone()) {
            return Err(HandshakeError::AttemptInFlight(name));
        }
        Ok(InFlightGuard {
            in_flight: &self.in_flight,
            name,
        })
    }

    fn notify_phase(&self, adapter: &str, phase: HandshakePhase) {
        let callback = self.phase_callback.lock().clone();
        if let Some(callback) = callback {
            callback(adapter, phase);
        }
    }
}

/// Removes the adapter from the in-flight set when the attempt ends.
struct InFlightGuard<'o> {
    in_flight: &'o Mutex<HashSet<String>>,
    name: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.name);
    }
}

/// State machine for a single attempt.
struct Attempt<'o> {
    orchestrator: &'o HandshakeOrchestrator,
    adapter: String,
    machine: HandshakeMachine,
}

impl<'o> Attempt<'o> {
    fn new(orchestrator: &'o HandshakeOrchestrator, adapter: &str) -> Self {
        Self {
            orchestrator,
            adapter: adapter.to_string(),
            machine: HandshakeMachine::new(),
        }
    }

    /// Transition the FSM and notify the phase callback if the phase changed.
    fn advance(&mut self, input: &HandshakeMachineInput) -> HandshakeResult<HandshakePhase> {
        let old_phase = HandshakePhase::from(self.machine.state());

        self.machine.consume(input).map_err(|_| {
            HandshakeError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input,
                self.machine.state()
            ))
        })?;

        let new_phase = HandshakePhase::from(self.machine.state());
        if old_phase != new_phase {
            debug!(
                adapter = %self.adapter,
                old_phase = ?old_phase,
                new_phase = ?new_phase,
                "Handshake phase transition"
            );
            self.orchestrator.notify_phase(&self.adapter, new_phase);
        }

        Ok(new_phase)
    }
}

async fn until_cancelled<T, F>(cancel: &CancellationToken, stage: F) -> HandshakeResult<T>
where
    F: Future<Output = HandshakeResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(HandshakeError::Cancelled),
        result = stage => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::TracingNotifier;
    use crate::session_store::WatchSessionStore;

    fn orchestrator(services: HandshakeServices) -> HandshakeOrchestrator {
        HandshakeOrchestrator::new(
            services,
            Arc::new(WatchSessionStore::new()),
            Arc::new(TracingNotifier),
        )
    }

    #[test]
    fn test_services_from_unconfigured_backend() {
        let services = HandshakeServices::from_config(&BackendConfig::default()).unwrap();
        assert!(!services.is_configured());
    }

    #[test]
    fn test_services_from_configured_backend() {
        let config = BackendConfig {
            functions_url: Some("https://functions.example.com".to_string()),
            session_url: Some("https://session.example.com/v1/accounts:signInWithCustomToken".to_string()),
            session_api_key: Some("key".to_string()),
            ..Default::default()
        };
        let services = HandshakeServices::from_config(&config).unwrap();
        assert!(services.is_configured());
    }

    #[test]
    fn test_services_with_invalid_url_is_precondition_unmet() {
        let config = BackendConfig {
            functions_url: Some("not a url".to_string()),
            session_url: Some("https://session.example.com".to_string()),
            ..Default::default()
        };
        let err = HandshakeServices::from_config(&config).err().unwrap();
        assert!(matches!(err, HandshakeError::PreconditionUnmet(_)));
    }

    #[test]
    fn test_in_flight_guard_releases_on_drop() {
        let orchestrator = orchestrator(HandshakeServices::default());
        let set = &orchestrator.in_flight;

        {
            let _guard = InFlightGuard {
                in_flight: set,
                name: "phantom".to_string(),
            };
            set.lock().insert("phantom".to_string());
            assert!(set.lock().contains("phantom"));
        }
        assert!(set.lock().is_empty());
    }

    #[test]
    fn test_attempt_rejects_invalid_transition() {
        let orchestrator = orchestrator(HandshakeServices::default());
        let mut attempt = Attempt::new(&orchestrator, "wallet");

        let err = attempt
            .advance(&HandshakeMachineInput::HandshakeSucceeded)
            .unwrap_err();
        assert!(matches!(err, HandshakeError::InvalidStateTransition(_)));
    }

    #[test]
    fn test_attempt_reports_phases() {
        let orchestrator = orchestrator(HandshakeServices::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        orchestrator.set_phase_callback(move |adapter, phase| {
            sink.lock().push((adapter.to_string(), phase));
        });

        let mut attempt = Attempt::new(&orchestrator, "wallet");
        attempt
            .advance(&HandshakeMachineInput::AdapterSelected)
            .unwrap();
        attempt
            .advance(&HandshakeMachineInput::AutoConnectStarted)
            .unwrap();

        assert_eq!(
            *seen.lock(),
            vec![
                ("wallet".to_string(), HandshakePhase::Connecting),
                ("wallet".to_string(), HandshakePhase::AwaitingAutoConnect),
            ]
        );
    }

    #[test]
    fn test_phase_callback_can_replace_itself() {
        let orchestrator = Arc::new(orchestrator(HandshakeServices::default()));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let handle = orchestrator.clone();
        let first = seen.clone();
        orchestrator.set_phase_callback(move |_adapter, phase| {
            first.lock().push(("first", phase));
            let second = first.clone();
            handle.set_phase_callback(move |_adapter, phase| {
                second.lock().push(("second", phase));
            });
        });

        let mut attempt = Attempt::new(&orchestrator, "wallet");
        attempt
            .advance(&HandshakeMachineInput::AdapterSelected)
            .unwrap();
        attempt
            .advance(&HandshakeMachineInput::AutoConnectStarted)
            .unwrap();

        assert_eq!(
            *seen.lock(),
            vec![
                ("first", HandshakePhase::Connecting),
                ("second", HandshakePhase::AwaitingAutoConnect),
            ]
        );
    }

    #[tokio::test]
    async fn test_until_cancelled_prefers_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = until_cancelled(&cancel, async { Ok::<_, HandshakeError>(1) }).await;
        assert!(matches!(result, Err(HandshakeError::Cancelled)));

        let result = until_cancelled(&CancellationToken::new(), async {
            Ok::<_, HandshakeError>(1)
        })
        .await;
        assert_eq!(result.unwrap(), 1);
    }
}
