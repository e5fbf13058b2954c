#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use siws_handshake::{
    AdapterHandle, BackendError, BackendResult, CancellationToken, ExchangedSession,
    HandshakeOrchestrator, HandshakePhase, HandshakePolicy, HandshakeServices, Notification,
    NotificationSink, SessionBackend, SessionCredential, SessionState, SessionStore,
    SignInBackend, SignInChallenge, SignInWallet, SignedResponse, VerificationVerdict,
    WalletAccount, WalletAgent, WalletError, WalletSignInOutput, WatchSessionStore,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{watch, Notify};

pub const WALLET_ADDRESS: &str = "FakeWa11etAddress1111111111111111111111111";

// ---------------------------------------------------------------------------
// Wallet
// ---------------------------------------------------------------------------

/// What `auto_connect` does.
#[derive(Debug, Clone, Copy)]
pub enum AutoConnect {
    Succeed,
    Fail,
    Panic,
}

/// What `sign_in` does.
#[derive(Debug, Clone, Copy)]
pub enum Signing {
    Sign,
    Reject,
    Panic,
    /// Never returns; used to hold an attempt open.
    Hang,
}

/// What `disconnect` does.
#[derive(Debug, Clone, Copy)]
pub enum Disconnect {
    Succeed,
    /// Reports an error and stays connected.
    Fail,
    Panic,
}

/// Calls observed by a `FakeWallet`, shared with the test after the wallet is
/// moved into an `AdapterHandle`.
#[derive(Default)]
pub struct WalletCalls {
    pub auto_connect: AtomicUsize,
    pub sign_in: AtomicUsize,
    pub disconnect: AtomicUsize,
    pub connected: AtomicBool,
    pub sign_inputs: Mutex<Vec<SignInChallenge>>,
    /// Notified once the wallet has been asked to sign.
    pub sign_started: Notify,
}

impl WalletCalls {
    pub fn auto_connects(&self) -> usize {
        self.auto_connect.load(Ordering::SeqCst)
    }

    pub fn sign_ins(&self) -> usize {
        self.sign_in.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnect.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

pub struct FakeWallet {
    name: String,
    auto_connect: AutoConnect,
    signing: Signing,
    disconnect: Disconnect,
    calls: Arc<WalletCalls>,
}

impl FakeWallet {
    pub fn new(name: &str, auto_connect: AutoConnect, signing: Signing) -> Self {
        Self {
            name: name.to_string(),
            auto_connect,
            signing,
            disconnect: Disconnect::Succeed,
            calls: Arc::new(WalletCalls::default()),
        }
    }

    pub fn with_disconnect(mut self, disconnect: Disconnect) -> Self {
        self.disconnect = disconnect;
        self
    }

    pub fn calls(&self) -> Arc<WalletCalls> {
        self.calls.clone()
    }
}

#[async_trait]
impl WalletAgent for FakeWallet {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_connected(&self) -> bool {
        self.calls.is_connected()
    }

    async fn auto_connect(&self) -> Result<(), WalletError> {
        self.calls.auto_connect.fetch_add(1, Ordering::SeqCst);
        match self.auto_connect {
            AutoConnect::Succeed => {
                self.calls.connected.store(true, Ordering::SeqCst);
                Ok(())
            }
            AutoConnect::Fail => Err(WalletError::NotReady),
            AutoConnect::Panic => panic!("auto-connect blew up"),
        }
    }

    async fn disconnect(&self) -> Result<(), WalletError> {
        self.calls.disconnect.fetch_add(1, Ordering::SeqCst);
        match self.disconnect {
            Disconnect::Succeed => {
                self.calls.connected.store(false, Ordering::SeqCst);
                Ok(())
            }
            Disconnect::Fail => Err(WalletError::Disconnection("extension closed".to_string())),
            Disconnect::Panic => panic!("disconnect blew up"),
        }
    }
}

#[async_trait]
impl SignInWallet for FakeWallet {
    async fn sign_in(&self, input: SignInChallenge) -> Result<WalletSignInOutput, WalletError> {
        self.calls.sign_in.fetch_add(1, Ordering::SeqCst);
        self.calls.sign_inputs.lock().unwrap().push(input.clone());
        self.calls.sign_started.notify_one();

        match self.signing {
            Signing::Sign => {
                // Signing connects the wallet, as real agents do.
                self.calls.connected.store(true, Ordering::SeqCst);
                Ok(signed_output(&input))
            }
            Signing::Reject => Err(WalletError::UserRejected),
            Signing::Panic => panic!("sign-in blew up"),
            Signing::Hang => std::future::pending().await,
        }
    }
}

/// A raw wallet result for `input`, including non-standard fields.
pub fn signed_output(input: &SignInChallenge) -> WalletSignInOutput {
    let mut account_extra = serde_json::Map::new();
    account_extra.insert("walletInternalId".to_string(), json!("abc-internal"));
    let mut extra = serde_json::Map::new();
    extra.insert("telemetry".to_string(), json!({"latencyMs": 12}));

    WalletSignInOutput {
        account: WalletAccount {
            address: WALLET_ADDRESS.to_string(),
            public_key: vec![7; 32],
            chains: vec!["solana:mainnet".to_string()],
            features: vec!["solana:signIn".to_string(), "solana:signMessage".to_string()],
            label: Some("Fake".to_string()),
            icon: None,
            extra: account_extra,
        },
        signed_message: format!("nonce:{}", input.nonce.as_deref().unwrap_or_default())
            .into_bytes(),
        signature: vec![9; 64],
        signature_type: Some("ed25519".to_string()),
        extra,
    }
}

pub fn sign_in_adapter(auto_connect: AutoConnect, signing: Signing) -> (AdapterHandle, Arc<WalletCalls>) {
    let wallet = FakeWallet::new("Phantom", auto_connect, signing);
    let calls = wallet.calls();
    (AdapterHandle::with_sign_in(wallet), calls)
}

/// Sign-in adapter whose `disconnect` behaves as `disconnect`.
pub fn sign_in_adapter_with_disconnect(
    auto_connect: AutoConnect,
    signing: Signing,
    disconnect: Disconnect,
) -> (AdapterHandle, Arc<WalletCalls>) {
    let wallet = FakeWallet::new("Phantom", auto_connect, signing).with_disconnect(disconnect);
    let calls = wallet.calls();
    (AdapterHandle::with_sign_in(wallet), calls)
}

pub fn connect_only_adapter(auto_connect: AutoConnect) -> (AdapterHandle, Arc<WalletCalls>) {
    let wallet = FakeWallet::new("Ledger", auto_connect, Signing::Sign);
    let calls = wallet.calls();
    (AdapterHandle::connect_only(wallet), calls)
}

// ---------------------------------------------------------------------------
// Sign-in backend
// ---------------------------------------------------------------------------

pub enum ChallengeBehavior {
    Issue(SignInChallenge),
    Unreachable,
}

pub enum VerifyBehavior {
    Verdict(VerificationVerdict),
    Unreachable,
}

pub struct RecordingBackend {
    challenge: ChallengeBehavior,
    verify: VerifyBehavior,
    create_calls: AtomicUsize,
    verify_calls: Mutex<Vec<(SignInChallenge, SignedResponse)>>,
}

impl RecordingBackend {
    pub fn new(challenge: ChallengeBehavior, verify: VerifyBehavior) -> Self {
        Self {
            challenge,
            verify,
            create_calls: AtomicUsize::new(0),
            verify_calls: Mutex::new(Vec::new()),
        }
    }

    /// Issues `abc_challenge()` and verifies it as `tok123`.
    pub fn verifying() -> Self {
        Self::new(
            ChallengeBehavior::Issue(abc_challenge()),
            VerifyBehavior::Verdict(VerificationVerdict::Verified {
                exchange_artifact: "tok123".to_string(),
            }),
        )
    }

    pub fn rejecting(reason: &str) -> Self {
        Self::new(
            ChallengeBehavior::Issue(abc_challenge()),
            VerifyBehavior::Verdict(VerificationVerdict::Rejected {
                reason: reason.to_string(),
            }),
        )
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn verify_calls(&self) -> Vec<(SignInChallenge, SignedResponse)> {
        self.verify_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SignInBackend for RecordingBackend {
    async fn create_challenge(&self) -> BackendResult<SignInChallenge> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        match &self.challenge {
            ChallengeBehavior::Issue(challenge) => Ok(challenge.clone()),
            ChallengeBehavior::Unreachable => Err(unreachable_error()),
        }
    }

    async fn verify(
        &self,
        challenge: &SignInChallenge,
        response: &SignedResponse,
    ) -> BackendResult<VerificationVerdict> {
        self.verify_calls
            .lock()
            .unwrap()
            .push((challenge.clone(), response.clone()));
        match &self.verify {
            VerifyBehavior::Verdict(verdict) => Ok(verdict.clone()),
            VerifyBehavior::Unreachable => Err(unreachable_error()),
        }
    }
}

/// `{nonce: "abc"}` plus a field the handshake must hand back untouched.
pub fn abc_challenge() -> SignInChallenge {
    let mut challenge = SignInChallenge::with_nonce("abc");
    challenge
        .extra
        .insert("serverHint".to_string(), json!({"attempt": 1}));
    challenge
}

fn unreachable_error() -> BackendError {
    BackendError::Status {
        status: 503,
        body: "service unavailable".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Session backend
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub enum ExchangeBehavior {
    Succeed,
    Reject,
    /// Cancel the token while the exchange is running, then succeed.
    CancelDuring(CancellationToken),
}

pub struct FakeSessionBackend {
    behavior: Mutex<ExchangeBehavior>,
    exchanges: Mutex<Vec<String>>,
    sign_outs: AtomicUsize,
    sign_out_fails: AtomicBool,
}

impl FakeSessionBackend {
    pub fn new(behavior: ExchangeBehavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            exchanges: Mutex::new(Vec::new()),
            sign_outs: AtomicUsize::new(0),
            sign_out_fails: AtomicBool::new(false),
        }
    }

    /// Make every later `sign_out` fail after being counted.
    pub fn fail_sign_outs(&self) {
        self.sign_out_fails.store(true, Ordering::SeqCst);
    }

    pub fn set_behavior(&self, behavior: ExchangeBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn exchanges(&self) -> Vec<String> {
        self.exchanges.lock().unwrap().clone()
    }

    pub fn sign_outs(&self) -> usize {
        self.sign_outs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionBackend for FakeSessionBackend {
    async fn exchange(&self, artifact: &str) -> BackendResult<ExchangedSession> {
        self.exchanges.lock().unwrap().push(artifact.to_string());
        let behavior = self.behavior.lock().unwrap().clone();
        match behavior {
            ExchangeBehavior::Succeed => Ok(session_for(artifact)),
            ExchangeBehavior::Reject => Err(BackendError::Status {
                status: 400,
                body: "INVALID_CUSTOM_TOKEN".to_string(),
            }),
            ExchangeBehavior::CancelDuring(token) => {
                token.cancel();
                Ok(session_for(artifact))
            }
        }
    }

    async fn sign_out(&self, _credential: &SessionCredential) -> BackendResult<()> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        if self.sign_out_fails.load(Ordering::SeqCst) {
            return Err(BackendError::Status {
                status: 500,
                body: "revoke failed".to_string(),
            });
        }
        Ok(())
    }
}

fn session_for(artifact: &str) -> ExchangedSession {
    ExchangedSession {
        user_id: "user-1".to_string(),
        credential: SessionCredential {
            id_token: format!("id-for-{}", artifact),
            refresh_token: Some("refresh".to_string()),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        },
    }
}

// ---------------------------------------------------------------------------
// Store and notifier
// ---------------------------------------------------------------------------

/// Session store that records every write.
#[derive(Default)]
pub struct RecordingStore {
    inner: WatchSessionStore,
    writes: Mutex<Vec<SessionState>>,
}

impl RecordingStore {
    pub fn writes(&self) -> Vec<SessionState> {
        self.writes.lock().unwrap().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.subscribe()
    }
}

impl SessionStore for RecordingStore {
    fn read(&self) -> SessionState {
        self.inner.read()
    }

    fn write(&self, state: SessionState) {
        self.writes.lock().unwrap().push(state.clone());
        self.inner.write(state);
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    notifications: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }
}

impl NotificationSink for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.notifications.lock().unwrap().push(notification);
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub sign_in: Arc<RecordingBackend>,
    pub session: Arc<FakeSessionBackend>,
    pub store: Arc<RecordingStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub phases: Arc<Mutex<Vec<HandshakePhase>>>,
    pub orchestrator: Arc<HandshakeOrchestrator>,
}

impl Harness {
    pub fn new(sign_in: RecordingBackend, session: FakeSessionBackend) -> Self {
        Self::build(Some(sign_in), Some(session), HandshakePolicy::default())
    }

    pub fn with_policy(
        sign_in: RecordingBackend,
        session: FakeSessionBackend,
        policy: HandshakePolicy,
    ) -> Self {
        Self::build(Some(sign_in), Some(session), policy)
    }

    /// Orchestrator with no backend configured.
    pub fn unconfigured() -> Self {
        Self::build(None, None, HandshakePolicy::default())
    }

    fn build(
        sign_in: Option<RecordingBackend>,
        session: Option<FakeSessionBackend>,
        policy: HandshakePolicy,
    ) -> Self {
        let configured = sign_in.is_some();
        let sign_in = Arc::new(sign_in.unwrap_or_else(RecordingBackend::verifying));
        let session = Arc::new(session.unwrap_or_else(|| FakeSessionBackend::new(ExchangeBehavior::Succeed)));
        let store = Arc::new(RecordingStore::default());
        let notifier = Arc::new(RecordingNotifier::default());

        let services = if configured {
            HandshakeServices {
                sign_in_backend: Some(sign_in.clone() as Arc<dyn SignInBackend>),
                session_backend: Some(session.clone() as Arc<dyn SessionBackend>),
            }
        } else {
            HandshakeServices::default()
        };

        let orchestrator = HandshakeOrchestrator::new(
            services,
            store.clone() as Arc<dyn SessionStore>,
            notifier.clone() as Arc<dyn NotificationSink>,
        )
        .with_policy(policy);

        let phases = Arc::new(Mutex::new(Vec::new()));
        let sink = phases.clone();
        orchestrator.set_phase_callback(move |_adapter, phase| {
            sink.lock().unwrap().push(phase);
        });

        Self {
            sign_in,
            session,
            store,
            notifier,
            phases,
            orchestrator: Arc::new(orchestrator),
        }
    }

    pub fn phases(&self) -> Vec<HandshakePhase> {
        self.phases.lock().unwrap().clone()
    }

    pub fn clear_phases(&self) {
        self.phases.lock().unwrap().clear();
    }
}
