//! Wallet sign-in handshake.
//!
//! This crate provides:
//! - A capability-tagged adapter over wallet agents, with a panic-safe signing gateway
//! - Challenge and verification clients over a pluggable sign-in backend
//! - A session exchanger publishing to a process-wide session cell
//! - An FSM-driven orchestrator tying connect, sign, verify and exchange together
//! - HTTP implementations of the sign-in and session backends

mod adapter;
mod backend;
mod challenge;
mod error;
mod exchange;
mod gateway;
mod handshake_fsm;
mod notify;
mod orchestrator;
mod session_backend;
mod session_store;
mod types;
mod verification;

pub use adapter::{AdapterCapability, AdapterHandle, SignInWallet, WalletAgent};
pub use backend::{HttpSignInBackend, SignInBackend};
pub use challenge::ChallengeClient;
pub use error::{
    BackendError, BackendResult, ErrorKind, HandshakeError, HandshakeResult, WalletError,
};
pub use exchange::SessionExchanger;
pub use gateway::{narrow_sign_in_output, SigningGateway};
pub use handshake_fsm::handshake_machine;
pub use handshake_fsm::{
    after_auto_connect, HandshakeMachine, HandshakeMachineInput, HandshakeMachineState,
    HandshakePhase, HandshakePolicy,
};
pub use notify::{Notification, NotificationKind, NotificationSink, TracingNotifier};
pub use orchestrator::{ConnectOutcome, HandshakeOrchestrator, HandshakeServices, PhaseCallback};
pub use session_backend::{jwt_subject, ExchangedSession, HttpSessionBackend, SessionBackend};
pub use session_store::{SessionStore, WatchSessionStore};
pub use types::{
    SessionCredential, SessionState, SignInChallenge, SignatureMaterial, SignedAccount,
    SignedResponse, UserIdentity, VerificationVerdict, WalletAccount, WalletSignInOutput,
};
pub use verification::VerificationClient;

pub use tokio_util::sync::CancellationToken;
