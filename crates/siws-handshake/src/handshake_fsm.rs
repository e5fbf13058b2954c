//! Handshake state machine using rust-fsm.
//!
//! ## State Diagram
//!
//! ```text
//! ┌─────────────────┐
//! │      Idle       │ (initial) ◄──────────────────────────────┐
//! └────────┬────────┘                                          │
//!          │ AdapterSelected                                   │
//!          ▼                                                   │
//! ┌─────────────────┐  SignInRequested                         │
//! │   Connecting    │ ──────────────────────┐                  │
//! └────────┬────────┘                       │                  │
//!          │ AutoConnectStarted             │                  │
//!          ▼                                ▼                  │
//! ┌─────────────────────┐ HandshakeRequired ┌─────────────┐    │
//! │ AwaitingAutoConnect │ ────────────────► │ Handshaking │    │
//! └─────────┬───────────┘                   └──────┬──────┘    │
//!           │ AutoConnected    SignInUnavailable/  │           │
//!           ▼                  Abandoned ──────────┼───────────┤
//!      Connected                                   │           │
//!                         HandshakeSucceeded       │ HandshakeFailed
//!                        ┌─────────────────────────┤           │
//!                        ▼                         ▼           │
//!                  Authenticated              ┌────────┐       │
//!                                             │ Failed │ ──────┘
//!                                             └────────┘ CleanupComplete
//! ```
//!
//! `Connected` and `Authenticated` end the attempt. `PreconditionUnmet` and
//! `Abandoned` leave `Handshaking` for `Idle` without running cleanup.

use crate::adapter::AdapterCapability;
use crate::error::WalletError;
use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub handshake_machine(Idle)

    Idle => {
        AdapterSelected => Connecting
    },
    Connecting => {
        AutoConnectStarted => AwaitingAutoConnect,
        // User-initiated sign-in skips the silent reconnect
        SignInRequested => Handshaking
    },
    AwaitingAutoConnect => {
        AutoConnected => Connected,
        HandshakeRequired => Handshaking,
        // Connect-only adapter with no trusted session: nothing to do
        SignInUnavailable => Idle,
        Abandoned => Idle
    },
    Handshaking => {
        HandshakeSucceeded => Authenticated,
        HandshakeFailed => Failed,
        // Backend not configured; nothing was started so nothing to clean
        PreconditionUnmet => Idle,
        Abandoned => Idle
    },
    Failed => {
        CleanupComplete => Idle
    }
}

pub use handshake_machine::Input as HandshakeMachineInput;
pub use handshake_machine::State as HandshakeMachineState;
pub use handshake_machine::StateMachine as HandshakeMachine;

/// Handshake phase for external consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandshakePhase {
    Idle,
    Connecting,
    AwaitingAutoConnect,
    /// Transport-level connection only; no backend session.
    Connected,
    Handshaking,
    Authenticated,
    Failed,
}

impl HandshakePhase {
    /// Returns true if the attempt has ended in this phase.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            HandshakePhase::Idle | HandshakePhase::Connected | HandshakePhase::Authenticated
        )
    }
}

impl From<&HandshakeMachineState> for HandshakePhase {
    fn from(state: &HandshakeMachineState) -> Self {
        match state {
            HandshakeMachineState::Idle => HandshakePhase::Idle,
            HandshakeMachineState::Connecting => HandshakePhase::Connecting,
            HandshakeMachineState::AwaitingAutoConnect => HandshakePhase::AwaitingAutoConnect,
            HandshakeMachineState::Connected => HandshakePhase::Connected,
            HandshakeMachineState::Handshaking => HandshakePhase::Handshaking,
            HandshakeMachineState::Authenticated => HandshakePhase::Authenticated,
            HandshakeMachineState::Failed => HandshakePhase::Failed,
        }
    }
}

/// Knobs for the post-auto-connect decision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandshakePolicy {
    /// Run the challenge/sign/verify path even after a successful silent
    /// reconnect when no backend session exists.
    pub sign_in_after_reconnect: bool,
}

/// Decide what follows an auto-connect attempt.
///
/// Auto-connect failure never ends the attempt as a failure: adapters that
/// can sign in escalate to the interactive handshake, connect-only adapters
/// simply go back to idle.
pub fn after_auto_connect(
    result: &Result<(), WalletError>,
    capability: AdapterCapability,
    has_session: bool,
    policy: &HandshakePolicy,
) -> HandshakeMachineInput {
    let can_sign_in = capability == AdapterCapability::ConnectAndSignIn;
    match result {
        Err(_) if can_sign_in => HandshakeMachineInput::HandshakeRequired,
        Err(_) => HandshakeMachineInput::SignInUnavailable,
        Ok(()) if can_sign_in && !has_session && policy.sign_in_after_reconnect => {
            HandshakeMachineInput::HandshakeRequired
        }
        Ok(()) => HandshakeMachineInput::AutoConnected,
    }
}
