//! Handshake error types.

use serde::Serialize;
use thiserror::Error;

/// Failure reported by a wallet agent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    /// The wallet is not installed, locked, or has no trusted session to resume.
    #[error("Wallet not ready")]
    NotReady,

    /// The user dismissed or rejected the request in the wallet UI.
    #[error("User rejected the request")]
    UserRejected,

    /// The wallet did not answer in time.
    #[error("Wallet request timed out")]
    Timeout,

    /// Connecting to the wallet failed.
    #[error("Wallet connection failed: {0}")]
    Connection(String),

    /// Disconnecting from the wallet failed.
    #[error("Wallet disconnection failed: {0}")]
    Disconnection(String),

    /// The wallet reported a sign-in failure.
    #[error("Wallet sign-in failed: {0}")]
    SignIn(String),

    /// The wallet returned something that is not a usable sign-in result.
    #[error("Malformed wallet response: {0}")]
    MalformedResponse(String),

    /// The adapter has no sign-in capability.
    #[error("Wallet does not support sign-in")]
    Unsupported,

    /// The wallet agent panicked instead of returning an error.
    #[error("Wallet agent panicked: {0}")]
    Panicked(String),
}

impl WalletError {
    /// Stable error name, used as a notification title.
    pub fn name(&self) -> &'static str {
        match self {
            WalletError::NotReady => "WalletNotReadyError",
            WalletError::UserRejected => "WalletSignInRejectedError",
            WalletError::Timeout => "WalletTimeoutError",
            WalletError::Connection(_) => "WalletConnectionError",
            WalletError::Disconnection(_) => "WalletDisconnectionError",
            WalletError::SignIn(_) => "WalletSignInError",
            WalletError::MalformedResponse(_) => "WalletMalformedResponseError",
            WalletError::Unsupported => "WalletNotSupportedError",
            WalletError::Panicked(_) => "WalletPanicError",
        }
    }
}

/// Transport failure talking to a sign-in or session backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-success status
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Response parsed but is missing required data
    #[error("Malformed backend response: {0}")]
    Malformed(String),
}

impl BackendError {
    /// Returns true if this error is transient and the request could be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                e.status().is_some_and(|status| status.is_server_error())
            }
            BackendError::Status { status, .. } => (500..600).contains(status),
            _ => false,
        }
    }
}

/// Result type alias using BackendError.
pub type BackendResult<T> = Result<T, BackendError>;

/// Classification of handshake failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    PreconditionUnmet,
    ChallengeUnavailable,
    SigningFailed,
    VerificationUnavailable,
    Rejected,
    ExchangeFailed,
    AttemptInFlight,
    InvalidStateTransition,
}

/// Handshake error type.
#[derive(Error, Debug)]
pub enum HandshakeError {
    /// Backend not configured or adapter unable to sign in; nothing was attempted.
    #[error("Sign-in unavailable: {0}")]
    PreconditionUnmet(String),

    /// The challenge could not be obtained.
    #[error("Could not obtain sign-in challenge: {0}")]
    ChallengeUnavailable(#[source] BackendError),

    /// The wallet did not produce a usable signature.
    #[error("Signing failed: {cause}")]
    SigningFailed { cause: WalletError },

    /// The verification backend could not be reached.
    #[error("Could not verify signature: {0}")]
    VerificationUnavailable(#[source] BackendError),

    /// The verification backend denied the proof.
    #[error("Sign-in rejected: {reason}")]
    Rejected { reason: String },

    /// The exchange artifact could not be turned into a session.
    #[error("Session exchange failed: {0}")]
    ExchangeFailed(#[source] BackendError),

    /// Another attempt is already running for this adapter.
    #[error("A sign-in attempt is already in progress for {0}")]
    AttemptInFlight(String),

    /// Invalid state transition in the handshake FSM
    #[error("Invalid handshake state transition: {0}")]
    InvalidStateTransition(String),

    /// The caller abandoned the attempt. Never surfaced from `connect`.
    #[error("Handshake cancelled")]
    Cancelled,
}

impl HandshakeError {
    /// Classification of this error. `None` for cancellation.
    pub fn kind(&self) -> Option<ErrorKind> {
        let kind = match self {
            HandshakeError::PreconditionUnmet(_) => ErrorKind::PreconditionUnmet,
            HandshakeError::ChallengeUnavailable(_) => ErrorKind::ChallengeUnavailable,
            HandshakeError::SigningFailed { .. } => ErrorKind::SigningFailed,
            HandshakeError::VerificationUnavailable(_) => ErrorKind::VerificationUnavailable,
            HandshakeError::Rejected { .. } => ErrorKind::Rejected,
            HandshakeError::ExchangeFailed(_) => ErrorKind::ExchangeFailed,
            HandshakeError::AttemptInFlight(_) => ErrorKind::AttemptInFlight,
            HandshakeError::InvalidStateTransition(_) => ErrorKind::InvalidStateTransition,
            HandshakeError::Cancelled => return None,
        };
        Some(kind)
    }

    /// Human-readable heading for user-visible reporting.
    pub fn title(&self) -> &'static str {
        match self {
            HandshakeError::PreconditionUnmet(_) => "Sign-in unavailable",
            HandshakeError::ChallengeUnavailable(_) => "Sign-in challenge unavailable",
            HandshakeError::SigningFailed { cause } => cause.name(),
            HandshakeError::VerificationUnavailable(_) => "Verification unavailable",
            HandshakeError::Rejected { .. } => "Sign-in rejected",
            HandshakeError::ExchangeFailed(_) => "Session exchange failed",
            HandshakeError::AttemptInFlight(_) => "Sign-in in progress",
            HandshakeError::InvalidStateTransition(_) => "Sign-in failed",
            HandshakeError::Cancelled => "Sign-in cancelled",
        }
    }
}

impl From<WalletError> for HandshakeError {
    fn from(cause: WalletError) -> Self {
        HandshakeError::SigningFailed { cause }
    }
}

/// Result type alias using HandshakeError.
pub type HandshakeResult<T> = Result<T, HandshakeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_5xx_is_transient() {
        let err = BackendError::Status {
            status: 503,
            body: "unavailable".to_string(),
        };
        assert!(err.is_transient());
    }

    #[test]
    fn test_status_4xx_is_not_transient() {
        let err = BackendError::Status {
            status: 429,
            body: "slow down".to_string(),
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn test_malformed_is_not_transient() {
        assert!(!BackendError::Malformed("missing token".to_string()).is_transient());
    }

    #[test]
    fn test_wallet_error_converts_to_signing_failed() {
        let err: HandshakeError = WalletError::UserRejected.into();
        assert_eq!(err.kind(), Some(ErrorKind::SigningFailed));
        assert_eq!(err.title(), "WalletSignInRejectedError");
        assert_eq!(err.to_string(), "Signing failed: User rejected the request");
    }

    #[test]
    fn test_error_kinds() {
        let malformed = || BackendError::Malformed("x".to_string());
        assert_eq!(
            HandshakeError::PreconditionUnmet("no backend".to_string()).kind(),
            Some(ErrorKind::PreconditionUnmet)
        );
        assert_eq!(
            HandshakeError::ChallengeUnavailable(malformed()).kind(),
            Some(ErrorKind::ChallengeUnavailable)
        );
        assert_eq!(
            HandshakeError::VerificationUnavailable(malformed()).kind(),
            Some(ErrorKind::VerificationUnavailable)
        );
        assert_eq!(
            HandshakeError::Rejected {
                reason: "bad signature".to_string()
            }
            .kind(),
            Some(ErrorKind::Rejected)
        );
        assert_eq!(
            HandshakeError::ExchangeFailed(malformed()).kind(),
            Some(ErrorKind::ExchangeFailed)
        );
        assert_eq!(HandshakeError::Cancelled.kind(), None);
    }

    #[test]
    fn test_rejected_display_includes_reason() {
        let err = HandshakeError::Rejected {
            reason: "bad signature".to_string(),
        };
        assert_eq!(err.to_string(), "Sign-in rejected: bad signature");
    }
}
