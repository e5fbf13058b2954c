//! Data exchanged between the wallet agent, the backends and the session cell.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Serde adapter encoding byte fields as standard base64 strings.
mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// Sign-in challenge issued by the backend.
///
/// Carries the wallet-standard sign-in input fields. Anything else the backend
/// sends is kept in `extra` so the challenge can be handed back to `verify`
/// exactly as it was issued.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInChallenge {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SignInChallenge {
    /// Challenge carrying only a nonce.
    pub fn with_nonce(nonce: impl Into<String>) -> Self {
        Self {
            nonce: Some(nonce.into()),
            ..Default::default()
        }
    }
}

/// Account section of a wallet's raw sign-in result.
///
/// Wallet agents are free to attach fields beyond the standard ones; those
/// land in `extra` and are never forwarded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletAccount {
    pub address: String,
    #[serde(with = "base64_bytes")]
    pub public_key: Vec<u8>,
    #[serde(default)]
    pub chains: Vec<String>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Raw sign-in result as returned by a wallet agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletSignInOutput {
    pub account: WalletAccount,
    #[serde(with = "base64_bytes")]
    pub signed_message: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub signature: Vec<u8>,
    #[serde(default)]
    pub signature_type: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Canonical account shape forwarded to the verification backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedAccount {
    pub address: String,
    #[serde(with = "base64_bytes")]
    pub public_key: Vec<u8>,
    pub chains: BTreeSet<String>,
    pub features: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// The signed bytes and the signature over them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureMaterial {
    #[serde(with = "base64_bytes")]
    pub signed_message: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub signature: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature_type: Option<String>,
}

/// Signed response produced by the signing gateway.
///
/// Serializes flat (`account`, `signedMessage`, `signature`, `signatureType`),
/// the shape sign-in verification backends expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedResponse {
    pub account: SignedAccount,
    #[serde(flatten)]
    pub signature_material: SignatureMaterial,
}

/// Outcome of verifying a signed challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationVerdict {
    /// Signature covers the issued challenge; the artifact is redeemable once.
    Verified { exchange_artifact: String },
    /// The backend denied the proof.
    Rejected { reason: String },
}

/// Live application session credential.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCredential {
    pub id_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredential")
            .field("id_token", &"[redacted]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[redacted]"),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl SessionCredential {
    /// Returns true once the credential is past its expiry.
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// The signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub user_id: String,
    pub wallet_address: String,
}

/// Process-wide session state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Unauthenticated,
    Authenticated {
        user: UserIdentity,
        credential: SessionCredential,
    },
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated { .. })
    }

    pub fn user(&self) -> Option<&UserIdentity> {
        match self {
            SessionState::Authenticated { user, .. } => Some(user),
            SessionState::Unauthenticated => None,
        }
    }

    pub fn credential(&self) -> Option<&SessionCredential> {
        match self {
            SessionState::Authenticated { credential, .. } => Some(credential),
            SessionState::Unauthenticated => None,
        }
    }
}
