//! Signing adapter gateway.
//!
//! Uniform wrapper over a wallet agent's auto-connect, disconnect and sign-in
//! operations. Panics raised inside the agent are converted into
//! `WalletError::Panicked` so a misbehaving wallet can never unwind through
//! the handshake.

use crate::adapter::{AdapterCapability, AdapterHandle};
use crate::error::{HandshakeResult, WalletError};
use crate::types::{
    SignInChallenge, SignatureMaterial, SignedAccount, SignedResponse, WalletSignInOutput,
};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tracing::debug;

/// Gateway over one adapter, borrowed for the duration of an attempt.
pub struct SigningGateway<'a> {
    adapter: &'a AdapterHandle,
}

impl<'a> SigningGateway<'a> {
    pub fn new(adapter: &'a AdapterHandle) -> Self {
        Self { adapter }
    }

    pub fn adapter(&self) -> &'a AdapterHandle {
        self.adapter
    }

    pub fn supports_sign_in(&self) -> bool {
        self.adapter.capability() == AdapterCapability::ConnectAndSignIn
    }

    /// Whether the agent reports a live connection. A panicking agent counts
    /// as connected so teardown still tries to disconnect it.
    pub fn is_connected(&self) -> bool {
        std::panic::catch_unwind(AssertUnwindSafe(|| self.adapter.is_connected())).unwrap_or(true)
    }

    /// Attempt a silent reconnect. Failure is expected when no trusted
    /// session exists.
    pub async fn auto_connect(&self) -> Result<(), WalletError> {
        let adapter = self.adapter;
        guarded(|| match adapter {
            AdapterHandle::ConnectOnly(agent) => agent.auto_connect(),
            AdapterHandle::ConnectAndSignIn(agent) => agent.auto_connect(),
        })
        .await
    }

    pub async fn disconnect(&self) -> Result<(), WalletError> {
        let adapter = self.adapter;
        guarded(|| match adapter {
            AdapterHandle::ConnectOnly(agent) => agent.disconnect(),
            AdapterHandle::ConnectAndSignIn(agent) => agent.disconnect(),
        })
        .await
    }

    /// Ask the wallet to sign the challenge and narrow its answer to the
    /// canonical response shape.
    pub async fn sign_challenge(&self, challenge: &SignInChallenge) -> HandshakeResult<SignedResponse> {
        let AdapterHandle::ConnectAndSignIn(agent) = self.adapter else {
            return Err(WalletError::Unsupported.into());
        };

        let input = challenge.clone();
        let output = guarded(|| agent.sign_in(input)).await?;
        Ok(narrow_sign_in_output(output)?)
    }
}

/// Copy the allow-listed fields of a raw wallet result into a `SignedResponse`.
///
/// Anything else the wallet attached is dropped.
pub fn narrow_sign_in_output(output: WalletSignInOutput) -> Result<SignedResponse, WalletError> {
    let WalletSignInOutput {
        account,
        signed_message,
        signature,
        signature_type,
        extra,
    } = output;

    if account.address.trim().is_empty() {
        return Err(WalletError::MalformedResponse(
            "account address is empty".to_string(),
        ));
    }
    if account.public_key.is_empty() {
        return Err(WalletError::MalformedResponse(
            "account public key is empty".to_string(),
        ));
    }
    if signature.is_empty() || signed_message.is_empty() {
        return Err(WalletError::MalformedResponse(
            "signature or signed message is empty".to_string(),
        ));
    }

    let dropped = extra.len() + account.extra.len();
    if dropped > 0 {
        debug!(dropped_fields = dropped, "Dropping non-standard sign-in output fields");
    }

    Ok(SignedResponse {
        account: SignedAccount {
            address: account.address,
            public_key: account.public_key,
            chains: account.chains.into_iter().collect(),
            features: account.features.into_iter().collect(),
            label: account.label,
            icon: account.icon,
        },
        signature_material: SignatureMaterial {
            signed_message,
            signature,
            signature_type,
        },
    })
}

/// Run a wallet call, turning a panic (while building or polling the future)
/// into an error.
async fn guarded<'f, T, F>(start: F) -> Result<T, WalletError>
where
    F: FnOnce() -> BoxFuture<'f, Result<T, WalletError>>,
{
    let future = std::panic::catch_unwind(AssertUnwindSafe(start))
        .map_err(|payload| WalletError::Panicked(panic_message(payload.as_ref())))?;

    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(WalletError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
