//! Wallet agent seams and the capability-tagged adapter handle.

use crate::error::WalletError;
use crate::types::{SignInChallenge, WalletSignInOutput};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// A wallet agent that can connect and disconnect.
#[async_trait]
pub trait WalletAgent: Send + Sync {
    /// Adapter name; also identifies the adapter for in-flight tracking.
    fn name(&self) -> &str;

    /// Whether the agent currently holds a connection.
    fn is_connected(&self) -> bool;

    /// Silently reconnect to a previously trusted wallet.
    async fn auto_connect(&self) -> Result<(), WalletError>;

    async fn disconnect(&self) -> Result<(), WalletError>;
}

/// A wallet agent that can also sign a sign-in challenge.
#[async_trait]
pub trait SignInWallet: WalletAgent {
    async fn sign_in(&self, input: SignInChallenge) -> Result<WalletSignInOutput, WalletError>;
}

/// Whether an adapter can take part in the challenge/sign/verify path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterCapability {
    ConnectOnly,
    ConnectAndSignIn,
}

/// Reference to a wallet agent, tagged with its capability at selection time.
#[derive(Clone)]
pub enum AdapterHandle {
    ConnectOnly(Arc<dyn WalletAgent>),
    ConnectAndSignIn(Arc<dyn SignInWallet>),
}

impl AdapterHandle {
    pub fn connect_only(agent: impl WalletAgent + 'static) -> Self {
        AdapterHandle::ConnectOnly(Arc::new(agent))
    }

    pub fn with_sign_in(agent: impl SignInWallet + 'static) -> Self {
        AdapterHandle::ConnectAndSignIn(Arc::new(agent))
    }

    pub fn capability(&self) -> AdapterCapability {
        match self {
            AdapterHandle::ConnectOnly(_) => AdapterCapability::ConnectOnly,
            AdapterHandle::ConnectAndSignIn(_) => AdapterCapability::ConnectAndSignIn,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            AdapterHandle::ConnectOnly(agent) => agent.name(),
            AdapterHandle::ConnectAndSignIn(agent) => agent.name(),
        }
    }

    pub fn is_connected(&self) -> bool {
        match self {
            AdapterHandle::ConnectOnly(agent) => agent.is_connected(),
            AdapterHandle::ConnectAndSignIn(agent) => agent.is_connected(),
        }
    }
}

impl fmt::Debug for AdapterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterHandle")
            .field("name", &self.name())
            .field("capability", &self.capability())
            .finish()
    }
}
