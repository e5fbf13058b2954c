//! Process-wide session state cell.

use crate::types::SessionState;
use tokio::sync::watch;

/// Read/write access to the session state.
///
/// Writes replace the whole value; readers never observe a partial update.
pub trait SessionStore: Send + Sync {
    fn read(&self) -> SessionState;
    fn write(&self, state: SessionState);
}

/// Session cell backed by a `tokio::sync::watch` channel.
pub struct WatchSessionStore {
    tx: watch::Sender<SessionState>,
}

impl WatchSessionStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionState::Unauthenticated);
        Self { tx }
    }

    /// Receiver notified on every write.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }
}

impl Default for WatchSessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for WatchSessionStore {
    fn read(&self) -> SessionState {
        self.tx.borrow().clone()
    }

    fn write(&self, state: SessionState) {
        self.tx.send_replace(state);
    }
}
