//! Observable connection state, safe under concurrent access.

use std::sync::{Arc, RwLock};

/// The finite states of a stream client's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection attempt in progress.
    Disconnected,
    /// A dial is in flight.
    Connecting,
    /// The connection is established and the read loop is running.
    Connected,
    /// The prior connection ended recoverably; waiting to redial.
    Reconnecting,
    /// `maxReconnectAttempts` consecutive dials have failed.
    Failed,
}

#[derive(Debug)]
pub(crate) struct Observed {
    pub(crate) state: ConnectionState,
    pub(crate) attempts: u32,
    pub(crate) last_error: Option<String>,
}

impl Default for Observed {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            attempts: 0,
            last_error: None,
        }
    }
}

/// A cheap-to-clone handle onto a stream client's observable state.
#[derive(Clone)]
pub struct StreamClientHandle {
    pub(crate) inner: Arc<RwLock<Observed>>,
}

impl StreamClientHandle {
    /// The current connection state.
    pub fn state(&self) -> ConnectionState {
        self.inner.read().expect("stream client state lock poisoned").state
    }

    /// The number of consecutive failed dials since the last successful
    /// connection.
    pub fn attempts(&self) -> u32 {
        self.inner.read().expect("stream client state lock poisoned").attempts
    }

    /// The text of the most recent error, if any.
    pub fn last_error(&self) -> Option<String> {
        self.inner.read().expect("stream client state lock poisoned").last_error.clone()
    }
}
