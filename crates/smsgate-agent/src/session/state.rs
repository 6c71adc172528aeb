//! Session state types.

use std::sync::atomic::{AtomicU32, Ordering};

/// State of the agent session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session has been started.
    Idle,
    /// Attempting to open the transport.
    Connecting,
    /// Transport is open, waiting for tasks.
    Open,
    /// Connection lost, a reconnect is scheduled.
    Reconnecting,
    /// Stop requested, waiting for the transport to close.
    Stopping,
    /// Terminal. A fresh start creates a new session.
    Stopped,
}

impl SessionState {
    /// Whether this state admits no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped)
    }
}

/// Atomic wrapper for session state, shared between the session task
/// and callers polling the controller.
#[derive(Debug)]
pub struct AtomicSessionState(AtomicU32);

impl AtomicSessionState {
    /// Create a new atomic state.
    #[must_use]
    pub const fn new(state: SessionState) -> Self {
        Self(AtomicU32::new(state as u32))
    }

    /// Load the current state.
    #[must_use]
    pub fn load(&self) -> SessionState {
        match self.0.load(Ordering::SeqCst) {
            0 => SessionState::Idle,
            1 => SessionState::Connecting,
            2 => SessionState::Open,
            3 => SessionState::Reconnecting,
            4 => SessionState::Stopping,
            _ => SessionState::Stopped,
        }
    }

    /// Store a new state.
    pub fn store(&self, state: SessionState) {
        self.0.store(state as u32, Ordering::SeqCst);
    }
}
