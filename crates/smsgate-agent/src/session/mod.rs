//! Session and connection management.
//!
//! Owns the WebSocket transport handle, drives the session state
//! machine and schedules reconnection with increasing backoff. All
//! transport callbacks, the reconnect timer and controller commands
//! are folded into one event mailbox consumed by a single task, so
//! session state is never mutated concurrently.

mod backoff;
mod driver;
mod events;
mod state;

pub use backoff::BackoffConfig;
pub use events::{LogEvent, StatusSignal, TransportEvent};
pub use state::{AtomicSessionState, SessionState};

pub(crate) use driver::SessionDriver;
pub(crate) use events::SessionEvent;
