//! # smsgate-proto
//!
//! Protocol definitions for smsgate agent-server communication.
//!
//! The protocol is text-based JSON over a message-oriented transport.
//! The server pushes task envelopes to the agent; the agent answers
//! with best-effort status updates.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod messages;

pub use error::ProtoError;
pub use messages::{ClientMessage, ServerEnvelope, Task, TaskStatus};
