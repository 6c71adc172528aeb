//! Error types for smsgate-agent.

use thiserror::Error;

/// Errors that can occur in agent operations.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Endpoint URL is malformed or uses an unsupported scheme.
    #[error("invalid endpoint '{0}': expected a ws:// or wss:// URL")]
    InvalidEndpoint(String),

    /// Configuration error. Transport and protocol failures never
    /// reach this type; the session handles them internally and they
    /// surface only as log and status events.
    #[error("configuration error: {0}")]
    Config(String),
}
