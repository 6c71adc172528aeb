//! Session event types.

use chrono::{DateTime, Utc};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// The WebSocket transport the session drives.
pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Transport lifecycle callbacks, folded into one enum so all
/// transition logic lives in the session's single event handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Text message received from the server.
    Message(String),
    /// Connect error or I/O failure.
    Failed {
        /// Failure description.
        reason: String,
    },
    /// Transport closed.
    Closed {
        /// Close code, if the peer sent one.
        code: Option<u16>,
        /// Close reason.
        reason: String,
    },
}

/// Everything the session task reacts to.
#[derive(Debug)]
pub(crate) enum SessionEvent {
    /// A transport callback.
    Transport(TransportEvent),
    /// The spawned connect attempt finished.
    ConnectFinished(Result<Box<WsStream>, String>),
    /// The pending reconnect timer fired.
    ReconnectFired,
    /// The controller requested a graceful stop.
    Stop,
}

/// Connectivity signal emitted to the collaborator layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusSignal {
    /// Opening the transport.
    Connecting,
    /// Transport open, session is live.
    Connected,
    /// Connection lost, reconnect scheduled.
    Reconnecting,
    /// Terminal: the session has fully stopped.
    Stopped,
}

/// A log line emitted outward. The core keeps no history; whoever
/// displays or persists these owns any retention policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    /// When the event was emitted.
    pub timestamp: DateTime<Utc>,
    /// Human-readable description.
    pub text: String,
}

impl LogEvent {
    /// Create a log event stamped with the current time.
    #[must_use]
    pub fn now(text: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            text: text.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_event_variants() {
        let failed = TransportEvent::Failed {
            reason: "connection reset".to_string(),
        };
        if let TransportEvent::Failed { reason } = failed {
            assert_eq!(reason, "connection reset");
        } else {
            panic!("expected Failed");
        }

        let closed = TransportEvent::Closed {
            code: Some(1000),
            reason: "normal closure".to_string(),
        };
        if let TransportEvent::Closed { code, reason } = closed {
            assert_eq!(code, Some(1000));
            assert_eq!(reason, "normal closure");
        } else {
            panic!("expected Closed");
        }
    }

    #[test]
    fn test_log_event_now() {
        let before = Utc::now();
        let event = LogEvent::now("connection open");
        let after = Utc::now();

        assert_eq!(event.text, "connection open");
        assert!(event.timestamp >= before);
        assert!(event.timestamp <= after);
    }
}
