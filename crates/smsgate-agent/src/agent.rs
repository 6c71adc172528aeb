//! Agent controller: the composition root exposed to callers.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use url::Url;

use crate::dispatch::SmsSender;
use crate::error::AgentError;
use crate::session::{
    AtomicSessionState, BackoffConfig, LogEvent, SessionDriver, SessionEvent, SessionState,
    StatusSignal,
};

/// Channels handed to the collaborator layer on a successful start.
#[derive(Debug)]
pub struct AgentChannels {
    /// Rolling activity log. The core keeps no history; drop or
    /// persist lines as you see fit.
    pub logs: mpsc::Receiver<LogEvent>,
    /// Connectivity signals, ending with a terminal
    /// [`StatusSignal::Stopped`].
    pub status: mpsc::Receiver<StatusSignal>,
}

/// The dispatch agent. Owns at most one session; `start` wires the
/// session task to the transport, dispatcher and outward channels.
pub struct Agent<S> {
    sender: Arc<S>,
    backoff: BackoffConfig,
    ping_interval: Duration,
    state: Arc<AtomicSessionState>,
    commands: Mutex<Option<mpsc::UnboundedSender<SessionEvent>>>,
}

impl<S: SmsSender> Agent<S> {
    /// Create an agent around a send capability.
    #[must_use]
    pub fn new(sender: S) -> Self {
        Self {
            sender: Arc::new(sender),
            backoff: BackoffConfig::default(),
            ping_interval: Duration::from_secs(20),
            state: Arc::new(AtomicSessionState::new(SessionState::Idle)),
            commands: Mutex::new(None),
        }
    }

    /// Configure reconnect backoff.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Configure the keepalive ping interval.
    #[must_use]
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Current session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.load()
    }

    /// Begin a session against `endpoint` and return the log and
    /// status channels. Returns immediately; connection progress
    /// arrives on the channels.
    ///
    /// Expects no session to be active; starting twice on one agent is
    /// a caller error.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InvalidEndpoint`] if the URL is blank,
    /// malformed or not a `ws://`/`wss://` URL. No session is created
    /// in that case.
    pub fn start(&self, endpoint: &str) -> Result<AgentChannels, AgentError> {
        validate_endpoint(endpoint)?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (logs_tx, logs_rx) = mpsc::channel(256);
        let (status_tx, status_rx) = mpsc::channel(32);

        let driver = SessionDriver::new(
            endpoint.to_string(),
            self.ping_interval,
            self.backoff.clone(),
            Arc::clone(&self.sender),
            Arc::clone(&self.state),
            events_tx.clone(),
            events_rx,
            logs_tx,
            status_tx,
        );

        *self.commands.lock().unwrap_or_else(std::sync::PoisonError::into_inner) =
            Some(events_tx);
        tokio::spawn(driver.run());

        Ok(AgentChannels {
            logs: logs_rx,
            status: status_rx,
        })
    }

    /// Request a graceful stop. Idempotent: safe to call repeatedly,
    /// before `start`, or after the session has already stopped.
    /// Completion surfaces as [`StatusSignal::Stopped`].
    pub fn stop(&self) {
        let commands = self
            .commands
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(tx) = commands.as_ref() {
            let _ = tx.send(SessionEvent::Stop);
        }
    }
}

/// Validate a session endpoint: non-blank, parseable, ws or wss.
pub(crate) fn validate_endpoint(endpoint: &str) -> Result<(), AgentError> {
    if endpoint.trim().is_empty() {
        return Err(AgentError::InvalidEndpoint(endpoint.to_string()));
    }
    let url =
        Url::parse(endpoint).map_err(|_| AgentError::InvalidEndpoint(endpoint.to_string()))?;
    match url.scheme() {
        "ws" | "wss" => Ok(()),
        _ => Err(AgentError::InvalidEndpoint(endpoint.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::SendError;

    struct NoopSender;

    impl SmsSender for NoopSender {
        async fn send(&self, _destination: &str, _body: &str) -> Result<(), SendError> {
            Ok(())
        }
    }

    #[test]
    fn test_validate_endpoint_accepts_ws_and_wss() {
        assert!(validate_endpoint("ws://localhost:8080/agent").is_ok());
        assert!(validate_endpoint("wss://gateway.example.com/agent").is_ok());
    }

    #[test]
    fn test_validate_endpoint_rejects_blank() {
        assert!(matches!(
            validate_endpoint(""),
            Err(AgentError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            validate_endpoint("   "),
            Err(AgentError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn test_validate_endpoint_rejects_other_schemes() {
        assert!(matches!(
            validate_endpoint("http://example.com"),
            Err(AgentError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            validate_endpoint("ftp://example.com"),
            Err(AgentError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn test_validate_endpoint_rejects_garbage() {
        assert!(matches!(
            validate_endpoint("not a url"),
            Err(AgentError::InvalidEndpoint(_))
        ));
    }

    #[tokio::test]
    async fn test_start_with_invalid_endpoint_creates_no_session() {
        let agent = Agent::new(NoopSender);
        let err = agent.start("http://example.com").unwrap_err();

        assert!(matches!(err, AgentError::InvalidEndpoint(_)));
        assert_eq!(agent.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_stop_before_start_is_a_noop() {
        let agent = Agent::new(NoopSender);
        agent.stop();
        agent.stop();
        assert_eq!(agent.state(), SessionState::Idle);
    }
}
