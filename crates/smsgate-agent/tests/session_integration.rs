//! Session integration tests.
//!
//! End-to-end tests against a mock task server: a real WebSocket
//! listener that pushes task envelopes and captures status reports.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

use smsgate_agent::{Agent, AgentChannels, BackoffConfig, SendError, SessionState, SmsSender, StatusSignal};
use smsgate_proto::{ClientMessage, ServerEnvelope, Task, TaskStatus};

// ============================================================================
// Test Helpers - Mock Task Server
// ============================================================================

/// A mock task server bound to an available port.
struct MockServer {
    listener: TcpListener,
    addr: SocketAddr,
}

impl MockServer {
    async fn new() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind mock server");
        let addr = listener.local_addr().expect("no local addr");
        Self { listener, addr }
    }

    fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Accept a single agent connection.
    async fn accept(&self) -> WebSocketStream<TcpStream> {
        let (stream, _) = self.listener.accept().await.expect("accept failed");
        accept_async(stream).await.expect("handshake failed")
    }
}

/// Push a task envelope to the agent.
async fn push_task(ws: &mut WebSocketStream<TcpStream>, task: Task) {
    let json = ServerEnvelope::new_task(task).to_json().expect("encode failed");
    ws.send(Message::Text(json.into())).await.expect("send failed");
}

/// Read frames until a status report arrives.
async fn read_report(ws: &mut WebSocketStream<TcpStream>) -> ClientMessage {
    loop {
        let msg = ws
            .next()
            .await
            .expect("connection ended")
            .expect("ws error");
        if let Message::Text(text) = msg {
            return ClientMessage::from_json(&text).expect("failed to parse report");
        }
    }
}

/// Drain status signals until `expected` (or panic on Stopped/timeout).
async fn wait_for_status(channels: &mut AgentChannels, expected: StatusSignal) {
    loop {
        let signal = timeout(Duration::from_secs(5), channels.status.recv())
            .await
            .expect("timeout waiting for status")
            .expect("status channel closed");
        if signal == expected {
            return;
        }
        assert_ne!(
            signal,
            StatusSignal::Stopped,
            "session stopped while waiting for {expected:?}"
        );
    }
}

// ============================================================================
// Test Helpers - Send Capabilities
// ============================================================================

/// Capability that accepts everything and records what it sent.
#[derive(Clone, Default)]
struct RecordingSender {
    sent: Arc<Mutex<Vec<(String, String)>>>,
}

impl SmsSender for RecordingSender {
    async fn send(&self, destination: &str, body: &str) -> Result<(), SendError> {
        self.sent
            .lock()
            .expect("lock poisoned")
            .push((destination.to_string(), body.to_string()));
        Ok(())
    }
}

/// Capability that rejects everything with a fixed message.
struct FailingSender(&'static str);

impl SmsSender for FailingSender {
    async fn send(&self, _destination: &str, _body: &str) -> Result<(), SendError> {
        Err(SendError::Rejected(self.0.to_string()))
    }
}

fn fast_backoff() -> BackoffConfig {
    BackoffConfig {
        initial_delay: Duration::from_millis(50),
        max_delay: Duration::from_millis(500),
        multiplier: 1.5,
    }
}

fn task(id: &str) -> Task {
    Task {
        id: id.to_string(),
        destination: "+10000000000".to_string(),
        body: "hi".to_string(),
        attempts: 0,
    }
}

// ============================================================================
// Connection Tests
// ============================================================================

#[tokio::test]
async fn test_connect_emits_connected_status() {
    let server = MockServer::new().await;
    let agent = Agent::new(RecordingSender::default()).with_backoff(fast_backoff());

    let mut channels = agent.start(&server.url()).expect("start failed");
    let _ws = server.accept().await;

    wait_for_status(&mut channels, StatusSignal::Connected).await;
    assert_eq!(agent.state(), SessionState::Open);
}

#[tokio::test]
async fn test_reconnects_after_server_drop() {
    let server = MockServer::new().await;
    let sender = RecordingSender::default();
    let agent = Agent::new(sender.clone()).with_backoff(fast_backoff());

    let mut channels = agent.start(&server.url()).expect("start failed");

    // First connection is dropped by the server.
    let ws = server.accept().await;
    wait_for_status(&mut channels, StatusSignal::Connected).await;
    drop(ws);

    wait_for_status(&mut channels, StatusSignal::Reconnecting).await;

    // The agent comes back on its own and is fully usable.
    let mut ws = timeout(Duration::from_secs(5), server.accept())
        .await
        .expect("agent did not reconnect");
    wait_for_status(&mut channels, StatusSignal::Connected).await;

    push_task(&mut ws, task("T-after-reconnect")).await;
    let report = read_report(&mut ws).await;
    assert_eq!(report.status(), TaskStatus::Sent);
    assert_eq!(report.task_id(), "T-after-reconnect");

    agent.stop();
}

// ============================================================================
// Task Dispatch Tests
// ============================================================================

#[tokio::test]
async fn test_task_is_dispatched_and_sent_status_reported() {
    let server = MockServer::new().await;
    let sender = RecordingSender::default();
    let agent = Agent::new(sender.clone()).with_backoff(fast_backoff());

    let mut channels = agent.start(&server.url()).expect("start failed");
    let mut ws = server.accept().await;
    wait_for_status(&mut channels, StatusSignal::Connected).await;

    push_task(&mut ws, task("T1")).await;

    let report = read_report(&mut ws).await;
    assert_eq!(report, ClientMessage::sent("T1"));

    let sent = sender.sent.lock().expect("lock poisoned").clone();
    assert_eq!(sent, vec![("+10000000000".to_string(), "hi".to_string())]);

    agent.stop();
}

#[tokio::test]
async fn test_failed_send_reports_details_and_task() {
    let server = MockServer::new().await;
    let agent = Agent::new(FailingSender("permission denied")).with_backoff(fast_backoff());

    let mut channels = agent.start(&server.url()).expect("start failed");
    let mut ws = server.accept().await;
    wait_for_status(&mut channels, StatusSignal::Connected).await;

    push_task(&mut ws, task("T1")).await;

    let report = read_report(&mut ws).await;
    assert_eq!(
        report,
        ClientMessage::failed("T1", "permission denied", task("T1"))
    );

    agent.stop();
}

#[tokio::test]
async fn test_unrecognized_message_type_is_ignored() {
    let server = MockServer::new().await;
    let agent = Agent::new(RecordingSender::default()).with_backoff(fast_backoff());

    let mut channels = agent.start(&server.url()).expect("start failed");
    let mut ws = server.accept().await;
    wait_for_status(&mut channels, StatusSignal::Connected).await;

    ws.send(Message::Text(r#"{"type":"PING"}"#.into()))
        .await
        .expect("send failed");
    push_task(&mut ws, task("T2")).await;

    // The PING produced no report; the first report answers T2.
    let report = read_report(&mut ws).await;
    assert_eq!(report.task_id(), "T2");

    agent.stop();
}

#[tokio::test]
async fn test_malformed_message_keeps_connection_open() {
    let server = MockServer::new().await;
    let agent = Agent::new(RecordingSender::default()).with_backoff(fast_backoff());

    let mut channels = agent.start(&server.url()).expect("start failed");
    let mut ws = server.accept().await;
    wait_for_status(&mut channels, StatusSignal::Connected).await;

    ws.send(Message::Text("this is not json".into()))
        .await
        .expect("send failed");
    push_task(&mut ws, task("T3")).await;

    let report = read_report(&mut ws).await;
    assert_eq!(report.task_id(), "T3");
    assert_eq!(agent.state(), SessionState::Open);

    agent.stop();
}

// ============================================================================
// Stop Tests
// ============================================================================

#[tokio::test]
async fn test_stop_closes_gracefully() {
    let server = MockServer::new().await;
    let agent = Agent::new(RecordingSender::default()).with_backoff(fast_backoff());

    let mut channels = agent.start(&server.url()).expect("start failed");
    let mut ws = server.accept().await;
    wait_for_status(&mut channels, StatusSignal::Connected).await;

    agent.stop();

    // The server sees a normal closure, not a dropped socket.
    let frame = loop {
        match timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for close")
        {
            Some(Ok(Message::Close(frame))) => break frame,
            Some(Ok(_)) => {}
            other => panic!("expected close frame, got {other:?}"),
        }
    };
    assert_eq!(frame.expect("expected close frame").code, CloseCode::Normal);

    wait_for_status(&mut channels, StatusSignal::Stopped).await;
    assert_eq!(agent.state(), SessionState::Stopped);
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let server = MockServer::new().await;
    let agent = Agent::new(RecordingSender::default()).with_backoff(fast_backoff());

    let mut channels = agent.start(&server.url()).expect("start failed");
    let _ws = server.accept().await;
    wait_for_status(&mut channels, StatusSignal::Connected).await;

    agent.stop();
    agent.stop();
    wait_for_status(&mut channels, StatusSignal::Stopped).await;
    agent.stop();

    assert_eq!(agent.state(), SessionState::Stopped);
}

#[tokio::test]
async fn test_stop_while_reconnecting_prevents_further_attempts() {
    let server = MockServer::new().await;
    let agent = Agent::new(RecordingSender::default()).with_backoff(BackoffConfig {
        initial_delay: Duration::from_millis(200),
        max_delay: Duration::from_secs(1),
        multiplier: 1.5,
    });

    let mut channels = agent.start(&server.url()).expect("start failed");

    // Drop the first connection so a reconnect gets scheduled.
    let ws = server.accept().await;
    wait_for_status(&mut channels, StatusSignal::Connected).await;
    drop(ws);
    wait_for_status(&mut channels, StatusSignal::Reconnecting).await;

    // Stop lands before the backoff timer fires.
    agent.stop();
    wait_for_status(&mut channels, StatusSignal::Stopped).await;
    assert_eq!(agent.state(), SessionState::Stopped);

    // No transport open ever happens after stop.
    let result = timeout(Duration::from_millis(600), server.listener.accept()).await;
    assert!(result.is_err(), "agent reconnected after stop");
}

#[tokio::test]
async fn test_stop_completes_while_connect_in_flight() {
    // A peer that accepts TCP but never answers the WebSocket
    // upgrade, so the connect attempt stays in flight indefinitely.
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind stalling listener");
    let addr = listener.local_addr().expect("no local addr");
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let agent = Agent::new(RecordingSender::default()).with_backoff(fast_backoff());
    let mut channels = agent.start(&format!("ws://{addr}")).expect("start failed");
    wait_for_status(&mut channels, StatusSignal::Connecting).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    // The stop must not wait for the handshake to resolve.
    agent.stop();
    wait_for_status(&mut channels, StatusSignal::Stopped).await;
    assert_eq!(agent.state(), SessionState::Stopped);
}

#[tokio::test]
async fn test_stop_with_no_transport_finalizes_immediately() {
    // Nothing is listening on this port; the session sits in backoff.
    let agent = Agent::new(RecordingSender::default()).with_backoff(BackoffConfig {
        initial_delay: Duration::from_secs(5),
        max_delay: Duration::from_secs(60),
        multiplier: 1.5,
    });

    let mut channels = agent.start("ws://127.0.0.1:1").expect("start failed");
    wait_for_status(&mut channels, StatusSignal::Reconnecting).await;

    agent.stop();
    wait_for_status(&mut channels, StatusSignal::Stopped).await;
    assert_eq!(agent.state(), SessionState::Stopped);
}

// ============================================================================
// Log Stream Tests
// ============================================================================

#[tokio::test]
async fn test_log_events_are_emitted() {
    let server = MockServer::new().await;
    let agent = Agent::new(RecordingSender::default()).with_backoff(fast_backoff());

    let mut channels = agent.start(&server.url()).expect("start failed");
    let mut ws = server.accept().await;
    wait_for_status(&mut channels, StatusSignal::Connected).await;

    push_task(&mut ws, task("T1")).await;
    let _ = read_report(&mut ws).await;
    agent.stop();
    wait_for_status(&mut channels, StatusSignal::Stopped).await;

    let mut lines = Vec::new();
    while let Ok(event) = channels.logs.try_recv() {
        lines.push(event.text);
    }

    assert!(lines.iter().any(|l| l.contains("connecting to")));
    assert!(lines.iter().any(|l| l.contains("connection open")));
    assert!(lines.iter().any(|l| l.contains("processing task T1")));
    assert!(lines.iter().any(|l| l.contains("session stopped")));
}
