//! The session task: owns the transport handle and drives the state
//! machine.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Bytes, Message};

use smsgate_proto::{ClientMessage, ServerEnvelope, TaskStatus};

use crate::dispatch::{dispatch, SmsSender};

use super::backoff::{BackoffConfig, ReconnectTimer};
use super::events::{LogEvent, SessionEvent, StatusSignal, TransportEvent, WsStream};
use super::state::{AtomicSessionState, SessionState};

type WsWriter = SplitSink<WsStream, Message>;
type WsReader = SplitStream<WsStream>;

/// Ceiling on one connect plus handshake attempt. A peer that accepts
/// TCP but never answers the upgrade counts as a failure.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of handling one session event.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Drives one session: a single task consuming the event mailbox, so
/// the transport handle, backoff timer and state are mutated from one
/// place only.
pub(crate) struct SessionDriver<S> {
    endpoint: String,
    ping_interval: Duration,
    sender: Arc<S>,
    state: Arc<AtomicSessionState>,
    timer: ReconnectTimer,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    reports_tx: mpsc::Sender<ClientMessage>,
    reports_rx: mpsc::Receiver<ClientMessage>,
    logs: mpsc::Sender<LogEvent>,
    status: mpsc::Sender<StatusSignal>,
    writer: Option<WsWriter>,
    connect_task: Option<JoinHandle<()>>,
    reader_task: Option<JoinHandle<()>>,
    stopping: bool,
}

impl<S: SmsSender> SessionDriver<S> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        endpoint: String,
        ping_interval: Duration,
        backoff: BackoffConfig,
        sender: Arc<S>,
        state: Arc<AtomicSessionState>,
        events_tx: mpsc::UnboundedSender<SessionEvent>,
        events_rx: mpsc::UnboundedReceiver<SessionEvent>,
        logs: mpsc::Sender<LogEvent>,
        status: mpsc::Sender<StatusSignal>,
    ) -> Self {
        let (reports_tx, reports_rx) = mpsc::channel(32);
        Self {
            endpoint,
            ping_interval,
            sender,
            state,
            timer: ReconnectTimer::new(backoff),
            events_tx,
            events_rx,
            reports_tx,
            reports_rx,
            logs,
            status,
            writer: None,
            connect_task: None,
            reader_task: None,
            stopping: false,
        }
    }

    /// Run the session until it reaches `Stopped`.
    pub(crate) async fn run(mut self) {
        self.open_transport();

        let mut ping = tokio::time::interval(self.ping_interval);
        ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                Some(event) = self.events_rx.recv() => {
                    if self.handle_event(event).await == Flow::Stop {
                        break;
                    }
                }
                Some(report) = self.reports_rx.recv() => {
                    self.write_report(report).await;
                }
                _ = ping.tick(), if self.writer.is_some() && !self.stopping => {
                    self.send_ping().await;
                }
            }
        }
    }

    async fn handle_event(&mut self, event: SessionEvent) -> Flow {
        match event {
            SessionEvent::Transport(transport) => self.handle_transport(transport),
            SessionEvent::ConnectFinished(outcome) => {
                self.connect_task = None;
                match outcome {
                    Ok(stream) => self.on_transport_open(*stream),
                    Err(reason) => self.on_connection_lost(&reason),
                }
                Flow::Continue
            }
            SessionEvent::ReconnectFired => {
                // Stop may have raced the timer; never reconnect after it.
                if self.stopping {
                    return Flow::Continue;
                }
                self.timer.fired();
                self.open_transport();
                Flow::Continue
            }
            SessionEvent::Stop => self.handle_stop().await,
        }
    }

    fn handle_transport(&mut self, event: TransportEvent) -> Flow {
        match event {
            TransportEvent::Message(text) => {
                self.handle_message(&text);
                Flow::Continue
            }
            TransportEvent::Failed { reason } => {
                if self.stopping {
                    // Same as a normal close once stop was requested.
                    self.finalize();
                    Flow::Stop
                } else {
                    self.on_connection_lost(&reason);
                    Flow::Continue
                }
            }
            TransportEvent::Closed { code, reason } => {
                if self.stopping {
                    self.finalize();
                    Flow::Stop
                } else {
                    let detail = match code {
                        Some(code) => format!("closed with code {code}: {reason}"),
                        None => format!("closed: {reason}"),
                    };
                    self.on_connection_lost(&detail);
                    Flow::Continue
                }
            }
        }
    }

    async fn handle_stop(&mut self) -> Flow {
        if self.stopping {
            return Flow::Continue;
        }
        self.stopping = true;
        self.state.store(SessionState::Stopping);
        self.timer.cancel();
        self.log("stop requested");

        match self.writer.as_mut() {
            Some(writer) => {
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: "stopped by operator".into(),
                };
                if writer.send(Message::Close(Some(frame))).await.is_err() {
                    // Transport already dead; nothing to wait for.
                    self.finalize();
                    return Flow::Stop;
                }
                // Wait for the reader to confirm the close.
                Flow::Continue
            }
            None => {
                self.finalize();
                Flow::Stop
            }
        }
    }

    /// Kick off a connect attempt on its own task. The outcome comes
    /// back through the mailbox, so the session keeps draining events
    /// (a stop in particular) while the handshake is in flight.
    fn open_transport(&mut self) {
        self.state.store(SessionState::Connecting);
        self.emit_status(StatusSignal::Connecting);
        self.log(format!("connecting to {}", self.endpoint));

        let endpoint = self.endpoint.clone();
        let tx = self.events_tx.clone();
        self.connect_task = Some(tokio::spawn(async move {
            let attempt =
                tokio::time::timeout(CONNECT_TIMEOUT, tokio_tungstenite::connect_async(&endpoint));
            let outcome = match attempt.await {
                Ok(Ok((ws_stream, _))) => Ok(Box::new(ws_stream)),
                Ok(Err(e)) => Err(format!("connect failed: {e}")),
                Err(_) => Err("connect timed out".to_string()),
            };
            let _ = tx.send(SessionEvent::ConnectFinished(outcome));
        }));
    }

    fn on_transport_open(&mut self, stream: WsStream) {
        let (write, read) = stream.split();
        self.writer = Some(write);
        let tx = self.events_tx.clone();
        self.reader_task = Some(tokio::spawn(reader_loop(read, tx)));

        self.state.store(SessionState::Open);
        self.timer.reset();
        self.emit_status(StatusSignal::Connected);
        self.log("connection open, waiting for tasks");
    }

    fn on_connection_lost(&mut self, reason: &str) {
        self.writer = None;
        if let Some(handle) = self.reader_task.take() {
            handle.abort();
        }
        self.state.store(SessionState::Reconnecting);
        self.emit_status(StatusSignal::Reconnecting);

        let delay = self.timer.next_delay();
        if self.timer.arm(self.events_tx.clone()) {
            self.log(format!(
                "connection lost ({reason}); reconnecting in {:.1}s",
                delay.as_secs_f64()
            ));
        }
    }

    fn handle_message(&mut self, text: &str) {
        self.log(format!("<- received: {text}"));

        let envelope = match ServerEnvelope::from_json(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                // Malformed input is dropped; the connection stays open.
                self.log(format!("dropped malformed server message: {e}"));
                return;
            }
        };

        let Some(task) = envelope.task() else {
            self.log(format!("ignoring message type '{}'", envelope.kind));
            return;
        };

        self.log(format!(
            "processing task {} for {}",
            task.id, task.destination
        ));

        // Offload the send so a slow capability never starves the
        // mailbox; the report comes back over the report channel.
        let task = task.clone();
        let sender = Arc::clone(&self.sender);
        let reports = self.reports_tx.clone();
        tokio::spawn(async move {
            let report = dispatch(&task, sender.as_ref()).await;
            let _ = reports.send(report).await;
        });
    }

    async fn write_report(&mut self, report: ClientMessage) {
        match report.status() {
            TaskStatus::Sent => self.log(format!("task {} sent", report.task_id())),
            TaskStatus::Failed => self.log(format!("task {} failed", report.task_id())),
        }

        let json = match report.to_json() {
            Ok(json) => json,
            Err(e) => {
                self.log(format!("could not encode status report: {e}"));
                return;
            }
        };

        // Best-effort: a report attempted on a dead transport is
        // dropped, not queued.
        match self.writer.as_mut() {
            Some(writer) => {
                if writer.send(Message::Text(json.clone().into())).await.is_err() {
                    self.log(format!("status report dropped, write failed: {json}"));
                } else {
                    self.log(format!("-> status sent: {json}"));
                }
            }
            None => {
                self.log(format!("status report dropped, connection is down: {json}"));
            }
        }
    }

    async fn send_ping(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            if writer.send(Message::Ping(Bytes::new())).await.is_err() && !self.stopping {
                self.on_connection_lost("ping write failed");
            }
        }
    }

    fn finalize(&mut self) {
        self.timer.cancel();
        self.writer = None;
        if let Some(handle) = self.connect_task.take() {
            handle.abort();
        }
        if let Some(handle) = self.reader_task.take() {
            handle.abort();
        }
        self.state.store(SessionState::Stopped);
        self.log("session stopped");
        self.emit_status(StatusSignal::Stopped);
    }

    fn log(&self, text: impl Into<String>) {
        let event = LogEvent::now(text);
        tracing::debug!("{}", event.text);
        let _ = self.logs.try_send(event);
    }

    fn emit_status(&self, signal: StatusSignal) {
        let _ = self.status.try_send(signal);
    }
}

/// Reads the transport until it ends, translating each outcome into a
/// `TransportEvent` on the session mailbox. Sends exactly one terminal
/// event (`Failed` or `Closed`) and returns.
async fn reader_loop(mut read: WsReader, tx: mpsc::UnboundedSender<SessionEvent>) {
    while let Some(item) = read.next().await {
        match item {
            Ok(Message::Text(text)) => {
                let event = SessionEvent::Transport(TransportEvent::Message(text.to_string()));
                if tx.send(event).is_err() {
                    return;
                }
            }
            Ok(Message::Close(frame)) => {
                let (code, reason) = match frame {
                    Some(frame) => (Some(u16::from(frame.code)), frame.reason.to_string()),
                    None => (None, "closed by server".to_string()),
                };
                let _ = tx.send(SessionEvent::Transport(TransportEvent::Closed {
                    code,
                    reason,
                }));
                return;
            }
            // Pings are answered by the transport layer; Pong and
            // Binary carry nothing for this protocol.
            Ok(_) => {}
            Err(e) => {
                let _ = tx.send(SessionEvent::Transport(TransportEvent::Failed {
                    reason: e.to_string(),
                }));
                return;
            }
        }
    }
    let _ = tx.send(SessionEvent::Transport(TransportEvent::Closed {
        code: None,
        reason: "connection closed".to_string(),
    }));
}
