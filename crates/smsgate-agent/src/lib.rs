//! smsgate-agent - device-side SMS dispatch agent.
//!
//! Keeps a persistent outbound WebSocket session to a task-issuing
//! server, executes received tasks through a local send capability and
//! reports outcomes back, reconnecting with increasing backoff when
//! the connection drops.

pub mod agent;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod session;

pub use agent::{Agent, AgentChannels};
pub use config::AgentConfig;
pub use dispatch::{CommandSender, SendError, SmsSender};
pub use error::AgentError;
pub use session::{BackoffConfig, LogEvent, SessionState, StatusSignal, TransportEvent};
