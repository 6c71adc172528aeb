//! Task dispatch through the local send capability.

use std::future::Future;
use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;

use smsgate_proto::{ClientMessage, Task};

use crate::error::AgentError;

/// Errors reported by a send capability.
#[derive(Debug, Error)]
pub enum SendError {
    /// The capability rejected the message (permission denied, invalid
    /// destination, platform rejection, ...).
    #[error("{0}")]
    Rejected(String),

    /// The capability could not be invoked at all.
    #[error("failed to invoke send capability: {0}")]
    Io(#[from] std::io::Error),
}

/// The local send capability: transmits one text message. Splitting a
/// long body across physical message units is the capability's
/// concern; callers treat the send as a single logical action.
pub trait SmsSender: Send + Sync + 'static {
    /// Send `body` to `destination`.
    fn send(
        &self,
        destination: &str,
        body: &str,
    ) -> impl Future<Output = Result<(), SendError>> + Send;
}

/// Attempt a task exactly once and report the outcome.
///
/// Never fails outward: any capability error becomes a FAILED report
/// carrying the description and the original task.
pub async fn dispatch<S: SmsSender>(task: &Task, sender: &S) -> ClientMessage {
    match sender.send(&task.destination, &task.body).await {
        Ok(()) => {
            tracing::info!(task_id = %task.id, destination = %task.destination, "sms sent");
            ClientMessage::sent(&task.id)
        }
        Err(e) => {
            tracing::warn!(task_id = %task.id, error = %e, "sms send failed");
            ClientMessage::failed(&task.id, e.to_string(), task.clone())
        }
    }
}

/// Send capability backed by an external command, for headless
/// deployments where delivery goes through a modem tool. The
/// destination and body are appended as the final two arguments.
#[derive(Debug, Clone)]
pub struct CommandSender {
    program: String,
    args: Vec<String>,
}

impl CommandSender {
    /// Build a sender from a command line (program plus fixed args).
    ///
    /// # Errors
    ///
    /// Returns a config error if the command line is empty.
    pub fn new(command: &[String]) -> Result<Self, AgentError> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| AgentError::Config("send_command cannot be empty".to_string()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl SmsSender for CommandSender {
    async fn send(&self, destination: &str, body: &str) -> Result<(), SendError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(destination)
            .arg(body)
            .stdin(Stdio::null())
            .output()
            .await?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.trim();
            if detail.is_empty() {
                Err(SendError::Rejected(format!(
                    "send command exited with {}",
                    output.status
                )))
            } else {
                Err(SendError::Rejected(detail.to_string()))
            }
        }
    }
}
