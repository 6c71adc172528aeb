//! Protocol message definitions.
//!
//! Wire field names follow the server's contract: task ids travel as
//! `taskId`, the destination number as `numero` and the message body as
//! `mensaje`.

use serde::{Deserialize, Serialize};

use crate::ProtoError;

/// Envelope type that carries a new task for the agent.
pub const NEW_TASK: &str = "NEW_TASK";

/// A unit of work pushed by the server: one text message to deliver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    /// Server-issued task id, unique per issuance.
    #[serde(rename = "taskId")]
    pub id: String,
    /// Destination number.
    #[serde(rename = "numero")]
    pub destination: String,
    /// Message body.
    #[serde(rename = "mensaje")]
    pub body: String,
    /// Delivery attempts recorded by the server.
    #[serde(default)]
    pub attempts: u32,
}

/// Messages pushed from server to agent.
///
/// The envelope is deliberately loose: any well-formed JSON object with
/// a `type` field decodes, and unrecognized types are for the caller to
/// ignore. Only [`NEW_TASK`] with a payload carries work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerEnvelope {
    /// Envelope type discriminator.
    #[serde(rename = "type")]
    pub kind: String,
    /// Task payload, present only for task envelopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Task>,
}

impl ServerEnvelope {
    /// Create a task envelope (used by tests and mock servers).
    #[must_use]
    pub fn new_task(task: Task) -> Self {
        Self {
            kind: NEW_TASK.to_string(),
            payload: Some(task),
        }
    }

    /// The task to dispatch, if this envelope carries one.
    #[must_use]
    pub fn task(&self) -> Option<&Task> {
        if self.kind == NEW_TASK {
            self.payload.as_ref()
        } else {
            None
        }
    }

    /// Serialize to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, ProtoError> {
        serde_json::to_string(self).map_err(|e| ProtoError::Encoding(e.to_string()))
    }

    /// Deserialize from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not a well-formed envelope.
    pub fn from_json(json: &str) -> Result<Self, ProtoError> {
        serde_json::from_str(json).map_err(|e| ProtoError::Decoding(e.to_string()))
    }
}

/// Delivery outcome for a processed task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TaskStatus {
    /// The send capability accepted the message.
    #[serde(rename = "SENT")]
    Sent,
    /// The send capability rejected or failed the message.
    #[serde(rename = "FAILED")]
    Failed,
}

/// Messages sent from agent to server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Outcome report for a single dispatched task.
    #[serde(rename = "STATUS_UPDATE")]
    StatusUpdate {
        /// Delivery outcome.
        status: TaskStatus,
        /// Id of the task this report answers.
        #[serde(rename = "taskId")]
        task_id: String,
        /// Failure description, present only for failed tasks.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<String>,
        /// The failed task echoed back, present only for failed tasks.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task: Option<Task>,
    },
}

impl ClientMessage {
    /// Create a report for a successfully sent task.
    #[must_use]
    pub fn sent(task_id: impl Into<String>) -> Self {
        Self::StatusUpdate {
            status: TaskStatus::Sent,
            task_id: task_id.into(),
            details: None,
            task: None,
        }
    }

    /// Create a report for a failed task, echoing the task back.
    #[must_use]
    pub fn failed(task_id: impl Into<String>, details: impl Into<String>, task: Task) -> Self {
        Self::StatusUpdate {
            status: TaskStatus::Failed,
            task_id: task_id.into(),
            details: Some(details.into()),
            task: Some(task),
        }
    }

    /// Delivery outcome carried by this report.
    #[must_use]
    pub const fn status(&self) -> TaskStatus {
        match self {
            Self::StatusUpdate { status, .. } => *status,
        }
    }

    /// Id of the task this report answers.
    #[must_use]
    pub fn task_id(&self) -> &str {
        match self {
            Self::StatusUpdate { task_id, .. } => task_id,
        }
    }

    /// Serialize to JSON. Never fails for messages built through the
    /// constructors.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, ProtoError> {
        serde_json::to_string(self).map_err(|e| ProtoError::Encoding(e.to_string()))
    }

    /// Deserialize from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn from_json(json: &str) -> Result<Self, ProtoError> {
        serde_json::from_str(json).map_err(|e| ProtoError::Decoding(e.to_string()))
    }
}
