//! # Action Request Events
//!
//! The decoded body of a queue message. One event corresponds to one runbook
//! invocation; the JSON field names are the stable wire schema shared with the
//! server that signs and enqueues requests.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::errors::MessagingResult;

/// Action request delivered to the runbook pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Event {
    pub timestamp: i64,
    pub source: String,
    pub hostname: String,
    pub action_type: String,
    #[serde(rename = "eventid")]
    pub event_id: String,
    #[serde(rename = "agentid")]
    pub agent_id: String,
    #[serde(rename = "ruleid")]
    pub rule_id: String,
    #[serde(rename = "inflight_actionid")]
    pub inflight_action_id: String,
    pub runbook_name: String,
    pub raw_command: String,
    pub signature: String,
    /// Action timeout in seconds
    pub timeout: i32,
    #[serde(rename = "github_filepath")]
    pub github_file_path: String,
    #[serde(rename = "env")]
    pub environment: HashMap<String, String>,

    /// Source queue message id, attached after decode
    #[serde(skip)]
    pub message_id: String,
    /// Receipt handle of the source message, attached after decode
    #[serde(skip)]
    pub receipt_handle: String,
}

impl Event {
    /// Decode a message body into an event
    pub fn from_body(body: &str) -> MessagingResult<Self> {
        Ok(serde_json::from_str(body)?)
    }

    /// Encode the wire fields as JSON
    pub fn to_body(&self) -> MessagingResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Attach the transport fields of the message this event came from
    pub fn with_transport(
        mut self,
        message_id: impl Into<String>,
        receipt_handle: impl Into<String>,
    ) -> Self {
        self.message_id = message_id.into();
        self.receipt_handle = receipt_handle.into();
        self
    }
}
