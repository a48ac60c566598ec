//! # Inbound Queue Messages
//!
//! Backend-neutral representation of a polled message and of the poll request
//! that produced it.

use std::collections::HashMap;

/// Attribute carrying the id of the agent a message is addressed to
pub const AGENT_ID_ATTRIBUTE: &str = "agentID";
/// Attribute carrying the signature over the raw message body
pub const SIGNATURE_ATTRIBUTE: &str = "signature";

/// A message received from the queue, valid for one poll cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Queue-assigned message id
    pub message_id: String,
    /// Opaque token required for deletion and visibility changes
    pub receipt_handle: String,
    /// Raw body as delivered
    pub body: String,
    /// String-valued message attributes
    pub attributes: HashMap<String, String>,
}

impl InboundMessage {
    pub fn new(
        message_id: impl Into<String>,
        receipt_handle: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            receipt_handle: receipt_handle.into(),
            body: body.into(),
            attributes: HashMap::new(),
        }
    }

    /// Builder-style attribute setter
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// The `agentID` attribute, if present
    pub fn agent_id(&self) -> Option<&str> {
        self.attributes.get(AGENT_ID_ATTRIBUTE).map(String::as_str)
    }

    /// The `signature` attribute, if present
    pub fn signature(&self) -> Option<&str> {
        self.attributes.get(SIGNATURE_ATTRIBUTE).map(String::as_str)
    }
}

/// Parameters of a single bounded poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollRequest {
    pub max_messages: i32,
    pub wait_time_seconds: i32,
    pub visibility_timeout_seconds: i32,
    pub attribute_names: Vec<String>,
}

impl PollRequest {
    /// Poll request restricted to the attributes the consumer needs
    pub fn new(max_messages: i32, wait_time_seconds: i32, visibility_timeout_seconds: i32) -> Self {
        Self {
            max_messages,
            wait_time_seconds,
            visibility_timeout_seconds,
            attribute_names: vec![
                AGENT_ID_ATTRIBUTE.to_string(),
                SIGNATURE_ATTRIBUTE.to_string(),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_accessors() {
        let message = InboundMessage::new("m-1", "r-1", "{}")
            .with_attribute(AGENT_ID_ATTRIBUTE, "123456789")
            .with_attribute(SIGNATURE_ATTRIBUTE, "SIG");

        assert_eq!(message.agent_id(), Some("123456789"));
        assert_eq!(message.signature(), Some("SIG"));
    }

    #[test]
    fn test_missing_attributes() {
        let message = InboundMessage::new("m-1", "r-1", "{}");
        assert_eq!(message.agent_id(), None);
        assert_eq!(message.signature(), None);
    }

    #[test]
    fn test_poll_request_requires_both_attributes() {
        let request = PollRequest::new(10, 20, 120);
        assert_eq!(request.attribute_names, vec!["agentID", "signature"]);
    }
}
