//! # Message Admission
//!
//! Decides what happens to one polled message. [`evaluate`] is pure; the
//! consumer performs the queue call that goes with each [`Disposition`]:
//!
//! | Disposition        | Queue call                         | Emitted |
//! |--------------------|------------------------------------|---------|
//! | `MissingAgentId`   | none                               | no      |
//! | `Foreign`          | visibility 0                       | no      |
//! | `MissingSignature` | none                               | no      |
//! | `Rejected`         | delete                             | no      |
//! | `Accepted`         | visibility `timeout + buffer`      | yes     |
//!
//! Foreign messages belong to another agent sharing the queue, so they are
//! released untouched and never authenticated or decoded.

use std::fmt;

use crate::auth::MessageAuthenticator;
use crate::config::MAX_VISIBILITY_TIMEOUT_SECONDS;
use crate::messaging::{Event, InboundMessage};

/// Why a message addressed to this agent is deleted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Signature did not verify
    InvalidSignature,
    /// Signature could not be checked at all
    AuthenticationError(String),
    /// Signed body is not a valid event
    Undecodable(String),
    /// Signed body names a different agent than the attribute
    AgentMismatch { embedded_agent_id: String },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::InvalidSignature => write!(f, "invalid signature"),
            RejectReason::AuthenticationError(e) => write!(f, "authentication error: {e}"),
            RejectReason::Undecodable(e) => write!(f, "undecodable body: {e}"),
            RejectReason::AgentMismatch { embedded_agent_id } => {
                write!(f, "body addressed to agent {embedded_agent_id}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    MissingAgentId,
    Foreign { agent_id: String },
    MissingSignature,
    Rejected(RejectReason),
    /// Decoded event, transport fields not yet attached
    Accepted(Event),
}

/// Classify a message for the agent `agent_id`
pub fn evaluate(
    message: &InboundMessage,
    agent_id: &str,
    authenticator: &dyn MessageAuthenticator,
) -> Disposition {
    let Some(addressed_to) = message.agent_id() else {
        return Disposition::MissingAgentId;
    };
    if addressed_to != agent_id {
        return Disposition::Foreign {
            agent_id: addressed_to.to_string(),
        };
    }

    let Some(signature) = message.signature() else {
        return Disposition::MissingSignature;
    };

    match authenticator.verify(&message.body, signature) {
        Ok(true) => {}
        Ok(false) => return Disposition::Rejected(RejectReason::InvalidSignature),
        Err(e) => {
            return Disposition::Rejected(RejectReason::AuthenticationError(e.to_string()))
        }
    }

    let event = match Event::from_body(&message.body) {
        Ok(event) => event,
        Err(e) => return Disposition::Rejected(RejectReason::Undecodable(e.to_string())),
    };

    if event.agent_id != agent_id {
        return Disposition::Rejected(RejectReason::AgentMismatch {
            embedded_agent_id: event.agent_id,
        });
    }

    Disposition::Accepted(event)
}

/// Visibility for an accepted event: its own timeout plus `buffer`, within the
/// range the queue accepts
pub fn extended_visibility(event_timeout: i32, buffer: i32) -> i32 {
    event_timeout
        .saturating_add(buffer)
        .clamp(0, MAX_VISIBILITY_TIMEOUT_SECONDS)
}
