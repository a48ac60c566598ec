//! # Agent Identity
//!
//! The identity established by registration: the agent id, the queue the agent
//! consumes from, and the transport credentials for that queue.
//!
//! The registration service is the only writer. Readers hold a [`SharedIdentity`]
//! and re-read it only after an update notification, which the registration
//! service sends once the write lock has been released.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Shared, registration-owned identity handle
pub type SharedIdentity = Arc<RwLock<Identity>>;

/// Transport credentials for the action queue
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl Credentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            // The server sends an empty string when there is no session token
            session_token: session_token.filter(|token| !token.is_empty()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.access_key_id.is_empty() || self.secret_access_key.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &mask(&self.access_key_id))
            .field("secret_access_key", &"***")
            .field("has_session_token", &self.session_token.is_some())
            .finish()
    }
}

fn mask(value: &str) -> String {
    let count = value.chars().count();
    if count <= 4 {
        return "***".to_string();
    }
    let tail: String = value.chars().skip(count - 4).collect();
    format!("***{tail}")
}

/// Registered identity of this agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub agent_id: String,
    pub queue_endpoint: String,
    pub credentials: Credentials,
}

impl Identity {
    pub fn new(
        agent_id: impl Into<String>,
        queue_endpoint: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            queue_endpoint: queue_endpoint.into(),
            credentials,
        }
    }

    /// Wrap into a shared handle
    pub fn into_shared(self) -> SharedIdentity {
        Arc::new(RwLock::new(self))
    }
}

/// Notice that the [`SharedIdentity`] was rewritten by registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityUpdate {
    pub agent_id: String,
    pub updated_at: DateTime<Utc>,
}

impl IdentityUpdate {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            updated_at: Utc::now(),
        }
    }
}
