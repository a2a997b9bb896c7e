//! Models for tracking active user sessions.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::SessionId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// In-memory representation of an authenticated browsing context.
pub struct Session {
    /// Opaque identifier handed to the client.
    pub session_id: SessionId,
    /// Principal owning the session.
    pub user_id: String,
    /// Address the session was bound to at creation.
    pub ip_address: String,
    /// Timestamp when the session was created.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the last successful validation.
    pub last_activity: DateTime<Utc>,
}

impl Session {
    pub fn new(user_id: String, ip_address: String, now: DateTime<Utc>) -> Self {
        Self {
            session_id: SessionId::new(),
            user_id,
            ip_address,
            created_at: now,
            last_activity: now,
        }
    }

    /// A session is expired once either the idle or the absolute limit has
    /// been reached.
    pub fn is_expired(
        &self,
        now: DateTime<Utc>,
        idle_timeout: Duration,
        absolute_timeout: Duration,
    ) -> bool {
        now - self.last_activity >= idle_timeout || now - self.created_at >= absolute_timeout
    }
}

/// Why a session failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionRejection {
    NotFound,
    IpMismatch,
    Expired,
}

impl SessionRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionRejection::NotFound => "not found",
            SessionRejection::IpMismatch => "ip mismatch",
            SessionRejection::Expired => "expired",
        }
    }
}

impl fmt::Display for SessionRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of [`SessionRegistry::validate`](crate::services::session::SessionRegistry::validate).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCheck {
    Valid { user_id: String },
    Invalid(SessionRejection),
}

impl SessionCheck {
    pub fn is_valid(&self) -> bool {
        matches!(self, SessionCheck::Valid { .. })
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            SessionCheck::Valid { user_id } => Some(user_id),
            SessionCheck::Invalid(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<SessionRejection> {
        match self {
            SessionCheck::Valid { .. } => None,
            SessionCheck::Invalid(reason) => Some(*reason),
        }
    }
}
