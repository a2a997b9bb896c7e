use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::EventId;

/// Immutable record of a security-relevant action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: EventId,
    /// User that performed the action, `None` for anonymous callers.
    pub actor: Option<String>,
    pub action: String,
    pub resource: String,
    pub occurred_at: DateTime<Utc>,
    pub ip_address: String,
    pub user_agent: Option<String>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl AuditLogEntry {
    pub fn new(
        action: impl Into<String>,
        resource: impl Into<String>,
        ip_address: impl Into<String>,
        success: bool,
    ) -> Self {
        Self {
            id: EventId::new(),
            actor: None,
            action: action.into(),
            resource: resource.into(),
            occurred_at: Utc::now(),
            ip_address: ip_address.into(),
            user_agent: None,
            success,
            details: None,
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: Option<String>) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn actor_label(&self) -> &str {
        self.actor.as_deref().unwrap_or("anonymous")
    }
}
