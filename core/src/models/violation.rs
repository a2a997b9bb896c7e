use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::types::EventId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    BruteForce,
    SuspiciousActivity,
    UnauthorizedAccess,
    DataExposure,
}

impl ViolationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::BruteForce => "brute_force",
            ViolationKind::SuspiciousActivity => "suspicious_activity",
            ViolationKind::UnauthorizedAccess => "unauthorized_access",
            ViolationKind::DataExposure => "data_exposure",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable description of a detected anomaly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityViolation {
    pub id: EventId,
    #[serde(rename = "type")]
    pub kind: ViolationKind,
    pub severity: Severity,
    pub ip_address: String,
    pub user_id: Option<String>,
    pub description: String,
    pub metadata: Map<String, Value>,
    pub occurred_at: DateTime<Utc>,
}

impl SecurityViolation {
    pub fn new(
        kind: ViolationKind,
        severity: Severity,
        ip_address: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: EventId::new(),
            kind,
            severity,
            ip_address: ip_address.into(),
            user_id: None,
            description: description.into(),
            metadata: Map::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn violation_serializes_with_wire_names() {
        let violation = SecurityViolation::new(
            ViolationKind::BruteForce,
            Severity::High,
            "1.2.3.4",
            "too many failures",
        )
        .with_metadata("attemptCount", 5);

        let json = serde_json::to_value(&violation).expect("serialize");
        assert_eq!(json["type"], "brute_force");
        assert_eq!(json["severity"], "high");
        assert_eq!(json["ipAddress"], "1.2.3.4");
        assert_eq!(json["metadata"]["attemptCount"], 5);
        assert!(json["userId"].is_null());
    }

    #[test]
    fn severity_orders_by_impact() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::High < Severity::Critical);
    }
}
