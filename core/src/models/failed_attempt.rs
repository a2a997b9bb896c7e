use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Brute-force counter for a single identifier (IP, account or composite key).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedAttemptRecord {
    pub identifier: String,
    pub count: u32,
    pub last_attempt: DateTime<Utc>,
}

impl FailedAttemptRecord {
    pub fn new(identifier: String, now: DateTime<Utc>) -> Self {
        Self {
            identifier,
            count: 1,
            last_attempt: now,
        }
    }

    /// The window is still open while no more than `window` has passed since
    /// the last failure.
    pub fn within_window(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now - self.last_attempt <= window
    }
}
