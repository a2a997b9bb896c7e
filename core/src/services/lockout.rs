use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::config::Config;
use crate::models::{FailedAttemptRecord, SecurityViolation, Severity, ViolationKind};
use crate::services::audit_log::AuditRecorder;

const DEFAULT_CLEANUP_THRESHOLD: usize = 10_000;

fn periodic_cleanup_interval() -> Duration {
    Duration::minutes(5)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    pub threshold: u32,
    pub window: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            threshold: 5,
            window: Duration::minutes(15),
        }
    }
}

impl LockoutPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            threshold: config.account_lockout_threshold.max(1),
            window: config.lockout_window(),
        }
    }
}

struct AttemptStore {
    records: HashMap<String, FailedAttemptRecord>,
    last_cleanup: DateTime<Utc>,
}

/// Per-identifier failed-attempt counters.
///
/// Identifiers are opaque: callers decide whether to key by IP, account, or a
/// composite of both.
pub struct LockoutTracker {
    store: Mutex<AttemptStore>,
    policy: LockoutPolicy,
    cleanup_threshold: usize,
    recorder: AuditRecorder,
}

impl LockoutTracker {
    pub fn new(policy: LockoutPolicy, recorder: AuditRecorder) -> Self {
        Self {
            store: Mutex::new(AttemptStore {
                records: HashMap::new(),
                last_cleanup: Utc::now(),
            }),
            policy,
            cleanup_threshold: DEFAULT_CLEANUP_THRESHOLD,
            recorder,
        }
    }

    pub fn with_cleanup_threshold(mut self, threshold: usize) -> Self {
        self.cleanup_threshold = threshold.max(1);
        self
    }

    pub fn policy(&self) -> &LockoutPolicy {
        &self.policy
    }

    pub fn record_failure(&self, identifier: &str) -> bool {
        self.record_failure_at(identifier, Utc::now())
    }

    /// Counts a failed attempt and reports whether the identifier is now
    /// locked. A failure arriving after the window has lapsed starts a fresh
    /// count of one.
    pub fn record_failure_at(&self, identifier: &str, now: DateTime<Utc>) -> bool {
        self.record_failure_from_at(identifier, identifier, now)
    }

    /// Like [`record_failure`](Self::record_failure) for identifiers that are
    /// not themselves an address, so the violation still names the client IP.
    pub fn record_failure_from(&self, identifier: &str, ip_address: &str) -> bool {
        self.record_failure_from_at(identifier, ip_address, Utc::now())
    }

    pub fn record_failure_from_at(
        &self,
        identifier: &str,
        ip_address: &str,
        now: DateTime<Utc>,
    ) -> bool {
        let window = self.policy.window;
        let count = {
            let mut store = self.lock();
            if should_cleanup(
                store.records.len(),
                self.cleanup_threshold,
                now,
                store.last_cleanup,
                periodic_cleanup_interval(),
            ) {
                store
                    .records
                    .retain(|_, record| record.within_window(now, window));
                store.last_cleanup = now;
            }

            let record = store
                .records
                .entry(identifier.to_string())
                .and_modify(|record| {
                    if record.within_window(now, window) {
                        record.count = record.count.saturating_add(1);
                    } else {
                        record.count = 1;
                    }
                    record.last_attempt = now;
                })
                .or_insert_with(|| FailedAttemptRecord::new(identifier.to_string(), now));
            record.count
        };

        if count < self.policy.threshold {
            tracing::debug!(identifier, count, "Failed authentication attempt recorded");
            return false;
        }

        tracing::warn!(identifier, count, "Identifier locked out after repeated failures");
        self.recorder.log_violation(
            SecurityViolation::new(
                ViolationKind::BruteForce,
                Severity::High,
                ip_address,
                format!("{count} failed authentication attempts within the lockout window"),
            )
            .with_metadata("identifier", identifier)
            .with_metadata("attemptCount", count)
            .with_metadata("windowSeconds", window.num_seconds()),
        );
        true
    }

    pub fn is_locked(&self, identifier: &str) -> bool {
        self.is_locked_at(identifier, Utc::now())
    }

    pub fn is_locked_at(&self, identifier: &str, now: DateTime<Utc>) -> bool {
        self.retry_after_at(identifier, now).is_some()
    }

    pub fn retry_after(&self, identifier: &str) -> Option<Duration> {
        self.retry_after_at(identifier, Utc::now())
    }

    /// Time left until a locked identifier may try again, `None` when it is
    /// not locked.
    pub fn retry_after_at(&self, identifier: &str, now: DateTime<Utc>) -> Option<Duration> {
        let store = self.lock();
        let record = store.records.get(identifier)?;
        if record.count < self.policy.threshold || !record.within_window(now, self.policy.window)
        {
            return None;
        }
        Some(record.last_attempt + self.policy.window - now)
    }

    /// Forgets an identifier, typically after a successful authentication.
    pub fn clear(&self, identifier: &str) {
        if self.lock().records.remove(identifier).is_some() {
            tracing::debug!(identifier, "Failed attempt record cleared");
        }
    }

    pub fn attempt_count(&self, identifier: &str) -> u32 {
        self.lock()
            .records
            .get(identifier)
            .map(|record| record.count)
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops records whose window has lapsed. Returns how many were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let window = self.policy.window;
        let mut store = self.lock();
        let before = store.records.len();
        store.records.retain(|_, record| record.within_window(now, window));
        store.last_cleanup = now;
        before - store.records.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AttemptStore> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn should_cleanup(
    store_len: usize,
    threshold: usize,
    now: DateTime<Utc>,
    last_cleanup_at: DateTime<Utc>,
    interval: Duration,
) -> bool {
    store_len > threshold || now - last_cleanup_at >= interval
}
