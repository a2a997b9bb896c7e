use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::config::Config;
use crate::models::{
    SecurityViolation, Session, SessionCheck, SessionRejection, Severity, ViolationKind,
};
use crate::services::audit_log::AuditRecorder;
use crate::types::SessionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    pub max_sessions: usize,
    pub idle_timeout: Duration,
    pub absolute_timeout: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            max_sessions: 5,
            idle_timeout: Duration::minutes(30),
            absolute_timeout: Duration::hours(8),
        }
    }
}

impl SessionPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_sessions: config.session_max_concurrent.max(1),
            idle_timeout: config.session_idle_timeout(),
            absolute_timeout: config.session_absolute_timeout(),
        }
    }
}

/// Live sessions keyed by id, bound to the IP they were created from.
///
/// All reads and writes go through one mutex, so eviction and the
/// touch-on-validate update are atomic with respect to concurrent callers.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, Session>>,
    policy: SessionPolicy,
    recorder: AuditRecorder,
}

impl SessionRegistry {
    pub fn new(policy: SessionPolicy, recorder: AuditRecorder) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            policy: SessionPolicy {
                max_sessions: policy.max_sessions.max(1),
                ..policy
            },
            recorder,
        }
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    pub fn create(&self, user_id: &str, ip_address: &str) -> SessionId {
        self.create_at(user_id, ip_address, Utc::now())
    }

    /// Registers a new session. Expired sessions of the same user are dropped
    /// first; if the user is still at the cap, the least recently active
    /// sessions are evicted until the new one fits.
    pub fn create_at(&self, user_id: &str, ip_address: &str, now: DateTime<Utc>) -> SessionId {
        let session = Session::new(user_id.to_string(), ip_address.to_string(), now);
        let session_id = session.session_id;

        let mut sessions = self.lock();
        let idle = self.policy.idle_timeout;
        let absolute = self.policy.absolute_timeout;
        sessions.retain(|_, s| s.user_id != user_id || !s.is_expired(now, idle, absolute));

        loop {
            let owned: Vec<&Session> = sessions.values().filter(|s| s.user_id == user_id).collect();
            if owned.len() < self.policy.max_sessions {
                break;
            }
            let Some(oldest) = owned
                .into_iter()
                .min_by_key(|s| s.last_activity)
                .map(|s| s.session_id)
            else {
                break;
            };
            sessions.remove(&oldest);
            tracing::info!(
                user_id,
                evicted_session = %oldest,
                max_sessions = self.policy.max_sessions,
                "Session cap reached; evicted least recently active session"
            );
        }

        sessions.insert(session_id, session);
        tracing::debug!(user_id, session_id = %session_id, ip = ip_address, "Session created");
        session_id
    }

    pub fn validate(&self, session_id: &SessionId, ip_address: &str) -> SessionCheck {
        self.validate_at(session_id, ip_address, Utc::now())
    }

    pub fn validate_at(
        &self,
        session_id: &SessionId,
        ip_address: &str,
        now: DateTime<Utc>,
    ) -> SessionCheck {
        let mut sessions = self.lock();

        let Some(session) = sessions.get_mut(session_id) else {
            return SessionCheck::Invalid(SessionRejection::NotFound);
        };

        // Mismatch is reported but the session is kept alive.
        if session.ip_address != ip_address {
            let violation = SecurityViolation::new(
                ViolationKind::SuspiciousActivity,
                Severity::Medium,
                ip_address,
                "Session used from an address other than the one it was bound to",
            )
            .with_user(session.user_id.clone())
            .with_metadata("sessionId", session_id.to_string())
            .with_metadata("boundIp", session.ip_address.clone())
            .with_metadata("requestIp", ip_address);
            drop(sessions);
            tracing::warn!(session_id = %session_id, ip = ip_address, "Session IP mismatch");
            self.recorder.log_violation(violation);
            return SessionCheck::Invalid(SessionRejection::IpMismatch);
        }

        if session.is_expired(now, self.policy.idle_timeout, self.policy.absolute_timeout) {
            sessions.remove(session_id);
            tracing::debug!(session_id = %session_id, "Session expired");
            return SessionCheck::Invalid(SessionRejection::Expired);
        }

        session.last_activity = now;
        SessionCheck::Valid {
            user_id: session.user_id.clone(),
        }
    }

    /// Removes one session. Returns whether it existed.
    pub fn terminate(&self, session_id: &SessionId) -> bool {
        let removed = self.lock().remove(session_id).is_some();
        if removed {
            tracing::debug!(session_id = %session_id, "Session terminated");
        }
        removed
    }

    /// Removes every session of `user_id`. Returns how many were removed.
    pub fn terminate_all(&self, user_id: &str) -> usize {
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, s| s.user_id != user_id);
        let removed = before - sessions.len();
        tracing::debug!(user_id, removed, "Terminated all sessions for user");
        removed
    }

    /// Snapshot of a user's sessions, most recently active first.
    pub fn sessions_for_user(&self, user_id: &str) -> Vec<Session> {
        let mut owned: Vec<Session> = self
            .lock()
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        owned
    }

    pub fn get(&self, session_id: &SessionId) -> Option<Session> {
        self.lock().get(session_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every expired session. Returns how many were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.lock();
        let before = sessions.len();
        let idle = self.policy.idle_timeout;
        let absolute = self.policy.absolute_timeout;
        sessions.retain(|_, s| !s.is_expired(now, idle, absolute));
        before - sessions.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SessionId, Session>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }
}
