use chrono::Utc;
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::error::SecurityError;
use crate::models::{AuditLogEntry, SessionCheck, Severity};
use crate::services::audit_log::{
    AuditRecorder, FanoutSink, SecurityEventSink, TracingSink, WebhookSink,
};
use crate::services::lockout::{LockoutPolicy, LockoutTracker};
use crate::services::session::{SessionPolicy, SessionRegistry};
use crate::types::SessionId;
use crate::utils::encryption::Cipher;
use crate::utils::jwt::{TokenClaims, TokenIssuer, TokenPair};
use crate::utils::password::CredentialHasher;
use crate::validation::RequestInspector;

/// Stored credentials of the account a login names. `None` on the attempt
/// means no such account exists.
#[derive(Debug, Clone)]
pub struct StoredCredential {
    pub user_id: String,
    pub password_hash: String,
}

#[derive(Debug, Clone)]
pub struct LoginAttempt {
    /// Lockout key, usually the submitted username or email.
    pub identifier: String,
    pub ip_address: String,
    pub user_agent: Option<String>,
    pub password: String,
    pub credential: Option<StoredCredential>,
    /// Extra claims for the access token.
    pub claims: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct LoginSuccess {
    pub user_id: String,
    pub session_id: SessionId,
    pub tokens: TokenPair,
}

/// Identity attached to a request once both its access token and its session
/// have been accepted.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub session_id: SessionId,
    pub claims: TokenClaims,
}

/// Every security component behind one cloneable handle.
#[derive(Clone)]
pub struct SecurityCore {
    pub config: Arc<Config>,
    pub cipher: Arc<Cipher>,
    pub hasher: Arc<CredentialHasher>,
    pub tokens: Arc<TokenIssuer>,
    pub sessions: Arc<SessionRegistry>,
    pub lockout: Arc<LockoutTracker>,
    pub inspector: Arc<RequestInspector>,
    pub recorder: AuditRecorder,
    recorder_worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SecurityCore {
    /// Builds the core around `sink`. Spawns the recorder worker, so this
    /// must run inside a tokio runtime.
    pub fn new(config: Config, sink: Arc<dyn SecurityEventSink>) -> Result<Self, SecurityError> {
        config.validate()?;

        let cipher = Cipher::from_config(&config)?;
        let hasher = CredentialHasher::from_config(&config)?;
        let tokens = TokenIssuer::from_config(&config)?;
        let (recorder, worker) = AuditRecorder::spawn(sink, config.audit_queue_capacity);
        let sessions = SessionRegistry::new(SessionPolicy::from_config(&config), recorder.clone());
        let lockout = LockoutTracker::new(LockoutPolicy::from_config(&config), recorder.clone());

        Ok(Self {
            config: Arc::new(config),
            cipher: Arc::new(cipher),
            hasher: Arc::new(hasher),
            tokens: Arc::new(tokens),
            sessions: Arc::new(sessions),
            lockout: Arc::new(lockout),
            inspector: Arc::new(RequestInspector::new()),
            recorder,
            recorder_worker: Arc::new(Mutex::new(Some(worker))),
        })
    }

    /// Logs every record through `tracing` and, when `alert_webhook_url` is
    /// set, also posts high and critical violations to it.
    pub fn from_config_with_default_sinks(config: Config) -> Result<Self, SecurityError> {
        let tracing_sink: Arc<dyn SecurityEventSink> = Arc::new(TracingSink);
        let sink: Arc<dyn SecurityEventSink> = match config.alert_webhook_url.as_deref() {
            Some(url) => {
                let webhook: Arc<dyn SecurityEventSink> = Arc::new(
                    WebhookSink::new(url, Severity::High).map_err(|e| {
                        SecurityError::Configuration(format!("failed to build alert webhook: {e}"))
                    })?,
                );
                Arc::new(FanoutSink::new(vec![tracing_sink, webhook]))
            }
            None => tracing_sink,
        };
        Self::new(config, sink)
    }

    pub async fn login(&self, attempt: LoginAttempt) -> Result<LoginSuccess, SecurityError> {
        let LoginAttempt {
            identifier,
            ip_address,
            user_agent,
            password,
            credential,
            claims,
        } = attempt;

        let audit = |success: bool| {
            AuditLogEntry::new("login", "session", ip_address.clone(), success)
                .with_actor(identifier.clone())
                .with_user_agent(user_agent.clone())
        };

        if let Some(remaining) = self.lockout.retry_after(&identifier) {
            let retry_after_secs = remaining.num_seconds().max(1) as u64;
            self.recorder.log_audit(audit(false).with_details(json!({
                "reason": "locked",
                "retryAfterSecs": retry_after_secs,
            })));
            return Err(SecurityError::Locked { retry_after_secs });
        }

        let verified = match &credential {
            Some(stored) => {
                let hasher = Arc::clone(&self.hasher);
                let digest = stored.password_hash.clone();
                tokio::task::spawn_blocking(move || hasher.verify(&password, &digest))
                    .await
                    .map_err(|e| {
                        SecurityError::Credential(format!("password verification task failed: {e}"))
                    })??
            }
            None => false,
        };

        let stored = match credential {
            Some(stored) if verified => stored,
            _ => {
                let locked = self.lockout.record_failure_from(&identifier, &ip_address);
                self.recorder.log_audit(audit(false).with_details(json!({
                    "reason": "invalid_credentials",
                    "locked": locked,
                })));
                return Err(SecurityError::InvalidCredentials);
            }
        };

        self.lockout.clear(&identifier);
        let tokens = self.tokens.issue_token_pair(&stored.user_id, claims)?;
        let session_id = self.sessions.create(&stored.user_id, &ip_address);
        self.recorder.log_audit(
            audit(true).with_details(json!({
                "userId": stored.user_id,
                "sessionId": session_id.to_string(),
            })),
        );
        tracing::info!(user_id = %stored.user_id, session_id = %session_id, "Login succeeded");

        Ok(LoginSuccess {
            user_id: stored.user_id,
            session_id,
            tokens,
        })
    }

    pub fn refresh(
        &self,
        refresh_token: &str,
        claims: Map<String, Value>,
    ) -> Result<TokenPair, SecurityError> {
        self.tokens.refresh(refresh_token, claims)
    }

    /// Terminates a session. Returns whether it was still live.
    pub fn logout(&self, session_id: &SessionId, ip_address: &str) -> bool {
        let owner = self.sessions.get(session_id).map(|session| session.user_id);
        let terminated = self.sessions.terminate(session_id);

        let mut entry = AuditLogEntry::new("logout", "session", ip_address, terminated)
            .with_details(json!({ "sessionId": session_id.to_string() }));
        if let Some(user_id) = owner {
            entry = entry.with_actor(user_id);
        }
        self.recorder.log_audit(entry);
        terminated
    }

    /// Accepts a request only when the access token is valid, the session is
    /// live for `ip_address`, and both name the same user.
    pub fn authenticate(
        &self,
        access_token: &str,
        session_id: &SessionId,
        ip_address: &str,
    ) -> Result<AuthenticatedUser, SecurityError> {
        let claims = self.tokens.verify_access(access_token)?;

        let user_id = match self.sessions.validate(session_id, ip_address) {
            SessionCheck::Valid { user_id } => user_id,
            SessionCheck::Invalid(reason) => {
                tracing::debug!(session_id = %session_id, %reason, "Session rejected");
                return Err(SecurityError::Unauthorized);
            }
        };

        if user_id != claims.sub {
            tracing::warn!(
                session_id = %session_id,
                token_subject = %claims.sub,
                "Access token does not belong to the session owner"
            );
            return Err(SecurityError::Unauthorized);
        }

        Ok(AuthenticatedUser {
            user_id,
            session_id: *session_id,
            claims,
        })
    }

    /// Periodically purges expired sessions and stale lockout records.
    pub fn spawn_maintenance(&self, interval: Duration) -> MaintenanceHandle {
        let sessions = self.sessions.clone();
        let lockout = self.lockout.clone();
        let (stop, mut stopped) = oneshot::channel::<()>();
        let period = interval.max(Duration::from_millis(1));

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = ticker.tick() => {
                        let now = Utc::now();
                        let expired_sessions = sessions.purge_expired(now);
                        let stale_records = lockout.purge_expired(now);
                        if expired_sessions > 0 || stale_records > 0 {
                            tracing::debug!(
                                expired_sessions,
                                stale_records,
                                "Security state maintenance sweep"
                            );
                        }
                    }
                }
            }
        });

        MaintenanceHandle {
            stop: Some(stop),
            task,
        }
    }

    /// Forwards every queued audit entry and violation, then stops the
    /// recorder worker. Records logged afterwards are counted as dropped.
    pub async fn shutdown(&self) {
        self.recorder.close().await;
        let worker = self
            .recorder_worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(worker) = worker {
            if let Err(err) = worker.await {
                tracing::warn!(error = %err, "Security event recorder ended abnormally");
            }
        }
    }
}

pub struct MaintenanceHandle {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl MaintenanceHandle {
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(err) = (&mut self.task).await {
            tracing::warn!(error = %err, "Maintenance task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::audit_log::MockSecurityEventSink;
    use std::collections::HashMap;

    fn config() -> Config {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("ENCRYPTION_SECRET", "an-encryption-secret-of-sufficient-length"),
            ("JWT_SECRET", "a-signing-secret-that-is-long-enough-too"),
        ]);
        Config::from_lookup(|key| vars.get(key).map(|v| v.to_string())).expect("config")
    }

    fn quiet_sink() -> Arc<dyn SecurityEventSink> {
        let mut sink = MockSecurityEventSink::new();
        sink.expect_forward_audit().returning(|_| Ok(()));
        sink.expect_forward_violation().returning(|_| Ok(()));
        Arc::new(sink)
    }

    fn attempt(core: &SecurityCore, password: &str) -> LoginAttempt {
        LoginAttempt {
            identifier: "alice@example.com".to_string(),
            ip_address: "10.0.0.1".to_string(),
            user_agent: Some("test-agent".to_string()),
            password: password.to_string(),
            credential: Some(StoredCredential {
                user_id: "user-1".to_string(),
                password_hash: core.hasher.hash("Correct-Horse#42").expect("hash"),
            }),
            claims: Map::new(),
        }
    }

    #[tokio::test]
    async fn login_issues_tokens_and_session() {
        let core = SecurityCore::new(config(), quiet_sink()).expect("core");
        let success = core
            .login(attempt(&core, "Correct-Horse#42"))
            .await
            .expect("login");

        let user = core
            .authenticate(&success.tokens.access_token, &success.session_id, "10.0.0.1")
            .expect("authenticate");
        assert_eq!(user.user_id, "user-1");
        core.shutdown().await;
    }

    #[tokio::test]
    async fn wrong_password_is_counted() {
        let core = SecurityCore::new(config(), quiet_sink()).expect("core");
        let result = core.login(attempt(&core, "wrong")).await;
        assert!(matches!(result, Err(SecurityError::InvalidCredentials)));
        assert_eq!(core.lockout.attempt_count("alice@example.com"), 1);
    }

    #[tokio::test]
    async fn logout_ends_the_session() {
        let core = SecurityCore::new(config(), quiet_sink()).expect("core");
        let success = core
            .login(attempt(&core, "Correct-Horse#42"))
            .await
            .expect("login");
        assert!(core.logout(&success.session_id, "10.0.0.1"));
        assert!(!core.logout(&success.session_id, "10.0.0.1"));
        assert!(core
            .authenticate(&success.tokens.access_token, &success.session_id, "10.0.0.1")
            .is_err());
    }

    #[tokio::test]
    async fn shutdown_joins_recorder_worker() {
        let core = SecurityCore::new(config(), quiet_sink()).expect("core");
        core.login(attempt(&core, "wrong")).await.ok();
        core.shutdown().await;
        assert!(core.recorder_worker.lock().unwrap().is_none());

        let dropped = core.recorder.dropped_events();
        core.logout(&SessionId::new(), "10.0.0.1");
        assert_eq!(core.recorder.dropped_events(), dropped + 1);

        // A second shutdown is a no-op.
        core.shutdown().await;
    }

    #[tokio::test]
    async fn maintenance_stops_on_shutdown() {
        let core = SecurityCore::new(config(), quiet_sink()).expect("core");
        let handle = core.spawn_maintenance(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!handle.is_finished());
        handle.shutdown().await;
    }
}
