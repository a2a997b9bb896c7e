//! Fire-and-forget forwarding of audit entries and security violations.
//!
//! Callers enqueue records without awaiting; a single worker task drains the
//! queue into a [`SecurityEventSink`]. Neither a full queue nor a failing sink
//! is ever reported back to the caller.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::models::{AuditLogEntry, SecurityViolation, Severity};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecurityEventSink: Send + Sync {
    async fn forward_audit(&self, entry: &AuditLogEntry) -> anyhow::Result<()>;
    async fn forward_violation(&self, violation: &SecurityViolation) -> anyhow::Result<()>;
}

/// Emits every record as a structured `tracing` event.
#[derive(Debug, Clone, Default)]
pub struct TracingSink;

#[async_trait]
impl SecurityEventSink for TracingSink {
    async fn forward_audit(&self, entry: &AuditLogEntry) -> anyhow::Result<()> {
        let details = entry
            .details
            .as_ref()
            .map(|value| value.to_string())
            .unwrap_or_default();
        tracing::info!(
            target: "bastion::audit",
            id = %entry.id,
            actor = entry.actor_label(),
            action = %entry.action,
            resource = %entry.resource,
            ip = %entry.ip_address,
            user_agent = entry.user_agent.as_deref().unwrap_or(""),
            success = entry.success,
            occurred_at = %entry.occurred_at,
            details = %details,
            "audit"
        );
        Ok(())
    }

    async fn forward_violation(&self, violation: &SecurityViolation) -> anyhow::Result<()> {
        let metadata = serde_json::Value::Object(violation.metadata.clone()).to_string();
        let user_id = violation.user_id.as_deref().unwrap_or("");
        match violation.severity {
            Severity::Low | Severity::Medium => tracing::warn!(
                target: "bastion::violation",
                id = %violation.id,
                kind = %violation.kind,
                severity = %violation.severity,
                ip = %violation.ip_address,
                user_id,
                metadata = %metadata,
                "{}",
                violation.description
            ),
            Severity::High | Severity::Critical => tracing::error!(
                target: "bastion::violation",
                id = %violation.id,
                kind = %violation.kind,
                severity = %violation.severity,
                ip = %violation.ip_address,
                user_id,
                metadata = %metadata,
                "{}",
                violation.description
            ),
        }
        Ok(())
    }
}

/// Posts violations at or above `min_severity` to an alerting webhook.
/// Audit entries are not forwarded.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
    min_severity: Severity,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, min_severity: Severity) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            min_severity,
        })
    }

    pub fn should_alert(&self, violation: &SecurityViolation) -> bool {
        violation.severity >= self.min_severity
    }
}

#[async_trait]
impl SecurityEventSink for WebhookSink {
    async fn forward_audit(&self, _entry: &AuditLogEntry) -> anyhow::Result<()> {
        Ok(())
    }

    async fn forward_violation(&self, violation: &SecurityViolation) -> anyhow::Result<()> {
        if !self.should_alert(violation) {
            return Ok(());
        }
        self.client
            .post(&self.url)
            .json(violation)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Forwards to every inner sink; the first failure is reported after all
/// sinks have been tried.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn SecurityEventSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn SecurityEventSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl SecurityEventSink for FanoutSink {
    async fn forward_audit(&self, entry: &AuditLogEntry) -> anyhow::Result<()> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(err) = sink.forward_audit(entry).await {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn forward_violation(&self, violation: &SecurityViolation) -> anyhow::Result<()> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(err) = sink.forward_violation(violation).await {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

enum Dispatch {
    Audit(AuditLogEntry),
    Violation(SecurityViolation),
    Flush(oneshot::Sender<()>),
    Close,
}

/// Cloneable handle onto the recorder queue.
#[derive(Clone)]
pub struct AuditRecorder {
    sender: mpsc::Sender<Dispatch>,
    dropped: Arc<AtomicU64>,
}

impl AuditRecorder {
    /// Spawns the forwarding worker on the current tokio runtime.
    pub fn spawn(sink: Arc<dyn SecurityEventSink>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(forward_events(receiver, sink));
        (
            Self {
                sender,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            worker,
        )
    }

    pub fn log_audit(&self, entry: AuditLogEntry) {
        self.enqueue(Dispatch::Audit(entry));
    }

    pub fn log_violation(&self, violation: SecurityViolation) {
        self.enqueue(Dispatch::Violation(violation));
    }

    /// Number of records discarded because the queue was full or closed.
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Resolves once every record enqueued before this call was handed to the
    /// sink.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.sender.send(Dispatch::Flush(ack)).await.is_err() {
            return;
        }
        let _ = done.await;
    }

    /// Stops accepting records. The worker forwards what is already queued and
    /// then exits; await its `JoinHandle` to wait for that.
    pub async fn close(&self) {
        let _ = self.sender.send(Dispatch::Close).await;
    }

    fn enqueue(&self, dispatch: Dispatch) {
        match self.sender.try_send(dispatch) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(dropped, "Security event queue full; event dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(dropped, "Security event recorder stopped; event dropped");
            }
        }
    }
}

async fn forward_events(mut receiver: mpsc::Receiver<Dispatch>, sink: Arc<dyn SecurityEventSink>) {
    while let Some(dispatch) = receiver.recv().await {
        match dispatch {
            Dispatch::Audit(entry) => {
                if let Err(err) = sink.forward_audit(&entry).await {
                    tracing::warn!(
                        error = ?err,
                        action = %entry.action,
                        "Failed to forward audit log"
                    );
                }
            }
            Dispatch::Violation(violation) => {
                if let Err(err) = sink.forward_violation(&violation).await {
                    tracing::warn!(
                        error = ?err,
                        kind = %violation.kind,
                        "Failed to forward security violation"
                    );
                }
            }
            Dispatch::Flush(ack) => {
                let _ = ack.send(());
            }
            Dispatch::Close => receiver.close(),
        }
    }
    tracing::debug!("Security event recorder drained");
}
