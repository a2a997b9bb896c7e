#![allow(dead_code)]
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bastion_core::{
    config::Config,
    models::{AuditLogEntry, SecurityViolation},
    services::audit_log::{AuditRecorder, SecurityEventSink},
    SecurityCore,
};

pub const ENCRYPTION_SECRET: &str = "an-encryption-secret-of-sufficient-length";
pub const JWT_SECRET: &str = "a-signing-secret-that-is-long-enough-too";

/// Sink that keeps every record it receives for later assertions.
#[derive(Default)]
pub struct RecordingSink {
    audits: Mutex<Vec<AuditLogEntry>>,
    violations: Mutex<Vec<SecurityViolation>>,
}

impl RecordingSink {
    pub fn audits(&self) -> Vec<AuditLogEntry> {
        self.audits.lock().expect("lock audits").clone()
    }

    pub fn violations(&self) -> Vec<SecurityViolation> {
        self.violations.lock().expect("lock violations").clone()
    }
}

#[async_trait]
impl SecurityEventSink for RecordingSink {
    async fn forward_audit(&self, entry: &AuditLogEntry) -> anyhow::Result<()> {
        self.audits.lock().expect("lock audits").push(entry.clone());
        Ok(())
    }

    async fn forward_violation(&self, violation: &SecurityViolation) -> anyhow::Result<()> {
        self.violations
            .lock()
            .expect("lock violations")
            .push(violation.clone());
        Ok(())
    }
}

pub fn config_with(overrides: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = HashMap::from([
        ("ENCRYPTION_SECRET".to_string(), ENCRYPTION_SECRET.to_string()),
        ("JWT_SECRET".to_string(), JWT_SECRET.to_string()),
    ]);
    for (key, value) in overrides {
        vars.insert(key.to_string(), value.to_string());
    }
    Config::from_lookup(|key| vars.get(key).cloned()).expect("test config should load")
}

pub fn test_config() -> Config {
    config_with(&[])
}

pub fn recorder() -> (AuditRecorder, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let (recorder, _worker) = AuditRecorder::spawn(sink.clone(), 256);
    (recorder, sink)
}

pub fn security_core() -> (SecurityCore, Arc<RecordingSink>) {
    security_core_with(test_config())
}

pub fn security_core_with(config: Config) -> (SecurityCore, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let core = SecurityCore::new(config, sink.clone()).expect("security core should build");
    (core, sink)
}
