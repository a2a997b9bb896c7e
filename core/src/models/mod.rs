//! Records produced and owned by the security core.

pub mod audit_log;
pub mod failed_attempt;
pub mod session;
pub mod violation;

pub use audit_log::AuditLogEntry;
pub use failed_attempt::FailedAttemptRecord;
pub use session::{Session, SessionCheck, SessionRejection};
pub use violation::{SecurityViolation, Severity, ViolationKind};
