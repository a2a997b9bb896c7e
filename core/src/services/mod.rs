pub mod audit_log;
pub mod lockout;
pub mod session;

pub use audit_log::{AuditRecorder, FanoutSink, SecurityEventSink, TracingSink, WebhookSink};
pub use lockout::{LockoutPolicy, LockoutTracker};
pub use session::{SessionPolicy, SessionRegistry};
