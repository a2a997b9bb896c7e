use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::error::SecurityError;
use crate::models::{SecurityViolation, Severity, ViolationKind};
use crate::state::SecurityCore;

use super::{client_ip, user_agent};

const UNKNOWN_IP: &str = "unknown";

/// Rejects requests the inspector flags with a bare 403. The findings go to
/// the recorder, never to the client.
pub async fn screen_request(
    State(core): State<SecurityCore>,
    request: Request,
    next: Next,
) -> Result<Response, SecurityError> {
    let url = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let report = core.inspector.inspect(&url, request.headers());
    if report.is_valid {
        return Ok(next.run(request).await);
    }

    let ip = client_ip(&request, core.config.trust_proxy_headers)
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| UNKNOWN_IP.to_string());
    tracing::warn!(
        ip = %ip,
        method = %request.method(),
        path = %request.uri().path(),
        findings = report.violations.len(),
        "Request rejected by inspection"
    );

    let mut violation = SecurityViolation::new(
        ViolationKind::SuspiciousActivity,
        Severity::Medium,
        ip,
        "Request flagged by inspection",
    )
    .with_metadata("method", request.method().as_str())
    .with_metadata("url", url)
    .with_metadata("findings", report.violations);
    if let Some(agent) = user_agent(request.headers()) {
        violation = violation.with_metadata("userAgent", agent);
    }
    core.recorder.log_violation(violation);

    Err(SecurityError::Forbidden)
}
