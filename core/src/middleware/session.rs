use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::str::FromStr;

use crate::error::SecurityError;
use crate::state::SecurityCore;
use crate::types::SessionId;

use super::client_ip;

pub const SESSION_HEADER: &str = "x-session-id";
pub const SESSION_COOKIE_NAME: &str = "session_id";

/// Requires a Bearer access token plus a live session owned by the same
/// user. On success the request carries an
/// [`AuthenticatedUser`](crate::state::AuthenticatedUser) extension.
pub async fn require_session(
    State(core): State<SecurityCore>,
    mut request: Request,
    next: Next,
) -> Result<Response, SecurityError> {
    let token = bearer_token(request.headers()).ok_or(SecurityError::Unauthorized)?;
    let session_id = session_id(request.headers()).ok_or(SecurityError::Unauthorized)?;
    let ip = client_ip(&request, core.config.trust_proxy_headers).ok_or_else(|| {
        tracing::debug!("Unable to determine client address for session check");
        SecurityError::Unauthorized
    })?;

    let user = core.authenticate(&token, &session_id, &ip.to_string())?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, rest) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = rest.trim();
    (!token.is_empty()).then(|| token.to_string())
}

fn session_id(headers: &HeaderMap) -> Option<SessionId> {
    let raw = headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .or_else(|| {
            headers
                .get(header::COOKIE)
                .and_then(|value| value.to_str().ok())
                .and_then(|cookies| extract_cookie_value(cookies, SESSION_COOKIE_NAME))
        })?;
    SessionId::from_str(&raw).ok()
}

fn extract_cookie_value(header: &str, name: &str) -> Option<String> {
    header.split(';').map(str::trim).find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key.trim() == name).then(|| value.trim().to_string())
    })
}
