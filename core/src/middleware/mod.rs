//! axum layers wiring the security core into a router.

pub mod rate_limit;
pub mod request_guard;
pub mod session;

pub use rate_limit::{create_rate_limiter, ClientIpKeyExtractor};
pub use request_guard::screen_request;
pub use session::{require_session, SESSION_COOKIE_NAME, SESSION_HEADER};

use axum::{
    extract::ConnectInfo,
    http::{HeaderMap, Request},
};
use std::net::{IpAddr, SocketAddr};

/// Client address of a request. The socket peer recorded by
/// `into_make_service_with_connect_info` is authoritative. With
/// `trust_proxy_headers` set, the first `x-forwarded-for` hop and then
/// `x-real-ip` take precedence; enable it only behind a proxy that overwrites
/// both headers.
pub fn client_ip<B>(request: &Request<B>, trust_proxy_headers: bool) -> Option<IpAddr> {
    let forwarded = if trust_proxy_headers {
        forwarded_ip(request.headers())
    } else {
        None
    };
    forwarded.or_else(|| {
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
    })
}

fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    if let Some(value) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        return value.split(',').next().and_then(|ip| ip.trim().parse().ok());
    }
    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(|ip| ip.trim().parse().ok())
}

fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|agent| agent.trim().to_string())
        .filter(|agent| !agent.is_empty())
}
