use axum::body::Body;
use axum::http::{header::CONTENT_TYPE, HeaderValue, Request, Response, StatusCode};
use governor::middleware::StateInformationMiddleware;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::KeyExtractor, GovernorError, GovernorLayer,
};

use crate::config::Config;
use crate::error::SecurityError;

use super::client_ip;

/// Keys the limiter by the same address [`client_ip`] resolves, so forwarded
/// headers only count when `trust_proxy_headers` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIpKeyExtractor {
    pub trust_proxy_headers: bool,
}

impl KeyExtractor for ClientIpKeyExtractor {
    type Key = IpAddr;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        client_ip(req, self.trust_proxy_headers).ok_or(GovernorError::UnableToExtractKey)
    }
}

/// Per-client-IP limiter allowing `rate_limit_max_requests` per
/// `rate_limit_window_seconds`. Quota replenishes evenly across the window.
pub fn create_rate_limiter(
    config: &Config,
) -> Result<GovernorLayer<ClientIpKeyExtractor, StateInformationMiddleware, Body>, SecurityError>
{
    let burst_size = config.rate_limit_max_requests.max(1);
    let window = Duration::from_secs(config.rate_limit_window_seconds.max(1));
    let replenish = (window / burst_size).max(Duration::from_millis(1));

    let governor_conf = GovernorConfigBuilder::default()
        .period(replenish)
        .burst_size(burst_size)
        .key_extractor(ClientIpKeyExtractor {
            trust_proxy_headers: config.trust_proxy_headers,
        })
        .use_headers()
        .finish()
        .ok_or_else(|| {
            SecurityError::Configuration("rate limiter parameters are invalid".into())
        })?;

    Ok(GovernorLayer::new(Arc::new(governor_conf)).error_handler(rate_limit_error_handler))
}

fn rate_limit_error_handler(error: GovernorError) -> Response<Body> {
    match error {
        GovernorError::TooManyRequests { wait_time, headers } => {
            tracing::warn!(wait_time, "Rate limit exceeded");
            let mut response = json_error_response(
                StatusCode::TOO_MANY_REQUESTS,
                "Too many requests. Please try again later.",
                "RATE_LIMITED",
                Some(wait_time),
            );
            if let Some(headers) = headers {
                response.headers_mut().extend(headers);
            }
            response
        }
        GovernorError::UnableToExtractKey => {
            tracing::warn!("Rate limiter could not determine client address");
            json_error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                "INTERNAL_SERVER_ERROR",
                None,
            )
        }
        GovernorError::Other { code, msg, headers } => {
            let mut response = json_error_response(
                code,
                &msg.unwrap_or_else(|| "Rate limit error".to_string()),
                "RATE_LIMIT_ERROR",
                None,
            );
            if let Some(headers) = headers {
                response.headers_mut().extend(headers);
            }
            response
        }
    }
}

/// Same body shape as [`crate::error::ErrorResponse`].
fn json_error_response(
    status: StatusCode,
    error: &str,
    code: &str,
    retry_after: Option<u64>,
) -> Response<Body> {
    let body = serde_json::json!({
        "error": error,
        "code": code,
    });

    let mut response = Response::new(Body::from(body.to_string()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(retry_after) = retry_after {
        if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
            response.headers_mut().insert("retry-after", value);
        }
    }
    response
}
