use axum::{
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Failures surfaced by the security core.
///
/// Variants deliberately carry no detail an attacker could use: a tampered
/// ciphertext and a wrong key both become `Decryption`, and every token
/// problem becomes `InvalidToken`.
#[derive(Debug, thiserror::Error)]
pub enum SecurityError {
    #[error("decryption failed")]
    Decryption,
    #[error("invalid token")]
    InvalidToken,
    #[error("credential backend error: {0}")]
    Credential(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("identifier is locked out")]
    Locked { retry_after_secs: u64 },
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
}

impl IntoResponse for SecurityError {
    fn into_response(self) -> Response {
        let (status, error_message, code) = match &self {
            SecurityError::InvalidToken
            | SecurityError::InvalidCredentials
            | SecurityError::Unauthorized => {
                (StatusCode::UNAUTHORIZED, "Unauthorized", "UNAUTHORIZED")
            }
            SecurityError::Decryption | SecurityError::Forbidden => {
                (StatusCode::FORBIDDEN, "Forbidden", "FORBIDDEN")
            }
            SecurityError::Locked { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many failed attempts. Please try again later.",
                "LOCKED",
            ),
            SecurityError::Credential(_) | SecurityError::Configuration(_) => {
                tracing::error!(error = %self, "Internal security error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                    "INTERNAL_SERVER_ERROR",
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_message.to_string(),
            code: code.to_string(),
        });

        let mut response = (status, body).into_response();
        if let SecurityError::Locked { retry_after_secs } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.max(1).to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn response_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("json")
    }

    #[tokio::test]
    async fn token_and_credential_failures_collapse_to_unauthorized() {
        for err in [
            SecurityError::InvalidToken,
            SecurityError::InvalidCredentials,
            SecurityError::Unauthorized,
        ] {
            let response = err.into_response();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            let json = response_json(response).await;
            assert_eq!(json["error"], "Unauthorized");
            assert_eq!(json["code"], "UNAUTHORIZED");
        }
    }

    #[tokio::test]
    async fn decryption_failure_maps_to_forbidden() {
        let response = SecurityError::Decryption.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let json = response_json(response).await;
        assert_eq!(json["code"], "FORBIDDEN");
    }

    #[tokio::test]
    async fn internal_errors_hide_details() {
        let response =
            SecurityError::Configuration("JWT_SECRET is missing".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = response_json(response).await;
        assert_eq!(json["error"], "Internal server error");
        assert!(!json.to_string().contains("JWT_SECRET"));
    }

    #[tokio::test]
    async fn locked_sets_retry_after() {
        let response = SecurityError::Locked {
            retry_after_secs: 42,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok()),
            Some("42")
        );
    }
}
