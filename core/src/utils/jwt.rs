use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

use crate::config::Config;
use crate::error::SecurityError;

const RESERVED_CLAIMS: [&str; 5] = ["sub", "type", "iat", "exp", "jti"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String, // user_id
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub exp: i64,    // expiration time
    pub iat: i64,    // issued at
    pub jti: String, // JWT ID
    /// Caller-supplied claims, carried by access tokens only.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TokenClaims {
    fn new(
        user_id: &str,
        token_type: TokenType,
        extra: Map<String, Value>,
        lifetime: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        let exp = now + lifetime;

        Self {
            sub: user_id.to_string(),
            token_type,
            exp: exp.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
            extra,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Signs and verifies HS256 access/refresh tokens. Holds no per-token state:
/// a token stays valid until it expires.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_lifetime: Duration,
    refresh_lifetime: Duration,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("access_lifetime", &self.access_lifetime)
            .field("refresh_lifetime", &self.refresh_lifetime)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    pub fn new(
        secret: &str,
        access_lifetime: Duration,
        refresh_lifetime: Duration,
    ) -> Result<Self, SecurityError> {
        if secret.is_empty() {
            return Err(SecurityError::Configuration(
                "token signing secret must not be empty".into(),
            ));
        }
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_lifetime,
            refresh_lifetime,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, SecurityError> {
        Self::new(
            &config.jwt_secret,
            config.access_token_lifetime(),
            config.refresh_token_lifetime(),
        )
    }

    pub fn issue_token_pair(
        &self,
        user_id: &str,
        claims: Map<String, Value>,
    ) -> Result<TokenPair, SecurityError> {
        self.issue_token_pair_at(user_id, claims, Utc::now())
    }

    pub fn issue_token_pair_at(
        &self,
        user_id: &str,
        mut claims: Map<String, Value>,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, SecurityError> {
        for reserved in RESERVED_CLAIMS {
            claims.remove(reserved);
        }

        let access = TokenClaims::new(user_id, TokenType::Access, claims, self.access_lifetime, now);
        let refresh = TokenClaims::new(
            user_id,
            TokenType::Refresh,
            Map::new(),
            self.refresh_lifetime,
            now,
        );

        Ok(TokenPair {
            access_token: self.sign(&access)?,
            refresh_token: self.sign(&refresh)?,
        })
    }

    /// Checks signature and expiry. Every failure is reported as the same
    /// `InvalidToken` so callers cannot probe which check failed.
    pub fn verify(&self, token: &str) -> Result<TokenClaims, SecurityError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        decode::<TokenClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|err| {
                tracing::debug!(error = %err, "Token verification failed");
                SecurityError::InvalidToken
            })
    }

    pub fn verify_access(&self, token: &str) -> Result<TokenClaims, SecurityError> {
        self.verify_typed(token, TokenType::Access)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<TokenClaims, SecurityError> {
        self.verify_typed(token, TokenType::Refresh)
    }

    /// Mints a fresh pair from a refresh token. The refresh token itself is
    /// not revoked; callers needing rotation must track its `jti`.
    pub fn refresh(
        &self,
        refresh_token: &str,
        claims: Map<String, Value>,
    ) -> Result<TokenPair, SecurityError> {
        let refresh_claims = self.verify_refresh(refresh_token)?;
        self.issue_token_pair(&refresh_claims.sub, claims)
    }

    fn verify_typed(&self, token: &str, expected: TokenType) -> Result<TokenClaims, SecurityError> {
        let claims = self.verify(token)?;
        if claims.token_type != expected {
            return Err(SecurityError::InvalidToken);
        }
        Ok(claims)
    }

    fn sign(&self, claims: &TokenClaims) -> Result<String, SecurityError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| SecurityError::Credential(format!("failed to sign token: {e}")))
    }
}
