use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

use crate::error::SecurityError;

pub const SUPPORTED_ENCRYPTION_ALGORITHM: &str = "aes-256-gcm";
const MIN_SECRET_LENGTH: usize = 32;

const MAX_ACCESS_TOKEN_MINUTES: u64 = 24 * 60;
const MAX_REFRESH_TOKEN_DAYS: u64 = 365;
const MAX_IDLE_TIMEOUT_MINUTES: u64 = 7 * 24 * 60;
const MAX_ABSOLUTE_TIMEOUT_HOURS: u64 = 365 * 24;
const MAX_LOCKOUT_WINDOW_MINUTES: u64 = 30 * 24 * 60;
const MAX_RATE_LIMIT_WINDOW_SECONDS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub encryption_algorithm: String,
    pub encryption_key_length: usize,
    pub encryption_iv_length: usize,
    pub encryption_secret: String,
    pub jwt_secret: String,
    pub jwt_access_expiration_minutes: u64,
    pub jwt_refresh_expiration_days: u64,
    pub password_min_length: usize,
    pub password_require_uppercase: bool,
    pub password_require_lowercase: bool,
    pub password_require_numbers: bool,
    pub password_require_symbols: bool,
    pub password_max_age_days: u32,
    pub session_max_concurrent: usize,
    pub session_idle_timeout_minutes: u64,
    pub session_absolute_timeout_hours: u64,
    pub account_lockout_threshold: u32,
    pub account_lockout_window_minutes: u64,
    pub rate_limit_window_seconds: u64,
    pub rate_limit_max_requests: u32,
    pub trust_proxy_headers: bool,
    pub audit_queue_capacity: usize,
    pub alert_webhook_url: Option<String>,
}

impl Config {
    /// Reads configuration from the process environment, after loading `.env`
    /// if one is present.
    pub fn load() -> Result<Self, SecurityError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup. Secrets are
    /// mandatory; every other value falls back to its default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SecurityError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| SecurityError::Configuration(format!("{key} is not set")))
        };

        let config = Config {
            encryption_algorithm: lookup("ENCRYPTION_ALGORITHM")
                .unwrap_or_else(|| SUPPORTED_ENCRYPTION_ALGORITHM.to_string()),
            encryption_key_length: parse_or(&lookup, "ENCRYPTION_KEY_LENGTH", 32)?,
            encryption_iv_length: parse_or(&lookup, "ENCRYPTION_IV_LENGTH", 12)?,
            encryption_secret: required("ENCRYPTION_SECRET")?,
            jwt_secret: required("JWT_SECRET")?,
            jwt_access_expiration_minutes: parse_or(&lookup, "JWT_ACCESS_EXPIRATION_MINUTES", 15)?,
            jwt_refresh_expiration_days: parse_or(&lookup, "JWT_REFRESH_EXPIRATION_DAYS", 7)?,
            password_min_length: parse_or(&lookup, "PASSWORD_MIN_LENGTH", 12)?,
            password_require_uppercase: parse_or(&lookup, "PASSWORD_REQUIRE_UPPERCASE", true)?,
            password_require_lowercase: parse_or(&lookup, "PASSWORD_REQUIRE_LOWERCASE", true)?,
            password_require_numbers: parse_or(&lookup, "PASSWORD_REQUIRE_NUMBERS", true)?,
            password_require_symbols: parse_or(&lookup, "PASSWORD_REQUIRE_SYMBOLS", true)?,
            password_max_age_days: parse_or(&lookup, "PASSWORD_MAX_AGE_DAYS", 90)?,
            session_max_concurrent: parse_or(&lookup, "SESSION_MAX_CONCURRENT", 5)?,
            session_idle_timeout_minutes: parse_or(&lookup, "SESSION_IDLE_TIMEOUT_MINUTES", 30)?,
            session_absolute_timeout_hours: parse_or(&lookup, "SESSION_ABSOLUTE_TIMEOUT_HOURS", 8)?,
            account_lockout_threshold: parse_or(&lookup, "ACCOUNT_LOCKOUT_THRESHOLD", 5)?,
            account_lockout_window_minutes: parse_or(&lookup, "ACCOUNT_LOCKOUT_WINDOW_MINUTES", 15)?,
            rate_limit_window_seconds: parse_or(&lookup, "RATE_LIMIT_WINDOW_SECONDS", 900)?,
            rate_limit_max_requests: parse_or(&lookup, "RATE_LIMIT_MAX_REQUESTS", 100)?,
            trust_proxy_headers: parse_or(&lookup, "TRUST_PROXY_HEADERS", false)?,
            audit_queue_capacity: parse_or(&lookup, "AUDIT_QUEUE_CAPACITY", 1024)?,
            alert_webhook_url: lookup("ALERT_WEBHOOK_URL").filter(|url| !url.trim().is_empty()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations the core cannot run with.
    pub fn validate(&self) -> Result<(), SecurityError> {
        if !self
            .encryption_algorithm
            .eq_ignore_ascii_case(SUPPORTED_ENCRYPTION_ALGORITHM)
        {
            return Err(SecurityError::Configuration(format!(
                "unsupported encryption algorithm: {}",
                self.encryption_algorithm
            )));
        }
        if self.encryption_key_length != 32 {
            return Err(SecurityError::Configuration(
                "ENCRYPTION_KEY_LENGTH must be 32 for aes-256-gcm".into(),
            ));
        }
        if self.encryption_iv_length != 12 {
            return Err(SecurityError::Configuration(
                "ENCRYPTION_IV_LENGTH must be 12 for aes-256-gcm".into(),
            ));
        }
        if self.encryption_secret.len() < MIN_SECRET_LENGTH {
            return Err(SecurityError::Configuration(format!(
                "ENCRYPTION_SECRET must be at least {MIN_SECRET_LENGTH} characters"
            )));
        }
        if self.jwt_secret.len() < MIN_SECRET_LENGTH {
            return Err(SecurityError::Configuration(format!(
                "JWT_SECRET must be at least {MIN_SECRET_LENGTH} characters"
            )));
        }
        check_range(
            "JWT_ACCESS_EXPIRATION_MINUTES",
            self.jwt_access_expiration_minutes,
            MAX_ACCESS_TOKEN_MINUTES,
        )?;
        check_range(
            "JWT_REFRESH_EXPIRATION_DAYS",
            self.jwt_refresh_expiration_days,
            MAX_REFRESH_TOKEN_DAYS,
        )?;
        if self.session_max_concurrent == 0 {
            return Err(SecurityError::Configuration(
                "SESSION_MAX_CONCURRENT must be at least 1".into(),
            ));
        }
        check_range(
            "SESSION_IDLE_TIMEOUT_MINUTES",
            self.session_idle_timeout_minutes,
            MAX_IDLE_TIMEOUT_MINUTES,
        )?;
        check_range(
            "SESSION_ABSOLUTE_TIMEOUT_HOURS",
            self.session_absolute_timeout_hours,
            MAX_ABSOLUTE_TIMEOUT_HOURS,
        )?;
        if self.account_lockout_threshold == 0 {
            return Err(SecurityError::Configuration(
                "ACCOUNT_LOCKOUT_THRESHOLD must be at least 1".into(),
            ));
        }
        check_range(
            "ACCOUNT_LOCKOUT_WINDOW_MINUTES",
            self.account_lockout_window_minutes,
            MAX_LOCKOUT_WINDOW_MINUTES,
        )?;
        check_range(
            "RATE_LIMIT_WINDOW_SECONDS",
            self.rate_limit_window_seconds,
            MAX_RATE_LIMIT_WINDOW_SECONDS,
        )?;
        if self.audit_queue_capacity == 0 {
            return Err(SecurityError::Configuration(
                "AUDIT_QUEUE_CAPACITY must be at least 1".into(),
            ));
        }
        Ok(())
    }

    // Every value below is bounded by `validate`, so the i64 casts are exact.
    pub fn access_token_lifetime(&self) -> Duration {
        Duration::minutes(self.jwt_access_expiration_minutes as i64)
    }

    pub fn refresh_token_lifetime(&self) -> Duration {
        Duration::days(self.jwt_refresh_expiration_days as i64)
    }

    pub fn session_idle_timeout(&self) -> Duration {
        Duration::minutes(self.session_idle_timeout_minutes as i64)
    }

    pub fn session_absolute_timeout(&self) -> Duration {
        Duration::hours(self.session_absolute_timeout_hours as i64)
    }

    pub fn lockout_window(&self) -> Duration {
        Duration::minutes(self.account_lockout_window_minutes as i64)
    }
}

fn check_range(key: &str, value: u64, max: u64) -> Result<(), SecurityError> {
    if value == 0 || value > max {
        return Err(SecurityError::Configuration(format!(
            "{key} must be between 1 and {max}, got {value}"
        )));
    }
    Ok(())
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, SecurityError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| SecurityError::Configuration(format!("Invalid {key} value: {raw}"))),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const SECRETS: [(&str, &str); 2] = [
        ("ENCRYPTION_SECRET", "an-encryption-secret-of-sufficient-length"),
        ("JWT_SECRET", "a-signing-secret-that-is-long-enough-too"),
    ];

    #[test]
    fn defaults_apply_when_only_secrets_are_set() {
        let config = Config::from_lookup(lookup_from(&SECRETS)).expect("config");
        assert_eq!(config.jwt_access_expiration_minutes, 15);
        assert_eq!(config.jwt_refresh_expiration_days, 7);
        assert_eq!(config.password_min_length, 12);
        assert_eq!(config.session_max_concurrent, 5);
        assert_eq!(config.session_idle_timeout_minutes, 30);
        assert_eq!(config.session_absolute_timeout_hours, 8);
        assert_eq!(config.account_lockout_threshold, 5);
        assert_eq!(config.account_lockout_window_minutes, 15);
        assert!(config.alert_webhook_url.is_none());
        assert!(!config.trust_proxy_headers);
    }

    #[test]
    fn missing_secret_fails_fast() {
        let result = Config::from_lookup(lookup_from(&SECRETS[..1]));
        assert!(matches!(result, Err(SecurityError::Configuration(msg)) if msg.contains("JWT_SECRET")));
    }

    #[test]
    fn short_secret_is_rejected() {
        let result = Config::from_lookup(lookup_from(&[
            ("ENCRYPTION_SECRET", "short"),
            SECRETS[1],
        ]));
        assert!(matches!(result, Err(SecurityError::Configuration(_))));
    }

    #[test]
    fn unparsable_number_is_rejected() {
        let result = Config::from_lookup(lookup_from(&[
            SECRETS[0],
            SECRETS[1],
            ("SESSION_MAX_CONCURRENT", "many"),
        ]));
        assert!(
            matches!(result, Err(SecurityError::Configuration(msg)) if msg.contains("SESSION_MAX_CONCURRENT"))
        );
    }

    #[test]
    fn unsupported_algorithm_is_rejected() {
        let result = Config::from_lookup(lookup_from(&[
            SECRETS[0],
            SECRETS[1],
            ("ENCRYPTION_ALGORITHM", "aes-128-cbc"),
        ]));
        assert!(matches!(result, Err(SecurityError::Configuration(_))));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup_from(&[
            SECRETS[0],
            SECRETS[1],
            ("PASSWORD_REQUIRE_SYMBOLS", "false"),
            ("SESSION_IDLE_TIMEOUT_MINUTES", "10"),
        ]))
        .expect("config");
        assert!(!config.password_require_symbols);
        assert_eq!(config.session_idle_timeout(), Duration::minutes(10));
    }

    #[test]
    fn oversized_duration_is_rejected() {
        let result = Config::from_lookup(lookup_from(&[
            SECRETS[0],
            SECRETS[1],
            ("SESSION_ABSOLUTE_TIMEOUT_HOURS", "18446744073709551615"),
        ]));
        assert!(
            matches!(result, Err(SecurityError::Configuration(msg)) if msg.contains("SESSION_ABSOLUTE_TIMEOUT_HOURS"))
        );
    }

    #[test]
    fn every_duration_is_bounded() {
        for key in [
            "JWT_ACCESS_EXPIRATION_MINUTES",
            "JWT_REFRESH_EXPIRATION_DAYS",
            "SESSION_IDLE_TIMEOUT_MINUTES",
            "ACCOUNT_LOCKOUT_WINDOW_MINUTES",
            "RATE_LIMIT_WINDOW_SECONDS",
        ] {
            let result = Config::from_lookup(lookup_from(&[
                SECRETS[0],
                SECRETS[1],
                (key, "9223372036854775808"),
            ]));
            assert!(
                matches!(&result, Err(SecurityError::Configuration(msg)) if msg.contains(key)),
                "{key} accepted an out-of-range value"
            );
        }
    }

    #[test]
    fn bounded_durations_convert_exactly() {
        let config = Config::from_lookup(lookup_from(&[
            SECRETS[0],
            SECRETS[1],
            ("SESSION_ABSOLUTE_TIMEOUT_HOURS", "8760"),
            ("JWT_REFRESH_EXPIRATION_DAYS", "365"),
        ]))
        .expect("config");
        assert_eq!(config.session_absolute_timeout(), Duration::hours(8760));
        assert_eq!(config.refresh_token_lifetime(), Duration::days(365));
    }

    #[test]
    fn proxy_headers_are_opt_in() {
        let config = Config::from_lookup(lookup_from(&[
            SECRETS[0],
            SECRETS[1],
            ("TRUST_PROXY_HEADERS", "true"),
        ]))
        .expect("config");
        assert!(config.trust_proxy_headers);
    }
}
