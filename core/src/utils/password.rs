use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::config::Config;
use crate::error::SecurityError;

// Argon2id cost: 19 MiB, 3 passes, single lane.
const HASH_MEMORY_KIB: u32 = 19 * 1024;
const HASH_ITERATIONS: u32 = 3;
const HASH_PARALLELISM: u32 = 1;
const MAX_SCORE: u8 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_numbers: bool,
    pub require_symbols: bool,
    /// Advisory; the core does not know when a password was set.
    pub max_age_days: u32,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 12,
            require_uppercase: true,
            require_lowercase: true,
            require_numbers: true,
            require_symbols: true,
            max_age_days: 90,
        }
    }
}

impl PasswordPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_length: config.password_min_length,
            require_uppercase: config.password_require_uppercase,
            require_lowercase: config.password_require_lowercase,
            require_numbers: config.password_require_numbers,
            require_symbols: config.password_require_symbols,
            max_age_days: config.password_max_age_days,
        }
    }

    /// A minimum length of zero switches the length rule off.
    fn min_length_required(&self) -> bool {
        self.min_length > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordStrength {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub score: u8,
}

#[derive(Clone)]
pub struct CredentialHasher {
    argon2: Argon2<'static>,
    policy: PasswordPolicy,
}

impl std::fmt::Debug for CredentialHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialHasher")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl CredentialHasher {
    pub fn new(policy: PasswordPolicy) -> Result<Self, SecurityError> {
        let params = Params::new(HASH_MEMORY_KIB, HASH_ITERATIONS, HASH_PARALLELISM, None)
            .map_err(|e| SecurityError::Configuration(format!("invalid argon2 params: {e}")))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            policy,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, SecurityError> {
        Self::new(PasswordPolicy::from_config(config))
    }

    pub fn policy(&self) -> &PasswordPolicy {
        &self.policy
    }

    pub fn hash(&self, password: &str) -> Result<String, SecurityError> {
        let salt = SaltString::generate(&mut OsRng);

        let password_hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| SecurityError::Credential(format!("failed to hash password: {e}")))?;

        Ok(password_hash.to_string())
    }

    /// Verifies against a PHC digest. The parameters embedded in the digest
    /// win over the hasher's own, so older digests keep verifying.
    pub fn verify(&self, password: &str, digest: &str) -> Result<bool, SecurityError> {
        let parsed_hash = PasswordHash::new(digest)
            .map_err(|e| SecurityError::Credential(format!("invalid password hash: {e}")))?;

        match self.argon2.verify_password(password.as_bytes(), &parsed_hash) {
            Ok(_) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(SecurityError::Credential(format!(
                "password verification error: {e}"
            ))),
        }
    }

    pub fn score_strength(&self, password: &str) -> PasswordStrength {
        score_password(password, &self.policy)
    }

    pub fn is_password_expired(&self, changed_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        if self.policy.max_age_days == 0 {
            return false;
        }
        now - changed_at > Duration::days(self.policy.max_age_days as i64)
    }
}

/// Scores a password against the policy.
///
/// Rules are evaluated in a fixed order: minimum length, uppercase,
/// lowercase, digit, special character, length over 12, multiple special
/// characters, no run of three identical characters. Each satisfied rule is
/// worth a point. Only the first five can be required, and failed required
/// rules are reported in that same order.
pub fn score_password(password: &str, policy: &PasswordPolicy) -> PasswordStrength {
    let length = password.chars().count();
    let special_count = password.chars().filter(|c| is_special(*c)).count();

    let rules: [(bool, Option<String>); 8] = [
        (
            length >= policy.min_length,
            policy.min_length_required().then(|| {
                format!(
                    "Password must be at least {} characters long",
                    policy.min_length
                )
            }),
        ),
        (
            password.chars().any(|c| c.is_uppercase()),
            policy
                .require_uppercase
                .then(|| "Password must contain at least one uppercase letter".to_string()),
        ),
        (
            password.chars().any(|c| c.is_lowercase()),
            policy
                .require_lowercase
                .then(|| "Password must contain at least one lowercase letter".to_string()),
        ),
        (
            password.chars().any(|c| c.is_ascii_digit()),
            policy
                .require_numbers
                .then(|| "Password must contain at least one number".to_string()),
        ),
        (
            special_count > 0,
            policy
                .require_symbols
                .then(|| "Password must contain at least one special character".to_string()),
        ),
        (length > 12, None),
        (special_count > 1, None),
        (!has_repeated_run(password, 3), None),
    ];

    let mut errors = Vec::new();
    let mut score: u8 = 0;
    for (passed, required_error) in rules {
        if passed {
            score += 1;
        } else if let Some(message) = required_error {
            errors.push(message);
        }
    }

    PasswordStrength {
        is_valid: errors.is_empty(),
        errors,
        score: score.min(MAX_SCORE),
    }
}

fn is_special(c: char) -> bool {
    !c.is_alphanumeric() && !c.is_whitespace()
}

fn has_repeated_run(password: &str, run: usize) -> bool {
    let mut previous = None;
    let mut streak = 0;
    for c in password.chars() {
        if Some(c) == previous {
            streak += 1;
        } else {
            previous = Some(c);
            streak = 1;
        }
        if streak >= run {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> CredentialHasher {
        CredentialHasher::new(PasswordPolicy::default()).expect("hasher")
    }

    #[test]
    fn hash_and_verify_roundtrip() {
        let hasher = hasher();
        let pw = "S3cr3t!Passw0rd";
        let hash = hasher.hash(pw).expect("hash should succeed");
        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify(pw, &hash).unwrap());
        assert!(!hasher.verify("wrong", &hash).unwrap());
    }

    #[test]
    fn hashes_are_salted_per_call() {
        let hasher = hasher();
        let a = hasher.hash("same-password").expect("hash");
        let b = hasher.hash("same-password").expect("hash");
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_digest_is_an_error() {
        assert!(matches!(
            hasher().verify("pw", "not-a-hash"),
            Err(SecurityError::Credential(_))
        ));
    }

    #[test]
    fn strong_password_scores_full_marks() {
        let strength = score_password("Correct-Horse#42", &PasswordPolicy::default());
        assert!(strength.is_valid);
        assert!(strength.errors.is_empty());
        assert_eq!(strength.score, 8);
    }

    #[test]
    fn errors_follow_rule_order() {
        let strength = score_password("abc", &PasswordPolicy::default());
        assert!(!strength.is_valid);
        assert_eq!(
            strength.errors,
            vec![
                "Password must be at least 12 characters long".to_string(),
                "Password must contain at least one uppercase letter".to_string(),
                "Password must contain at least one number".to_string(),
                "Password must contain at least one special character".to_string(),
            ]
        );
        // lowercase + no repeated run
        assert_eq!(strength.score, 2);
    }

    #[test]
    fn disabled_rules_are_not_required() {
        let policy = PasswordPolicy {
            require_symbols: false,
            require_uppercase: false,
            ..PasswordPolicy::default()
        };
        let strength = score_password("lowercase1234", &policy);
        assert!(strength.is_valid);
        assert!(strength.score < 8);
    }

    #[test]
    fn repeated_characters_cost_a_point() {
        let policy = PasswordPolicy::default();
        let clean = score_password("Abcdefgh1!xyz", &policy);
        let repeated = score_password("Abcdeeeh1!xyz", &policy);
        assert_eq!(clean.score, repeated.score + 1);
        assert!(repeated.is_valid);
    }

    #[test]
    fn adding_last_missing_class_flips_validity() {
        let policy = PasswordPolicy::default();
        let without_digit = score_password("Abcdefghijk!", &policy);
        let with_digit = score_password("Abcdefghijk!7", &policy);
        assert!(!without_digit.is_valid);
        assert!(with_digit.is_valid);
        assert!(with_digit.score >= without_digit.score);
    }

    #[test]
    fn expiry_uses_max_age() {
        let hasher = hasher();
        let now = Utc::now();
        assert!(!hasher.is_password_expired(now - Duration::days(89), now));
        assert!(hasher.is_password_expired(now - Duration::days(91), now));
    }
}
