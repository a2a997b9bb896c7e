use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use argon2::Argon2;
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::config::Config;
use crate::error::SecurityError;

const KEY_LENGTH: usize = 32;
const NONCE_LENGTH: usize = 12;
const KEY_DERIVATION_SALT: &[u8] = b"bastion-core:cipher-key:v1";

/// AES-256-GCM cipher keyed from the configured secret.
///
/// Ciphertexts are `ivHex:cipherHex`, so every value carries its own nonce.
#[derive(Clone)]
pub struct Cipher {
    cipher: Aes256Gcm,
    key: [u8; KEY_LENGTH],
}

impl fmt::Debug for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cipher").finish_non_exhaustive()
    }
}

impl Cipher {
    pub fn from_config(config: &Config) -> Result<Self, SecurityError> {
        Self::new(&config.encryption_secret)
    }

    /// Derives the key with Argon2id over the secret and a fixed salt. This
    /// runs once per process, so the memory-hard cost is paid at startup only.
    pub fn new(secret: &str) -> Result<Self, SecurityError> {
        if secret.is_empty() {
            return Err(SecurityError::Configuration(
                "encryption secret must not be empty".into(),
            ));
        }
        let key = derive_key(secret)?;
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|_| SecurityError::Configuration("invalid encryption key length".into()))?;
        Ok(Self { cipher, key })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, SecurityError> {
        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| SecurityError::Credential("encryption failed".into()))?;

        Ok(format!(
            "{}:{}",
            hex::encode(nonce_bytes),
            hex::encode(ciphertext)
        ))
    }

    pub fn decrypt(&self, stored: &str) -> Result<String, SecurityError> {
        let (nonce_part, cipher_part) = stored.split_once(':').ok_or(SecurityError::Decryption)?;

        let nonce_bytes = hex::decode(nonce_part).map_err(|_| SecurityError::Decryption)?;
        if nonce_bytes.len() != NONCE_LENGTH {
            return Err(SecurityError::Decryption);
        }
        let ciphertext = hex::decode(cipher_part).map_err(|_| SecurityError::Decryption)?;

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|_| SecurityError::Decryption)?;
        String::from_utf8(plaintext).map_err(|_| SecurityError::Decryption)
    }

    /// Keyed, deterministic digest of a normalized value, for equality
    /// lookups on columns that are stored encrypted.
    pub fn fingerprint(&self, value: &str) -> String {
        let normalized = normalize_identifier(value);
        let mut hasher = Sha256::new();
        hasher.update(self.key);
        hasher.update(b"|");
        hasher.update(normalized.as_bytes());
        hex::encode(hasher.finalize())
    }
}

pub fn normalize_identifier(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}

fn derive_key(secret: &str) -> Result<[u8; KEY_LENGTH], SecurityError> {
    let mut key = [0u8; KEY_LENGTH];
    Argon2::default()
        .hash_password_into(secret.as_bytes(), KEY_DERIVATION_SALT, &mut key)
        .map_err(|e| SecurityError::Configuration(format!("key derivation failed: {e}")))?;
    Ok(key)
}
