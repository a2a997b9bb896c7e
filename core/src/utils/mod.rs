pub mod encryption;
pub mod jwt;
pub mod password;

pub use encryption::Cipher;
pub use jwt::{TokenClaims, TokenIssuer, TokenPair, TokenType};
pub use password::{CredentialHasher, PasswordPolicy, PasswordStrength};
