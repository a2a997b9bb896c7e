pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod services;
pub mod state;
pub mod telemetry;
pub mod types;
pub mod utils;
pub mod validation;

pub use config::Config;
pub use error::SecurityError;
pub use state::{AuthenticatedUser, LoginAttempt, LoginSuccess, SecurityCore, StoredCredential};
