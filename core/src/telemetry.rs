use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global subscriber: `RUST_LOG` when set, otherwise
/// `default_directives` (for example `"bastion_core=info,bastion=info"`).
///
/// Audit records are emitted on the `bastion::audit` target and violations on
/// `bastion::violation`, so both can be routed with ordinary directives.
pub fn init_tracing(default_directives: &str) -> Result<(), crate::error::SecurityError> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directives.into()))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| {
            crate::error::SecurityError::Configuration(format!("failed to install tracing: {e}"))
        })
}
