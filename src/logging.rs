use tracing_subscriber::EnvFilter;

use crate::error::{ClausalError, Result};

/// Installs a formatted subscriber filtered by `RUST_LOG`, falling back to
/// `default_filter` (e.g. `"clausal=debug"`) when the variable is unset.
///
/// Fails if a global subscriber is already installed.
pub fn init(default_filter: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .map_err(|e| ClausalError::Config(e.to_string()))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| ClausalError::Config(e.to_string()))
}
