//! Credential and token maintenance commands.

use rotaplan_google::{AuthConfig, Authenticator};
use tracing::debug;

use crate::error::CliResult;

/// Creates the config directory and authorizes access if credentials exist.
pub async fn init(config: AuthConfig) -> CliResult<()> {
    debug!("initializing {:?}", config.config_dir);
    Authenticator::new(config).init_config().await?;
    Ok(())
}

/// Deletes the cached token and credentials.
pub fn reset(config: AuthConfig) -> CliResult<()> {
    let dir = config.config_dir.clone();
    Authenticator::new(config).reset_config()?;
    println!("removed cached credentials from {}", dir.display());
    Ok(())
}

/// Probes the cached token and re-authorizes when it is rejected.
pub async fn refresh(config: AuthConfig) -> CliResult<()> {
    Authenticator::new(config).refresh_token().await?;
    Ok(())
}
