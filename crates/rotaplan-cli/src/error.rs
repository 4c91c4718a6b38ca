//! CLI error types.

use std::fmt;

use rotaplan_core::{PlanError, RotaError};
use rotaplan_google::AuthError;

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// Errors that end a CLI run.
#[derive(Debug)]
pub enum CliError {
    /// Invalid command-line configuration.
    Config(String),
    /// The rota file could not be loaded.
    Rota(RotaError),
    /// Credentials or token could not be obtained.
    Auth(AuthError),
    /// Creating or cleaning up events failed.
    Plan(PlanError),
    /// The user pressed Ctrl-C.
    Interrupted,
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {}", msg),
            Self::Rota(err) => write!(f, "unable to load rota: {}", err),
            Self::Auth(err) => write!(f, "unable to authenticate: {}", err),
            Self::Plan(err) => write!(f, "{}", err),
            Self::Interrupted => write!(f, "interrupted"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Rota(err) => Some(err),
            Self::Auth(err) => Some(err),
            Self::Plan(err) => Some(err),
            Self::Config(_) | Self::Interrupted => None,
        }
    }
}

impl From<RotaError> for CliError {
    fn from(err: RotaError) -> Self {
        Self::Rota(err)
    }
}

impl From<AuthError> for CliError {
    fn from(err: AuthError) -> Self {
        Self::Auth(err)
    }
}

impl From<PlanError> for CliError {
    fn from(err: PlanError) -> Self {
        Self::Plan(err)
    }
}
