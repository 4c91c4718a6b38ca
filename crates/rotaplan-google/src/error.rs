//! Error types for the credential and token lifecycle.
//!
//! Every failure below the [`Authenticator`](crate::Authenticator) is wrapped
//! with the file or operation it concerns. [`AuthError::kind`] gives the
//! coarse classification the orchestrator branches on.

use std::fmt;
use std::io;
use std::path::PathBuf;

use rotaplan_core::CalendarError;
use thiserror::Error;

/// Coarse classification of an [`AuthError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthErrorKind {
    /// The application credential file is absent or unusable.
    MissingOrInvalidCredential,
    /// The cached token file is absent, undecodable or lacks a scope.
    MissingOrInvalidToken,
    /// The local callback listener could not bind.
    ListenerBindFailure,
    /// The token endpoint rejected the authorization code.
    CodeExchangeFailure,
    /// The new token could not be written to disk.
    TokenPersistFailure,
    /// The cached token was rejected by the calendar service.
    ProbeFailure,
    /// The browser step did not deliver a code (denied, timed out, interrupted).
    CallbackFailure,
    /// A cached file could not be removed.
    ResetFailure,
    /// The HTTP client could not be configured.
    ClientSetupFailure,
}

impl AuthErrorKind {
    /// Returns a machine-friendly name for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingOrInvalidCredential => "missing_or_invalid_credential",
            Self::MissingOrInvalidToken => "missing_or_invalid_token",
            Self::ListenerBindFailure => "listener_bind_failure",
            Self::CodeExchangeFailure => "code_exchange_failure",
            Self::TokenPersistFailure => "token_persist_failure",
            Self::ProbeFailure => "probe_failure",
            Self::CallbackFailure => "callback_failure",
            Self::ResetFailure => "reset_failure",
            Self::ClientSetupFailure => "client_setup_failure",
        }
    }
}

impl fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors raised while loading credentials or obtaining a usable token.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The credential file could not be read or parsed.
    #[error("invalid credentials {path}: {reason}")]
    Credential { path: PathBuf, reason: String },

    /// The token cache could not be read, decoded or lacks required scopes.
    #[error("missing or invalid cached token {path}: {reason}")]
    Token { path: PathBuf, reason: String },

    /// The callback listener could not bind a loopback port.
    #[error("starting local server: {0}")]
    ListenerBind(#[source] io::Error),

    /// The authorization code could not be exchanged for a token.
    #[error("exchanging authorization code: {0}")]
    CodeExchange(String),

    /// The token could not be written to the cache file.
    #[error("caching token to {path}: {source}")]
    TokenPersist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The calendar service rejected the token.
    #[error("token rejected by calendar service: {0}")]
    Probe(#[from] CalendarError),

    /// No authorization code was delivered.
    #[error("waiting for authorization: {0}")]
    Callback(String),

    /// A cached file could not be removed.
    #[error("removing {path}: {source}")]
    Reset {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The HTTP client could not be built.
    #[error("configuring HTTP client: {0}")]
    ClientSetup(String),
}

impl AuthError {
    /// Creates a credential error for `path`.
    pub fn credential(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Credential {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a token cache error for `path`.
    pub fn token(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Token {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a callback error.
    pub fn callback(message: impl Into<String>) -> Self {
        Self::Callback(message.into())
    }

    /// Returns the classification of this error.
    pub fn kind(&self) -> AuthErrorKind {
        match self {
            Self::Credential { .. } => AuthErrorKind::MissingOrInvalidCredential,
            Self::Token { .. } => AuthErrorKind::MissingOrInvalidToken,
            Self::ListenerBind(_) => AuthErrorKind::ListenerBindFailure,
            Self::CodeExchange(_) => AuthErrorKind::CodeExchangeFailure,
            Self::TokenPersist { .. } => AuthErrorKind::TokenPersistFailure,
            Self::Probe(_) => AuthErrorKind::ProbeFailure,
            Self::Callback(_) => AuthErrorKind::CallbackFailure,
            Self::Reset { .. } => AuthErrorKind::ResetFailure,
            Self::ClientSetup(_) => AuthErrorKind::ClientSetupFailure,
        }
    }

    /// Returns true if the interactive flow can recover from this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            AuthErrorKind::MissingOrInvalidToken | AuthErrorKind::ProbeFailure
        )
    }
}

/// A specialized Result type for authentication operations.
pub type AuthResult<T> = Result<T, AuthError>;
