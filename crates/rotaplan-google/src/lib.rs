//! Google Calendar credentials, OAuth token lifecycle and API client
//!
//! [`Authenticator`] is the entry point: it loads the application
//! credential, validates the cached token with a probe call, and falls back
//! to a browser authorization received on a loopback [`CallbackListener`].
//! The result is a [`CalendarService`] implementing
//! [`rotaplan_core::CalendarApi`].

pub mod authenticator;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod listener;
pub mod oauth;
pub mod tokens;

pub use authenticator::{AuthPrompt, Authenticator, TerminalPrompt};
pub use client::CalendarService;
pub use config::{AuthConfig, default_config_dir};
pub use credentials::{ApplicationCredential, remediation_message};
pub use error::{AuthError, AuthErrorKind, AuthResult};
pub use listener::CallbackListener;
pub use oauth::{OAuthClient, PkceFlow};
pub use tokens::CachedToken;
