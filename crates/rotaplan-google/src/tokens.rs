//! Cached OAuth token persistence.
//!
//! The cache is a single JSON file, opened per operation and rewritten
//! wholesale on save. It is only rewritten after an interactive flow.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::create_config_dir;
use crate::error::{AuthError, AuthResult};

/// Margin subtracted from the expiry so a token is refreshed before it lapses.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// An access token with its refresh token and granted scopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedToken {
    /// Bearer token for API requests.
    pub access_token: String,

    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Long-lived token used to obtain new access tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// When the access token expires, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,

    /// Scopes granted with this token.
    #[serde(default)]
    pub scopes: Vec<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl CachedToken {
    /// Builds a token from a token endpoint response.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in_secs: Option<i64>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: default_token_type(),
            refresh_token,
            expiry: expires_in_secs.map(|secs| Utc::now() + Duration::seconds(secs)),
            scopes,
        }
    }

    /// Returns true if the access token is expired or about to expire.
    pub fn is_expired(&self) -> bool {
        match self.expiry {
            Some(expiry) => Utc::now() + Duration::seconds(EXPIRY_MARGIN_SECS) >= expiry,
            None => false,
        }
    }

    /// Returns true if every scope in `required` was granted.
    pub fn has_scopes(&self, required: &[String]) -> bool {
        required.iter().all(|scope| self.scopes.contains(scope))
    }

    /// Replaces the access token after a refresh.
    ///
    /// The endpoint may omit the refresh token, in which case the current one is kept.
    pub fn refreshed(
        &self,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in_secs: Option<i64>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: self.token_type.clone(),
            refresh_token: refresh_token.or_else(|| self.refresh_token.clone()),
            expiry: expires_in_secs.map(|secs| Utc::now() + Duration::seconds(secs)),
            scopes: self.scopes.clone(),
        }
    }

    /// Reads a token from `path`.
    ///
    /// A missing or undecodable file is reported as [`AuthError::Token`].
    pub fn load(path: &Path) -> AuthResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| AuthError::token(path, format!("reading token: {}", e)))?;
        let token: Self = serde_json::from_str(&content)
            .map_err(|e| AuthError::token(path, format!("decoding token: {}", e)))?;
        debug!("loaded cached token from {:?}", path);
        Ok(token)
    }

    /// Writes the token to `path` with owner-only permissions.
    pub fn save(&self, path: &Path) -> AuthResult<()> {
        let persist = |source| AuthError::TokenPersist {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            create_config_dir(parent).map_err(persist)?;
        }
        let content = serde_json::to_vec_pretty(self).map_err(|e| persist(io::Error::other(e)))?;

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(path).map_err(persist)?;

        // The mode above only applies to newly created files.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(persist)?;
        }

        let write_result = file.write_all(&content);
        let close_result = file.sync_all();
        write_result.and(close_result).map_err(persist)?;

        debug!("saved token to {:?}", path);
        Ok(())
    }
}

/// Removes `path`, treating an absent file as success.
pub(crate) fn remove_if_exists(path: &Path) -> AuthResult<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!("removed {:?}", path);
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(AuthError::Reset {
            path: path.to_path_buf(),
            source,
        }),
    }
}
