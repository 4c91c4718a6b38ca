//! Authentication settings and config directory layout.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the directory under `$HOME` holding credentials and tokens.
pub const CONFIG_DIR_NAME: &str = ".google-rotation-planner";

/// File name of the application credential.
pub const CREDENTIALS_FILE: &str = "credentials.json";

/// File name of the cached token.
pub const TOKEN_FILE: &str = "token.json";

/// Calendar API base URL.
pub const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// Scope to create and delete events.
pub const SCOPE_CALENDAR_EVENTS: &str = "https://www.googleapis.com/auth/calendar.events";

/// Scope backing the probe call.
pub const SCOPE_CALENDAR_LIST_READONLY: &str =
    "https://www.googleapis.com/auth/calendar.calendarlist.readonly";

/// Default HTTP request timeout.
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Returns `~/.google-rotation-planner`, or `None` when there is no home directory.
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIR_NAME))
}

/// Creates `dir` and its missing parents, owner-only on Unix.
pub(crate) fn create_config_dir(dir: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir)
}

/// Settings for the [`Authenticator`](crate::Authenticator).
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Directory holding `credentials.json` and `token.json`.
    pub config_dir: PathBuf,
    /// OAuth scopes requested and required from the cached token.
    pub scopes: Vec<String>,
    /// Calendar API base URL.
    pub api_base: String,
    /// Timeout for each HTTP request.
    pub http_timeout: Duration,
    /// Bound on the wait for the browser callback. `None` waits indefinitely.
    pub callback_timeout: Option<Duration>,
    /// Whether to try to open the authorization URL in a browser.
    pub open_browser: bool,
}

impl AuthConfig {
    /// Creates a config rooted at `config_dir` with default settings.
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            scopes: vec![
                SCOPE_CALENDAR_EVENTS.to_string(),
                SCOPE_CALENDAR_LIST_READONLY.to_string(),
            ],
            api_base: CALENDAR_API_BASE.to_string(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            callback_timeout: None,
            open_browser: true,
        }
    }

    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_callback_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.callback_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_open_browser(mut self, open_browser: bool) -> Self {
        self.open_browser = open_browser;
        self
    }

    /// Path of the application credential.
    pub fn credentials_path(&self) -> PathBuf {
        self.config_dir.join(CREDENTIALS_FILE)
    }

    /// Path of the cached token.
    pub fn token_path(&self) -> PathBuf {
        self.config_dir.join(TOKEN_FILE)
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }
}
