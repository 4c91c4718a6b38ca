//! Turns the config directory into an authenticated [`CalendarService`].
//!
//! ```text
//! load credential ──missing──> entry-point policy
//!        │
//! load cached token ──invalid──┐
//!        │                     │
//!      probe ──────rejected────┤
//!        │                     ▼
//!     service         interactive flow:
//!                     listener, prompt, code, exchange, save, close
//! ```
//!
//! The fallback from a bad cached token to the interactive flow happens at
//! most once per call.

use tracing::{debug, info, warn};

use crate::client::{CalendarService, http_client};
use crate::config::{AuthConfig, create_config_dir};
use crate::credentials::{ApplicationCredential, remediation_message};
use crate::error::{AuthError, AuthErrorKind, AuthResult};
use crate::listener::CallbackListener;
use crate::oauth::{OAuthClient, PkceFlow};
use crate::tokens::{CachedToken, remove_if_exists};

/// Shows the authorization URL to the user.
pub trait AuthPrompt: Send + Sync {
    /// Called once per interactive flow, after the listener is bound.
    fn prompt(&self, auth_url: &str);
}

/// Prints the authorization URL and optionally opens a browser.
#[derive(Debug, Clone, Copy)]
pub struct TerminalPrompt {
    pub open_browser: bool,
}

impl AuthPrompt for TerminalPrompt {
    fn prompt(&self, auth_url: &str) {
        println!(
            "Go to the following link in your browser to authorize google-rotation-planner:\n\n{}\n\nWaiting for the authorization to complete...",
            auth_url
        );
        if self.open_browser {
            if let Err(e) = open::that(auth_url) {
                warn!("failed to open browser: {}", e);
            }
        }
    }
}

/// Obtains and caches the token behind every calendar call.
pub struct Authenticator {
    config: AuthConfig,
    prompt: Box<dyn AuthPrompt>,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    /// Creates an authenticator prompting on the terminal.
    pub fn new(config: AuthConfig) -> Self {
        let prompt = TerminalPrompt {
            open_browser: config.open_browser,
        };
        Self {
            config,
            prompt: Box::new(prompt),
        }
    }

    /// Replaces how the authorization URL is shown.
    #[must_use]
    pub fn with_prompt(mut self, prompt: impl AuthPrompt + 'static) -> Self {
        self.prompt = Box::new(prompt);
        self
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Returns a ready service, authorizing interactively if needed.
    ///
    /// A missing credential prints setup guidance and fails.
    pub async fn service(&self) -> AuthResult<CalendarService> {
        let credential = self.load_credential().inspect_err(|e| {
            eprintln!("{}", remediation_message(&self.config.credentials_path()));
            debug!("credential unavailable: {}", e);
        })?;
        self.authorize(credential).await
    }

    /// Prepares the config directory and makes sure a usable token exists.
    ///
    /// A missing credential prints setup guidance and succeeds.
    pub async fn init_config(&self) -> AuthResult<()> {
        create_config_dir(&self.config.config_dir)
            .map_err(|e| AuthError::credential(&self.config.config_dir, e.to_string()))?;

        let credential = match self.load_credential() {
            Ok(credential) => credential,
            Err(e) if e.kind() == AuthErrorKind::MissingOrInvalidCredential => {
                println!("{}", remediation_message(&self.config.credentials_path()));
                debug!("credential unavailable: {}", e);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        self.authorize(credential).await?;
        println!("google-rotation-planner is configured in {}", self.config.config_dir.display());
        Ok(())
    }

    /// Probes the cached token and re-authorizes if it is rejected.
    pub async fn refresh_token(&self) -> AuthResult<()> {
        let credential = self.load_credential()?;
        self.authorize(credential).await?;
        println!("token is valid");
        Ok(())
    }

    /// Deletes the cached token and the credential. Absent files are fine.
    pub fn reset_config(&self) -> AuthResult<()> {
        remove_if_exists(&self.config.token_path())?;
        remove_if_exists(&self.config.credentials_path())?;
        info!("removed cached files from {:?}", self.config.config_dir);
        Ok(())
    }

    fn load_credential(&self) -> AuthResult<ApplicationCredential> {
        ApplicationCredential::load(self.config.credentials_path())
    }

    /// The state machine shared by every entry point.
    async fn authorize(&self, credential: ApplicationCredential) -> AuthResult<CalendarService> {
        let http = http_client(self.config.http_timeout)?;
        let oauth = OAuthClient::new(credential, http.clone());

        match self.cached_service(&http, &oauth).await {
            Ok(service) => return Ok(service),
            Err(e) if e.is_recoverable() => {
                info!("cached token unusable, authorizing again: {}", e);
            }
            Err(e) => return Err(e),
        }

        let token = self.interactive_flow(&oauth).await?;
        Ok(CalendarService::new(
            http,
            self.config.api_base.clone(),
            oauth,
            token,
        ))
    }

    /// Loads the cached token and checks it against the service.
    async fn cached_service(
        &self,
        http: &reqwest::Client,
        oauth: &OAuthClient,
    ) -> AuthResult<CalendarService> {
        let path = self.config.token_path();
        let token = CachedToken::load(&path)?;
        if !token.has_scopes(&self.config.scopes) {
            return Err(AuthError::token(&path, "token lacks required scopes"));
        }

        let service = CalendarService::new(
            http.clone(),
            self.config.api_base.clone(),
            oauth.clone(),
            token,
        );
        service.probe().await?;
        debug!("cached token accepted");
        Ok(service)
    }

    /// Runs the browser authorization and caches the resulting token.
    ///
    /// The listener is closed on every exit path.
    async fn interactive_flow(&self, oauth: &OAuthClient) -> AuthResult<CachedToken> {
        let pkce = PkceFlow::new();
        let mut listener = CallbackListener::start(pkce.state.clone()).await?;

        let result = self.obtain_token(&mut listener, oauth, &pkce).await;
        listener.close();
        result
    }

    async fn obtain_token(
        &self,
        listener: &mut CallbackListener,
        oauth: &OAuthClient,
        pkce: &PkceFlow,
    ) -> AuthResult<CachedToken> {
        let redirect_uri = listener.redirect_uri();
        let auth_url = oauth.authorization_url(pkce, &redirect_uri, &self.config.scopes);
        debug!("authorization URL: {}", auth_url);
        self.prompt.prompt(&auth_url);

        let code = listener.wait_for_code(self.config.callback_timeout).await?;
        info!("received authorization code, exchanging for a token");

        let token = oauth
            .exchange_code(&code, &pkce.verifier, &redirect_uri, &self.config.scopes)
            .await?;
        token.save(&self.config.token_path())?;
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::config::{SCOPE_CALENDAR_EVENTS, SCOPE_CALENDAR_LIST_READONLY};
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Records the authorization URLs and plays the browser's part.
    #[derive(Clone, Default)]
    struct BrowserStub {
        urls: Arc<Mutex<Vec<String>>>,
        /// Query appended to the redirect; `None` leaves the callback unanswered.
        reply: Option<&'static str>,
    }

    impl BrowserStub {
        fn answering(reply: &'static str) -> Self {
            Self {
                reply: Some(reply),
                ..Default::default()
            }
        }

        fn prompts(&self) -> usize {
            self.urls.lock().unwrap().len()
        }
    }

    impl AuthPrompt for BrowserStub {
        fn prompt(&self, auth_url: &str) {
            self.urls.lock().unwrap().push(auth_url.to_string());
            let Some(reply) = self.reply else { return };

            let url = url::Url::parse(auth_url).unwrap();
            let param = |name: &str| {
                url.query_pairs()
                    .find(|(k, _)| k == name)
                    .map(|(_, v)| v.into_owned())
                    .unwrap()
            };
            let callback = format!("{}?{}&state={}", param("redirect_uri"), reply, param("state"));
            tokio::spawn(async move {
                let _ = reqwest::get(callback).await;
            });
        }
    }

    struct Fixture {
        server: MockServer,
        dir: tempfile::TempDir,
    }

    impl Fixture {
        async fn new() -> Self {
            Self {
                server: MockServer::start().await,
                dir: tempfile::tempdir().unwrap(),
            }
        }

        fn config(&self) -> AuthConfig {
            AuthConfig::new(self.dir.path())
                .with_api_base(format!("{}/calendar/v3", self.server.uri()))
                .with_open_browser(false)
        }

        fn write_credentials(&self) {
            let json = serde_json::json!({
                "installed": {
                    "client_id": "client-id",
                    "client_secret": "client-secret",
                    "auth_uri": format!("{}/auth", self.server.uri()),
                    "token_uri": format!("{}/token", self.server.uri()),
                    "redirect_uris": ["http://localhost"]
                }
            });
            fs::write(self.config().credentials_path(), json.to_string()).unwrap();
        }

        fn write_token(&self, access_token: &str, scopes: Vec<String>) {
            CachedToken::new(access_token, Some("1//r".to_string()), Some(3600), scopes)
                .save(&self.config().token_path())
                .unwrap();
        }

        async fn mock_token_endpoint(&self, access_token: &str, times: u64) {
            Mock::given(method("POST"))
                .and(path("/token"))
                .and(body_string_contains("code=abc123"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "access_token": access_token,
                    "refresh_token": "1//new",
                    "expires_in": 3599
                })))
                .expect(times)
                .mount(&self.server)
                .await;
        }

        async fn mock_probe(&self, access_token: &str, status: u16) {
            Mock::given(method("GET"))
                .and(path("/calendar/v3/users/me/calendarList"))
                .and(header("authorization", format!("Bearer {access_token}").as_str()))
                .respond_with(ResponseTemplate::new(status).set_body_json(serde_json::json!({"items": []})))
                .mount(&self.server)
                .await;
        }
    }

    fn default_scopes() -> Vec<String> {
        vec![
            SCOPE_CALENDAR_EVENTS.to_string(),
            SCOPE_CALENDAR_LIST_READONLY.to_string(),
        ]
    }

    #[tokio::test]
    async fn fresh_directory_runs_interactive_flow() {
        let fx = Fixture::new().await;
        fx.write_credentials();
        fx.mock_token_endpoint("ya29.fresh", 1).await;
        fx.mock_probe("ya29.fresh", 200).await;

        let browser = BrowserStub::answering("code=abc123");
        let auth = Authenticator::new(fx.config()).with_prompt(browser.clone());
        let service = auth.service().await.unwrap();

        assert_eq!(browser.prompts(), 1);
        let cached = CachedToken::load(&fx.config().token_path()).unwrap();
        assert_eq!(cached.access_token, "ya29.fresh");
        assert_eq!(cached.refresh_token.as_deref(), Some("1//new"));
        service.probe().await.unwrap();
    }

    #[tokio::test]
    async fn authorization_url_targets_the_listener() {
        let fx = Fixture::new().await;
        fx.write_credentials();
        fx.mock_token_endpoint("ya29.fresh", 1).await;

        let browser = BrowserStub::answering("code=abc123");
        Authenticator::new(fx.config())
            .with_prompt(browser.clone())
            .service()
            .await
            .unwrap();

        let urls = browser.urls.lock().unwrap();
        let url = url::Url::parse(&urls[0]).unwrap();
        assert_eq!(url.path(), "/auth");
        let redirect = url
            .query_pairs()
            .find(|(k, _)| k == "redirect_uri")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        assert!(redirect.starts_with("http://127.0.0.1:"));
        assert!(redirect.ends_with('/'));
    }

    #[tokio::test]
    async fn revoked_token_is_replaced_once() {
        let fx = Fixture::new().await;
        fx.write_credentials();
        fx.write_token("ya29.revoked", default_scopes());
        fx.mock_probe("ya29.revoked", 401).await;
        fx.mock_token_endpoint("ya29.replacement", 1).await;

        let browser = BrowserStub::answering("code=abc123");
        let auth = Authenticator::new(fx.config()).with_prompt(browser.clone());
        auth.service().await.unwrap();

        assert_eq!(browser.prompts(), 1);
        let cached = CachedToken::load(&fx.config().token_path()).unwrap();
        assert_eq!(cached.access_token, "ya29.replacement");
    }

    #[tokio::test]
    async fn valid_token_skips_the_browser() {
        let fx = Fixture::new().await;
        fx.write_credentials();
        fx.write_token("ya29.valid", default_scopes());
        fx.mock_probe("ya29.valid", 200).await;
        fx.mock_token_endpoint("unused", 0).await;

        let browser = BrowserStub::default();
        let auth = Authenticator::new(fx.config()).with_prompt(browser.clone());
        auth.service().await.unwrap();
        auth.refresh_token().await.unwrap();

        assert_eq!(browser.prompts(), 0);
    }

    #[tokio::test]
    async fn token_missing_a_scope_is_reauthorized() {
        let fx = Fixture::new().await;
        fx.write_credentials();
        fx.write_token("ya29.narrow", vec![SCOPE_CALENDAR_EVENTS.to_string()]);
        fx.mock_probe("ya29.narrow", 200).await;
        fx.mock_token_endpoint("ya29.wide", 1).await;

        let browser = BrowserStub::answering("code=abc123");
        Authenticator::new(fx.config())
            .with_prompt(browser.clone())
            .service()
            .await
            .unwrap();

        assert_eq!(browser.prompts(), 1);
    }

    #[tokio::test]
    async fn garbage_token_file_is_reauthorized() {
        let fx = Fixture::new().await;
        fx.write_credentials();
        fs::write(fx.config().token_path(), "not json").unwrap();
        fx.mock_token_endpoint("ya29.fresh", 1).await;

        let browser = BrowserStub::answering("code=abc123");
        Authenticator::new(fx.config())
            .with_prompt(browser.clone())
            .refresh_token()
            .await
            .unwrap();

        assert_eq!(browser.prompts(), 1);
    }

    #[tokio::test]
    async fn failed_exchange_leaves_no_token() {
        let fx = Fixture::new().await;
        fx.write_credentials();
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_grant"}"#))
            .expect(1)
            .mount(&fx.server)
            .await;

        let browser = BrowserStub::answering("code=abc123");
        let err = Authenticator::new(fx.config())
            .with_prompt(browser.clone())
            .service()
            .await
            .unwrap_err();

        assert_eq!(err.kind(), AuthErrorKind::CodeExchangeFailure);
        assert!(!fx.config().token_path().exists());
    }

    #[tokio::test]
    async fn unwritable_token_file_fails_and_releases_listener() {
        let fx = Fixture::new().await;
        fx.write_credentials();
        fs::create_dir(fx.config().token_path()).unwrap();
        fx.mock_token_endpoint("ya29.fresh", 1).await;

        let browser = BrowserStub::answering("code=abc123");
        let err = Authenticator::new(fx.config())
            .with_prompt(browser.clone())
            .service()
            .await
            .unwrap_err();

        assert_eq!(err.kind(), AuthErrorKind::TokenPersistFailure);
        assert_eq!(browser.prompts(), 1);

        let redirect = {
            let urls = browser.urls.lock().unwrap();
            let url = url::Url::parse(&urls[0]).unwrap();
            url.query_pairs()
                .find(|(k, _)| k == "redirect_uri")
                .map(|(_, v)| v.into_owned())
                .unwrap()
        };
        let addr = url::Url::parse(&redirect)
            .unwrap()
            .socket_addrs(|| None)
            .unwrap()[0];

        // Abort is asynchronous; give the runtime a moment to drop the socket.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        tokio::net::TcpListener::bind(addr).await.unwrap();
    }

    #[tokio::test]
    async fn denied_consent_is_callback_failure() {
        let fx = Fixture::new().await;
        fx.write_credentials();
        fx.mock_token_endpoint("unused", 0).await;

        let err = Authenticator::new(fx.config())
            .with_prompt(BrowserStub::answering("error=access_denied"))
            .service()
            .await
            .unwrap_err();

        assert_eq!(err.kind(), AuthErrorKind::CallbackFailure);
    }

    #[tokio::test]
    async fn unanswered_prompt_times_out_when_bounded() {
        let fx = Fixture::new().await;
        fx.write_credentials();

        let config = fx
            .config()
            .with_callback_timeout(Some(std::time::Duration::from_millis(100)));
        let err = Authenticator::new(config)
            .with_prompt(BrowserStub::default())
            .service()
            .await
            .unwrap_err();

        assert_eq!(err.kind(), AuthErrorKind::CallbackFailure);
    }

    #[tokio::test]
    async fn service_without_credentials_fails() {
        let fx = Fixture::new().await;
        let browser = BrowserStub::default();
        let err = Authenticator::new(fx.config())
            .with_prompt(browser.clone())
            .service()
            .await
            .unwrap_err();

        assert_eq!(err.kind(), AuthErrorKind::MissingOrInvalidCredential);
        assert_eq!(browser.prompts(), 0);
    }

    #[tokio::test]
    async fn refresh_without_credentials_fails() {
        let fx = Fixture::new().await;
        let err = Authenticator::new(fx.config())
            .with_prompt(BrowserStub::default())
            .refresh_token()
            .await
            .unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::MissingOrInvalidCredential);
    }

    #[tokio::test]
    async fn init_without_credentials_creates_private_dir() {
        let parent = tempfile::tempdir().unwrap();
        let dir = parent.path().join(".google-rotation-planner");

        let browser = BrowserStub::default();
        Authenticator::new(AuthConfig::new(&dir))
            .with_prompt(browser.clone())
            .init_config()
            .await
            .unwrap();

        assert!(dir.is_dir());
        assert_eq!(browser.prompts(), 0);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&dir).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o700);
        }
    }

    #[tokio::test]
    async fn init_with_credentials_authorizes() {
        let fx = Fixture::new().await;
        fx.write_credentials();
        fx.mock_token_endpoint("ya29.init", 1).await;

        Authenticator::new(fx.config())
            .with_prompt(BrowserStub::answering("code=abc123"))
            .init_config()
            .await
            .unwrap();

        assert!(fx.config().token_path().exists());
    }

    #[test]
    fn reset_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let config = AuthConfig::new(dir.path());
        fs::write(config.credentials_path(), "{}").unwrap();
        fs::write(config.token_path(), "{}").unwrap();

        let auth = Authenticator::new(config.clone());
        auth.reset_config().unwrap();
        auth.reset_config().unwrap();

        assert!(!config.credentials_path().exists());
        assert!(!config.token_path().exists());
    }
}
