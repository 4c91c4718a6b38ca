//! Application credential loading.
//!
//! The credential is the OAuth client registered in the Google Cloud
//! Console, downloaded as `credentials.json` into the config directory.

use std::path::Path;

use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::error::{AuthError, AuthResult};

/// Google OAuth endpoints, used when the credential file omits them.
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Printed when the credential file is absent or unusable. `{path}` is
/// replaced with the expected credential path.
pub const CREDENTIALS_MISSING_MSG: &str = "The credentials are not initialized.

To do so, head to https://console.developers.google.com

1. Create a new project if you don't have one.
2. Go to 'Enable API and services', search for Calendar API and enable it.
3. Go to 'OAuth consent screen'.
    3a. If your account is managed by an organization, you have to
        select 'Internal' as 'User Type'. For individual accounts
        select 'External'.
    3b. Set an application name (e.g. 'google-rotation-planner').
    3c. Use your email for 'User support email' and 'Developer
        contact information'. Save and continue.
    3d. Select 'Add or remove scopes' and add:
        * https://www.googleapis.com/auth/calendar.events
        * https://www.googleapis.com/auth/calendar.calendarlist.readonly
    3e. Save and continue until you're back to the dashboard.
4. You now have a choice. You can either:
    * Click on 'Publish App' and avoid 'Submitting for
      verification'. This will result in scary confirmation
      screens or error messages when you authorize
      google-rotation-planner with your account, OR
    * Add your email as 'Test user' and keep the app in
      'Testing' mode. Everything will work, but you'll have to
      login and confirm the access every week (token expiration).
5. Go to Credentials on the left.
    5a. Click 'Create credentials'.
    5b. Select 'OAuth client ID'.
    5c. Select 'Desktop app' as 'Application type' and give it a name.
    5d. Create.
6. Download the credentials file into {path} and execute the 'init'
   command again.

Documentation about Google Calendar API authorization can be found
at: https://developers.google.com/identity/protocols/oauth2/scopes#calendar
";

/// Returns the remediation text for a credential expected at `path`.
pub fn remediation_message(path: &Path) -> String {
    CREDENTIALS_MISSING_MSG.replace("{path}", &format!("{:?}", path.display().to_string()))
}

/// The OAuth client identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationCredential {
    /// OAuth 2.0 client ID.
    pub client_id: String,
    /// OAuth 2.0 client secret.
    pub client_secret: String,
    /// Authorization endpoint.
    pub auth_uri: String,
    /// Token endpoint.
    pub token_uri: String,
    /// Redirect URIs registered for the client.
    pub redirect_uris: Vec<String>,
}

/// Structure of Google's OAuth credentials JSON file.
///
/// Supports the Cloud Console download (`installed` or `web` section) and a
/// flat `client_id` / `client_secret` object.
#[derive(Debug, Deserialize)]
struct CredentialsFile {
    installed: Option<NestedCredentials>,
    web: Option<NestedCredentials>,
    client_id: Option<String>,
    client_secret: Option<String>,
    auth_uri: Option<String>,
    token_uri: Option<String>,
    #[serde(default)]
    redirect_uris: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct NestedCredentials {
    client_id: String,
    client_secret: String,
    auth_uri: Option<String>,
    token_uri: Option<String>,
    #[serde(default)]
    redirect_uris: Vec<String>,
}

impl ApplicationCredential {
    /// Creates a credential for Google's endpoints.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            auth_uri: GOOGLE_AUTH_URL.to_string(),
            token_uri: GOOGLE_TOKEN_URL.to_string(),
            redirect_uris: Vec::new(),
        }
    }

    /// Loads and validates a credential file.
    pub fn load(path: impl AsRef<Path>) -> AuthResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| AuthError::credential(path, format!("opening credentials: {}", e)))?;
        let credential =
            Self::from_json(&content).map_err(|reason| AuthError::credential(path, reason))?;
        debug!("loaded application credential from {:?}", path);
        Ok(credential)
    }

    /// Parses and validates a credential JSON document.
    pub fn from_json(json: &str) -> Result<Self, String> {
        let file: CredentialsFile = serde_json::from_str(json)
            .map_err(|e| format!("failed to parse credentials JSON: {}", e))?;

        let credential = if let Some(nested) = file.installed.or(file.web) {
            Self {
                client_id: nested.client_id,
                client_secret: nested.client_secret,
                auth_uri: nested.auth_uri.unwrap_or_else(|| GOOGLE_AUTH_URL.to_string()),
                token_uri: nested.token_uri.unwrap_or_else(|| GOOGLE_TOKEN_URL.to_string()),
                redirect_uris: nested.redirect_uris,
            }
        } else if let (Some(client_id), Some(client_secret)) = (file.client_id, file.client_secret)
        {
            Self {
                client_id,
                client_secret,
                auth_uri: file.auth_uri.unwrap_or_else(|| GOOGLE_AUTH_URL.to_string()),
                token_uri: file.token_uri.unwrap_or_else(|| GOOGLE_TOKEN_URL.to_string()),
                redirect_uris: file.redirect_uris,
            }
        } else {
            return Err("credentials file must contain an 'installed'/'web' section or 'client_id'/'client_secret' at root level".to_string());
        };

        credential.validate()?;
        if !credential.supports_loopback() {
            warn!(
                "credential redirect URIs {:?} contain no loopback address; is it a 'Desktop app' client?",
                credential.redirect_uris
            );
        }
        Ok(credential)
    }

    /// Checks that the credential is usable for the authorization-code grant.
    pub fn validate(&self) -> Result<(), String> {
        if self.client_id.trim().is_empty() {
            return Err("client_id is required".to_string());
        }
        if self.client_secret.trim().is_empty() {
            return Err("client_secret is required".to_string());
        }
        Url::parse(&self.auth_uri).map_err(|e| format!("invalid auth_uri: {}", e))?;
        Url::parse(&self.token_uri).map_err(|e| format!("invalid token_uri: {}", e))?;
        Ok(())
    }

    /// Returns true if a loopback redirect is allowed for this client.
    ///
    /// An empty list is treated as allowed.
    pub fn supports_loopback(&self) -> bool {
        self.redirect_uris.is_empty()
            || self.redirect_uris.iter().any(|uri| {
                Url::parse(uri).is_ok_and(|u| {
                    matches!(u.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"))
                }) || uri.starts_with("urn:ietf:wg:oauth:2.0:oob")
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_json_installed() {
        let json = r#"{
            "installed": {
                "client_id": "test-id.apps.googleusercontent.com",
                "project_id": "my-project",
                "auth_uri": "https://accounts.google.com/o/oauth2/auth",
                "token_uri": "https://oauth2.googleapis.com/token",
                "client_secret": "test-secret",
                "redirect_uris": ["http://localhost"]
            }
        }"#;

        let creds = ApplicationCredential::from_json(json).unwrap();
        assert_eq!(creds.client_id, "test-id.apps.googleusercontent.com");
        assert_eq!(creds.client_secret, "test-secret");
        assert_eq!(creds.token_uri, GOOGLE_TOKEN_URL);
        assert!(creds.supports_loopback());
    }

    #[test]
    fn from_json_web_with_custom_endpoints() {
        let json = r#"{
            "web": {
                "client_id": "web-id",
                "client_secret": "web-secret",
                "auth_uri": "http://127.0.0.1:9999/auth",
                "token_uri": "http://127.0.0.1:9999/token"
            }
        }"#;

        let creds = ApplicationCredential::from_json(json).unwrap();
        assert_eq!(creds.auth_uri, "http://127.0.0.1:9999/auth");
        assert_eq!(creds.token_uri, "http://127.0.0.1:9999/token");
    }

    #[test]
    fn from_json_flat_uses_default_endpoints() {
        let json = r#"{
            "client_id": "flat-id",
            "client_secret": "flat-secret",
            "refresh_token": "ignored"
        }"#;

        let creds = ApplicationCredential::from_json(json).unwrap();
        assert_eq!(creds, ApplicationCredential::new("flat-id", "flat-secret"));
    }

    #[test]
    fn from_json_rejects_malformed_documents() {
        let cases = [
            "not json",
            "",
            r#"{ "other": {} }"#,
            r#"{ "client_id": "only-id" }"#,
            r#"{ "installed": { "client_id": "id" } }"#,
            r#"{ "installed": { "client_id": "", "client_secret": "s" } }"#,
            r#"{ "installed": { "client_id": "id", "client_secret": "  " } }"#,
            r#"{ "installed": { "client_id": "id", "client_secret": "s", "token_uri": "not a url" } }"#,
        ];
        for case in cases {
            assert!(
                ApplicationCredential::from_json(case).is_err(),
                "accepted malformed credential: {case:?}"
            );
        }
    }

    #[test]
    fn load_missing_file_is_credential_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        let err = ApplicationCredential::load(&path).unwrap_err();
        assert_eq!(err.kind(), crate::AuthErrorKind::MissingOrInvalidCredential);
        assert!(err.to_string().contains("credentials.json"));
    }

    #[test]
    fn load_malformed_file_is_credential_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, "{\"installed\": ").unwrap();
        let err = ApplicationCredential::load(&path).unwrap_err();
        assert_eq!(err.kind(), crate::AuthErrorKind::MissingOrInvalidCredential);
    }

    #[test]
    fn non_loopback_redirects_are_detected() {
        let mut creds = ApplicationCredential::new("id", "secret");
        creds.redirect_uris = vec!["https://example.com/oauth".to_string()];
        assert!(!creds.supports_loopback());
    }

    #[test]
    fn remediation_names_the_path() {
        let msg = remediation_message(Path::new("/home/ada/.google-rotation-planner/credentials.json"));
        assert!(msg.starts_with("The credentials are not initialized."));
        assert!(msg.contains("\"/home/ada/.google-rotation-planner/credentials.json\""));
        assert!(!msg.contains("{path}"));
    }
}
