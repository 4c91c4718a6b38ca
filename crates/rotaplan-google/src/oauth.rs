//! OAuth 2.0 authorization-code flow with PKCE.
//!
//! # Flow Overview
//!
//! 1. Generate a code verifier, its SHA-256 challenge and a random state
//! 2. Point the user's browser at the authorization URL
//! 3. Receive the code on the loopback listener
//! 4. Exchange the code (with verifier) for access and refresh tokens
//!
//! Access tokens are later renewed with [`OAuthClient::refresh`].

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng as _;
use rotaplan_core::{CalendarError, CalendarResult};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::credentials::ApplicationCredential;
use crate::error::{AuthError, AuthResult};
use crate::tokens::CachedToken;

/// The PKCE code verifier length (in bytes, before base64 encoding).
const CODE_VERIFIER_LENGTH: usize = 32;

/// PKCE flow state, one per authorization session.
///
/// Implements RFC 7636 (Proof Key for Code Exchange).
#[derive(Debug, Clone)]
pub struct PkceFlow {
    /// The code verifier (high-entropy random string).
    pub verifier: String,
    /// The code challenge (SHA-256 of the verifier, base64url encoded).
    pub challenge: String,
    /// Random state echoed back by the authorization server.
    pub state: String,
}

impl PkceFlow {
    /// Creates a new PKCE flow with random verifier and state.
    pub fn new() -> Self {
        let verifier = random_token(CODE_VERIFIER_LENGTH);
        let challenge = Self::compute_challenge(&verifier);
        Self {
            verifier,
            challenge,
            state: random_token(16),
        }
    }

    fn compute_challenge(verifier: &str) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
    }
}

impl Default for PkceFlow {
    fn default() -> Self {
        Self::new()
    }
}

fn random_token(len: usize) -> String {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..len).map(|_| rng.random()).collect();
    URL_SAFE_NO_PAD.encode(&bytes)
}

/// Response from the token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    token_type: Option<String>,
    /// Space-separated granted scopes.
    #[serde(default)]
    scope: Option<String>,
}

/// Talks to the credential's authorization and token endpoints.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    credential: ApplicationCredential,
    http_client: reqwest::Client,
}

impl OAuthClient {
    pub fn new(credential: ApplicationCredential, http_client: reqwest::Client) -> Self {
        Self {
            credential,
            http_client,
        }
    }

    pub fn credential(&self) -> &ApplicationCredential {
        &self.credential
    }

    /// Builds the URL the user opens to grant access.
    pub fn authorization_url(&self, pkce: &PkceFlow, redirect_uri: &str, scopes: &[String]) -> String {
        let separator = if self.credential.auth_uri.contains('?') { '&' } else { '?' };
        format!(
            "{}{}access_type=offline&client_id={}&code_challenge={}&code_challenge_method=S256&\
            prompt=consent&redirect_uri={}&response_type=code&scope={}&state={}",
            self.credential.auth_uri,
            separator,
            urlencoding::encode(&self.credential.client_id),
            urlencoding::encode(&pkce.challenge),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scopes.join(" ")),
            urlencoding::encode(&pkce.state),
        )
    }

    /// Exchanges an authorization code for a token.
    pub async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
        scopes: &[String],
    ) -> AuthResult<CachedToken> {
        let params = [
            ("client_id", self.credential.client_id.as_str()),
            ("client_secret", self.credential.client_secret.as_str()),
            ("code", code),
            ("code_verifier", verifier),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ];

        let (status, body) = self
            .post_token_endpoint(&params)
            .await
            .map_err(|e| AuthError::CodeExchange(e.to_string()))?;
        if !status.is_success() {
            return Err(AuthError::CodeExchange(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }

        let response: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| AuthError::CodeExchange(format!("invalid token response: {}", e)))?;

        let granted = match response.scope {
            Some(ref scope) => scope.split_whitespace().map(String::from).collect(),
            None => scopes.to_vec(),
        };
        let mut token = CachedToken::new(
            response.access_token,
            response.refresh_token,
            response.expires_in,
            granted,
        );
        if let Some(token_type) = response.token_type {
            token.token_type = token_type;
        }

        info!("obtained a new token");
        Ok(token)
    }

    /// Obtains a new access token with the refresh token of `token`.
    pub async fn refresh(&self, token: &CachedToken) -> CalendarResult<CachedToken> {
        let refresh_token = token.refresh_token.as_deref().ok_or_else(|| {
            CalendarError::authentication("access token expired and no refresh token is cached")
        })?;
        let params = [
            ("client_id", self.credential.client_id.as_str()),
            ("client_secret", self.credential.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let (status, body) = self.post_token_endpoint(&params).await?;
        if status.is_client_error() {
            return Err(CalendarError::authentication(format!(
                "token refresh failed ({}): {}",
                status, body
            )));
        }
        if !status.is_success() {
            return Err(CalendarError::server(format!(
                "token refresh failed ({}): {}",
                status, body
            )));
        }

        let response: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            CalendarError::invalid_response(format!("invalid token response: {}", e))
        })?;

        debug!("refreshed access token");
        Ok(token.refreshed(
            response.access_token,
            response.refresh_token,
            response.expires_in,
        ))
    }

    async fn post_token_endpoint(
        &self,
        params: &[(&str, &str)],
    ) -> CalendarResult<(reqwest::StatusCode, String)> {
        let response = self
            .http_client
            .post(&self.credential.token_uri)
            .form(params)
            .send()
            .await
            .map_err(|e| CalendarError::network(format!("token request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CalendarError::network(format!("failed to read response: {}", e)))?;
        Ok((status, body))
    }
}
