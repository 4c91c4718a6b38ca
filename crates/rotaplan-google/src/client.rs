//! Authenticated Google Calendar v3 client.
//!
//! [`CalendarService`] is what the [`Authenticator`](crate::Authenticator)
//! hands out. It attaches the bearer token to every request and renews an
//! expired access token in memory before sending.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rotaplan_core::{BoxFuture, CalendarApi, CalendarError, CalendarEvent, CalendarResult, EventDraft};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{AuthError, AuthResult};
use crate::oauth::OAuthClient;
use crate::tokens::CachedToken;

/// Builds the HTTP client shared by the OAuth and Calendar calls.
pub(crate) fn http_client(timeout: Duration) -> AuthResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AuthError::ClientSetup(e.to_string()))
}

/// An authenticated handle on the Calendar API.
#[derive(Debug)]
pub struct CalendarService {
    http_client: reqwest::Client,
    api_base: String,
    oauth: OAuthClient,
    token: Mutex<CachedToken>,
}

impl CalendarService {
    pub fn new(
        http_client: reqwest::Client,
        api_base: impl Into<String>,
        oauth: OAuthClient,
        token: CachedToken,
    ) -> Self {
        Self {
            http_client,
            api_base: api_base.into(),
            oauth,
            token: Mutex::new(token),
        }
    }

    /// Returns the current token, refreshing it first if it expired.
    ///
    /// The refreshed token is kept in memory only.
    pub async fn token(&self) -> CalendarResult<CachedToken> {
        let mut token = self.token.lock().await;
        if token.is_expired() {
            info!("access token expired, refreshing");
            *token = self.oauth.refresh(&token).await?;
        }
        Ok(token.clone())
    }

    /// Checks that the token is accepted, with the cheapest authenticated call.
    pub async fn probe(&self) -> CalendarResult<()> {
        let url = format!("{}/users/me/calendarList", self.api_base);
        let token = self.token().await?;
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&token.access_token)
            .query(&[("maxResults", "1")])
            .send()
            .await
            .map_err(map_send_error)?;

        check_status(response).await?;
        debug!("probe call succeeded");
        Ok(())
    }

    /// Lists upcoming events, following every page.
    pub async fn list_events(
        &self,
        calendar_id: &str,
        time_min: DateTime<Utc>,
    ) -> CalendarResult<Vec<CalendarEvent>> {
        let url = format!(
            "{}/calendars/{}/events",
            self.api_base,
            urlencoding::encode(calendar_id)
        );
        let time_min = time_min.to_rfc3339_opts(SecondsFormat::Secs, true);

        let mut events = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let token = self.token().await?;
            let mut request = self
                .http_client
                .get(&url)
                .bearer_auth(&token.access_token)
                .query(&[("timeMin", time_min.as_str()), ("showDeleted", "false")]);
            if let Some(ref page) = page_token {
                request = request.query(&[("pageToken", page.as_str())]);
            }

            let response = check_status(request.send().await.map_err(map_send_error)?).await?;
            let page: EventListResponse = parse_json(response).await?;
            events.extend(
                page.items
                    .into_iter()
                    .map(|item| CalendarEvent::new(item.id, item.summary.unwrap_or_default())),
            );

            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        debug!("listed {} upcoming events in {}", events.len(), calendar_id);
        Ok(events)
    }

    /// Inserts an event and returns its identifier.
    pub async fn create_event(
        &self,
        calendar_id: &str,
        event: &EventDraft,
        notify: bool,
    ) -> CalendarResult<String> {
        let url = format!(
            "{}/calendars/{}/events",
            self.api_base,
            urlencoding::encode(calendar_id)
        );
        let token = self.token().await?;
        let mut request = self
            .http_client
            .post(&url)
            .bearer_auth(&token.access_token)
            .query(&[("sendUpdates", if notify { "all" } else { "none" })])
            .json(event);
        if event.has_attachments() {
            request = request.query(&[("supportsAttachments", "true")]);
        }

        let response = check_status(request.send().await.map_err(map_send_error)?).await?;
        let created: InsertedEvent = parse_json(response).await?;
        Ok(created.id)
    }

    /// Deletes an event.
    pub async fn remove_event(&self, calendar_id: &str, event_id: &str) -> CalendarResult<()> {
        let url = format!(
            "{}/calendars/{}/events/{}",
            self.api_base,
            urlencoding::encode(calendar_id),
            urlencoding::encode(event_id)
        );
        let token = self.token().await?;
        let response = self
            .http_client
            .delete(&url)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(map_send_error)?;

        check_status(response).await?;
        Ok(())
    }
}

impl CalendarApi for CalendarService {
    fn list_upcoming<'a>(
        &'a self,
        calendar_id: &'a str,
        from: DateTime<Utc>,
    ) -> BoxFuture<'a, CalendarResult<Vec<CalendarEvent>>> {
        Box::pin(self.list_events(calendar_id, from))
    }

    fn insert_event<'a>(
        &'a self,
        calendar_id: &'a str,
        event: &'a EventDraft,
        notify: bool,
    ) -> BoxFuture<'a, CalendarResult<String>> {
        Box::pin(self.create_event(calendar_id, event, notify))
    }

    fn delete_event<'a>(
        &'a self,
        calendar_id: &'a str,
        event_id: &'a str,
    ) -> BoxFuture<'a, CalendarResult<()>> {
        Box::pin(self.remove_event(calendar_id, event_id))
    }
}

fn map_send_error(e: reqwest::Error) -> CalendarError {
    let err = if e.is_timeout() {
        CalendarError::network("request timeout")
    } else if e.is_connect() {
        CalendarError::network(format!("connection failed: {}", e))
    } else {
        CalendarError::network(format!("request failed: {}", e))
    };
    err.with_source(e)
}

/// Maps a non-success status to a [`CalendarError`].
async fn check_status(response: reqwest::Response) -> CalendarResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());
        return Err(CalendarError::rate_limited(format!(
            "rate limit exceeded{}",
            retry_after
                .map(|s| format!(", retry after {} seconds", s))
                .unwrap_or_default()
        )));
    }

    let body = response.text().await.unwrap_or_default();
    Err(match status {
        reqwest::StatusCode::UNAUTHORIZED => {
            CalendarError::authentication("access token expired or invalid")
        }
        reqwest::StatusCode::FORBIDDEN => {
            CalendarError::authorization(format!("access denied: {}", body))
        }
        reqwest::StatusCode::NOT_FOUND | reqwest::StatusCode::GONE => {
            CalendarError::not_found(format!("not found: {}", body))
        }
        s if s.is_client_error() => CalendarError::bad_request(format!("API error ({}): {}", s, body)),
        s => CalendarError::server(format!("API error ({}): {}", s, body)),
    })
}

async fn parse_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> CalendarResult<T> {
    let body = response
        .text()
        .await
        .map_err(|e| CalendarError::network(format!("failed to read response: {}", e)))?;
    serde_json::from_str(&body)
        .map_err(|e| CalendarError::invalid_response(format!("failed to parse response: {}", e)))
}

/// Response from the events list endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventListResponse {
    #[serde(default)]
    items: Vec<EventItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventItem {
    id: String,
    summary: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InsertedEvent {
    id: String,
}
