//! Google Calendar provider implementation
//!
//! Implements the `ProviderClient` port over the Calendar v3 REST API.
//! Incremental fetches pass the stored `syncToken`; pagination continues
//! with `pageToken`. HTTP 410 GONE is Google's expired-cursor signal and is
//! reported as a rejected delta page, never as an error; the engine reacts
//! by clearing the cursor and rerunning in full mode.

pub mod credentials;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tandem_core::{DeltaRequest, ProviderClient};
use tandem_domain::constants::PROVIDER_PAGE_SIZE;
use tandem_domain::{
    DeltaPage, ProviderEvent, RefreshedCredential, Result, TandemError,
};
use tracing::{debug, instrument, warn};

use crate::errors::InfraError;

const GOOGLE_CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
const GOOGLE_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const EVENT_FIELDS: &str =
    "items(id,status,summary,description,start,end,updated),nextPageToken,nextSyncToken";

/// Configuration for the Google Calendar provider.
#[derive(Debug, Clone)]
pub struct GoogleProviderConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Calendar API base URL (overridable for tests).
    pub api_base: String,
    /// OAuth token endpoint (overridable for tests).
    pub token_endpoint: String,
}

impl GoogleProviderConfig {
    /// Production endpoints for the given OAuth client.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            api_base: GOOGLE_CALENDAR_API_BASE.to_string(),
            token_endpoint: GOOGLE_TOKEN_ENDPOINT.to_string(),
        }
    }
}

/// Google Calendar provider.
pub struct GoogleCalendarProvider {
    client: Client,
    config: GoogleProviderConfig,
}

impl GoogleCalendarProvider {
    /// Create a provider with a shared HTTP client.
    pub fn new(config: GoogleProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(InfraError::from)?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl ProviderClient for GoogleCalendarProvider {
    #[instrument(skip(self, access_token, request))]
    async fn fetch_delta(
        &self,
        access_token: &str,
        provider_calendar_id: &str,
        request: DeltaRequest,
    ) -> Result<DeltaPage> {
        let url = format!(
            "{}/calendars/{}/events",
            self.config.api_base, provider_calendar_id
        );

        let mut query: Vec<(&str, String)> = vec![
            ("maxResults", PROVIDER_PAGE_SIZE.to_string()),
            ("showDeleted", "true".to_string()),
            ("fields", EVENT_FIELDS.to_string()),
        ];
        match &request.cursor {
            Some(cursor) => query.push(("syncToken", cursor.clone())),
            // A full fetch flattens recurrences; a sync-token fetch must not
            // pass singleEvents alongside the token.
            None => query.push(("singleEvents", "true".to_string())),
        }
        if let Some(page_token) = &request.page_token {
            query.push(("pageToken", page_token.clone()));
        }

        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .query(&query)
            .send()
            .await
            .map_err(InfraError::from)?;

        if response.status() == StatusCode::GONE {
            warn!(provider_calendar_id, "sync token rejected by provider (410 GONE)");
            return Ok(DeltaPage { rejected: true, ..DeltaPage::default() });
        }

        if !response.status().is_success() {
            let status = response.status();
            let error_text =
                response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(InfraError(map_api_error(status, &error_text)).into());
        }

        let events_response: GoogleEventsResponse =
            response.json().await.map_err(|e| {
                InfraError(TandemError::Network(format!(
                    "Failed to parse Google response: {e}"
                )))
            })?;

        let mut items = Vec::with_capacity(events_response.items.len());
        for event in events_response.items {
            items.push(provider_event_from_google(event)?);
        }

        debug!(
            items = items.len(),
            has_next_page = events_response.next_page_token.is_some(),
            "fetched delta page"
        );

        Ok(DeltaPage {
            items,
            next_page_token: events_response.next_page_token,
            next_cursor: events_response.next_sync_token,
            rejected: false,
        })
    }

    #[instrument(skip(self, refresh_token))]
    async fn refresh_credential(&self, refresh_token: &str) -> Result<RefreshedCredential> {
        let response = self
            .client
            .post(&self.config.token_endpoint)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(InfraError::from)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text =
                response.text().await.unwrap_or_else(|_| "Unknown error".to_string());

            // invalid_grant means the refresh token itself is revoked or
            // expired; retrying cannot succeed, the user must re-authorize.
            if error_text.contains("invalid_grant") {
                return Err(TandemError::ReauthRequired(
                    "provider grant revoked or expired".into(),
                ));
            }

            return Err(TandemError::Auth(format!(
                "Token refresh failed ({status}): {error_text}"
            )));
        }

        let refresh_response: GoogleTokenRefreshResponse =
            response.json().await.map_err(|e| {
                InfraError(TandemError::Auth(format!("Failed to parse token response: {e}")))
            })?;

        Ok(RefreshedCredential {
            access_token: refresh_response.access_token,
            expires_at: Utc::now() + chrono::Duration::seconds(refresh_response.expires_in),
        })
    }
}

fn map_api_error(status: StatusCode, body: &str) -> TandemError {
    let message = format!("Google API error ({status}): {body}");
    match status.as_u16() {
        401 | 403 => TandemError::Auth(message),
        404 => TandemError::NotFound(message),
        _ => TandemError::Network(message),
    }
}

fn provider_event_from_google(event: GoogleCalendarEvent) -> Result<ProviderEvent> {
    let cancelled = event.status.as_deref() == Some("cancelled");
    let all_day = event
        .start
        .as_ref()
        .map(|dt| dt.date.is_some())
        .unwrap_or(false);

    let start = event.start.as_ref().map(parse_event_time).transpose()?.flatten();
    let end = event.end.as_ref().map(parse_event_time).transpose()?.flatten();

    let updated_at = event
        .updated
        .as_deref()
        .map(|value| {
            DateTime::parse_from_rfc3339(value)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| {
                    TandemError::Validation(format!("Invalid updated timestamp '{value}': {e}"))
                })
        })
        .transpose()?;

    Ok(ProviderEvent {
        external_ref: event.id,
        title: event.summary.filter(|s| !s.trim().is_empty()),
        description: event.description,
        start,
        end,
        all_day,
        cancelled,
        updated_at,
    })
}

/// Parse Google's event time: either an all-day `date` (taken as UTC
/// midnight) or an RFC 3339 `dateTime`, which some responses emit without an
/// explicit offset.
fn parse_event_time(value: &GoogleEventDateTime) -> Result<Option<DateTime<Utc>>> {
    if let Some(date) = &value.date {
        let parsed = chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|e| {
            TandemError::Validation(format!("Invalid all-day date '{date}': {e}"))
        })?;
        let midnight = parsed.and_hms_opt(0, 0, 0).ok_or_else(|| {
            TandemError::Validation(format!(
                "Invalid all-day date '{date}': could not derive midnight"
            ))
        })?;
        return Ok(Some(midnight.and_utc()));
    }

    let Some(date_time) = &value.date_time else {
        return Ok(None);
    };

    let trimmed = date_time.trim();
    let has_explicit_timezone = trimmed.ends_with('Z')
        || trimmed
            .rfind('T')
            .is_some_and(|idx| trimmed[idx + 1..].chars().any(|c| matches!(c, '+' | '-')));

    let candidate =
        if has_explicit_timezone { trimmed.to_string() } else { format!("{trimmed}Z") };

    DateTime::parse_from_rfc3339(&candidate)
        .map(|dt| Some(dt.with_timezone(&Utc)))
        .map_err(|e| {
            TandemError::Validation(format!("Invalid event timestamp '{date_time}': {e}"))
        })
}

#[derive(Debug, Deserialize)]
struct GoogleTokenRefreshResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct GoogleEventsResponse {
    #[serde(default)]
    items: Vec<GoogleCalendarEvent>,
    #[serde(rename = "nextSyncToken")]
    next_sync_token: Option<String>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleCalendarEvent {
    id: String,
    status: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    start: Option<GoogleEventDateTime>,
    end: Option<GoogleEventDateTime>,
    updated: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleEventDateTime {
    #[serde(rename = "dateTime")]
    date_time: Option<String>,
    date: Option<String>,
}
