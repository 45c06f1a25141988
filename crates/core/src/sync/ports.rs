//! Port interfaces for external-provider synchronization

use async_trait::async_trait;
use tandem_domain::{
    DeltaPage, ProviderCredential, RefreshedCredential, Result, SyncAttempt, SyncSettings,
};

/// Parameters for one provider delta request.
///
/// `cursor` is the opaque sync cursor (incremental mode); `page_token` is
/// the in-flight pagination continuation. Full mode passes neither on the
/// first page and only `page_token` afterwards.
#[derive(Debug, Clone, Default)]
pub struct DeltaRequest {
    pub cursor: Option<String>,
    pub page_token: Option<String>,
}

/// Trait for the external calendar provider API.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Fetch one page of event deltas.
    ///
    /// A stale or invalid cursor is reported through `DeltaPage::rejected`,
    /// not as an error: the engine reacts by clearing the cursor and
    /// rerunning in full mode.
    async fn fetch_delta(
        &self,
        access_token: &str,
        provider_calendar_id: &str,
        request: DeltaRequest,
    ) -> Result<DeltaPage>;

    /// Exchange a refresh token for a fresh access credential.
    ///
    /// # Errors
    ///
    /// A revoked grant surfaces as `TandemError::ReauthRequired`; retrying
    /// will not help and callers must surface it distinctly.
    async fn refresh_credential(&self, refresh_token: &str) -> Result<RefreshedCredential>;
}

/// Trait for persisted per-user sync settings and the sync cursor.
#[async_trait]
pub trait SyncStateStore: Send + Sync {
    /// Settings row for the user, if the integration is configured.
    async fn get_settings(&self, user_id: &str) -> Result<Option<SyncSettings>>;

    /// Persist a new cursor token (replaces any previous one).
    async fn save_cursor(&self, user_id: &str, token: &str) -> Result<()>;

    /// Drop the cursor so the next sync runs in full mode.
    async fn clear_cursor(&self, user_id: &str) -> Result<()>;
}

/// Trait for provider credential storage (keychain-backed in production).
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Stored credential set for the user.
    async fn get(&self, user_id: &str) -> Result<Option<ProviderCredential>>;

    /// Persist an updated credential set.
    async fn store(&self, user_id: &str, credential: &ProviderCredential) -> Result<()>;
}

/// Trait for the best-effort sync attempt side channel.
///
/// Recording is fire-and-forget: a failure here is logged and swallowed and
/// never affects the sync state machine's outcome.
#[async_trait]
pub trait SyncAttemptLog: Send + Sync {
    /// Record one attempt.
    async fn record(&self, attempt: &SyncAttempt) -> Result<()>;
}
