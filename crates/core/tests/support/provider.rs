//! Scripted provider client and in-memory sync-state/credential mocks.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tandem_core::{CredentialStore, DeltaRequest, ProviderClient, SyncAttemptLog, SyncStateStore};
use tandem_domain::{
    DeltaPage, ProviderCredential, RefreshedCredential, Result as DomainResult, SyncAttempt,
    SyncSettings, TandemError,
};

/// Provider mock that replays a queue of scripted delta pages and records
/// every request it sees.
#[derive(Default)]
struct ProviderState {
    pages: VecDeque<DomainResult<DeltaPage>>,
    requests: Vec<DeltaRequest>,
    refresh_response: Option<DomainResult<RefreshedCredential>>,
    refresh_calls: usize,
}

#[derive(Default, Clone)]
pub struct ScriptedProvider {
    state: Arc<Mutex<ProviderState>>,
    /// Artificial latency per fetch, for re-entrancy tests.
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self { state: Arc::default(), delay: Some(delay) }
    }

    /// Queue one page response (consumed in FIFO order).
    pub fn push_page(&self, page: DeltaPage) {
        self.state.lock().unwrap().pages.push_back(Ok(page));
    }

    pub fn push_error(&self, error: TandemError) {
        self.state.lock().unwrap().pages.push_back(Err(error));
    }

    /// Script the refresh response; unset means refresh fails loudly.
    pub fn set_refresh_response(&self, response: DomainResult<RefreshedCredential>) {
        self.state.lock().unwrap().refresh_response = Some(response);
    }

    pub fn requests(&self) -> Vec<DeltaRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn refresh_calls(&self) -> usize {
        self.state.lock().unwrap().refresh_calls
    }
}

#[async_trait]
impl ProviderClient for ScriptedProvider {
    async fn fetch_delta(
        &self,
        _access_token: &str,
        _provider_calendar_id: &str,
        request: DeltaRequest,
    ) -> DomainResult<DeltaPage> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        state.requests.push(request);
        state
            .pages
            .pop_front()
            .unwrap_or_else(|| Err(TandemError::Network("no scripted page left".into())))
    }

    async fn refresh_credential(
        &self,
        _refresh_token: &str,
    ) -> DomainResult<RefreshedCredential> {
        let mut state = self.state.lock().unwrap();
        state.refresh_calls += 1;
        state
            .refresh_response
            .clone()
            .unwrap_or_else(|| Err(TandemError::Auth("no scripted refresh response".into())))
    }
}

/// In-memory mock for `SyncStateStore`.
#[derive(Default, Clone)]
pub struct MemorySyncState {
    settings: Arc<Mutex<HashMap<String, SyncSettings>>>,
}

impl MemorySyncState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, settings: SyncSettings) {
        self.settings.lock().unwrap().insert(settings.user_id.clone(), settings);
    }

    pub fn cursor_token(&self, user_id: &str) -> Option<String> {
        self.settings
            .lock()
            .unwrap()
            .get(user_id)
            .and_then(|s| s.cursor.as_ref().map(|c| c.token.clone()))
    }
}

#[async_trait]
impl SyncStateStore for MemorySyncState {
    async fn get_settings(&self, user_id: &str) -> DomainResult<Option<SyncSettings>> {
        Ok(self.settings.lock().unwrap().get(user_id).cloned())
    }

    async fn save_cursor(&self, user_id: &str, token: &str) -> DomainResult<()> {
        let mut settings = self.settings.lock().unwrap();
        let entry = settings
            .get_mut(user_id)
            .ok_or_else(|| TandemError::NotFound(format!("no sync settings for {user_id}")))?;
        entry.cursor = Some(tandem_domain::SyncCursor {
            token: token.to_string(),
            updated_at: chrono::Utc::now(),
        });
        Ok(())
    }

    async fn clear_cursor(&self, user_id: &str) -> DomainResult<()> {
        let mut settings = self.settings.lock().unwrap();
        let entry = settings
            .get_mut(user_id)
            .ok_or_else(|| TandemError::NotFound(format!("no sync settings for {user_id}")))?;
        entry.cursor = None;
        Ok(())
    }
}

/// In-memory mock for `CredentialStore`.
#[derive(Default, Clone)]
pub struct MemoryCredentialStore {
    credentials: Arc<Mutex<HashMap<String, ProviderCredential>>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user_id: &str, credential: ProviderCredential) {
        self.credentials.lock().unwrap().insert(user_id.to_string(), credential);
    }

    pub fn access_token(&self, user_id: &str) -> Option<String> {
        self.credentials.lock().unwrap().get(user_id).map(|c| c.access_token.clone())
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(&self, user_id: &str) -> DomainResult<Option<ProviderCredential>> {
        Ok(self.credentials.lock().unwrap().get(user_id).cloned())
    }

    async fn store(
        &self,
        user_id: &str,
        credential: &ProviderCredential,
    ) -> DomainResult<()> {
        self.credentials.lock().unwrap().insert(user_id.to_string(), credential.clone());
        Ok(())
    }
}

/// Attempt log mock; optionally fails every write to prove the side channel
/// is fire-and-forget.
#[derive(Default, Clone)]
pub struct RecordingAttemptLog {
    attempts: Arc<Mutex<Vec<SyncAttempt>>>,
    fail: Arc<Mutex<bool>>,
}

impl RecordingAttemptLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let log = Self::default();
        *log.fail.lock().unwrap() = true;
        log
    }

    pub fn attempts(&self) -> Vec<SyncAttempt> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl SyncAttemptLog for RecordingAttemptLog {
    async fn record(&self, attempt: &SyncAttempt) -> DomainResult<()> {
        if *self.fail.lock().unwrap() {
            return Err(TandemError::Database("attempt log unavailable".into()));
        }
        self.attempts.lock().unwrap().push(attempt.clone());
        Ok(())
    }
}
