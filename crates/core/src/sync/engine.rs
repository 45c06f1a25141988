//! External provider sync engine
//!
//! Drives incremental synchronization against an external calendar provider
//! using a persisted opaque cursor, falling back to full pagination when the
//! provider rejects the cursor, and reconciling provider events into the
//! event service exactly like a client write would. Reconciliation is keyed
//! by `(calendar_id, external_ref)` rather than positional order, so
//! re-applying the same payload is always safe.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tandem_domain::constants::CREDENTIAL_REFRESH_THRESHOLD_SECS;
use tandem_domain::{
    EventPatch, ExternalLink, NewEventInput, ProviderCredential, ProviderEvent, Result,
    SyncAttempt, SyncMode, SyncOutcome, SyncReport, SyncSettings, TandemError,
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::ports::{CredentialStore, DeltaRequest, ProviderClient, SyncAttemptLog, SyncStateStore};
use super::quota::{QuotaGuard, QuotaGuardConfig};
use crate::events::ports::MembershipStore;
use crate::events::service::EventService;

const UNTITLED_EVENT: &str = "Untitled event";

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct SyncEngineConfig {
    /// Refresh the access credential when it expires within this threshold.
    pub refresh_threshold_seconds: i64,
    /// Per-user trigger budget.
    pub quota: QuotaGuardConfig,
}

impl Default for SyncEngineConfig {
    fn default() -> Self {
        Self {
            refresh_threshold_seconds: CREDENTIAL_REFRESH_THRESHOLD_SECS,
            quota: QuotaGuardConfig::default(),
        }
    }
}

/// All pages of one provider fetch, accumulated before application.
struct PageCollection {
    items: Vec<ProviderEvent>,
    next_cursor: Option<String>,
    rejected: bool,
}

/// Removes the user from the in-flight set when the sync run ends, however
/// it ends.
struct InFlightGuard {
    user_id: String,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.lock().expect("in-flight set poisoned").remove(&self.user_id);
    }
}

/// External provider sync engine.
pub struct ExternalSyncEngine {
    provider: Arc<dyn ProviderClient>,
    events: Arc<EventService>,
    memberships: Arc<dyn MembershipStore>,
    sync_state: Arc<dyn SyncStateStore>,
    credentials: Arc<dyn CredentialStore>,
    attempts: Arc<dyn SyncAttemptLog>,
    quota: QuotaGuard,
    refresh_threshold: Duration,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl ExternalSyncEngine {
    /// Create a new sync engine.
    pub fn new(
        provider: Arc<dyn ProviderClient>,
        events: Arc<EventService>,
        memberships: Arc<dyn MembershipStore>,
        sync_state: Arc<dyn SyncStateStore>,
        credentials: Arc<dyn CredentialStore>,
        attempts: Arc<dyn SyncAttemptLog>,
        config: SyncEngineConfig,
    ) -> Self {
        Self {
            provider,
            events,
            memberships,
            sync_state,
            credentials,
            attempts,
            quota: QuotaGuard::new(config.quota),
            refresh_threshold: Duration::seconds(config.refresh_threshold_seconds),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Run one sync for the user.
    ///
    /// A trigger while a sync for the same user is already in flight is
    /// rejected as a no-op (`SyncOutcome::AlreadyRunning`); overlapping
    /// syncs would race on the per-user cursor. Every attempt is recorded on
    /// the side channel best-effort.
    ///
    /// # Errors
    ///
    /// `QuotaExceeded` when the trigger budget is spent; `ReauthRequired`
    /// when the provider grant is revoked; storage/provider errors
    /// otherwise.
    #[instrument(skip(self))]
    pub async fn trigger_sync(&self, user_id: &str) -> Result<SyncReport> {
        self.quota.check(user_id)?;

        let Some(_guard) = self.begin(user_id) else {
            debug!(user_id, "sync already in flight; trigger is a no-op");
            return Ok(SyncReport::skipped(user_id, SyncOutcome::AlreadyRunning));
        };

        let started_at = Utc::now();
        let result = self.run_sync(user_id).await;
        self.record_attempt(user_id, started_at, &result).await;
        result
    }

    /// Claim the per-user in-flight slot, or report it taken.
    fn begin(&self, user_id: &str) -> Option<InFlightGuard> {
        let mut in_flight = self.in_flight.lock().expect("in-flight set poisoned");
        if !in_flight.insert(user_id.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            user_id: user_id.to_string(),
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    async fn run_sync(&self, user_id: &str) -> Result<SyncReport> {
        let settings = self
            .sync_state
            .get_settings(user_id)
            .await?
            .ok_or_else(|| TandemError::NotFound(format!("no sync settings for {user_id}")))?;

        if !settings.enabled {
            debug!(user_id, "sync disabled for user");
            return Ok(SyncReport::skipped(user_id, SyncOutcome::Disabled));
        }

        let access_token = self.ensure_fresh_credential(user_id).await?;

        let mut mode = SyncMode::Full;
        let collection = if let Some(cursor) = &settings.cursor {
            let incremental =
                self.collect_pages(&access_token, &settings, Some(&cursor.token)).await?;
            if incremental.rejected {
                // The whole incremental attempt is discarded: nothing has
                // been applied yet, and full mode re-derives the same state.
                warn!(user_id, "provider rejected sync cursor; falling back to full sync");
                self.sync_state.clear_cursor(user_id).await?;
                self.collect_pages(&access_token, &settings, None).await?
            } else {
                mode = SyncMode::Incremental;
                incremental
            }
        } else {
            self.collect_pages(&access_token, &settings, None).await?
        };

        if collection.rejected {
            return Err(TandemError::Network(
                "provider rejected a cursorless full fetch".into(),
            ));
        }

        let (upserted, deleted) =
            self.apply_items(user_id, &settings, &collection.items).await?;

        let cursor_replaced = match collection.next_cursor {
            Some(token) => {
                self.sync_state.save_cursor(user_id, &token).await?;
                true
            }
            None => {
                debug!(user_id, "provider returned no cursor; keeping the existing one");
                false
            }
        };

        info!(
            user_id,
            mode = mode.as_str(),
            upserted,
            deleted,
            cursor_replaced,
            "sync completed"
        );

        Ok(SyncReport {
            user_id: user_id.to_string(),
            outcome: SyncOutcome::Completed,
            mode: Some(mode),
            upserted,
            deleted,
            cursor_replaced,
        })
    }

    /// Load the stored credential, refreshing it through the provider when
    /// it is expired or about to expire.
    async fn ensure_fresh_credential(&self, user_id: &str) -> Result<String> {
        let credential = self.credentials.get(user_id).await?.ok_or_else(|| {
            TandemError::ReauthRequired(format!("no stored provider credential for {user_id}"))
        })?;

        if !credential.needs_refresh(Utc::now(), self.refresh_threshold) {
            return Ok(credential.access_token);
        }

        debug!(user_id, "refreshing provider credential");
        let refreshed = self.provider.refresh_credential(&credential.refresh_token).await?;

        let updated = ProviderCredential {
            access_token: refreshed.access_token,
            refresh_token: credential.refresh_token,
            expires_at: refreshed.expires_at,
        };
        self.credentials.store(user_id, &updated).await?;

        Ok(updated.access_token)
    }

    /// Sequentially page through the provider response, accumulating items
    /// and the final cursor. Pagination is order-dependent, so pages are
    /// awaited one at a time.
    async fn collect_pages(
        &self,
        access_token: &str,
        settings: &SyncSettings,
        cursor: Option<&str>,
    ) -> Result<PageCollection> {
        let mut items = Vec::new();
        let mut next_cursor: Option<String> = None;
        let mut page_token: Option<String> = None;

        loop {
            let request = DeltaRequest {
                cursor: cursor.map(ToString::to_string),
                page_token: page_token.clone(),
            };

            let page = self
                .provider
                .fetch_delta(access_token, &settings.provider_calendar_id, request)
                .await?;

            if page.rejected {
                return Ok(PageCollection { items: Vec::new(), next_cursor: None, rejected: true });
            }

            next_cursor = page.next_cursor.or(next_cursor);
            items.extend(page.items);

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(PageCollection { items, next_cursor, rejected: false })
    }

    /// Apply provider items in received order; within one payload a later
    /// item for the same external id wins.
    async fn apply_items(
        &self,
        user_id: &str,
        settings: &SyncSettings,
        items: &[ProviderEvent],
    ) -> Result<(usize, usize)> {
        let mut upserted = 0;
        let mut deleted = 0;

        for item in items {
            if item.cancelled {
                if self.remove_mirrored(user_id, settings, item).await? {
                    deleted += 1;
                }
            } else {
                self.upsert_mirrored(user_id, settings, item).await?;
                upserted += 1;
            }
        }

        Ok((upserted, deleted))
    }

    /// Delete the local event mirroring a cancelled provider event. A
    /// missing membership is a no-op (already gone, or never mirrored);
    /// events owned by anyone other than the sync owner are never deleted,
    /// even when the membership sits in the synced calendar.
    async fn remove_mirrored(
        &self,
        user_id: &str,
        settings: &SyncSettings,
        item: &ProviderEvent,
    ) -> Result<bool> {
        let membership = self
            .memberships
            .find_by_external_ref(&settings.mirror_calendar_id, &item.external_ref)
            .await?;

        let Some(membership) = membership else {
            debug!(external_ref = %item.external_ref, "cancelled event not mirrored; skipping");
            return Ok(false);
        };

        let existing = self.events.get(&membership.event_id).await;
        let existing = match existing {
            Ok(existing) => existing,
            Err(TandemError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };

        if existing.event.created_by != user_id {
            warn!(
                event_id = %membership.event_id,
                owner = %existing.event.created_by,
                "mirrored membership points at an event owned by another user; not deleting"
            );
            return Ok(false);
        }

        self.events.delete(&membership.event_id).await?;
        Ok(true)
    }

    /// Upsert the local mirror of a provider event, keyed by
    /// `(mirror_calendar_id, external_ref)`.
    async fn upsert_mirrored(
        &self,
        user_id: &str,
        settings: &SyncSettings,
        item: &ProviderEvent,
    ) -> Result<()> {
        let existing = self
            .memberships
            .find_by_external_ref(&settings.mirror_calendar_id, &item.external_ref)
            .await?;

        if let Some(membership) = existing {
            let patch = EventPatch {
                title: Some(item.title.clone().unwrap_or_else(|| UNTITLED_EVENT.to_string())),
                description: Some(item.description.clone()),
                start: Some(item.start),
                end: Some(item.end),
                all_day: Some(item.all_day),
            };
            self.events.update(&membership.event_id, patch, None).await?;
            self.memberships
                .touch_external(
                    &membership.event_id,
                    &settings.mirror_calendar_id,
                    external_timestamp(item.updated_at),
                )
                .await?;
        } else {
            let input = NewEventInput {
                title: item.title.clone().unwrap_or_else(|| UNTITLED_EVENT.to_string()),
                description: item.description.clone(),
                start: item.start,
                end: item.end,
                all_day: item.all_day,
                created_by: user_id.to_string(),
            };
            let link = ExternalLink {
                calendar_id: settings.mirror_calendar_id.clone(),
                external_ref: item.external_ref.clone(),
                external_updated_at: item.updated_at,
            };
            self.events
                .create(input, &[settings.mirror_calendar_id.clone()], Some(&link))
                .await?;
        }

        Ok(())
    }

    /// Record the attempt on the side channel. Allowed to fail
    /// independently: a recording failure is logged and swallowed.
    async fn record_attempt(
        &self,
        user_id: &str,
        started_at: DateTime<Utc>,
        result: &Result<SyncReport>,
    ) {
        let attempt = match result {
            Ok(report) => SyncAttempt {
                id: Uuid::now_v7().to_string(),
                user_id: user_id.to_string(),
                mode: report.mode,
                outcome: match report.outcome {
                    SyncOutcome::Completed => "completed".to_string(),
                    SyncOutcome::AlreadyRunning => "already_running".to_string(),
                    SyncOutcome::Disabled => "disabled".to_string(),
                },
                events_applied: report.upserted + report.deleted,
                error: None,
                started_at,
                finished_at: Utc::now(),
            },
            Err(e) => SyncAttempt {
                id: Uuid::now_v7().to_string(),
                user_id: user_id.to_string(),
                mode: None,
                outcome: "failed".to_string(),
                events_applied: 0,
                error: Some(e.to_string()),
                started_at,
                finished_at: Utc::now(),
            },
        };

        if let Err(e) = self.attempts.record(&attempt).await {
            warn!(user_id, error = %e, "failed to record sync attempt");
        }
    }
}

fn external_timestamp(updated_at: Option<DateTime<Utc>>) -> DateTime<Utc> {
    updated_at.unwrap_or_else(Utc::now)
}
