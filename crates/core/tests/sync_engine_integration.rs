//! Integration tests for the external sync engine: cursor lifecycle,
//! rejected-cursor fallback, idempotent reconciliation, credential refresh,
//! and the trigger guards.

mod support;

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use tandem_core::{
    EventService, ExternalSyncEngine, OptimisticMutationCoordinator, QuotaGuardConfig,
    SyncEngineConfig,
};
use tandem_domain::{
    DeltaPage, NewCalendarInput, ProviderCredential, ProviderEvent, RefreshedCredential,
    SyncMode, SyncOutcome, SyncSettings, TandemError,
};

use support::{
    MemoryCredentialStore, MemorySyncState, MemoryStore, RecordingAttemptLog, ScriptedProvider,
};

const USER: &str = "alice";

struct Harness {
    store: MemoryStore,
    provider: ScriptedProvider,
    sync_state: MemorySyncState,
    credentials: MemoryCredentialStore,
    attempts: RecordingAttemptLog,
    engine: ExternalSyncEngine,
    events: Arc<EventService>,
    mirror_calendar_id: String,
}

async fn harness_with(provider: ScriptedProvider, config: SyncEngineConfig) -> Harness {
    let store = MemoryStore::new();
    let coordinator = Arc::new(OptimisticMutationCoordinator::default());
    let events = Arc::new(EventService::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        coordinator,
    ));

    let mirror_calendar_id = events
        .create_calendar(NewCalendarInput {
            name: "Google mirror".to_string(),
            color: None,
            created_by: USER.to_string(),
        })
        .await
        .unwrap()
        .id;

    let sync_state = MemorySyncState::new();
    sync_state.insert(SyncSettings {
        user_id: USER.to_string(),
        enabled: true,
        provider_calendar_id: "primary".to_string(),
        mirror_calendar_id: mirror_calendar_id.clone(),
        cursor: None,
    });

    let credentials = MemoryCredentialStore::new();
    credentials.insert(
        USER,
        ProviderCredential {
            access_token: "fresh-token".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        },
    );

    let attempts = RecordingAttemptLog::new();
    let engine = ExternalSyncEngine::new(
        Arc::new(provider.clone()),
        Arc::clone(&events),
        Arc::new(store.clone()),
        Arc::new(sync_state.clone()),
        Arc::new(credentials.clone()),
        Arc::new(attempts.clone()),
        config,
    );

    Harness {
        store,
        provider,
        sync_state,
        credentials,
        attempts,
        engine,
        events,
        mirror_calendar_id,
    }
}

async fn harness() -> Harness {
    harness_with(ScriptedProvider::new(), SyncEngineConfig::default()).await
}

fn provider_event(external_ref: &str, title: &str) -> ProviderEvent {
    ProviderEvent {
        external_ref: external_ref.to_string(),
        title: Some(title.to_string()),
        description: None,
        start: Some(Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap()),
        end: Some(Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap()),
        all_day: false,
        cancelled: false,
        updated_at: Some(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()),
    }
}

fn cancelled_event(external_ref: &str) -> ProviderEvent {
    ProviderEvent { cancelled: true, ..provider_event(external_ref, "") }
}

fn page(items: Vec<ProviderEvent>, next_cursor: Option<&str>) -> DeltaPage {
    DeltaPage {
        items,
        next_page_token: None,
        next_cursor: next_cursor.map(ToString::to_string),
        rejected: false,
    }
}

#[tokio::test]
async fn full_sync_from_empty_persists_cursor_and_events() {
    let h = harness().await;
    h.provider.push_page(page(
        vec![provider_event("g-1", "kickoff"), provider_event("g-2", "retro")],
        Some("T1"),
    ));

    let report = h.engine.trigger_sync(USER).await.unwrap();

    assert_eq!(report.outcome, SyncOutcome::Completed);
    assert_eq!(report.mode, Some(SyncMode::Full));
    assert_eq!(report.upserted, 2);
    assert!(report.cursor_replaced);
    assert_eq!(h.sync_state.cursor_token(USER).as_deref(), Some("T1"));
    assert_eq!(h.store.event_count(), 2);

    // First request carried neither cursor nor page token.
    let requests = h.provider.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].cursor.is_none());
    assert!(requests[0].page_token.is_none());
}

#[tokio::test]
async fn full_sync_follows_pagination_sequentially() {
    let h = harness().await;
    h.provider.push_page(DeltaPage {
        items: vec![provider_event("g-1", "kickoff")],
        next_page_token: Some("page-2".to_string()),
        next_cursor: None,
        rejected: false,
    });
    h.provider.push_page(DeltaPage {
        items: vec![provider_event("g-2", "retro")],
        next_page_token: Some("page-3".to_string()),
        next_cursor: None,
        rejected: false,
    });
    h.provider.push_page(page(vec![provider_event("g-3", "demo")], Some("T1")));

    let report = h.engine.trigger_sync(USER).await.unwrap();

    assert_eq!(report.upserted, 3);
    assert_eq!(h.store.event_count(), 3);

    let requests = h.provider.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[1].page_token.as_deref(), Some("page-2"));
    assert_eq!(requests[2].page_token.as_deref(), Some("page-3"));
}

#[tokio::test]
async fn incremental_sync_passes_the_stored_cursor() {
    let h = harness().await;
    h.provider.push_page(page(vec![provider_event("g-1", "kickoff")], Some("T1")));
    h.engine.trigger_sync(USER).await.unwrap();

    h.provider.push_page(page(vec![provider_event("g-1", "kickoff (moved)")], Some("T2")));
    let report = h.engine.trigger_sync(USER).await.unwrap();

    assert_eq!(report.mode, Some(SyncMode::Incremental));
    assert_eq!(h.sync_state.cursor_token(USER).as_deref(), Some("T2"));

    let requests = h.provider.requests();
    assert_eq!(requests[1].cursor.as_deref(), Some("T1"));

    // The change converged onto the existing event, no duplicate row.
    assert_eq!(h.store.event_count(), 1);
    let events = h.store.events_snapshot();
    assert_eq!(events[0].title, "kickoff (moved)");
}

#[tokio::test]
async fn rejected_cursor_falls_back_to_full_sync() {
    let h = harness().await;
    h.provider.push_page(page(vec![provider_event("g-1", "kickoff")], Some("T1")));
    h.engine.trigger_sync(USER).await.unwrap();

    // Incremental attempt rejected, then the full-mode pass re-derives the
    // same state and lands a fresh cursor.
    h.provider.push_page(DeltaPage { rejected: true, ..DeltaPage::default() });
    h.provider.push_page(page(vec![provider_event("g-1", "kickoff")], Some("T2")));

    let report = h.engine.trigger_sync(USER).await.unwrap();

    assert_eq!(report.mode, Some(SyncMode::Full));
    assert_eq!(h.sync_state.cursor_token(USER).as_deref(), Some("T2"));
    // No duplicates versus a clean full sync from empty state.
    assert_eq!(h.store.event_count(), 1);

    let requests = h.provider.requests();
    // Rejected incremental call carried the stale cursor; the full restart
    // carried none.
    assert_eq!(requests[1].cursor.as_deref(), Some("T1"));
    assert!(requests[2].cursor.is_none());
}

#[tokio::test]
async fn applying_the_same_payload_twice_is_idempotent() {
    let h = harness().await;
    let payload = vec![
        provider_event("g-1", "kickoff"),
        provider_event("g-2", "retro"),
        cancelled_event("g-3"),
    ];
    h.provider.push_page(page(payload.clone(), Some("T1")));
    h.engine.trigger_sync(USER).await.unwrap();

    h.provider.push_page(page(payload, Some("T2")));
    h.engine.trigger_sync(USER).await.unwrap();

    // Same final state: two live mirrored events, no duplicates, no extra
    // deletes.
    assert_eq!(h.store.event_count(), 2);
    assert_eq!(h.store.membership_count(), 2);
}

#[tokio::test]
async fn later_item_in_the_same_page_wins() {
    let h = harness().await;
    h.provider.push_page(page(
        vec![provider_event("g-1", "first title"), provider_event("g-1", "second title")],
        Some("T1"),
    ));

    h.engine.trigger_sync(USER).await.unwrap();

    assert_eq!(h.store.event_count(), 1);
    assert_eq!(h.store.events_snapshot()[0].title, "second title");
}

#[tokio::test]
async fn cancelled_items_delete_only_sync_owned_events() {
    let h = harness().await;

    // Mirror one provider event for the sync owner.
    h.provider.push_page(page(vec![provider_event("g-mine", "mine")], Some("T1")));
    h.engine.trigger_sync(USER).await.unwrap();

    // A mirrored membership pointing at an event owned by someone else must
    // never be deleted by the sync path, even inside the synced calendar.
    let foreign_link = tandem_domain::ExternalLink {
        calendar_id: h.mirror_calendar_id.clone(),
        external_ref: "g-foreign".to_string(),
        external_updated_at: None,
    };
    let foreign = h
        .events
        .create(
            tandem_domain::NewEventInput {
                title: "bobs event".to_string(),
                description: None,
                start: None,
                end: None,
                all_day: false,
                created_by: "bob".to_string(),
            },
            &[h.mirror_calendar_id.clone()],
            Some(&foreign_link),
        )
        .await
        .unwrap();

    h.provider.push_page(page(
        vec![
            cancelled_event("g-mine"),
            cancelled_event("g-foreign"),
            cancelled_event("g-unknown"),
        ],
        Some("T2"),
    ));
    let report = h.engine.trigger_sync(USER).await.unwrap();

    // The owned mirror is gone; the foreign-owned event survives; the
    // unknown ref is a no-op.
    assert_eq!(report.deleted, 1);
    assert_eq!(h.store.event_count(), 1);
    assert!(h.events.get(&foreign.event.id).await.is_ok());
}

#[tokio::test]
async fn expired_credential_is_refreshed_and_stored() {
    let h = harness().await;
    h.credentials.insert(
        USER,
        ProviderCredential {
            access_token: "stale".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at: Utc::now() - chrono::Duration::minutes(5),
        },
    );
    h.provider.set_refresh_response(Ok(RefreshedCredential {
        access_token: "minted".to_string(),
        expires_at: Utc::now() + chrono::Duration::hours(1),
    }));
    h.provider.push_page(page(vec![], Some("T1")));

    h.engine.trigger_sync(USER).await.unwrap();

    assert_eq!(h.provider.refresh_calls(), 1);
    assert_eq!(h.credentials.access_token(USER).as_deref(), Some("minted"));
}

#[tokio::test]
async fn revoked_grant_surfaces_as_reauth_required() {
    let h = harness().await;
    h.credentials.insert(
        USER,
        ProviderCredential {
            access_token: "stale".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at: Utc::now() - chrono::Duration::minutes(5),
        },
    );
    h.provider
        .set_refresh_response(Err(TandemError::ReauthRequired("grant revoked".into())));

    let err = h.engine.trigger_sync(USER).await.unwrap_err();

    assert!(matches!(err, TandemError::ReauthRequired(_)));
    // The failed attempt still landed on the side channel.
    let attempts = h.attempts.attempts();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].outcome, "failed");
}

#[tokio::test]
async fn missing_credential_requires_reauth() {
    let h = harness().await;
    h.sync_state.insert(SyncSettings {
        user_id: "bob".to_string(),
        enabled: true,
        provider_calendar_id: "primary".to_string(),
        mirror_calendar_id: h.mirror_calendar_id.clone(),
        cursor: None,
    });

    let err = h.engine.trigger_sync("bob").await.unwrap_err();
    assert!(matches!(err, TandemError::ReauthRequired(_)));
}

#[tokio::test]
async fn disabled_integration_is_skipped() {
    let h = harness().await;
    h.sync_state.insert(SyncSettings {
        user_id: USER.to_string(),
        enabled: false,
        provider_calendar_id: "primary".to_string(),
        mirror_calendar_id: h.mirror_calendar_id.clone(),
        cursor: None,
    });

    let report = h.engine.trigger_sync(USER).await.unwrap();
    assert_eq!(report.outcome, SyncOutcome::Disabled);
    assert_eq!(h.provider.requests().len(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_triggers_for_one_user_run_exactly_one_sync() {
    let provider = ScriptedProvider::with_delay(Duration::from_millis(100));
    let h = Arc::new(harness_with(provider, SyncEngineConfig::default()).await);
    h.provider.push_page(page(vec![provider_event("g-1", "kickoff")], Some("T1")));

    let first = {
        let h = Arc::clone(&h);
        tokio::spawn(async move { h.engine.trigger_sync(USER).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    let second = h.engine.trigger_sync(USER).await.unwrap();

    assert_eq!(second.outcome, SyncOutcome::AlreadyRunning);

    let first = first.await.unwrap().unwrap();
    assert_eq!(first.outcome, SyncOutcome::Completed);
    // Only the completed run touched the provider.
    assert_eq!(h.provider.requests().len(), 1);
}

#[tokio::test]
async fn quota_guard_rejects_over_budget_triggers() {
    let config = SyncEngineConfig {
        quota: QuotaGuardConfig { limit: 1, window: Duration::from_secs(60) },
        ..SyncEngineConfig::default()
    };
    let h = harness_with(ScriptedProvider::new(), config).await;
    h.provider.push_page(page(vec![], Some("T1")));

    h.engine.trigger_sync(USER).await.unwrap();
    let err = h.engine.trigger_sync(USER).await.unwrap_err();
    assert!(matches!(err, TandemError::QuotaExceeded(_)));
}

#[tokio::test]
async fn attempt_log_failures_do_not_affect_the_sync_outcome() {
    let store = MemoryStore::new();
    let coordinator = Arc::new(OptimisticMutationCoordinator::default());
    let events = Arc::new(EventService::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        coordinator,
    ));
    let mirror = events
        .create_calendar(NewCalendarInput {
            name: "mirror".to_string(),
            color: None,
            created_by: USER.to_string(),
        })
        .await
        .unwrap();

    let sync_state = MemorySyncState::new();
    sync_state.insert(SyncSettings {
        user_id: USER.to_string(),
        enabled: true,
        provider_calendar_id: "primary".to_string(),
        mirror_calendar_id: mirror.id,
        cursor: None,
    });
    let credentials = MemoryCredentialStore::new();
    credentials.insert(
        USER,
        ProviderCredential {
            access_token: "fresh".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        },
    );

    let provider = ScriptedProvider::new();
    provider.push_page(page(vec![provider_event("g-1", "kickoff")], Some("T1")));

    let engine = ExternalSyncEngine::new(
        Arc::new(provider),
        events,
        Arc::new(store.clone()),
        Arc::new(sync_state),
        Arc::new(credentials),
        Arc::new(RecordingAttemptLog::failing()),
        SyncEngineConfig::default(),
    );

    let report = engine.trigger_sync(USER).await.unwrap();
    assert_eq!(report.outcome, SyncOutcome::Completed);
    assert_eq!(store.event_count(), 1);
}

#[tokio::test]
async fn successful_attempts_are_recorded() {
    let h = harness().await;
    h.provider.push_page(page(vec![provider_event("g-1", "kickoff")], Some("T1")));

    h.engine.trigger_sync(USER).await.unwrap();

    let attempts = h.attempts.attempts();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].outcome, "completed");
    assert_eq!(attempts[0].events_applied, 1);
    assert_eq!(attempts[0].mode, Some(SyncMode::Full));
}
