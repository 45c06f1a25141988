//! Change-feed listener
//!
//! State machine over a per-calendar-set push subscription. Notifications
//! caused by this client's own writes are dropped via the optimistic
//! coordinator; everything else is coalesced on a debounce timer into a
//! single cache invalidation.
//!
//! Subscriptions are torn down explicitly (cancel token + unsubscribe) on
//! selection change, backgrounding, and shutdown, so a late notification
//! from a stale subscription can never re-trigger fetches for a calendar set
//! the user no longer has selected. Subscription errors are not retried
//! inline; the next lifecycle transition re-establishes.

use std::sync::Arc;
use std::time::Duration;

use tandem_domain::constants::DEFAULT_FEED_DEBOUNCE_MS;
use tandem_domain::ChangeNotification;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::ports::{CacheInvalidator, PushChannel, SubscriptionId};
use crate::optimistic::OptimisticMutationCoordinator;

/// Listener configuration.
#[derive(Debug, Clone)]
pub struct FeedListenerConfig {
    /// Debounce window coalescing notification bursts into one re-fetch.
    pub debounce: Duration,
}

impl Default for FeedListenerConfig {
    fn default() -> Self {
        Self { debounce: Duration::from_millis(DEFAULT_FEED_DEBOUNCE_MS) }
    }
}

struct ActiveSubscription {
    id: SubscriptionId,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct ListenerInner {
    selected: Vec<String>,
    foreground: bool,
    active: Option<ActiveSubscription>,
}

/// Change-feed listener with explicit lifecycle management.
pub struct ChangeFeedListener {
    push: Arc<dyn PushChannel>,
    coordinator: Arc<OptimisticMutationCoordinator>,
    invalidator: Arc<dyn CacheInvalidator>,
    config: FeedListenerConfig,
    inner: Mutex<ListenerInner>,
}

impl ChangeFeedListener {
    /// Create a listener. It starts unsubscribed, in the foreground, with an
    /// empty calendar selection.
    pub fn new(
        push: Arc<dyn PushChannel>,
        coordinator: Arc<OptimisticMutationCoordinator>,
        invalidator: Arc<dyn CacheInvalidator>,
        config: FeedListenerConfig,
    ) -> Self {
        Self {
            push,
            coordinator,
            invalidator,
            config,
            inner: Mutex::new(ListenerInner {
                selected: Vec::new(),
                foreground: true,
                active: None,
            }),
        }
    }

    /// Replace the selected calendar set.
    ///
    /// The existing subscription is always torn down: a subscription is
    /// keyed to a specific calendar set. A new one is established when the
    /// selection is non-empty and the app is foreground.
    #[instrument(skip(self, calendar_ids), fields(calendars = calendar_ids.len()))]
    pub async fn set_selected_calendars(&self, calendar_ids: Vec<String>) {
        let mut inner = self.inner.lock().await;
        if inner.selected == calendar_ids && inner.active.is_some() {
            return;
        }

        self.teardown(&mut inner).await;
        inner.selected = calendar_ids;

        if inner.foreground && !inner.selected.is_empty() {
            self.establish(&mut inner).await;
        }
    }

    /// App returned to the foreground: issue one unconditional invalidation
    /// to cover anything missed while torn down, then resubscribe.
    pub async fn app_foregrounded(&self) {
        let mut inner = self.inner.lock().await;
        inner.foreground = true;

        // Conservative full re-fetch replaces missed-event replay.
        self.invalidator.invalidate().await;

        if inner.active.is_none() && !inner.selected.is_empty() {
            self.establish(&mut inner).await;
        }
    }

    /// App moved to the background: tear the subscription down to conserve
    /// resources.
    pub async fn app_backgrounded(&self) {
        let mut inner = self.inner.lock().await;
        inner.foreground = false;
        self.teardown(&mut inner).await;
    }

    /// Network came back online: invalidate unconditionally without
    /// rebuilding the subscription.
    pub async fn network_online(&self) {
        self.invalidator.invalidate().await;
    }

    /// Explicit teardown.
    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        self.teardown(&mut inner).await;
    }

    /// True while a subscription is live (for tests/diagnostics).
    pub async fn is_subscribed(&self) -> bool {
        self.inner.lock().await.active.is_some()
    }

    async fn establish(&self, inner: &mut ListenerInner) {
        let subscription = match self.push.subscribe(&inner.selected).await {
            Ok(subscription) => subscription,
            Err(e) => {
                // Not retried inline; the next lifecycle transition
                // (foreground, selection change) re-establishes.
                warn!(error = %e, "push subscription failed");
                return;
            }
        };

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(pump(
            subscription.receiver,
            Arc::clone(&self.coordinator),
            Arc::clone(&self.invalidator),
            self.config.debounce,
            cancel.clone(),
        ));

        debug!(subscription = subscription.id, "push subscription established");
        inner.active =
            Some(ActiveSubscription { id: subscription.id, cancel, handle });
    }

    async fn teardown(&self, inner: &mut ListenerInner) {
        let Some(active) = inner.active.take() else {
            return;
        };

        active.cancel.cancel();
        if let Err(e) = self.push.unsubscribe(active.id).await {
            warn!(subscription = active.id, error = %e, "unsubscribe failed");
        }
        if let Err(e) = active.handle.await {
            if e.is_panic() {
                warn!(subscription = active.id, "subscription task panicked");
            }
        }
        debug!(subscription = active.id, "push subscription torn down");
    }
}

/// Consume the notification stream: drop self-echoes, coalesce the rest on
/// the debounce timer, and fire one invalidation per burst. This path never
/// returns an error; a missed suppression only costs a redundant re-fetch.
async fn pump(
    mut receiver: mpsc::Receiver<ChangeNotification>,
    coordinator: Arc<OptimisticMutationCoordinator>,
    invalidator: Arc<dyn CacheInvalidator>,
    debounce: Duration,
    cancel: CancellationToken,
) {
    loop {
        let first = tokio::select! {
            () = cancel.cancelled() => return,
            maybe = receiver.recv() => match maybe {
                Some(notification) => notification,
                None => return,
            },
        };

        if coordinator.is_recently_pending(&first.entity_id) {
            debug!(entity_id = %first.entity_id, "suppressed self-echo notification");
            continue;
        }

        // One notification passed the filter: open the debounce window and
        // swallow everything else that arrives inside it.
        let deadline = tokio::time::Instant::now() + debounce;
        loop {
            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep_until(deadline) => {
                    invalidator.invalidate().await;
                    break;
                }
                maybe = receiver.recv() => match maybe {
                    Some(notification) => {
                        debug!(entity_id = %notification.entity_id, "coalesced notification");
                    }
                    None => {
                        // Stream closed mid-burst: flush the pending
                        // invalidation before exiting.
                        invalidator.invalidate().await;
                        return;
                    }
                },
            }
        }
    }
}
