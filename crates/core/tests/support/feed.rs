//! Push channel and invalidator mocks for feed listener tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tandem_core::{CacheInvalidator, PushChannel, PushSubscription, SubscriptionId};
use tandem_domain::{ChangeNotification, Result as DomainResult, TandemError};
use tokio::sync::mpsc;

struct Subscriber {
    calendar_ids: Vec<String>,
    sender: mpsc::Sender<ChangeNotification>,
}

/// In-process push channel mock with per-subscription calendar scoping.
#[derive(Default)]
pub struct MockPushChannel {
    subscribers: Mutex<HashMap<SubscriptionId, Subscriber>>,
    next_id: AtomicU64,
    fail_subscribe: AtomicBool,
}

impl MockPushChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make the next subscribe call fail.
    pub fn fail_next_subscribe(&self) {
        self.fail_subscribe.store(true, Ordering::SeqCst);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }

    /// Fan a notification out to every subscription scoped to its calendar.
    pub async fn publish(&self, notification: ChangeNotification) {
        let targets: Vec<mpsc::Sender<ChangeNotification>> = {
            let subscribers = self.subscribers.lock().unwrap();
            subscribers
                .values()
                .filter(|s| match &notification.calendar_id {
                    Some(calendar_id) => s.calendar_ids.contains(calendar_id),
                    None => true,
                })
                .map(|s| s.sender.clone())
                .collect()
        };

        for sender in targets {
            let _ = sender.send(notification.clone()).await;
        }
    }
}

#[async_trait]
impl PushChannel for MockPushChannel {
    async fn subscribe(&self, calendar_ids: &[String]) -> DomainResult<PushSubscription> {
        if self.fail_subscribe.swap(false, Ordering::SeqCst) {
            return Err(TandemError::Network("push channel unavailable".into()));
        }

        let (sender, receiver) = mpsc::channel(64);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.subscribers
            .lock()
            .unwrap()
            .insert(id, Subscriber { calendar_ids: calendar_ids.to_vec(), sender });

        Ok(PushSubscription { id, receiver })
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> DomainResult<()> {
        self.subscribers.lock().unwrap().remove(&id);
        Ok(())
    }
}

/// Invalidator mock counting re-fetch requests.
#[derive(Default)]
pub struct CountingInvalidator {
    count: AtomicUsize,
}

impl CountingInvalidator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheInvalidator for CountingInvalidator {
    async fn invalidate(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}
