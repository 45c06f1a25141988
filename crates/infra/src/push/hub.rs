//! In-process push hub
//!
//! `PushChannel` implementation fanning change notifications out over
//! per-subscription mpsc channels, each scoped to the calendar set it was
//! created with. The embedding server publishes into the hub whenever a
//! durable write lands; multi-client tests use it to model several listeners
//! against one change stream.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tandem_core::{PushChannel, PushSubscription, SubscriptionId};
use tandem_domain::{ChangeNotification, Result};
use tokio::sync::mpsc;
use tracing::{debug, warn};

const SUBSCRIPTION_BUFFER: usize = 64;

struct Subscriber {
    calendar_ids: Vec<String>,
    sender: mpsc::Sender<ChangeNotification>,
}

/// In-process implementation of `PushChannel`.
#[derive(Default)]
pub struct LocalPushHub {
    subscribers: Mutex<HashMap<SubscriptionId, Subscriber>>,
    next_id: AtomicU64,
}

impl LocalPushHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().expect("push hub poisoned").len()
    }

    /// Fan a notification out to every subscription whose calendar set
    /// matches. Subscriptions whose receiver has gone away are dropped.
    pub async fn publish(&self, notification: ChangeNotification) {
        let targets: Vec<(SubscriptionId, mpsc::Sender<ChangeNotification>)> = {
            let subscribers = self.subscribers.lock().expect("push hub poisoned");
            subscribers
                .iter()
                .filter(|(_, subscriber)| match &notification.calendar_id {
                    Some(calendar_id) => subscriber.calendar_ids.contains(calendar_id),
                    // Notifications with no calendar scope (e.g. calendar
                    // deletion) reach every subscriber.
                    None => true,
                })
                .map(|(id, subscriber)| (*id, subscriber.sender.clone()))
                .collect()
        };

        for (id, sender) in targets {
            if sender.send(notification.clone()).await.is_err() {
                warn!(subscription = id, "dropping subscription with closed receiver");
                self.subscribers.lock().expect("push hub poisoned").remove(&id);
            }
        }
    }
}

#[async_trait]
impl PushChannel for LocalPushHub {
    async fn subscribe(&self, calendar_ids: &[String]) -> Result<PushSubscription> {
        let (sender, receiver) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        self.subscribers
            .lock()
            .expect("push hub poisoned")
            .insert(id, Subscriber { calendar_ids: calendar_ids.to_vec(), sender });

        debug!(subscription = id, calendars = calendar_ids.len(), "subscription created");
        Ok(PushSubscription { id, receiver })
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        self.subscribers.lock().expect("push hub poisoned").remove(&id);
        debug!(subscription = id, "subscription removed");
        Ok(())
    }
}
