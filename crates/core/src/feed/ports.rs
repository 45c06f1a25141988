//! Port interfaces for the push channel and cache invalidation

use async_trait::async_trait;
use tandem_domain::{ChangeNotification, Result};
use tokio::sync::mpsc;

/// Opaque handle identifying one live subscription on the push channel.
pub type SubscriptionId = u64;

/// A live push subscription: the notification stream plus the handle needed
/// to tear it down explicitly.
pub struct PushSubscription {
    pub id: SubscriptionId,
    pub receiver: mpsc::Receiver<ChangeNotification>,
}

/// Trait for the server push channel.
///
/// A subscription is scoped to a specific set of calendar ids, not global;
/// changing the selection requires tearing the old subscription down and
/// creating a new one.
#[async_trait]
pub trait PushChannel: Send + Sync {
    /// Subscribe to change notifications for the given calendar set.
    async fn subscribe(&self, calendar_ids: &[String]) -> Result<PushSubscription>;

    /// Explicitly tear down a subscription. Dropping the receiver alone is
    /// not enough: a torn-down handle must stop the server from fanning out
    /// to this client.
    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()>;
}

/// Trait for scheduling a re-fetch of the local query cache.
///
/// Infallible by design: the listener path prefers redundant work over
/// inconsistent state, so an invalidation must not surface errors back into
/// the feed.
#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    /// Request a cache re-fetch.
    async fn invalidate(&self);
}
