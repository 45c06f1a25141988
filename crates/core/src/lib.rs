//! # Tandem Core
//!
//! Pure business logic layer - no infrastructure dependencies.
//!
//! This crate contains:
//! - Membership diffing and the event service
//! - The optimistic-mutation coordinator
//! - The change-feed listener state machine
//! - The external-provider sync engine and quota guard
//! - Port/adapter interfaces (traits)
//!
//! ## Architecture Principles
//! - Only depends on `tandem-domain`
//! - No database, HTTP, or platform code
//! - All external dependencies via traits
//! - Pure, testable business logic

pub mod events;
pub mod feed;
pub mod optimistic;
pub mod relation;
pub mod sync;

// Re-export specific items to avoid ambiguity
pub use events::ports::{CalendarStore, EventStore, MembershipStore};
pub use events::{CalendarDeletion, EventService};
pub use feed::ports::{CacheInvalidator, PushChannel, PushSubscription, SubscriptionId};
pub use feed::{ChangeFeedListener, FeedListenerConfig};
pub use optimistic::OptimisticMutationCoordinator;
pub use relation::{diff_membership, MembershipDiff};
pub use sync::ports::{
    CredentialStore, DeltaRequest, ProviderClient, SyncAttemptLog, SyncStateStore,
};
pub use sync::quota::{QuotaGuard, QuotaGuardConfig};
pub use sync::{ExternalSyncEngine, SyncEngineConfig};
