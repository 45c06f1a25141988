//! Optimistic-write echo suppression
//!
//! When a client writes locally and the server later pushes a change
//! notification for the same entity, the originating client must not treat
//! its own echo as a remote change (it would re-fetch and visibly "undo" the
//! optimistic cache state). The coordinator answers exactly one question:
//! "did *I* just cause this notification?"
//!
//! One instance is constructed per client session and shared by `Arc`
//! between the mutation path and the notification path; it is deliberately
//! not a global.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tandem_domain::constants::DEFAULT_SUPPRESSION_WINDOW_MS;

/// Self-expiring membership test over recently written entity ids.
///
/// Not a queue or a log: marks expire after a fixed window whether or not a
/// notification ever consumed them, which bounds the risk of permanently
/// suppressing a legitimate remote update that reuses the same id.
pub struct OptimisticMutationCoordinator {
    window: Duration,
    marks: Mutex<HashMap<String, Instant>>,
}

impl OptimisticMutationCoordinator {
    /// Create a coordinator with a custom suppression window.
    pub fn new(window: Duration) -> Self {
        Self { window, marks: Mutex::new(HashMap::new()) }
    }

    /// Suppression window currently in effect.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record that `entity_id` was just written locally.
    pub fn mark_pending(&self, entity_id: &str) {
        let mut marks = self.marks.lock().expect("optimistic marks poisoned");
        marks.insert(entity_id.to_string(), Instant::now());
    }

    /// True when a mark for `entity_id` exists within the suppression
    /// window. Expired marks are pruned lazily on every read; there is no
    /// background sweeper.
    pub fn is_recently_pending(&self, entity_id: &str) -> bool {
        let now = Instant::now();
        let mut marks = self.marks.lock().expect("optimistic marks poisoned");
        marks.retain(|_, recorded_at| now.duration_since(*recorded_at) < self.window);
        marks.contains_key(entity_id)
    }

    /// Number of live (possibly expired, not yet pruned) marks.
    pub fn len(&self) -> usize {
        self.marks.lock().expect("optimistic marks poisoned").len()
    }

    /// True when no marks are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for OptimisticMutationCoordinator {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_SUPPRESSION_WINDOW_MS))
    }
}
