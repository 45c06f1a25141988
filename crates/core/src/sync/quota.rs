//! Per-user request budget for sync-triggering actions

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tandem_domain::constants::{DEFAULT_SYNC_QUOTA_LIMIT, DEFAULT_SYNC_QUOTA_WINDOW_SECS};
use tandem_domain::{Result, TandemError};

/// Quota configuration: at most `limit` triggers per `window` per user.
#[derive(Debug, Clone)]
pub struct QuotaGuardConfig {
    pub limit: u32,
    pub window: Duration,
}

impl Default for QuotaGuardConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_SYNC_QUOTA_LIMIT,
            window: Duration::from_secs(DEFAULT_SYNC_QUOTA_WINDOW_SECS),
        }
    }
}

/// Fixed-window per-user budget.
pub struct QuotaGuard {
    config: QuotaGuardConfig,
    windows: Mutex<HashMap<String, (Instant, u32)>>,
}

impl QuotaGuard {
    /// Create a guard with the given configuration.
    pub fn new(config: QuotaGuardConfig) -> Self {
        Self { config, windows: Mutex::new(HashMap::new()) }
    }

    /// Consume one unit of the user's budget.
    ///
    /// # Errors
    ///
    /// `QuotaExceeded` once the user has spent the window's budget.
    pub fn check(&self, user_id: &str) -> Result<()> {
        let now = Instant::now();
        let mut windows = self.windows.lock().expect("quota windows poisoned");

        let entry = windows.entry(user_id.to_string()).or_insert((now, 0));
        if now.duration_since(entry.0) >= self.config.window {
            *entry = (now, 0);
        }

        if entry.1 >= self.config.limit {
            return Err(TandemError::QuotaExceeded(format!(
                "sync budget of {} requests per {:?} spent for user {user_id}",
                self.config.limit, self.config.window
            )));
        }

        entry.1 += 1;
        Ok(())
    }
}

impl Default for QuotaGuard {
    fn default() -> Self {
        Self::new(QuotaGuardConfig::default())
    }
}
