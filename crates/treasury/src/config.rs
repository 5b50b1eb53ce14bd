use std::time::Duration;

use solwallet::ConfirmPolicy;

/// Tunables for the treasury services. Defaults match production
/// behavior; tests shrink the timing knobs.
#[derive(Debug, Clone)]
pub struct TreasuryConfig {
    /// Invoice/journal page size for list fetches.
    pub page_size: u32,
    /// Cooldown window for debounced reads.
    pub cooldown: chrono::Duration,
    /// Optional scope for cooldown cache entries (typically the funding
    /// address), letting a wallet switch start from a cold cache.
    pub cache_scope: Option<String>,
    /// Invoice watcher poll interval.
    pub poll_interval: Duration,
    /// Delay before the single-shot follow-up reconciliation pass.
    pub reconcile_delay: Duration,
    /// Chain confirmation wait policy.
    pub confirm: ConfirmPolicy,
}

impl Default for TreasuryConfig {
    fn default() -> Self {
        Self {
            page_size: 20,
            cooldown: chrono::Duration::seconds(10),
            cache_scope: None,
            poll_interval: Duration::from_secs(30),
            reconcile_delay: Duration::from_secs(8),
            confirm: ConfirmPolicy::default(),
        }
    }
}

impl TreasuryConfig {
    #[must_use]
    pub fn with_cache_scope(mut self, scope: impl Into<String>) -> Self {
        self.cache_scope = Some(scope.into());
        self
    }
}
