//! Cached copy of the backend-owned balance aggregate.
//!
//! The backend recomputes the balance; this store only refreshes and
//! formats. No client-side arithmetic is authoritative.

use std::sync::{Arc, RwLock};

use chrono::Utc;
use solline_ledger_client::{AccountStatus, BalanceResponse, LedgerApiClient, LedgerApiError};
use tracing::debug;

use crate::config::TreasuryConfig;
use crate::cooldown::{CooldownCache, DebounceOptions, OpKey};
use crate::session::SessionCache;

pub struct BalanceStore {
    api: Arc<LedgerApiClient>,
    session: Arc<SessionCache>,
    cooldown: CooldownCache<OpKey, BalanceResponse>,
    scope: Option<String>,
    snapshot: RwLock<Option<BalanceResponse>>,
    last_error: RwLock<Option<String>>,
}

impl BalanceStore {
    #[must_use]
    pub fn new(
        api: Arc<LedgerApiClient>,
        session: Arc<SessionCache>,
        config: &TreasuryConfig,
    ) -> Self {
        let hydrated = session.balance();
        Self {
            api,
            session,
            cooldown: CooldownCache::new(config.cooldown),
            scope: config.cache_scope.clone(),
            snapshot: RwLock::new(hydrated),
            last_error: RwLock::new(None),
        }
    }

    /// Unconditionally re-fetch and replace the cached snapshot. Callers
    /// invoke this after anything known or suspected to change the
    /// balance; the store never polls on its own.
    pub async fn refresh(&self) -> Result<BalanceResponse, LedgerApiError> {
        self.fetch_inner(true).await
    }

    /// Cooldown-debounced read for overlapping UI/polling triggers.
    pub async fn fetch(&self) -> Result<BalanceResponse, LedgerApiError> {
        self.fetch_inner(false).await
    }

    async fn fetch_inner(&self, force: bool) -> Result<BalanceResponse, LedgerApiError> {
        let options = DebounceOptions {
            context: self.scope.clone(),
            allow_cross_context: true,
            force_refresh: force,
        };
        let api = Arc::clone(&self.api);
        let result = self
            .cooldown
            .debounce(OpKey::Balance, &options, Utc::now(), || async move {
                api.balance().await
            })
            .await;

        match result {
            Ok(balance) => {
                self.apply(balance);
                Ok(balance)
            }
            Err(error) => {
                // Previous snapshot stays valid; only the flag moves.
                self.note_error(&error);
                Err(error)
            }
        }
    }

    fn apply(&self, balance: BalanceResponse) {
        if let Ok(mut lock) = self.snapshot.write() {
            *lock = Some(balance);
        }
        if let Ok(mut lock) = self.last_error.write() {
            *lock = None;
        }
        self.session.store_balance(balance);
        debug!(
            sol = balance.sol_balance,
            status = ?balance.status,
            "balance snapshot replaced"
        );
    }

    fn note_error(&self, error: &LedgerApiError) {
        if let Ok(mut lock) = self.last_error.write() {
            *lock = Some(error.to_string());
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> Option<BalanceResponse> {
        self.snapshot.read().ok().and_then(|lock| *lock)
    }

    #[must_use]
    pub fn account_status(&self) -> Option<AccountStatus> {
        self.snapshot().map(|balance| balance.status)
    }

    /// Display-formatted SOL balance, `--` before the first fetch.
    #[must_use]
    pub fn display_sol(&self) -> String {
        self.snapshot()
            .map_or_else(|| "--".to_string(), |b| format!("{:.4} SOL", b.sol_balance))
    }

    #[must_use]
    pub fn display_usd(&self) -> String {
        self.snapshot()
            .map_or_else(|| "--".to_string(), |b| format!("${:.2}", b.usd_balance))
    }

    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().ok().and_then(|lock| lock.clone())
    }

    pub fn reset(&self) {
        if let Ok(mut lock) = self.snapshot.write() {
            *lock = None;
        }
        if let Ok(mut lock) = self.last_error.write() {
            *lock = None;
        }
        self.cooldown.clear_all();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use solline_ledger_client::{AccountStatus, BalanceResponse, LedgerApiClient};

    use super::BalanceStore;
    use crate::config::TreasuryConfig;
    use crate::session::SessionCache;

    fn hydrated_store() -> BalanceStore {
        let session = Arc::new(SessionCache::new());
        session.store_balance(BalanceResponse {
            sol_balance: 1.25,
            usd_balance: 180.4,
            status: AccountStatus::Active,
        });
        BalanceStore::new(
            Arc::new(LedgerApiClient::new("http://127.0.0.1:9", None)),
            session,
            &TreasuryConfig::default(),
        )
    }

    #[test]
    fn hydrates_initial_snapshot_from_session() {
        let store = hydrated_store();
        assert_eq!(store.account_status(), Some(AccountStatus::Active));
    }

    #[test]
    fn display_accessors_format_cached_values() {
        let store = hydrated_store();
        assert_eq!(store.display_sol(), "1.2500 SOL");
        assert_eq!(store.display_usd(), "$180.40");
    }

    #[test]
    fn display_accessors_show_placeholder_before_first_fetch() {
        let store = BalanceStore::new(
            Arc::new(LedgerApiClient::new("http://127.0.0.1:9", None)),
            Arc::new(SessionCache::new()),
            &TreasuryConfig::default(),
        );
        assert_eq!(store.display_sol(), "--");
        assert_eq!(store.display_usd(), "--");
        assert!(store.account_status().is_none());
    }

    #[test]
    fn reset_drops_snapshot_and_error_state() {
        let store = hydrated_store();
        store.reset();
        assert!(store.snapshot().is_none());
        assert!(store.last_error().is_none());
    }
}
