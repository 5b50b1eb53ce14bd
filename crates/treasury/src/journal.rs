//! Append-only view over the backend's activity journal.
//!
//! Entries are never mutated locally. Listing reports which entries are
//! new since the last sync so the caller can decide whether a balance
//! refresh is due; the store itself never polls.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use solline_ledger_client::{JournalEntry, LedgerApiClient, LedgerApiError};

use crate::config::TreasuryConfig;
use crate::cooldown::{CooldownCache, DebounceOptions, OpKey};

/// Outcome of one journal sync: the entries observed for the first time.
#[derive(Debug, Default)]
pub struct JournalDelta {
    pub fresh: Vec<JournalEntry>,
}

impl JournalDelta {
    /// Whether any newly observed entry moved the balance.
    #[must_use]
    pub fn balance_affecting(&self) -> bool {
        self.fresh.iter().any(|entry| entry.lamports != 0)
    }
}

#[derive(Debug, Default)]
struct JournalCache {
    entries: Vec<JournalEntry>,
    seen: HashSet<String>,
    last_error: Option<String>,
}

pub struct JournalStore {
    api: Arc<LedgerApiClient>,
    cooldown: CooldownCache<OpKey, solline_ledger_client::JournalPage>,
    scope: Option<String>,
    state: RwLock<JournalCache>,
}

impl JournalStore {
    #[must_use]
    pub fn new(api: Arc<LedgerApiClient>, config: &TreasuryConfig) -> Self {
        Self {
            api,
            cooldown: CooldownCache::new(config.cooldown),
            scope: config.cache_scope.clone(),
            state: RwLock::new(JournalCache::default()),
        }
    }

    pub async fn list(
        &self,
        offset: u32,
        limit: u32,
        reset: bool,
    ) -> Result<JournalDelta, LedgerApiError> {
        let options = DebounceOptions {
            context: self.scope.clone(),
            allow_cross_context: true,
            force_refresh: reset,
        };
        let api = Arc::clone(&self.api);
        let result = self
            .cooldown
            .debounce(OpKey::Journal(offset), &options, Utc::now(), || async move {
                api.journal(offset, limit).await
            })
            .await;

        match result {
            Ok(page) => {
                let mut delta = JournalDelta::default();
                if let Ok(mut lock) = self.state.write() {
                    delta = merge_entries(&mut lock, page.journal, reset);
                    lock.last_error = None;
                }
                Ok(delta)
            }
            Err(error) => {
                if let Ok(mut lock) = self.state.write() {
                    lock.last_error = Some(error.to_string());
                }
                Err(error)
            }
        }
    }

    #[must_use]
    pub fn entries(&self) -> Vec<JournalEntry> {
        self.state
            .read()
            .map(|lock| lock.entries.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.state.read().ok().and_then(|lock| lock.last_error.clone())
    }

    pub fn reset(&self) {
        if let Ok(mut lock) = self.state.write() {
            *lock = JournalCache::default();
        }
        self.cooldown.clear_all();
    }
}

/// Replace or append a fetched page. `seen` accumulates across resets so
/// an entry only ever counts as fresh once per session.
fn merge_entries(
    cache: &mut JournalCache,
    page: Vec<JournalEntry>,
    reset: bool,
) -> JournalDelta {
    let mut fresh = Vec::new();
    for entry in &page {
        if cache.seen.insert(entry.id.clone()) {
            fresh.push(entry.clone());
        }
    }
    if reset {
        cache.entries = page;
    } else {
        for entry in page {
            if !cache.entries.iter().any(|existing| existing.id == entry.id) {
                cache.entries.push(entry);
            }
        }
    }
    JournalDelta { fresh }
}
