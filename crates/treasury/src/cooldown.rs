//! Keyed cooldown cache guarding the backend from call amplification.
//!
//! Several independent triggers (manual refresh, polling, post-action
//! refresh) can request the same read within a short window; entries
//! younger than the window are served from cache instead. Only
//! successful results are cached, so a failed call retries immediately.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};

/// The logical read operations the client debounces. Typed keys instead
/// of concatenated strings; pagination and per-invoice reads carry their
/// discriminator in the variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OpKey {
    Balance,
    Invoices(u32),
    Journal(u32),
    Invoice(String),
}

#[derive(Debug, Clone, Default)]
pub struct DebounceOptions {
    /// Scope for the cache slot; `None` uses the global slot directly.
    pub context: Option<String>,
    /// Allow a fresh global-slot result to seed the scoped slot.
    pub allow_cross_context: bool,
    /// Skip all lookups; still populates the cache for later callers.
    pub force_refresh: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Slot {
    Global,
    Context(String),
}

#[derive(Debug, Clone)]
struct CachedValue<V> {
    value: V,
    cached_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct CooldownCache<K, V> {
    window: Duration,
    entries: Arc<RwLock<HashMap<(Slot, K), CachedValue<V>>>>,
}

impl<K, V> Clone for CooldownCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            window: self.window,
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<K, V> CooldownCache<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone,
{
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Serve `key` from cache when a result younger than the window
    /// exists, otherwise run `op` and cache its success under both the
    /// scoped and global slots. Errors propagate uncached.
    pub async fn debounce<F, Fut, E>(
        &self,
        key: K,
        options: &DebounceOptions,
        now: DateTime<Utc>,
        op: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let scoped = options
            .context
            .clone()
            .map_or(Slot::Global, Slot::Context);

        if !options.force_refresh {
            if let Some(hit) = self.fresh(&scoped, &key, now) {
                return Ok(hit.value);
            }
            if options.allow_cross_context && scoped != Slot::Global {
                if let Some(hit) = self.fresh(&Slot::Global, &key, now) {
                    // Seed the scoped slot; it inherits the global
                    // entry's age so both expire together.
                    if let Ok(mut lock) = self.entries.write() {
                        lock.insert((scoped, key), hit.clone());
                    }
                    return Ok(hit.value);
                }
            }
        }

        let value = op().await?;
        let cached = CachedValue {
            value: value.clone(),
            cached_at: now,
        };
        if let Ok(mut lock) = self.entries.write() {
            if scoped != Slot::Global {
                lock.insert((scoped, key.clone()), cached.clone());
            }
            lock.insert((Slot::Global, key), cached);
        }
        Ok(value)
    }

    fn fresh(&self, slot: &Slot, key: &K, now: DateTime<Utc>) -> Option<CachedValue<V>> {
        let lock = self.entries.read().ok()?;
        let hit = lock.get(&(slot.clone(), key.clone()))?;
        if now.signed_duration_since(hit.cached_at) < self.window {
            return Some(hit.clone());
        }
        None
    }

    /// Drop every slot holding `key`.
    pub fn clear_key(&self, key: &K) {
        if let Ok(mut lock) = self.entries.write() {
            lock.retain(|(_, entry_key), _| entry_key != key);
        }
    }

    /// Drop every entry cached under the given scope.
    pub fn clear_context(&self, context: &str) {
        if let Ok(mut lock) = self.entries.write() {
            lock.retain(|(slot, _), _| !matches!(slot, Slot::Context(c) if c == context));
        }
    }

    pub fn clear_all(&self) {
        if let Ok(mut lock) = self.entries.write() {
            lock.clear();
        }
    }
}
