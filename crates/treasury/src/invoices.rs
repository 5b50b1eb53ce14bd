//! Client-side cache of the backend's invoice list, with the lifecycle
//! operations that mutate it.
//!
//! The backend owns invoice truth. Every mutation here is either a call
//! it acknowledges or a bounded optimistic mark that the next refresh
//! replaces. Fetch failures never clear previously valid entries.

use std::sync::{Arc, RwLock};

use chrono::Utc;
use solline_ledger_client::{Invoice, InvoiceStatus, LedgerApiClient, LedgerApiError};
use tracing::{debug, warn};

use crate::config::TreasuryConfig;
use crate::cooldown::{CooldownCache, DebounceOptions, OpKey};
use crate::session::SessionCache;

#[derive(Debug, thiserror::Error)]
pub enum InvoiceStoreError {
    #[error("invoice amount must be greater than zero")]
    ZeroAmount,

    /// An invoice is still pending or processing; the backend allows at
    /// most one active invoice per account.
    #[error("invoice {0} is already awaiting payment")]
    AlreadyPending(String),

    #[error("unknown invoice {0}")]
    Unknown(String),

    #[error("invoice {id} is {status} and can no longer be cancelled")]
    NotCancellable { id: String, status: InvoiceStatus },

    #[error(transparent)]
    Api(#[from] LedgerApiError),
}

#[derive(Debug, Default)]
struct InvoiceCache {
    entries: Vec<Invoice>,
    total: Option<u64>,
    last_error: Option<String>,
}

pub struct InvoiceStore {
    api: Arc<LedgerApiClient>,
    session: Arc<SessionCache>,
    cooldown: CooldownCache<OpKey, solline_ledger_client::InvoicePage>,
    singles: CooldownCache<OpKey, Invoice>,
    page_size: u32,
    scope: Option<String>,
    state: RwLock<InvoiceCache>,
}

impl InvoiceStore {
    #[must_use]
    pub fn new(
        api: Arc<LedgerApiClient>,
        session: Arc<SessionCache>,
        config: &TreasuryConfig,
    ) -> Self {
        let hydrated = InvoiceCache {
            entries: session.invoices().unwrap_or_default(),
            total: None,
            last_error: None,
        };
        Self {
            api,
            session,
            cooldown: CooldownCache::new(config.cooldown),
            singles: CooldownCache::new(config.cooldown),
            page_size: config.page_size,
            scope: config.cache_scope.clone(),
            state: RwLock::new(hydrated),
        }
    }

    /// Request a new invoice from the backend.
    ///
    /// Precondition failures (`ZeroAmount`, `AlreadyPending`) are decided
    /// against the cached sequence and never reach the network; callers
    /// wanting the strongest guarantee refresh first.
    pub async fn create(&self, lamports: u64) -> Result<Invoice, InvoiceStoreError> {
        if lamports == 0 {
            return Err(InvoiceStoreError::ZeroAmount);
        }
        if let Some(active) = self.first_active() {
            return Err(InvoiceStoreError::AlreadyPending(active.id));
        }

        let prepared = self.api.prepare_invoice(lamports).await?;
        let now = Utc::now();
        let invoice = Invoice {
            id: prepared.invoice,
            lamports: prepared.lamports,
            to_address: prepared.to_address,
            memo: prepared.memo,
            status: InvoiceStatus::Pending,
            created_at: now,
            expires_at: prepared.expires_at,
            paid_at: None,
        };
        debug!(invoice = %invoice.id, lamports, "invoice prepared");

        // Optimistic copy until the reconciling refresh replaces it.
        if let Ok(mut lock) = self.state.write() {
            lock.entries.insert(0, invoice.clone());
        }
        if let Err(error) = self.invalidate().await {
            warn!(%error, "invoice refresh after prepare failed; keeping optimistic copy");
        }
        Ok(invoice)
    }

    /// Cancel a pending invoice. Valid only while the cached copy is
    /// still `pending`; the backend enforces the same rule.
    pub async fn cancel(&self, id: &str) -> Result<(), InvoiceStoreError> {
        let Some(invoice) = self.get(id) else {
            return Err(InvoiceStoreError::Unknown(id.to_string()));
        };
        if invoice.status != InvoiceStatus::Pending {
            return Err(InvoiceStoreError::NotCancellable {
                id: id.to_string(),
                status: invoice.status,
            });
        }

        self.api.cancel_invoice(id).await?;
        self.mark_status(id, InvoiceStatus::Cancelled);
        if let Err(error) = self.invalidate().await {
            warn!(%error, "invoice refresh after cancel failed; keeping optimistic copy");
        }
        Ok(())
    }

    /// Report a submitted chain signature. The ack carries no settlement
    /// status; the local copy only moves to `processing`.
    pub async fn report_completion(
        &self,
        id: &str,
        signature: &str,
    ) -> Result<(), LedgerApiError> {
        self.api.complete_invoice(id, signature).await?;
        self.mark_status(id, InvoiceStatus::Processing);
        Ok(())
    }

    /// Fetch one invoice by id and fold the backend's copy into the
    /// cached sequence. Server truth replaces whatever was cached.
    pub async fn fetch_one(&self, id: &str) -> Result<Invoice, InvoiceStoreError> {
        let options = DebounceOptions {
            context: self.scope.clone(),
            allow_cross_context: true,
            force_refresh: false,
        };
        let api = Arc::clone(&self.api);
        let owned = id.to_string();
        let result = self
            .singles
            .debounce(
                OpKey::Invoice(owned.clone()),
                &options,
                Utc::now(),
                || async move { api.invoice(&owned).await },
            )
            .await;

        match result {
            Ok(invoice) => {
                if let Ok(mut lock) = self.state.write() {
                    if let Some(entry) =
                        lock.entries.iter_mut().find(|entry| entry.id == invoice.id)
                    {
                        *entry = invoice.clone();
                    } else {
                        lock.entries.push(invoice.clone());
                    }
                }
                Ok(invoice)
            }
            Err(error) => {
                if let Ok(mut lock) = self.state.write() {
                    lock.last_error = Some(error.to_string());
                }
                Err(error.into())
            }
        }
    }

    /// Fetch a page. `reset` replaces the cached sequence from position
    /// zero, otherwise the page is appended preserving backend order.
    pub async fn list(
        &self,
        offset: u32,
        limit: u32,
        reset: bool,
    ) -> Result<Vec<Invoice>, InvoiceStoreError> {
        self.list_inner(offset, limit, reset, false).await
    }

    /// Forced `list(0, page_size, reset)`, bypassing the cooldown.
    pub async fn refresh(&self) -> Result<Vec<Invoice>, InvoiceStoreError> {
        self.list_inner(0, self.page_size, true, true).await
    }

    /// Drop every cached read and force a refresh. Called after any
    /// operation known to change invoice state on the backend.
    pub async fn invalidate(&self) -> Result<(), InvoiceStoreError> {
        self.cooldown.clear_all();
        self.singles.clear_all();
        self.session.clear_invoices();
        self.refresh().await.map(|_| ())
    }

    async fn list_inner(
        &self,
        offset: u32,
        limit: u32,
        reset: bool,
        force: bool,
    ) -> Result<Vec<Invoice>, InvoiceStoreError> {
        let options = DebounceOptions {
            context: self.scope.clone(),
            allow_cross_context: true,
            force_refresh: force,
        };
        let api = Arc::clone(&self.api);
        let result = self
            .cooldown
            .debounce(OpKey::Invoices(offset), &options, Utc::now(), || async move {
                api.list_invoices(offset, limit).await
            })
            .await;

        match result {
            Ok(page) => {
                let mut snapshot = Vec::new();
                if let Ok(mut lock) = self.state.write() {
                    merge_page(&mut lock.entries, page.invoices, reset);
                    lock.total = Some(page.total);
                    lock.last_error = None;
                    snapshot.clone_from(&lock.entries);
                }
                if reset {
                    self.session.store_invoices(&snapshot);
                }
                Ok(snapshot)
            }
            Err(error) => {
                // Previous entries stay intact; only the flag moves.
                if let Ok(mut lock) = self.state.write() {
                    lock.last_error = Some(error.to_string());
                }
                Err(error.into())
            }
        }
    }

    fn mark_status(&self, id: &str, status: InvoiceStatus) {
        if let Ok(mut lock) = self.state.write() {
            if let Some(entry) = lock.entries.iter_mut().find(|entry| entry.id == id) {
                // Terminal states never transition again.
                if entry.status.is_terminal() {
                    return;
                }
                entry.status = status;
            }
        }
    }

    #[must_use]
    pub fn entries(&self) -> Vec<Invoice> {
        self.state
            .read()
            .map(|lock| lock.entries.clone())
            .unwrap_or_default()
    }

    /// First invoice still blocking a new prepare.
    #[must_use]
    pub fn first_active(&self) -> Option<Invoice> {
        self.entries()
            .into_iter()
            .find(|invoice| invoice.status.is_active())
    }

    /// First invoice that can still be cancelled.
    #[must_use]
    pub fn first_pending(&self) -> Option<Invoice> {
        self.entries()
            .into_iter()
            .find(|invoice| invoice.status == InvoiceStatus::Pending)
    }

    #[must_use]
    pub fn processing(&self) -> Vec<Invoice> {
        self.entries()
            .into_iter()
            .filter(|invoice| invoice.status == InvoiceStatus::Processing)
            .collect()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Invoice> {
        self.entries().into_iter().find(|invoice| invoice.id == id)
    }

    #[must_use]
    pub fn total(&self) -> Option<u64> {
        self.state.read().ok().and_then(|lock| lock.total)
    }

    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.state.read().ok().and_then(|lock| lock.last_error.clone())
    }

    pub fn reset(&self) {
        if let Ok(mut lock) = self.state.write() {
            *lock = InvoiceCache::default();
        }
        self.cooldown.clear_all();
        self.singles.clear_all();
    }
}

/// Replace or append a fetched page, keeping backend order and skipping
/// ids the sequence already holds.
fn merge_page(current: &mut Vec<Invoice>, page: Vec<Invoice>, reset: bool) {
    if reset {
        *current = page;
        return;
    }
    for invoice in page {
        if !current.iter().any(|entry| entry.id == invoice.id) {
            current.push(invoice);
        }
    }
}
