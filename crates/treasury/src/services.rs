//! Explicit service construction. Everything is built once here and
//! passed by reference; there are no ambient singletons, and `reset`
//! gives tests a cold-cache starting point.

use std::sync::Arc;

use solline_ledger_client::LedgerApiClient;
use solwallet::{ChainClient, SigningAgent};

use crate::balance::BalanceStore;
use crate::config::TreasuryConfig;
use crate::invoices::InvoiceStore;
use crate::journal::JournalStore;
use crate::session::SessionCache;
use crate::settlement::SettlementFlow;
use crate::watch::InvoiceWatcher;

pub struct TreasuryServices {
    config: TreasuryConfig,
    api: Arc<LedgerApiClient>,
    session: Arc<SessionCache>,
    invoices: Arc<InvoiceStore>,
    balance: Arc<BalanceStore>,
    journal: Arc<JournalStore>,
}

impl TreasuryServices {
    #[must_use]
    pub fn new(config: TreasuryConfig, api: LedgerApiClient) -> Self {
        let api = Arc::new(api);
        let session = Arc::new(SessionCache::new());
        let invoices = Arc::new(InvoiceStore::new(
            Arc::clone(&api),
            Arc::clone(&session),
            &config,
        ));
        let balance = Arc::new(BalanceStore::new(
            Arc::clone(&api),
            Arc::clone(&session),
            &config,
        ));
        let journal = Arc::new(JournalStore::new(Arc::clone(&api), &config));
        Self {
            config,
            api,
            session,
            invoices,
            balance,
            journal,
        }
    }

    #[must_use]
    pub fn api(&self) -> &Arc<LedgerApiClient> {
        &self.api
    }

    #[must_use]
    pub fn invoices(&self) -> &Arc<InvoiceStore> {
        &self.invoices
    }

    #[must_use]
    pub fn balance(&self) -> &Arc<BalanceStore> {
        &self.balance
    }

    #[must_use]
    pub fn journal(&self) -> &Arc<JournalStore> {
        &self.journal
    }

    /// Build a settlement flow against the given signing agent and
    /// chain client.
    #[must_use]
    pub fn settlement(
        &self,
        signer: Arc<dyn SigningAgent>,
        chain: Arc<dyn ChainClient>,
    ) -> SettlementFlow {
        SettlementFlow::new(
            Arc::clone(&self.invoices),
            Arc::clone(&self.balance),
            signer,
            chain,
            &self.config,
        )
    }

    /// Start polling invoices at the configured interval.
    #[must_use]
    pub fn watch_invoices(&self) -> InvoiceWatcher {
        InvoiceWatcher::spawn(
            Arc::clone(&self.invoices),
            Arc::clone(&self.balance),
            self.config.poll_interval,
        )
    }

    /// Drop every cached value and error flag. Test isolation hook; the
    /// next reads repopulate from the backend.
    pub fn reset(&self) {
        self.invoices.reset();
        self.balance.reset();
        self.journal.reset();
        self.session.clear();
    }
}
