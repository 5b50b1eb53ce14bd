//! Treasury core for the solline client: invoice lifecycle, balance and
//! journal caches, request debouncing, and the settlement orchestration
//! that drives a top-up from intent to reconciled balance.

pub mod balance;
pub mod config;
pub mod cooldown;
pub mod invoices;
pub mod journal;
pub mod services;
pub mod session;
pub mod settlement;
pub mod watch;

pub use balance::BalanceStore;
pub use config::TreasuryConfig;
pub use cooldown::{CooldownCache, DebounceOptions, OpKey};
pub use invoices::{InvoiceStore, InvoiceStoreError};
pub use journal::{JournalDelta, JournalStore};
pub use services::TreasuryServices;
pub use session::SessionCache;
pub use settlement::{
    SettlementError, SettlementFlow, SettlementOutcome, SettlementPhase, SettlementRun,
};
pub use watch::InvoiceWatcher;
