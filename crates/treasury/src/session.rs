//! Page-scoped snapshot of the last known balance and invoice page.
//!
//! Exists only so the first paint after a reload is not blank; it is
//! never trusted over a fresh fetch and is cleared by invalidation.

use std::sync::RwLock;

use solline_ledger_client::{BalanceResponse, Invoice};

#[derive(Debug, Default)]
pub struct SessionCache {
    balance: RwLock<Option<BalanceResponse>>,
    invoices: RwLock<Option<Vec<Invoice>>>,
}

impl SessionCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn balance(&self) -> Option<BalanceResponse> {
        self.balance.read().ok().and_then(|lock| *lock)
    }

    pub fn store_balance(&self, balance: BalanceResponse) {
        if let Ok(mut lock) = self.balance.write() {
            *lock = Some(balance);
        }
    }

    #[must_use]
    pub fn invoices(&self) -> Option<Vec<Invoice>> {
        self.invoices.read().ok().and_then(|lock| lock.clone())
    }

    pub fn store_invoices(&self, invoices: &[Invoice]) {
        if let Ok(mut lock) = self.invoices.write() {
            *lock = Some(invoices.to_vec());
        }
    }

    pub fn clear_invoices(&self) {
        if let Ok(mut lock) = self.invoices.write() {
            *lock = None;
        }
    }

    pub fn clear(&self) {
        if let Ok(mut lock) = self.balance.write() {
            *lock = None;
        }
        self.clear_invoices();
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use solline_ledger_client::{
        AccountStatus, BalanceResponse, Invoice, InvoiceStatus,
    };

    use super::SessionCache;

    fn invoice(id: &str) -> Invoice {
        let created = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap_or_default();
        Invoice {
            id: id.to_string(),
            lamports: 1,
            to_address: "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin".to_string(),
            memo: None,
            status: InvoiceStatus::Pending,
            created_at: created,
            expires_at: created + chrono::Duration::minutes(30),
            paid_at: None,
        }
    }

    #[test]
    fn snapshot_round_trip_and_clear() {
        let session = SessionCache::new();
        assert!(session.balance().is_none());
        assert!(session.invoices().is_none());

        session.store_balance(BalanceResponse {
            sol_balance: 0.5,
            usd_balance: 72.0,
            status: AccountStatus::Active,
        });
        session.store_invoices(&[invoice("inv_1")]);

        assert!(session.balance().is_some());
        assert_eq!(
            session.invoices().map(|list| list.len()).unwrap_or_default(),
            1
        );

        session.clear_invoices();
        assert!(session.invoices().is_none());
        assert!(session.balance().is_some());

        session.clear();
        assert!(session.balance().is_none());
    }
}
