//! Fixed-interval invoice polling while any invoice is still active.
//!
//! There is no push channel from the backend; while an invoice is
//! pending or processing the watcher re-lists on an interval, triggers a
//! balance refresh when a watched invoice settles, and stops as soon as
//! nothing is active. Teardown aborts the task.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::balance::BalanceStore;
use crate::invoices::InvoiceStore;

pub struct InvoiceWatcher {
    handle: Option<JoinHandle<()>>,
}

impl InvoiceWatcher {
    #[must_use]
    pub fn spawn(
        invoices: Arc<InvoiceStore>,
        balance: Arc<BalanceStore>,
        interval: Duration,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;

                let watched: HashSet<String> = invoices
                    .entries()
                    .into_iter()
                    .filter(|invoice| invoice.status.is_active())
                    .map(|invoice| invoice.id)
                    .collect();
                if watched.is_empty() {
                    debug!("no active invoices; watcher stopping");
                    break;
                }

                if let Err(error) = invoices.refresh().await {
                    warn!(%error, "invoice poll failed; retrying next tick");
                    continue;
                }

                let entries = invoices.entries();
                let settled = entries
                    .iter()
                    .any(|invoice| watched.contains(&invoice.id) && invoice.status.is_terminal());
                if settled {
                    info!("watched invoice reached a terminal state");
                    if let Err(error) = balance.refresh().await {
                        warn!(%error, "balance refresh after settlement failed");
                    }
                }

                if !entries.iter().any(|invoice| invoice.status.is_active()) {
                    debug!("all invoices terminal; watcher stopping");
                    break;
                }
            }
        });
        Self {
            handle: Some(handle),
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle
            .as_ref()
            .is_none_or(tokio::task::JoinHandle::is_finished)
    }

    /// Wait for the watcher to stop on its own.
    pub async fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }

    pub fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for InvoiceWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use anyhow::Result;
    use axum::extract::State;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::{Json, Router};
    use chrono::{Duration as ChronoDuration, Utc};
    use serde_json::{Value, json};
    use solline_ledger_client::{InvoiceStatus, LedgerApiClient};
    use tokio::net::TcpListener;
    use tokio::sync::{Mutex, oneshot};

    use super::InvoiceWatcher;
    use crate::balance::BalanceStore;
    use crate::config::TreasuryConfig;
    use crate::invoices::InvoiceStore;
    use crate::session::SessionCache;

    #[derive(Debug)]
    struct WatchStub {
        status: String,
        list_calls: u32,
        balance_calls: u32,
        settle_after: u32,
    }

    #[derive(Clone)]
    struct WatchStubState {
        inner: Arc<Mutex<WatchStub>>,
    }

    async fn list_invoices(State(state): State<WatchStubState>) -> impl IntoResponse {
        let mut stub = state.inner.lock().await;
        stub.list_calls += 1;
        if stub.list_calls >= stub.settle_after {
            stub.status = "paid".to_string();
        }
        let created = Utc::now() - ChronoDuration::minutes(1);
        let invoice: Value = json!({
            "id": "inv_watched",
            "lamports": 500_000_000_u64,
            "toAddress": "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin",
            "status": stub.status,
            "createdAt": created.to_rfc3339(),
            "expiresAt": (created + ChronoDuration::minutes(30)).to_rfc3339(),
        });
        Json(json!({"invoices": [invoice], "total": 1}))
    }

    async fn get_balance(State(state): State<WatchStubState>) -> impl IntoResponse {
        let mut stub = state.inner.lock().await;
        stub.balance_calls += 1;
        Json(json!({"solBalance": 0.5, "usdBalance": 75.0, "status": "active"}))
    }

    async fn spawn_watch_stub(
        settle_after: u32,
    ) -> Result<(String, Arc<Mutex<WatchStub>>, oneshot::Sender<()>)> {
        let state = Arc::new(Mutex::new(WatchStub {
            status: "processing".to_string(),
            list_calls: 0,
            balance_calls: 0,
            settle_after,
        }));
        let app = Router::new()
            .route("/v1/invoices", get(list_invoices))
            .route("/v1/balance", get(get_balance))
            .with_state(WatchStubState {
                inner: state.clone(),
            });
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            let _ = server.await;
        });
        Ok((format!("http://{addr}"), state, shutdown_tx))
    }

    fn stores_for(base_url: &str) -> (Arc<InvoiceStore>, Arc<BalanceStore>) {
        let config = TreasuryConfig::default();
        let api = Arc::new(LedgerApiClient::new(base_url, None));
        let session = Arc::new(SessionCache::new());
        (
            Arc::new(InvoiceStore::new(
                Arc::clone(&api),
                Arc::clone(&session),
                &config,
            )),
            Arc::new(BalanceStore::new(api, session, &config)),
        )
    }

    #[tokio::test]
    async fn watcher_polls_until_settlement_then_stops() -> Result<()> {
        let (base_url, state, shutdown) = spawn_watch_stub(2).await?;
        let (invoices, balance) = stores_for(&base_url);

        // Seed the cache with the processing invoice.
        invoices.refresh().await?;
        assert!(invoices.first_active().is_some());

        let watcher = InvoiceWatcher::spawn(
            Arc::clone(&invoices),
            Arc::clone(&balance),
            Duration::from_millis(10),
        );
        watcher.join().await;

        let invoice = invoices
            .get("inv_watched")
            .ok_or_else(|| anyhow::anyhow!("watched invoice missing"))?;
        assert_eq!(invoice.status, InvoiceStatus::Paid);

        let stub = state.lock().await;
        assert!(stub.balance_calls >= 1, "settlement must refresh balance");

        let _ = shutdown.send(());
        Ok(())
    }

    #[tokio::test]
    async fn watcher_stops_immediately_without_active_invoices() -> Result<()> {
        let (base_url, state, shutdown) = spawn_watch_stub(u32::MAX).await?;
        let (invoices, balance) = stores_for(&base_url);

        // Cache is empty: nothing to watch.
        let watcher = InvoiceWatcher::spawn(
            Arc::clone(&invoices),
            Arc::clone(&balance),
            Duration::from_millis(10),
        );
        watcher.join().await;

        let stub = state.lock().await;
        assert_eq!(stub.list_calls, 0);
        assert_eq!(stub.balance_calls, 0);

        let _ = shutdown.send(());
        Ok(())
    }

    #[tokio::test]
    async fn shutdown_aborts_a_running_watcher() -> Result<()> {
        let (base_url, _state, shutdown) = spawn_watch_stub(u32::MAX).await?;
        let (invoices, balance) = stores_for(&base_url);
        invoices.refresh().await?;

        let mut watcher = InvoiceWatcher::spawn(invoices, balance, Duration::from_millis(10));
        assert!(!watcher.is_finished());
        watcher.shutdown();
        assert!(watcher.is_finished());

        let _ = shutdown.send(());
        Ok(())
    }
}
