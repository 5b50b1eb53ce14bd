//! Drives one top-up attempt from intent to reconciled balance.
//!
//! The backend, the signing agent, and the chain fail independently and
//! there is no push channel, so every step checks its result before
//! advancing and the final truth always comes from a reconciling fetch,
//! never from the happy path alone.

use std::sync::Arc;
use std::time::Duration;

use solline_ledger_client::AccountStatus;
use solwallet::{
    ChainClient, ConfirmPolicy, SigningAgent, SolwalletError, TransferIntent, TransferParams,
    submit_transfer,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::balance::BalanceStore;
use crate::config::TreasuryConfig;
use crate::invoices::{InvoiceStore, InvoiceStoreError};

/// Phases of a single settlement attempt, in execution order. No phase
/// retries itself; a retry is a fresh run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementPhase {
    Idle,
    Preparing,
    Built,
    AwaitingSignature,
    Submitted,
    Reporting,
    Reconciling,
    Done,
    Rejected,
    Failed,
}

#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("account is banned from settlement")]
    AccountBanned,

    #[error(transparent)]
    Invoice(#[from] InvoiceStoreError),

    #[error(transparent)]
    Transfer(#[from] SolwalletError),
}

#[derive(Debug)]
pub enum SettlementOutcome {
    /// The transfer was signed, submitted, and reported. Whether the
    /// backend acknowledged the report is recorded separately; the ack
    /// never asserts settlement, only refreshed invoice state does.
    Settled {
        invoice_id: String,
        signature: String,
        report_acknowledged: bool,
    },
    /// The user declined in the signing agent. The invoice stays
    /// pending for a later retry or cancellation.
    Rejected { invoice_id: String },
    Failed {
        phase: SettlementPhase,
        error: SettlementError,
    },
}

#[derive(Debug)]
pub struct SettlementRun {
    pub outcome: SettlementOutcome,
    /// Phase trace in the order the attempt moved through them.
    pub phases: Vec<SettlementPhase>,
    /// The delayed follow-up reconciliation pass, present on settled
    /// runs. Detached; tests await it.
    pub delayed_reconcile: Option<JoinHandle<()>>,
}

impl SettlementRun {
    fn failed(
        mut phases: Vec<SettlementPhase>,
        phase: SettlementPhase,
        error: SettlementError,
    ) -> Self {
        phases.push(SettlementPhase::Failed);
        Self {
            outcome: SettlementOutcome::Failed { phase, error },
            phases,
            delayed_reconcile: None,
        }
    }
}

pub struct SettlementFlow {
    invoices: Arc<InvoiceStore>,
    balance: Arc<BalanceStore>,
    signer: Arc<dyn SigningAgent>,
    chain: Arc<dyn ChainClient>,
    confirm: ConfirmPolicy,
    reconcile_delay: Duration,
}

impl SettlementFlow {
    #[must_use]
    pub fn new(
        invoices: Arc<InvoiceStore>,
        balance: Arc<BalanceStore>,
        signer: Arc<dyn SigningAgent>,
        chain: Arc<dyn ChainClient>,
        config: &TreasuryConfig,
    ) -> Self {
        Self {
            invoices,
            balance,
            signer,
            chain,
            confirm: config.confirm,
            reconcile_delay: config.reconcile_delay,
        }
    }

    /// Run one settlement attempt for `lamports`.
    ///
    /// Step order is absolute: completion is never reported before a
    /// signature exists, and reconciliation never runs before the report
    /// was attempted.
    pub async fn run(&self, lamports: u64) -> SettlementRun {
        let mut phases = vec![SettlementPhase::Idle];

        if lamports == 0 {
            return SettlementRun::failed(
                phases,
                SettlementPhase::Preparing,
                InvoiceStoreError::ZeroAmount.into(),
            );
        }
        if self.balance.account_status() == Some(AccountStatus::Banned) {
            return SettlementRun::failed(
                phases,
                SettlementPhase::Preparing,
                SettlementError::AccountBanned,
            );
        }

        phases.push(SettlementPhase::Preparing);
        // Best-effort refresh so the at-most-one-active check runs
        // against the freshest cache the backend will give us.
        if let Err(error) = self.invoices.refresh().await {
            warn!(%error, "pre-settlement invoice refresh failed; using cached sequence");
        }
        let invoice = match self.invoices.create(lamports).await {
            Ok(invoice) => invoice,
            Err(error) => {
                return SettlementRun::failed(phases, SettlementPhase::Preparing, error.into());
            }
        };
        debug!(invoice = %invoice.id, lamports, "settlement prepared");

        phases.push(SettlementPhase::Built);
        let intent = match TransferIntent::build(TransferParams {
            from: self.signer.address(),
            to: invoice.to_address.clone(),
            lamports: invoice.lamports,
            memo: invoice.memo.clone(),
        }) {
            Ok(intent) => intent,
            Err(error) => {
                return SettlementRun::failed(phases, SettlementPhase::Built, error.into());
            }
        };

        phases.push(SettlementPhase::AwaitingSignature);
        let signature = match submit_transfer(
            self.signer.as_ref(),
            self.chain.as_ref(),
            intent,
            self.confirm,
        )
        .await
        {
            Ok(signature) => signature,
            Err(error) if error.is_rejection() => {
                info!(invoice = %invoice.id, "user rejected the transfer; invoice stays pending");
                phases.push(SettlementPhase::Rejected);
                return SettlementRun {
                    outcome: SettlementOutcome::Rejected {
                        invoice_id: invoice.id,
                    },
                    phases,
                    delayed_reconcile: None,
                };
            }
            Err(error) => {
                return SettlementRun::failed(
                    phases,
                    SettlementPhase::AwaitingSignature,
                    error.into(),
                );
            }
        };
        phases.push(SettlementPhase::Submitted);

        phases.push(SettlementPhase::Reporting);
        let report_acknowledged = match self
            .invoices
            .report_completion(&invoice.id, &signature)
            .await
        {
            Ok(()) => true,
            Err(error) => {
                // The chain transfer may still settle; the backend
                // verifies on-chain state on its own schedule.
                warn!(
                    invoice = %invoice.id,
                    %error,
                    "completion report failed; reconciliation will pick up the true state"
                );
                false
            }
        };

        phases.push(SettlementPhase::Reconciling);
        self.reconcile().await;
        let delayed = self.schedule_delayed_reconcile();

        phases.push(SettlementPhase::Done);
        info!(invoice = %invoice.id, %signature, report_acknowledged, "settlement attempt finished");
        SettlementRun {
            outcome: SettlementOutcome::Settled {
                invoice_id: invoice.id,
                signature,
                report_acknowledged,
            },
            phases,
            delayed_reconcile: Some(delayed),
        }
    }

    async fn reconcile(&self) {
        if let Err(error) = self.invoices.invalidate().await {
            warn!(%error, "invoice reconciliation failed");
        }
        if let Err(error) = self.balance.refresh().await {
            warn!(%error, "balance reconciliation failed");
        }
    }

    /// Backend verification is asynchronous, so one delayed single-shot
    /// pass runs after the immediate reconciliation.
    fn schedule_delayed_reconcile(&self) -> JoinHandle<()> {
        let invoices = Arc::clone(&self.invoices);
        let balance = Arc::clone(&self.balance);
        let delay = self.reconcile_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            debug!("delayed reconciliation pass");
            if let Err(error) = invoices.invalidate().await {
                warn!(%error, "delayed invoice reconciliation failed");
            }
            if let Err(error) = balance.refresh().await {
                warn!(%error, "delayed balance reconciliation failed");
            }
        })
    }
}
