use std::time::Duration;

use async_trait::async_trait;

use crate::SolwalletError;

/// Read-side capabilities of the ledger network.
///
/// Account balance reads are informational display only; the backend
/// ledger stays authoritative for the application balance.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Latest block reference for transaction construction.
    async fn latest_blockhash(&self) -> Result<String, SolwalletError>;

    /// Whether the network has confirmed the given signature.
    async fn signature_confirmed(&self, signature: &str) -> Result<bool, SolwalletError>;

    async fn account_lamports(&self, address: &str) -> Result<u64, SolwalletError>;
}

/// Bounded confirmation wait. The chain transaction is not revocable, so
/// running out of attempts is a submission fault, never a rejection.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for ConfirmPolicy {
    fn default() -> Self {
        Self {
            attempts: 30,
            interval: Duration::from_secs(2),
        }
    }
}

impl ConfirmPolicy {
    pub(crate) async fn wait(
        &self,
        chain: &dyn ChainClient,
        signature: &str,
    ) -> Result<(), SolwalletError> {
        for attempt in 0..self.attempts {
            if chain.signature_confirmed(signature).await? {
                tracing::debug!(signature, attempt, "transfer confirmed");
                return Ok(());
            }
            tokio::time::sleep(self.interval).await;
        }
        Err(SolwalletError::ConfirmationTimeout(signature.to_string()))
    }
}
