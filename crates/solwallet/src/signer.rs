use async_trait::async_trait;

use crate::{SolwalletError, TransferIntent};

/// The external wallet capability that approves and submits a transfer.
///
/// Implementations map their user-cancellation error onto
/// [`SolwalletError::Rejected`] so callers can tell "the user said no"
/// apart from agent or network faults.
#[async_trait]
pub trait SigningAgent: Send + Sync {
    /// Funding address the transfer is paid from.
    fn address(&self) -> String;

    /// Approve and submit the transfer, returning the chain signature.
    async fn sign_and_send(&self, intent: &TransferIntent) -> Result<String, SolwalletError>;
}
