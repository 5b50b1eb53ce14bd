use crate::{ChainClient, ConfirmPolicy, SigningAgent, SolwalletError};

/// Base58 alphabet used by chain addresses (no `0`, `O`, `I`, `l`).
const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

const ADDRESS_MIN_LEN: usize = 32;
const ADDRESS_MAX_LEN: usize = 44;

/// Raw settlement parameters, straight from a prepared invoice.
#[derive(Debug, Clone)]
pub struct TransferParams {
    pub from: String,
    pub to: String,
    pub lamports: u64,
    pub memo: Option<String>,
}

/// A validated transfer, ready for the signing agent once a block
/// reference is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferIntent {
    pub from: String,
    pub to: String,
    pub lamports: u64,
    pub memo: Option<String>,
    pub recent_blockhash: Option<String>,
}

impl TransferIntent {
    /// Validate settlement parameters before anything touches the
    /// signing agent. A malformed request must never reach the user.
    pub fn build(params: TransferParams) -> Result<Self, SolwalletError> {
        if params.lamports == 0 {
            return Err(SolwalletError::InvalidAmount(
                "amount must be greater than zero".to_string(),
            ));
        }
        validate_address(&params.from)?;
        validate_address(&params.to)?;

        Ok(Self {
            from: params.from,
            to: params.to,
            lamports: params.lamports,
            memo: params
                .memo
                .as_deref()
                .map(str::trim)
                .filter(|memo| !memo.is_empty())
                .map(str::to_string),
            recent_blockhash: None,
        })
    }

    #[must_use]
    pub fn with_blockhash(mut self, blockhash: impl Into<String>) -> Self {
        self.recent_blockhash = Some(blockhash.into());
        self
    }
}

fn validate_address(address: &str) -> Result<(), SolwalletError> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(SolwalletError::InvalidDestination(
            "address is empty".to_string(),
        ));
    }
    if trimmed.len() < ADDRESS_MIN_LEN || trimmed.len() > ADDRESS_MAX_LEN {
        return Err(SolwalletError::InvalidDestination(format!(
            "address {trimmed} has invalid length {}",
            trimmed.len()
        )));
    }
    if let Some(bad) = trimmed.chars().find(|c| !BASE58_ALPHABET.contains(*c)) {
        return Err(SolwalletError::InvalidDestination(format!(
            "address {trimmed} contains non-base58 character {bad:?}"
        )));
    }
    Ok(())
}

/// Attach the latest block reference, delegate to the signing agent, and
/// wait for network confirmation. Returns the chain signature.
///
/// A [`SolwalletError::Rejected`] passes through untouched; any other
/// failure is terminal for this attempt and retryable only by a fresh
/// run with a freshly built intent.
pub async fn submit_transfer(
    signer: &dyn SigningAgent,
    chain: &dyn ChainClient,
    intent: TransferIntent,
    confirm: ConfirmPolicy,
) -> Result<String, SolwalletError> {
    let blockhash = chain.latest_blockhash().await?;
    let intent = intent.with_blockhash(blockhash);

    let signature = signer.sign_and_send(&intent).await?;
    tracing::info!(%signature, lamports = intent.lamports, "transfer submitted");

    confirm.wait(chain, &signature).await?;
    Ok(signature)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::{TransferIntent, TransferParams, submit_transfer, validate_address};
    use crate::{ChainClient, ConfirmPolicy, SigningAgent, SolwalletError};

    const PAYER: &str = "4Nd1mY5c3kQe7V9pWx2uTzH8rJbL6gAfD1sKqPnZvXyB";
    const DEST: &str = "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin";

    fn params(lamports: u64) -> TransferParams {
        TransferParams {
            from: PAYER.to_string(),
            to: DEST.to_string(),
            lamports,
            memo: Some("inv_1".to_string()),
        }
    }

    struct StubSigner {
        outcome: Mutex<Option<Result<String, SolwalletError>>>,
    }

    impl StubSigner {
        fn ok(signature: &str) -> Self {
            Self {
                outcome: Mutex::new(Some(Ok(signature.to_string()))),
            }
        }

        fn failing(error: SolwalletError) -> Self {
            Self {
                outcome: Mutex::new(Some(Err(error))),
            }
        }
    }

    #[async_trait]
    impl SigningAgent for StubSigner {
        fn address(&self) -> String {
            PAYER.to_string()
        }

        async fn sign_and_send(&self, intent: &TransferIntent) -> Result<String, SolwalletError> {
            assert!(intent.recent_blockhash.is_some(), "blockhash not attached");
            let Ok(mut guard) = self.outcome.lock() else {
                return Err(SolwalletError::Agent("poisoned stub".to_string()));
            };
            guard
                .take()
                .unwrap_or(Err(SolwalletError::Agent("stub reused".to_string())))
        }
    }

    struct StubChain {
        confirm_after: u32,
        polls: AtomicU32,
    }

    impl StubChain {
        fn confirming_after(polls: u32) -> Self {
            Self {
                confirm_after: polls,
                polls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl ChainClient for StubChain {
        async fn latest_blockhash(&self) -> Result<String, SolwalletError> {
            Ok("hash11111111111111111111111111111111".to_string())
        }

        async fn signature_confirmed(&self, _signature: &str) -> Result<bool, SolwalletError> {
            let seen = self.polls.fetch_add(1, Ordering::SeqCst);
            Ok(seen >= self.confirm_after)
        }

        async fn account_lamports(&self, _address: &str) -> Result<u64, SolwalletError> {
            Ok(0)
        }
    }

    fn fast_confirm() -> ConfirmPolicy {
        ConfirmPolicy {
            attempts: 3,
            interval: Duration::from_millis(5),
        }
    }

    #[test]
    fn build_rejects_zero_amount_before_signing() {
        let result = TransferIntent::build(params(0));
        assert!(matches!(result, Err(SolwalletError::InvalidAmount(_))));
    }

    #[test]
    fn build_rejects_malformed_destination() {
        let mut bad = params(1);
        bad.to = "not-base58-0OIl".to_string();
        assert!(matches!(
            TransferIntent::build(bad),
            Err(SolwalletError::InvalidDestination(_))
        ));

        let mut empty = params(1);
        empty.to = "  ".to_string();
        assert!(matches!(
            TransferIntent::build(empty),
            Err(SolwalletError::InvalidDestination(_))
        ));
    }

    #[test]
    fn build_normalizes_blank_memo_to_none() {
        let mut blank = params(10);
        blank.memo = Some("   ".to_string());
        let Ok(intent) = TransferIntent::build(blank) else {
            assert!(false, "intent should build");
            return;
        };
        assert!(intent.memo.is_none());
    }

    #[test]
    fn validate_address_accepts_typical_chain_addresses() {
        assert!(validate_address(PAYER).is_ok());
        assert!(validate_address(DEST).is_ok());
    }

    #[tokio::test]
    async fn submit_returns_signature_after_confirmation() -> anyhow::Result<()> {
        let signer = StubSigner::ok("sig_ok");
        let chain = StubChain::confirming_after(1);
        let intent = TransferIntent::build(params(500_000_000))?;

        let signature = submit_transfer(&signer, &chain, intent, fast_confirm()).await?;
        assert_eq!(signature, "sig_ok");
        assert!(chain.polls.load(Ordering::SeqCst) >= 2);
        Ok(())
    }

    #[tokio::test]
    async fn submit_passes_user_rejection_through() -> anyhow::Result<()> {
        let signer = StubSigner::failing(SolwalletError::Rejected);
        let chain = StubChain::confirming_after(0);
        let intent = TransferIntent::build(params(500_000_000))?;

        let result = submit_transfer(&signer, &chain, intent, fast_confirm()).await;
        assert!(matches!(result, Err(SolwalletError::Rejected)));
        Ok(())
    }

    #[tokio::test]
    async fn submit_times_out_when_confirmation_never_lands() -> anyhow::Result<()> {
        let signer = StubSigner::ok("sig_slow");
        let chain = StubChain::confirming_after(u32::MAX);
        let intent = TransferIntent::build(params(500_000_000))?;

        let result = submit_transfer(&signer, &chain, intent, fast_confirm()).await;
        assert!(matches!(
            result,
            Err(SolwalletError::ConfirmationTimeout(signature)) if signature == "sig_slow"
        ));
        Ok(())
    }
}
