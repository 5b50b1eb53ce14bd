use thiserror::Error;

#[derive(Debug, Error)]
pub enum SolwalletError {
    #[error("invalid destination address: {0}")]
    InvalidDestination(String),

    #[error("invalid transfer amount: {0}")]
    InvalidAmount(String),

    /// The user declined in the signing agent. An expected outcome, not
    /// a fault; callers must not retry on the user's behalf.
    #[error("transfer rejected by user")]
    Rejected,

    #[error("signing agent error: {0}")]
    Agent(String),

    #[error("chain rpc error: {0}")]
    Chain(String),

    #[error("transaction {0} was not confirmed in time")]
    ConfirmationTimeout(String),
}

impl SolwalletError {
    /// Distinguishes the user saying no from everything else that can go
    /// wrong between signing and confirmation.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected)
    }
}
