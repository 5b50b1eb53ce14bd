//! Chain seam for solline: transfer construction, the external
//! signing-agent boundary, and submit-and-confirm against the network.
//!
//! The client never holds private keys; signing and submission belong to
//! the user-controlled agent behind [`SigningAgent`].

mod chain;
mod error;
mod signer;
mod transfer;

pub use chain::{ChainClient, ConfirmPolicy};
pub use error::SolwalletError;
pub use signer::SigningAgent;
pub use transfer::{TransferIntent, TransferParams, submit_transfer};
