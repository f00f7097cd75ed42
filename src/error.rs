//! Error taxonomy for the wallet core.
//!
//! Every failure crosses the library boundary as a typed [`WalletError`].
//! Nothing here is retried silently; the caller decides.

use thiserror::Error;

use crate::address::Bech32Error;
use crate::chain::ChainError;

/// Errors returned by every public operation of the crate.
#[derive(Debug, Error)]
pub enum WalletError {
    /// Zero or out-of-range scalar during key derivation.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("invalid format: {0}")]
    InvalidFormat(String),

    #[error("unsupported version: {0}")]
    UnsupportedVersion(String),

    #[error("wallet is encrypted, a password is required")]
    NeedsPassword,

    #[error("wrong password")]
    WrongPassword,

    /// A stored address does not match its re-derivation.
    #[error("integrity check failed: {0}")]
    IntegrityCheckFailed(String),

    /// Two different addresses claim the same derivation path.
    #[error("path collision at {path}: existing {existing}, new {new}")]
    PathCollision {
        path: String,
        existing: String,
        new: String,
    },

    #[error("insufficient funds: available {available} sats, requested {requested} sats")]
    InsufficientFunds { available: u64, requested: u64 },

    #[error("shortfall after fees: {missing} sats still uncovered")]
    ShortfallAfterFees { missing: u64 },

    #[error("unsupported wallet format: {0}")]
    UnsupportedWalletFormat(String),

    #[error("invalid address: {0}")]
    InvalidAddress(#[from] Bech32Error),

    #[error("invalid derivation path: {0}")]
    InvalidPath(String),

    #[error("no private key available for {0}")]
    MissingKey(String),

    #[error("key manager not initialized")]
    NotInitialized,

    #[error(transparent)]
    Chain(#[from] ChainError),

    /// A broadcast failed after earlier transactions of the same send were
    /// accepted; `broadcast` lists their txids in plan order.
    #[error("broadcast {} of {total} failed: {source}", .broadcast.len() + 1)]
    PartialBroadcast {
        broadcast: Vec<String>,
        total: usize,
        source: ChainError,
    },

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("crypto: {0}")]
    Crypto(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result type for wallet operations.
pub type Result<T> = std::result::Result<T, WalletError>;

impl From<bitcoin::secp256k1::Error> for WalletError {
    fn from(e: bitcoin::secp256k1::Error) -> Self {
        WalletError::InvalidKey(e.to_string())
    }
}

impl From<hex::FromHexError> for WalletError {
    fn from(e: hex::FromHexError) -> Self {
        WalletError::InvalidFormat(format!("hex: {e}"))
    }
}
