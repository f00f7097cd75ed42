//! Alphacore: HD wallet core for the `alpha` network.
//!
//! # Architecture
//!
//! ```text
//! Wallet (aggregate: master key, chain code, mode, address list)
//!   │
//!   ├── keys     curve primitives, BIP32, HMAC compatibility modes, KeyManager
//!   ├── address  hash160, bech32 ("alpha" hrp), scriptPubKey, scripthash
//!   ├── formats  legacy .dat / text / JSON v1 import + export, verified by re-derivation
//!   ├── tx       UTXO selection, SegWit serialization, BIP143 signing, send
//!   ├── scan     bounded address discovery over base paths and both chains
//!   └── chain    ChainQuery contract (balance, list_unspent, broadcast)
//! ```
//!
//! The core never opens a socket. Network access goes through a
//! caller-supplied [`ChainQuery`].
//!
//! # Usage
//!
//! ```ignore
//! use alphacore::{formats, scan, WalletConfig};
//!
//! let config = WalletConfig::mainnet();
//! let bytes = std::fs::read("wallet.dat")?;
//! let mut wallet = formats::import(&bytes, Some("password"), &config).await?;
//!
//! scan::scan_and_apply(&mut wallet, &chain, &config).await?;
//! config.store("myapp").save(&wallet)?;
//! ```

pub mod address;
pub mod chain;
pub mod config;
pub mod error;
pub mod formats;
pub mod keys;
pub mod logging;
pub mod scan;
pub mod tx;
pub mod wallet;

// =============================================================================
// Re-exports
// =============================================================================
pub use address::{address_from_pubkey, decode_bech32, inspect, scripthash, AddressInfo};
pub use chain::{Balance, ChainError, ChainQuery, MemoryChain, UnspentOutput, Utxo};
pub use config::{Network, ScanConfig, WalletConfig};
pub use error::{Result, WalletError};
pub use formats::{detect, export, import, WalletFormat};
pub use keys::{DerivationMode, DerivationPath, KeyManager, KeyPair};
pub use scan::{AddressScanner, CancelHandle, ScanProgress, ScanReport, ScanState};
pub use tx::{send, FeePolicy, SendReport, SendRequest, SignedTransaction};
pub use wallet::{Wallet, WalletAddress, WalletSource, WalletStore};
