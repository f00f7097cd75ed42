//! Wallet configuration - passed in by the host application.

use std::path::PathBuf;
use std::time::Duration;

use crate::keys::DerivationPath;
use crate::tx::FeePolicy;
use crate::wallet::WalletStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
}

impl Network {
    pub fn hrp(&self) -> &'static str {
        match self {
            Network::Mainnet => "alpha",
            Network::Testnet => "alphat",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mainnet" | "main" | "alpha" => Some(Network::Mainnet),
            "testnet" | "test" | "alphat" => Some(Network::Testnet),
            _ => None,
        }
    }
}

/// Base paths tried when the wallet has no usable descriptor path.
pub const CONVENTIONAL_BASE_PATHS: [&str; 4] = ["84'/1'/0'", "84'/0'/0'", "44'/0'/0'", "44'/1'/0'"];

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub max_addresses: u32,
    /// Explicit base paths. Empty means: wallet descriptor path, then
    /// [`CONVENTIONAL_BASE_PATHS`].
    pub base_paths: Vec<String>,
    pub query_timeout: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self { max_addresses: 200, base_paths: Vec::new(), query_timeout: Duration::from_secs(10) }
    }
}

impl ScanConfig {
    pub fn with_max_addresses(mut self, n: u32) -> Self { self.max_addresses = n; self }
    pub fn with_base_paths(mut self, paths: Vec<String>) -> Self { self.base_paths = paths; self }
    pub fn with_query_timeout(mut self, t: Duration) -> Self { self.query_timeout = t; self }

    /// Ordered, de-duplicated base paths to scan for a wallet whose
    /// descriptor path is `descriptor_path`.
    pub fn resolve_base_paths(&self, descriptor_path: Option<&str>) -> Vec<DerivationPath> {
        let candidates: Vec<&str> = if self.base_paths.is_empty() {
            descriptor_path.into_iter().chain(CONVENTIONAL_BASE_PATHS).collect()
        } else {
            self.base_paths.iter().map(String::as_str).collect()
        };
        let mut out: Vec<DerivationPath> = Vec::new();
        for candidate in candidates {
            match candidate.parse::<DerivationPath>() {
                Ok(path) if !out.contains(&path) => out.push(path),
                Ok(_) => {}
                Err(e) => tracing::warn!(path = candidate, error = %e, "ignoring unparseable base path"),
            }
        }
        out
    }
}

/// Wallet configuration. Higher layers construct this.
#[derive(Debug, Clone)]
pub struct WalletConfig {
    pub network: Network,
    pub fee_sats: u64,
    pub dust_sats: u64,
    pub scan: ScanConfig,
    pub legacy_decrypt_timeout: Duration,
    /// SHA-512 rounds between cooperative yields during legacy key stretching.
    pub kdf_yield_interval: u32,
    pub data_dir: Option<PathBuf>,
}

impl Default for WalletConfig {
    fn default() -> Self {
        let policy = FeePolicy::default();
        Self {
            network: Network::default(),
            fee_sats: policy.fee_sats,
            dust_sats: policy.dust_sats,
            scan: ScanConfig::default(),
            legacy_decrypt_timeout: Duration::from_secs(120),
            kdf_yield_interval: 10_000,
            data_dir: None,
        }
    }
}

impl WalletConfig {
    pub fn mainnet() -> Self { Self { network: Network::Mainnet, ..Default::default() } }
    pub fn testnet() -> Self { Self { network: Network::Testnet, ..Default::default() } }
    pub fn with_fee(mut self, fee_sats: u64) -> Self { self.fee_sats = fee_sats; self }
    pub fn with_dust(mut self, dust_sats: u64) -> Self { self.dust_sats = dust_sats; self }
    pub fn with_scan(mut self, scan: ScanConfig) -> Self { self.scan = scan; self }
    pub fn with_legacy_decrypt_timeout(mut self, t: Duration) -> Self { self.legacy_decrypt_timeout = t; self }
    pub fn with_kdf_yield_interval(mut self, rounds: u32) -> Self { self.kdf_yield_interval = rounds.max(1); self }
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self { self.data_dir = Some(path.into()); self }

    pub fn hrp(&self) -> &'static str {
        self.network.hrp()
    }

    pub fn fee_policy(&self) -> FeePolicy {
        FeePolicy { fee_sats: self.fee_sats, dust_sats: self.dust_sats }
    }

    /// Store under `data_dir` when set, else under the persistence root.
    pub fn store(&self, app: &str) -> WalletStore {
        match &self.data_dir {
            Some(dir) => WalletStore::in_dir(dir),
            None => WalletStore::for_app(app),
        }
    }
}
