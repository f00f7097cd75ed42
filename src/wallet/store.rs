//! JSON persistence for the wallet aggregate.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::Wallet;
use crate::error::Result;

const WALLET_FILE: &str = "wallet.json";

#[derive(Debug, Clone)]
pub struct WalletStore {
    path: PathBuf,
}

impl WalletStore {
    /// Store rooted at `ALPHACORE_ROOT` (or the platform data dir) for `app`.
    pub fn for_app(app: &str) -> Self {
        Self { path: default_root().join(app).join("data").join(WALLET_FILE) }
    }

    /// Store keeping `wallet.json` inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self { path: dir.as_ref().join(WALLET_FILE) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn save(&self, wallet: &Wallet) -> Result<()> {
        wallet.validate()?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(wallet)?)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), addresses = wallet.addresses.len(), "wallet saved");
        Ok(())
    }

    pub fn load(&self) -> Result<Option<Wallet>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read(&self.path)?;
        let wallet: Wallet = serde_json::from_slice(&raw)?;
        wallet.validate()?;
        Ok(Some(wallet))
    }

    /// Zeroize the in-memory wallet and delete the persisted copy.
    pub fn wipe(&self, wallet: &mut Wallet) -> Result<()> {
        wallet.wipe();
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
            info!(path = %self.path.display(), "wallet file removed");
        }
        Ok(())
    }
}

pub(crate) fn default_root() -> PathBuf {
    std::env::var("ALPHACORE_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")))
}
