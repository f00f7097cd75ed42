//! Wallet aggregate - master key material plus the append-only address list.
//!
//! # Lifecycle
//!
//! ```text
//! generate() ─┐
//! from_mnemonic() ─┼──▶ Wallet ──add_address()──▶ Wallet (+1 address)
//! formats::import() ─┘      │
//!                           └──wipe()──▶ secrets zeroized
//! ```
//!
//! Invariants held by every constructor:
//! - `bip32` and `legacy-hmac` wallets carry a chain code.
//! - Every address path is unique. A second, different address at a known
//!   path is a [`WalletError::PathCollision`], never an overwrite.

mod store;

pub use store::WalletStore;
pub use crate::keys::DerivationMode;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use zeroize::Zeroize;

use crate::error::{Result, WalletError};
use crate::keys::{curve, master_key_from_seed, DerivationPath, KeyManager};

/// Base path for generated and mnemonic-restored wallets.
pub const DEFAULT_DESCRIPTOR_PATH: &str = "84'/1'/0'";

/// Where the wallet's key material came from. Carried into JSON v1 exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WalletSource {
    #[default]
    Generated,
    Mnemonic,
    TextImport,
    JsonImport,
    LegacyDat,
}

impl WalletSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletSource::Generated => "generated",
            WalletSource::Mnemonic => "mnemonic",
            WalletSource::TextImport => "text-import",
            WalletSource::JsonImport => "json-import",
            WalletSource::LegacyDat => "legacy-dat",
        }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletAddress {
    pub address: String,
    /// Full derivation path; `None` for un-pathed legacy entries.
    pub path: Option<String>,
    pub index: u32,
    pub is_change: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

impl WalletAddress {
    /// A bare address with no key material, as listed in an export file.
    pub fn watch_only(address: impl Into<String>, path: Option<String>, index: u32, is_change: bool) -> Self {
        Self {
            address: address.into(),
            path,
            index,
            is_change,
            private_key: None,
            public_key: None,
        }
    }
}

impl fmt::Debug for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletAddress")
            .field("address", &self.address)
            .field("path", &self.path)
            .field("index", &self.index)
            .field("is_change", &self.is_change)
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub master_private_key: String,
    #[serde(default)]
    pub chain_code: Option<String>,
    #[serde(default)]
    pub derivation_mode: DerivationMode,
    pub descriptor_path: String,
    #[serde(default)]
    pub addresses: Vec<WalletAddress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mnemonic: Option<String>,
    #[serde(default)]
    pub source: WalletSource,
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("derivation_mode", &self.derivation_mode)
            .field("descriptor_path", &self.descriptor_path)
            .field("has_chain_code", &self.chain_code.is_some())
            .field("addresses", &self.addresses.len())
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl Drop for Wallet {
    fn drop(&mut self) {
        self.master_private_key.zeroize();
        self.mnemonic.zeroize();
        for addr in &mut self.addresses {
            addr.private_key.zeroize();
        }
    }
}

impl Wallet {
    /// Assemble a wallet from raw material and check its invariants.
    pub fn new(
        master: &[u8; 32],
        chain_code: Option<&[u8; 32]>,
        derivation_mode: DerivationMode,
        descriptor_path: &str,
        source: WalletSource,
    ) -> Result<Self> {
        if !curve::is_valid_scalar(master) {
            return Err(WalletError::InvalidKey("master key is zero or not below the curve order".into()));
        }
        let descriptor_path = descriptor_path.parse::<DerivationPath>()?.to_relative_string();
        let wallet = Self {
            master_private_key: hex::encode(master),
            chain_code: chain_code.map(hex::encode),
            derivation_mode,
            descriptor_path,
            addresses: Vec::new(),
            mnemonic: None,
            source,
        };
        wallet.check_mode_invariant()?;
        Ok(wallet)
    }

    /// Fresh random BIP32 wallet.
    pub fn generate() -> Result<Self> {
        let mut rng = rand::thread_rng();
        let mut master = [0u8; 32];
        loop {
            rng.fill_bytes(&mut master);
            if curve::is_valid_scalar(&master) {
                break;
            }
        }
        let mut chain_code = [0u8; 32];
        rng.fill_bytes(&mut chain_code);

        let wallet = Self::new(
            &master,
            Some(&chain_code),
            DerivationMode::Bip32,
            DEFAULT_DESCRIPTOR_PATH,
            WalletSource::Generated,
        );
        master.zeroize();
        chain_code.zeroize();
        wallet
    }

    /// Restore a BIP32 wallet from a BIP39 phrase.
    pub fn from_mnemonic(phrase: &str, passphrase: &str) -> Result<Self> {
        let mnemonic = bip39::Mnemonic::parse_normalized(phrase.trim())
            .map_err(|e| WalletError::InvalidFormat(format!("mnemonic: {e}")))?;
        let mut seed = mnemonic.to_seed_normalized(passphrase);
        let master = master_key_from_seed(&seed);
        seed.zeroize();
        let master = master?;

        let mut wallet = Self::new(
            &master.secret,
            Some(&master.chain_code),
            DerivationMode::Bip32,
            DEFAULT_DESCRIPTOR_PATH,
            WalletSource::Mnemonic,
        )?;
        wallet.mnemonic = Some(mnemonic.to_string());
        Ok(wallet)
    }

    /// New random 12-word phrase and the wallet restored from it.
    pub fn generate_with_mnemonic() -> Result<(Self, String)> {
        let mut entropy = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut entropy);
        let mnemonic = bip39::Mnemonic::from_entropy(&entropy)
            .map_err(|e| WalletError::Crypto(format!("mnemonic: {e}")));
        entropy.zeroize();
        let phrase = mnemonic?.to_string();
        let wallet = Self::from_mnemonic(&phrase, "")?;
        Ok((wallet, phrase))
    }

    fn check_mode_invariant(&self) -> Result<()> {
        if self.derivation_mode.requires_chain_code() && self.chain_code.is_none() {
            return Err(WalletError::InvalidFormat(format!(
                "{} wallet is missing its chain code",
                self.derivation_mode.as_str()
            )));
        }
        Ok(())
    }

    pub fn master_key_bytes(&self) -> Result<[u8; 32]> {
        decode_key32(&self.master_private_key, "master key")
    }

    pub fn chain_code_bytes(&self) -> Result<Option<[u8; 32]>> {
        self.chain_code
            .as_deref()
            .map(|cc| decode_key32(cc, "chain code"))
            .transpose()
    }

    pub fn first_address(&self) -> Option<&WalletAddress> {
        self.addresses.first()
    }

    pub fn find_address(&self, address: &str) -> Option<&WalletAddress> {
        self.addresses.iter().find(|a| a.address == address)
    }

    /// Append an address, enforcing path uniqueness.
    ///
    /// Returns `Ok(true)` when the address was appended and `Ok(false)` when
    /// the identical entry was already present.
    pub fn add_address(&mut self, new: WalletAddress) -> Result<bool> {
        if let Some(path) = new.path.as_deref() {
            if let Some(existing) = self.addresses.iter().find(|a| a.path.as_deref() == Some(path)) {
                if existing.address != new.address {
                    return Err(WalletError::PathCollision {
                        path: path.to_string(),
                        existing: existing.address.clone(),
                        new: new.address,
                    });
                }
                return Ok(false);
            }
        } else if self.addresses.iter().any(|a| a.path.is_none() && a.address == new.address) {
            return Ok(false);
        }
        self.addresses.push(new);
        Ok(true)
    }

    /// Check the aggregate's invariants: mode/chain-code pairing, parseable
    /// key material and unique address paths.
    pub fn validate(&self) -> Result<()> {
        self.check_mode_invariant()?;
        let master = self.master_key_bytes()?;
        if !curve::is_valid_scalar(&master) {
            return Err(WalletError::InvalidKey("master key is zero or not below the curve order".into()));
        }
        self.chain_code_bytes()?;
        self.descriptor_path.parse::<DerivationPath>()?;

        let mut seen: HashMap<&str, &str> = HashMap::new();
        for addr in &self.addresses {
            let Some(path) = addr.path.as_deref() else { continue };
            if let Some(existing) = seen.insert(path, &addr.address) {
                return Err(WalletError::PathCollision {
                    path: path.to_string(),
                    existing: existing.to_string(),
                    new: addr.address.clone(),
                });
            }
        }
        Ok(())
    }

    /// Derive the next external address and append it.
    pub fn next_address(&mut self, hrp: &str) -> Result<WalletAddress> {
        let index = match self.addresses.iter().filter(|a| !a.is_change).map(|a| a.index).max() {
            None => 0,
            Some(last) => last
                .checked_add(1)
                .ok_or_else(|| WalletError::InvalidPath("external address indices exhausted".into()))?,
        };
        let manager = KeyManager::from_wallet(self, hrp)?;
        let addr = manager.derive_address(index, false)?;
        self.add_address(addr.clone())?;
        Ok(addr)
    }

    /// Zeroize every secret held in memory and drop the address list.
    pub fn wipe(&mut self) {
        self.master_private_key.zeroize();
        self.chain_code.zeroize();
        self.mnemonic.zeroize();
        for addr in &mut self.addresses {
            addr.private_key.zeroize();
        }
        self.addresses.clear();
    }
}

fn decode_key32(value: &str, what: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(value.trim())?;
    bytes
        .try_into()
        .map_err(|v: Vec<u8>| WalletError::InvalidFormat(format!("{what} must be 32 bytes, got {}", v.len())))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn sample_address(address: &str, path: &str) -> WalletAddress {
        WalletAddress::watch_only(address, Some(path.to_string()), 0, false)
    }

    #[test]
    fn test_generate_is_valid_bip32() {
        let wallet = Wallet::generate().unwrap();
        assert_eq!(wallet.derivation_mode, DerivationMode::Bip32);
        assert_eq!(wallet.descriptor_path, DEFAULT_DESCRIPTOR_PATH);
        assert!(wallet.chain_code.is_some());
        wallet.validate().unwrap();
    }

    #[test]
    fn test_from_mnemonic_matches_bip32_seed() {
        let wallet = Wallet::from_mnemonic(PHRASE, "").unwrap();
        let seed = bip39::Mnemonic::parse(PHRASE).unwrap().to_seed("");
        let master = master_key_from_seed(&seed).unwrap();
        assert_eq!(wallet.master_private_key, hex::encode(master.secret));
        assert_eq!(wallet.chain_code.as_deref(), Some(hex::encode(master.chain_code).as_str()));
        assert_eq!(wallet.source, WalletSource::Mnemonic);
    }

    #[test]
    fn test_bad_mnemonic_rejected() {
        assert!(matches!(
            Wallet::from_mnemonic("abandon abandon", ""),
            Err(WalletError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_bip32_requires_chain_code() {
        let err = Wallet::new(&[1u8; 32], None, DerivationMode::Bip32, "84'/1'/0'", WalletSource::TextImport);
        assert!(err.is_err());
        let ok = Wallet::new(&[1u8; 32], None, DerivationMode::WifHmac, "84'/1'/0'", WalletSource::TextImport);
        assert!(ok.is_ok());
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut wallet = Wallet::generate().unwrap();
        assert!(wallet.add_address(sample_address("alpha1qa", "m/84'/1'/0'/0/0")).unwrap());
        assert!(!wallet.add_address(sample_address("alpha1qa", "m/84'/1'/0'/0/0")).unwrap());
        assert_eq!(wallet.addresses.len(), 1);
    }

    #[test]
    fn test_add_detects_path_collision() {
        let mut wallet = Wallet::generate().unwrap();
        wallet.add_address(sample_address("alpha1qa", "m/84'/1'/0'/0/0")).unwrap();
        let err = wallet
            .add_address(sample_address("alpha1qb", "m/84'/1'/0'/0/0"))
            .unwrap_err();
        match err {
            WalletError::PathCollision { path, existing, new } => {
                assert_eq!(path, "m/84'/1'/0'/0/0");
                assert_eq!(existing, "alpha1qa");
                assert_eq!(new, "alpha1qb");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(wallet.addresses.len(), 1);
    }

    #[test]
    fn test_validate_rejects_duplicate_paths() {
        let mut wallet = Wallet::generate().unwrap();
        wallet.addresses.push(sample_address("alpha1qa", "m/84'/1'/0'/0/0"));
        wallet.addresses.push(sample_address("alpha1qb", "m/84'/1'/0'/0/0"));
        assert!(matches!(wallet.validate(), Err(WalletError::PathCollision { .. })));
    }

    #[test]
    fn test_next_address_advances() {
        let mut wallet = Wallet::generate().unwrap();
        let a = wallet.next_address("alpha").unwrap();
        let b = wallet.next_address("alpha").unwrap();
        assert_eq!(a.index, 0);
        assert_eq!(b.index, 1);
        assert_ne!(a.address, b.address);
        assert_eq!(wallet.addresses.len(), 2);
    }

    #[test]
    fn test_next_address_at_last_index_fails() {
        let mut wallet = Wallet::generate().unwrap();
        wallet.addresses.push(WalletAddress::watch_only("alpha1qlast", None, u32::MAX, false));
        assert!(matches!(wallet.next_address("alpha"), Err(WalletError::InvalidPath(_))));
        assert_eq!(wallet.addresses.len(), 1);
    }

    #[test]
    fn test_wipe_clears_secrets() {
        let mut wallet = Wallet::from_mnemonic(PHRASE, "").unwrap();
        wallet.next_address("alpha").unwrap();
        wallet.wipe();
        assert!(wallet.master_private_key.is_empty());
        assert!(wallet.chain_code.is_none());
        assert!(wallet.mnemonic.is_none());
        assert!(wallet.addresses.is_empty());
    }

    #[test]
    fn test_debug_hides_secrets() {
        let wallet = Wallet::generate().unwrap();
        let dbg = format!("{wallet:?}");
        assert!(!dbg.contains(&wallet.master_private_key));
    }
}
