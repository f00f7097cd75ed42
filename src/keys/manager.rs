//! KeyManager - caller-owned holder of the master secret.
//!
//! Explicit lifecycle: `init` loads material, `clear` (or drop) zeroizes it.
//! Every derivation goes through here so the mode switch lives in one place.

use zeroize::{Zeroize, ZeroizeOnDrop};

use super::bip32::{self, ExtendedPrivateKey};
use super::compat::{self, compat_path};
use super::curve::{self, KeyPair};
use super::path::{DerivationPath, HARDENED_OFFSET};
use super::DerivationMode;
use crate::address::address_from_pubkey;
use crate::error::{Result, WalletError};
use crate::wallet::{Wallet, WalletAddress};

#[derive(Zeroize, ZeroizeOnDrop)]
struct KeyState {
    master: [u8; 32],
    chain_code: Option<[u8; 32]>,
    #[zeroize(skip)]
    mode: DerivationMode,
    #[zeroize(skip)]
    base_path: DerivationPath,
}

pub struct KeyManager {
    hrp: String,
    state: Option<KeyState>,
}

impl KeyManager {
    pub fn new(hrp: impl Into<String>) -> Self {
        Self { hrp: hrp.into(), state: None }
    }

    /// Build an initialized manager from a wallet aggregate.
    pub fn from_wallet(wallet: &Wallet, hrp: impl Into<String>) -> Result<Self> {
        let mut manager = Self::new(hrp);
        let mut master = wallet.master_key_bytes()?;
        let chain_code = wallet.chain_code_bytes()?;
        let result = manager.init(master, chain_code, wallet.derivation_mode, &wallet.descriptor_path);
        master.zeroize();
        result.map(|_| manager)
    }

    /// Load key material. Replaces (and wipes) any previous state.
    pub fn init(
        &mut self,
        master: [u8; 32],
        chain_code: Option<[u8; 32]>,
        mode: DerivationMode,
        base_path: &str,
    ) -> Result<()> {
        if !curve::is_valid_scalar(&master) {
            return Err(WalletError::InvalidKey("master key is zero or not below the curve order".into()));
        }
        if mode.requires_chain_code() && chain_code.is_none() {
            return Err(WalletError::InvalidFormat(format!(
                "{} derivation requires a chain code",
                mode.as_str()
            )));
        }
        let base_path: DerivationPath = base_path.parse()?;
        self.state = Some(KeyState { master, chain_code, mode, base_path });
        Ok(())
    }

    pub fn clear(&mut self) {
        // KeyState zeroizes itself on drop.
        self.state = None;
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    pub fn hrp(&self) -> &str {
        &self.hrp
    }

    pub fn mode(&self) -> Result<DerivationMode> {
        Ok(self.state()?.mode)
    }

    pub fn base_path(&self) -> Result<&DerivationPath> {
        Ok(&self.state()?.base_path)
    }

    fn state(&self) -> Result<&KeyState> {
        self.state.as_ref().ok_or(WalletError::NotInitialized)
    }

    fn extended_master(state: &KeyState) -> Result<ExtendedPrivateKey> {
        let chain_code = state.chain_code.ok_or_else(|| {
            WalletError::InvalidFormat("BIP32 derivation requires a chain code".into())
        })?;
        ExtendedPrivateKey::new(state.master, chain_code)
    }

    /// BIP32 keypair at an absolute path. Only valid in `bip32` mode.
    pub fn derive_path(&self, path: &DerivationPath) -> Result<KeyPair> {
        let state = self.state()?;
        if state.mode != DerivationMode::Bip32 {
            return Err(WalletError::InvalidPath(format!(
                "{} wallets do not support BIP32 paths",
                state.mode.as_str()
            )));
        }
        let master = Self::extended_master(state)?;
        bip32::derive_at_path(&master, path)?.keypair()
    }

    /// Address at `index` on the external or change chain of the wallet's
    /// own base path.
    pub fn derive_address(&self, index: u32, is_change: bool) -> Result<WalletAddress> {
        let base = self.state()?.base_path.clone();
        self.derive_address_at(&base, index, is_change)
    }

    /// Address at `index` under an explicit base path. Compatibility modes
    /// ignore the base path and have no change chain.
    pub fn derive_address_at(&self, base: &DerivationPath, index: u32, is_change: bool) -> Result<WalletAddress> {
        let state = self.state()?;
        let (keypair, path) = match state.mode {
            DerivationMode::Bip32 => {
                let path = base.address_path(is_change, index);
                (self.derive_path(&path)?, path.to_string())
            }
            DerivationMode::WifHmac | DerivationMode::LegacyHmac => {
                if is_change {
                    return Err(WalletError::InvalidPath(format!(
                        "{} wallets have no change chain",
                        state.mode.as_str()
                    )));
                }
                (self.compat_keypair(state, index)?, compat_path(index))
            }
        };
        self.wallet_address(keypair, Some(path), index, is_change)
    }

    fn compat_keypair(&self, state: &KeyState, index: u32) -> Result<KeyPair> {
        let mut child = match state.mode {
            DerivationMode::WifHmac => compat::wif_hmac_child(&state.master, index)?,
            DerivationMode::LegacyHmac => {
                let chain_code = state.chain_code.as_ref().ok_or_else(|| {
                    WalletError::InvalidFormat("legacy-hmac derivation requires a chain code".into())
                })?;
                compat::legacy_hmac_child(&state.master, chain_code, index)?
            }
            DerivationMode::Bip32 => {
                return Err(WalletError::InvalidPath("bip32 wallets derive by path, not by index".into()))
            }
        };
        let keypair = KeyPair::from_bytes(&child);
        child.zeroize();
        keypair
    }

    /// Re-derive the address for a recorded path string.
    ///
    /// BIP32 paths must end in `<chain>/<index>` with both components
    /// non-hardened; compatibility paths must be `m/44'/0'/<index>'`.
    pub fn address_for_path(&self, path: &str) -> Result<WalletAddress> {
        let state = self.state()?;
        let parsed: DerivationPath = path.parse()?;
        match state.mode {
            DerivationMode::Bip32 => {
                let indices = parsed.indices();
                let (chain, index) = match indices {
                    [.., chain, index] if *chain < 2 && *index < HARDENED_OFFSET => (*chain, *index),
                    _ => {
                        return Err(WalletError::InvalidPath(format!(
                            "'{path}' does not end in <chain>/<index>"
                        )))
                    }
                };
                let keypair = self.derive_path(&parsed)?;
                self.wallet_address(keypair, Some(parsed.to_string()), index, chain == 1)
            }
            DerivationMode::WifHmac | DerivationMode::LegacyHmac => {
                let index = match parsed.indices() {
                    [a, b, c] if *a == 44 | HARDENED_OFFSET && *b == HARDENED_OFFSET && *c >= HARDENED_OFFSET => {
                        *c - HARDENED_OFFSET
                    }
                    _ => {
                        return Err(WalletError::InvalidPath(format!(
                            "'{path}' is not a {} path",
                            state.mode.as_str()
                        )))
                    }
                };
                self.derive_address_at(&DerivationPath::master(), index, false)
            }
        }
    }

    fn wallet_address(&self, keypair: KeyPair, path: Option<String>, index: u32, is_change: bool) -> Result<WalletAddress> {
        let public_key = keypair.public_key();
        Ok(WalletAddress {
            address: address_from_pubkey(&self.hrp, &public_key)?,
            path,
            index,
            is_change,
            private_key: Some(keypair.secret_hex()),
            public_key: Some(hex::encode(public_key)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASTER: [u8; 32] = [0x42; 32];
    const CHAIN: [u8; 32] = [0x24; 32];

    fn bip32_manager() -> KeyManager {
        let mut km = KeyManager::new("alpha");
        km.init(MASTER, Some(CHAIN), DerivationMode::Bip32, "84'/1'/0'").unwrap();
        km
    }

    #[test]
    fn test_lifecycle() {
        let mut km = bip32_manager();
        assert!(km.is_initialized());
        km.clear();
        assert!(!km.is_initialized());
        assert!(matches!(km.derive_address(0, false), Err(WalletError::NotInitialized)));
    }

    #[test]
    fn test_init_requires_chain_code_for_bip32() {
        let mut km = KeyManager::new("alpha");
        assert!(km.init(MASTER, None, DerivationMode::Bip32, "84'/1'/0'").is_err());
        assert!(km.init(MASTER, None, DerivationMode::LegacyHmac, "84'/1'/0'").is_err());
        assert!(km.init(MASTER, None, DerivationMode::WifHmac, "84'/1'/0'").is_ok());
    }

    #[test]
    fn test_bip32_address_matches_path_rederivation() {
        let km = bip32_manager();
        let addr = km.derive_address(3, true).unwrap();
        assert_eq!(addr.path.as_deref(), Some("m/84'/1'/0'/1/3"));
        assert!(addr.is_change);
        assert!(addr.address.starts_with("alpha1q"));

        let again = km.address_for_path("m/84'/1'/0'/1/3").unwrap();
        assert_eq!(again, addr);
    }

    #[test]
    fn test_wif_hmac_addresses() {
        let mut km = KeyManager::new("alpha");
        km.init(MASTER, None, DerivationMode::WifHmac, "84'/1'/0'").unwrap();
        let addr = km.derive_address(2, false).unwrap();
        assert_eq!(addr.path.as_deref(), Some("m/44'/0'/2'"));
        assert_eq!(km.address_for_path("m/44'/0'/2'").unwrap(), addr);
        assert!(km.derive_address(0, true).is_err());
        assert!(km.address_for_path("m/84'/1'/0'/0/0").is_err());
    }

    #[test]
    fn test_modes_produce_distinct_addresses() {
        let mut wif = KeyManager::new("alpha");
        wif.init(MASTER, Some(CHAIN), DerivationMode::WifHmac, "84'/1'/0'").unwrap();
        let mut legacy = KeyManager::new("alpha");
        legacy.init(MASTER, Some(CHAIN), DerivationMode::LegacyHmac, "84'/1'/0'").unwrap();
        let bip = bip32_manager();
        let a = wif.derive_address(0, false).unwrap().address;
        let b = legacy.derive_address(0, false).unwrap().address;
        let c = bip.derive_address(0, false).unwrap().address;
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(a, c);
    }
}
