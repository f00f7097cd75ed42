//! Keys - secp256k1 primitives, BIP32 derivation and the key manager.
//!
//! ## Derivation modes
//!
//! ```text
//! bip32        master + chain code ──BIP32──▶ m/<base>/<chain>/<index>
//! legacy-hmac  HMAC-SHA512(chain code, master ‖ index)[0..32]
//! wif-hmac     HMAC-SHA512(master, "m/44'/0'/<index>'")[0..32]
//! ```

pub mod bip32;
pub mod compat;
pub mod curve;
mod manager;
pub mod path;

pub use bip32::{derive_at_path, derive_child, master_key_from_seed, ExtendedPrivateKey};
pub use curve::KeyPair;
pub use manager::KeyManager;
pub use path::{DerivationPath, HARDENED_OFFSET};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DerivationMode {
    #[default]
    Bip32,
    LegacyHmac,
    WifHmac,
}

impl DerivationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DerivationMode::Bip32 => "bip32",
            DerivationMode::LegacyHmac => "legacy-hmac",
            DerivationMode::WifHmac => "wif-hmac",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "bip32" => Some(DerivationMode::Bip32),
            "legacy-hmac" => Some(DerivationMode::LegacyHmac),
            "wif-hmac" => Some(DerivationMode::WifHmac),
            _ => None,
        }
    }

    pub fn requires_chain_code(&self) -> bool {
        !matches!(self, DerivationMode::WifHmac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_names_roundtrip() {
        for mode in [DerivationMode::Bip32, DerivationMode::LegacyHmac, DerivationMode::WifHmac] {
            assert_eq!(DerivationMode::from_str(mode.as_str()), Some(mode));
            let json = serde_json::to_string(&mode).unwrap();
            assert_eq!(json, format!("\"{}\"", mode.as_str()));
        }
        assert_eq!(DerivationMode::from_str("WIF_HMAC"), Some(DerivationMode::WifHmac));
        assert_eq!(DerivationMode::from_str("slip10"), None);
    }
}
