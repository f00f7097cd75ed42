//! JSON v1 wallet document.
//!
//! ```json
//! {
//!   "version": "1.0",
//!   "masterPrivateKey": "<hex>",            // or "encrypted": {...}
//!   "chainCode": "<hex>",
//!   "derivationMode": "bip32",
//!   "descriptorPath": "84'/1'/0'",
//!   "source": "generated",
//!   "firstAddress": { "address": "alpha1q...", "path": "m/84'/1'/0'/0/0" },
//!   "mnemonic": "...",
//!   "createdAt": "2024-01-01T00:00:00Z",
//!   "encrypted": { "masterPrivateKey": "<b64>", "mnemonic": "<b64>", "salt": "<hex>", "iterations": 100000 }
//! }
//! ```

use serde::{Deserialize, Serialize};
use tracing::info;
use zeroize::Zeroize;

use super::cipher;
use super::verify::verify_address;
use crate::config::WalletConfig;
use crate::error::{Result, WalletError};
use crate::keys::{DerivationMode, KeyManager};
use crate::wallet::{Wallet, WalletSource, DEFAULT_DESCRIPTOR_PATH};

pub const JSON_VERSION: &str = "1.0";
pub const DEFAULT_KDF_ITERATIONS: u32 = 100_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirstAddress {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedSection {
    pub master_private_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mnemonic: Option<String>,
    pub salt: String,
    pub iterations: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonWalletV1 {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_private_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_code: Option<String>,
    #[serde(default)]
    pub derivation_mode: DerivationMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descriptor_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_address: Option<FirstAddress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mnemonic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted: Option<EncryptedSection>,
}

/// True when `content` parses as a JSON object with a `version` field.
pub fn looks_like_json(content: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(content)
        .map(|v| v.get("version").is_some())
        .unwrap_or(false)
}

/// Build the document. With a password, the master key (and mnemonic)
/// move into the `encrypted` section.
pub fn export_json(wallet: &Wallet, hrp: &str, password: Option<&str>, iterations: u32) -> Result<String> {
    wallet.validate()?;
    let first_address = match wallet.first_address() {
        Some(addr) => FirstAddress { address: addr.address.clone(), path: addr.path.clone() },
        None => {
            let derived = KeyManager::from_wallet(wallet, hrp)?.derive_address(0, false)?;
            FirstAddress { address: derived.address.clone(), path: derived.path.clone() }
        }
    };

    let mut doc = JsonWalletV1 {
        version: JSON_VERSION.to_string(),
        master_private_key: None,
        chain_code: wallet.chain_code.clone(),
        derivation_mode: wallet.derivation_mode,
        descriptor_path: Some(wallet.descriptor_path.clone()),
        source: Some(wallet.source.as_str().to_string()),
        first_address: Some(first_address),
        mnemonic: None,
        created_at: Some(chrono::Utc::now().to_rfc3339()),
        encrypted: None,
    };

    match password {
        Some(password) => {
            let iterations = iterations.max(1);
            let salt = cipher::random_salt();
            let mut key = cipher::json_key(password, &salt, iterations);
            doc.encrypted = Some(EncryptedSection {
                master_private_key: cipher::seal(&key, wallet.master_private_key.as_bytes()),
                mnemonic: wallet.mnemonic.as_ref().map(|m| cipher::seal(&key, m.as_bytes())),
                salt: hex::encode(salt),
                iterations,
            });
            key.zeroize();
        }
        None => {
            doc.master_private_key = Some(wallet.master_private_key.clone());
            doc.mnemonic = wallet.mnemonic.clone();
        }
    }
    Ok(serde_json::to_string_pretty(&doc)?)
}

pub fn parse_json(content: &str) -> Result<JsonWalletV1> {
    let value: serde_json::Value = serde_json::from_str(content)
        .map_err(|e| WalletError::InvalidFormat(format!("json: {e}")))?;
    match value.get("version").and_then(|v| v.as_str()) {
        Some(JSON_VERSION) => {}
        Some(other) => return Err(WalletError::UnsupportedVersion(other.to_string())),
        None => return Err(WalletError::UnsupportedVersion("missing".into())),
    }
    serde_json::from_value(value).map_err(|e| WalletError::InvalidFormat(format!("json v1: {e}")))
}

fn open_string(key: &[u8; 32], blob: &str) -> Result<String> {
    let plain = cipher::open(key, blob)?;
    String::from_utf8(plain).map_err(|_| WalletError::WrongPassword)
}

pub fn import_json(content: &str, password: Option<&str>, config: &WalletConfig) -> Result<Wallet> {
    let doc = parse_json(content)?;

    let (mut master_hex, mnemonic) = match &doc.encrypted {
        Some(enc) => {
            let password = password.ok_or(WalletError::NeedsPassword)?;
            let salt = hex::decode(enc.salt.trim())?;
            let mut key = cipher::json_key(password, &salt, enc.iterations.max(1));
            let master = open_string(&key, &enc.master_private_key);
            let mnemonic = enc.mnemonic.as_deref().map(|m| open_string(&key, m)).transpose();
            key.zeroize();
            (master?, mnemonic?)
        }
        None => match (&doc.master_private_key, &doc.mnemonic) {
            (Some(master), mnemonic) => (master.clone(), mnemonic.clone()),
            (None, Some(mnemonic)) => {
                let restored = Wallet::from_mnemonic(mnemonic, "")?;
                (restored.master_private_key.clone(), Some(mnemonic.clone()))
            }
            (None, None) => return Err(WalletError::InvalidFormat("no masterPrivateKey".into())),
        },
    };

    let master = hex::decode(master_hex.trim())
        .ok()
        .and_then(|b| <[u8; 32]>::try_from(b).ok());
    master_hex.zeroize();
    let mut master = master.ok_or_else(|| {
        if doc.encrypted.is_some() {
            WalletError::WrongPassword
        } else {
            WalletError::InvalidFormat("masterPrivateKey must be 32 hex bytes".into())
        }
    })?;

    let chain_code = match doc.chain_code.as_deref() {
        Some(cc) => {
            let bytes = hex::decode(cc.trim())?;
            Some(<[u8; 32]>::try_from(bytes).map_err(|_| {
                WalletError::InvalidFormat("chainCode must be 32 bytes".into())
            })?)
        }
        None => None,
    };
    let descriptor_path = doc.descriptor_path.as_deref().unwrap_or(DEFAULT_DESCRIPTOR_PATH);
    let wallet = Wallet::new(&master, chain_code.as_ref(), doc.derivation_mode, descriptor_path, WalletSource::JsonImport);
    master.zeroize();
    let mut wallet = wallet?;

    if let Some(phrase) = mnemonic {
        let restored = Wallet::from_mnemonic(&phrase, "")?;
        if doc.derivation_mode == DerivationMode::Bip32
            && (restored.master_private_key != wallet.master_private_key || restored.chain_code != wallet.chain_code)
        {
            return Err(WalletError::IntegrityCheckFailed("mnemonic does not match the master key".into()));
        }
        wallet.mnemonic = Some(phrase);
    }

    let first = doc
        .first_address
        .as_ref()
        .ok_or_else(|| WalletError::InvalidFormat("firstAddress is required for verification".into()))?;
    let manager = KeyManager::from_wallet(&wallet, config.hrp())?;
    let bases = config.scan.resolve_base_paths(Some(&wallet.descriptor_path));
    let verified = verify_address(&manager, &bases, &first.address, first.path.as_deref())?;
    wallet.add_address(verified)?;

    info!(
        mode = wallet.derivation_mode.as_str(),
        encrypted = doc.encrypted.is_some(),
        source = doc.source.as_deref().unwrap_or("unknown"),
        "json wallet imported"
    );
    Ok(wallet)
}
