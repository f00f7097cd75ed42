//! Labeled plaintext export, optionally with a password-encrypted master key.
//!
//! ```text
//! ALPHA WALLET EXPORT
//! MASTER PRIVATE KEY (keep secret!):        | ENCRYPTED MASTER KEY (password protected):
//! <64 hex>                                  | <base64(iv || aes-256-cbc(hex key))>
//! MASTER CHAIN CODE (for BIP32 HD wallet):
//! DESCRIPTOR PATH:
//! WALLET TYPE:
//! ENCRYPTION STATUS:
//! YOUR ADDRESSES:
//! Address 1: alpha1q... (Path: m/84'/1'/0'/0/0)
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::Write as _;
use tracing::info;
use zeroize::Zeroize;

use super::cipher;
use super::verify::verify_address;
use crate::config::WalletConfig;
use crate::error::{Result, WalletError};
use crate::keys::{DerivationMode, KeyManager};
use crate::wallet::{Wallet, WalletSource, DEFAULT_DESCRIPTOR_PATH};

pub const HEADER: &str = "ALPHA WALLET EXPORT";
pub const MASTER_KEY_LABEL: &str = "MASTER PRIVATE KEY (keep secret!):";
pub const ENCRYPTED_KEY_LABEL: &str = "ENCRYPTED MASTER KEY (password protected):";
pub const CHAIN_CODE_LABEL: &str = "MASTER CHAIN CODE (for BIP32 HD wallet):";
pub const DESCRIPTOR_PATH_LABEL: &str = "DESCRIPTOR PATH:";
pub const WALLET_TYPE_LABEL: &str = "WALLET TYPE:";
pub const ENCRYPTION_STATUS_LABEL: &str = "ENCRYPTION STATUS:";
pub const ADDRESSES_LABEL: &str = "YOUR ADDRESSES:";
const RULE: &str = "===================================================";
const FOOTER: &str = "Anyone holding the master key controls these funds. Store this file offline.";

static ADDRESS_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*Address\s+(\d+):\s*([A-Za-z0-9]+)(?:\s*\(Path:\s*([^)]*)\))?\s*$")
        .expect("static regex")
});

/// What a text export contains before any key is decrypted or verified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedText {
    pub master_key: Option<String>,
    pub encrypted_master_key: Option<String>,
    pub chain_code: Option<String>,
    pub descriptor_path: Option<String>,
    pub derivation_mode: Option<DerivationMode>,
    pub addresses: Vec<ListedAddress>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedAddress {
    pub number: u32,
    pub address: String,
    pub path: Option<String>,
}

/// True when `content` carries one of the master-key labels.
pub fn looks_like_text(content: &str) -> bool {
    content.contains(MASTER_KEY_LABEL) || content.contains(ENCRYPTED_KEY_LABEL)
}

fn wallet_type_line(mode: DerivationMode) -> String {
    let description = match mode {
        DerivationMode::Bip32 => "BIP32 hierarchical deterministic wallet",
        DerivationMode::LegacyHmac => "Legacy HMAC wallet",
        DerivationMode::WifHmac => "WIF HMAC wallet",
    };
    format!("{description} ({})", mode.as_str())
}

/// Render the export. With a password the master key is replaced by its
/// encrypted form; the chain code stays in the clear.
pub fn export_text(wallet: &Wallet, password: Option<&str>) -> Result<String> {
    wallet.validate()?;
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = writeln!(out, "{HEADER}");
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out);

    match password {
        Some(password) => {
            let mut key = cipher::text_key(password);
            let blob = cipher::seal(&key, wallet.master_private_key.as_bytes());
            key.zeroize();
            let _ = writeln!(out, "{ENCRYPTED_KEY_LABEL}\n{blob}\n");
        }
        None => {
            let _ = writeln!(out, "{MASTER_KEY_LABEL}\n{}\n", wallet.master_private_key);
        }
    }
    if let Some(chain_code) = &wallet.chain_code {
        let _ = writeln!(out, "{CHAIN_CODE_LABEL}\n{chain_code}\n");
    }
    let _ = writeln!(out, "{DESCRIPTOR_PATH_LABEL}\n{}\n", wallet.descriptor_path);
    let _ = writeln!(out, "{WALLET_TYPE_LABEL}\n{}\n", wallet_type_line(wallet.derivation_mode));
    let status = if password.is_some() {
        "Encrypted with password (PBKDF2-SHA1 + AES-256-CBC)"
    } else {
        "Not encrypted"
    };
    let _ = writeln!(out, "{ENCRYPTION_STATUS_LABEL}\n{status}\n");

    let _ = writeln!(out, "{ADDRESSES_LABEL}");
    for (i, addr) in wallet.addresses.iter().enumerate() {
        match &addr.path {
            Some(path) => {
                let _ = writeln!(out, "Address {}: {} (Path: {path})", i + 1, addr.address);
            }
            None => {
                let _ = writeln!(out, "Address {}: {}", i + 1, addr.address);
            }
        }
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "{FOOTER}");
    Ok(out)
}

/// First non-empty line after `label`, stopping at the next label.
fn section_value(content: &str, label: &str) -> Option<String> {
    let start = content.find(label)? + label.len();
    content[start..]
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .filter(|line| !line.ends_with(':'))
        .map(str::to_string)
}

const SECTION_LABELS: [&str; 6] = [
    MASTER_KEY_LABEL,
    ENCRYPTED_KEY_LABEL,
    CHAIN_CODE_LABEL,
    DESCRIPTOR_PATH_LABEL,
    WALLET_TYPE_LABEL,
    ENCRYPTION_STATUS_LABEL,
];

/// Byte offset just past the value line that follows `label`.
fn section_end(content: &str, label: &str) -> Option<usize> {
    let start = content.find(label)? + label.len();
    let mut offset = start;
    for line in content[start..].split_inclusive('\n') {
        offset += line.len();
        if !line.trim().is_empty() {
            break;
        }
    }
    Some(offset)
}

/// Non-empty trimmed lines up to the closing rule.
fn section_lines(section: &str) -> impl Iterator<Item = &str> {
    section
        .lines()
        .map(str::trim)
        .take_while(|l| !l.starts_with('='))
        .filter(|l| !l.is_empty())
}

pub fn parse_text(content: &str) -> Result<ParsedText> {
    if !looks_like_text(content) {
        return Err(WalletError::InvalidFormat("no master key section".into()));
    }
    let mut parsed = ParsedText {
        master_key: section_value(content, MASTER_KEY_LABEL),
        encrypted_master_key: section_value(content, ENCRYPTED_KEY_LABEL),
        chain_code: section_value(content, CHAIN_CODE_LABEL),
        descriptor_path: section_value(content, DESCRIPTOR_PATH_LABEL),
        ..Default::default()
    };
    parsed.derivation_mode = section_value(content, WALLET_TYPE_LABEL).and_then(|line| {
        let start = line.rfind('(')? + 1;
        let end = line.rfind(')')?;
        DerivationMode::from_str(line.get(start..end)?)
    });

    let Some(at) = content.find(ADDRESSES_LABEL) else {
        // Without the label, anything past the last section is a damaged list.
        let tail = SECTION_LABELS
            .iter()
            .filter_map(|label| section_end(content, label))
            .max()
            .unwrap_or(0);
        if let Some(line) = section_lines(&content[tail..]).next() {
            return Err(WalletError::IntegrityCheckFailed(format!(
                "unexpected '{line}' where the address list belongs"
            )));
        }
        return Ok(parsed);
    };

    for line in section_lines(&content[at + ADDRESSES_LABEL.len()..]) {
        // A damaged address line must not be skipped silently.
        let caps = ADDRESS_LINE
            .captures(line)
            .ok_or_else(|| WalletError::IntegrityCheckFailed(format!("unreadable address line '{line}'")))?;
        let number = caps[1]
            .parse()
            .map_err(|_| WalletError::IntegrityCheckFailed(format!("bad address number '{}'", &caps[1])))?;
        parsed.addresses.push(ListedAddress {
            number,
            address: caps[2].to_string(),
            path: caps.get(3).map(|m| m.as_str().trim().to_string()).filter(|p| !p.is_empty()),
        });
    }
    Ok(parsed)
}

fn decode_hex32(value: &str, what: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(value.trim())
        .map_err(|e| WalletError::InvalidFormat(format!("{what}: {e}")))?;
    bytes
        .try_into()
        .map_err(|v: Vec<u8>| WalletError::InvalidFormat(format!("{what} must be 32 bytes, got {}", v.len())))
}

fn decrypt_master(blob: &str, password: &str) -> Result<[u8; 32]> {
    let mut key = cipher::text_key(password);
    let plain = cipher::open(&key, blob);
    key.zeroize();
    let mut plain = plain?;
    let decoded = std::str::from_utf8(&plain)
        .ok()
        .and_then(|s| hex::decode(s.trim()).ok())
        .and_then(|b| <[u8; 32]>::try_from(b).ok());
    plain.zeroize();
    decoded.ok_or(WalletError::WrongPassword)
}

/// Parse, decrypt and verify a text export.
pub fn import_text(content: &str, password: Option<&str>, config: &WalletConfig) -> Result<Wallet> {
    let parsed = parse_text(content)?;

    let mut master = match (&parsed.master_key, &parsed.encrypted_master_key) {
        (Some(hex_key), _) => decode_hex32(hex_key, "master key")?,
        (None, Some(blob)) => {
            let password = password.ok_or(WalletError::NeedsPassword)?;
            decrypt_master(blob, password)?
        }
        (None, None) => return Err(WalletError::InvalidFormat("master key section is empty".into())),
    };
    let chain_code = parsed
        .chain_code
        .as_deref()
        .map(|cc| decode_hex32(cc, "chain code"))
        .transpose()?;
    let mode = parsed.derivation_mode.unwrap_or(if chain_code.is_some() {
        DerivationMode::Bip32
    } else {
        DerivationMode::WifHmac
    });
    let descriptor_path = parsed.descriptor_path.as_deref().unwrap_or(DEFAULT_DESCRIPTOR_PATH);

    let wallet = Wallet::new(&master, chain_code.as_ref(), mode, descriptor_path, WalletSource::TextImport);
    master.zeroize();
    let mut wallet = wallet?;

    let manager = KeyManager::from_wallet(&wallet, config.hrp())?;
    let bases = config.scan.resolve_base_paths(Some(&wallet.descriptor_path));
    for listed in &parsed.addresses {
        let verified = verify_address(&manager, &bases, &listed.address, listed.path.as_deref())?;
        wallet.add_address(verified)?;
    }
    if wallet.addresses.is_empty() {
        wallet.add_address(manager.derive_address(0, false)?)?;
    }

    info!(
        mode = mode.as_str(),
        addresses = wallet.addresses.len(),
        encrypted = parsed.master_key.is_none(),
        "text wallet imported"
    );
    Ok(wallet)
}
