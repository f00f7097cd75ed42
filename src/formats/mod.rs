//! Wallet file formats - detection, import and export.
//!
//! ```text
//! bytes ──detect──▶ LegacyDat ──dat::import_dat (async, password-stretched)
//!              ├──▶ Text      ──text::import_text
//!              └──▶ Json      ──json::import_json
//!                                   │
//!                                   ▼
//!                     verify every listed address by re-derivation
//! ```
//!
//! Detection order is fixed: SQLite magic first, then the text labels,
//! then a JSON object with a `version` field.

pub mod cipher;
pub mod dat;
pub mod json;
pub mod text;
pub mod verify;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::WalletConfig;
use crate::error::{Result, WalletError};
use crate::wallet::Wallet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WalletFormat {
    LegacyDat,
    Text,
    Json,
}

impl WalletFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletFormat::LegacyDat => "legacy-dat",
            WalletFormat::Text => "text",
            WalletFormat::Json => "json",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dat" | "legacy-dat" | "legacy" => Some(WalletFormat::LegacyDat),
            "text" | "txt" => Some(WalletFormat::Text),
            "json" => Some(WalletFormat::Json),
            _ => None,
        }
    }
}

/// Identify the format of `bytes`.
pub fn detect(bytes: &[u8]) -> Result<WalletFormat> {
    if bytes.starts_with(dat::SQLITE_MAGIC) {
        return Ok(WalletFormat::LegacyDat);
    }
    let content = std::str::from_utf8(bytes)
        .map_err(|_| WalletError::InvalidFormat("not a wallet database and not UTF-8 text".into()))?;
    if text::looks_like_text(content) {
        return Ok(WalletFormat::Text);
    }
    if json::looks_like_json(content) {
        return Ok(WalletFormat::Json);
    }
    Err(WalletError::InvalidFormat("unrecognized wallet file".into()))
}

/// Detect and import. The returned wallet has passed verification.
pub async fn import(bytes: &[u8], password: Option<&str>, config: &WalletConfig) -> Result<Wallet> {
    let format = detect(bytes)?;
    debug!(format = format.as_str(), len = bytes.len(), "importing wallet file");
    match format {
        WalletFormat::LegacyDat => dat::import_dat(bytes, password, config).await,
        WalletFormat::Text => text::import_text(utf8(bytes)?, password, config),
        WalletFormat::Json => json::import_json(utf8(bytes)?, password, config),
    }
}

fn utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|e| WalletError::InvalidFormat(format!("utf-8: {e}")))
}

/// Render `wallet` as text or JSON. The legacy database format is import-only.
pub fn export(wallet: &Wallet, format: WalletFormat, password: Option<&str>, config: &WalletConfig) -> Result<String> {
    match format {
        WalletFormat::Text => text::export_text(wallet, password),
        WalletFormat::Json => json::export_json(wallet, config.hrp(), password, json::DEFAULT_KDF_ITERATIONS),
        WalletFormat::LegacyDat => Err(WalletError::UnsupportedWalletFormat(
            "legacy database files can be imported but not written".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_order() {
        let mut dat = dat::SQLITE_MAGIC.to_vec();
        dat.extend_from_slice(text::MASTER_KEY_LABEL.as_bytes());
        assert_eq!(detect(&dat).unwrap(), WalletFormat::LegacyDat);

        let text_file = format!("{}\n{}\n", text::MASTER_KEY_LABEL, "ab".repeat(32));
        assert_eq!(detect(text_file.as_bytes()).unwrap(), WalletFormat::Text);

        assert_eq!(detect(br#"{"version":"1.0"}"#).unwrap(), WalletFormat::Json);
        assert!(matches!(detect(b"hello"), Err(WalletError::InvalidFormat(_))));
        assert!(matches!(detect(&[0xff, 0xfe, 0x00]), Err(WalletError::InvalidFormat(_))));
    }

    #[test]
    fn test_format_names() {
        assert_eq!(WalletFormat::from_str("TXT"), Some(WalletFormat::Text));
        assert_eq!(WalletFormat::from_str(WalletFormat::LegacyDat.as_str()), Some(WalletFormat::LegacyDat));
        assert_eq!(WalletFormat::from_str("csv"), None);
    }

    #[test]
    fn test_dat_export_refused() {
        let wallet = Wallet::generate().unwrap();
        assert!(matches!(
            export(&wallet, WalletFormat::LegacyDat, None, &WalletConfig::default()),
            Err(WalletError::UnsupportedWalletFormat(_))
        ));
    }

    #[tokio::test]
    async fn test_import_dispatches_json() {
        let mut wallet = Wallet::generate().unwrap();
        wallet.next_address("alpha").unwrap();
        let config = WalletConfig::default();
        let exported = export(&wallet, WalletFormat::Json, None, &config).unwrap();
        let imported = import(exported.as_bytes(), None, &config).await.unwrap();
        assert_eq!(imported.master_private_key, wallet.master_private_key);
    }
}
