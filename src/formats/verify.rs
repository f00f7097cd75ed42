//! Verification by re-derivation.
//!
//! Every address an import file claims is derived again from the imported
//! key material. One mismatch fails the whole import.

use tracing::debug;

use crate::error::{Result, WalletError};
use crate::keys::{DerivationMode, DerivationPath, KeyManager};
use crate::wallet::WalletAddress;

/// Indices searched for an address listed without a path.
pub const UNPATHED_SEARCH_LIMIT: u32 = 100;

/// Re-derive `address` and return the derived entry, keys attached.
pub fn verify_address(
    manager: &KeyManager,
    base_paths: &[DerivationPath],
    address: &str,
    path: Option<&str>,
) -> Result<WalletAddress> {
    match path {
        Some(path) => {
            let derived = manager.address_for_path(path).map_err(|e| {
                WalletError::IntegrityCheckFailed(format!("cannot re-derive {address} at {path}: {e}"))
            })?;
            if derived.address != address {
                return Err(WalletError::IntegrityCheckFailed(format!(
                    "{path} derives {} but the file lists {address}",
                    derived.address
                )));
            }
            Ok(derived)
        }
        None => find_unpathed(manager, base_paths, address),
    }
}

/// Search indices `0..UNPATHED_SEARCH_LIMIT` on both chains of every base
/// path (compatibility modes have a single chain and ignore base paths).
pub fn find_unpathed(manager: &KeyManager, base_paths: &[DerivationPath], address: &str) -> Result<WalletAddress> {
    const BOTH_CHAINS: &[bool] = &[false, true];
    const EXTERNAL_ONLY: &[bool] = &[false];

    let master = [DerivationPath::master()];
    let (bases, chains) = match manager.mode()? {
        DerivationMode::Bip32 => (base_paths, BOTH_CHAINS),
        DerivationMode::WifHmac | DerivationMode::LegacyHmac => (master.as_slice(), EXTERNAL_ONLY),
    };

    for base in bases {
        for &is_change in chains {
            for index in 0..UNPATHED_SEARCH_LIMIT {
                let candidate = manager.derive_address_at(base, index, is_change)?;
                if candidate.address == address {
                    debug!(path = ?candidate.path, "matched unpathed address");
                    return Ok(candidate);
                }
            }
        }
    }
    Err(WalletError::IntegrityCheckFailed(format!(
        "{address} not derivable at indices 0-{} of any candidate path",
        UNPATHED_SEARCH_LIMIT - 1
    )))
}
