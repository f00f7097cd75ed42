//! Non-BIP32 derivation modes kept for wallets created before HD support.
//!
//! Neither mode adds the HMAC output to a parent key: the left half of the
//! HMAC is the child key itself. That is weaker than BIP32 and is kept
//! byte-for-byte because existing wallets depend on it.

use zeroize::Zeroize;

use super::bip32::hmac_sha512;
use super::curve;
use crate::error::{Result, WalletError};

/// Path label used for addresses in both compatibility modes.
pub fn compat_path(index: u32) -> String {
    format!("m/44'/0'/{index}'")
}

fn left_half(mut i: [u8; 64]) -> Result<[u8; 32]> {
    let mut key = [0u8; 32];
    key.copy_from_slice(&i[..32]);
    i.zeroize();
    if !curve::is_valid_scalar(&key) {
        key.zeroize();
        return Err(WalletError::InvalidKey("HMAC output is not a valid scalar".into()));
    }
    Ok(key)
}

/// `wif-hmac`: `HMAC-SHA512(key=master, data="m/44'/0'/{index}'")[0..32]`.
pub fn wif_hmac_child(master: &[u8; 32], index: u32) -> Result<[u8; 32]> {
    left_half(hmac_sha512(master, compat_path(index).as_bytes()))
}

/// `legacy-hmac`: `HMAC-SHA512(key=chain_code, data=master || ser32(index))[0..32]`.
pub fn legacy_hmac_child(master: &[u8; 32], chain_code: &[u8; 32], index: u32) -> Result<[u8; 32]> {
    let mut data = [0u8; 36];
    data[..32].copy_from_slice(master);
    data[32..].copy_from_slice(&index.to_be_bytes());
    let i = hmac_sha512(chain_code, &data);
    data.zeroize();
    left_half(i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmac::{Hmac, Mac};
    use sha2::Sha512;

    #[test]
    fn test_wif_hmac_matches_raw_hmac() {
        let master = [0x11u8; 32];
        let mut mac = Hmac::<Sha512>::new_from_slice(&master).unwrap();
        mac.update(b"m/44'/0'/3'");
        let expected = mac.finalize().into_bytes();
        let child = wif_hmac_child(&master, 3).unwrap();
        assert_eq!(&child[..], &expected[..32]);
    }

    #[test]
    fn test_wif_hmac_is_not_bip32() {
        use crate::keys::bip32::{derive_at_path, ExtendedPrivateKey};
        let master = [0x11u8; 32];
        let ext = ExtendedPrivateKey::new(master, [0x22; 32]).unwrap();
        let bip32 = derive_at_path(&ext, &compat_path(0).parse().unwrap()).unwrap();
        assert_ne!(wif_hmac_child(&master, 0).unwrap(), bip32.secret);
    }

    #[test]
    fn test_legacy_hmac_depends_on_chain_code() {
        let master = [0x11u8; 32];
        let a = legacy_hmac_child(&master, &[1u8; 32], 0).unwrap();
        let b = legacy_hmac_child(&master, &[2u8; 32], 0).unwrap();
        assert_ne!(a, b);
        assert_eq!(a, legacy_hmac_child(&master, &[1u8; 32], 0).unwrap());
    }

    #[test]
    fn test_compat_path_label() {
        assert_eq!(compat_path(12), "m/44'/0'/12'");
    }
}
