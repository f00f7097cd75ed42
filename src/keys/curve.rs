//! secp256k1 scalar helpers and a thin keypair wrapper.

use bitcoin::secp256k1::{PublicKey, Scalar, Secp256k1, SecretKey};
use std::fmt;

use crate::error::{Result, WalletError};

/// Order `n` of the secp256k1 group, big-endian.
pub const CURVE_ORDER: [u8; 32] = [
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xfe,
    0xba, 0xae, 0xdc, 0xe6, 0xaf, 0x48, 0xa0, 0x3b, 0xbf, 0xd2, 0x5e, 0x8c, 0xd0, 0x36, 0x41, 0x41,
];

/// `n / 2`, the largest `s` a canonical (low-S) signature may carry.
pub const HALF_CURVE_ORDER: [u8; 32] = [
    0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0x5d, 0x57, 0x6e, 0x73, 0x57, 0xa4, 0x50, 0x1d, 0xdf, 0xe9, 0x2f, 0x46, 0x68, 0x1b, 0x20, 0xa0,
];

/// True when `bytes` is a usable private scalar: `0 < k < n`.
///
/// Big-endian byte arrays of equal length order the same way as the
/// integers they encode, so a lexicographic compare is enough.
pub fn is_valid_scalar(bytes: &[u8; 32]) -> bool {
    bytes.iter().any(|&b| b != 0) && bytes < &CURVE_ORDER
}

/// True when `s <= n/2`.
pub fn is_low_s(s: &[u8; 32]) -> bool {
    s <= &HALF_CURVE_ORDER
}

/// `(tweak + key) mod n`.
///
/// Fails with [`WalletError::InvalidKey`] when `tweak >= n` or the sum is zero.
pub fn add_mod_n(tweak: &[u8; 32], key: &SecretKey) -> Result<SecretKey> {
    let scalar = Scalar::from_be_bytes(*tweak)
        .map_err(|_| WalletError::InvalidKey("tweak is not below the curve order".into()))?;
    key.add_tweak(&scalar)
        .map_err(|_| WalletError::InvalidKey("derived key is zero".into()))
}

/// Parse a 32-byte secret, rejecting zero and out-of-range values.
pub fn secret_key(bytes: &[u8; 32]) -> Result<SecretKey> {
    if !is_valid_scalar(bytes) {
        return Err(WalletError::InvalidKey("scalar is zero or not below the curve order".into()));
    }
    Ok(SecretKey::from_slice(bytes)?)
}

/// 33-byte compressed public key for a secret.
pub fn compressed_public_key(secret: &SecretKey) -> [u8; 33] {
    let secp = Secp256k1::new();
    PublicKey::from_secret_key(&secp, secret).serialize()
}

/// A secp256k1 keypair. The secret never appears in `Debug` output.
#[derive(Clone)]
pub struct KeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl KeyPair {
    pub fn from_secret(secret: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let public = PublicKey::from_secret_key(&secp, &secret);
        Self { secret, public }
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        Ok(Self::from_secret(secret_key(bytes)?))
    }

    pub fn from_hex(hex_key: &str) -> Result<Self> {
        let bytes = hex::decode(hex_key.trim())?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| WalletError::InvalidKey(format!("expected 32 bytes, got {}", v.len())))?;
        Self::from_bytes(&arr)
    }

    pub fn secret(&self) -> &SecretKey {
        &self.secret
    }

    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.secret_bytes()
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.secret.secret_bytes())
    }

    pub fn public_key(&self) -> [u8; 33] {
        self.public.serialize()
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public.serialize())
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}
