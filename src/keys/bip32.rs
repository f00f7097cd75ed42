//! BIP32 private-key derivation over secp256k1.
//!
//! ```text
//! master:   I = HMAC-SHA512(key="Bitcoin seed", data=seed)
//! hardened: I = HMAC-SHA512(key=c_par, data=0x00 || k_par || ser32(i))
//! normal:   I = HMAC-SHA512(key=c_par, data=serP(point(k_par)) || ser32(i))
//! child:    k_i = (IL + k_par) mod n,  c_i = IR
//! ```
//!
//! An `IL >= n` or a zero child key is surfaced as
//! [`WalletError::InvalidKey`]. The caller picks the next index if it
//! wants to; nothing here retries.
//!
//! Reference: <https://github.com/bitcoin/bips/blob/master/bip-0032.mediawiki>

use hmac::{Hmac, Mac};
use sha2::Sha512;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::curve::{self, KeyPair};
use super::path::{DerivationPath, HARDENED_OFFSET};
use crate::error::{Result, WalletError};

type HmacSha512 = Hmac<Sha512>;

/// HMAC key for master key generation.
const MASTER_HMAC_KEY: &[u8] = b"Bitcoin seed";

/// A private key together with its chain code.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ExtendedPrivateKey {
    pub secret: [u8; 32],
    pub chain_code: [u8; 32],
}

impl ExtendedPrivateKey {
    /// Wrap raw material, checking the key is a valid scalar.
    pub fn new(secret: [u8; 32], chain_code: [u8; 32]) -> Result<Self> {
        if !curve::is_valid_scalar(&secret) {
            return Err(WalletError::InvalidKey("scalar is zero or not below the curve order".into()));
        }
        Ok(Self { secret, chain_code })
    }

    pub fn keypair(&self) -> Result<KeyPair> {
        KeyPair::from_bytes(&self.secret)
    }
}

/// Computes HMAC-SHA512 and returns the 64-byte output.
pub(crate) fn hmac_sha512(key: &[u8], data: &[u8]) -> [u8; 64] {
    let mut mac = HmacSha512::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    let mut out = [0u8; 64];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

fn split(i: &[u8; 64]) -> ([u8; 32], [u8; 32]) {
    let mut left = [0u8; 32];
    let mut right = [0u8; 32];
    left.copy_from_slice(&i[..32]);
    right.copy_from_slice(&i[32..]);
    (left, right)
}

/// Master key and chain code from a seed.
pub fn master_key_from_seed(seed: &[u8]) -> Result<ExtendedPrivateKey> {
    let mut i = hmac_sha512(MASTER_HMAC_KEY, seed);
    let (key, chain_code) = split(&i);
    i.zeroize();
    ExtendedPrivateKey::new(key, chain_code)
}

/// One step of private child derivation.
pub fn derive_child(parent: &ExtendedPrivateKey, index: u32) -> Result<ExtendedPrivateKey> {
    let parent_secret = curve::secret_key(&parent.secret)?;

    let mut data = Vec::with_capacity(37);
    if index >= HARDENED_OFFSET {
        data.push(0x00);
        data.extend_from_slice(&parent.secret);
    } else {
        data.extend_from_slice(&curve::compressed_public_key(&parent_secret));
    }
    data.extend_from_slice(&index.to_be_bytes());

    let mut i = hmac_sha512(&parent.chain_code, &data);
    data.zeroize();
    let (mut il, ir) = split(&i);
    i.zeroize();

    let child = curve::add_mod_n(&il, &parent_secret);
    il.zeroize();
    let child = child?;

    Ok(ExtendedPrivateKey {
        secret: child.secret_bytes(),
        chain_code: ir,
    })
}

/// Apply [`derive_child`] along every component of `path`.
pub fn derive_at_path(master: &ExtendedPrivateKey, path: &DerivationPath) -> Result<ExtendedPrivateKey> {
    let mut current = master.clone();
    for &index in path.indices() {
        current = derive_child(&current, index)?;
    }
    Ok(current)
}
