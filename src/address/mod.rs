//! Address codec: HASH160, bech32 witness addresses and the scripthash
//! used as the lookup key by the chain-query collaborator.
//!
//! ```text
//! compressed pubkey ──HASH160──▶ 20-byte program ──bech32(hrp, v0)──▶ alpha1q...
//!                                      │
//!                                      └──▶ scriptPubKey 0014‖hash ──SHA256, reversed──▶ scripthash
//! ```

mod bech32;

pub use bech32::{create_bech32, decode_bech32, Bech32Error, DecodedAddress};

use bitcoin::hashes::{hash160, Hash};
use sha2::{Digest, Sha256};

use crate::error::{Result, WalletError};

/// RIPEMD160(SHA256(data)).
pub fn hash160(data: &[u8]) -> [u8; 20] {
    hash160::Hash::hash(data).to_byte_array()
}

/// [`hash160`] of a hex-encoded compressed public key.
pub fn hash160_hex(pubkey_hex: &str) -> Result<[u8; 20]> {
    let bytes = hex::decode(pubkey_hex.trim())?;
    if bytes.len() != 33 {
        return Err(WalletError::InvalidKey(format!(
            "compressed public key must be 33 bytes, got {}",
            bytes.len()
        )));
    }
    Ok(hash160(&bytes))
}

/// P2WPKH address for a compressed public key.
pub fn address_from_pubkey(hrp: &str, pubkey: &[u8; 33]) -> Result<String> {
    Ok(create_bech32(hrp, 0, &hash160(pubkey))?)
}

/// `OP_0 <20-byte hash>`.
pub fn p2wpkh_script_pubkey(hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(22);
    script.push(0x00);
    script.push(0x14);
    script.extend_from_slice(hash);
    script
}

/// Decode `address`, optionally insisting on a network prefix, and return
/// its witness scriptPubKey.
pub fn script_pubkey_for_address(address: &str, expected_hrp: Option<&str>) -> Result<Vec<u8>> {
    let decoded = decode_bech32(address)?;
    if let Some(expected) = expected_hrp {
        if !decoded.hrp.eq_ignore_ascii_case(expected) {
            return Err(Bech32Error::HrpMismatch {
                expected: expected.to_string(),
                got: decoded.hrp,
            }
            .into());
        }
    }
    let mut script = Vec::with_capacity(2 + decoded.program.len());
    script.push(decoded.version);
    script.push(decoded.program.len() as u8);
    script.extend_from_slice(&decoded.program);
    Ok(script)
}

/// SHA256 of a scriptPubKey with the byte order reversed, hex encoded.
pub fn scripthash_for_script(script_pubkey: &[u8]) -> String {
    let mut digest: [u8; 32] = Sha256::digest(script_pubkey).into();
    digest.reverse();
    hex::encode(digest)
}

/// Scripthash of an address, as expected by the chain-query collaborator.
pub fn scripthash(address: &str) -> Result<String> {
    Ok(scripthash_for_script(&script_pubkey_for_address(address, None)?))
}

/// Everything the codec can tell about an address.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressInfo {
    pub address: String,
    pub hrp: String,
    pub witness_version: u8,
    pub program: String,
    pub script_pubkey: String,
    pub scripthash: String,
}

pub fn inspect(address: &str) -> Result<AddressInfo> {
    let decoded = decode_bech32(address)?;
    let script = script_pubkey_for_address(address, None)?;
    Ok(AddressInfo {
        address: address.to_string(),
        hrp: decoded.hrp,
        witness_version: decoded.version,
        program: hex::encode(&decoded.program),
        scripthash: scripthash_for_script(&script),
        script_pubkey: hex::encode(script),
    })
}
