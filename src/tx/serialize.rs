//! Single-input SegWit v0 transaction encoding.
//!
//! ```text
//! witness:  version | 00 01 | 01 input | outputs | witness stack | locktime
//! txid:     version |         01 input | outputs |                 locktime
//! ```

use sha2::{Digest, Sha256};

use crate::error::{Result, WalletError};

pub const TX_VERSION: u32 = 2;
pub const SEQUENCE: u32 = 0xffff_ffff;
pub const LOCKTIME: u32 = 0;

pub(crate) fn sha256d(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    Sha256::digest(first).into()
}

/// Bitcoin CompactSize (varint) encoding.
pub fn write_compact_size(buf: &mut Vec<u8>, n: u64) {
    match n {
        0..=0xfc => buf.push(n as u8),
        0xfd..=0xffff => {
            buf.push(0xfd);
            buf.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            buf.push(0xfe);
            buf.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            buf.push(0xff);
            buf.extend_from_slice(&n.to_le_bytes());
        }
    }
}

/// An unsigned transaction spending one P2WPKH output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTx {
    /// Previous txid in internal (little-endian) byte order.
    pub prev_txid: [u8; 32],
    pub vout: u32,
    /// Value of the output being spent; committed to by the sighash.
    pub amount_sats: u64,
    /// `(value, scriptPubKey)` pairs.
    pub outputs: Vec<(u64, Vec<u8>)>,
}

impl UnsignedTx {
    /// `display_txid` is the usual big-endian hex shown by explorers.
    pub fn new(display_txid: &str, vout: u32, amount_sats: u64, outputs: Vec<(u64, Vec<u8>)>) -> Result<Self> {
        let bytes = hex::decode(display_txid.trim())?;
        let mut prev_txid: [u8; 32] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| WalletError::InvalidFormat(format!("txid must be 32 bytes, got {}", v.len())))?;
        prev_txid.reverse();
        Ok(Self { prev_txid, vout, amount_sats, outputs })
    }

    pub fn outpoint(&self) -> [u8; 36] {
        let mut out = [0u8; 36];
        out[..32].copy_from_slice(&self.prev_txid);
        out[32..].copy_from_slice(&self.vout.to_le_bytes());
        out
    }

    pub fn serialize_outputs(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        for (value, script) in &self.outputs {
            buf.extend_from_slice(&value.to_le_bytes());
            write_compact_size(&mut buf, script.len() as u64);
            buf.extend_from_slice(script);
        }
        buf
    }

    fn write_body(&self, buf: &mut Vec<u8>) {
        buf.push(0x01);
        buf.extend_from_slice(&self.outpoint());
        buf.push(0x00); // empty scriptSig
        buf.extend_from_slice(&SEQUENCE.to_le_bytes());
        write_compact_size(buf, self.outputs.len() as u64);
        buf.extend_from_slice(&self.serialize_outputs());
    }

    /// Legacy serialization, the txid preimage.
    pub fn serialize_without_witness(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(128);
        buf.extend_from_slice(&TX_VERSION.to_le_bytes());
        self.write_body(&mut buf);
        buf.extend_from_slice(&LOCKTIME.to_le_bytes());
        buf
    }

    /// Full SegWit serialization with the given witness stack for input 0.
    pub fn serialize_with_witness(&self, witness: &[Vec<u8>]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(256);
        buf.extend_from_slice(&TX_VERSION.to_le_bytes());
        buf.extend_from_slice(&[0x00, 0x01]);
        self.write_body(&mut buf);
        write_compact_size(&mut buf, witness.len() as u64);
        for item in witness {
            write_compact_size(&mut buf, item.len() as u64);
            buf.extend_from_slice(item);
        }
        buf.extend_from_slice(&LOCKTIME.to_le_bytes());
        buf
    }

    /// Display txid: double-SHA256 of the legacy serialization, reversed.
    pub fn txid(&self) -> String {
        let mut hash = sha256d(&self.serialize_without_witness());
        hash.reverse();
        hex::encode(hash)
    }
}
