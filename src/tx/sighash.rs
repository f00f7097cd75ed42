//! BIP143 signature hash for a P2WPKH input, SIGHASH_ALL.
//!
//! Reference: <https://github.com/bitcoin/bips/blob/master/bip-0143.mediawiki>

use super::serialize::{sha256d, UnsignedTx, LOCKTIME, SEQUENCE, TX_VERSION};

pub const SIGHASH_ALL: u32 = 1;

/// `OP_DUP OP_HASH160 <20> OP_EQUALVERIFY OP_CHECKSIG`, length-prefixed.
pub fn p2wpkh_script_code(pubkey_hash: &[u8; 20]) -> [u8; 26] {
    let mut code = [0u8; 26];
    code[..4].copy_from_slice(&[0x19, 0x76, 0xa9, 0x14]);
    code[4..24].copy_from_slice(pubkey_hash);
    code[24..].copy_from_slice(&[0x88, 0xac]);
    code
}

pub fn bip143_preimage(tx: &UnsignedTx, pubkey_hash: &[u8; 20]) -> Vec<u8> {
    let outpoint = tx.outpoint();
    let hash_prevouts = sha256d(&outpoint);
    let hash_sequence = sha256d(&SEQUENCE.to_le_bytes());
    let hash_outputs = sha256d(&tx.serialize_outputs());

    let mut preimage = Vec::with_capacity(182);
    preimage.extend_from_slice(&TX_VERSION.to_le_bytes());
    preimage.extend_from_slice(&hash_prevouts);
    preimage.extend_from_slice(&hash_sequence);
    preimage.extend_from_slice(&outpoint);
    preimage.extend_from_slice(&p2wpkh_script_code(pubkey_hash));
    preimage.extend_from_slice(&tx.amount_sats.to_le_bytes());
    preimage.extend_from_slice(&SEQUENCE.to_le_bytes());
    preimage.extend_from_slice(&hash_outputs);
    preimage.extend_from_slice(&LOCKTIME.to_le_bytes());
    preimage.extend_from_slice(&SIGHASH_ALL.to_le_bytes());
    preimage
}

/// The 32-byte digest that gets signed.
pub fn bip143_sighash(tx: &UnsignedTx, pubkey_hash: &[u8; 20]) -> [u8; 32] {
    sha256d(&bip143_preimage(tx, pubkey_hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::p2wpkh_script_pubkey;
    use bitcoin::hashes::Hash;
    use bitcoin::sighash::{EcdsaSighashType, SighashCache};
    use bitcoin::{Amount, ScriptBuf};

    #[test]
    fn test_script_code() {
        let hash = [0x11u8; 20];
        assert_eq!(
            hex::encode(p2wpkh_script_code(&hash)),
            format!("1976a914{}88ac", "11".repeat(20))
        );
    }

    #[test]
    fn test_preimage_length() {
        let tx = UnsignedTx::new(&"00".repeat(32), 0, 1, vec![(1, vec![0x51])]).unwrap();
        assert_eq!(bip143_preimage(&tx, &[0u8; 20]).len(), 4 + 32 + 32 + 36 + 26 + 8 + 4 + 32 + 4 + 4);
    }

    #[test]
    fn test_matches_bitcoin_crate() {
        let pubkey_hash = [0x42u8; 20];
        let spk = p2wpkh_script_pubkey(&pubkey_hash);
        let dest = p2wpkh_script_pubkey(&[0x24u8; 20]);
        let tx = UnsignedTx::new(
            "4ce18f49ba153a51bcda9bb80d0f0d5e3ba1d1e6b7f2d7ae6d7e0e8d4a3f8a01",
            1,
            123_456,
            vec![(100_000, dest), (13_456, spk.clone())],
        )
        .unwrap();
        let raw = tx.serialize_with_witness(&[vec![0u8; 72], vec![0u8; 33]]);
        let parsed: bitcoin::Transaction = bitcoin::consensus::deserialize(&raw).unwrap();

        let theirs = SighashCache::new(&parsed)
            .p2wpkh_signature_hash(0, &ScriptBuf::from_bytes(spk), Amount::from_sat(123_456), EcdsaSighashType::All)
            .unwrap();
        assert_eq!(bip143_sighash(&tx, &pubkey_hash), theirs.to_byte_array());
    }
}
