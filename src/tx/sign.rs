//! ECDSA signing of planned transactions and signing-key selection.

use bitcoin::secp256k1::{ecdsa::Signature, Message, Secp256k1};
use serde::Serialize;
use tracing::debug;

use super::selection::PlannedTransaction;
use super::serialize::UnsignedTx;
use super::sighash::{bip143_sighash, SIGHASH_ALL};
use crate::address::{hash160, script_pubkey_for_address};
use crate::error::{Result, WalletError};
use crate::keys::{curve, KeyManager, KeyPair};
use crate::wallet::Wallet;

/// A signed, broadcast-ready transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedTransaction {
    pub txid: String,
    pub raw_hex: String,
    pub fee_sats: u64,
    pub sent_sats: u64,
    pub change_sats: u64,
}

/// Low-S ECDSA over `digest`, DER-encoded with the SIGHASH_ALL byte appended.
pub fn sign_digest(digest: [u8; 32], keypair: &KeyPair) -> Result<Vec<u8>> {
    let secp = Secp256k1::signing_only();
    let msg = Message::from_digest(digest);
    let mut sig: Signature = secp.sign_ecdsa(&msg, keypair.secret());
    sig.normalize_s();

    let compact = sig.serialize_compact();
    let mut s = [0u8; 32];
    s.copy_from_slice(&compact[32..]);
    if !curve::is_low_s(&s) {
        return Err(WalletError::Crypto("signature s above n/2 after normalization".into()));
    }

    let mut out = sig.serialize_der().to_vec();
    out.push(SIGHASH_ALL as u8);
    Ok(out)
}

/// Build, sign and serialize one planned transaction.
pub fn sign_planned(plan: &PlannedTransaction, keypair: &KeyPair, hrp: &str) -> Result<SignedTransaction> {
    let public_key = keypair.public_key();
    let pubkey_hash = hash160(&public_key);
    let spent_script = script_pubkey_for_address(&plan.input.address, Some(hrp))?;
    if spent_script[2..] != pubkey_hash {
        return Err(WalletError::MissingKey(format!(
            "signing key does not control {}",
            plan.input.address
        )));
    }

    let outputs = plan
        .outputs
        .iter()
        .map(|o| -> Result<(u64, Vec<u8>)> {
            Ok((o.value_sats, script_pubkey_for_address(&o.address, Some(hrp))?))
        })
        .collect::<Result<Vec<_>>>()?;
    let tx = UnsignedTx::new(&plan.input.txid, plan.input.output_index, plan.input.value_sats, outputs)?;

    let signature = sign_digest(bip143_sighash(&tx, &pubkey_hash), keypair)?;
    let raw = tx.serialize_with_witness(&[signature, public_key.to_vec()]);
    let txid = tx.txid();
    debug!(%txid, input = %plan.input.address, "signed transaction");

    Ok(SignedTransaction {
        txid,
        raw_hex: hex::encode(raw),
        fee_sats: plan.fee_sats,
        sent_sats: plan.sent_sats(),
        change_sats: plan.change_sats(),
    })
}

/// Pick the key that signs for `address`.
///
/// Order: the key stored on that address entry, then a re-derivation from
/// the entry's recorded path (checked against the address), then the
/// wallet's first address key.
pub fn select_signing_key(wallet: &Wallet, manager: Option<&KeyManager>, address: &str) -> Result<KeyPair> {
    if let Some(entry) = wallet.find_address(address) {
        if let Some(key) = entry.private_key.as_deref() {
            return KeyPair::from_hex(key);
        }
        if let (Some(manager), Some(path)) = (manager, entry.path.as_deref()) {
            let derived = manager.address_for_path(path)?;
            if derived.address != address {
                return Err(WalletError::IntegrityCheckFailed(format!(
                    "{path} derives {} instead of {address}",
                    derived.address
                )));
            }
            if let Some(key) = derived.private_key.as_deref() {
                return KeyPair::from_hex(key);
            }
        }
    }
    if let Some(key) = wallet.first_address().and_then(|a| a.private_key.as_deref()) {
        debug!(%address, "falling back to first address key");
        return KeyPair::from_hex(key);
    }
    Err(WalletError::MissingKey(address.to_string()))
}
