//! End-to-end send: UTXO lookup, selection, signing and broadcast against
//! the in-memory chain. Every broadcast transaction is decoded and its
//! signature checked with the `bitcoin` crate.

use alphacore::address::script_pubkey_for_address;
use alphacore::chain::{Balance, ChainError, ChainQuery, MemoryChain, UnspentOutput};
use alphacore::tx::{self, SendRequest};
use alphacore::{Wallet, WalletConfig, WalletError};
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::{Amount, ScriptBuf, Transaction};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicUsize, Ordering};

const TEST_MNEMONIC: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

static RECIPIENT: Lazy<String> = Lazy::new(|| Wallet::generate().unwrap().next_address("alpha").unwrap().address);

fn funded_wallet(values: &[u64]) -> (Wallet, MemoryChain) {
    let mut wallet = Wallet::from_mnemonic(TEST_MNEMONIC, "").unwrap();
    let first = wallet.next_address("alpha").unwrap();
    let chain = MemoryChain::new();
    let outputs = values
        .iter()
        .enumerate()
        .map(|(i, &value_sats)| UnspentOutput { txid: format!("{:064x}", i + 1), vout: i as u32, value_sats })
        .collect();
    chain.fund(&first.address, outputs).unwrap();
    (wallet, chain)
}

fn verify_input_signature(tx: &Transaction, spent_address: &str, spent_value: u64) {
    let script = ScriptBuf::from_bytes(script_pubkey_for_address(spent_address, None).unwrap());
    let sighash = SighashCache::new(tx)
        .p2wpkh_signature_hash(0, &script, Amount::from_sat(spent_value), EcdsaSighashType::All)
        .unwrap();

    let witness = &tx.input[0].witness;
    assert_eq!(witness.len(), 2);
    let sig_bytes = witness.nth(0).unwrap();
    assert_eq!(*sig_bytes.last().unwrap(), 0x01);
    let signature = Signature::from_der(&sig_bytes[..sig_bytes.len() - 1]).unwrap();
    let pubkey = PublicKey::from_slice(witness.nth(1).unwrap()).unwrap();

    let mut normalized = signature;
    normalized.normalize_s();
    assert_eq!(normalized, signature, "signature must already be low-S");

    Secp256k1::verification_only()
        .verify_ecdsa(&Message::from_digest(sighash.to_byte_array()), &signature, &pubkey)
        .unwrap();
}

#[tokio::test]
async fn send_spans_two_utxos_with_change() {
    let (wallet, chain) = funded_wallet(&[80_000, 30_000]);
    let change = wallet.addresses[0].address.clone();
    let request = SendRequest { recipient: RECIPIENT.clone(), amount_sats: 50_000, change_address: None };

    let report = tx::send(&wallet, &chain, &request, &WalletConfig::default()).await.unwrap();
    assert_eq!(report.txids.len(), 2);
    assert_eq!(report.total_fee_sats, 20_000);

    let broadcasts = chain.broadcasts();
    assert_eq!(broadcasts.len(), 2);

    // Smallest UTXO first: 30_000 - fee goes out whole.
    let first: Transaction = bitcoin::consensus::deserialize(&hex::decode(&broadcasts[0]).unwrap()).unwrap();
    assert_eq!(first.output.len(), 1);
    assert_eq!(first.output[0].value.to_sat(), 20_000);
    assert_eq!(first.compute_txid().to_string(), report.txids[0]);
    verify_input_signature(&first, &change, 30_000);

    // The 80_000 UTXO covers the remaining 30_000 plus fee; 40_000 change.
    let second: Transaction = bitcoin::consensus::deserialize(&hex::decode(&broadcasts[1]).unwrap()).unwrap();
    assert_eq!(second.output.len(), 2);
    assert_eq!(second.output[0].value.to_sat(), 30_000);
    assert_eq!(second.output[1].value.to_sat(), 40_000);
    assert_eq!(
        second.output[1].script_pubkey.as_bytes(),
        script_pubkey_for_address(&change, None).unwrap().as_slice()
    );
    assert_eq!(second.version, bitcoin::transaction::Version::TWO);
    verify_input_signature(&second, &change, 80_000);
}

/// Serves lookups from a [`MemoryChain`] but rejects the second broadcast.
struct RejectsSecondBroadcast {
    inner: MemoryChain,
    broadcasts: AtomicUsize,
}

#[async_trait]
impl ChainQuery for RejectsSecondBroadcast {
    async fn balance(&self, scripthash: &str) -> Result<Balance, ChainError> {
        self.inner.balance(scripthash).await
    }

    async fn list_unspent(&self, scripthash: &str) -> Result<Vec<UnspentOutput>, ChainError> {
        self.inner.list_unspent(scripthash).await
    }

    async fn broadcast(&self, raw_tx_hex: &str) -> Result<String, ChainError> {
        if self.broadcasts.fetch_add(1, Ordering::SeqCst) == 1 {
            return Err(ChainError::Broadcast("mempool full".into()));
        }
        self.inner.broadcast(raw_tx_hex).await
    }
}

#[tokio::test]
async fn failed_broadcast_reports_what_already_went_out() {
    let (wallet, inner) = funded_wallet(&[80_000, 30_000]);
    let chain = RejectsSecondBroadcast { inner, broadcasts: AtomicUsize::new(0) };
    let request = SendRequest { recipient: RECIPIENT.clone(), amount_sats: 50_000, change_address: None };

    let err = tx::send(&wallet, &chain, &request, &WalletConfig::default()).await.unwrap_err();
    let (broadcast, total, source) = match err {
        WalletError::PartialBroadcast { broadcast, total, source } => (broadcast, total, source),
        other => panic!("expected a partial broadcast, got {other:?}"),
    };
    assert_eq!(total, 2);
    assert_eq!(source, ChainError::Broadcast("mempool full".into()));
    assert_eq!(broadcast.len(), 1);

    let accepted = chain.inner.broadcasts();
    assert_eq!(accepted.len(), 1);
    let first: Transaction = bitcoin::consensus::deserialize(&hex::decode(&accepted[0]).unwrap()).unwrap();
    assert_eq!(first.compute_txid().to_string(), broadcast[0]);
}

#[tokio::test]
async fn send_exact_cover_has_no_change_output() {
    let (wallet, chain) = funded_wallet(&[50_000]);
    let request = SendRequest { recipient: RECIPIENT.clone(), amount_sats: 40_000, change_address: None };
    let report = tx::send(&wallet, &chain, &request, &WalletConfig::default()).await.unwrap();

    assert_eq!(report.transactions.len(), 1);
    assert_eq!(report.transactions[0].change_sats, 0);
    let tx: Transaction = bitcoin::consensus::deserialize(&hex::decode(&chain.broadcasts()[0]).unwrap()).unwrap();
    assert_eq!(tx.output.len(), 1);
}

#[tokio::test]
async fn send_insufficient_funds_broadcasts_nothing() {
    let (wallet, chain) = funded_wallet(&[5_000]);
    let request = SendRequest { recipient: RECIPIENT.clone(), amount_sats: 40_000, change_address: None };
    let err = tx::send(&wallet, &chain, &request, &WalletConfig::default()).await.unwrap_err();

    assert!(matches!(err, WalletError::InsufficientFunds { available: 5_000, requested: 40_000 }));
    assert!(chain.broadcasts().is_empty());
}

#[tokio::test]
async fn send_rejects_foreign_network_recipient() {
    let (wallet, chain) = funded_wallet(&[50_000]);
    let request = SendRequest {
        recipient: "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4".into(),
        amount_sats: 10_000,
        change_address: None,
    };
    let err = tx::send(&wallet, &chain, &request, &WalletConfig::default()).await.unwrap_err();
    assert!(matches!(err, WalletError::InvalidAddress(_)), "got {err:?}");
    assert!(chain.broadcasts().is_empty());
}

#[tokio::test]
async fn send_times_out_on_slow_backend() {
    let (wallet, chain) = funded_wallet(&[50_000]);
    chain.set_delay(std::time::Duration::from_millis(300));
    let config = WalletConfig::default().with_scan(
        alphacore::ScanConfig::default().with_query_timeout(std::time::Duration::from_millis(20)),
    );
    let request = SendRequest { recipient: RECIPIENT.clone(), amount_sats: 10_000, change_address: None };
    let err = tx::send(&wallet, &chain, &request, &config).await.unwrap_err();
    assert!(matches!(err, WalletError::Timeout(_)), "got {err:?}");
}
