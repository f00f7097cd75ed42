//! Transaction builder - coin selection, SegWit serialization, BIP143
//! signing and the send flow that ties them to a [`ChainQuery`].
//!
//! ```text
//! wallet addresses ──list_unspent──▶ utxos ──collect_utxos_for_amount──▶ plan
//!                                                                         │
//!          txids ◀──broadcast── raw hex ◀──sign_planned (per input) ◀────┘
//! ```

pub mod amount;
pub mod selection;
pub mod serialize;
pub mod sighash;
pub mod sign;

pub use amount::{format_sats, parse_coins, SATS_PER_COIN};
pub use selection::{collect_utxos_for_amount, FeePolicy, PlannedTransaction, TxOutput};
pub use serialize::UnsignedTx;
pub use sign::{select_signing_key, sign_planned, SignedTransaction};

use serde::Serialize;
use tracing::{info, warn};

use crate::address::script_pubkey_for_address;
use crate::chain::{utxos_for_address, ChainQuery, Utxo};
use crate::config::WalletConfig;
use crate::error::{Result, WalletError};
use crate::keys::KeyManager;
use crate::wallet::Wallet;

#[derive(Debug, Clone)]
pub struct SendRequest {
    pub recipient: String,
    pub amount_sats: u64,
    /// Defaults to the wallet's first address.
    pub change_address: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReport {
    pub txids: Vec<String>,
    pub transactions: Vec<SignedTransaction>,
    pub total_fee_sats: u64,
}

/// Plan and sign without touching the network.
pub fn build_signed_transactions(
    wallet: &Wallet,
    utxos: &[Utxo],
    request: &SendRequest,
    config: &WalletConfig,
) -> Result<Vec<SignedTransaction>> {
    let hrp = config.hrp();
    script_pubkey_for_address(&request.recipient, Some(hrp))?;
    let change_address = match &request.change_address {
        Some(addr) => addr.clone(),
        None => wallet
            .first_address()
            .map(|a| a.address.clone())
            .ok_or_else(|| WalletError::MissingKey("wallet has no address to receive change".into()))?,
    };
    script_pubkey_for_address(&change_address, Some(hrp))?;

    let plan = collect_utxos_for_amount(utxos, request.amount_sats, &request.recipient, &change_address, &config.fee_policy())?;
    let manager = KeyManager::from_wallet(wallet, hrp).ok();

    plan.iter()
        .map(|planned| {
            let keypair = select_signing_key(wallet, manager.as_ref(), &planned.input.address)?;
            sign_planned(planned, &keypair, hrp)
        })
        .collect()
}

/// Fetch UTXOs for every wallet address, then plan, sign and broadcast.
pub async fn send(wallet: &Wallet, chain: &dyn ChainQuery, request: &SendRequest, config: &WalletConfig) -> Result<SendReport> {
    let mut utxos = Vec::new();
    for addr in &wallet.addresses {
        let found = tokio::time::timeout(config.scan.query_timeout, utxos_for_address(chain, &addr.address))
            .await
            .map_err(|_| WalletError::Timeout(format!("utxo lookup for {}", addr.address)))??;
        utxos.extend(found);
    }

    let transactions = build_signed_transactions(wallet, &utxos, request, config)?;
    let mut txids = Vec::with_capacity(transactions.len());
    for (i, tx) in transactions.iter().enumerate() {
        if let Err(e) = chain.broadcast(&tx.raw_hex).await {
            warn!(broadcast = i, total = transactions.len(), accepted = ?txids, error = %e, "broadcast failed");
            if txids.is_empty() {
                return Err(e.into());
            }
            return Err(WalletError::PartialBroadcast { broadcast: txids, total: transactions.len(), source: e });
        }
        txids.push(tx.txid.clone());
    }

    let total_fee_sats = transactions.iter().map(|t| t.fee_sats).sum();
    info!(
        recipient = %request.recipient,
        amount = request.amount_sats,
        transactions = transactions.len(),
        fee = total_fee_sats,
        "send complete"
    );
    Ok(SendReport { txids, transactions, total_fee_sats })
}
