//! Chain query contract - balance lookup, UTXO listing and broadcast.
//!
//! The wallet core never talks to the network itself. Callers hand in a
//! [`ChainQuery`] implementation (an Electrum-style indexer client, a test
//! double, ...). Every lookup is keyed by the reversed-SHA256 scripthash
//! from [`crate::address::scripthash`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

use crate::address;
use crate::error::Result;
use crate::tx::amount::format_sats;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("chain query failed: {0}")]
    Query(String),
    #[error("broadcast rejected: {0}")]
    Broadcast(String),
    #[error("chain backend unavailable: {0}")]
    Unavailable(String),
}

/// Balance of one scripthash in satoshis. Unconfirmed may be negative when
/// a pending spend outweighs pending receipts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub confirmed: u64,
    pub unconfirmed: i64,
}

impl Balance {
    /// Confirmed plus unconfirmed, floored at zero.
    pub fn total_sats(&self) -> u64 {
        let total = i128::from(self.confirmed) + i128::from(self.unconfirmed);
        u64::try_from(total.max(0)).unwrap_or(u64::MAX)
    }

    /// Decimal coin amount, e.g. `"0.5"`.
    pub fn to_coins(&self) -> String {
        format_sats(self.total_sats())
    }
}

/// An unspent output as listed by the indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentOutput {
    pub txid: String,
    pub vout: u32,
    pub value_sats: u64,
}

/// An unspent output tied to the wallet address that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Utxo {
    pub txid: String,
    pub output_index: u32,
    pub value_sats: u64,
    pub address: String,
}

#[async_trait]
pub trait ChainQuery: Send + Sync {
    async fn balance(&self, scripthash: &str) -> std::result::Result<Balance, ChainError>;
    async fn list_unspent(&self, scripthash: &str) -> std::result::Result<Vec<UnspentOutput>, ChainError>;
    /// Submit a raw transaction; returns whatever the backend reports (usually the txid).
    async fn broadcast(&self, raw_tx_hex: &str) -> std::result::Result<String, ChainError>;
}

pub async fn balance_for_address(chain: &dyn ChainQuery, address: &str) -> Result<Balance> {
    let scripthash = address::scripthash(address)?;
    Ok(chain.balance(&scripthash).await?)
}

pub async fn utxos_for_address(chain: &dyn ChainQuery, address: &str) -> Result<Vec<Utxo>> {
    let scripthash = address::scripthash(address)?;
    let unspent = chain.list_unspent(&scripthash).await?;
    Ok(unspent
        .into_iter()
        .map(|u| Utxo {
            txid: u.txid,
            output_index: u.vout,
            value_sats: u.value_sats,
            address: address.to_string(),
        })
        .collect())
}

/// In-memory [`ChainQuery`] for tests and offline tooling.
///
/// Funded by address, stored and looked up by scripthash.
#[derive(Default)]
pub struct MemoryChain {
    entries: Mutex<HashMap<String, (Balance, Vec<UnspentOutput>)>>,
    broadcasts: Mutex<Vec<String>>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl MemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a funded address with the given outputs. The confirmed
    /// balance is their sum.
    pub fn fund(&self, address: &str, outputs: Vec<UnspentOutput>) -> Result<()> {
        let scripthash = address::scripthash(address)?;
        let confirmed = outputs.iter().map(|o| o.value_sats).sum();
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(scripthash, (Balance { confirmed, unconfirmed: 0 }, outputs));
        }
        Ok(())
    }

    /// Make every lookup sleep first.
    pub fn set_delay(&self, delay: Duration) {
        if let Ok(mut slot) = self.delay.lock() {
            *slot = Some(delay);
        }
    }

    /// Number of balance/list_unspent/broadcast calls served.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn broadcasts(&self) -> Vec<String> {
        self.broadcasts.lock().map(|b| b.clone()).unwrap_or_default()
    }

    async fn enter(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay.lock().ok().and_then(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn entry(&self, scripthash: &str) -> std::result::Result<Option<(Balance, Vec<UnspentOutput>)>, ChainError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| ChainError::Unavailable("memory chain poisoned".into()))?;
        Ok(entries.get(scripthash).cloned())
    }
}

#[async_trait]
impl ChainQuery for MemoryChain {
    async fn balance(&self, scripthash: &str) -> std::result::Result<Balance, ChainError> {
        self.enter().await;
        Ok(self.entry(scripthash)?.map(|(b, _)| b).unwrap_or_default())
    }

    async fn list_unspent(&self, scripthash: &str) -> std::result::Result<Vec<UnspentOutput>, ChainError> {
        self.enter().await;
        Ok(self.entry(scripthash)?.map(|(_, u)| u).unwrap_or_default())
    }

    async fn broadcast(&self, raw_tx_hex: &str) -> std::result::Result<String, ChainError> {
        self.enter().await;
        let raw = hex::decode(raw_tx_hex).map_err(|e| ChainError::Broadcast(format!("bad hex: {e}")))?;
        let tx: bitcoin::Transaction = bitcoin::consensus::deserialize(&raw)
            .map_err(|e| ChainError::Broadcast(format!("undecodable transaction: {e}")))?;
        let txid = tx.compute_txid().to_string();
        self.broadcasts
            .lock()
            .map_err(|_| ChainError::Unavailable("memory chain poisoned".into()))?
            .push(raw_tx_hex.to_string());
        Ok(txid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: &str = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";

    #[test]
    fn test_balance_total() {
        let b = Balance { confirmed: 1_000, unconfirmed: -400 };
        assert_eq!(b.total_sats(), 600);
        let b = Balance { confirmed: 100, unconfirmed: -400 };
        assert_eq!(b.total_sats(), 0);
        let b = Balance { confirmed: 50_000_000, unconfirmed: 0 };
        assert_eq!(b.to_coins(), "0.5");
    }

    #[tokio::test]
    async fn test_memory_chain_lookup_by_scripthash() {
        let chain = MemoryChain::new();
        chain
            .fund(ADDR, vec![UnspentOutput { txid: "aa".repeat(32), vout: 1, value_sats: 7_000 }])
            .unwrap();

        let balance = balance_for_address(&chain, ADDR).await.unwrap();
        assert_eq!(balance.confirmed, 7_000);

        let utxos = utxos_for_address(&chain, ADDR).await.unwrap();
        assert_eq!(utxos.len(), 1);
        assert_eq!(utxos[0].address, ADDR);
        assert_eq!(utxos[0].output_index, 1);
        assert_eq!(chain.calls(), 2);
    }
}
