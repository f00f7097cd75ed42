//! Coin selection: one transaction per consumed UTXO, flat fee each.
//!
//! ```text
//! sort ascending ─▶ for each utxo:
//!     value >= remaining + fee ─▶ send remaining, change = surplus, stop
//!     otherwise                ─▶ send value - fee, keep walking
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::chain::Utxo;
use crate::error::{Result, WalletError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxOutput {
    pub address: String,
    pub value_sats: u64,
}

/// One planned single-input transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedTransaction {
    pub input: Utxo,
    pub outputs: Vec<TxOutput>,
    pub fee_sats: u64,
    pub change_address: String,
}

impl PlannedTransaction {
    pub fn sent_sats(&self) -> u64 {
        self.outputs.first().map(|o| o.value_sats).unwrap_or(0)
    }

    pub fn change_sats(&self) -> u64 {
        self.outputs.get(1).map(|o| o.value_sats).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeePolicy {
    pub fee_sats: u64,
    pub dust_sats: u64,
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self { fee_sats: 10_000, dust_sats: 546 }
    }
}

pub fn collect_utxos_for_amount(
    utxos: &[Utxo],
    amount_sats: u64,
    recipient: &str,
    change_address: &str,
    policy: &FeePolicy,
) -> Result<Vec<PlannedTransaction>> {
    if amount_sats == 0 {
        return Err(WalletError::InvalidFormat("amount must be greater than zero".into()));
    }
    let available = utxos
        .iter()
        .try_fold(0u64, |total, u| total.checked_add(u.value_sats))
        .ok_or_else(|| WalletError::InvalidFormat("utxo values overflow a satoshi total".into()))?;
    if available < amount_sats {
        return Err(WalletError::InsufficientFunds { available, requested: amount_sats });
    }

    let mut sorted = utxos.to_vec();
    sorted.sort_by_key(|u| u.value_sats);

    let mut remaining = amount_sats;
    let mut plan = Vec::new();
    for utxo in sorted {
        if remaining == 0 {
            break;
        }
        if utxo.value_sats <= policy.fee_sats {
            warn!(
                txid = %utxo.txid,
                vout = utxo.output_index,
                value = utxo.value_sats,
                "skipping utxo that cannot cover the fee"
            );
            continue;
        }

        let mut outputs = Vec::with_capacity(2);
        if utxo.value_sats >= remaining.saturating_add(policy.fee_sats) {
            let change = utxo.value_sats - remaining - policy.fee_sats;
            outputs.push(TxOutput { address: recipient.to_string(), value_sats: remaining });
            if change >= policy.dust_sats {
                outputs.push(TxOutput { address: change_address.to_string(), value_sats: change });
            } else if change > 0 {
                debug!(change, "dropping dust change");
            }
            remaining = 0;
        } else {
            let send = utxo.value_sats - policy.fee_sats;
            outputs.push(TxOutput { address: recipient.to_string(), value_sats: send });
            remaining -= send;
        }
        plan.push(PlannedTransaction {
            input: utxo,
            outputs,
            fee_sats: policy.fee_sats,
            change_address: change_address.to_string(),
        });
    }

    if remaining > 0 {
        return Err(WalletError::ShortfallAfterFees { missing: remaining });
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utxo(value: u64, n: u32) -> Utxo {
        Utxo {
            txid: format!("{:064x}", n),
            output_index: n,
            value_sats: value,
            address: "alpha1qsource".into(),
        }
    }

    fn plan(values: &[u64], amount: u64) -> Result<Vec<PlannedTransaction>> {
        let utxos: Vec<Utxo> = values.iter().enumerate().map(|(i, &v)| utxo(v, i as u32)).collect();
        collect_utxos_for_amount(&utxos, amount, "alpha1qdest", "alpha1qchange", &FeePolicy::default())
    }

    #[test]
    fn test_exact_cover_has_no_change() {
        let txs = plan(&[50_000], 40_000).unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].outputs, vec![TxOutput { address: "alpha1qdest".into(), value_sats: 40_000 }]);
        assert_eq!(txs[0].fee_sats, 10_000);
    }

    #[test]
    fn test_insufficient_funds() {
        let err = plan(&[5_000], 40_000).unwrap_err();
        assert!(matches!(err, WalletError::InsufficientFunds { available: 5_000, requested: 40_000 }));
    }

    #[test]
    fn test_change_output() {
        let txs = plan(&[100_000], 40_000).unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].sent_sats(), 40_000);
        assert_eq!(txs[0].change_sats(), 50_000);
        assert_eq!(txs[0].outputs[1].address, "alpha1qchange");
    }

    #[test]
    fn test_dust_change_dropped() {
        let txs = plan(&[50_500], 40_000).unwrap();
        assert_eq!(txs[0].outputs.len(), 1);
    }

    #[test]
    fn test_walks_smallest_first() {
        // 30k -> sends 20k, then 80k covers the remaining 30k + fee with 40k change.
        let txs = plan(&[80_000, 30_000], 50_000).unwrap();
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].input.value_sats, 30_000);
        assert_eq!(txs[0].sent_sats(), 20_000);
        assert_eq!(txs[1].input.value_sats, 80_000);
        assert_eq!(txs[1].sent_sats(), 30_000);
        assert_eq!(txs[1].change_sats(), 40_000);
        let total: u64 = txs.iter().map(|t| t.sent_sats()).sum();
        assert_eq!(total, 50_000);
    }

    #[test]
    fn test_shortfall_after_fees() {
        // 45k available but two fees eat 20k.
        let err = plan(&[20_000, 25_000], 40_000).unwrap_err();
        assert!(matches!(err, WalletError::ShortfallAfterFees { missing: 15_000 }));
    }

    #[test]
    fn test_overflowing_utxo_total_rejected() {
        let err = plan(&[u64::MAX, 50_000], 40_000).unwrap_err();
        assert!(matches!(err, WalletError::InvalidFormat(_)), "got {err:?}");
    }

    #[test]
    fn test_fee_sized_utxo_skipped() {
        let txs = plan(&[10_000, 60_000], 40_000).unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].input.value_sats, 60_000);
        assert_eq!(txs[0].change_sats(), 10_000);
    }
}
