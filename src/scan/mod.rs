//! Address scanning - find funded addresses the wallet has not listed yet.
//!
//! ```text
//! Idle ──run()──▶ Scanning ──index loop done──▶ Complete
//!                    │
//!                    └──cancel flag seen──▶ Cancelled
//! ```
//!
//! For each index the scanner derives one address per `(base path, chain)`
//! and asks the [`ChainQuery`] for its balance. The wallet is never touched
//! while scanning; [`ScanReport::apply_to`] appends the results afterwards.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::chain::{balance_for_address, Balance, ChainQuery};
use crate::config::WalletConfig;
use crate::error::Result;
use crate::keys::{DerivationMode, DerivationPath, KeyManager};
use crate::wallet::{Wallet, WalletAddress};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScanState {
    Idle,
    Scanning,
    Complete,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanProgress {
    /// Indices finished so far.
    pub current_index: u32,
    pub total: u32,
    pub found: usize,
    pub balance_sats: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundAddress {
    pub address: WalletAddress,
    pub balance: Balance,
}

#[derive(Debug, Clone)]
pub struct ScanReport {
    pub state: ScanState,
    pub found: Vec<FoundAddress>,
    pub scanned: u32,
    pub total_balance_sats: u64,
}

impl ScanReport {
    /// Append every found address to `wallet`. Returns how many were new.
    pub fn apply_to(&self, wallet: &mut Wallet) -> Result<usize> {
        let mut added = 0;
        for found in &self.found {
            if wallet.add_address(found.address.clone())? {
                added += 1;
            }
        }
        Ok(added)
    }
}

/// Shared cancel flag. Clone it out before `run` and set it from anywhere.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct AddressScanner<'a> {
    manager: KeyManager,
    chain: &'a dyn ChainQuery,
    bases: Vec<DerivationPath>,
    chains: &'static [bool],
    config: WalletConfig,
    state: ScanState,
    cancel: CancelHandle,
}

impl<'a> AddressScanner<'a> {
    pub fn new(wallet: &Wallet, chain: &'a dyn ChainQuery, config: &WalletConfig) -> Result<Self> {
        let manager = KeyManager::from_wallet(wallet, config.hrp())?;
        const BOTH_CHAINS: &[bool] = &[false, true];
        const EXTERNAL_ONLY: &[bool] = &[false];

        let (bases, chains) = match wallet.derivation_mode {
            DerivationMode::Bip32 => (config.scan.resolve_base_paths(Some(&wallet.descriptor_path)), BOTH_CHAINS),
            // Single external chain, addressed by index alone.
            DerivationMode::WifHmac | DerivationMode::LegacyHmac => (vec![DerivationPath::master()], EXTERNAL_ONLY),
        };
        Ok(Self {
            manager,
            chain,
            bases,
            chains,
            config: config.clone(),
            state: ScanState::Idle,
            cancel: CancelHandle::default(),
        })
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn base_paths(&self) -> &[DerivationPath] {
        &self.bases
    }

    /// Scan indices `0..max_addresses`. `on_progress` runs after every index.
    pub async fn run<F>(&mut self, mut on_progress: F) -> Result<ScanReport>
    where
        F: FnMut(&ScanProgress),
    {
        let total = self.config.scan.max_addresses;
        let mut report = ScanReport { state: ScanState::Scanning, found: Vec::new(), scanned: 0, total_balance_sats: 0 };
        self.state = ScanState::Scanning;
        info!(total, bases = self.bases.len(), "address scan started");

        for index in 0..total {
            if self.cancel.is_cancelled() {
                self.state = ScanState::Cancelled;
                report.state = ScanState::Cancelled;
                info!(scanned = report.scanned, found = report.found.len(), "address scan cancelled");
                return Ok(report);
            }

            for base in &self.bases {
                for &is_change in self.chains {
                    let derived = self.manager.derive_address_at(base, index, is_change)?;
                    let lookup = balance_for_address(self.chain, &derived.address);
                    let balance = match tokio::time::timeout(self.config.scan.query_timeout, lookup).await {
                        Ok(Ok(balance)) => balance,
                        Ok(Err(e)) => {
                            warn!(address = %derived.address, error = %e, "balance lookup failed, skipping");
                            continue;
                        }
                        Err(_) => {
                            warn!(address = %derived.address, "balance lookup timed out, skipping");
                            continue;
                        }
                    };
                    if balance.total_sats() > 0 {
                        debug!(path = ?derived.path, sats = balance.total_sats(), "funded address");
                        report.total_balance_sats += balance.total_sats();
                        report.found.push(FoundAddress { address: derived, balance });
                    }
                }
            }

            report.scanned = index + 1;
            on_progress(&ScanProgress {
                current_index: index + 1,
                total,
                found: report.found.len(),
                balance_sats: report.total_balance_sats,
            });
        }

        self.state = ScanState::Complete;
        report.state = ScanState::Complete;
        info!(
            scanned = report.scanned,
            found = report.found.len(),
            sats = report.total_balance_sats,
            "address scan complete"
        );
        Ok(report)
    }
}

/// Scan `wallet` and append what was found.
pub async fn scan_and_apply(wallet: &mut Wallet, chain: &dyn ChainQuery, config: &WalletConfig) -> Result<ScanReport> {
    let report = AddressScanner::new(wallet, chain, config)?.run(|_| {}).await?;
    report.apply_to(wallet)?;
    Ok(report)
}
