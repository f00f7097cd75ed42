//! Address scanning against in-memory and failing chain backends.

use alphacore::chain::{Balance, ChainError, ChainQuery, MemoryChain, UnspentOutput};
use alphacore::scan::{scan_and_apply, AddressScanner, ScanProgress, ScanState};
use alphacore::{DerivationMode, DerivationPath, KeyManager, ScanConfig, Wallet, WalletConfig, WalletSource};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn wallet() -> Wallet {
    Wallet::new(&[0x17; 32], Some(&[0x71; 32]), DerivationMode::Bip32, "84'/1'/0'", WalletSource::Generated).unwrap()
}

fn config(max: u32, base_paths: &[&str]) -> WalletConfig {
    WalletConfig::default().with_scan(
        ScanConfig::default()
            .with_max_addresses(max)
            .with_base_paths(base_paths.iter().map(|p| p.to_string()).collect()),
    )
}

fn utxo(value_sats: u64) -> Vec<UnspentOutput> {
    vec![UnspentOutput { txid: "ab".repeat(32), vout: 1, value_sats }]
}

/// Fails every balance lookup.
#[derive(Default)]
struct FailingChain {
    calls: AtomicUsize,
}

#[async_trait]
impl ChainQuery for FailingChain {
    async fn balance(&self, _scripthash: &str) -> Result<Balance, ChainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ChainError::Unavailable("backend down".into()))
    }

    async fn list_unspent(&self, _scripthash: &str) -> Result<Vec<UnspentOutput>, ChainError> {
        Err(ChainError::Unavailable("backend down".into()))
    }

    async fn broadcast(&self, _raw_tx_hex: &str) -> Result<String, ChainError> {
        Err(ChainError::Unavailable("backend down".into()))
    }
}

#[tokio::test]
async fn finds_funds_on_conventional_path() {
    let w = wallet();
    let km = KeyManager::from_wallet(&w, "alpha").unwrap();
    let legacy_base: DerivationPath = "44'/0'/0'".parse().unwrap();
    let target = km.derive_address_at(&legacy_base, 2, false).unwrap();

    let chain = MemoryChain::new();
    chain.fund(&target.address, utxo(12_345)).unwrap();

    // No override: descriptor path first, then the conventional set.
    let config = config(3, &[]);
    let mut scanner = AddressScanner::new(&w, &chain, &config).unwrap();
    assert_eq!(scanner.base_paths().len(), 4);
    let report = scanner.run(|_| {}).await.unwrap();

    assert_eq!(report.state, ScanState::Complete);
    assert_eq!(report.found.len(), 1);
    assert_eq!(report.found[0].address.path.as_deref(), Some("m/44'/0'/0'/0/2"));
    assert_eq!(report.total_balance_sats, 12_345);
    assert_eq!(chain.calls(), 3 * 4 * 2);
}

#[tokio::test]
async fn cancel_from_progress_callback_stops_at_next_index() {
    let w = wallet();
    let chain = MemoryChain::new();
    let config = config(50, &["84'/1'/0'"]);
    let mut scanner = AddressScanner::new(&w, &chain, &config).unwrap();
    let handle = scanner.cancel_handle();

    let mut last: Option<ScanProgress> = None;
    let report = scanner
        .run(|p| {
            last = Some(*p);
            if p.current_index == 2 {
                handle.cancel();
            }
        })
        .await
        .unwrap();

    assert_eq!(report.state, ScanState::Cancelled);
    assert_eq!(scanner.state(), ScanState::Cancelled);
    assert_eq!(report.scanned, 2);
    assert_eq!(last.map(|p| p.current_index), Some(2));
    assert_eq!(chain.calls(), 2 * 2);
}

#[tokio::test]
async fn cancel_before_run_makes_no_calls() {
    let w = wallet();
    let chain = MemoryChain::new();
    let config = config(10, &["84'/1'/0'"]);
    let mut scanner = AddressScanner::new(&w, &chain, &config).unwrap();
    scanner.cancel_handle().cancel();

    let report = scanner.run(|_| {}).await.unwrap();
    assert_eq!(report.state, ScanState::Cancelled);
    assert_eq!(chain.calls(), 0);
}

#[tokio::test]
async fn slow_lookups_are_skipped() {
    let w = wallet();
    let km = KeyManager::from_wallet(&w, "alpha").unwrap();
    let chain = MemoryChain::new();
    chain.fund(&km.derive_address(0, false).unwrap().address, utxo(1_000)).unwrap();
    chain.set_delay(Duration::from_millis(250));

    let mut config = config(1, &["84'/1'/0'"]);
    config.scan.query_timeout = Duration::from_millis(20);
    let report = AddressScanner::new(&w, &chain, &config).unwrap().run(|_| {}).await.unwrap();

    assert_eq!(report.state, ScanState::Complete);
    assert!(report.found.is_empty());
    assert_eq!(chain.calls(), 2);
}

#[tokio::test]
async fn failed_lookups_are_skipped() {
    let w = wallet();
    let chain = FailingChain::default();
    let report = AddressScanner::new(&w, &chain, &config(4, &["84'/1'/0'"]))
        .unwrap()
        .run(|_| {})
        .await
        .unwrap();

    assert_eq!(report.state, ScanState::Complete);
    assert!(report.found.is_empty());
    assert_eq!(chain.calls.load(Ordering::SeqCst), 8);
}

#[tokio::test]
async fn zero_max_addresses_returns_immediately() {
    let w = wallet();
    let chain = MemoryChain::new();
    let mut progress_calls = 0;
    let report = AddressScanner::new(&w, &chain, &config(0, &[]))
        .unwrap()
        .run(|_| progress_calls += 1)
        .await
        .unwrap();
    assert_eq!(report.state, ScanState::Complete);
    assert_eq!(progress_calls, 0);
    assert_eq!(chain.calls(), 0);
}

#[tokio::test]
async fn scan_and_apply_is_idempotent() {
    let mut w = wallet();
    let km = KeyManager::from_wallet(&w, "alpha").unwrap();
    let chain = MemoryChain::new();
    for (index, is_change) in [(0, false), (4, true)] {
        let addr = km.derive_address(index, is_change).unwrap();
        chain.fund(&addr.address, utxo(5_000)).unwrap();
    }

    let config = config(5, &["84'/1'/0'"]);
    let report = scan_and_apply(&mut w, &chain, &config).await.unwrap();
    assert_eq!(report.found.len(), 2);
    assert_eq!(w.addresses.len(), 2);

    let again = scan_and_apply(&mut w, &chain, &config).await.unwrap();
    assert_eq!(again.apply_to(&mut w).unwrap(), 0);
    assert_eq!(w.addresses.len(), 2);
}

#[tokio::test]
async fn wif_hmac_wallet_scans_compat_addresses() {
    let w = Wallet::new(&[0x33; 32], None, DerivationMode::WifHmac, "84'/1'/0'", WalletSource::TextImport).unwrap();
    let km = KeyManager::from_wallet(&w, "alpha").unwrap();
    let target = km.derive_address(3, false).unwrap();
    assert_eq!(target.path.as_deref(), Some("m/44'/0'/3'"));

    let chain = MemoryChain::new();
    chain.fund(&target.address, utxo(9_000)).unwrap();
    let report = AddressScanner::new(&w, &chain, &config(5, &[])).unwrap().run(|_| {}).await.unwrap();

    assert_eq!(report.found.len(), 1);
    assert_eq!(report.found[0].address, target);
    assert_eq!(chain.calls(), 5);
}
