use std::{
    pin::Pin,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use chrono::{Duration, Utc};
use root_payment_engine::{
    db_types::{Asset, NewPurchaseRequest, ObservedTransfer, PurchaseRequest, RequestStatus},
    events::{EventHandlers, EventHooks, EventProducers},
    scanners::{ScannerEntry, ScannerSet},
    test_utils::{
        fakes::{FakeScanner, FixedPriceOracle},
        prepare_env::{fresh_database, tear_down},
    },
    traits::{RequestStore, ScannerError},
    MatchPolicy,
    ReconciliationApi,
    ReconciliationError,
    ReconciliationSettings,
    SqliteDatabase,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

struct Harness {
    api: ReconciliationApi<SqliteDatabase, FixedPriceOracle, FakeScanner>,
    db: SqliteDatabase,
    btc: FakeScanner,
    eth: FakeScanner,
    usdc: FakeScanner,
    oracle: FixedPriceOracle,
}

async fn setup_with(producers: EventProducers, with_usdt: bool) -> Harness {
    let db = fresh_database().await;
    let btc = FakeScanner::new("btc");
    let eth = FakeScanner::new("eth");
    let usdc = FakeScanner::new("usdc");
    let oracle = FixedPriceOracle::default().with_price(Asset::Btc, dec!(50000)).with_price(Asset::Eth, dec!(2900));
    let mut scanners = ScannerSet::new()
        .with(Asset::Btc, ScannerEntry::new(btc.clone(), "bc1qcollect", 6))
        .with(Asset::Eth, ScannerEntry::new(eth.clone(), "0xcollect", 12))
        .with(Asset::Usdc, ScannerEntry::new(usdc.clone(), "0xcollect", 12));
    if with_usdt {
        scanners = scanners.with(Asset::Usdt, ScannerEntry::new(FakeScanner::new("usdt"), "0xcollect", 12));
    }
    let api = ReconciliationApi::new(
        db.clone(),
        scanners,
        oracle.clone(),
        MatchPolicy::default(),
        ReconciliationSettings::default(),
        producers,
    );
    Harness { api, db, btc, eth, usdc, oracle }
}

async fn setup() -> Harness {
    setup_with(EventProducers::default(), true).await
}

async fn open(db: &SqliteDatabase, root: i64, asset: Asset) -> PurchaseRequest {
    db.create_request(NewPurchaseRequest::new(root, asset, dec!(29.00))).await.unwrap()
}

fn paid(hash: &str, amount: Decimal, confirmations: u64) -> ObservedTransfer {
    ObservedTransfer::new(hash, amount, confirmations, Utc::now() + Duration::seconds(5))
}

async fn status_of(db: &SqliteDatabase, req: &PurchaseRequest) -> PurchaseRequest {
    db.fetch_request(&req.id).await.unwrap().unwrap()
}

#[tokio::test]
async fn btc_needs_six_confirmations() {
    let h = setup().await;
    let req = open(&h.db, 512, Asset::Btc).await;

    h.btc.set_transfers(vec![paid("btc_tx", dec!(0.00059), 5)]);
    let report = h.api.run_cycle().await.unwrap();
    assert_eq!(report.awaiting_confirmations, vec![req.id.clone()]);
    let stored = status_of(&h.db, &req).await;
    assert_eq!(stored.status, RequestStatus::Pending);
    assert_eq!(stored.tx_hash.as_deref(), Some("btc_tx"));
    assert_eq!(stored.confirmations, 5);
    assert!(stored.confirmed_at.is_none());

    h.btc.set_transfers(vec![paid("btc_tx", dec!(0.00059), 6)]);
    let report = h.api.run_cycle().await.unwrap();
    assert_eq!(report.confirmed, vec![req.id.clone()]);
    let stored = status_of(&h.db, &req).await;
    assert_eq!(stored.status, RequestStatus::Confirmed);
    assert_eq!(stored.confirmations, 6);
    assert!(stored.confirmed_at.is_some());

    // Confirmed requests drop out of later cycles
    let report = h.api.run_cycle().await.unwrap();
    assert!(report.is_empty());
    tear_down(h.db).await;
}

#[tokio::test]
async fn amounts_outside_tolerance_do_not_match() {
    let h = setup().await;
    let btc = open(&h.db, 120, Asset::Btc).await;
    let usdc = open(&h.db, 121, Asset::Usdc).await;
    h.btc.set_transfers(vec![paid("btc_big", dec!(0.00070), 10)]);
    h.usdc.set_transfers(vec![paid("0xshort", dec!(29.60), 20)]);
    let report = h.api.run_cycle().await.unwrap();
    assert_eq!(report.unmatched.len(), 2);
    assert!(status_of(&h.db, &btc).await.tx_hash.is_none());
    assert!(status_of(&h.db, &usdc).await.tx_hash.is_none());

    h.usdc.set_transfers(vec![paid("0xshort", dec!(29.60), 20), paid("0xgood", dec!(29.40), 20)]);
    let report = h.api.run_cycle().await.unwrap();
    assert_eq!(report.confirmed, vec![usdc.id.clone()]);
    assert_eq!(status_of(&h.db, &usdc).await.tx_hash.as_deref(), Some("0xgood"));
    tear_down(h.db).await;
}

#[tokio::test]
async fn one_transfer_settles_one_request() {
    let h = setup().await;
    let first = open(&h.db, 130, Asset::Usdc).await;
    let second = open(&h.db, 131, Asset::Usdc).await;
    h.usdc.set_transfers(vec![paid("0xonly", dec!(29), 3)]);
    let report = h.api.run_cycle().await.unwrap();
    assert_eq!(report.awaiting_confirmations.len(), 1);
    assert_eq!(report.unmatched.len(), 1);
    let bound = [status_of(&h.db, &first).await, status_of(&h.db, &second).await]
        .into_iter()
        .filter(|r| r.tx_hash.is_some())
        .count();
    assert_eq!(bound, 1);
    tear_down(h.db).await;
}

#[tokio::test]
async fn transfers_before_the_request_are_ignored() {
    let h = setup().await;
    let req = open(&h.db, 140, Asset::Usdc).await;
    let early = ObservedTransfer::new("0xearly", dec!(29), 30, req.created_at - Duration::seconds(1));
    h.usdc.set_transfers(vec![early]);
    let report = h.api.run_cycle().await.unwrap();
    assert_eq!(report.unmatched, vec![req.id.clone()]);
    tear_down(h.db).await;
}

#[tokio::test]
async fn a_claimed_root_blocks_competing_requests() {
    let h = setup().await;
    let btc = open(&h.db, 150, Asset::Btc).await;
    let usdc = open(&h.db, 150, Asset::Usdc).await;
    h.btc.set_transfers(vec![paid("btc_win", dec!(0.00058), 10)]);
    h.usdc.set_transfers(vec![paid("0xlate", dec!(29), 30)]);
    let report = h.api.run_cycle().await.unwrap();
    // Whichever request is processed first claims the root. The other is refused.
    assert_eq!(report.confirmed.len(), 1);
    assert_eq!(report.failed.len(), 1);
    let (loser, err) = &report.failed[0];
    assert!(err.is_conflict());
    let winner = &report.confirmed[0];
    assert_ne!(winner, loser);
    assert!([&btc.id, &usdc.id].contains(&winner));
    let loser = h.db.fetch_request(loser).await.unwrap().unwrap();
    assert_eq!(loser.status, RequestStatus::Pending);
    assert!(loser.tx_hash.is_none());
    assert_eq!(h.db.fetch_claim_for_root(150).await.unwrap().unwrap().id, *winner);

    let err = h.db.create_request(NewPurchaseRequest::new(150, Asset::Eth, dec!(1000))).await.unwrap_err();
    assert!(err.is_conflict());
    tear_down(h.db).await;
}

#[tokio::test]
async fn sold_roots_do_not_take_transfers_from_live_requests() {
    let h = setup().await;
    let orphaned = open(&h.db, 150, Asset::Usdc).await;
    h.db.insert_confirmed(NewPurchaseRequest::new(150, Asset::Card, dec!(29)), "pi_150").await.unwrap();
    let live = open(&h.db, 152, Asset::Usdc).await;
    h.usdc.set_transfers(vec![paid("0xbuyer", dec!(29), 12)]);
    for _ in 0..3 {
        let report = h.api.run_cycle().await.unwrap();
        assert!(report.failed.is_empty());
    }
    let orphaned = status_of(&h.db, &orphaned).await;
    assert_eq!(orphaned.status, RequestStatus::Pending);
    assert!(orphaned.tx_hash.is_none());
    let live = status_of(&h.db, &live).await;
    assert_eq!(live.status, RequestStatus::Confirmed);
    assert_eq!(live.tx_hash.as_deref(), Some("0xbuyer"));
    tear_down(h.db).await;
}

#[tokio::test]
async fn recorded_confirmations_never_go_down() {
    let h = setup().await;
    let req = open(&h.db, 160, Asset::Eth).await;
    h.eth.set_transfers(vec![paid("0xeth", dec!(0.01), 8)]);
    h.api.run_cycle().await.unwrap();
    // A lagging node reports a shallower depth
    h.eth.set_transfers(vec![paid("0xeth", dec!(0.01), 4)]);
    h.api.run_cycle().await.unwrap();
    assert_eq!(status_of(&h.db, &req).await.confirmations, 8);
    h.eth.set_transfers(vec![paid("0xeth", dec!(0.01), 12)]);
    h.api.run_cycle().await.unwrap();
    let stored = status_of(&h.db, &req).await;
    assert_eq!(stored.confirmations, 12);
    assert_eq!(stored.status, RequestStatus::Confirmed);
    tear_down(h.db).await;
}

#[tokio::test]
async fn scanner_failures_are_isolated() {
    let h = setup().await;
    let btc = open(&h.db, 170, Asset::Btc).await;
    let usdc = open(&h.db, 171, Asset::Usdc).await;
    h.btc.fail_with(ScannerError::Unreachable("connection refused".into()));
    h.usdc.set_transfers(vec![paid("0xok", dec!(29), 12)]);
    let report = h.api.run_cycle().await.unwrap();
    assert_eq!(report.degraded, vec![Asset::Btc]);
    assert_eq!(report.unmatched, vec![btc.id.clone()]);
    assert_eq!(report.confirmed, vec![usdc.id.clone()]);
    tear_down(h.db).await;
}

#[tokio::test]
async fn missing_prices_leave_volatile_requests_pending() {
    let h = setup().await;
    let req = open(&h.db, 180, Asset::Btc).await;
    h.oracle.clear(Asset::Btc);
    h.btc.set_transfers(vec![paid("btc_tx", dec!(0.00058), 10)]);
    let report = h.api.run_cycle().await.unwrap();
    assert_eq!(report.unmatched, vec![req.id.clone()]);
    h.oracle.set_price(Asset::Btc, dec!(50000));
    let report = h.api.run_cycle().await.unwrap();
    assert_eq!(report.confirmed, vec![req.id.clone()]);
    tear_down(h.db).await;
}

#[tokio::test]
async fn sources_are_read_once_per_asset_per_cycle() {
    let h = setup().await;
    for root in 190..195 {
        open(&h.db, root, Asset::Btc).await;
    }
    open(&h.db, 195, Asset::Usdc).await;
    open(&h.db, 196, Asset::Usdc).await;
    let report = h.api.run_cycle().await.unwrap();
    assert_eq!(report.unmatched.len(), 7);
    assert_eq!(h.btc.calls(), 1);
    assert_eq!(h.usdc.calls(), 1);
    assert_eq!(h.eth.calls(), 0);
    // Only BTC needed a quote
    assert_eq!(h.oracle.calls(), 1);
    tear_down(h.db).await;
}

#[tokio::test]
async fn unconfigured_assets_fail_their_requests_only() {
    let h = setup_with(EventProducers::default(), false).await;
    let usdt = open(&h.db, 200, Asset::Usdt).await;
    let usdc = open(&h.db, 201, Asset::Usdc).await;
    h.usdc.set_transfers(vec![paid("0xc", dec!(29), 12)]);
    let report = h.api.run_cycle().await.unwrap();
    assert_eq!(report.confirmed, vec![usdc.id.clone()]);
    assert!(matches!(report.failed[0], (ref id, ReconciliationError::UnsupportedAsset(Asset::Usdt)) if id == &usdt.id));
    tear_down(h.db).await;
}

#[tokio::test]
async fn confirmations_fire_the_hook() {
    let count = Arc::new(AtomicUsize::new(0));
    let seen = count.clone();
    let mut hooks = EventHooks::default();
    hooks.on_request_confirmed(move |ev| {
        let count = count.clone();
        Box::pin(async move {
            assert_eq!(ev.root(), 210);
            count.fetch_add(1, Ordering::SeqCst);
        }) as Pin<Box<dyn std::future::Future<Output = ()> + Send>>
    });
    let handlers = EventHandlers::new(10, hooks);
    let producers = handlers.producers();
    handlers.start_handlers();
    let h = setup_with(producers, true).await;
    open(&h.db, 210, Asset::Usdc).await;
    h.usdc.set_transfers(vec![paid("0xhook", dec!(29), 12)]);
    h.api.run_cycle().await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    assert_eq!(seen.load(Ordering::SeqCst), 1);
    tear_down(h.db).await;
}
