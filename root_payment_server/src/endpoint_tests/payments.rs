use actix_web::{http::StatusCode, test, test::TestRequest, App};
use chrono::{Duration, Utc};
use root_payment_engine::{
    db_types::{Asset, NewPurchaseRequest, RequestStatus},
    traits::RequestStoreError,
};
use rust_decimal_macros::dec;
use serde_json::{json, Value};

use super::{
    helpers::{configure, get_request, post_request, stored, BTC_WALLET, ETH_WALLET},
    mocks::MockStore,
};
use crate::rate_limit::RateLimiter;

fn open_limiter() -> RateLimiter {
    RateLimiter::per_minute(0)
}

fn accepting_store() -> MockStore {
    let mut store = MockStore::new();
    store.expect_create_request().returning(|r| Ok(stored(&r, Utc::now())));
    store
}

#[actix_web::test]
async fn create_payment() {
    let _ = env_logger::try_init().ok();
    let mut store = MockStore::new();
    store
        .expect_create_request()
        .times(1)
        .withf(|r| r.root == 123 && r.asset == Asset::Btc && r.expected_usd == dec!(29.00))
        .returning(|r| Ok(stored(&r, Utc::now())));
    let body = json!({ "root": 123, "asset": "BTC" });
    let (status, body) = post_request("/api/payment/create", body, configure(store, open_limiter())).await;
    assert_eq!(status, StatusCode::CREATED);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["root"], 123);
    assert_eq!(body["asset"], "BTC");
    assert_eq!(body["status"], "pending");
    assert_eq!(body["pay_to"], BTC_WALLET);
    assert_eq!(body["wallet_addresses"]["BTC"], BTC_WALLET);
    assert_eq!(body["wallet_addresses"]["USDT"], ETH_WALLET);
    assert!(body["expires_at"].is_string());
    assert!(body["tx_hash"].is_null());
}

#[actix_web::test]
async fn asset_symbols_are_case_insensitive() {
    let _ = env_logger::try_init().ok();
    let body = json!({ "root": 500, "asset": "usdc" });
    let (status, body) = post_request("/api/payment/create", body, configure(accepting_store(), open_limiter())).await;
    assert_eq!(status, StatusCode::CREATED);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["asset"], "USDC");
    assert_eq!(body["pay_to"], ETH_WALLET);
}

#[actix_web::test]
async fn root_out_of_range() {
    let _ = env_logger::try_init().ok();
    for root in [99, 1000, -5] {
        let mut store = MockStore::new();
        store.expect_create_request().never();
        let body = json!({ "root": root, "asset": "ETH" });
        let (status, body) = post_request("/api/payment/create", body, configure(store, open_limiter())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "root {root}");
        assert!(body.contains("100..=999"), "{body}");
    }
}

#[actix_web::test]
async fn unsupported_assets() {
    let _ = env_logger::try_init().ok();
    for asset in ["DOGE", "CARD", ""] {
        let mut store = MockStore::new();
        store.expect_create_request().never();
        let body = json!({ "root": 123, "asset": asset });
        let (status, _) = post_request("/api/payment/create", body, configure(store, open_limiter())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "asset {asset}");
    }
}

#[actix_web::test]
async fn malformed_body() {
    let _ = env_logger::try_init().ok();
    let mut store = MockStore::new();
    store.expect_create_request().never();
    let body = json!({ "root": "one hundred" });
    let (status, _) = post_request("/api/payment/create", body, configure(store, open_limiter())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn claimed_root_is_a_conflict() {
    let _ = env_logger::try_init().ok();
    let mut store = MockStore::new();
    store.expect_create_request().times(1).returning(|r| Err(RequestStoreError::RootAlreadyClaimed(r.root)));
    let body = json!({ "root": 777, "asset": "USDT" });
    let (status, body) = post_request("/api/payment/create", body, configure(store, open_limiter())).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["error"], "Root 777 has already been claimed.");
}

#[actix_web::test]
async fn backend_failure() {
    let _ = env_logger::try_init().ok();
    let mut store = MockStore::new();
    store.expect_create_request().returning(|_| Err(RequestStoreError::DatabaseError("database is locked".into())));
    let body = json!({ "root": 321, "asset": "ETH" });
    let (status, _) = post_request("/api/payment/create", body, configure(store, open_limiter())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[actix_web::test]
async fn create_is_rate_limited_per_client() {
    let _ = env_logger::try_init().ok();
    let mut store = MockStore::new();
    store.expect_create_request().times(2).returning(|r| Ok(stored(&r, Utc::now())));
    let app = test::init_service(App::new().configure(configure(store, RateLimiter::per_minute(1)))).await;
    let request = |peer: &str| {
        TestRequest::post()
            .uri("/api/payment/create")
            .peer_addr(peer.parse().unwrap())
            .set_json(json!({ "root": 123, "asset": "BTC" }))
            .to_request()
    };
    let res = test::call_service(&app, request("10.1.1.1:4000")).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let res = test::call_service(&app, request("10.1.1.1:4001")).await;
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    let res = test::call_service(&app, request("10.2.2.2:4000")).await;
    assert_eq!(res.status(), StatusCode::CREATED);
}

#[actix_web::test]
async fn status_with_malformed_id() {
    let _ = env_logger::try_init().ok();
    let mut store = MockStore::new();
    store.expect_fetch_request().never();
    let (status, _) = get_request("/api/payment/status/not-a-uuid", configure(store, open_limiter())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn status_of_unknown_request() {
    let _ = env_logger::try_init().ok();
    let mut store = MockStore::new();
    store.expect_fetch_request().times(1).returning(|_| Ok(None));
    let path = "/api/payment/status/7b0d3c1e-93a4-4e0f-8d4c-6f2b9c1a5e10";
    let (status, _) = get_request(path, configure(store, open_limiter())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn stale_pending_request_reads_as_expired() {
    let _ = env_logger::try_init().ok();
    let mut store = MockStore::new();
    store.expect_fetch_request().times(1).returning(|id| {
        let new = NewPurchaseRequest::new(400, Asset::Eth, dec!(29.00));
        let mut request = stored(&new, Utc::now() - Duration::hours(25));
        request.id = id.clone();
        Ok(Some(request))
    });
    let path = "/api/payment/status/7b0d3c1e-93a4-4e0f-8d4c-6f2b9c1a5e10";
    let (status, body) = get_request(path, configure(store, open_limiter())).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["id"], "7b0d3c1e-93a4-4e0f-8d4c-6f2b9c1a5e10");
    assert_eq!(body["status"], "expired");
}

#[actix_web::test]
async fn confirmed_request_status() {
    let _ = env_logger::try_init().ok();
    let mut store = MockStore::new();
    store.expect_fetch_request().times(1).returning(|id| {
        let new = NewPurchaseRequest::new(400, Asset::Btc, dec!(29.00));
        let mut request = stored(&new, Utc::now() - Duration::hours(30));
        request.id = id.clone();
        request.status = RequestStatus::Confirmed;
        request.tx_hash = Some("abc123".into());
        request.confirmations = 6;
        request.confirmed_at = Some(Utc::now() - Duration::hours(29));
        Ok(Some(request))
    });
    let path = "/api/payment/status/7B0D3C1E-93A4-4E0F-8D4C-6F2B9C1A5E10";
    let (status, body) = get_request(path, configure(store, open_limiter())).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["status"], "confirmed");
    assert_eq!(body["tx_hash"], "abc123");
    assert_eq!(body["confirmations"], 6);
}
