use actix_web::{http::StatusCode, test, test::TestRequest, web, web::ServiceConfig, App};
use chrono::{DateTime, Duration, Utc};
use log::debug;
use root_payment_engine::{
    db_types::{NewPurchaseRequest, PurchaseRequest, RequestId, RequestStatus},
    events::EventProducers,
    PurchaseApi,
};
use rust_decimal_macros::dec;

use super::mocks::MockStore;
use crate::{
    config::{CollectionWallets, ServerOptions},
    rate_limit::RateLimiter,
    routes::{CreatePaymentRoute, PaymentStatusRoute},
};

pub const BTC_WALLET: &str = "bc1qrootcollection";
pub const ETH_WALLET: &str = "0x00000000000000000000000000000000000000aa";

pub fn options() -> ServerOptions {
    ServerOptions {
        use_x_forwarded_for: false,
        use_forwarded: false,
        expected_usd: dec!(29.00),
        wallets: CollectionWallets::new(BTC_WALLET, ETH_WALLET),
    }
}

/// Mounts the payment routes against `store`, the way the server does.
pub fn configure(store: MockStore, limiter: RateLimiter) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg: &mut ServiceConfig| {
        let api = PurchaseApi::new(store, EventProducers::default(), Duration::hours(24));
        cfg.app_data(web::Data::new(api)).app_data(web::Data::new(limiter)).app_data(web::Data::new(options())).service(
            web::scope("/api")
                .service(CreatePaymentRoute::<MockStore>::new())
                .service(PaymentStatusRoute::<MockStore>::new()),
        );
    }
}

/// The record a store would return for `request`.
pub fn stored(request: &NewPurchaseRequest, created_at: DateTime<Utc>) -> PurchaseRequest {
    PurchaseRequest {
        id: RequestId::random(),
        root: request.root,
        asset: request.asset,
        expected_usd: request.expected_usd,
        status: RequestStatus::Pending,
        tx_hash: None,
        confirmations: 0,
        created_at,
        confirmed_at: None,
        certificate_hash: None,
    }
}

pub async fn get_request<F>(path: &str, configure: F) -> (StatusCode, String)
where F: FnOnce(&mut ServiceConfig) {
    let req = TestRequest::get().uri(path).to_request();
    send(req, configure).await
}

pub async fn post_request<F>(path: &str, body: serde_json::Value, configure: F) -> (StatusCode, String)
where F: FnOnce(&mut ServiceConfig) {
    let req = TestRequest::post().uri(path).set_json(body).to_request();
    send(req, configure).await
}

async fn send<F>(req: actix_http::Request, configure: F) -> (StatusCode, String)
where F: FnOnce(&mut ServiceConfig) {
    let app = test::init_service(App::new().configure(configure)).await;
    debug!("Making request");
    let res = test::call_service(&app, req).await;
    let status = res.status();
    let body = test::read_body(res).await;
    (status, String::from_utf8_lossy(&body).into_owned())
}
