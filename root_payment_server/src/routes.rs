//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests:
//! ```nocompile
//!     fn my_handler() -> impl Responder {
//!         std::thread::sleep(Duration::from_secs(5)); // <-- Bad practice! Will cause the current worker thread to
//! hang!
//!     }
//! ```
//! For this reason, any long, non-cpu-bound operation (e.g. I/O, database operations, etc.) should be expressed as
//! futures or asynchronous functions. Async handlers get executed concurrently by worker threads and thus don’t block
//! execution:
//!
//! ```nocompile
//!     async fn my_handler() -> impl Responder {
//!         tokio::time::sleep(Duration::from_secs(5)).await; // <-- Ok. Worker thread will handle other requests here
//!     }
//! ```
use std::str::FromStr;

use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use log::*;
use root_payment_engine::{
    db_types::{Asset, RequestId},
    traits::RequestStore,
    PurchaseApi,
};

use crate::{
    config::ServerOptions,
    data_objects::{CreateRequestParams, CreateRequestResponse},
    errors::ServerError,
    helpers::get_remote_ip,
    rate_limit::RateLimiter,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Payments  ----------------------------------------------------
route!(create_payment => Post "/payment/create" impl RequestStore);
/// Route handler for opening a new purchase request.
///
/// The body is `{"root": 123, "asset": "BTC"}`. The price is fixed by the server configuration, not by the caller.
/// Requests are rate limited per client IP.
///
/// Responds with `201 Created` and the new request, including the address the payment must be sent to and the time
/// at which the request stops being matched. A root that has already been sold gives `409 Conflict`.
pub async fn create_payment<B: RequestStore>(
    req: HttpRequest,
    body: web::Json<CreateRequestParams>,
    api: web::Data<PurchaseApi<B>>,
    limiter: web::Data<RateLimiter>,
    options: web::Data<ServerOptions>,
) -> Result<HttpResponse, ServerError> {
    let client = get_remote_ip(&req, options.use_x_forwarded_for, options.use_forwarded)
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".into());
    if !limiter.check(&client) {
        info!("💻️ Rate limit exceeded for {client}");
        return Err(ServerError::RateLimitExceeded);
    }
    let CreateRequestParams { root, asset } = body.into_inner();
    debug!("💻️ POST create payment for root {root} in {asset} from {client}");
    let asset = Asset::from_str(&asset).map_err(|e| ServerError::InvalidRequestBody(e.to_string()))?;
    let pay_to = options
        .wallets
        .address_for(asset)
        .ok_or_else(|| ServerError::InvalidRequestBody(format!("{asset} payments cannot be requested here")))?
        .to_string();
    let request = api.create_request(root, asset, options.expected_usd).await.map_err(|e| {
        debug!("💻️ Could not create a purchase request for root {root}. {e}");
        ServerError::from(e)
    })?;
    let response = CreateRequestResponse { request, pay_to, wallet_addresses: options.wallets.addresses() };
    Ok(HttpResponse::Created().json(response))
}

route!(payment_status => Get "/payment/status/{id}" impl RequestStore);
/// Route handler for checking on a purchase request.
///
/// The status is the one derived at read time, so a pending request whose payment window has passed is reported as
/// `expired`.
pub async fn payment_status<B: RequestStore>(
    path: web::Path<String>,
    api: web::Data<PurchaseApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = RequestId::from_str(&path.into_inner()).map_err(|e| ServerError::InvalidRequestPath(e.to_string()))?;
    trace!("💻️ GET payment status for {id}");
    let view = api.request_status(&id).await?;
    Ok(HttpResponse::Ok().json(view))
}
