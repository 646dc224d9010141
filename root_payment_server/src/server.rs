use std::{path::Path, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use log::*;
use root_payment_engine::{
    events::{EventHandlers, EventHooks, EventProducers},
    PurchaseApi,
    ReconciliationApi,
    SqliteDatabase,
};
use tokio::sync::watch;

use crate::{
    config::{ServerConfig, ServerOptions},
    errors::ServerError,
    rate_limit::RateLimiter,
    reconciliation_worker::{start_reconciliation_worker, ReconciliationEngine},
    routes::{health, CreatePaymentRoute, PaymentStatusRoute},
};

const EVENT_BUFFER_SIZE: usize = 64;

/// Runs the gateway until SIGINT or SIGTERM is received.
///
/// The reconciliation worker always runs. The HTTP server runs alongside it unless `disable_http` is set. On shutdown
/// the HTTP server stops accepting connections, the worker finishes any in-flight cycle, and the database pool is
/// closed.
pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    config.validate()?;
    let db = open_database(&config.database_url).await?;
    let handlers = EventHandlers::new(EVENT_BUFFER_SIZE, event_hooks());
    let producers = handlers.producers();
    handlers.start_handlers();

    let engine = create_reconciliation_engine(&config, db.clone(), producers.clone())?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = start_reconciliation_worker(engine, config.poll_interval, shutdown_rx);

    let result = if config.disable_http {
        info!("💻️ HTTP server is disabled. Running the reconciliation loop only.");
        shutdown_signal().await;
        Ok(())
    } else {
        info!("💻️ Starting HTTP server on {}:{}", config.host, config.port);
        let srv = create_server_instance(config, db.clone(), producers)?;
        let handle = srv.handle();
        tokio::select! {
            res = srv => res.map_err(|e| ServerError::Unspecified(e.to_string())),
            _ = shutdown_signal() => {
                handle.stop(true).await;
                Ok(())
            },
        }
    };

    if shutdown_tx.send(true).is_err() {
        warn!("🔄️ Reconciliation worker had already stopped");
    }
    if let Err(e) = worker.await {
        error!("🔄️ Reconciliation worker did not shut down cleanly. {e}");
    }
    db.close().await;
    result
}

/// Connects to the request store, creating the database file and bringing the schema up to date if necessary.
pub async fn open_database(url: &str) -> Result<SqliteDatabase, ServerError> {
    if let Some(dir) = url.strip_prefix("sqlite://").and_then(|p| Path::new(p).parent()) {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            info!("🗃️ Creating database directory {}", dir.display());
            std::fs::create_dir_all(dir)?;
        }
    }
    let db = SqliteDatabase::new_with_url(url, 25).await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.run_migrations().await.map_err(|e| ServerError::InitializeError(format!("Migrations failed. {e}")))?;
    Ok(db)
}

pub fn create_reconciliation_engine(
    config: &ServerConfig,
    db: SqliteDatabase,
    producers: EventProducers,
) -> Result<ReconciliationEngine, ServerError> {
    let scanners = config.scanner_set()?;
    let oracle = config.price_oracle()?;
    let api = ReconciliationApi::new(
        db,
        scanners,
        oracle,
        config.match_policy(),
        config.reconciliation_settings(),
        producers,
    );
    debug!("🔄️ Reconciliation engine configured. {api:?}");
    Ok(api)
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let limiter = web::Data::new(RateLimiter::per_minute(config.rate_limit_per_minute));
    let options = web::Data::new(ServerOptions::from_config(&config));
    let payment_window = config.payment_window;
    let srv = HttpServer::new(move || {
        let purchase_api = PurchaseApi::new(db.clone(), producers.clone(), payment_window);
        let api_scope = web::scope("/api")
            .service(CreatePaymentRoute::<SqliteDatabase>::new())
            .service(PaymentStatusRoute::<SqliteDatabase>::new());
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("rpg::access_log"))
            .app_data(web::Data::new(purchase_api))
            .app_data(limiter.clone())
            .app_data(options.clone())
            .service(health)
            .service(api_scope)
    })
    .disable_signals()
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}

fn event_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks.on_request_confirmed(|ev| {
        Box::pin(async move {
            info!("📬️ Root {} was claimed by request {} ({})", ev.root(), ev.id(), ev.asset());
        })
    });
    hooks
}

/// Resolves on the first SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("🚀️ Could not listen for Ctrl-C. {e}");
            std::future::pending::<()>().await;
        }
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            },
            Err(e) => {
                error!("🚀️ Could not listen for SIGTERM. {e}");
                std::future::pending::<()>().await;
            },
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();
    tokio::select! {
        _ = ctrl_c => info!("🚀️ Received Ctrl-C. Shutting down."),
        _ = terminate => info!("🚀️ Received SIGTERM. Shutting down."),
    }
}
