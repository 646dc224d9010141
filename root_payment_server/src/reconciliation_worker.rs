use std::time::Duration;

use log::*;
use root_payment_engine::{oracle::CoinGeckoOracle, ReconciliationApi, SqliteDatabase};
use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};

pub type ReconciliationEngine = ReconciliationApi<SqliteDatabase, CoinGeckoOracle>;

/// Starts the reconciliation worker. It runs a cycle every `poll_interval` until `shutdown` changes (or its sender is
/// dropped).
///
/// A cycle that is in progress when shutdown is requested is allowed to finish. A cycle that overruns the interval
/// delays the next one rather than triggering a burst of catch-up cycles.
pub fn start_reconciliation_worker(
    api: ReconciliationEngine,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(poll_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("🔄️ Reconciliation worker started. Polling every {}s", poll_interval.as_secs());
        loop {
            tokio::select! {
                _ = timer.tick() => {},
                _ = shutdown.changed() => {
                    info!("🔄️ Reconciliation worker received shutdown signal");
                    break;
                },
            }
            trace!("🔄️ Running reconciliation cycle");
            match api.run_cycle().await {
                Ok(report) if report.is_empty() => trace!("🔄️ Nothing to reconcile"),
                Ok(report) => debug!("🔄️ Cycle finished. {report}"),
                Err(e) => error!("🔄️ Reconciliation cycle could not start. Will retry on the next tick. {e}"),
            }
        }
        info!("🔄️ Reconciliation worker stopped");
    })
}
