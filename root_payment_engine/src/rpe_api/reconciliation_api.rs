use std::{collections::HashMap, fmt::Debug};

use log::*;

use crate::{
    db_types::{Asset, ObservedTransfer, PurchaseRequest, RequestId},
    events::{EventProducers, RequestConfirmedEvent},
    matching::{match_transfer, MatchPolicy},
    rpe_api::{
        errors::ReconciliationError,
        reconciliation_objects::{CycleReport, ReconciliationSettings, RequestOutcome},
    },
    scanners::{Scanner, ScannerSet},
    traits::{ChainScanner, PriceOracle, PriceSnapshot, RequestStore, RequestStoreError},
};

/// `ReconciliationApi` matches on-chain payments to pending purchase requests and confirms them once final.
///
/// Each call to [`Self::run_cycle`] is one pass over every eligible request. Only one cycle should run against a given
/// store at a time.
pub struct ReconciliationApi<B, P, S = Scanner> {
    db: B,
    scanners: ScannerSet<S>,
    oracle: P,
    policy: MatchPolicy,
    settings: ReconciliationSettings,
    producers: EventProducers,
}

impl<B, P, S> Debug for ReconciliationApi<B, P, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReconciliationApi ({:?}, {:?})", self.policy, self.settings)
    }
}

/// Per-cycle memo, so that every scanner and the price service are hit at most once per asset per cycle.
#[derive(Default)]
struct CycleCache {
    transfers: HashMap<Asset, Vec<ObservedTransfer>>,
    prices: PriceSnapshot,
    bindings: HashMap<String, RequestId>,
}

impl<B, P, S> ReconciliationApi<B, P, S> {
    pub fn new(
        db: B,
        scanners: ScannerSet<S>,
        oracle: P,
        policy: MatchPolicy,
        settings: ReconciliationSettings,
        producers: EventProducers,
    ) -> Self {
        Self { db, scanners, oracle, policy, settings, producers }
    }
}

impl<B, P, S> ReconciliationApi<B, P, S>
where
    B: RequestStore,
    P: PriceOracle,
    S: ChainScanner,
{
    /// Runs one reconciliation cycle.
    ///
    /// Only a failure to load the eligible requests (or the current bindings) fails the cycle as a whole. Every other
    /// failure is confined to the request it concerns and reported in the [`CycleReport`].
    pub async fn run_cycle(&self) -> Result<CycleReport, RequestStoreError> {
        let requests = self.db.list_eligible(self.settings.payment_window).await?;
        let mut report = CycleReport::default();
        if requests.is_empty() {
            trace!("🔄️ No pending requests to reconcile");
            return Ok(report);
        }
        debug!("🔄️ Reconciling {} pending requests", requests.len());
        let mut cache = CycleCache { bindings: self.db.fetch_bound_transfers().await?, ..Default::default() };
        for request in requests {
            let outcome = self.reconcile_request(&request, &mut cache, &mut report).await;
            match &outcome {
                Ok(RequestOutcome::Confirmed { tx_hash, confirmations }) => {
                    info!(
                        "🔄️ Request {} for root {} confirmed by {tx_hash} ({confirmations} confirmations)",
                        request.id, request.root
                    );
                },
                Ok(RequestOutcome::AwaitingConfirmations { tx_hash, confirmations, required }) => {
                    debug!(
                        "🔄️ Request {} matched {tx_hash}. {confirmations}/{required} confirmations",
                        request.id
                    );
                },
                Ok(RequestOutcome::Unmatched) => {
                    trace!("🔄️ No matching {} transfer for request {}", request.asset, request.id);
                },
                Err(e) if e.is_conflict() => {
                    warn!("🔄️ Request {} was not updated. {e}", request.id);
                },
                Err(e) => {
                    error!("🔄️ Could not reconcile request {}. {e}", request.id);
                },
            }
            report.record(request.id, outcome);
        }
        info!("🔄️ Reconciliation cycle complete. {report}");
        Ok(report)
    }

    async fn reconcile_request(
        &self,
        request: &PurchaseRequest,
        cache: &mut CycleCache,
        report: &mut CycleReport,
    ) -> Result<RequestOutcome, ReconciliationError> {
        let asset = request.asset;
        let entry = self.scanners.get(asset).ok_or(ReconciliationError::UnsupportedAsset(asset))?;
        if !cache.transfers.contains_key(&asset) {
            let lookback = self.settings.lookback_blocks;
            let transfers = match entry.scanner.list_incoming(&entry.collection_address, lookback).await {
                Ok(transfers) => transfers,
                Err(e) => {
                    let name = entry.scanner.name();
                    warn!("🔍️ {name} failed. No {asset} transfers will be considered this cycle. {e}");
                    report.degraded.push(asset);
                    Vec::new()
                },
            };
            cache.transfers.insert(asset, transfers);
        }
        if asset.is_volatile() && !cache.prices.has_quoted(asset) {
            let price = self.oracle.quote(asset).await;
            cache.prices.record(asset, price);
        }
        let transfers = cache.transfers.get(&asset).map(Vec::as_slice).unwrap_or_default();
        let Some(transfer) = match_transfer(request, transfers, &cache.prices, &cache.bindings, &self.policy) else {
            return Ok(RequestOutcome::Unmatched);
        };
        let bound = self.db.bind_transfer(&request.id, &transfer.tx_hash, transfer.confirmations).await?;
        cache.bindings.insert(transfer.tx_hash.clone(), request.id.clone());
        let required = entry.required_confirmations;
        if bound.confirmations < required {
            return Ok(RequestOutcome::AwaitingConfirmations {
                tx_hash: transfer.tx_hash,
                confirmations: bound.confirmations,
                required,
            });
        }
        let confirmed = self.db.confirm(&request.id).await?;
        let confirmations = confirmed.confirmations;
        self.producers.publish_request_confirmed(RequestConfirmedEvent::new(confirmed)).await;
        Ok(RequestOutcome::Confirmed { tx_hash: transfer.tx_hash, confirmations })
    }
}
