//! Decides whether any observed transfer settles a purchase request.
//!
//! Matching is a pure function of the request, the candidate transfers, the cycle's price snapshot and the current
//! transfer bindings. It never touches the store or the network, so every rule can be exercised with plain values.
//!
//! The candidates pass through four stages, in order:
//! 1. Non-collision. A request that already recorded a transfer only ever considers that same transfer. Transfers
//!    credited to any other request are dropped.
//! 2. Recency. Transfers timestamped before the request was created are dropped.
//! 3. Amount. Stablecoins must land within a fixed dollar band of the expected price. Volatile assets must land within
//!    a relative tolerance of the expected native amount at the current quote. Without a quote nothing passes.
//! 4. Selection. The deepest transfer wins, ties broken on the smallest hash.
use std::collections::HashMap;

use log::*;
use rust_decimal::Decimal;

use crate::{
    db_types::{Asset, ObservedTransfer, PurchaseRequest, RequestId},
    traits::PriceSnapshot,
};

/// The amount tolerances applied during matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchPolicy {
    /// Relative tolerance for volatile assets, e.g. 0.02 for 2%.
    pub volatile_tolerance: Decimal,
    /// Absolute tolerance in dollars for stablecoins.
    pub stable_band: Decimal,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self { volatile_tolerance: Decimal::new(2, 2), stable_band: Decimal::new(50, 2) }
    }
}

impl MatchPolicy {
    pub fn new(volatile_tolerance: Decimal, stable_band: Decimal) -> Self {
        Self { volatile_tolerance, stable_band }
    }

    /// The inclusive range of native amounts accepted for `request`, or `None` when the asset cannot be priced.
    pub fn accepted_range(&self, request: &PurchaseRequest, prices: &PriceSnapshot) -> Option<(Decimal, Decimal)> {
        let expected = request.expected_usd;
        match request.asset {
            Asset::Usdc | Asset::Usdt => Some((expected - self.stable_band, expected + self.stable_band)),
            Asset::Btc | Asset::Eth => {
                let price = prices.price(request.asset)?;
                let native = expected.checked_div(price)?;
                let slack = native.checked_mul(self.volatile_tolerance)?;
                Some((native - slack, native + slack))
            },
            Asset::Card => None,
        }
    }
}

/// Selects the transfer that settles `request`, if any.
///
/// `bindings` maps every transfer hash already recorded in the store to the request holding it.
pub fn match_transfer(
    request: &PurchaseRequest,
    transfers: &[ObservedTransfer],
    prices: &PriceSnapshot,
    bindings: &HashMap<String, RequestId>,
    policy: &MatchPolicy,
) -> Option<ObservedTransfer> {
    let Some((low, high)) = policy.accepted_range(request, prices) else {
        debug!("🔄️ No price available for {} on request {}. Nothing can match.", request.asset, request.id);
        return None;
    };
    trace!("🔄️ Request {} accepts {low}..={high} {}", request.id, request.asset);
    transfers
        .iter()
        .filter(|t| is_available(request, t, bindings))
        .filter(|t| t.timestamp >= request.created_at)
        .filter(|t| t.amount >= low && t.amount <= high)
        .min_by(|a, b| b.confirmations.cmp(&a.confirmations).then_with(|| a.tx_hash.cmp(&b.tx_hash)))
        .cloned()
}

fn is_available(request: &PurchaseRequest, transfer: &ObservedTransfer, bindings: &HashMap<String, RequestId>) -> bool {
    if let Some(bound) = &request.tx_hash {
        if bound != &transfer.tx_hash {
            return false;
        }
    }
    match bindings.get(&transfer.tx_hash) {
        Some(owner) => owner == &request.id,
        None => true,
    }
}
