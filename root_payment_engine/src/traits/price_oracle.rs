use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::db_types::Asset;

/// Quotes the current USD price of one unit of an asset.
///
/// An oracle never fails loudly. Any problem reaching or parsing the quote service is logged and reported as `None`,
/// which the matcher reads as "cannot evaluate this asset this cycle".
#[allow(async_fn_in_trait)]
pub trait PriceOracle {
    async fn quote(&self, asset: Asset) -> Option<Decimal>;
}

/// The prices known during one reconciliation cycle.
#[derive(Debug, Clone, Default)]
pub struct PriceSnapshot {
    prices: HashMap<Asset, Option<Decimal>>,
}

impl PriceSnapshot {
    pub fn with_price(mut self, asset: Asset, price: Decimal) -> Self {
        self.prices.insert(asset, Some(price));
        self
    }

    /// Records the outcome of a quote, including an unavailable one, so it is not requested again this cycle.
    pub fn record(&mut self, asset: Asset, price: Option<Decimal>) {
        self.prices.insert(asset, price);
    }

    pub fn has_quoted(&self, asset: Asset) -> bool {
        self.prices.contains_key(&asset)
    }

    /// The USD price of `asset`, if one was available. Non-positive prices are never reported.
    pub fn price(&self, asset: Asset) -> Option<Decimal> {
        self.prices.get(&asset).copied().flatten().filter(|p| p.is_sign_positive() && !p.is_zero())
    }
}
