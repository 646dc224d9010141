//! In-memory stand-ins for the external data sources, with call counters so tests can check memoisation.
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
        Mutex,
    },
};

use rust_decimal::Decimal;

use crate::{
    db_types::{Asset, ObservedTransfer},
    traits::{ChainScanner, PriceOracle, ScannerError},
};

/// A scanner that returns whatever it was last given.
#[derive(Clone)]
pub struct FakeScanner {
    name: String,
    response: Arc<Mutex<Result<Vec<ObservedTransfer>, ScannerError>>>,
    calls: Arc<AtomicUsize>,
}

impl FakeScanner {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), response: Arc::new(Mutex::new(Ok(Vec::new()))), calls: Arc::default() }
    }

    pub fn set_transfers(&self, transfers: Vec<ObservedTransfer>) {
        *self.response.lock().expect("poisoned lock") = Ok(transfers);
    }

    pub fn fail_with(&self, error: ScannerError) {
        *self.response.lock().expect("poisoned lock") = Err(error);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ChainScanner for FakeScanner {
    fn name(&self) -> &str {
        self.name.as_str()
    }

    async fn list_incoming(&self, _: &str, _: u64) -> Result<Vec<ObservedTransfer>, ScannerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response.lock().expect("poisoned lock").clone()
    }
}

/// An oracle with fixed prices. Stablecoins are always worth a dollar.
#[derive(Clone, Default)]
pub struct FixedPriceOracle {
    prices: Arc<Mutex<HashMap<Asset, Decimal>>>,
    calls: Arc<AtomicUsize>,
}

impl FixedPriceOracle {
    pub fn with_price(self, asset: Asset, price: Decimal) -> Self {
        self.set_price(asset, price);
        self
    }

    pub fn set_price(&self, asset: Asset, price: Decimal) {
        self.prices.lock().expect("poisoned lock").insert(asset, price);
    }

    pub fn clear(&self, asset: Asset) {
        self.prices.lock().expect("poisoned lock").remove(&asset);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PriceOracle for FixedPriceOracle {
    async fn quote(&self, asset: Asset) -> Option<Decimal> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if asset.is_stablecoin() {
            return Some(Decimal::ONE);
        }
        self.prices.lock().expect("poisoned lock").get(&asset).copied()
    }
}
