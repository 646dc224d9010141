use std::{collections::HashMap, str::FromStr, sync::Arc, time::Duration};

use log::*;
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::Number;

use crate::{db_types::Asset, traits::PriceOracle};

pub const DEFAULT_PRICE_API_URL: &str = "https://api.coingecko.com/api/v3/simple/price";

/// Quotes USD prices from a CoinGecko-compatible `simple/price` endpoint.
#[derive(Clone)]
pub struct CoinGeckoOracle {
    url: String,
    client: Arc<Client>,
}

impl CoinGeckoOracle {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { url: url.to_string(), client: Arc::new(client) })
    }

    fn coin_id(asset: Asset) -> Option<&'static str> {
        match asset {
            Asset::Btc => Some("bitcoin"),
            Asset::Eth => Some("ethereum"),
            _ => None,
        }
    }

    async fn fetch(&self, coin_id: &str) -> Result<Decimal, String> {
        let response = self
            .client
            .get(self.url.as_str())
            .query(&[("ids", coin_id), ("vs_currencies", "usd")])
            .send()
            .await
            .map_err(|e| e.without_url().to_string())?;
        if !response.status().is_success() {
            return Err(format!("Price service returned {}", response.status()));
        }
        let body = response
            .json::<HashMap<String, HashMap<String, Number>>>()
            .await
            .map_err(|e| e.without_url().to_string())?;
        extract_usd(&body, coin_id)
    }
}

impl PriceOracle for CoinGeckoOracle {
    async fn quote(&self, asset: Asset) -> Option<Decimal> {
        if asset.is_stablecoin() {
            return Some(Decimal::ONE);
        }
        let coin_id = Self::coin_id(asset)?;
        match self.fetch(coin_id).await {
            Ok(price) => {
                debug!("💱️ {asset} is trading at ${price}");
                Some(price)
            },
            Err(e) => {
                warn!("💱️ Could not fetch the {asset} price. {e}");
                None
            },
        }
    }
}

/// Reads `{ "<coin_id>": { "usd": <number> } }` without a detour through `f64`.
fn extract_usd(body: &HashMap<String, HashMap<String, Number>>, coin_id: &str) -> Result<Decimal, String> {
    let number = body
        .get(coin_id)
        .and_then(|prices| prices.get("usd"))
        .ok_or_else(|| format!("No USD price for {coin_id} in response"))?;
    let text = number.to_string();
    let price = Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|e| format!("Invalid price {text}: {e}"))?;
    if price <= Decimal::ZERO {
        return Err(format!("Non-positive price {price} for {coin_id}"));
    }
    Ok(price)
}
