mod coingecko;

pub use coingecko::{CoinGeckoOracle, DEFAULT_PRICE_API_URL};
