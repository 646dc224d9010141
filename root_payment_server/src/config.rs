use std::{collections::BTreeMap, env, fmt::Display, str::FromStr, time::Duration};

use log::*;
use root_payment_engine::{
    db_types::Asset,
    oracle::{CoinGeckoOracle, DEFAULT_PRICE_API_URL},
    rpe_api::reconciliation_objects::{DEFAULT_LOOKBACK_BLOCKS, DEFAULT_PAYMENT_WINDOW_HOURS},
    scanners::{
        evm_rpc::{normalize_address, DEFAULT_RPC_TIMEOUT},
        JsonRpcClient,
        NativeBlockScanner,
        Scanner,
        ScannerEntry,
        ScannerSet,
        TokenLogScanner,
        UtxoExplorerScanner,
        DEFAULT_EXPLORER_URL,
        DEFAULT_TX_LIMIT,
    },
    traits::ScannerError,
    MatchPolicy,
    ReconciliationSettings,
};
use rpg_common::{helpers::env_flag, Secret};
use rust_decimal::Decimal;

use crate::errors::ServerError;

const DEFAULT_RPG_HOST: &str = "127.0.0.1";
const DEFAULT_RPG_PORT: u16 = 8370;
const DEFAULT_DATABASE_URL: &str = "sqlite://data/root_payments.db";
const DEFAULT_ETH_RPC_URL: &str = "https://eth.llamarpc.com";
const DEFAULT_USDC_CONTRACT: &str = "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48";
const DEFAULT_USDT_CONTRACT: &str = "0xdAC17F958D2ee523a2206206994597C13D831ec7";
const DEFAULT_BTC_CONFIRMATIONS: u64 = 6;
const DEFAULT_ETH_CONFIRMATIONS: u64 = 12;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
const DEFAULT_EXPECTED_USD: &str = "29.00";
const DEFAULT_PRICE_TOLERANCE: &str = "0.02";
const DEFAULT_RATE_LIMIT_PER_MINUTE: u32 = 20;
const MAX_PAYMENT_WINDOW_HOURS: i64 = 24 * 365;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address.
    pub use_forwarded: bool,
    pub wallets: CollectionWallets,
    pub btc_explorer_url: String,
    /// JSON-RPC endpoint for ETH and the ERC-20 tokens. Hosted endpoints usually embed an API key in the URL.
    pub eth_rpc_url: Secret<String>,
    pub price_api_url: String,
    pub usdc_contract: String,
    pub usdt_contract: String,
    pub btc_confirmations: u64,
    /// Applies to ETH, USDC and USDT
    pub eth_confirmations: u64,
    /// Accepted relative deviation for BTC and ETH payments
    pub price_tolerance: Decimal,
    pub poll_interval: Duration,
    pub payment_window: chrono::Duration,
    pub lookback_blocks: u64,
    /// How many recent transactions the BTC explorer is asked for
    pub btc_tx_limit: u32,
    /// The price of a root. Every request is opened at this price.
    pub expected_usd: Decimal,
    /// Requests per client IP per minute on the create endpoint. Zero disables the limit.
    pub rate_limit_per_minute: u32,
    /// Run the reconciliation loop without the HTTP server
    pub disable_http: bool,
}

/// The shared wallets that receive payments. Both are required; the server refuses to start without them.
#[derive(Clone, Debug, Default)]
pub struct CollectionWallets {
    pub btc: Option<String>,
    /// Receives ETH as well as USDC and USDT
    pub eth: Option<String>,
}

impl CollectionWallets {
    pub fn new<S: Into<String>>(btc: S, eth: S) -> Self {
        Self { btc: Some(btc.into()), eth: Some(eth.into()) }
    }

    pub fn address_for(&self, asset: Asset) -> Option<&str> {
        match asset {
            Asset::Btc => self.btc.as_deref(),
            Asset::Eth | Asset::Usdc | Asset::Usdt => self.eth.as_deref(),
            Asset::Card => None,
        }
    }

    /// The collection address for every on-chain asset that has one.
    pub fn addresses(&self) -> BTreeMap<Asset, String> {
        Asset::ON_CHAIN
            .iter()
            .filter_map(|&asset| self.address_for(asset).map(|a| (asset, a.to_string())))
            .collect()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPG_HOST.to_string(),
            port: DEFAULT_RPG_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            use_x_forwarded_for: false,
            use_forwarded: false,
            wallets: CollectionWallets::default(),
            btc_explorer_url: DEFAULT_EXPLORER_URL.to_string(),
            eth_rpc_url: Secret::new(DEFAULT_ETH_RPC_URL.to_string()),
            price_api_url: DEFAULT_PRICE_API_URL.to_string(),
            usdc_contract: DEFAULT_USDC_CONTRACT.to_string(),
            usdt_contract: DEFAULT_USDT_CONTRACT.to_string(),
            btc_confirmations: DEFAULT_BTC_CONFIRMATIONS,
            eth_confirmations: DEFAULT_ETH_CONFIRMATIONS,
            price_tolerance: default_decimal(DEFAULT_PRICE_TOLERANCE),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            payment_window: chrono::Duration::hours(DEFAULT_PAYMENT_WINDOW_HOURS),
            lookback_blocks: DEFAULT_LOOKBACK_BLOCKS,
            btc_tx_limit: DEFAULT_TX_LIMIT,
            expected_usd: default_decimal(DEFAULT_EXPECTED_USD),
            rate_limit_per_minute: DEFAULT_RATE_LIMIT_PER_MINUTE,
            disable_http: false,
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("RPG_HOST").ok().unwrap_or_else(|| DEFAULT_RPG_HOST.into());
        let port = env_or_default("RPG_PORT", DEFAULT_RPG_PORT);
        let database_url = env::var("RPG_DATABASE_URL").ok().unwrap_or_else(|| {
            info!("🪛️ RPG_DATABASE_URL is not set. Using the default, {DEFAULT_DATABASE_URL}.");
            DEFAULT_DATABASE_URL.into()
        });
        let use_x_forwarded_for = env_flag("RPG_USE_X_FORWARDED_FOR", false);
        let use_forwarded = env_flag("RPG_USE_FORWARDED", false);
        let wallets = CollectionWallets {
            btc: non_empty_var("RPG_WALLET_BTC"),
            eth: non_empty_var("RPG_WALLET_ETH"),
        };
        let btc_explorer_url = env::var("RPG_BTC_EXPLORER_URL").ok().unwrap_or_else(|| DEFAULT_EXPLORER_URL.into());
        let eth_rpc_url = env::var("RPG_ETH_RPC_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ RPG_ETH_RPC_URL is not set. Using the public endpoint, which may throttle requests.");
            DEFAULT_ETH_RPC_URL.into()
        });
        let price_api_url = env::var("RPG_PRICE_API_URL").ok().unwrap_or_else(|| DEFAULT_PRICE_API_URL.into());
        let usdc_contract = env::var("RPG_USDC_CONTRACT").ok().unwrap_or_else(|| DEFAULT_USDC_CONTRACT.into());
        let usdt_contract = env::var("RPG_USDT_CONTRACT").ok().unwrap_or_else(|| DEFAULT_USDT_CONTRACT.into());
        let btc_confirmations = env_or_default("RPG_BTC_CONFIRMATIONS", DEFAULT_BTC_CONFIRMATIONS);
        let eth_confirmations = env_or_default("RPG_ETH_CONFIRMATIONS", DEFAULT_ETH_CONFIRMATIONS);
        let price_tolerance = env_or_default("RPG_PRICE_TOLERANCE", default_decimal(DEFAULT_PRICE_TOLERANCE));
        let poll_interval = Duration::from_secs(env_or_default("RPG_POLL_INTERVAL", DEFAULT_POLL_INTERVAL_SECS));
        let window_hours = env_or_default("RPG_PAYMENT_WINDOW_HOURS", DEFAULT_PAYMENT_WINDOW_HOURS);
        let payment_window = payment_window_hours(window_hours);
        let lookback_blocks = env_or_default("RPG_LOOKBACK_BLOCKS", DEFAULT_LOOKBACK_BLOCKS);
        let btc_tx_limit = env_or_default("RPG_BTC_TX_LIMIT", DEFAULT_TX_LIMIT);
        let expected_usd = env_or_default("RPG_EXPECTED_USD", default_decimal(DEFAULT_EXPECTED_USD));
        let rate_limit_per_minute = env_or_default("RPG_RATE_LIMIT_PER_MINUTE", DEFAULT_RATE_LIMIT_PER_MINUTE);
        let disable_http = env_flag("RPG_DISABLE_HTTP", false);
        Self {
            host,
            port,
            database_url,
            use_x_forwarded_for,
            use_forwarded,
            wallets,
            btc_explorer_url,
            eth_rpc_url: Secret::new(eth_rpc_url),
            price_api_url,
            usdc_contract,
            usdt_contract,
            btc_confirmations,
            eth_confirmations,
            price_tolerance,
            poll_interval,
            payment_window,
            lookback_blocks,
            btc_tx_limit,
            expected_usd,
            rate_limit_per_minute,
            disable_http,
        }
    }

    /// Checks the settings that have no sensible default. A failure here must stop the server.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.wallets.btc.is_none() {
            return Err(ServerError::ConfigurationError("RPG_WALLET_BTC must be set".into()));
        }
        match self.wallets.eth.as_deref() {
            None => return Err(ServerError::ConfigurationError("RPG_WALLET_ETH must be set".into())),
            Some(wallet) => {
                normalize_address(wallet).map_err(|e| ServerError::ConfigurationError(format!("RPG_WALLET_ETH: {e}")))?;
            },
        }
        if self.expected_usd <= Decimal::ZERO {
            return Err(ServerError::ConfigurationError(format!(
                "RPG_EXPECTED_USD must be positive, but is {}",
                self.expected_usd
            )));
        }
        if self.price_tolerance.is_sign_negative() {
            return Err(ServerError::ConfigurationError(format!(
                "RPG_PRICE_TOLERANCE cannot be negative, but is {}",
                self.price_tolerance
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(ServerError::ConfigurationError("RPG_POLL_INTERVAL must be at least one second".into()));
        }
        if self.payment_window <= chrono::Duration::zero() {
            return Err(ServerError::ConfigurationError("RPG_PAYMENT_WINDOW_HOURS must be at least one hour".into()));
        }
        Ok(())
    }

    pub fn match_policy(&self) -> MatchPolicy {
        MatchPolicy { volatile_tolerance: self.price_tolerance, ..Default::default() }
    }

    pub fn reconciliation_settings(&self) -> ReconciliationSettings {
        ReconciliationSettings { payment_window: self.payment_window, lookback_blocks: self.lookback_blocks }
    }

    /// Builds one scanner per on-chain asset. ETH, USDC and USDT share a single RPC client.
    pub fn scanner_set(&self) -> Result<ScannerSet, ServerError> {
        let btc_wallet = required(&self.wallets.btc, "RPG_WALLET_BTC")?;
        let eth_wallet = required(&self.wallets.eth, "RPG_WALLET_ETH")?;
        let eth_wallet = normalize_address(eth_wallet)
            .map_err(|e| ServerError::ConfigurationError(format!("RPG_WALLET_ETH: {e}")))?;
        let eth_wallet = eth_wallet.as_str();
        let init_error = |e: ScannerError| ServerError::InitializeError(e.to_string());
        let btc = UtxoExplorerScanner::new(&self.btc_explorer_url, self.btc_tx_limit, DEFAULT_RPC_TIMEOUT)
            .map_err(init_error)?;
        let rpc = JsonRpcClient::new(self.eth_rpc_url.clone()).map_err(init_error)?;
        let eth = NativeBlockScanner::new(rpc.clone());
        let usdc = TokenLogScanner::new(rpc.clone(), "USDC", &self.usdc_contract, Asset::Usdc.decimals())
            .map_err(|e| ServerError::ConfigurationError(format!("RPG_USDC_CONTRACT: {e}")))?;
        let usdt = TokenLogScanner::new(rpc, "USDT", &self.usdt_contract, Asset::Usdt.decimals())
            .map_err(|e| ServerError::ConfigurationError(format!("RPG_USDT_CONTRACT: {e}")))?;
        let eth_confs = self.eth_confirmations;
        let scanners = ScannerSet::<Scanner>::new()
            .with(Asset::Btc, ScannerEntry::new(btc.into(), btc_wallet, self.btc_confirmations))
            .with(Asset::Eth, ScannerEntry::new(eth.into(), eth_wallet, eth_confs))
            .with(Asset::Usdc, ScannerEntry::new(usdc.into(), eth_wallet, eth_confs))
            .with(Asset::Usdt, ScannerEntry::new(usdt.into(), eth_wallet, eth_confs));
        let assets = scanners.assets().map(|a| a.to_string()).collect::<Vec<_>>().join(", ");
        info!(
            "🪛️ Scanners configured for {assets}. BTC needs {} confirmations, the EVM assets need {eth_confs}",
            self.btc_confirmations
        );
        Ok(scanners)
    }

    pub fn price_oracle(&self) -> Result<CoinGeckoOracle, ServerError> {
        CoinGeckoOracle::new(&self.price_api_url, DEFAULT_RPC_TIMEOUT)
            .map_err(|e| ServerError::InitializeError(format!("Could not create the price client. {e}")))
    }
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, ServerError> {
    value.as_deref().ok_or_else(|| ServerError::ConfigurationError(format!("{name} must be set")))
}

fn non_empty_var(name: &str) -> Option<String> {
    let value = env::var(name).ok().map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    if value.is_none() {
        error!("🪛️ {name} is not set. The server cannot take payments without it.");
    }
    value
}

/// Reads and parses `name`, logging and falling back to `default` if it is missing or invalid.
fn env_or_default<T>(name: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    env::var(name)
        .map_err(|_| debug!("🪛️ {name} is not set. Using the default value of {default}."))
        .and_then(|s| {
            s.trim().parse::<T>().map_err(|e| {
                error!("🪛️ {s} is not a valid value for {name}. {e} Using the default, {default}, instead.")
            })
        })
        .unwrap_or(default)
}

/// Out-of-range values are clamped. Anything below one hour is then rejected by [`ServerConfig::validate`].
fn payment_window_hours(hours: i64) -> chrono::Duration {
    let clamped = hours.clamp(0, MAX_PAYMENT_WINDOW_HOURS);
    if clamped != hours {
        warn!("🪛️ A payment window of {hours} hours is out of range. Using {clamped} hours.");
    }
    chrono::Duration::hours(clamped)
}

fn default_decimal(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap_or_default()
}

//-------------------------------------------------  ServerOptions  ----------------------------------------------------
/// A subset of the server configuration that the request handlers need. Secrets are deliberately left out.
#[derive(Clone, Debug)]
pub struct ServerOptions {
    pub use_x_forwarded_for: bool,
    pub use_forwarded: bool,
    pub expected_usd: Decimal,
    pub wallets: CollectionWallets,
}

impl ServerOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            use_x_forwarded_for: config.use_x_forwarded_for,
            use_forwarded: config.use_forwarded,
            expected_usd: config.expected_usd,
            wallets: config.wallets.clone(),
        }
    }
}

#[cfg(test)]
mod test {
    use rust_decimal_macros::dec;

    use super::*;

    fn valid_config() -> ServerConfig {
        ServerConfig { wallets: CollectionWallets::new("bc1qcollect", ETH_WALLET), ..Default::default() }
    }

    const ETH_WALLET: &str = "0x00000000000000000000000000000000000000aa";

    #[test]
    fn defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8370);
        assert_eq!(config.expected_usd, dec!(29.00));
        assert_eq!(config.price_tolerance, dec!(0.02));
        assert_eq!(config.btc_confirmations, 6);
        assert_eq!(config.eth_confirmations, 12);
        assert_eq!(config.payment_window, chrono::Duration::hours(24));
        assert_eq!(config.match_policy().volatile_tolerance, dec!(0.02));
    }

    #[test]
    fn missing_wallets_are_fatal() {
        let config = ServerConfig::default();
        assert!(matches!(config.validate(), Err(ServerError::ConfigurationError(_))));
        let config = ServerConfig { wallets: CollectionWallets { btc: Some("bc1q".into()), eth: None }, ..config };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("RPG_WALLET_ETH"));
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn bad_prices_are_fatal() {
        let config = ServerConfig { expected_usd: Decimal::ZERO, ..valid_config() };
        assert!(config.validate().is_err());
        let config = ServerConfig { price_tolerance: dec!(-0.1), ..valid_config() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_eth_wallet_is_fatal() {
        for wallet in ["0xabc", "not-an-address", "0x00000000000000000000000000000000000000zz"] {
            let config = ServerConfig { wallets: CollectionWallets::new("bc1qcollect", wallet), ..valid_config() };
            let err = config.validate().unwrap_err();
            assert!(matches!(err, ServerError::ConfigurationError(_)), "{wallet}");
            assert!(err.to_string().contains("RPG_WALLET_ETH"), "{wallet}");
            assert!(config.scanner_set().is_err(), "{wallet}");
        }
    }

    #[test]
    fn eth_wallet_is_normalised_for_scanning() {
        let config = ServerConfig {
            wallets: CollectionWallets::new("bc1qcollect", "0X00000000000000000000000000000000000000AA"),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        let scanners = config.scanner_set().unwrap();
        assert_eq!(scanners.get(Asset::Usdc).unwrap().collection_address, ETH_WALLET);
    }

    #[test]
    fn payment_window_out_of_range() {
        assert_eq!(payment_window_hours(48), chrono::Duration::hours(48));
        assert_eq!(payment_window_hours(i64::MAX), chrono::Duration::hours(MAX_PAYMENT_WINDOW_HOURS));
        let config = ServerConfig { payment_window: payment_window_hours(-5), ..valid_config() };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("RPG_PAYMENT_WINDOW_HOURS"));
        let config = ServerConfig { payment_window: payment_window_hours(0), ..valid_config() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn tokens_share_the_eth_wallet() {
        let wallets = CollectionWallets::new("bc1qcollect", ETH_WALLET);
        assert_eq!(wallets.address_for(Asset::Btc), Some("bc1qcollect"));
        assert_eq!(wallets.address_for(Asset::Usdt), Some(ETH_WALLET));
        assert_eq!(wallets.address_for(Asset::Card), None);
        assert_eq!(wallets.addresses().len(), 4);
    }

    #[test]
    fn every_on_chain_asset_gets_a_scanner() {
        let scanners = valid_config().scanner_set().unwrap();
        assert_eq!(scanners.len(), 4);
        assert_eq!(scanners.get(Asset::Usdc).unwrap().required_confirmations, 12);
        assert_eq!(scanners.get(Asset::Btc).unwrap().collection_address, "bc1qcollect");
        assert!(scanners.get(Asset::Card).is_none());
    }

    #[test]
    fn invalid_contract_is_a_configuration_error() {
        let config = ServerConfig { usdt_contract: "not-an-address".into(), ..valid_config() };
        let err = config.scanner_set().err().expect("contract should be rejected");
        assert!(err.to_string().contains("RPG_USDT_CONTRACT"));
    }
}
