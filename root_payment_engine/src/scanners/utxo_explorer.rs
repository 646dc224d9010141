use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use log::*;
use reqwest::Client;
use serde::Deserialize;

use super::evm_rpc::to_units;
use crate::{
    db_types::{Asset, ObservedTransfer},
    traits::{ChainScanner, ScannerError},
};

pub const DEFAULT_EXPLORER_URL: &str = "https://blockchain.info";
pub const DEFAULT_TX_LIMIT: u32 = 50;

/// Finds BTC payments using a blockchain.info-style explorer API.
///
/// Only the most recent `tx_limit` transactions on the address are inspected, so on a busy wallet an old payment can
/// fall off the end of the list before it is matched.
#[derive(Clone)]
pub struct UtxoExplorerScanner {
    base_url: String,
    tx_limit: u32,
    client: Arc<Client>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddressHistory {
    #[serde(default)]
    pub n_tx: u64,
    #[serde(default)]
    pub txs: Vec<ExplorerTx>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExplorerTx {
    pub hash: String,
    pub time: i64,
    /// Absent (or null) while the transaction sits in the mempool
    #[serde(default)]
    pub block_height: Option<u64>,
    #[serde(default)]
    pub out: Vec<ExplorerOutput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExplorerOutput {
    #[serde(default)]
    pub addr: Option<String>,
    /// In satoshi
    pub value: u64,
}

impl UtxoExplorerScanner {
    pub fn new(base_url: &str, tx_limit: u32, timeout: Duration) -> Result<Self, ScannerError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| ScannerError::Network(e.to_string()))?;
        let base_url = base_url.trim_end_matches('/').to_string();
        Ok(Self { base_url, tx_limit, client: Arc::new(client) })
    }

    async fn address_history(&self, address: &str) -> Result<AddressHistory, ScannerError> {
        let url = format!("{}/rawaddr/{address}", self.base_url);
        let response = self.client.get(url).query(&[("limit", self.tx_limit)]).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ScannerError::QueryError { status, message });
        }
        Ok(response.json::<AddressHistory>().await?)
    }

    async fn tip_height(&self) -> Result<u64, ScannerError> {
        let url = format!("{}/q/getblockcount", self.base_url);
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(ScannerError::QueryError { status, message: "getblockcount failed".into() });
        }
        let body = response.text().await?;
        body.trim().parse::<u64>().map_err(|e| ScannerError::MalformedResponse(format!("Block count {body}: {e}")))
    }
}

impl ChainScanner for UtxoExplorerScanner {
    fn name(&self) -> &str {
        "BTC explorer"
    }

    async fn list_incoming(
        &self,
        collection_address: &str,
        lookback: u64,
    ) -> Result<Vec<ObservedTransfer>, ScannerError> {
        let history = self.address_history(collection_address).await?;
        let tip = match self.tip_height().await {
            Ok(tip) => Some(tip),
            Err(e) => {
                warn!("🔍️ Could not fetch the BTC tip height. Falling back to list-position confirmations. {e}");
                None
            },
        };
        let transfers = extract_transfers(&history, collection_address, tip, lookback)?;
        debug!("🔍️ Found {} BTC transfers to {collection_address}", transfers.len());
        Ok(transfers)
    }
}

/// Turns an address history into one transfer per output paying `address`.
///
/// With a known `tip`, confirmations are `tip - block_height` and transactions mined deeper than `lookback` are
/// dropped. Without it, the position in the (newest first) list stands in for depth.
pub fn extract_transfers(
    history: &AddressHistory,
    address: &str,
    tip: Option<u64>,
    lookback: u64,
) -> Result<Vec<ObservedTransfer>, ScannerError> {
    let mut result = Vec::new();
    for (index, tx) in history.txs.iter().enumerate() {
        let confirmations = match (tx.block_height, tip) {
            (None, _) => 0,
            (Some(height), Some(tip)) => tip.saturating_sub(height),
            (Some(_), None) => history.n_tx.saturating_sub(index as u64),
        };
        if tip.is_some() && confirmations > lookback {
            trace!("🔍️ {} is {confirmations} blocks deep. Outside the lookback window.", tx.hash);
            continue;
        }
        let timestamp = DateTime::<Utc>::from_timestamp(tx.time, 0)
            .ok_or_else(|| ScannerError::MalformedResponse(format!("Invalid time {} on {}", tx.time, tx.hash)))?;
        for output in tx.out.iter().filter(|o| o.addr.as_deref() == Some(address)) {
            let amount = to_units(u128::from(output.value), Asset::Btc.decimals())?;
            result.push(ObservedTransfer::new(tx.hash.as_str(), amount, confirmations, timestamp));
        }
    }
    Ok(result)
}
