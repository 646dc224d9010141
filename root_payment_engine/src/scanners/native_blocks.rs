use chrono::{DateTime, Utc};
use log::*;

use super::evm_rpc::{normalize_address, parse_quantity, parse_uint256, to_units, JsonRpcClient, RpcBlock};
use crate::{
    db_types::{Asset, ObservedTransfer},
    traits::{ChainScanner, ScannerError},
};

/// Finds native ETH payments by walking every block in the trailing window and picking out the transactions sent to
/// the collection address.
#[derive(Clone)]
pub struct NativeBlockScanner {
    rpc: JsonRpcClient,
}

impl NativeBlockScanner {
    pub fn new(rpc: JsonRpcClient) -> Self {
        Self { rpc }
    }
}

impl ChainScanner for NativeBlockScanner {
    fn name(&self) -> &str {
        "ETH block scanner"
    }

    async fn list_incoming(
        &self,
        collection_address: &str,
        lookback: u64,
    ) -> Result<Vec<ObservedTransfer>, ScannerError> {
        let address = normalize_address(collection_address)?;
        let tip = self.rpc.block_number().await?;
        let start = tip.saturating_sub(lookback);
        debug!("🔍️ Scanning ETH blocks {start}..={tip} for payments to {address}");
        let mut transfers = Vec::new();
        for number in start..=tip {
            let Some(block) = self.rpc.block_by_number(number, true).await? else {
                debug!("🔍️ Block {number} is not available yet. Skipping it.");
                continue;
            };
            transfers.extend(transfers_in_block(&block, &address, tip)?);
        }
        debug!("🔍️ Found {} ETH transfers to {address}", transfers.len());
        Ok(transfers)
    }
}

/// Extracts the non-zero transfers to `address` (already normalised) from a block fetched with full transactions.
pub(crate) fn transfers_in_block(
    block: &RpcBlock,
    address: &str,
    tip: u64,
) -> Result<Vec<ObservedTransfer>, ScannerError> {
    let height = parse_quantity(&block.number)?;
    let timestamp = parse_timestamp(&block.timestamp)?;
    let confirmations = tip.saturating_sub(height);
    let mut result = Vec::new();
    for tx in &block.transactions {
        let to_us = tx.to.as_deref().is_some_and(|to| to.eq_ignore_ascii_case(address));
        if !to_us {
            continue;
        }
        let wei = parse_uint256(&tx.value)?;
        if wei == 0 {
            continue;
        }
        let amount = to_units(wei, Asset::Eth.decimals())?;
        trace!("🔍️ {amount} ETH to {address} in {} (block {height})", tx.hash);
        result.push(ObservedTransfer::new(tx.hash.as_str(), amount, confirmations, timestamp));
    }
    Ok(result)
}

pub(crate) fn parse_timestamp(quantity: &str) -> Result<DateTime<Utc>, ScannerError> {
    let secs = parse_quantity(quantity)?;
    i64::try_from(secs)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .ok_or_else(|| ScannerError::MalformedResponse(format!("Invalid block timestamp {quantity}")))
}
