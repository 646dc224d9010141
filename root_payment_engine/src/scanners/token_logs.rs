use std::collections::HashMap;

use chrono::{DateTime, Utc};
use log::*;
use serde_json::json;

use super::{
    evm_rpc::{
        address_topic,
        normalize_address,
        parse_quantity,
        parse_uint256,
        to_quantity,
        to_units,
        JsonRpcClient,
        RpcLog,
    },
    native_blocks::parse_timestamp,
};
use crate::{
    db_types::ObservedTransfer,
    traits::{ChainScanner, ScannerError},
};

/// `keccak256("Transfer(address,address,uint256)")`
pub const ERC20_TRANSFER_TOPIC: &str = "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

/// Finds ERC-20 payments by querying the token contract's `Transfer` logs addressed to the collection wallet.
#[derive(Clone)]
pub struct TokenLogScanner {
    rpc: JsonRpcClient,
    symbol: String,
    contract: String,
    decimals: u32,
}

impl TokenLogScanner {
    pub fn new(rpc: JsonRpcClient, symbol: &str, contract: &str, decimals: u32) -> Result<Self, ScannerError> {
        let contract = normalize_address(contract)?;
        Ok(Self { rpc, symbol: symbol.to_string(), contract, decimals })
    }

    async fn block_timestamp(
        &self,
        block: u64,
        cache: &mut HashMap<u64, DateTime<Utc>>,
    ) -> Result<DateTime<Utc>, ScannerError> {
        if let Some(ts) = cache.get(&block) {
            return Ok(*ts);
        }
        let header = self
            .rpc
            .block_by_number(block, false)
            .await?
            .ok_or_else(|| ScannerError::MalformedResponse(format!("Block {block} not found")))?;
        let ts = parse_timestamp(&header.timestamp)?;
        cache.insert(block, ts);
        Ok(ts)
    }
}

impl ChainScanner for TokenLogScanner {
    fn name(&self) -> &str {
        self.symbol.as_str()
    }

    async fn list_incoming(
        &self,
        collection_address: &str,
        lookback: u64,
    ) -> Result<Vec<ObservedTransfer>, ScannerError> {
        let recipient = address_topic(collection_address)?;
        let tip = self.rpc.block_number().await?;
        let start = tip.saturating_sub(lookback);
        let filter = json!({
            "fromBlock": to_quantity(start),
            "toBlock": to_quantity(tip),
            "address": self.contract,
            "topics": [ERC20_TRANSFER_TOPIC, null, recipient],
        });
        debug!("🔍️ Fetching {} transfer logs for blocks {start}..={tip}", self.symbol);
        let logs = self.rpc.logs(filter).await?;
        let mut timestamps = HashMap::new();
        let mut transfers = Vec::with_capacity(logs.len());
        for log in logs {
            let Some(pending) = decode_transfer_log(&log, self.decimals, tip)? else {
                continue;
            };
            let timestamp = match pending.timestamp {
                Some(ts) => ts,
                None => self.block_timestamp(pending.block, &mut timestamps).await?,
            };
            transfers.push(ObservedTransfer::new(pending.tx_hash, pending.amount, pending.confirmations, timestamp));
        }
        debug!("🔍️ Found {} {} transfers to {collection_address}", transfers.len(), self.symbol);
        Ok(transfers)
    }
}

/// A decoded transfer log whose timestamp may still need to be looked up from the block header.
#[derive(Debug)]
pub(crate) struct DecodedLog {
    pub tx_hash: String,
    pub block: u64,
    pub amount: rust_decimal::Decimal,
    pub confirmations: u64,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Returns `None` for logs that cannot represent a settled payment (removed by a reorg, still pending, or zero value).
pub(crate) fn decode_transfer_log(log: &RpcLog, decimals: u32, tip: u64) -> Result<Option<DecodedLog>, ScannerError> {
    if log.removed {
        trace!("🔍️ Ignoring log removed by a reorg");
        return Ok(None);
    }
    let (Some(tx_hash), Some(block)) = (&log.transaction_hash, &log.block_number) else {
        return Ok(None);
    };
    let block = parse_quantity(block)?;
    let raw = parse_uint256(&log.data)?;
    if raw == 0 {
        return Ok(None);
    }
    let amount = to_units(raw, decimals)?;
    let timestamp = log.block_timestamp.as_deref().map(parse_timestamp).transpose()?;
    Ok(Some(DecodedLog {
        tx_hash: tx_hash.clone(),
        block,
        amount,
        confirmations: tip.saturating_sub(block),
        timestamp,
    }))
}

#[cfg(test)]
mod test {
    use rust_decimal_macros::dec;

    use super::*;

    fn log(value: serde_json::Value) -> RpcLog {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn decodes_six_decimal_amounts() {
        let l = log(json!({
            "transactionHash": "0xusdc",
            "blockNumber": "0x3e8",
            "data": "0x0000000000000000000000000000000000000000000000000000000001c09bc0",
            "topics": [ERC20_TRANSFER_TOPIC],
            "blockTimestamp": "0x67c2f6c0"
        }));
        let decoded = decode_transfer_log(&l, 6, 1012).unwrap().unwrap();
        assert_eq!(decoded.tx_hash, "0xusdc");
        assert_eq!(decoded.amount, dec!(29.4));
        assert_eq!(decoded.confirmations, 12);
        assert_eq!(decoded.timestamp.unwrap().timestamp(), 0x67c2f6c0);
    }

    #[test]
    fn missing_timestamps_are_left_for_the_header_lookup() {
        let l = log(json!({
            "transactionHash": "0xusdt",
            "blockNumber": "0x10",
            "data": "0x01",
            "topics": []
        }));
        let decoded = decode_transfer_log(&l, 6, 16).unwrap().unwrap();
        assert!(decoded.timestamp.is_none());
        assert_eq!(decoded.amount, dec!(0.000001));
        assert_eq!(decoded.confirmations, 0);
    }

    #[test]
    fn removed_and_pending_logs_are_skipped() {
        let removed = log(json!({
            "transactionHash": "0xa", "blockNumber": "0x10", "data": "0x01", "removed": true
        }));
        assert!(decode_transfer_log(&removed, 6, 20).unwrap().is_none());
        let pending = log(json!({ "transactionHash": null, "blockNumber": null, "data": "0x01" }));
        assert!(decode_transfer_log(&pending, 6, 20).unwrap().is_none());
    }
}
