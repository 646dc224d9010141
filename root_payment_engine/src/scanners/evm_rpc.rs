//! A small Ethereum JSON-RPC client, covering just the calls the EVM scanners need.
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use log::*;
use reqwest::Client;
use rpg_common::Secret;
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};

use crate::traits::ScannerError;

pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Clone)]
pub struct JsonRpcClient {
    // RPC URLs frequently embed an API key
    url: Secret<String>,
    client: Arc<Client>,
    next_id: Arc<AtomicU64>,
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcBlock {
    pub number: String,
    pub timestamp: String,
    #[serde(default)]
    pub transactions: Vec<RpcTransaction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcTransaction {
    pub hash: String,
    #[serde(default)]
    pub to: Option<String>,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLog {
    pub transaction_hash: Option<String>,
    pub block_number: Option<String>,
    pub data: String,
    #[serde(default)]
    pub topics: Vec<String>,
    /// Not part of the original API, but returned by most modern nodes
    #[serde(default)]
    pub block_timestamp: Option<String>,
    #[serde(default)]
    pub removed: bool,
}

impl JsonRpcClient {
    pub fn new(url: Secret<String>) -> Result<Self, ScannerError> {
        Self::with_timeout(url, DEFAULT_RPC_TIMEOUT)
    }

    pub fn with_timeout(url: Secret<String>, timeout: Duration) -> Result<Self, ScannerError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| ScannerError::Network(e.to_string()))?;
        Ok(Self { url, client: Arc::new(client), next_id: Arc::new(AtomicU64::new(1)) })
    }

    /// Sends a single JSON-RPC call. `T` may be an `Option` for methods that return `null` when nothing is found.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, ScannerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = RpcRequest { jsonrpc: "2.0", id, method, params };
        trace!("🔍️ RPC #{id} {method}");
        let response = self.client.post(self.url.reveal().as_str()).json(&body).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ScannerError::QueryError { status, message });
        }
        let response = response.json::<RpcResponse>().await?;
        if let Some(err) = response.error {
            return Err(ScannerError::Rpc { code: err.code, message: err.message });
        }
        let result = response.result.unwrap_or(Value::Null);
        serde_json::from_value(result).map_err(|e| ScannerError::MalformedResponse(format!("{method}: {e}")))
    }

    pub async fn block_number(&self) -> Result<u64, ScannerError> {
        let tip: String = self.call("eth_blockNumber", json!([])).await?;
        parse_quantity(&tip)
    }

    /// Fetches a block, with full transaction objects if `full` is set.
    pub async fn block_by_number(&self, number: u64, full: bool) -> Result<Option<RpcBlock>, ScannerError> {
        self.call("eth_getBlockByNumber", json!([to_quantity(number), full])).await
    }

    pub async fn logs(&self, filter: Value) -> Result<Vec<RpcLog>, ScannerError> {
        self.call("eth_getLogs", json!([filter])).await
    }
}

pub fn to_quantity(n: u64) -> String {
    format!("{n:#x}")
}

/// Parses a hex-encoded JSON-RPC quantity such as `0x1b4`.
pub fn parse_quantity(s: &str) -> Result<u64, ScannerError> {
    let digits = strip_hex_prefix(s);
    if digits.is_empty() {
        return Err(ScannerError::MalformedResponse(format!("Empty quantity: {s}")));
    }
    u64::from_str_radix(digits, 16).map_err(|e| ScannerError::MalformedResponse(format!("Invalid quantity {s}: {e}")))
}

/// Parses a hex-encoded unsigned integer of up to 256 bits. Values that do not fit in 128 bits are rejected.
pub fn parse_uint256(s: &str) -> Result<u128, ScannerError> {
    let digits = strip_hex_prefix(s);
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(0);
    }
    if digits.len() > 32 {
        return Err(ScannerError::MalformedResponse(format!("Integer out of range: {s}")));
    }
    u128::from_str_radix(digits, 16).map_err(|e| ScannerError::MalformedResponse(format!("Invalid integer {s}: {e}")))
}

/// Converts a raw integer amount to whole units, e.g. wei to ETH with `decimals = 18`.
pub fn to_units(raw: u128, decimals: u32) -> Result<Decimal, ScannerError> {
    let raw = i128::try_from(raw).map_err(|_| ScannerError::MalformedResponse(format!("Amount out of range: {raw}")))?;
    Decimal::try_from_i128_with_scale(raw, decimals)
        .map(|d| d.normalize())
        .map_err(|e| ScannerError::MalformedResponse(format!("Amount out of range: {raw}. {e}")))
}

/// Normalises a 20-byte hex address to lowercase with a `0x` prefix.
pub fn normalize_address(address: &str) -> Result<String, ScannerError> {
    let digits = strip_hex_prefix(address.trim());
    match hex::decode(digits) {
        Ok(bytes) if bytes.len() == 20 => Ok(format!("0x{}", hex::encode(bytes))),
        _ => Err(ScannerError::InvalidAddress(address.to_string())),
    }
}

/// The 32-byte topic encoding of an address, as used for indexed event arguments.
pub fn address_topic(address: &str) -> Result<String, ScannerError> {
    let address = normalize_address(address)?;
    Ok(format!("0x{:0>64}", strip_hex_prefix(&address)))
}

fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s)
}
