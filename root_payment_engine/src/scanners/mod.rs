//! Chain scanners.
//!
//! There are three kinds, one per way of observing payments:
//! * [`UtxoExplorerScanner`] reads an address history from a block explorer (BTC).
//! * [`NativeBlockScanner`] walks recent EVM blocks looking for value transfers (ETH).
//! * [`TokenLogScanner`] queries ERC-20 `Transfer` logs (USDC, USDT).
//!
//! The reconciliation engine looks scanners up by asset in a [`ScannerSet`], which also carries the collection address
//! and confirmation threshold for that asset.
use std::collections::HashMap;

use crate::{
    db_types::{Asset, ObservedTransfer},
    traits::{ChainScanner, ScannerError},
};

pub mod evm_rpc;
mod native_blocks;
mod token_logs;
mod utxo_explorer;

pub use evm_rpc::JsonRpcClient;
pub use native_blocks::NativeBlockScanner;
pub use token_logs::{TokenLogScanner, ERC20_TRANSFER_TOPIC};
pub use utxo_explorer::{UtxoExplorerScanner, DEFAULT_EXPLORER_URL, DEFAULT_TX_LIMIT};

#[derive(Clone)]
pub enum Scanner {
    Utxo(UtxoExplorerScanner),
    Native(NativeBlockScanner),
    Token(TokenLogScanner),
}

impl ChainScanner for Scanner {
    fn name(&self) -> &str {
        match self {
            Scanner::Utxo(s) => s.name(),
            Scanner::Native(s) => s.name(),
            Scanner::Token(s) => s.name(),
        }
    }

    async fn list_incoming(
        &self,
        collection_address: &str,
        lookback: u64,
    ) -> Result<Vec<ObservedTransfer>, ScannerError> {
        match self {
            Scanner::Utxo(s) => s.list_incoming(collection_address, lookback).await,
            Scanner::Native(s) => s.list_incoming(collection_address, lookback).await,
            Scanner::Token(s) => s.list_incoming(collection_address, lookback).await,
        }
    }
}

impl From<UtxoExplorerScanner> for Scanner {
    fn from(s: UtxoExplorerScanner) -> Self {
        Scanner::Utxo(s)
    }
}

impl From<NativeBlockScanner> for Scanner {
    fn from(s: NativeBlockScanner) -> Self {
        Scanner::Native(s)
    }
}

impl From<TokenLogScanner> for Scanner {
    fn from(s: TokenLogScanner) -> Self {
        Scanner::Token(s)
    }
}

/// Everything the engine needs to reconcile one asset.
#[derive(Clone)]
pub struct ScannerEntry<S> {
    pub scanner: S,
    pub collection_address: String,
    /// A bound transfer confirms its request once it is at least this deep
    pub required_confirmations: u64,
}

impl<S> ScannerEntry<S> {
    pub fn new<A: Into<String>>(scanner: S, collection_address: A, required_confirmations: u64) -> Self {
        Self { scanner, collection_address: collection_address.into(), required_confirmations }
    }
}

/// Maps each on-chain asset to its scanner. Assets without an entry are never reconciled.
#[derive(Clone)]
pub struct ScannerSet<S = Scanner> {
    entries: HashMap<Asset, ScannerEntry<S>>,
}

impl<S> Default for ScannerSet<S> {
    fn default() -> Self {
        Self { entries: HashMap::new() }
    }
}

impl<S: ChainScanner> ScannerSet<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the scanner for `asset`.
    pub fn with(mut self, asset: Asset, entry: ScannerEntry<S>) -> Self {
        self.entries.insert(asset, entry);
        self
    }

    pub fn get(&self, asset: Asset) -> Option<&ScannerEntry<S>> {
        self.entries.get(&asset)
    }

    pub fn assets(&self) -> impl Iterator<Item = Asset> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
