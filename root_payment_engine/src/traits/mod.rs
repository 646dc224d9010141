//! # Engine contracts
//!
//! The reconciliation engine is written against three capabilities, so that any backend or data source can be swapped
//! in (and so that tests can use in-memory fakes):
//!
//! * [`RequestStore`] is the durable store of purchase requests. It is the single source of truth for whether a root
//!   has been claimed and whether a transfer has already been credited.
//! * [`ChainScanner`] lists the recent incoming transfers to a collection address on one chain.
//! * [`PriceOracle`] quotes the current USD price of an asset.
mod chain_scanner;
mod price_oracle;
mod request_store;

pub use chain_scanner::{ChainScanner, ScannerError};
pub use price_oracle::{PriceOracle, PriceSnapshot};
pub use request_store::{InsertConfirmedResult, RequestStore, RequestStoreError};
