use thiserror::Error;

use crate::db_types::ObservedTransfer;

#[derive(Debug, Clone, Error)]
pub enum ScannerError {
    #[error("Service unreachable. {0}")]
    Unreachable(String),
    #[error("Request failed. {0}")]
    Network(String),
    #[error("Malformed response. {0}")]
    MalformedResponse(String),
    #[error("Query failed. Error {status}. {message}")]
    QueryError { status: u16, message: String },
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

impl From<reqwest::Error> for ScannerError {
    fn from(e: reqwest::Error) -> Self {
        // Endpoint URLs may carry API keys
        let e = e.without_url();
        if e.is_decode() {
            Self::MalformedResponse(e.to_string())
        } else if e.is_connect() || e.is_timeout() {
            Self::Unreachable(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

/// Lists recent inbound transfers to a collection address on one chain.
///
/// `lookback` is the depth of the trailing window, in blocks. Transfers mined deeper than that are not reported.
/// Scanners report failures as errors; it is the caller's job to degrade them to "no transfers this cycle".
#[allow(async_fn_in_trait)]
pub trait ChainScanner {
    /// A short label for log messages
    fn name(&self) -> &str;

    async fn list_incoming(
        &self,
        collection_address: &str,
        lookback: u64,
    ) -> Result<Vec<ObservedTransfer>, ScannerError>;
}
