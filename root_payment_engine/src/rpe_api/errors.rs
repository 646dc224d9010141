use thiserror::Error;

use crate::{
    db_types::{Asset, RequestId},
    traits::RequestStoreError,
};

/// Why a single request could not be reconciled. It never stops the rest of the cycle.
#[derive(Debug, Clone, Error)]
pub enum ReconciliationError {
    #[error("{0}")]
    Store(#[from] RequestStoreError),
    #[error("No scanner is configured for {0}")]
    UnsupportedAsset(Asset),
}

impl ReconciliationError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_conflict())
    }
}

#[derive(Debug, Clone, Error)]
pub enum PurchaseError {
    #[error("{0}")]
    Store(#[from] RequestStoreError),
    #[error("Root {root} is outside the sellable range {min}..={max}")]
    InvalidRoot { root: i64, min: i64, max: i64 },
    #[error("{0} payments cannot be requested here")]
    UnsupportedAsset(Asset),
    #[error("Invalid price: {0}")]
    InvalidPrice(String),
    #[error("Purchase request {0} does not exist.")]
    RequestNotFound(RequestId),
}

impl PurchaseError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_conflict())
    }
}
