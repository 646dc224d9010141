use std::collections::HashMap;

use chrono::Duration;
use thiserror::Error;

use crate::db_types::{NewPurchaseRequest, PurchaseRequest, RequestId, RequestStatus};

#[derive(Debug, Clone, Error)]
pub enum RequestStoreError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Root {0} has already been claimed.")]
    RootAlreadyClaimed(i64),
    #[error("Purchase request {0} does not exist.")]
    RequestNotFound(RequestId),
    #[error("Transfer {0} has already been credited to another request.")]
    TransferAlreadyBound(String),
    #[error("Request {id} is bound to transfer {existing} and cannot be rebound to {requested}.")]
    TransferRebind { id: RequestId, existing: String, requested: String },
    #[error("Request {id} cannot move from {from} to {to}.")]
    InvalidTransition { id: RequestId, from: RequestStatus, to: RequestStatus },
    #[error("Stored purchase request is corrupt. {0}")]
    CorruptRecord(String),
}

impl RequestStoreError {
    /// Conflicts are data-invariant violations: the caller asked for something that would break root or transfer
    /// uniqueness, or move a request backwards. They are never retried.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::RootAlreadyClaimed(_) |
                Self::TransferAlreadyBound(_) |
                Self::TransferRebind { .. } |
                Self::InvalidTransition { .. }
        )
    }
}

impl From<sqlx::Error> for RequestStoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::ColumnDecode { index, source } => {
                Self::CorruptRecord(format!("Could not decode column {index}. {source}"))
            },
            e => Self::DatabaseError(e.to_string()),
        }
    }
}

/// The outcome of [`RequestStore::insert_confirmed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertConfirmedResult {
    Inserted(PurchaseRequest),
    AlreadyExists(PurchaseRequest),
}

impl InsertConfirmedResult {
    pub fn request(&self) -> &PurchaseRequest {
        match self {
            Self::Inserted(r) | Self::AlreadyExists(r) => r,
        }
    }

    pub fn into_request(self) -> PurchaseRequest {
        match self {
            Self::Inserted(r) | Self::AlreadyExists(r) => r,
        }
    }
}

/// The durable store for purchase requests.
///
/// Every method is atomic. Implementations must enforce the two global invariants themselves rather than relying on
/// callers:
/// * at most one request per root is ever `confirmed` or `complete`, and
/// * a transfer hash is bound to at most one request, and a bound hash is never replaced.
#[allow(async_fn_in_trait)]
pub trait RequestStore {
    /// Inserts a new `pending` request.
    ///
    /// Fails with [`RequestStoreError::RootAlreadyClaimed`] if a confirmed or complete request already exists for the
    /// root, regardless of the asset or amount of the new request.
    async fn create_request(&self, request: NewPurchaseRequest) -> Result<PurchaseRequest, RequestStoreError>;

    /// Fetches a request by id. Returns `None` if it does not exist.
    async fn fetch_request(&self, id: &RequestId) -> Result<Option<PurchaseRequest>, RequestStoreError>;

    /// Returns the confirmed or complete request for `root`, if the root has been claimed.
    async fn fetch_claim_for_root(&self, root: i64) -> Result<Option<PurchaseRequest>, RequestStoreError>;

    /// Returns all pending on-chain requests created within the trailing `window`, oldest first.
    ///
    /// Card requests are never returned. Older pending requests are left untouched.
    async fn list_eligible(&self, window: Duration) -> Result<Vec<PurchaseRequest>, RequestStoreError>;

    /// Returns every bound transfer hash, mapped to the request it was credited to.
    async fn fetch_bound_transfers(&self) -> Result<HashMap<String, RequestId>, RequestStoreError>;

    /// Records `tx_hash` against a pending request and raises its confirmation count to `confirmations`.
    ///
    /// The stored confirmation count never decreases. Rebinding a request to a different hash, or binding a hash that
    /// another request already holds, is rejected.
    async fn bind_transfer(
        &self,
        id: &RequestId,
        tx_hash: &str,
        confirmations: u64,
    ) -> Result<PurchaseRequest, RequestStoreError>;

    /// Moves a request from `pending` to `confirmed` and stamps `confirmed_at`.
    ///
    /// Fails if the request is not pending, or if another request for the same root has already been claimed.
    async fn confirm(&self, id: &RequestId) -> Result<PurchaseRequest, RequestStoreError>;

    /// Records the issued certificate and moves a request from `confirmed` to `complete`.
    async fn complete(&self, id: &RequestId, certificate_hash: &str) -> Result<PurchaseRequest, RequestStoreError>;

    /// Creates and confirms a request in one transaction. Used by the card payment path, where the processor has
    /// already settled the payment. `reference` (the processor's payment id) is stored as the transfer hash.
    ///
    /// Replaying the same `reference` for the same root returns the existing record as
    /// [`InsertConfirmedResult::AlreadyExists`].
    async fn insert_confirmed(
        &self,
        request: NewPurchaseRequest,
        reference: &str,
    ) -> Result<InsertConfirmedResult, RequestStoreError>;
}
