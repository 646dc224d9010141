use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{Asset, PurchaseRequest, RequestId};

/// Published once a purchase request reaches `confirmed` and its root is claimed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestConfirmedEvent {
    pub request: PurchaseRequest,
}

impl RequestConfirmedEvent {
    pub fn new(request: PurchaseRequest) -> Self {
        Self { request }
    }

    pub fn id(&self) -> &RequestId {
        &self.request.id
    }

    pub fn root(&self) -> i64 {
        self.request.root
    }

    pub fn asset(&self) -> Asset {
        self.request.asset
    }

    /// When the confirmation was stamped. Falls back to the creation time for records that predate `confirmed_at`.
    pub fn confirmed_at(&self) -> DateTime<Utc> {
        self.request.confirmed_at.unwrap_or(self.request.created_at)
    }
}
