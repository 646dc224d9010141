use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::PurchaseRequest;

/// A purchase request as presented to readers: the status is the derived one, and the expiry time is included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRequestView {
    #[serde(flatten)]
    pub request: PurchaseRequest,
    pub expires_at: DateTime<Utc>,
}

impl PurchaseRequestView {
    pub fn new(mut request: PurchaseRequest, window: Duration, now: DateTime<Utc>) -> Self {
        let expires_at = request.expires_at(window);
        request.status = request.effective_status(window, now);
        Self { request, expires_at }
    }
}
