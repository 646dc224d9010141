use std::collections::BTreeMap;

use root_payment_engine::{db_types::Asset, PurchaseRequestView};
use serde::{Deserialize, Serialize};

/// The body of `POST /api/payment/create`.
///
/// `asset` is kept as a string so that unknown symbols are reported as a bad request rather than a deserialization
/// failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRequestParams {
    pub root: i64,
    pub asset: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateRequestResponse {
    #[serde(flatten)]
    pub request: PurchaseRequestView,
    /// Where to send the payment for this request
    pub pay_to: String,
    pub wallet_addresses: BTreeMap<Asset, String>,
}
