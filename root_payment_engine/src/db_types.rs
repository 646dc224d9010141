use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Duration, Utc};
pub use rpg_common::Asset;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;
use uuid::Uuid;

//--------------------------------------       RequestId       ---------------------------------------------------------
/// The opaque identifier of a purchase request. Generated once at creation and never changed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

#[derive(Debug, Clone, Error)]
#[error("Invalid purchase request id: {0}")]
pub struct RequestIdError(String);

impl RequestId {
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for RequestId {
    type Err = RequestIdError;

    /// Only canonical UUIDs are accepted, so that arbitrary strings from the outside world never reach a query.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(|id| Self(id.hyphenated().to_string()))
            .map_err(|e| RequestIdError(format!("{s}. {e}")))
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

//--------------------------------------     RequestStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// Waiting for a matching transfer, or for a bound transfer to gather enough confirmations.
    Pending,
    /// A matching transfer reached the confirmation threshold. The root is claimed.
    Confirmed,
    /// Post-confirmation issuance has finished and a certificate has been recorded.
    Complete,
    /// The matching window elapsed without a confirmed payment. Usually derived when the request is read.
    Expired,
}

impl RequestStatus {
    /// `true` for the states that represent a successful claim on the root.
    pub fn is_claimed(&self) -> bool {
        matches!(self, RequestStatus::Confirmed | RequestStatus::Complete)
    }
}

impl Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestStatus::Pending => write!(f, "pending"),
            RequestStatus::Confirmed => write!(f, "confirmed"),
            RequestStatus::Complete => write!(f, "complete"),
            RequestStatus::Expired => write!(f, "expired"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid request status: {0}")]
pub struct ConversionError(String);

impl FromStr for RequestStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "complete" => Ok(Self::Complete),
            "expired" => Ok(Self::Expired),
            s => Err(ConversionError(s.to_string())),
        }
    }
}

//--------------------------------------   PurchaseRequest     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRequest {
    pub id: RequestId,
    /// The root (namespace slot) being purchased
    pub root: i64,
    pub asset: Asset,
    /// The fiat price owed, fixed at creation
    pub expected_usd: Decimal,
    pub status: RequestStatus,
    /// The transfer credited to this request. Once set, it never changes.
    pub tx_hash: Option<String>,
    /// The deepest confirmation count observed for `tx_hash`
    pub confirmations: u64,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    /// Set by downstream issuance once the request is complete
    pub certificate_hash: Option<String>,
}

impl PurchaseRequest {
    /// The moment a pending request stops being eligible for matching.
    pub fn expires_at(&self, window: Duration) -> DateTime<Utc> {
        self.created_at + window
    }

    /// The status as seen by readers. Pending requests older than the matching window are reported as expired,
    /// without the stored record being changed.
    pub fn effective_status(&self, window: Duration, now: DateTime<Utc>) -> RequestStatus {
        match self.status {
            RequestStatus::Pending if now > self.expires_at(window) => RequestStatus::Expired,
            s => s,
        }
    }

    pub fn is_claimed(&self) -> bool {
        self.status.is_claimed()
    }
}

//--------------------------------------  NewPurchaseRequest   ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPurchaseRequest {
    pub root: i64,
    pub asset: Asset,
    pub expected_usd: Decimal,
}

impl NewPurchaseRequest {
    pub fn new(root: i64, asset: Asset, expected_usd: Decimal) -> Self {
        Self { root, asset, expected_usd }
    }
}

//--------------------------------------   ObservedTransfer    ---------------------------------------------------------
/// An incoming transfer to a collection address, as reported by a chain scanner during one reconciliation cycle.
///
/// `amount` is in whole units of the asset (BTC, ETH, USDC...), not in satoshi or wei.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedTransfer {
    pub tx_hash: String,
    pub amount: Decimal,
    pub confirmations: u64,
    pub timestamp: DateTime<Utc>,
}

impl ObservedTransfer {
    pub fn new<S: Into<String>>(tx_hash: S, amount: Decimal, confirmations: u64, timestamp: DateTime<Utc>) -> Self {
        Self { tx_hash: tx_hash.into(), amount, confirmations, timestamp }
    }
}
