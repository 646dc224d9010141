use std::{fmt::Debug, ops::RangeInclusive};

use chrono::{Duration, Utc};
use log::*;
use rust_decimal::Decimal;

use crate::{
    db_types::{Asset, NewPurchaseRequest, PurchaseRequest, RequestId},
    events::{EventProducers, RequestConfirmedEvent},
    rpe_api::{errors::PurchaseError, purchase_objects::PurchaseRequestView},
    traits::{InsertConfirmedResult, RequestStore},
};

/// The roots that can be bought.
pub const SELLABLE_ROOTS: RangeInclusive<i64> = 100..=999;

/// `PurchaseApi` manages purchase requests outside the reconciliation loop: opening them, reporting on them, recording
/// card payments, and marking them complete once downstream issuance is done.
pub struct PurchaseApi<B> {
    db: B,
    producers: EventProducers,
    payment_window: Duration,
}

impl<B> Debug for PurchaseApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PurchaseApi")
    }
}

impl<B> PurchaseApi<B> {
    pub fn new(db: B, producers: EventProducers, payment_window: Duration) -> Self {
        Self { db, producers, payment_window }
    }

    pub fn payment_window(&self) -> Duration {
        self.payment_window
    }
}

impl<B> PurchaseApi<B>
where B: RequestStore
{
    /// Opens a new pending request for `root`, payable in `asset`.
    ///
    /// Only on-chain assets can be requested here; card payments arrive already settled through
    /// [`Self::record_card_payment`].
    pub async fn create_request(
        &self,
        root: i64,
        asset: Asset,
        expected_usd: Decimal,
    ) -> Result<PurchaseRequestView, PurchaseError> {
        check_root(root)?;
        if !asset.is_on_chain() {
            return Err(PurchaseError::UnsupportedAsset(asset));
        }
        check_price(expected_usd)?;
        let request = self.db.create_request(NewPurchaseRequest::new(root, asset, expected_usd)).await?;
        info!("🔄️ New purchase request {} for root {root}. Expecting ${expected_usd} in {asset}", request.id);
        Ok(self.view(request))
    }

    /// Fetches a request with its status as seen right now.
    pub async fn request_status(&self, id: &RequestId) -> Result<PurchaseRequestView, PurchaseError> {
        let request = self.db.fetch_request(id).await?.ok_or_else(|| PurchaseError::RequestNotFound(id.clone()))?;
        Ok(self.view(request))
    }

    /// Returns the request holding the claim on `root`, if the root has been sold.
    pub async fn claim_for_root(&self, root: i64) -> Result<Option<PurchaseRequest>, PurchaseError> {
        let claim = self.db.fetch_claim_for_root(root).await?;
        Ok(claim)
    }

    /// Records a settled card payment for `root` as a confirmed request. `reference` is the processor's payment id.
    ///
    /// Replaying a payment that was already recorded is harmless; the existing record is returned and no event is
    /// published.
    pub async fn record_card_payment(
        &self,
        root: i64,
        expected_usd: Decimal,
        reference: &str,
    ) -> Result<PurchaseRequest, PurchaseError> {
        check_root(root)?;
        check_price(expected_usd)?;
        let request = NewPurchaseRequest::new(root, Asset::Card, expected_usd);
        match self.db.insert_confirmed(request, reference).await? {
            InsertConfirmedResult::Inserted(request) => {
                info!("🔄️ Card payment {reference} claimed root {root} with request {}", request.id);
                self.producers.publish_request_confirmed(RequestConfirmedEvent::new(request.clone())).await;
                Ok(request)
            },
            InsertConfirmedResult::AlreadyExists(request) => {
                debug!("🔄️ Card payment {reference} was already recorded as request {}", request.id);
                Ok(request)
            },
        }
    }

    /// Records the issued certificate against a confirmed request.
    pub async fn mark_complete(&self, id: &RequestId, certificate_hash: &str) -> Result<PurchaseRequest, PurchaseError> {
        let request = self.db.complete(id, certificate_hash).await?;
        info!("🔄️ Request {id} for root {} is complete", request.root);
        Ok(request)
    }

    fn view(&self, request: PurchaseRequest) -> PurchaseRequestView {
        PurchaseRequestView::new(request, self.payment_window, Utc::now())
    }
}

fn check_root(root: i64) -> Result<(), PurchaseError> {
    if SELLABLE_ROOTS.contains(&root) {
        Ok(())
    } else {
        Err(PurchaseError::InvalidRoot { root, min: *SELLABLE_ROOTS.start(), max: *SELLABLE_ROOTS.end() })
    }
}

fn check_price(expected_usd: Decimal) -> Result<(), PurchaseError> {
    if expected_usd > Decimal::ZERO {
        Ok(())
    } else {
        Err(PurchaseError::InvalidPrice(format!("{expected_usd} is not a positive dollar amount")))
    }
}
