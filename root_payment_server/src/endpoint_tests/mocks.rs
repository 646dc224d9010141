use std::collections::HashMap;

use chrono::Duration;
use mockall::mock;
use root_payment_engine::{
    db_types::{NewPurchaseRequest, PurchaseRequest, RequestId},
    traits::{InsertConfirmedResult, RequestStore, RequestStoreError},
};

mock! {
    pub Store {}
    impl RequestStore for Store {
        async fn create_request(&self, request: NewPurchaseRequest) -> Result<PurchaseRequest, RequestStoreError>;
        async fn fetch_request(&self, id: &RequestId) -> Result<Option<PurchaseRequest>, RequestStoreError>;
        async fn fetch_claim_for_root(&self, root: i64) -> Result<Option<PurchaseRequest>, RequestStoreError>;
        async fn list_eligible(&self, window: Duration) -> Result<Vec<PurchaseRequest>, RequestStoreError>;
        async fn fetch_bound_transfers(&self) -> Result<HashMap<String, RequestId>, RequestStoreError>;
        async fn bind_transfer(&self, id: &RequestId, tx_hash: &str, confirmations: u64) -> Result<PurchaseRequest, RequestStoreError>;
        async fn confirm(&self, id: &RequestId) -> Result<PurchaseRequest, RequestStoreError>;
        async fn complete(&self, id: &RequestId, certificate_hash: &str) -> Result<PurchaseRequest, RequestStoreError>;
        async fn insert_confirmed(&self, request: NewPurchaseRequest, reference: &str) -> Result<InsertConfirmedResult, RequestStoreError>;
    }
}
