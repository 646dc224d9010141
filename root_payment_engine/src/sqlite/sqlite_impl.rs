//! `SqliteDatabase` is a concrete implementation of a root payment engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements [`RequestStore`].
use std::{collections::HashMap, fmt::Debug};

use chrono::{Duration, DurationRound, Utc};
use log::*;
use sqlx::{migrate::MigrateError, SqliteConnection, SqlitePool};

use super::db::{db_url, new_pool, requests};
use crate::{
    db_types::{NewPurchaseRequest, PurchaseRequest, RequestId, RequestStatus},
    traits::{InsertConfirmedResult, RequestStore, RequestStoreError},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

/// Maps unique-index violations on the transfer hash to a conflict, and on the claimed-root index to a claimed root.
fn map_unique_violation(e: sqlx::Error, tx_hash: &str, root: i64) -> RequestStoreError {
    match &e {
        sqlx::Error::Database(err) if err.is_unique_violation() => {
            if err.message().contains("tx_hash") {
                RequestStoreError::TransferAlreadyBound(tx_hash.to_string())
            } else {
                RequestStoreError::RootAlreadyClaimed(root)
            }
        },
        _ => RequestStoreError::from(e),
    }
}

/// Explains why a conditional update on `id` matched no rows.
async fn diagnose_failed_update(
    id: &RequestId,
    to: RequestStatus,
    expected: RequestStatus,
    conn: &mut SqliteConnection,
) -> RequestStoreError {
    match requests::fetch_request(id, conn).await {
        Ok(None) => RequestStoreError::RequestNotFound(id.clone()),
        Ok(Some(request)) if request.status != expected => {
            RequestStoreError::InvalidTransition { id: id.clone(), from: request.status, to }
        },
        Ok(Some(request)) => RequestStoreError::RootAlreadyClaimed(request.root),
        Err(e) => e.into(),
    }
}

impl RequestStore for SqliteDatabase {
    async fn create_request(&self, request: NewPurchaseRequest) -> Result<PurchaseRequest, RequestStoreError> {
        let mut conn = self.pool.acquire().await?;
        let id = RequestId::random();
        let now = now_secs();
        let created = requests::insert_request(&id, &request, now, &mut conn)
            .await?
            .ok_or(RequestStoreError::RootAlreadyClaimed(request.root))?;
        let (root, usd, asset) = (created.root, created.expected_usd, created.asset);
        debug!("🗃️ Purchase request {id} created for root {root} (${usd} in {asset})");
        Ok(created)
    }

    async fn fetch_request(&self, id: &RequestId) -> Result<Option<PurchaseRequest>, RequestStoreError> {
        let mut conn = self.pool.acquire().await?;
        let request = requests::fetch_request(id, &mut conn).await?;
        Ok(request)
    }

    async fn fetch_claim_for_root(&self, root: i64) -> Result<Option<PurchaseRequest>, RequestStoreError> {
        let mut conn = self.pool.acquire().await?;
        let request = requests::fetch_claim_for_root(root, &mut conn).await?;
        Ok(request)
    }

    async fn list_eligible(&self, window: Duration) -> Result<Vec<PurchaseRequest>, RequestStoreError> {
        let mut conn = self.pool.acquire().await?;
        let since = Utc::now() - window;
        let requests = requests::fetch_pending_since(since, &mut conn).await?;
        Ok(requests)
    }

    async fn fetch_bound_transfers(&self) -> Result<HashMap<String, RequestId>, RequestStoreError> {
        let mut conn = self.pool.acquire().await?;
        let bindings = requests::fetch_bound_transfers(&mut conn).await?;
        Ok(bindings)
    }

    async fn bind_transfer(
        &self,
        id: &RequestId,
        tx_hash: &str,
        confirmations: u64,
    ) -> Result<PurchaseRequest, RequestStoreError> {
        let mut tx = self.pool.begin().await?;
        let request =
            requests::fetch_request(id, &mut tx).await?.ok_or_else(|| RequestStoreError::RequestNotFound(id.clone()))?;
        if request.status != RequestStatus::Pending {
            return Err(RequestStoreError::InvalidTransition {
                id: id.clone(),
                from: request.status,
                to: RequestStatus::Pending,
            });
        }
        if let Some(existing) = request.tx_hash.as_ref().filter(|h| h.as_str() != tx_hash) {
            warn!("🗃️ Refusing to rebind request {id} from {existing} to {tx_hash}");
            return Err(RequestStoreError::TransferRebind {
                id: id.clone(),
                existing: existing.clone(),
                requested: tx_hash.to_string(),
            });
        }
        if let Some(claim) = requests::fetch_claim_for_root(request.root, &mut tx).await? {
            warn!("🗃️ Root {} was claimed by request {}. Not binding {tx_hash} to {id}", request.root, claim.id);
            return Err(RequestStoreError::RootAlreadyClaimed(request.root));
        }
        if let Some(other) = requests::fetch_request_by_tx_hash(tx_hash, &mut tx).await? {
            if other.id != *id {
                warn!("🗃️ Transfer {tx_hash} is already credited to request {}. Not binding it to {id}", other.id);
                return Err(RequestStoreError::TransferAlreadyBound(tx_hash.to_string()));
            }
        }
        if confirmations < request.confirmations {
            debug!(
                "🗃️ Transfer {tx_hash} reported {confirmations} confirmations, fewer than the {} already recorded. \
                 Keeping the recorded value.",
                request.confirmations
            );
        }
        let updated = requests::update_binding(id, tx_hash, confirmations, &mut tx)
            .await
            .map_err(|e| map_unique_violation(e, tx_hash, request.root))?
            .ok_or_else(|| RequestStoreError::RequestNotFound(id.clone()))?;
        tx.commit().await?;
        trace!("🗃️ Request {id} bound to {tx_hash} with {} confirmations", updated.confirmations);
        Ok(updated)
    }

    async fn confirm(&self, id: &RequestId) -> Result<PurchaseRequest, RequestStoreError> {
        let mut tx = self.pool.begin().await?;
        let confirmed = match requests::mark_confirmed(id, now_secs(), &mut tx).await {
            Ok(Some(request)) => request,
            Ok(None) => {
                let err = diagnose_failed_update(id, RequestStatus::Confirmed, RequestStatus::Pending, &mut tx).await;
                return Err(err);
            },
            Err(e) => {
                let root = requests::fetch_request(id, &mut tx).await?.map(|r| r.root).unwrap_or_default();
                return Err(map_unique_violation(e, "", root));
            },
        };
        tx.commit().await?;
        info!("🗃️ Request {id} confirmed. Root {} is claimed", confirmed.root);
        Ok(confirmed)
    }

    async fn complete(&self, id: &RequestId, certificate_hash: &str) -> Result<PurchaseRequest, RequestStoreError> {
        let mut tx = self.pool.begin().await?;
        let completed = match requests::mark_complete(id, certificate_hash, &mut tx).await? {
            Some(request) => request,
            None => {
                let err = diagnose_failed_update(id, RequestStatus::Complete, RequestStatus::Confirmed, &mut tx).await;
                return Err(err);
            },
        };
        tx.commit().await?;
        debug!("🗃️ Request {id} complete. Certificate {certificate_hash}");
        Ok(completed)
    }

    async fn insert_confirmed(
        &self,
        request: NewPurchaseRequest,
        reference: &str,
    ) -> Result<InsertConfirmedResult, RequestStoreError> {
        let mut tx = self.pool.begin().await?;
        if let Some(existing) = requests::fetch_request_by_tx_hash(reference, &mut tx).await? {
            return if existing.root == request.root && existing.asset == request.asset {
                debug!("🗃️ Payment {reference} was already recorded as request {}", existing.id);
                Ok(InsertConfirmedResult::AlreadyExists(existing))
            } else {
                Err(RequestStoreError::TransferAlreadyBound(reference.to_string()))
            };
        }
        let id = RequestId::random();
        let root = request.root;
        requests::insert_request(&id, &request, now_secs(), &mut tx)
            .await?
            .ok_or(RequestStoreError::RootAlreadyClaimed(root))?;
        requests::update_binding(&id, reference, 0, &mut tx)
            .await
            .map_err(|e| map_unique_violation(e, reference, root))?;
        let confirmed = requests::mark_confirmed(&id, now_secs(), &mut tx)
            .await
            .map_err(|e| map_unique_violation(e, reference, root))?
            .ok_or(RequestStoreError::RootAlreadyClaimed(root))?;
        tx.commit().await?;
        info!("🗃️ {} payment {reference} recorded as confirmed request {id} for root {root}", confirmed.asset);
        Ok(InsertConfirmedResult::Inserted(confirmed))
    }
}

/// Timestamps are stored with one-second resolution, so truncate up front to keep in-memory and stored values equal.
fn now_secs() -> chrono::DateTime<Utc> {
    let now = Utc::now();
    now.duration_trunc(Duration::seconds(1)).unwrap_or(now)
}

impl SqliteDatabase {
    /// Creates a new database API object
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Brings the schema up to date using the migrations embedded in this crate.
    pub async fn run_migrations(&self) -> Result<(), MigrateError> {
        sqlx::migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        debug!("🗃️ Database migrations complete");
        Ok(())
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Closes the pool, waiting for checked-out connections to be returned.
    pub async fn close(&self) {
        self.pool.close().await;
        debug!("🗃️ Database connection pool closed");
    }
}
