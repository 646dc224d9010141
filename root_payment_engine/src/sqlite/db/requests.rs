use std::{collections::HashMap, str::FromStr};

use chrono::{DateTime, Utc};
use log::trace;
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqliteConnection};

use crate::db_types::{Asset, NewPurchaseRequest, PurchaseRequest, RequestId, RequestStatus};

impl FromRow<'_, SqliteRow> for PurchaseRequest {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let id = RequestId::from_str(&id).map_err(|e| decode_error("id", e))?;
        let expected_usd: String = row.try_get("expected_usd")?;
        let expected_usd = Decimal::from_str(&expected_usd).map_err(|e| decode_error("expected_usd", e))?;
        let confirmations: i64 = row.try_get("confirmations")?;
        let created_at: i64 = row.try_get("created_at")?;
        let confirmed_at: Option<i64> = row.try_get("confirmed_at")?;
        Ok(Self {
            id,
            root: row.try_get("root")?,
            asset: row.try_get::<Asset, _>("asset")?,
            expected_usd,
            status: row.try_get::<RequestStatus, _>("status")?,
            tx_hash: row.try_get("tx_hash")?,
            confirmations: u64::try_from(confirmations).unwrap_or_default(),
            created_at: from_timestamp("created_at", created_at)?,
            confirmed_at: confirmed_at.map(|t| from_timestamp("confirmed_at", t)).transpose()?,
            certificate_hash: row.try_get("certificate_hash")?,
        })
    }
}

fn decode_error<E: std::error::Error + Send + Sync + 'static>(column: &str, e: E) -> sqlx::Error {
    sqlx::Error::ColumnDecode { index: column.to_string(), source: Box::new(e) }
}

fn from_timestamp(column: &str, secs: i64) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: format!("{secs} is not a valid unix timestamp").into(),
    })
}

fn to_db_count(confirmations: u64) -> i64 {
    i64::try_from(confirmations).unwrap_or(i64::MAX)
}

/// Inserts a new pending request, unless the root has already been claimed.
///
/// The claim check and the insert are a single statement, so concurrent writers cannot both slip past the check.
/// Returns `None` if the root is already claimed.
pub async fn insert_request(
    id: &RequestId,
    request: &NewPurchaseRequest,
    created_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<PurchaseRequest>, sqlx::Error> {
    let inserted = sqlx::query_as(
        r#"
            INSERT INTO purchase_requests (id, root, asset, expected_usd, status, confirmations, created_at)
            SELECT $1, $2, $3, $4, 'pending', 0, $5
            WHERE NOT EXISTS (
                SELECT 1 FROM purchase_requests WHERE root = $2 AND status IN ('confirmed', 'complete')
            )
            RETURNING *;
        "#,
    )
    .bind(id.as_str())
    .bind(request.root)
    .bind(request.asset)
    .bind(request.expected_usd.to_string())
    .bind(created_at.timestamp())
    .fetch_optional(conn)
    .await?;
    Ok(inserted)
}

pub async fn fetch_request(id: &RequestId, conn: &mut SqliteConnection) -> Result<Option<PurchaseRequest>, sqlx::Error> {
    let request = sqlx::query_as("SELECT * FROM purchase_requests WHERE id = $1")
        .bind(id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(request)
}

pub async fn fetch_request_by_tx_hash(
    tx_hash: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<PurchaseRequest>, sqlx::Error> {
    let request = sqlx::query_as("SELECT * FROM purchase_requests WHERE tx_hash = $1")
        .bind(tx_hash)
        .fetch_optional(conn)
        .await?;
    Ok(request)
}

pub async fn fetch_claim_for_root(root: i64, conn: &mut SqliteConnection) -> Result<Option<PurchaseRequest>, sqlx::Error> {
    let request =
        sqlx::query_as("SELECT * FROM purchase_requests WHERE root = $1 AND status IN ('confirmed', 'complete')")
            .bind(root)
            .fetch_optional(conn)
            .await?;
    Ok(request)
}

/// Fetches pending on-chain requests created after `since`, oldest first. Requests for roots that have already been
/// claimed by another request are left out, since they can never be confirmed.
pub async fn fetch_pending_since(
    since: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<PurchaseRequest>, sqlx::Error> {
    let requests: Vec<PurchaseRequest> = sqlx::query_as(
        r#"
            SELECT * FROM purchase_requests AS pr
            WHERE pr.status = 'pending' AND pr.asset != 'CARD' AND pr.created_at > $1
              AND NOT EXISTS (
                SELECT 1 FROM purchase_requests AS other
                WHERE other.root = pr.root AND other.status IN ('confirmed', 'complete')
              )
            ORDER BY pr.created_at ASC, pr.id ASC
        "#,
    )
    .bind(since.timestamp())
    .fetch_all(conn)
    .await?;
    trace!("🗃️ {} pending requests created since {since}", requests.len());
    Ok(requests)
}

pub async fn fetch_bound_transfers(conn: &mut SqliteConnection) -> Result<HashMap<String, RequestId>, sqlx::Error> {
    let rows: Vec<(String, String)> =
        sqlx::query_as("SELECT tx_hash, id FROM purchase_requests WHERE tx_hash IS NOT NULL").fetch_all(conn).await?;
    rows.into_iter()
        .map(|(tx_hash, id)| {
            let id = RequestId::from_str(&id).map_err(|e| decode_error("id", e))?;
            Ok((tx_hash, id))
        })
        .collect()
}

/// Sets the transfer binding for a pending request. The stored confirmation count is only ever raised.
pub(crate) async fn update_binding(
    id: &RequestId,
    tx_hash: &str,
    confirmations: u64,
    conn: &mut SqliteConnection,
) -> Result<Option<PurchaseRequest>, sqlx::Error> {
    let request = sqlx::query_as(
        r#"
            UPDATE purchase_requests
            SET tx_hash = $1, confirmations = MAX(confirmations, $2)
            WHERE id = $3 AND status = 'pending'
            RETURNING *;
        "#,
    )
    .bind(tx_hash)
    .bind(to_db_count(confirmations))
    .bind(id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(request)
}

/// Marks a pending request as confirmed, provided no other request for the same root has been claimed.
/// Returns `None` if either condition fails.
pub(crate) async fn mark_confirmed(
    id: &RequestId,
    confirmed_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<PurchaseRequest>, sqlx::Error> {
    let request = sqlx::query_as(
        r#"
            UPDATE purchase_requests
            SET status = 'confirmed', confirmed_at = $1
            WHERE id = $2 AND status = 'pending' AND NOT EXISTS (
                SELECT 1 FROM purchase_requests AS other
                WHERE other.root = purchase_requests.root
                  AND other.id != purchase_requests.id
                  AND other.status IN ('confirmed', 'complete')
            )
            RETURNING *;
        "#,
    )
    .bind(confirmed_at.timestamp())
    .bind(id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(request)
}

pub(crate) async fn mark_complete(
    id: &RequestId,
    certificate_hash: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<PurchaseRequest>, sqlx::Error> {
    let request = sqlx::query_as(
        r#"
            UPDATE purchase_requests
            SET status = 'complete', certificate_hash = $1
            WHERE id = $2 AND status = 'confirmed'
            RETURNING *;
        "#,
    )
    .bind(certificate_hash)
    .bind(id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(request)
}
