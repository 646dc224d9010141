//! # Root payment engine public API
//!
//! * [`reconciliation_api`] runs reconciliation cycles: it scans chains for payments, matches them against pending
//!   purchase requests and confirms the ones whose payments are final.
//! * [`purchase_api`] covers the rest of a request's life: creation, status queries, card payments and completion.
//!
//! Both APIs are constructed from a backend implementing [`crate::traits::RequestStore`]:
//!
//! ```rust,ignore
//! use root_payment_engine::{PurchaseApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url("sqlite://data/root_payments.db", 5).await?;
//! let api = PurchaseApi::new(db, producers, chrono::Duration::hours(24));
//! let request = api.create_request(512, Asset::Btc, dec!(29.00)).await?;
//! ```
pub mod errors;
pub mod purchase_api;
pub mod purchase_objects;
pub mod reconciliation_api;
pub mod reconciliation_objects;
