//! Root Payment Engine
//!
//! The root payment engine lets buyers pay for a root with BTC, ETH, USDC or USDT sent to a small set of shared
//! collection wallets. Because many buyers pay into the same address, the engine has to decide for itself which
//! incoming transfer settles which purchase request.
//!
//! The library is divided into these main sections:
//! 1. Storage ([`mod@sqlite`] and [`traits::RequestStore`]). The request store is the single source of truth for root
//!    claims and transfer bindings. The data types it stores are defined in [`mod@db_types`].
//! 2. Data sources ([`mod@scanners`] and [`mod@oracle`]). Chain scanners list recent transfers to a collection address;
//!    the price oracle quotes USD prices for the volatile assets.
//! 3. Matching ([`mod@matching`]), the pure decision of which transfer (if any) settles a request.
//! 4. The public API ([`mod@rpe_api`]). [`ReconciliationApi`] runs the periodic reconciliation cycle and
//!    [`PurchaseApi`] covers request creation, status, card payments and completion.
//!
//! The engine also publishes a [`events::RequestConfirmedEvent`] whenever a root is claimed. See [`mod@events`] for how
//! to hook into it.
pub mod db_types;
pub mod events;
pub mod matching;
pub mod oracle;
pub mod rpe_api;
pub mod scanners;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use matching::{match_transfer, MatchPolicy};
pub use rpe_api::{
    errors::{PurchaseError, ReconciliationError},
    purchase_api::{PurchaseApi, SELLABLE_ROOTS},
    purchase_objects::PurchaseRequestView,
    reconciliation_api::ReconciliationApi,
    reconciliation_objects::{CycleReport, ReconciliationSettings, RequestOutcome},
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
