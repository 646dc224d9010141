use std::fmt::Display;

use chrono::Duration;

use crate::{
    db_types::{Asset, RequestId},
    rpe_api::errors::ReconciliationError,
};

pub const DEFAULT_PAYMENT_WINDOW_HOURS: i64 = 24;
pub const DEFAULT_LOOKBACK_BLOCKS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconciliationSettings {
    /// Pending requests older than this are no longer matched
    pub payment_window: Duration,
    /// How far back, in blocks, scanners look for transfers
    pub lookback_blocks: u64,
}

impl Default for ReconciliationSettings {
    fn default() -> Self {
        Self { payment_window: Duration::hours(DEFAULT_PAYMENT_WINDOW_HOURS), lookback_blocks: DEFAULT_LOOKBACK_BLOCKS }
    }
}

/// What happened to one request during a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The bound transfer reached the threshold and the request is now confirmed.
    Confirmed { tx_hash: String, confirmations: u64 },
    /// A transfer is bound but not yet deep enough.
    AwaitingConfirmations { tx_hash: String, confirmations: u64, required: u64 },
    /// No transfer matched this cycle.
    Unmatched,
}

/// The tally of one reconciliation cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub confirmed: Vec<RequestId>,
    pub awaiting_confirmations: Vec<RequestId>,
    pub unmatched: Vec<RequestId>,
    pub failed: Vec<(RequestId, ReconciliationError)>,
    /// Assets whose scanner failed this cycle. Their requests were evaluated against an empty transfer list.
    pub degraded: Vec<Asset>,
}

impl CycleReport {
    pub fn record(&mut self, id: RequestId, outcome: Result<RequestOutcome, ReconciliationError>) {
        match outcome {
            Ok(RequestOutcome::Confirmed { .. }) => self.confirmed.push(id),
            Ok(RequestOutcome::AwaitingConfirmations { .. }) => self.awaiting_confirmations.push(id),
            Ok(RequestOutcome::Unmatched) => self.unmatched.push(id),
            Err(e) => self.failed.push((id, e)),
        }
    }

    pub fn total(&self) -> usize {
        self.confirmed.len() + self.awaiting_confirmations.len() + self.unmatched.len() + self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

impl Display for CycleReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} requests: {} confirmed, {} awaiting confirmations, {} unmatched, {} failed",
            self.total(),
            self.confirmed.len(),
            self.awaiting_confirmations.len(),
            self.unmatched.len(),
            self.failed.len()
        )
    }
}
