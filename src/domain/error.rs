//! Error taxonomy for the scheduling engine
//!
//! Every public operation traps its own failure modes and reports one of
//! these variants. All variants carry owned data so outcomes can be cloned
//! into notices and returned to callers at the same time.

use crate::domain::types::BookingId;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScheduleError {
    /// Malformed interval or request, rejected before any mutation
    #[error("validation failed: {0}")]
    Validation(String),
    /// Overlap with another booking of the same assignee at commit time
    #[error("booking {booking_id} conflicts with {} other booking(s)", conflicting.len())]
    Conflict { booking_id: BookingId, conflicting: Vec<BookingId> },
    /// The booking store rejected the update
    #[error("persistence failed: {0}")]
    Persistence(String),
    /// The booking store did not answer in time
    #[error("persistence timed out after {0} ms")]
    PersistTimeout(u64),
    #[error("booking not found: {0}")]
    BookingNotFound(BookingId),
    /// Tenant credit balance below the per-use cost
    #[error("insufficient credits: balance {balance}, required {cost}")]
    InsufficientFunds { balance: Decimal, cost: Decimal },
    /// Fewer than two bookings carry usable coordinates
    #[error("need at least 2 geolocated bookings, found {geolocated}")]
    InsufficientData { geolocated: usize },
    #[error("credit ledger error: {0}")]
    Ledger(String),
}

impl ScheduleError {
    /// Short machine-friendly tag for logs and notices
    pub fn kind(&self) -> &'static str {
        match self {
            ScheduleError::Validation(_) => "validation",
            ScheduleError::Conflict { .. } => "conflict",
            ScheduleError::Persistence(_) => "persistence",
            ScheduleError::PersistTimeout(_) => "persist_timeout",
            ScheduleError::BookingNotFound(_) => "not_found",
            ScheduleError::InsufficientFunds { .. } => "insufficient_funds",
            ScheduleError::InsufficientData { .. } => "insufficient_data",
            ScheduleError::Ledger(_) => "ledger",
        }
    }
}

/// Failure reported by a booking store collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("booking {0} does not exist in store")]
    NotFound(BookingId),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store rejected update: {0}")]
    Rejected(String),
}

impl From<StoreError> for ScheduleError {
    fn from(e: StoreError) -> Self {
        ScheduleError::Persistence(e.to_string())
    }
}

/// Failure reported by a credit ledger collaborator
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ledger entry could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

impl From<LedgerError> for ScheduleError {
    fn from(e: LedgerError) -> Self {
        ScheduleError::Ledger(e.to_string())
    }
}
