//! Domain models - core scheduling types
//!
//! This module contains the canonical data types used throughout the system:
//! - `Booking` - scheduled work interval for a customer property
//! - `TimeInterval` - validated half-open wall-clock interval
//! - `CreditLedgerEntry` - append-only credit transaction
//! - `RouteResult` - ordered visits produced by the route planner
//! - `ScheduleError` - error taxonomy shared by all operations

pub mod error;
pub mod ledger;
pub mod route;
pub mod types;

// Re-export commonly used types at module level
pub use error::{LedgerError, ScheduleError, StoreError};
pub use ledger::CreditLedgerEntry;
pub use route::{GeoPoint, RouteCandidate, RoutePoint, RouteResult, RouteStop, SiteLocation};
pub use types::{
    Booking, BookingId, BookingPatch, BookingStatus, CustomerRef, DateWindow, StaffId, TenantId,
    TimeInterval,
};
