//! Services - scheduling logic and shared state
//!
//! - `conflict` - Staff double-booking detection
//! - `board` - In-memory booking collection shared by gestures and mutations
//! - `gesture` - Drag-move and edge-resize state machine
//! - `mutation` - Optimistic edits with field-scoped rollback
//! - `route` - Credit-metered nearest-neighbor route planning

pub mod board;
pub mod conflict;
pub mod gesture;
pub mod mutation;
pub mod route;

// Re-export commonly used types
pub use board::BookingBoard;
pub use conflict::{find_conflicts, has_conflict, ConflictCandidate};
pub use gesture::{CalendarGrid, GestureContext, GestureController, GestureInput};
pub use mutation::{CommitRequest, MutationCoordinator, MutationOutcome};
pub use route::{RoutePlan, RoutePlanner, WalletContext};
