//! Gesture lifecycle types
//!
//! ```text
//! Idle -> Armed -> Dragging -> Committing -> Idle
//!           \          \-------> Idle (cancelled, rejected)
//!            \-----------------> Idle (released, jitter, cancel)
//! ```

use crate::domain::{Booking, BookingId, ScheduleError, TimeInterval};
use crate::services::gesture::input::{DragHandle, DragTarget, PointerSample};
use crate::services::mutation::CommitRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GesturePhase {
    Idle,
    /// Pointer down on a booking; drag not started yet
    Armed,
    Dragging,
    /// Drop is being handed to the mutation coordinator
    Committing,
}

impl GesturePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            GesturePhase::Idle => "idle",
            GesturePhase::Armed => "armed",
            GesturePhase::Dragging => "dragging",
            GesturePhase::Committing => "committing",
        }
    }
}

/// State of the one in-progress gesture; never persisted
#[derive(Debug, Clone, PartialEq)]
pub struct GestureSession {
    pub target: DragTarget,
    /// Booking as it was when the gesture started
    pub booking_snapshot: Booking,
    pub original_interval: TimeInterval,
    pub pointer_origin: PointerSample,
    /// Grid-content y of the origin, so scrolling shifts the proposal
    pub origin_content_y: f64,
    pub origin_column: i64,
    pub last_pointer: PointerSample,
    pub proposed_interval: TimeInterval,
    /// Live advisory conflict flag for the proposal
    pub conflict: bool,
}

impl GestureSession {
    pub fn booking_id(&self) -> BookingId {
        self.target.booking_id
    }

    pub fn handle(&self) -> DragHandle {
        self.target.handle
    }

    /// Proposal still equals the interval the gesture started from
    pub fn is_unchanged(&self) -> bool {
        self.proposed_interval == self.original_interval
    }

    /// Long-press deadline for touch sessions
    pub fn long_press_deadline(&self, long_press_ms: u64) -> u64 {
        self.pointer_origin.timestamp_ms.saturating_add(long_press_ms)
    }

    /// Request the coordinator should receive for the current proposal
    pub fn commit_request(&self) -> CommitRequest {
        let booking_id = self.booking_id();
        let interval = self.proposed_interval;
        match self.handle() {
            DragHandle::Body => CommitRequest::Move {
                booking_id,
                new_start: interval.start(),
                new_end: interval.end(),
            },
            DragHandle::StartEdge => {
                CommitRequest::Resize { booking_id, new_start: Some(interval.start()), new_end: None }
            }
            DragHandle::EndEdge => {
                CommitRequest::Resize { booking_id, new_start: None, new_end: Some(interval.end()) }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// Cancel input (escape, touchcancel)
    Explicit,
    /// Touch moved past the jitter threshold before the long press fired
    JitterExceeded,
    /// Released before the drag started
    ReleasedBeforeDrag,
    /// Dropped outside every grid cell
    OutsideGrid,
    /// Dropped where it started
    Unchanged,
}

impl CancelReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelReason::Explicit => "explicit",
            CancelReason::JitterExceeded => "jitter_exceeded",
            CancelReason::ReleasedBeforeDrag => "released_before_drag",
            CancelReason::OutsideGrid => "outside_grid",
            CancelReason::Unchanged => "unchanged",
        }
    }
}

/// Inputs that are safely ignored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoopReason {
    NoActiveSession,
    /// Down while a session exists
    SessionActive,
    PointerMismatch,
    /// Down on a booking that is not on the board
    UnknownBooking,
    /// Mouse or pen armed, no movement yet
    AwaitingMovement,
    /// Touch moved less than the jitter threshold
    WithinJitter,
    LongPressPending,
    /// Resize would shrink the booking below the floor; previous proposal kept
    BelowMinimumDuration,
    /// Tick while dragging away from the scroll edges, or scroll clamped
    NoAutoScroll,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GestureEffect {
    Armed { target: DragTarget },
    DragStarted { interval: TimeInterval, conflict: bool },
    ProposalUpdated { interval: TimeInterval, conflict: bool },
    AutoScrolled { scroll_top: f64, interval: TimeInterval, conflict: bool },
    /// Handed to the coordinator; persistence continues in the background
    Dispatched(CommitRequest),
    /// Dropped on an occupied slot
    ConflictRejected { booking_id: BookingId, conflicting: Vec<BookingId> },
    /// Coordinator refused at staging
    Rejected(ScheduleError),
    Cancelled(CancelReason),
    Noop(NoopReason),
}

/// One lifecycle step
#[derive(Debug, Clone, PartialEq)]
pub struct GestureTransition {
    pub from: GesturePhase,
    pub to: GesturePhase,
    pub effect: GestureEffect,
}

impl GestureTransition {
    pub fn is_noop(&self) -> bool {
        matches!(self.effect, GestureEffect::Noop(_))
    }
}
