//! Conflict detection between staff assignments
//!
//! A conflict is two bookings with the same non-null assignee whose
//! half-open intervals overlap. Everything here is pure; callers hand in the
//! bookings to check against.

use crate::domain::{Booking, BookingId, StaffId, TimeInterval};

/// The booking being proposed, possibly not yet on the board
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictCandidate {
    pub id: BookingId,
    pub assignee: Option<StaffId>,
    pub interval: TimeInterval,
}

impl ConflictCandidate {
    pub fn new(id: BookingId, assignee: Option<StaffId>, interval: TimeInterval) -> Self {
        Self { id, assignee, interval }
    }

    /// Candidate for an existing booking moved to a new interval
    pub fn for_booking(booking: &Booking, interval: TimeInterval) -> Self {
        Self { id: booking.id, assignee: booking.assignee.clone(), interval }
    }

    #[inline]
    fn clashes_with(&self, other: &Booking) -> bool {
        let Some(assignee) = &self.assignee else {
            return false;
        };
        if other.id == self.id || other.assignee.as_ref() != Some(assignee) {
            return false;
        }
        self.interval.start() < other.end && self.interval.end() > other.start
    }
}

/// True when any booking in `existing` clashes with the candidate
///
/// The candidate itself (same id) is never counted, so a booking checked
/// against a board that still holds it does not conflict with itself.
pub fn has_conflict<'a>(
    candidate: &ConflictCandidate,
    existing: impl IntoIterator<Item = &'a Booking>,
) -> bool {
    existing.into_iter().any(|b| candidate.clashes_with(b))
}

/// Ids of every booking in `existing` that clashes with the candidate
pub fn find_conflicts<'a>(
    candidate: &ConflictCandidate,
    existing: impl IntoIterator<Item = &'a Booking>,
) -> Vec<BookingId> {
    existing.into_iter().filter(|b| candidate.clashes_with(b)).map(|b| b.id).collect()
}
