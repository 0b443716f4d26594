//! Mutation commands
//!
//! A command captures the touched fields before and after an edit. Applying
//! it writes `after`; rolling it back restores `before` only for fields that
//! still hold this command's `after` value, so a later edit of the same
//! field is never overwritten.

use crate::domain::{Booking, BookingId, BookingPatch, ScheduleError, TimeInterval};
use crate::services::board::BookingBoard;
use chrono::NaiveDateTime;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Move,
    Resize,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Move => "move",
            MutationKind::Resize => "resize",
        }
    }
}

/// Edit requested by the gesture controller or an API caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommitRequest {
    Move {
        booking_id: BookingId,
        new_start: NaiveDateTime,
        new_end: NaiveDateTime,
    },
    Resize {
        booking_id: BookingId,
        new_start: Option<NaiveDateTime>,
        new_end: Option<NaiveDateTime>,
    },
}

impl CommitRequest {
    pub fn booking_id(&self) -> BookingId {
        match self {
            CommitRequest::Move { booking_id, .. } | CommitRequest::Resize { booking_id, .. } => {
                *booking_id
            }
        }
    }

    pub fn kind(&self) -> MutationKind {
        match self {
            CommitRequest::Move { .. } => MutationKind::Move,
            CommitRequest::Resize { .. } => MutationKind::Resize,
        }
    }

    /// Fields this request writes
    pub fn patch(&self) -> BookingPatch {
        match *self {
            CommitRequest::Move { new_start, new_end, .. } => {
                BookingPatch { start: Some(new_start), end: Some(new_end) }
            }
            CommitRequest::Resize { new_start, new_end, .. } => {
                BookingPatch { start: new_start, end: new_end }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MutationCommand {
    pub booking_id: BookingId,
    pub kind: MutationKind,
    /// Values of the touched fields when the command was staged
    pub before: BookingPatch,
    /// Values the command writes; `None` fields are untouched
    pub after: BookingPatch,
}

impl MutationCommand {
    /// Snapshot the fields `request` touches on `booking`
    pub fn capture(booking: &Booking, request: &CommitRequest) -> Self {
        let after = request.patch();
        let before = BookingPatch {
            start: after.start.map(|_| booking.start),
            end: after.end.map(|_| booking.end),
        };
        Self { booking_id: booking.id, kind: request.kind(), before, after }
    }

    /// Interval the booking would have after this command
    pub fn proposed_interval(&self, booking: &Booking) -> Result<TimeInterval, ScheduleError> {
        TimeInterval::new(
            self.after.start.unwrap_or(booking.start),
            self.after.end.unwrap_or(booking.end),
        )
    }

    pub fn apply_to(&self, booking: &mut Booking) {
        self.after.apply_to(booking);
    }

    /// Compare-and-restore; returns the fields actually restored
    pub fn rollback_on(&self, booking: &mut Booking) -> BookingPatch {
        let mut restored = BookingPatch::default();
        if let (Some(after), Some(before)) = (self.after.start, self.before.start) {
            if booking.start == after {
                booking.start = before;
                restored.start = Some(before);
            }
        }
        if let (Some(after), Some(before)) = (self.after.end, self.before.end) {
            if booking.end == after {
                booking.end = before;
                restored.end = Some(before);
            }
        }
        restored
    }

    pub fn apply(&self, board: &BookingBoard) -> Result<(), ScheduleError> {
        board
            .update(self.booking_id, |b| self.apply_to(b))
            .ok_or(ScheduleError::BookingNotFound(self.booking_id))
    }

    /// Roll back on the board; a booking removed meanwhile restores nothing
    pub fn rollback(&self, board: &BookingBoard) -> BookingPatch {
        board.update(self.booking_id, |b| self.rollback_on(b)).unwrap_or_default()
    }

    /// Same command restricted to the given fields
    pub(crate) fn restricted_to(&self, start: bool, end: bool) -> Self {
        Self {
            booking_id: self.booking_id,
            kind: self.kind,
            before: BookingPatch {
                start: self.before.start.filter(|_| start),
                end: self.before.end.filter(|_| end),
            },
            after: BookingPatch {
                start: self.after.start.filter(|_| start),
                end: self.after.end.filter(|_| end),
            },
        }
    }
}
