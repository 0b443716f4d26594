//! Gesture controller for drag-move and edge-resize of bookings
//!
//! Synchronous state machine fed with normalized pointer input. While
//! dragging it keeps a live proposal and an advisory conflict flag; on drop it
//! hands a commit request to the mutation coordinator and returns to idle
//! without waiting for the store.

pub mod grid;
pub mod input;
pub mod state;
#[cfg(test)]
mod tests;

pub use grid::{CalendarGrid, GridCell, ScrollDirection};
pub use input::{
    DragHandle, DragTarget, GestureInput, PointerKind, PointerSample, RawInput, RawPhase,
};
pub use state::{
    CancelReason, GestureEffect, GesturePhase, GestureSession, GestureTransition, NoopReason,
};

use crate::domain::{BookingId, TimeInterval};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::{Notice, NoticeSender};
use crate::services::board::BookingBoard;
use crate::services::conflict::ConflictCandidate;
use crate::services::mutation::{MutationCoordinator, MutationOutcome};
use chrono::Duration;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Collaborators the controller works against
#[derive(Clone)]
pub struct GestureContext {
    pub board: Arc<BookingBoard>,
    pub coordinator: MutationCoordinator,
    pub notices: NoticeSender,
    pub metrics: Arc<Metrics>,
}

pub struct GestureController {
    ctx: GestureContext,
    grid: CalendarGrid,
    long_press_ms: u64,
    touch_jitter_px: f64,
    min_duration: Duration,
    autoscroll_edge_px: f64,
    autoscroll_step_px: f64,
    phase: GesturePhase,
    session: Option<GestureSession>,
    /// Persistence tasks of dispatched drops
    dispatched: Vec<JoinHandle<MutationOutcome>>,
}

impl GestureController {
    pub fn new(config: &Config, ctx: GestureContext, grid: CalendarGrid) -> Self {
        Self {
            ctx,
            grid,
            long_press_ms: config.long_press_ms(),
            touch_jitter_px: config.touch_jitter_px(),
            min_duration: Duration::minutes(i64::from(config.min_duration_minutes())),
            autoscroll_edge_px: config.autoscroll_edge_px(),
            autoscroll_step_px: config.autoscroll_step_px(),
            phase: GesturePhase::Idle,
            session: None,
            dispatched: Vec::new(),
        }
    }

    pub fn phase(&self) -> GesturePhase {
        self.phase
    }

    /// Live proposal and conflict flag, while a gesture is in progress
    pub fn session(&self) -> Option<&GestureSession> {
        self.session.as_ref()
    }

    pub fn scroll_top(&self) -> f64 {
        self.grid.scroll_top()
    }

    pub fn grid(&self) -> &CalendarGrid {
        &self.grid
    }

    /// Take the persistence tasks of drops still tracked
    ///
    /// Tasks that finished before a later drop are pruned; their outcome
    /// reached the notice channel.
    pub fn take_dispatched(&mut self) -> Vec<JoinHandle<MutationOutcome>> {
        std::mem::take(&mut self.dispatched)
    }

    /// Advance the state machine by one input
    ///
    /// Must run inside a tokio runtime since drops spawn persistence tasks.
    pub fn handle(&mut self, input: GestureInput) -> GestureTransition {
        let from = self.phase;
        let effect = match input {
            GestureInput::Down { target, sample } => self.on_down(target, sample),
            GestureInput::Move(sample) => self.on_move(sample),
            GestureInput::Up(sample) => self.on_up(sample),
            GestureInput::Cancel => self.on_cancel(),
            GestureInput::Tick(timestamp_ms) => self.on_tick(timestamp_ms),
        };
        let transition = GestureTransition { from, to: self.phase, effect };
        if !transition.is_noop() {
            debug!(
                from = %from.as_str(),
                to = %self.phase.as_str(),
                effect = ?transition.effect,
                "gesture_transition"
            );
        }
        transition
    }

    fn on_down(&mut self, target: DragTarget, sample: PointerSample) -> GestureEffect {
        if self.session.is_some() {
            return GestureEffect::Noop(NoopReason::SessionActive);
        }
        let Some(booking) = self.ctx.board.get(target.booking_id) else {
            return GestureEffect::Noop(NoopReason::UnknownBooking);
        };
        let Ok(interval) = booking.interval() else {
            return GestureEffect::Noop(NoopReason::UnknownBooking);
        };

        let conflict =
            self.ctx.board.has_conflict(&ConflictCandidate::for_booking(&booking, interval));
        self.session = Some(GestureSession {
            target,
            booking_snapshot: booking,
            original_interval: interval,
            pointer_origin: sample,
            origin_content_y: self.grid.content_y(sample.y),
            origin_column: self.grid.column_of(sample.x),
            last_pointer: sample,
            proposed_interval: interval,
            conflict,
        });
        self.phase = GesturePhase::Armed;
        self.ctx.metrics.record_gesture_started();
        info!(
            booking_id = %target.booking_id,
            handle = ?target.handle,
            pointer = %sample.kind.as_str(),
            "gesture_armed"
        );
        GestureEffect::Armed { target }
    }

    fn on_move(&mut self, sample: PointerSample) -> GestureEffect {
        let Some(session) = &self.session else {
            return GestureEffect::Noop(NoopReason::NoActiveSession);
        };
        if !session.pointer_origin.same_pointer(&sample) {
            return GestureEffect::Noop(NoopReason::PointerMismatch);
        }
        let origin = session.pointer_origin;

        match self.phase {
            GesturePhase::Armed if sample.kind == PointerKind::Touch => {
                if self.long_press_elapsed(sample.timestamp_ms) {
                    return self.start_drag(sample);
                }
                if sample.distance_to(&origin) > self.touch_jitter_px {
                    return self.cancel(CancelReason::JitterExceeded);
                }
                if let Some(session) = self.session.as_mut() {
                    session.last_pointer = sample;
                }
                GestureEffect::Noop(NoopReason::WithinJitter)
            }
            GesturePhase::Armed => {
                if sample.distance_to(&origin) == 0.0 {
                    return GestureEffect::Noop(NoopReason::AwaitingMovement);
                }
                self.start_drag(sample)
            }
            GesturePhase::Dragging => match self.update_proposal(sample) {
                Ok((interval, conflict)) => GestureEffect::ProposalUpdated { interval, conflict },
                Err(reason) => GestureEffect::Noop(reason),
            },
            GesturePhase::Idle | GesturePhase::Committing => {
                GestureEffect::Noop(NoopReason::NoActiveSession)
            }
        }
    }

    fn on_up(&mut self, sample: PointerSample) -> GestureEffect {
        let Some(session) = &self.session else {
            return GestureEffect::Noop(NoopReason::NoActiveSession);
        };
        if !session.pointer_origin.same_pointer(&sample) {
            return GestureEffect::Noop(NoopReason::PointerMismatch);
        }

        match self.phase {
            GesturePhase::Armed => self.cancel(CancelReason::ReleasedBeforeDrag),
            GesturePhase::Dragging => self.drop_at(sample),
            GesturePhase::Idle | GesturePhase::Committing => {
                GestureEffect::Noop(NoopReason::NoActiveSession)
            }
        }
    }

    fn on_cancel(&mut self) -> GestureEffect {
        if self.session.is_none() {
            return GestureEffect::Noop(NoopReason::NoActiveSession);
        }
        self.cancel(CancelReason::Explicit)
    }

    fn on_tick(&mut self, timestamp_ms: u64) -> GestureEffect {
        let Some(session) = &self.session else {
            return GestureEffect::Noop(NoopReason::NoActiveSession);
        };
        let last = session.last_pointer;

        match self.phase {
            GesturePhase::Armed if last.kind == PointerKind::Touch => {
                if self.long_press_elapsed(timestamp_ms) {
                    self.start_drag(last)
                } else {
                    GestureEffect::Noop(NoopReason::LongPressPending)
                }
            }
            GesturePhase::Armed => GestureEffect::Noop(NoopReason::AwaitingMovement),
            GesturePhase::Dragging => self.auto_scroll(last),
            GesturePhase::Idle | GesturePhase::Committing => {
                GestureEffect::Noop(NoopReason::NoActiveSession)
            }
        }
    }

    fn long_press_elapsed(&self, timestamp_ms: u64) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| timestamp_ms >= s.long_press_deadline(self.long_press_ms))
    }

    fn start_drag(&mut self, sample: PointerSample) -> GestureEffect {
        self.phase = GesturePhase::Dragging;
        if let Err(reason) = self.refresh_proposal(sample) {
            return GestureEffect::Noop(reason);
        }
        let Some(session) = &self.session else {
            return GestureEffect::Noop(NoopReason::NoActiveSession);
        };
        info!(booking_id = %session.booking_id(), pointer = %sample.kind.as_str(), "gesture_drag_started");
        GestureEffect::DragStarted {
            interval: session.proposed_interval,
            conflict: session.conflict,
        }
    }

    /// Recompute the proposal and the live conflict flag for a pointer position
    fn update_proposal(&mut self, sample: PointerSample) -> Result<(TimeInterval, bool), NoopReason> {
        let Some(session) = self.session.as_mut() else {
            return Err(NoopReason::NoActiveSession);
        };
        session.last_pointer = sample;
        self.ctx.metrics.record_drag_sample();

        let interval = propose(&self.grid, session, sample, self.min_duration)?;
        let candidate = ConflictCandidate::for_booking(&session.booking_snapshot, interval);
        session.conflict = self.ctx.board.has_conflict(&candidate);
        session.proposed_interval = interval;
        debug!(
            booking_id = %session.booking_id(),
            start = %interval.start(),
            end = %interval.end(),
            conflict = %session.conflict,
            "gesture_proposal"
        );
        Ok((interval, session.conflict))
    }

    /// Like `update_proposal`, but a position below the duration floor keeps
    /// the previous proposal instead of failing
    fn refresh_proposal(&mut self, sample: PointerSample) -> Result<(), NoopReason> {
        match self.update_proposal(sample) {
            Ok(_) | Err(NoopReason::BelowMinimumDuration) => Ok(()),
            Err(reason) => Err(reason),
        }
    }

    fn auto_scroll(&mut self, last: PointerSample) -> GestureEffect {
        let Some(direction) = self.grid.edge_zone(last.y, self.autoscroll_edge_px) else {
            return GestureEffect::Noop(NoopReason::NoAutoScroll);
        };
        if !self.grid.scroll(direction, self.autoscroll_step_px) {
            return GestureEffect::Noop(NoopReason::NoAutoScroll);
        }
        if let Err(reason) = self.refresh_proposal(last) {
            return GestureEffect::Noop(reason);
        }
        let Some(session) = &self.session else {
            return GestureEffect::Noop(NoopReason::NoActiveSession);
        };
        GestureEffect::AutoScrolled {
            scroll_top: self.grid.scroll_top(),
            interval: session.proposed_interval,
            conflict: session.conflict,
        }
    }

    fn drop_at(&mut self, sample: PointerSample) -> GestureEffect {
        if let Err(reason) = self.refresh_proposal(sample) {
            return GestureEffect::Noop(reason);
        }
        if self.grid.cell_at(sample.x, sample.y).is_none() {
            return self.cancel(CancelReason::OutsideGrid);
        }
        let Some(session) = self.session.take() else {
            return GestureEffect::Noop(NoopReason::NoActiveSession);
        };
        let booking_id = session.booking_id();

        if session.conflict {
            let candidate =
                ConflictCandidate::for_booking(&session.booking_snapshot, session.proposed_interval);
            let conflicting = self.ctx.board.conflicts(&candidate);
            self.phase = GesturePhase::Idle;
            self.ctx.metrics.record_gesture_conflict_rejected();
            self.ctx
                .notices
                .send(Notice::ConflictRejected { booking_id, conflicting: conflicting.clone() });
            info!(booking_id = %booking_id, conflicts = %conflicting.len(), "gesture_conflict_rejected");
            return GestureEffect::ConflictRejected { booking_id, conflicting };
        }

        if session.is_unchanged() {
            self.session = Some(session);
            return self.cancel(CancelReason::Unchanged);
        }

        let request = session.commit_request();
        self.phase = GesturePhase::Committing;
        let result = self.ctx.coordinator.dispatch(request);
        self.phase = GesturePhase::Idle;

        match result {
            Ok(handle) => {
                // settled tasks already reported through notices
                self.dispatched.retain(|h| !h.is_finished());
                self.dispatched.push(handle);
                self.ctx.metrics.record_gesture_committed();
                info!(
                    booking_id = %booking_id,
                    start = %session.proposed_interval.start(),
                    end = %session.proposed_interval.end(),
                    "gesture_dispatched"
                );
                GestureEffect::Dispatched(request)
            }
            Err(e) => {
                info!(booking_id = %booking_id, error = %e, "gesture_commit_refused");
                GestureEffect::Rejected(e)
            }
        }
    }

    fn cancel(&mut self, reason: CancelReason) -> GestureEffect {
        let booking_id: Option<BookingId> = self.session.take().map(|s| s.booking_id());
        self.phase = GesturePhase::Idle;
        self.ctx.metrics.record_gesture_cancelled();
        info!(booking_id = ?booking_id, reason = %reason.as_str(), "gesture_cancelled");
        GestureEffect::Cancelled(reason)
    }
}

/// Interval for the pointer position, or why the position is refused
fn propose(
    grid: &CalendarGrid,
    session: &GestureSession,
    sample: PointerSample,
    min_duration: Duration,
) -> Result<TimeInterval, NoopReason> {
    let original = session.original_interval;
    let minutes = Duration::minutes(grid.snap_minutes(grid.content_y(sample.y) - session.origin_content_y));

    let (start, end) = match session.handle() {
        DragHandle::Body => {
            let days = Duration::days(grid.column_of(sample.x) - session.origin_column);
            return Ok(original.shifted(days + minutes));
        }
        DragHandle::StartEdge => (original.start() + minutes, original.end()),
        DragHandle::EndEdge => (original.start(), original.end() + minutes),
    };
    if end - start < min_duration {
        return Err(NoopReason::BelowMinimumDuration);
    }
    TimeInterval::new(start, end).map_err(|_| NoopReason::BelowMinimumDuration)
}
