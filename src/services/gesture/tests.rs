//! Tests for the gesture controller
//!
//! Grid used throughout: body origin (40, 40), 140px day columns starting
//! 2024-06-03, 12px per 15-minute slot from 06:00, 440px viewport. A booking
//! at 09:00 on the first day starts at y = 40 + 12 * 12 = 184.

use super::*;
use crate::domain::types::at;
use crate::domain::{Booking, CustomerRef, StaffId};
use crate::io::{create_notice_channel, InMemoryBookingStore};
use crate::services::mutation::CommitRequest;
use chrono::NaiveDate;
use tokio::sync::mpsc;

struct TestGesture {
    controller: GestureController,
    board: Arc<BookingBoard>,
    store: Arc<InMemoryBookingStore>,
    metrics: Arc<Metrics>,
    notice_rx: mpsc::Receiver<Notice>,
}

fn booking(staff: &str, start: (u32, u32), end: (u32, u32)) -> Booking {
    Booking::new(
        BookingId::new(),
        TimeInterval::new(at(3, start.0, start.1), at(3, end.0, end.1)).unwrap(),
        Some(StaffId::new(staff)),
        CustomerRef::new("house-3"),
    )
}

fn create_test_gesture(bookings: Vec<Booking>) -> TestGesture {
    let config = Config::default();
    let tenant = crate::domain::TenantId::new("acme");
    let store = Arc::new(InMemoryBookingStore::with_bookings(&tenant, bookings.clone()));
    let board = Arc::new(BookingBoard::from_bookings(bookings));
    let metrics = Arc::new(Metrics::new());
    let (notices, notice_rx) = create_notice_channel(64, metrics.clone());
    let coordinator = MutationCoordinator::new(
        &config,
        board.clone(),
        store.clone(),
        notices.clone(),
        metrics.clone(),
    );
    let ctx = GestureContext { board: board.clone(), coordinator, notices, metrics: metrics.clone() };
    let first_day = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
    let grid = CalendarGrid::new(config.grid(), first_day, 440.0).with_origin(40.0, 40.0);
    let controller = GestureController::new(&config, ctx, grid);
    TestGesture { controller, board, store, metrics, notice_rx }
}

fn mouse(x: f64, y: f64, ts: u64) -> PointerSample {
    PointerSample::mouse(x, y, ts)
}

fn touch(x: f64, y: f64, ts: u64) -> PointerSample {
    PointerSample::touch(7, x, y, ts)
}

fn down(target: DragTarget, sample: PointerSample) -> GestureInput {
    GestureInput::Down { target, sample }
}

#[tokio::test]
async fn test_mouse_drag_moves_booking() {
    let b = booking("maria", (9, 0), (10, 0));
    let id = b.id;
    let mut t = create_test_gesture(vec![b]);

    let armed = t.controller.handle(down(DragTarget::body(id), mouse(100.0, 190.0, 0)));
    assert_eq!(armed.to, GesturePhase::Armed);

    // any movement starts the drag for a mouse
    let started = t.controller.handle(GestureInput::Move(mouse(100.0, 214.0, 16)));
    assert_eq!(started.to, GesturePhase::Dragging);
    let expected = TimeInterval::new(at(3, 9, 30), at(3, 10, 30)).unwrap();
    assert_eq!(started.effect, GestureEffect::DragStarted { interval: expected, conflict: false });

    let dropped = t.controller.handle(GestureInput::Up(mouse(100.0, 214.0, 32)));
    assert_eq!(dropped.from, GesturePhase::Dragging);
    assert_eq!(dropped.to, GesturePhase::Idle);
    assert_eq!(
        dropped.effect,
        GestureEffect::Dispatched(CommitRequest::Move {
            booking_id: id,
            new_start: at(3, 9, 30),
            new_end: at(3, 10, 30),
        })
    );
    // optimistic value is on the board before persistence finishes
    assert_eq!(t.board.get(id).unwrap().start, at(3, 9, 30));

    for handle in t.controller.take_dispatched() {
        assert!(handle.await.unwrap().is_committed());
    }
    assert_eq!(t.store.get(id).unwrap().end, at(3, 10, 30));
    assert!(t.controller.session().is_none());
}

#[tokio::test]
async fn test_horizontal_drag_changes_day_and_keeps_duration() {
    let b = booking("maria", (9, 0), (10, 30));
    let id = b.id;
    let mut t = create_test_gesture(vec![b]);

    t.controller.handle(down(DragTarget::body(id), mouse(100.0, 190.0, 0)));
    t.controller.handle(GestureInput::Move(mouse(250.0, 190.0, 10)));
    let proposal = t.controller.session().unwrap().proposed_interval;

    assert_eq!(proposal.start(), at(4, 9, 0));
    assert_eq!(proposal.end(), at(4, 10, 30));
}

#[tokio::test]
async fn test_touch_within_jitter_still_drags_after_long_press() {
    let b = booking("maria", (9, 0), (10, 0));
    let id = b.id;
    let mut t = create_test_gesture(vec![b]);

    t.controller.handle(down(DragTarget::body(id), touch(100.0, 190.0, 1_000)));
    let wobble = t.controller.handle(GestureInput::Move(touch(104.0, 193.0, 1_150)));
    assert_eq!(wobble.effect, GestureEffect::Noop(NoopReason::WithinJitter));
    assert_eq!(t.controller.phase(), GesturePhase::Armed);

    let early = t.controller.handle(GestureInput::Tick(1_300));
    assert_eq!(early.effect, GestureEffect::Noop(NoopReason::LongPressPending));

    let fired = t.controller.handle(GestureInput::Tick(1_400));
    assert_eq!(fired.to, GesturePhase::Dragging);
    assert!(matches!(fired.effect, GestureEffect::DragStarted { .. }));
}

#[tokio::test]
async fn test_touch_sample_after_deadline_starts_drag_without_tick() {
    let b = booking("maria", (9, 0), (10, 0));
    let id = b.id;
    let mut t = create_test_gesture(vec![b]);

    t.controller.handle(down(DragTarget::body(id), touch(100.0, 190.0, 0)));
    let moved = t.controller.handle(GestureInput::Move(touch(100.0, 250.0, 500)));

    assert_eq!(moved.to, GesturePhase::Dragging);
    assert_eq!(t.controller.session().unwrap().proposed_interval.start(), at(3, 10, 15));
}

#[tokio::test]
async fn test_touch_beyond_jitter_before_long_press_cancels() {
    let b = booking("maria", (9, 0), (10, 0));
    let id = b.id;
    let mut t = create_test_gesture(vec![b]);

    t.controller.handle(down(DragTarget::body(id), touch(100.0, 190.0, 0)));
    let scrolled = t.controller.handle(GestureInput::Move(touch(100.0, 230.0, 120)));

    assert_eq!(scrolled.effect, GestureEffect::Cancelled(CancelReason::JitterExceeded));
    assert_eq!(t.controller.phase(), GesturePhase::Idle);
    // the timer firing later does nothing
    let late = t.controller.handle(GestureInput::Tick(1_000));
    assert_eq!(late.effect, GestureEffect::Noop(NoopReason::NoActiveSession));
    assert_eq!(t.board.get(id).unwrap().start, at(3, 9, 0));
    assert!(t.store.update_log().is_empty());
    assert!(t.controller.take_dispatched().is_empty());
}

#[tokio::test]
async fn test_conflicting_drop_is_refused() {
    let b = booking("maria", (9, 0), (10, 0));
    let other = booking("maria", (10, 30), (11, 30));
    let (id, other_id) = (b.id, other.id);
    let mut t = create_test_gesture(vec![b, other]);

    t.controller.handle(down(DragTarget::body(id), mouse(100.0, 190.0, 0)));
    // +60 min overlaps the 10:30 booking
    let over = t.controller.handle(GestureInput::Move(mouse(100.0, 238.0, 10)));
    assert!(matches!(over.effect, GestureEffect::DragStarted { conflict: true, .. }));

    // the flag is advisory: dragging continues
    let still = t.controller.handle(GestureInput::Move(mouse(100.0, 242.0, 20)));
    assert!(matches!(still.effect, GestureEffect::ProposalUpdated { conflict: true, .. }));

    let dropped = t.controller.handle(GestureInput::Up(mouse(100.0, 242.0, 30)));
    assert_eq!(
        dropped.effect,
        GestureEffect::ConflictRejected { booking_id: id, conflicting: vec![other_id] }
    );
    assert_eq!(dropped.to, GesturePhase::Idle);
    assert_eq!(t.board.get(id).unwrap().start, at(3, 9, 0));
    assert_eq!(t.metrics.gestures_conflict_rejected(), 1);
    assert!(matches!(t.notice_rx.try_recv(), Ok(Notice::ConflictRejected { .. })));
    assert!(t.store.update_log().is_empty());
}

#[tokio::test]
async fn test_other_assignee_does_not_block_drop() {
    let b = booking("maria", (9, 0), (10, 0));
    let other = booking("jonas", (10, 30), (11, 30));
    let id = b.id;
    let mut t = create_test_gesture(vec![b, other]);

    t.controller.handle(down(DragTarget::body(id), mouse(100.0, 190.0, 0)));
    t.controller.handle(GestureInput::Move(mouse(100.0, 238.0, 10)));
    let dropped = t.controller.handle(GestureInput::Up(mouse(100.0, 238.0, 20)));

    assert!(matches!(dropped.effect, GestureEffect::Dispatched(_)));
}

#[tokio::test]
async fn test_drop_outside_grid_cancels() {
    let b = booking("maria", (9, 0), (10, 0));
    let id = b.id;
    let mut t = create_test_gesture(vec![b]);

    t.controller.handle(down(DragTarget::body(id), mouse(100.0, 190.0, 0)));
    t.controller.handle(GestureInput::Move(mouse(100.0, 120.0, 10)));
    let dropped = t.controller.handle(GestureInput::Up(mouse(100.0, 20.0, 20)));

    assert_eq!(dropped.effect, GestureEffect::Cancelled(CancelReason::OutsideGrid));
    assert_eq!(t.board.get(id).unwrap().start, at(3, 9, 0));
}

#[tokio::test]
async fn test_drop_in_place_cancels_as_unchanged() {
    let b = booking("maria", (9, 0), (10, 0));
    let id = b.id;
    let mut t = create_test_gesture(vec![b]);

    t.controller.handle(down(DragTarget::body(id), mouse(100.0, 190.0, 0)));
    t.controller.handle(GestureInput::Move(mouse(103.0, 193.0, 10)));
    let dropped = t.controller.handle(GestureInput::Up(mouse(103.0, 193.0, 20)));

    assert_eq!(dropped.effect, GestureEffect::Cancelled(CancelReason::Unchanged));
    assert!(t.controller.take_dispatched().is_empty());
}

#[tokio::test]
async fn test_resize_below_floor_keeps_previous_proposal() {
    let b = booking("maria", (9, 0), (10, 0));
    let id = b.id;
    let mut t = create_test_gesture(vec![b]);

    // end edge sits at 10:00 -> y = 40 + 16 * 12
    t.controller.handle(down(DragTarget::end_edge(id), mouse(100.0, 232.0, 0)));
    t.controller.handle(GestureInput::Move(mouse(100.0, 196.0, 10)));
    let kept = TimeInterval::new(at(3, 9, 0), at(3, 9, 15)).unwrap();
    assert_eq!(t.controller.session().unwrap().proposed_interval, kept);

    let refused = t.controller.handle(GestureInput::Move(mouse(100.0, 184.0, 20)));
    assert_eq!(refused.effect, GestureEffect::Noop(NoopReason::BelowMinimumDuration));
    assert_eq!(refused.to, GesturePhase::Dragging);
    assert_eq!(t.controller.session().unwrap().proposed_interval, kept);

    let dropped = t.controller.handle(GestureInput::Up(mouse(100.0, 170.0, 30)));
    assert_eq!(
        dropped.effect,
        GestureEffect::Dispatched(CommitRequest::Resize {
            booking_id: id,
            new_start: None,
            new_end: Some(at(3, 9, 15)),
        })
    );
}

#[tokio::test]
async fn test_first_sample_below_floor_starts_drag_on_original_interval() {
    let b = booking("maria", (9, 0), (10, 0));
    let id = b.id;
    let mut t = create_test_gesture(vec![b]);

    t.controller.handle(down(DragTarget::end_edge(id), mouse(100.0, 232.0, 0)));
    // end edge dragged onto the start: zero length
    let started = t.controller.handle(GestureInput::Move(mouse(100.0, 184.0, 10)));

    assert_eq!(started.to, GesturePhase::Dragging);
    let original = TimeInterval::new(at(3, 9, 0), at(3, 10, 0)).unwrap();
    assert_eq!(started.effect, GestureEffect::DragStarted { interval: original, conflict: false });
}

#[tokio::test]
async fn test_repeated_drops_keep_only_unsettled_tasks() {
    let b = booking("maria", (9, 0), (10, 0));
    let id = b.id;
    let mut t = create_test_gesture(vec![b]);

    for round in 0..5u32 {
        let y = 190.0 + 24.0 * f64::from(round);
        let ts = u64::from(round) * 100;
        t.controller.handle(down(DragTarget::body(id), mouse(100.0, y, ts)));
        t.controller.handle(GestureInput::Move(mouse(100.0, y + 24.0, ts + 16)));
        let dropped = t.controller.handle(GestureInput::Up(mouse(100.0, y + 24.0, ts + 32)));
        assert!(matches!(dropped.effect, GestureEffect::Dispatched(_)));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    // earlier tasks finished before the next drop and were pruned
    let remaining = t.controller.take_dispatched();
    assert_eq!(remaining.len(), 1);
    for handle in remaining {
        assert!(handle.await.unwrap().is_committed());
    }
    assert_eq!(t.store.get(id).unwrap().start, at(3, 11, 30));
    assert_eq!(t.metrics.mutations_committed(), 5);
}

#[tokio::test]
async fn test_start_edge_resize_moves_only_start() {
    let b = booking("maria", (9, 0), (10, 0));
    let id = b.id;
    let mut t = create_test_gesture(vec![b]);

    t.controller.handle(down(DragTarget::start_edge(id), mouse(100.0, 184.0, 0)));
    t.controller.handle(GestureInput::Move(mouse(100.0, 160.0, 10)));
    let dropped = t.controller.handle(GestureInput::Up(mouse(100.0, 160.0, 20)));

    assert_eq!(
        dropped.effect,
        GestureEffect::Dispatched(CommitRequest::Resize {
            booking_id: id,
            new_start: Some(at(3, 8, 30)),
            new_end: None,
        })
    );
    let current = t.board.get(id).unwrap();
    assert_eq!((current.start, current.end), (at(3, 8, 30), at(3, 10, 0)));
}

#[tokio::test]
async fn test_second_pointer_is_ignored() {
    let b = booking("maria", (9, 0), (10, 0));
    let other = booking("jonas", (12, 0), (13, 0));
    let (id, other_id) = (b.id, other.id);
    let mut t = create_test_gesture(vec![b, other]);

    t.controller.handle(down(DragTarget::body(id), mouse(100.0, 190.0, 0)));
    let second = t.controller.handle(down(DragTarget::body(other_id), touch(100.0, 300.0, 5)));
    assert_eq!(second.effect, GestureEffect::Noop(NoopReason::SessionActive));

    let stray = t.controller.handle(GestureInput::Move(touch(100.0, 330.0, 8)));
    assert_eq!(stray.effect, GestureEffect::Noop(NoopReason::PointerMismatch));
    assert_eq!(t.controller.session().unwrap().booking_id(), id);
    assert_eq!(t.controller.phase(), GesturePhase::Armed);
}

#[tokio::test]
async fn test_release_while_armed_and_explicit_cancel() {
    let b = booking("maria", (9, 0), (10, 0));
    let id = b.id;
    let mut t = create_test_gesture(vec![b]);

    t.controller.handle(down(DragTarget::body(id), touch(100.0, 190.0, 0)));
    let released = t.controller.handle(GestureInput::Up(touch(100.0, 190.0, 100)));
    assert_eq!(released.effect, GestureEffect::Cancelled(CancelReason::ReleasedBeforeDrag));

    t.controller.handle(down(DragTarget::body(id), mouse(100.0, 190.0, 200)));
    t.controller.handle(GestureInput::Move(mouse(100.0, 260.0, 210)));
    let cancelled = t.controller.handle(GestureInput::Cancel);
    assert_eq!(cancelled.from, GesturePhase::Dragging);
    assert_eq!(cancelled.effect, GestureEffect::Cancelled(CancelReason::Explicit));
    assert_eq!(t.board.get(id).unwrap().start, at(3, 9, 0));
}

#[tokio::test]
async fn test_auto_scroll_near_bottom_edge() {
    let b = booking("maria", (9, 0), (10, 0));
    let id = b.id;
    let mut t = create_test_gesture(vec![b]);

    t.controller.handle(down(DragTarget::body(id), mouse(100.0, 190.0, 0)));
    t.controller.handle(GestureInput::Move(mouse(100.0, 420.0, 10)));
    assert_eq!(t.controller.session().unwrap().proposed_interval.start(), at(3, 13, 45));

    let scrolled = t.controller.handle(GestureInput::Tick(50));
    let expected = TimeInterval::new(at(3, 14, 0), at(3, 15, 0)).unwrap();
    assert_eq!(
        scrolled.effect,
        GestureEffect::AutoScrolled { scroll_top: 12.0, interval: expected, conflict: false }
    );
    assert_eq!(scrolled.to, GesturePhase::Dragging);
    assert_eq!(t.controller.scroll_top(), 12.0);

    // away from the edges nothing scrolls
    t.controller.handle(GestureInput::Move(mouse(100.0, 250.0, 60)));
    let idle_tick = t.controller.handle(GestureInput::Tick(70));
    assert_eq!(idle_tick.effect, GestureEffect::Noop(NoopReason::NoAutoScroll));
}

#[tokio::test]
async fn test_down_on_unknown_booking_is_ignored() {
    let mut t = create_test_gesture(vec![]);
    let transition = t.controller.handle(down(DragTarget::body(BookingId::new()), mouse(1.0, 1.0, 0)));
    assert_eq!(transition.effect, GestureEffect::Noop(NoopReason::UnknownBooking));
    assert_eq!(transition.to, GesturePhase::Idle);
}
