//! Optimistic mutation coordinator
//!
//! An edit is applied to the board at staging time, before the store has
//! answered. Persistence then runs on its own task:
//! - success keeps the optimistic value and emits a committed notice
//! - failure or timeout restores the touched fields and emits a rollback notice
//!
//! Edits of one booking reach the store in staging order when
//! `mutation.serialize_per_booking` is on. Without it, whichever store call
//! finishes last wins, and the board follows the store on every commit.
//!
//! A staged edit that is dropped before it settles rolls itself back.

mod command;

pub use command::{CommitRequest, MutationCommand, MutationKind};

use crate::domain::{BookingId, BookingPatch, ScheduleError};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::{BookingStore, Notice, NoticeSender};
use crate::services::board::BookingBoard;
use crate::services::conflict::{self, ConflictCandidate};
use chrono::{Duration as ChronoDuration, NaiveDateTime};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Final result of one edit
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    /// The store confirmed the patch
    Committed { booking_id: BookingId, patch: BookingPatch },
    /// Refused at staging or rolled back after persistence failed
    Rejected { booking_id: BookingId, error: ScheduleError },
}

impl MutationOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, MutationOutcome::Committed { .. })
    }

    pub fn error(&self) -> Option<&ScheduleError> {
        match self {
            MutationOutcome::Committed { .. } => None,
            MutationOutcome::Rejected { error, .. } => Some(error),
        }
    }
}

/// A command applied to the board and waiting to be persisted
pub(crate) struct StagedMutation {
    seq: u64,
    command: MutationCommand,
    /// Completion signal of the previous edit of the same booking
    wait_for: Option<oneshot::Receiver<()>>,
    /// Fired once this edit has settled
    done: Option<oneshot::Sender<()>>,
    settled: bool,
    coordinator: MutationCoordinator,
}

impl fmt::Debug for StagedMutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagedMutation")
            .field("seq", &self.seq)
            .field("command", &self.command)
            .field("settled", &self.settled)
            .finish_non_exhaustive()
    }
}

impl Drop for StagedMutation {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        // never reached the store, or its persist future was cancelled
        let error = ScheduleError::Persistence("edit abandoned before the store answered".into());
        self.coordinator.settle_failed(self.seq, &self.command, error);
        self.coordinator.release(self.seq, self.command.booking_id, self.done.take());
    }
}

/// Edit that has been applied but not yet settled
#[derive(Debug)]
struct InFlight {
    seq: u64,
    after: BookingPatch,
    /// Value to restore on failure; rebased when an earlier edit fails
    before: BookingPatch,
}

#[derive(Default)]
struct Registry {
    next_seq: u64,
    in_flight: FxHashMap<BookingId, Vec<InFlight>>,
    /// Last staged edit per booking and its completion signal
    tails: FxHashMap<BookingId, (u64, oneshot::Receiver<()>)>,
}

#[derive(Clone)]
pub struct MutationCoordinator {
    board: Arc<BookingBoard>,
    store: Arc<dyn BookingStore>,
    notices: NoticeSender,
    metrics: Arc<Metrics>,
    /// Lock order: registry, then board
    registry: Arc<Mutex<Registry>>,
    serialize_per_booking: bool,
    persist_timeout: Option<Duration>,
    min_duration: ChronoDuration,
}

impl MutationCoordinator {
    pub fn new(
        config: &Config,
        board: Arc<BookingBoard>,
        store: Arc<dyn BookingStore>,
        notices: NoticeSender,
        metrics: Arc<Metrics>,
    ) -> Self {
        let persist_timeout = match config.persist_timeout_ms() {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        Self {
            board,
            store,
            notices,
            metrics,
            registry: Arc::new(Mutex::new(Registry::default())),
            serialize_per_booking: config.serialize_per_booking(),
            persist_timeout,
            min_duration: ChronoDuration::minutes(i64::from(config.min_duration_minutes())),
        }
    }

    pub fn board(&self) -> &Arc<BookingBoard> {
        &self.board
    }

    /// Number of edits applied to the board and not yet settled
    pub fn pending(&self) -> usize {
        self.registry.lock().in_flight.values().map(Vec::len).sum()
    }

    /// Move a booking and wait for the store
    pub async fn move_booking(
        &self,
        booking_id: BookingId,
        new_start: NaiveDateTime,
        new_end: NaiveDateTime,
    ) -> MutationOutcome {
        self.run(CommitRequest::Move { booking_id, new_start, new_end }).await
    }

    /// Move one or both boundaries and wait for the store
    pub async fn resize_booking(
        &self,
        booking_id: BookingId,
        new_start: Option<NaiveDateTime>,
        new_end: Option<NaiveDateTime>,
    ) -> MutationOutcome {
        self.run(CommitRequest::Resize { booking_id, new_start, new_end }).await
    }

    async fn run(&self, request: CommitRequest) -> MutationOutcome {
        match self.stage(request) {
            Ok(staged) => self.persist(staged).await,
            Err(error) => MutationOutcome::Rejected { booking_id: request.booking_id(), error },
        }
    }

    /// Stage synchronously and persist on a spawned task
    ///
    /// Staging errors are returned directly; the board is untouched in that
    /// case. Must be called from within a tokio runtime.
    pub fn dispatch(
        &self,
        request: CommitRequest,
    ) -> Result<JoinHandle<MutationOutcome>, ScheduleError> {
        let staged = self.stage(request)?;
        let coordinator = self.clone();
        Ok(tokio::spawn(async move { coordinator.persist(staged).await }))
    }

    /// Validate, conflict-check and apply the edit to the board
    pub(crate) fn stage(&self, request: CommitRequest) -> Result<StagedMutation, ScheduleError> {
        let booking_id = request.booking_id();
        let result = self.stage_inner(request);
        if let Err(e) = &result {
            self.metrics.record_mutation_rejected();
            if let ScheduleError::Conflict { conflicting, .. } = e {
                self.notices.send(Notice::ConflictRejected {
                    booking_id,
                    conflicting: conflicting.clone(),
                });
            }
            warn!(
                booking_id = %booking_id,
                kind = %request.kind().as_str(),
                error_kind = %e.kind(),
                error = %e,
                "mutation_rejected"
            );
        }
        result
    }

    fn stage_inner(&self, request: CommitRequest) -> Result<StagedMutation, ScheduleError> {
        let booking_id = request.booking_id();
        if let CommitRequest::Resize { new_start: None, new_end: None, .. } = request {
            return Err(ScheduleError::Validation("resize must move at least one boundary".into()));
        }

        let mut registry = self.registry.lock();
        let command = self.board.with_write(|bookings| {
            let booking =
                bookings.get(&booking_id).ok_or(ScheduleError::BookingNotFound(booking_id))?;
            let command = MutationCommand::capture(booking, &request);
            let proposed = command.proposed_interval(booking)?;

            if command.kind == MutationKind::Resize && proposed.duration() < self.min_duration {
                return Err(ScheduleError::Validation(format!(
                    "duration {} min is below the {} min minimum",
                    proposed.duration().num_minutes(),
                    self.min_duration.num_minutes()
                )));
            }

            let candidate = ConflictCandidate::for_booking(booking, proposed);
            let conflicting = conflict::find_conflicts(&candidate, bookings.values());
            if !conflicting.is_empty() {
                return Err(ScheduleError::Conflict { booking_id, conflicting });
            }

            if let Some(booking) = bookings.get_mut(&booking_id) {
                command.apply_to(booking);
            }
            Ok(command)
        })?;

        registry.next_seq += 1;
        let seq = registry.next_seq;
        registry.in_flight.entry(booking_id).or_default().push(InFlight {
            seq,
            after: command.after,
            before: command.before,
        });

        let (wait_for, done) = if self.serialize_per_booking {
            let (tx, rx) = oneshot::channel();
            let previous = registry.tails.insert(booking_id, (seq, rx));
            (previous.map(|(_, rx)| rx), Some(tx))
        } else {
            (None, None)
        };

        debug!(
            booking_id = %booking_id,
            seq = %seq,
            kind = %command.kind.as_str(),
            start = ?command.after.start,
            end = ?command.after.end,
            queued = %wait_for.is_some(),
            "mutation_staged"
        );
        drop(registry);
        Ok(StagedMutation {
            seq,
            command,
            wait_for,
            done,
            settled: false,
            coordinator: self.clone(),
        })
    }

    /// Send a staged edit to the store and settle the board
    pub(crate) async fn persist(&self, mut staged: StagedMutation) -> MutationOutcome {
        if let Some(previous) = staged.wait_for.take() {
            // Err still means the previous edit is over
            let _ = previous.await;
        }

        let (seq, command) = (staged.seq, staged.command.clone());
        let started = Instant::now();
        let update = self.store.update(command.booking_id, command.after);
        let result = match self.persist_timeout {
            Some(limit) => match tokio::time::timeout(limit, update).await {
                Ok(r) => r.map_err(ScheduleError::from),
                Err(_) => Err(ScheduleError::PersistTimeout(limit.as_millis() as u64)),
            },
            None => update.await.map_err(ScheduleError::from),
        };
        let latency_ms = started.elapsed().as_millis() as u64;
        self.metrics.record_persist_latency(latency_ms);

        let outcome = match result {
            Ok(()) => self.settle_committed(seq, &command, latency_ms),
            Err(error) => self.settle_failed(seq, &command, error),
        };

        staged.settled = true;
        self.release(seq, command.booking_id, staged.done.take());
        outcome
    }

    fn settle_committed(
        &self,
        seq: u64,
        command: &MutationCommand,
        latency_ms: u64,
    ) -> MutationOutcome {
        let booking_id = command.booking_id;
        let mut registry = self.registry.lock();
        take_in_flight(&mut registry, booking_id, seq);
        if !self.serialize_per_booking {
            // the store now holds this edit; a newer pending edit keeps its field
            let newer = registry.in_flight.get(&booking_id).map(Vec::as_slice).unwrap_or_default();
            let write_start = !newer.iter().any(|e| e.seq > seq && e.after.start.is_some());
            let write_end = !newer.iter().any(|e| e.seq > seq && e.after.end.is_some());
            if command.restricted_to(write_start, write_end).apply(&self.board).is_err() {
                debug!(booking_id = %booking_id, seq = %seq, "committed_booking_gone");
            }
        }
        drop(registry);

        self.metrics.record_mutation_committed();
        self.notices
            .send(Notice::MutationCommitted { booking_id: command.booking_id, patch: command.after });
        info!(
            booking_id = %command.booking_id,
            seq = %seq,
            kind = %command.kind.as_str(),
            latency_ms = %latency_ms,
            "mutation_committed"
        );
        MutationOutcome::Committed { booking_id: command.booking_id, patch: command.after }
    }

    /// Restore the touched fields, handing a field to the next in-flight edit
    /// of it instead when one exists
    fn settle_failed(
        &self,
        seq: u64,
        command: &MutationCommand,
        error: ScheduleError,
    ) -> MutationOutcome {
        let booking_id = command.booking_id;
        let restored = {
            let mut registry = self.registry.lock();
            let before = take_in_flight(&mut registry, booking_id, seq)
                .map(|entry| entry.before)
                .unwrap_or(command.before);

            let mut restore_start = command.after.start.is_some();
            let mut restore_end = command.after.end.is_some();
            if let Some(later) = registry.in_flight.get_mut(&booking_id) {
                if restore_start {
                    if let Some(next) =
                        later.iter_mut().filter(|e| e.seq > seq).find(|e| e.after.start.is_some())
                    {
                        next.before.start = before.start;
                        restore_start = false;
                    }
                }
                if restore_end {
                    if let Some(next) =
                        later.iter_mut().filter(|e| e.seq > seq).find(|e| e.after.end.is_some())
                    {
                        next.before.end = before.end;
                        restore_end = false;
                    }
                }
            }

            let rebased = MutationCommand { before, ..command.clone() };
            rebased.restricted_to(restore_start, restore_end).rollback(&self.board)
        };

        let timed_out = matches!(error, ScheduleError::PersistTimeout(_));
        self.metrics.record_mutation_rolled_back(timed_out);
        self.notices.send(Notice::rolled_back(booking_id, &error));
        warn!(
            booking_id = %booking_id,
            seq = %seq,
            kind = %command.kind.as_str(),
            error_kind = %error.kind(),
            error = %error,
            restored_start = ?restored.start,
            restored_end = ?restored.end,
            "mutation_rolled_back"
        );
        MutationOutcome::Rejected { booking_id, error }
    }

    /// Let the next queued edit of the booking proceed
    fn release(&self, seq: u64, booking_id: BookingId, done: Option<oneshot::Sender<()>>) {
        let mut registry = self.registry.lock();
        if registry.tails.get(&booking_id).is_some_and(|(tail, _)| *tail == seq) {
            registry.tails.remove(&booking_id);
        }
        drop(registry);
        if let Some(done) = done {
            let _ = done.send(());
        }
    }
}

fn take_in_flight(registry: &mut Registry, booking_id: BookingId, seq: u64) -> Option<InFlight> {
    let entries = registry.in_flight.get_mut(&booking_id)?;
    let index = entries.iter().position(|e| e.seq == seq)?;
    let entry = entries.remove(index);
    if entries.is_empty() {
        registry.in_flight.remove(&booking_id);
    }
    Some(entry)
}
