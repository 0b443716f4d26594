//! In-memory booking board
//!
//! The board is the one collection shared between the gesture controller
//! (reads) and the mutation coordinator (writes). It holds the optimistic
//! view: confirmed values plus any edit still waiting on the store.

use crate::domain::{Booking, BookingId, DateWindow, ScheduleError, StaffId, TenantId};
use crate::io::BookingStore;
use crate::services::conflict::{self, ConflictCandidate};
use chrono::NaiveDate;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::info;

#[derive(Default)]
pub struct BookingBoard {
    bookings: RwLock<FxHashMap<BookingId, Booking>>,
}

impl BookingBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bookings(bookings: impl IntoIterator<Item = Booking>) -> Self {
        let board = Self::new();
        {
            let mut map = board.bookings.write();
            for booking in bookings {
                map.insert(booking.id, booking);
            }
        }
        board
    }

    /// Replace the board contents with the tenant's bookings in the window
    pub async fn load_window(
        &self,
        store: &dyn BookingStore,
        tenant: &TenantId,
        window: &DateWindow,
    ) -> Result<usize, ScheduleError> {
        let bookings = store.fetch_range(tenant, window).await?;
        let count = bookings.len();
        let mut map = self.bookings.write();
        map.clear();
        map.extend(bookings.into_iter().map(|b| (b.id, b)));
        info!(tenant = %tenant, bookings = %count, "board_loaded");
        Ok(count)
    }

    pub fn get(&self, id: BookingId) -> Option<Booking> {
        self.bookings.read().get(&id).cloned()
    }

    pub fn contains(&self, id: BookingId) -> bool {
        self.bookings.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.bookings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookings.read().is_empty()
    }

    /// All bookings ordered by start time
    pub fn snapshot(&self) -> Vec<Booking> {
        let mut bookings: Vec<Booking> = self.bookings.read().values().cloned().collect();
        bookings.sort_by_key(|b| (b.start, b.id));
        bookings
    }

    /// Bookings of one staff member starting on the given day, ordered by start
    pub fn bookings_for(&self, staff: &StaffId, day: NaiveDate) -> Vec<Booking> {
        let mut bookings: Vec<Booking> = self
            .bookings
            .read()
            .values()
            .filter(|b| b.assignee.as_ref() == Some(staff) && b.start.date() == day)
            .cloned()
            .collect();
        bookings.sort_by_key(|b| (b.start, b.id));
        bookings
    }

    pub fn upsert(&self, booking: Booking) {
        self.bookings.write().insert(booking.id, booking);
    }

    pub fn remove(&self, id: BookingId) -> Option<Booking> {
        self.bookings.write().remove(&id)
    }

    /// Live conflict check against everything on the board
    pub fn has_conflict(&self, candidate: &ConflictCandidate) -> bool {
        conflict::has_conflict(candidate, self.bookings.read().values())
    }

    pub fn conflicts(&self, candidate: &ConflictCandidate) -> Vec<BookingId> {
        conflict::find_conflicts(candidate, self.bookings.read().values())
    }

    /// Mutate one booking in place; `None` when it is not on the board
    pub fn update<R>(&self, id: BookingId, f: impl FnOnce(&mut Booking) -> R) -> Option<R> {
        self.bookings.write().get_mut(&id).map(f)
    }

    /// Run `f` with exclusive access to the whole board
    ///
    /// Used where a check over all bookings and a write must not interleave
    /// with other writers.
    pub(crate) fn with_write<R>(&self, f: impl FnOnce(&mut FxHashMap<BookingId, Booking>) -> R) -> R {
        f(&mut self.bookings.write())
    }
}
