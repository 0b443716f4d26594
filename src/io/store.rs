//! Booking persistence collaborator
//!
//! The dashboard keeps bookings in a hosted backend. The engine only needs a
//! range-filtered read and a partial update that leaves unspecified fields
//! alone, so that is the whole trait.

use crate::domain::{Booking, BookingId, BookingPatch, DateWindow, StoreError, TenantId};
use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Bookings of a tenant overlapping the window
    async fn fetch_range(
        &self,
        tenant: &TenantId,
        window: &DateWindow,
    ) -> Result<Vec<Booking>, StoreError>;

    /// Write only the fields set in the patch
    async fn update(&self, id: BookingId, patch: BookingPatch) -> Result<(), StoreError>;
}

/// In-process store used by tests and the command-line driver
///
/// Supports injected failures and per-call latency so rollback and ordering
/// paths can be exercised without a backend.
#[derive(Default)]
pub struct InMemoryBookingStore {
    bookings: Mutex<FxHashMap<BookingId, (TenantId, Booking)>>,
    fail_updates: AtomicBool,
    fail_next: AtomicU32,
    latencies: Mutex<VecDeque<Duration>>,
    default_latency: Mutex<Duration>,
    update_log: Mutex<Vec<(BookingId, BookingPatch)>>,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bookings(tenant: &TenantId, bookings: impl IntoIterator<Item = Booking>) -> Self {
        let store = Self::new();
        for booking in bookings {
            store.insert(tenant, booking);
        }
        store
    }

    pub fn insert(&self, tenant: &TenantId, booking: Booking) {
        self.bookings.lock().insert(booking.id, (tenant.clone(), booking));
    }

    pub fn get(&self, id: BookingId) -> Option<Booking> {
        self.bookings.lock().get(&id).map(|(_, b)| b.clone())
    }

    /// Fail every update until switched off
    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::Relaxed);
    }

    /// Fail the next `count` updates
    pub fn fail_next(&self, count: u32) {
        self.fail_next.store(count, Ordering::Relaxed);
    }

    /// Latency applied to calls without a queued latency
    pub fn set_latency(&self, latency: Duration) {
        *self.default_latency.lock() = latency;
    }

    /// Queue a latency for the next update call
    pub fn push_latency(&self, latency: Duration) {
        self.latencies.lock().push_back(latency);
    }

    /// Patches in the order the store received them
    pub fn update_log(&self) -> Vec<(BookingId, BookingPatch)> {
        self.update_log.lock().clone()
    }

    fn next_latency(&self) -> Duration {
        self.latencies.lock().pop_front().unwrap_or_else(|| *self.default_latency.lock())
    }

    fn should_fail(&self) -> bool {
        if self.fail_updates.load(Ordering::Relaxed) {
            return true;
        }
        self.fail_next
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn fetch_range(
        &self,
        tenant: &TenantId,
        window: &DateWindow,
    ) -> Result<Vec<Booking>, StoreError> {
        let mut bookings: Vec<Booking> = self
            .bookings
            .lock()
            .values()
            .filter(|(t, b)| t == tenant && window.contains(b))
            .map(|(_, b)| b.clone())
            .collect();
        bookings.sort_by_key(|b| (b.start, b.id));
        Ok(bookings)
    }

    async fn update(&self, id: BookingId, patch: BookingPatch) -> Result<(), StoreError> {
        // Decide failure at call time so queued failures map to call order
        let fail = self.should_fail();
        let latency = self.next_latency();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if fail {
            debug!(booking_id = %id, "store_update_failed_injected");
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }

        let mut bookings = self.bookings.lock();
        let Some((_, booking)) = bookings.get_mut(&id) else {
            return Err(StoreError::NotFound(id));
        };
        patch.apply_to(booking);
        self.update_log.lock().push((id, patch));
        debug!(booking_id = %id, start = ?patch.start, end = ?patch.end, "store_updated");
        Ok(())
    }
}
