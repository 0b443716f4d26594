//! Typed channel for user-facing notices
//!
//! Mutation and route outcomes are surfaced to the dashboard through a
//! bounded mpsc channel. Sending never blocks; a full channel drops the
//! notice and counts it.

use crate::domain::{BookingId, BookingPatch, ScheduleError};
use crate::infra::metrics::Metrics;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Messages delivered to the notification surface
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum Notice {
    /// Store confirmed the change
    MutationCommitted { booking_id: BookingId, patch: BookingPatch },
    /// Store failed or timed out and the board was restored
    MutationRolledBack {
        booking_id: BookingId,
        kind: &'static str,
        reason: String,
    },
    /// A drop landed on an occupied slot and was refused
    ConflictRejected { booking_id: BookingId, conflicting: Vec<BookingId> },
    /// Route accepted and credits deducted
    RouteCharged { stops: usize, cost: Decimal, balance: Decimal },
    /// Route refused before any charge
    RouteRefused { kind: &'static str, reason: String },
}

impl Notice {
    pub fn rolled_back(booking_id: BookingId, error: &ScheduleError) -> Self {
        Notice::MutationRolledBack { booking_id, kind: error.kind(), reason: error.to_string() }
    }

    pub fn route_refused(error: &ScheduleError) -> Self {
        Notice::RouteRefused { kind: error.kind(), reason: error.to_string() }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Sender handle for notices
///
/// Clone this to share across producers. Without a channel (`disabled`) every
/// send is a no-op.
#[derive(Clone)]
pub struct NoticeSender {
    tx: Option<mpsc::Sender<Notice>>,
    metrics: Arc<Metrics>,
}

impl NoticeSender {
    pub fn new(tx: mpsc::Sender<Notice>, metrics: Arc<Metrics>) -> Self {
        Self { tx: Some(tx), metrics }
    }

    /// Sender that discards everything
    pub fn disabled(metrics: Arc<Metrics>) -> Self {
        Self { tx: None, metrics }
    }

    pub fn send(&self, notice: Notice) {
        let Some(tx) = &self.tx else {
            return;
        };
        if let Err(e) = tx.try_send(notice) {
            self.metrics.record_notice_dropped();
            debug!(error = %e, "notice_dropped");
        }
    }
}

/// Create a notice channel pair
///
/// Returns (sender, receiver) where the sender can be cloned and shared.
pub fn create_notice_channel(
    buffer_size: usize,
    metrics: Arc<Metrics>,
) -> (NoticeSender, mpsc::Receiver<Notice>) {
    let (tx, rx) = mpsc::channel(buffer_size.max(1));
    (NoticeSender::new(tx, metrics), rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_full_channel_drops_and_counts() {
        let metrics = Arc::new(Metrics::new());
        let (sender, mut rx) = create_notice_channel(1, metrics.clone());
        let id = BookingId::new();

        sender.send(Notice::ConflictRejected { booking_id: id, conflicting: vec![] });
        sender.send(Notice::ConflictRejected { booking_id: id, conflicting: vec![] });

        assert_eq!(metrics.notices_dropped(), 1);
        assert!(matches!(rx.recv().await, Some(Notice::ConflictRejected { .. })));
    }

    #[test]
    fn test_rolled_back_notice_json() {
        let id = BookingId::new();
        let notice = Notice::rolled_back(id, &ScheduleError::PersistTimeout(250));
        let json = notice.to_json();
        assert!(json.contains("\"t\":\"mutation_rolled_back\""));
        assert!(json.contains("\"kind\":\"persist_timeout\""));
    }

    #[test]
    fn test_disabled_sender_is_silent() {
        let metrics = Arc::new(Metrics::new());
        let sender = NoticeSender::disabled(metrics.clone());
        sender.send(Notice::route_refused(&ScheduleError::InsufficientData { geolocated: 1 }));
        assert_eq!(metrics.notices_dropped(), 0);
    }
}
