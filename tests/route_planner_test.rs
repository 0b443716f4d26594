//! Route planning against a file-backed credit ledger

use chrono::NaiveDate;
use dispatch_core::domain::{ScheduleError, StaffId, TenantId};
use dispatch_core::infra::{Config, Metrics};
use dispatch_core::io::{create_notice_channel, BoardFixture, CreditLedger, JsonlCreditLedger, Notice};
use dispatch_core::services::{BookingBoard, RoutePlanner, WalletContext};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::mpsc;

const FIXTURE: &str = r#"{
    "bookings": [
        { "id": "0190a0b4-3c1e-7d2a-9f00-000000000001", "start": "2024-06-03T08:00:00",
          "end": "2024-06-03T09:00:00", "assignee": "ana", "customer_ref": "origin" },
        { "id": "0190a0b4-3c1e-7d2a-9f00-000000000002", "start": "2024-06-03T10:00:00",
          "end": "2024-06-03T11:00:00", "assignee": "ana", "customer_ref": "diagonal" },
        { "id": "0190a0b4-3c1e-7d2a-9f00-000000000003", "start": "2024-06-03T12:00:00",
          "end": "2024-06-03T13:00:00", "assignee": "ana", "customer_ref": "east" },
        { "id": "0190a0b4-3c1e-7d2a-9f00-000000000004", "start": "2024-06-03T14:00:00",
          "end": "2024-06-03T15:00:00", "assignee": "ana", "customer_ref": "unknown-site" },
        { "id": "0190a0b4-3c1e-7d2a-9f00-000000000005", "start": "2024-06-03T09:00:00",
          "end": "2024-06-03T10:00:00", "assignee": "ben", "customer_ref": "east" }
    ],
    "locations": {
        "origin": { "lat": 0.0, "lng": 0.0 },
        "east": { "lat": 0.0, "lng": 1.0 },
        "diagonal": { "lat": 1.0, "lng": 1.0 }
    }
}"#;

struct Harness {
    planner: RoutePlanner,
    ledger: Arc<JsonlCreditLedger>,
    board: BookingBoard,
    fixture: BoardFixture,
    tenant: TenantId,
    notice_rx: mpsc::Receiver<Notice>,
    _dir: tempfile::TempDir,
}

async fn harness(starting_balance: Decimal) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let tenant = TenantId::new("acme");
    let ledger = Arc::new(JsonlCreditLedger::new(dir.path().join("credits.jsonl")));
    if !starting_balance.is_zero() {
        ledger.append_entry(&tenant, starting_balance, "top-up").await.unwrap();
    }

    let fixture = BoardFixture::from_json(FIXTURE).unwrap();
    let board = BookingBoard::from_bookings(fixture.bookings.clone());
    let metrics = Arc::new(Metrics::new());
    let (notices, notice_rx) = create_notice_channel(16, metrics.clone());
    let wallet = WalletContext::new(tenant.clone(), ledger.clone());
    let planner = RoutePlanner::new(&Config::default(), wallet, notices, metrics);
    Harness { planner, ledger, board, fixture, tenant, notice_rx, _dir: dir }
}

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()
}

#[tokio::test]
async fn test_accept_debits_once_and_orders_by_proximity() {
    let mut h = harness(Decimal::new(100, 2)).await;
    let candidates =
        RoutePlanner::candidates_for(&h.board, &StaffId::new("ana"), day(), &h.fixture.locations());
    assert_eq!(candidates.len(), 4);

    let plan = h.planner.optimize_route(&candidates).await.unwrap();
    assert_eq!(plan.skipped, 1);
    // planning alone does not charge
    assert_eq!(h.ledger.entries(&h.tenant).await.unwrap().len(), 1);

    let route = h.planner.accept(plan).await.unwrap();
    let labels: Vec<_> = route.stops.iter().map(|s| s.point.label.as_str()).collect();
    assert_eq!(labels, vec!["origin", "east", "diagonal"]);
    let sequences: Vec<_> = route.stops.iter().map(|s| s.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3]);
    // one degree along the equator, then one degree along a meridian
    assert!((route.total_distance_m - 2.0 * 111_194.93).abs() < 30.0, "{}", route.total_distance_m);
    assert_eq!(route.credit_cost, Decimal::new(50, 2));

    let entries = h.ledger.entries(&h.tenant).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].amount, Decimal::new(-50, 2));
    assert_eq!(h.ledger.balance(&h.tenant).await.unwrap(), Decimal::new(50, 2));
    assert_eq!(h.planner.wallet().cached_balance(), Some(Decimal::new(50, 2)));

    let notice = h.notice_rx.try_recv().unwrap();
    assert_eq!(
        notice,
        Notice::RouteCharged { stops: 3, cost: Decimal::new(50, 2), balance: Decimal::new(50, 2) }
    );
}

#[tokio::test]
async fn test_low_balance_is_refused_without_ledger_write() {
    let mut h = harness(Decimal::new(40, 2)).await;
    let candidates =
        RoutePlanner::candidates_for(&h.board, &StaffId::new("ana"), day(), &h.fixture.locations());

    let err = h.planner.plan_and_accept(&candidates).await.unwrap_err();
    assert_eq!(
        err,
        ScheduleError::InsufficientFunds { balance: Decimal::new(40, 2), cost: Decimal::new(50, 2) }
    );
    assert_eq!(h.ledger.entries(&h.tenant).await.unwrap().len(), 1);
    assert!(matches!(
        h.notice_rx.try_recv().unwrap(),
        Notice::RouteRefused { kind: "insufficient_funds", .. }
    ));
}

#[tokio::test]
async fn test_single_geolocated_booking_is_insufficient_data() {
    let h = harness(Decimal::ZERO).await;
    // ben has one booking with a known site
    let candidates =
        RoutePlanner::candidates_for(&h.board, &StaffId::new("ben"), day(), &h.fixture.locations());
    assert_eq!(candidates.len(), 1);

    let err = h.planner.optimize_route(&candidates).await.unwrap_err();
    assert_eq!(err, ScheduleError::InsufficientData { geolocated: 1 });
}

#[tokio::test]
async fn test_second_accept_after_drain_is_refused() {
    let h = harness(Decimal::new(75, 2)).await;
    let candidates =
        RoutePlanner::candidates_for(&h.board, &StaffId::new("ana"), day(), &h.fixture.locations());

    let first = h.planner.optimize_route(&candidates).await.unwrap();
    let second = h.planner.optimize_route(&candidates).await.unwrap();
    h.planner.accept(first).await.unwrap();

    let err = h.planner.accept(second).await.unwrap_err();
    assert!(matches!(err, ScheduleError::InsufficientFunds { .. }));
    assert_eq!(h.ledger.balance(&h.tenant).await.unwrap(), Decimal::new(25, 2));
}
