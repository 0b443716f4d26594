//! Credit-metered route planning
//!
//! Sequences one staff member's visits with the nearest-neighbor heuristic.
//! Planning checks the tenant balance; acceptance re-checks it and appends a
//! single debit entry. A refused request leaves the ledger untouched.
//! Charges against one wallet run one at a time, so concurrent accepts cannot
//! both pass the balance check.

pub mod geo;
pub mod nearest;

use crate::domain::{
    CustomerRef, RouteCandidate, RouteResult, RouteStop, ScheduleError, SiteLocation, StaffId,
    TenantId,
};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::{CreditLedger, Notice, NoticeSender};
use crate::services::board::BookingBoard;
use chrono::NaiveDate;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Minimum number of geolocated stops for a route
const MIN_ROUTE_POINTS: usize = 2;

/// Tenant wallet the planner charges
pub struct WalletContext {
    tenant: TenantId,
    ledger: Arc<dyn CreditLedger>,
    /// Last balance read from or written to the ledger
    balance: Mutex<Option<Decimal>>,
    /// Held from the balance check through the debit append
    charging: tokio::sync::Mutex<()>,
}

impl WalletContext {
    pub fn new(tenant: TenantId, ledger: Arc<dyn CreditLedger>) -> Self {
        Self { tenant, ledger, balance: Mutex::new(None), charging: tokio::sync::Mutex::new(()) }
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    pub fn ledger(&self) -> &Arc<dyn CreditLedger> {
        &self.ledger
    }

    /// Cached balance for display; `None` before the first ledger read
    pub fn cached_balance(&self) -> Option<Decimal> {
        *self.balance.lock()
    }

    /// Read the balance from the ledger and refresh the cache
    pub async fn refresh_balance(&self) -> Result<Decimal, ScheduleError> {
        let balance = self.ledger.balance(&self.tenant).await?;
        *self.balance.lock() = Some(balance);
        Ok(balance)
    }
}

/// Planned route not yet charged
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutePlan {
    pub stops: Vec<RouteStop>,
    pub total_distance_m: f64,
    pub cost: Decimal,
    /// Candidates dropped for missing or invalid coordinates
    pub skipped: usize,
}

pub struct RoutePlanner {
    wallet: WalletContext,
    cost_per_use: Decimal,
    notices: NoticeSender,
    metrics: Arc<Metrics>,
}

impl RoutePlanner {
    pub fn new(
        config: &Config,
        wallet: WalletContext,
        notices: NoticeSender,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { wallet, cost_per_use: config.route_cost_per_use(), notices, metrics }
    }

    pub fn wallet(&self) -> &WalletContext {
        &self.wallet
    }

    pub fn cost_per_use(&self) -> Decimal {
        self.cost_per_use
    }

    /// Order the geolocated candidates, starting from the earliest scheduled
    pub async fn optimize_route(
        &self,
        candidates: &[RouteCandidate],
    ) -> Result<RoutePlan, ScheduleError> {
        let result = self.plan(candidates).await;
        if let Err(e) = &result {
            self.refused(e);
        }
        result
    }

    async fn plan(&self, candidates: &[RouteCandidate]) -> Result<RoutePlan, ScheduleError> {
        let points: Vec<_> = candidates.iter().filter_map(RouteCandidate::to_point).collect();
        if points.len() < MIN_ROUTE_POINTS {
            self.metrics.record_route_insufficient_data();
            return Err(ScheduleError::InsufficientData { geolocated: points.len() });
        }
        let skipped = candidates.len() - points.len();

        self.ensure_funds().await?;

        let (stops, total_distance_m) = nearest::sequence(points);
        self.metrics.record_route_plan();
        info!(
            tenant = %self.wallet.tenant,
            stops = %stops.len(),
            skipped = %skipped,
            total_distance_m = %format!("{total_distance_m:.0}"),
            "route_planned"
        );
        Ok(RoutePlan { stops, total_distance_m, cost: self.cost_per_use, skipped })
    }

    /// Charge the tenant and hand back the ordered route
    pub async fn accept(&self, plan: RoutePlan) -> Result<RouteResult, ScheduleError> {
        let result = self.charge(plan).await;
        if let Err(e) = &result {
            self.refused(e);
        }
        result
    }

    async fn charge(&self, plan: RoutePlan) -> Result<RouteResult, ScheduleError> {
        let _charging = self.wallet.charging.lock().await;
        let balance = self.ensure_funds().await?;
        let description = format!("route optimization ({} stops)", plan.stops.len());
        self.wallet
            .ledger
            .append_entry(&self.wallet.tenant, -self.cost_per_use, &description)
            .await?;

        let remaining = balance - self.cost_per_use;
        *self.wallet.balance.lock() = Some(remaining);
        self.metrics.record_route_charge();
        self.notices.send(Notice::RouteCharged {
            stops: plan.stops.len(),
            cost: self.cost_per_use,
            balance: remaining,
        });
        info!(
            tenant = %self.wallet.tenant,
            cost = %self.cost_per_use,
            balance = %remaining,
            "route_charged"
        );
        Ok(RouteResult {
            stops: plan.stops,
            total_distance_m: plan.total_distance_m,
            credit_cost: self.cost_per_use,
        })
    }

    /// Plan and charge in one step
    pub async fn plan_and_accept(
        &self,
        candidates: &[RouteCandidate],
    ) -> Result<RouteResult, ScheduleError> {
        let plan = self.optimize_route(candidates).await?;
        self.accept(plan).await
    }

    /// Candidates for one staff member's day from the board
    ///
    /// Bookings whose customer has no known location are kept without
    /// coordinates so the caller can report them as skipped.
    pub fn candidates_for(
        board: &BookingBoard,
        staff: &StaffId,
        day: NaiveDate,
        locations: &FxHashMap<CustomerRef, SiteLocation>,
    ) -> Vec<RouteCandidate> {
        board
            .bookings_for(staff, day)
            .iter()
            .map(|b| {
                let location = locations.get(&b.customer_ref).map(|l| l.point);
                RouteCandidate::from_booking(b, &b.customer_ref.0, location)
            })
            .collect()
    }

    /// Fresh balance, or `InsufficientFunds` when below the per-use cost
    async fn ensure_funds(&self) -> Result<Decimal, ScheduleError> {
        let balance = self.wallet.refresh_balance().await?;
        if balance < self.cost_per_use {
            self.metrics.record_route_insufficient_funds();
            return Err(ScheduleError::InsufficientFunds { balance, cost: self.cost_per_use });
        }
        Ok(balance)
    }

    fn refused(&self, error: &ScheduleError) {
        self.notices.send(Notice::route_refused(error));
        warn!(tenant = %self.wallet.tenant, error_kind = %error.kind(), error = %error, "route_refused");
    }
}
