//! dispatch-core - booking scheduling engine driver
//!
//! Runs the engine against a JSON board fixture without a UI host:
//! - `route` - plan one staff member's day and optionally charge the tenant
//! - `replay` - feed a scripted pointer session through the gesture controller
//!   and the optimistic mutation coordinator
//!
//! Results go to stdout as JSON; logs go to stderr.

use anyhow::Context;
use chrono::{Days, NaiveDate, NaiveTime};
use clap::{Parser, Subcommand};
use dispatch_core::domain::{DateWindow, StaffId, TenantId};
use dispatch_core::infra::{Config, Metrics};
use dispatch_core::io::{
    create_notice_channel, BoardFixture, CreditLedger, InMemoryBookingStore, JsonlCreditLedger,
    Notice,
};
use dispatch_core::services::gesture::{DragTarget, GestureTransition, RawInput};
use dispatch_core::services::{
    BookingBoard, CalendarGrid, GestureContext, GestureController, GestureInput,
    MutationCoordinator, MutationOutcome, RoutePlanner, WalletContext,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Field-service dispatch scheduling engine
#[derive(Parser, Debug)]
#[command(name = "dispatch-core", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Plan a nearest-neighbor route for one staff member's day
    Route {
        /// Board fixture (JSON)
        #[arg(short, long)]
        fixture: PathBuf,

        /// Staff member to route
        #[arg(short, long)]
        staff: String,

        /// Day to route (YYYY-MM-DD)
        #[arg(short, long)]
        day: NaiveDate,

        /// Charge the tenant and return the accepted route
        #[arg(long)]
        accept: bool,

        /// Credit ledger file (overrides config)
        #[arg(long)]
        ledger: Option<PathBuf>,

        /// Credit the tenant before planning
        #[arg(long)]
        top_up: Option<Decimal>,
    },
    /// Replay a scripted pointer session against the board
    Replay {
        /// Board fixture (JSON)
        #[arg(short, long)]
        fixture: PathBuf,

        /// Replay script (JSON)
        #[arg(short, long)]
        script: PathBuf,

        /// Make every store update fail
        #[arg(long)]
        fail_updates: bool,

        /// Store latency per update in milliseconds
        #[arg(long, default_value_t = 0)]
        latency_ms: u64,
    },
}

/// Scripted pointer session
#[derive(Debug, Deserialize)]
struct ReplayScript {
    first_day: NaiveDate,
    #[serde(default = "default_viewport_height")]
    viewport_height: f64,
    /// Top-left of the grid body in client coordinates
    #[serde(default)]
    origin: (f64, f64),
    steps: Vec<ReplayStep>,
}

fn default_viewport_height() -> f64 {
    600.0
}

#[derive(Debug, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
enum ReplayStep {
    /// Host event with the hit-test result for down events
    Pointer {
        input: RawInput,
        #[serde(default)]
        target: Option<DragTarget>,
    },
    Tick { timestamp_ms: u64 },
    /// Real-time pause, lets in-flight persistence progress
    Wait { ms: u64 },
    /// Await every dispatched edit
    Settle,
}

impl ReplayScript {
    fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse script {}", path.display()))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    info!(version = env!("CARGO_PKG_VERSION"), git_hash = env!("GIT_HASH"), "dispatch-core starting");

    let config = Config::load_from_path(&args.config);
    info!(
        config_file = %config.config_file(),
        tenant = %config.tenant_id(),
        slot_minutes = %config.grid().slot_minutes,
        long_press_ms = %config.long_press_ms(),
        serialize_per_booking = %config.serialize_per_booking(),
        persist_timeout_ms = %config.persist_timeout_ms(),
        route_cost_per_use = %config.route_cost_per_use(),
        "config_loaded"
    );

    let metrics = Arc::new(Metrics::new());

    // Periodic metrics summary
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    let reporter = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        // first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    let result = match args.command {
        Command::Route { fixture, staff, day, accept, ledger, top_up } => {
            let opts = RouteOptions { staff: StaffId::new(staff), day, accept, ledger, top_up };
            run_route(&config, metrics.clone(), &fixture, opts).await
        }
        Command::Replay { fixture, script, fail_updates, latency_ms } => {
            run_replay(&config, metrics.clone(), &fixture, &script, fail_updates, latency_ms).await
        }
    };

    reporter.abort();
    metrics.report().log();
    info!("dispatch-core finished");
    result
}

fn init_tracing(json: bool) {
    // RUST_LOG overrides; default INFO
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

struct RouteOptions {
    staff: StaffId,
    day: NaiveDate,
    accept: bool,
    ledger: Option<PathBuf>,
    top_up: Option<Decimal>,
}

async fn run_route(
    config: &Config,
    metrics: Arc<Metrics>,
    fixture_path: &Path,
    opts: RouteOptions,
) -> anyhow::Result<()> {
    let fixture = BoardFixture::from_file(fixture_path)?;
    let tenant = TenantId::new(config.tenant_id());
    let store = InMemoryBookingStore::with_bookings(&tenant, fixture.bookings.clone());
    let board = BookingBoard::new();
    board.load_window(&store, &tenant, &day_window(opts.day, 1)?).await?;

    let ledger_path = opts.ledger.unwrap_or_else(|| PathBuf::from(config.ledger_file()));
    let ledger: Arc<dyn CreditLedger> = Arc::new(JsonlCreditLedger::new(&ledger_path));
    if let Some(amount) = opts.top_up {
        ledger.append_entry(&tenant, amount, "top-up").await?;
        info!(tenant = %tenant, amount = %amount, "ledger_topped_up");
    }

    let (notices, mut notice_rx) = create_notice_channel(config.notice_buffer_size(), metrics.clone());
    let planner =
        RoutePlanner::new(config, WalletContext::new(tenant, ledger), notices, metrics);

    let candidates =
        RoutePlanner::candidates_for(&board, &opts.staff, opts.day, &fixture.locations());
    info!(staff = %opts.staff, day = %opts.day, candidates = %candidates.len(), "route_requested");

    let accept = opts.accept;
    let outcome = async {
        let plan = planner.optimize_route(&candidates).await?;
        let planned_at = OffsetDateTime::now_utc().format(&Rfc3339)?;
        let output = if accept {
            let route = planner.accept(plan).await?;
            json!({
                "planned_at": planned_at,
                "accepted": true,
                "route": route,
                "balance": planner.wallet().cached_balance(),
            })
        } else {
            json!({
                "planned_at": planned_at,
                "accepted": false,
                "plan": plan,
                "balance": planner.wallet().cached_balance(),
            })
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        anyhow::Ok(())
    }
    .await;

    drain_notices(&mut notice_rx);
    outcome
}

async fn run_replay(
    config: &Config,
    metrics: Arc<Metrics>,
    fixture_path: &Path,
    script_path: &Path,
    fail_updates: bool,
    latency_ms: u64,
) -> anyhow::Result<()> {
    let fixture = BoardFixture::from_file(fixture_path)?;
    let script = ReplayScript::from_file(script_path)?;
    let tenant = TenantId::new(config.tenant_id());

    let store = Arc::new(InMemoryBookingStore::with_bookings(&tenant, fixture.bookings));
    store.set_fail_updates(fail_updates);
    store.set_latency(Duration::from_millis(latency_ms));

    let board = Arc::new(BookingBoard::new());
    let days = u64::from(config.grid().days);
    board.load_window(store.as_ref(), &tenant, &day_window(script.first_day, days)?).await?;

    let (notices, mut notice_rx) = create_notice_channel(config.notice_buffer_size(), metrics.clone());
    let coordinator = MutationCoordinator::new(
        config,
        board.clone(),
        store.clone(),
        notices.clone(),
        metrics.clone(),
    );
    let ctx = GestureContext { board: board.clone(), coordinator, notices, metrics };
    let (origin_x, origin_y) = script.origin;
    let grid = CalendarGrid::new(config.grid(), script.first_day, script.viewport_height)
        .with_origin(origin_x, origin_y);
    let mut controller = GestureController::new(config, ctx, grid);

    info!(steps = %script.steps.len(), fail_updates = %fail_updates, latency_ms = %latency_ms, "replay_started");
    for step in script.steps {
        match step {
            ReplayStep::Pointer { input, target } => {
                for gesture_input in input.normalize(target) {
                    print_transition(&controller.handle(gesture_input));
                }
            }
            ReplayStep::Tick { timestamp_ms } => {
                print_transition(&controller.handle(GestureInput::Tick(timestamp_ms)));
            }
            ReplayStep::Wait { ms } => tokio::time::sleep(Duration::from_millis(ms)).await,
            ReplayStep::Settle => settle(&mut controller).await,
        }
        drain_notices(&mut notice_rx);
    }
    settle(&mut controller).await;
    drain_notices(&mut notice_rx);

    let output = json!({ "board": board.snapshot() });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Whole-day window covering `days` days from `first_day`
fn day_window(first_day: NaiveDate, days: u64) -> anyhow::Result<DateWindow> {
    let end = first_day
        .checked_add_days(Days::new(days))
        .context("date window out of range")?;
    Ok(DateWindow::new(first_day.and_time(NaiveTime::MIN), end.and_time(NaiveTime::MIN)))
}

fn print_transition(transition: &GestureTransition) {
    if transition.is_noop() {
        return;
    }
    let line = json!({
        "from": transition.from.as_str(),
        "to": transition.to.as_str(),
        "effect": format!("{:?}", transition.effect),
    });
    println!("{line}");
}

async fn settle(controller: &mut GestureController) {
    for handle in controller.take_dispatched() {
        match handle.await {
            Ok(MutationOutcome::Committed { booking_id, patch }) => {
                println!("{}", json!({ "outcome": "committed", "booking_id": booking_id, "patch": patch }));
            }
            Ok(MutationOutcome::Rejected { booking_id, error }) => {
                println!(
                    "{}",
                    json!({ "outcome": "rejected", "booking_id": booking_id, "kind": error.kind(), "reason": error.to_string() })
                );
            }
            Err(e) => warn!(error = %e, "persist_task_failed"),
        }
    }
}

fn drain_notices(rx: &mut mpsc::Receiver<Notice>) {
    while let Ok(notice) = rx.try_recv() {
        info!(notice = %notice.to_json(), "notice");
    }
}
