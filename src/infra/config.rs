//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml
//!
//! Every section and field has a default, so a partial file is valid.

use anyhow::Context;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct TenantConfig {
    #[serde(default = "default_tenant_id")]
    pub id: String,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self { id: default_tenant_id() }
    }
}

fn default_tenant_id() -> String {
    "default".to_string()
}

/// Calendar grid geometry (week view: one column per day)
#[derive(Debug, Clone, Deserialize)]
pub struct GridConfig {
    /// Snap granularity in minutes
    #[serde(default = "default_slot_minutes")]
    pub slot_minutes: u32,
    /// Pixel height of one slot
    #[serde(default = "default_slot_height_px")]
    pub slot_height_px: f64,
    #[serde(default = "default_column_width_px")]
    pub column_width_px: f64,
    /// First hour shown at the top of the grid
    #[serde(default = "default_day_start_hour")]
    pub day_start_hour: u32,
    /// Hour at the bottom edge of the grid (exclusive)
    #[serde(default = "default_day_end_hour")]
    pub day_end_hour: u32,
    /// Number of day columns
    #[serde(default = "default_days")]
    pub days: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            slot_minutes: default_slot_minutes(),
            slot_height_px: default_slot_height_px(),
            column_width_px: default_column_width_px(),
            day_start_hour: default_day_start_hour(),
            day_end_hour: default_day_end_hour(),
            days: default_days(),
        }
    }
}

fn default_slot_minutes() -> u32 {
    15
}

fn default_slot_height_px() -> f64 {
    12.0
}

fn default_column_width_px() -> f64 {
    140.0
}

fn default_day_start_hour() -> u32 {
    6
}

fn default_day_end_hour() -> u32 {
    22
}

fn default_days() -> u32 {
    7
}

#[derive(Debug, Clone, Deserialize)]
pub struct GestureConfig {
    /// Touch hold time before a drag starts
    #[serde(default = "default_long_press_ms")]
    pub long_press_ms: u64,
    /// Touch movement allowed before the long-press fires
    #[serde(default = "default_touch_jitter_px")]
    pub touch_jitter_px: f64,
    /// Resize floor
    #[serde(default = "default_min_duration_minutes")]
    pub min_duration_minutes: u32,
    /// Distance from the viewport edge that triggers auto-scroll
    #[serde(default = "default_autoscroll_edge_px")]
    pub autoscroll_edge_px: f64,
    /// Scroll advance per animation tick
    #[serde(default = "default_autoscroll_step_px")]
    pub autoscroll_step_px: f64,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            long_press_ms: default_long_press_ms(),
            touch_jitter_px: default_touch_jitter_px(),
            min_duration_minutes: default_min_duration_minutes(),
            autoscroll_edge_px: default_autoscroll_edge_px(),
            autoscroll_step_px: default_autoscroll_step_px(),
        }
    }
}

fn default_long_press_ms() -> u64 {
    400
}

fn default_touch_jitter_px() -> f64 {
    10.0
}

fn default_min_duration_minutes() -> u32 {
    10
}

fn default_autoscroll_edge_px() -> f64 {
    40.0
}

fn default_autoscroll_step_px() -> f64 {
    12.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct MutationConfig {
    /// Queue persistence calls per booking so the store sees edits in order
    #[serde(default = "default_serialize_per_booking")]
    pub serialize_per_booking: bool,
    /// Rollback if the store has not answered within this time (0 disables)
    #[serde(default = "default_persist_timeout_ms")]
    pub persist_timeout_ms: u64,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            serialize_per_booking: default_serialize_per_booking(),
            persist_timeout_ms: default_persist_timeout_ms(),
        }
    }
}

fn default_serialize_per_booking() -> bool {
    true
}

fn default_persist_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouteConfig {
    /// Credits debited per accepted route plan
    #[serde(default = "default_cost_per_use")]
    pub cost_per_use: Decimal,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self { cost_per_use: default_cost_per_use() }
    }
}

fn default_cost_per_use() -> Decimal {
    Decimal::new(50, 2)
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// File path for the credit ledger (JSONL format)
    #[serde(default = "default_ledger_file")]
    pub file: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self { file: default_ledger_file() }
    }
}

fn default_ledger_file() -> String {
    "credits.jsonl".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct NoticesConfig {
    #[serde(default = "default_notice_buffer")]
    pub buffer_size: usize,
}

impl Default for NoticesConfig {
    fn default() -> Self {
        Self { buffer_size: default_notice_buffer() }
    }
}

fn default_notice_buffer() -> usize {
    256
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

fn default_metrics_interval() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub tenant: TenantConfig,
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub gesture: GestureConfig,
    #[serde(default)]
    pub mutation: MutationConfig,
    #[serde(default)]
    pub route: RouteConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub notices: NoticesConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    tenant_id: String,
    grid: GridConfig,
    long_press_ms: u64,
    touch_jitter_px: f64,
    min_duration_minutes: u32,
    autoscroll_edge_px: f64,
    autoscroll_step_px: f64,
    serialize_per_booking: bool,
    persist_timeout_ms: u64,
    route_cost_per_use: Decimal,
    ledger_file: String,
    notice_buffer_size: usize,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default")
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: &str) -> Self {
        Self {
            tenant_id: toml_config.tenant.id,
            grid: toml_config.grid,
            long_press_ms: toml_config.gesture.long_press_ms,
            touch_jitter_px: toml_config.gesture.touch_jitter_px,
            min_duration_minutes: toml_config.gesture.min_duration_minutes,
            autoscroll_edge_px: toml_config.gesture.autoscroll_edge_px,
            autoscroll_step_px: toml_config.gesture.autoscroll_step_px,
            serialize_per_booking: toml_config.mutation.serialize_per_booking,
            persist_timeout_ms: toml_config.mutation.persist_timeout_ms,
            route_cost_per_use: toml_config.route.cost_per_use,
            ledger_file: toml_config.ledger.file,
            notice_buffer_size: toml_config.notices.buffer_size,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file: config_file.to_string(),
        }
    }

    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        let config = Self::from_toml(toml_config, &path.display().to_string());
        config.validate().with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Load configuration from a path, falling back to defaults on error
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load(args: &[String]) -> Self {
        Self::load_from_path(&Self::resolve_config_path(args))
    }

    fn validate(&self) -> anyhow::Result<()> {
        let grid = &self.grid;
        anyhow::ensure!(grid.slot_minutes > 0, "grid.slot_minutes must be positive");
        anyhow::ensure!(grid.slot_height_px > 0.0, "grid.slot_height_px must be positive");
        anyhow::ensure!(grid.column_width_px > 0.0, "grid.column_width_px must be positive");
        anyhow::ensure!(grid.days > 0, "grid.days must be positive");
        anyhow::ensure!(
            grid.day_start_hour < grid.day_end_hour && grid.day_end_hour <= 24,
            "grid hours must satisfy day_start_hour < day_end_hour <= 24"
        );
        anyhow::ensure!(
            !self.route_cost_per_use.is_sign_negative(),
            "route.cost_per_use must not be negative"
        );
        Ok(())
    }

    // Getters for all config fields
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn grid(&self) -> &GridConfig {
        &self.grid
    }

    pub fn long_press_ms(&self) -> u64 {
        self.long_press_ms
    }

    pub fn touch_jitter_px(&self) -> f64 {
        self.touch_jitter_px
    }

    pub fn min_duration_minutes(&self) -> u32 {
        self.min_duration_minutes
    }

    pub fn autoscroll_edge_px(&self) -> f64 {
        self.autoscroll_edge_px
    }

    pub fn autoscroll_step_px(&self) -> f64 {
        self.autoscroll_step_px
    }

    pub fn serialize_per_booking(&self) -> bool {
        self.serialize_per_booking
    }

    pub fn persist_timeout_ms(&self) -> u64 {
        self.persist_timeout_ms
    }

    pub fn route_cost_per_use(&self) -> Decimal {
        self.route_cost_per_use
    }

    pub fn ledger_file(&self) -> &str {
        &self.ledger_file
    }

    pub fn notice_buffer_size(&self) -> usize {
        self.notice_buffer_size
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method to set the per-booking mutation queue flag
    pub fn with_serialize_per_booking(mut self, enabled: bool) -> Self {
        self.serialize_per_booking = enabled;
        self
    }

    /// Builder method to set the persistence timeout
    pub fn with_persist_timeout_ms(mut self, ms: u64) -> Self {
        self.persist_timeout_ms = ms;
        self
    }

    /// Builder method to set the route cost
    pub fn with_route_cost_per_use(mut self, cost: Decimal) -> Self {
        self.route_cost_per_use = cost;
        self
    }

    /// Builder method to set the tenant
    pub fn with_tenant_id(mut self, tenant_id: &str) -> Self {
        self.tenant_id = tenant_id.to_string();
        self
    }
}
