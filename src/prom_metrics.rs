//! # Prometheus Metrics — Exposition for Container Orchestration
//!
//! Exposes estudio operational metrics in the Prometheus text exposition
//! format for scraping by Prometheus, Grafana Agent, or any
//! OpenMetrics-compatible collector.
//!
//! ## Metrics Exposed
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `estudio_http_request_duration_seconds` | Histogram | `method`, `path` | Request latency by normalized route |
//! | `estudio_orders_created_total` | Counter | — | Orders successfully created |
//! | `estudio_projects_created_total` | Counter | — | Projects derived from orders |
//! | `estudio_carts_migrated_total` | Counter | — | Guest carts replayed into accounts |
//! | `estudio_updates_posted_total` | Counter | — | Project updates posted |
//! | `estudio_active_carts` | Gauge | — | Open carts in the database |
//! | `estudio_duplicate_cart_users` | Gauge | — | Users currently holding more than one cart |
//! | `estudio_orphaned_paid_orders` | Gauge | — | Paid orders with zero items |
//! | `estudio_projects_in_progress` | Gauge | — | Projects in the in_progress state |
//! | `estudio_guest_carts` | Gauge | — | Carts in the anonymous store |
//! | `estudio_db_pool_active` | Gauge | — | Checked-out pool connections |
//! | `estudio_db_pool_idle` | Gauge | — | Idle pool connections |
//! | `estudio_db_pool_max` | Gauge | — | Configured pool capacity |
//! | `estudio_cpu_usage_percent` | Gauge | — | Server CPU usage |
//! | `estudio_memory_usage_percent` | Gauge | — | Server memory usage |
//!
//! ## Integration
//!
//! Gauges are refreshed from the dashboard's 60-second maintenance loop.
//! The `/metrics` endpoint renders the current registry state on each scrape.

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;
use std::sync::atomic::AtomicU64;

/// Label set for the HTTP latency histogram. `path` is normalized before
/// recording so ids never explode the label space.
#[derive(Clone, Debug, Hash, PartialEq, Eq, prometheus_client::encoding::EncodeLabelSet)]
pub struct HttpLabel {
    pub method: String,
    pub path: String,
}

/// Thread-safe metrics registry for the estudio server.
///
/// All fields use atomic types and are safe to update from any thread or async task.
/// The `Family` type automatically creates per-label-set metric instances on first use.
pub struct Metrics {
    pub registry: Registry,
    pub http_request_duration: Family<HttpLabel, Histogram>,
    pub orders_created: Counter,
    pub projects_created: Counter,
    pub carts_migrated: Counter,
    pub updates_posted: Counter,
    pub active_carts: Gauge,
    pub duplicate_cart_users: Gauge,
    pub orphaned_paid_orders: Gauge,
    pub projects_in_progress: Gauge,
    pub guest_carts: Gauge,
    pub db_pool_active: Gauge,
    pub db_pool_idle: Gauge,
    pub db_pool_max: Gauge,
    pub cpu_usage_percent: Gauge<f64, AtomicU64>,
    pub memory_usage_percent: Gauge<f64, AtomicU64>,
}

impl Metrics {
    /// Create a new metrics registry with all estudio metrics registered.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let http_request_duration = Family::<HttpLabel, Histogram>::new_with_constructor(|| {
            Histogram::new(exponential_buckets(0.001, 2.0, 14))
        });
        registry.register(
            "estudio_http_request_duration_seconds",
            "HTTP request latency by method and normalized path",
            http_request_duration.clone(),
        );

        let orders_created = Counter::default();
        registry.register(
            "estudio_orders_created",
            "Orders successfully created",
            orders_created.clone(),
        );

        let projects_created = Counter::default();
        registry.register(
            "estudio_projects_created",
            "Projects derived from paid orders",
            projects_created.clone(),
        );

        let carts_migrated = Counter::default();
        registry.register(
            "estudio_carts_migrated",
            "Guest carts replayed into account carts",
            carts_migrated.clone(),
        );

        let updates_posted = Counter::default();
        registry.register(
            "estudio_updates_posted",
            "Project updates posted",
            updates_posted.clone(),
        );

        let active_carts = Gauge::default();
        registry.register(
            "estudio_active_carts",
            "Open carts in the database",
            active_carts.clone(),
        );

        let duplicate_cart_users = Gauge::default();
        registry.register(
            "estudio_duplicate_cart_users",
            "Users currently holding more than one cart",
            duplicate_cart_users.clone(),
        );

        let orphaned_paid_orders = Gauge::default();
        registry.register(
            "estudio_orphaned_paid_orders",
            "Paid orders with zero snapshot items",
            orphaned_paid_orders.clone(),
        );

        let projects_in_progress = Gauge::default();
        registry.register(
            "estudio_projects_in_progress",
            "Projects currently in progress",
            projects_in_progress.clone(),
        );

        let guest_carts = Gauge::default();
        registry.register(
            "estudio_guest_carts",
            "Carts held in the anonymous store",
            guest_carts.clone(),
        );

        let db_pool_active = Gauge::default();
        registry.register(
            "estudio_db_pool_active",
            "Checked-out database pool connections",
            db_pool_active.clone(),
        );

        let db_pool_idle = Gauge::default();
        registry.register(
            "estudio_db_pool_idle",
            "Idle database pool connections",
            db_pool_idle.clone(),
        );

        let db_pool_max = Gauge::default();
        registry.register(
            "estudio_db_pool_max",
            "Configured database pool capacity",
            db_pool_max.clone(),
        );

        let cpu_usage_percent = Gauge::<f64, AtomicU64>::default();
        registry.register(
            "estudio_cpu_usage_percent",
            "Server CPU usage percentage",
            cpu_usage_percent.clone(),
        );

        let memory_usage_percent = Gauge::<f64, AtomicU64>::default();
        registry.register(
            "estudio_memory_usage_percent",
            "Server memory usage percentage",
            memory_usage_percent.clone(),
        );

        Self {
            registry,
            http_request_duration,
            orders_created,
            projects_created,
            carts_migrated,
            updates_posted,
            active_carts,
            duplicate_cart_users,
            orphaned_paid_orders,
            projects_in_progress,
            guest_carts,
            db_pool_active,
            db_pool_idle,
            db_pool_max,
            cpu_usage_percent,
            memory_usage_percent,
        }
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn encode(&self) -> String {
        let mut buf = String::new();
        encode(&mut buf, &self.registry).expect("encoding metrics should not fail");
        buf
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
