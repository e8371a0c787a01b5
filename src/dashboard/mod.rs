//! # HTTP server
//!
//! Runs the Axum server behind the whole platform: public catalog, guest and
//! authenticated carts, checkout, client project dashboard, admin back
//! office, locally mounted privileged functions, per-project WebSocket, and
//! the health/metrics endpoints. Also owns the 60-second maintenance tick.

pub(crate) mod middleware_auth;
mod routes_admin;
mod routes_auth;
mod routes_cart;
mod routes_catalog;
mod routes_functions;
mod routes_health;
mod routes_orders;
mod routes_projects;
mod websocket;

use crate::anon_cart::{self, AnonCartStore};
use crate::db;
use crate::events::ChangeFeed;
use crate::functions::EdgeFunctions;
use crate::prom_metrics;
use anyhow::Result;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::routing::{delete, get, post, put};
use axum::Router;
use chrono::Utc;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Instrument};

/// Lock a mutex, recovering from poisoning.
pub(crate) fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct AppState {
    pub db: db::Database,
    pub anon_carts: Mutex<AnonCartStore>,
    pub functions: Box<dyn EdgeFunctions>,
    pub feed: ChangeFeed,
    pub prom_metrics: prom_metrics::Metrics,
}

impl AppState {
    pub fn new(
        db: db::Database,
        anon_carts: AnonCartStore,
        functions: Box<dyn EdgeFunctions>,
    ) -> Arc<Self> {
        Arc::new(AppState {
            db,
            anon_carts: Mutex::new(anon_carts),
            functions,
            feed: ChangeFeed::new(),
            prom_metrics: prom_metrics::Metrics::new(),
        })
    }
}

/// Middleware that records HTTP request duration into the Prometheus histogram,
/// generates (or propagates) a request ID for correlation, and wraps the
/// request in a tracing span using `.instrument()` for proper async propagation.
async fn metrics_middleware(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> axum::response::Response {
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let method = req.method().to_string();
    let raw_path = req.uri().path().to_string();
    let norm_path = normalize_path(&raw_path);
    let start = std::time::Instant::now();

    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %raw_path,
    );
    let response = next.run(req).instrument(span).await;

    let duration = start.elapsed().as_secs_f64();
    state
        .prom_metrics
        .http_request_duration
        .get_or_create(&prom_metrics::HttpLabel {
            method,
            path: norm_path,
        })
        .observe(duration);

    let mut response = response;
    response
        .headers_mut()
        .insert("x-request-id", request_id.parse().unwrap());
    response
}

/// Normalize URL path to collapse high-cardinality segments (UUIDs, numeric IDs)
/// into placeholders, preventing histogram label explosion.
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|seg| {
            if seg.is_empty() {
                seg.to_string()
            } else if seg.chars().all(|c| c.is_ascii_digit()) {
                ":id".to_string()
            } else if seg.len() == 36 && seg.chars().filter(|c| *c == '-').count() == 4 {
                ":uuid".to_string()
            } else {
                seg.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

pub fn build_router(state: Arc<AppState>, static_dir: Option<&Path>) -> Router {
    let mut app = Router::new()
        // Health and observability
        .route("/healthz", get(routes_health::handler_healthz))
        .route("/readyz", get(routes_health::handler_readyz))
        .route("/metrics", get(routes_health::handler_metrics))
        // Public catalog
        .route("/api/packs", get(routes_catalog::handler_list_packs))
        .route("/api/packs/{slug}", get(routes_catalog::handler_get_pack))
        .route("/api/services", get(routes_catalog::handler_list_services))
        .route(
            "/api/services/{slug}",
            get(routes_catalog::handler_get_service),
        )
        // Guest cart (x-guest-token header)
        .route(
            "/api/guest/cart",
            get(routes_cart::handler_get_guest_cart)
                .delete(routes_cart::handler_clear_guest_cart),
        )
        .route(
            "/api/guest/cart/items",
            post(routes_cart::handler_add_guest_item)
                .put(routes_cart::handler_update_guest_item)
                .delete(routes_cart::handler_remove_guest_item),
        )
        .route(
            "/api/guest/cart/impact",
            get(routes_cart::handler_guest_item_impact),
        )
        // Authenticated cart
        .route(
            "/api/cart",
            get(routes_cart::handler_get_cart).delete(routes_cart::handler_clear_cart),
        )
        .route("/api/cart/items", post(routes_cart::handler_add_cart_item))
        .route(
            "/api/cart/items/{item_id}",
            put(routes_cart::handler_update_cart_item)
                .delete(routes_cart::handler_remove_cart_item),
        )
        .route(
            "/api/cart/items/{item_id}/impact",
            get(routes_cart::handler_cart_item_impact),
        )
        .route("/api/cart/migrate", post(routes_cart::handler_migrate_cart))
        // Orders
        .route(
            "/api/orders",
            get(routes_orders::handler_list_orders).post(routes_orders::handler_checkout),
        )
        .route(
            "/api/orders/{order_id}",
            get(routes_orders::handler_get_order),
        )
        // Client projects
        .route(
            "/api/projects",
            get(routes_projects::handler_list_projects),
        )
        .route(
            "/api/projects/unread",
            get(routes_projects::handler_unread_count),
        )
        .route(
            "/api/projects/{project_id}",
            get(routes_projects::handler_get_project),
        )
        .route(
            "/api/projects/{project_id}/form",
            put(routes_projects::handler_save_form),
        )
        .route(
            "/api/projects/{project_id}/updates",
            get(routes_projects::handler_list_updates),
        )
        .route(
            "/api/projects/{project_id}/updates/{update_id}/read",
            post(routes_projects::handler_mark_update_read),
        )
        .route(
            "/api/projects/{project_id}/changes",
            get(routes_projects::handler_recent_changes),
        )
        // Auth and profile
        .route("/api/auth/me", get(routes_auth::handler_me))
        .route("/api/auth/profile", put(routes_auth::handler_update_profile))
        .route(
            "/api/auth/account",
            delete(routes_auth::handler_delete_account),
        )
        // Admin back office
        .route(
            "/api/admin/clients",
            get(routes_admin::handler_list_clients),
        )
        .route(
            "/api/admin/clients/{user_id}",
            get(routes_admin::handler_get_client),
        )
        .route(
            "/api/admin/clients/{user_id}/role",
            put(routes_admin::handler_set_role),
        )
        .route("/api/admin/orders", get(routes_admin::handler_recent_orders))
        .route(
            "/api/admin/orders/{order_id}/status",
            put(routes_admin::handler_set_order_status),
        )
        .route(
            "/api/admin/orders/{order_id}/project",
            post(routes_admin::handler_create_project),
        )
        .route(
            "/api/admin/projects",
            get(routes_admin::handler_list_all_projects),
        )
        .route(
            "/api/admin/projects/{project_id}/status",
            put(routes_admin::handler_set_project_status),
        )
        .route(
            "/api/admin/projects/{project_id}/milestones/{milestone_id}",
            put(routes_admin::handler_set_milestone),
        )
        .route(
            "/api/admin/projects/{project_id}/updates",
            post(routes_admin::handler_post_update),
        )
        .route("/api/admin/broadcast", post(routes_admin::handler_broadcast))
        .route("/api/admin/overview", get(routes_admin::handler_overview))
        // Locally mounted privileged functions
        .route(
            "/functions/v1/create-milestones",
            post(routes_functions::handler_create_milestones),
        )
        .route(
            "/functions/v1/create-project-update",
            post(routes_functions::handler_create_project_update),
        )
        .route(
            "/functions/v1/delete-account",
            post(routes_functions::handler_delete_account),
        )
        // Realtime
        .route(
            "/ws/projects/{project_id}",
            get(websocket::handler_ws_project),
        );

    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir).append_index_html_on_directories(true));
    }

    app.layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    )
    .layer(CatchPanicLayer::new())
    .layer(axum::middleware::from_fn_with_state(
        state.clone(),
        metrics_middleware,
    ))
    .layer(TraceLayer::new_for_http())
    .layer(RequestBodyLimitLayer::new(1024 * 1024))
    .layer(TimeoutLayer::with_status_code(
        StatusCode::REQUEST_TIMEOUT,
        Duration::from_secs(30),
    ))
    .with_state(state)
}

/// One pass of the periodic maintenance work. Shared between the in-server
/// 60-second tick and the one-shot `housekeeping` CLI command. The caller
/// owns the `sysinfo::System` so CPU readings carry deltas across ticks.
pub async fn maintenance_tick(state: &AppState, sys: &mut sysinfo::System) {
    {
        let mut store = lock_or_recover(&state.anon_carts);
        match store.prune_stale(anon_cart::MAX_GUEST_CART_AGE_DAYS, Utc::now()) {
            Ok(n) if n > 0 => info!(count = n, "pruned stale guest carts"),
            Err(e) => warn!(error = %e, "guest cart pruning failed"),
            _ => {}
        }
        state.prom_metrics.guest_carts.set(store.len() as i64);
    }

    match state.db.count_users_with_duplicate_carts().await {
        Ok(n) => {
            state.prom_metrics.duplicate_cart_users.set(n);
            if n > 0 {
                warn!(count = n, "users with duplicate carts, merge pending on next read");
            }
        }
        Err(e) => warn!(error = %e, "duplicate cart count failed"),
    }

    match state.db.count_orphaned_paid_orders().await {
        Ok(n) => {
            state.prom_metrics.orphaned_paid_orders.set(n);
            if n > 0 {
                warn!(count = n, "paid orders with no items, manual review needed");
            }
        }
        Err(e) => warn!(error = %e, "orphaned order count failed"),
    }

    match state.db.count_active_carts().await {
        Ok(n) => {
            state.prom_metrics.active_carts.set(n);
        }
        Err(e) => warn!(error = %e, "active cart count failed"),
    }
    match state.db.count_projects_in_progress().await {
        Ok(n) => {
            state.prom_metrics.projects_in_progress.set(n);
        }
        Err(e) => warn!(error = %e, "in-progress project count failed"),
    }

    // Connection pool stats
    let pool_size = state.db.pool().size();
    let pool_idle = state.db.pool().num_idle();
    state
        .prom_metrics
        .db_pool_active
        .set(pool_size as i64 - pool_idle as i64);
    state.prom_metrics.db_pool_idle.set(pool_idle as i64);
    state.prom_metrics.db_pool_max.set(5); // matches PgPoolOptions::max_connections(5)

    sys.refresh_cpu_all();
    sys.refresh_memory();
    state
        .prom_metrics
        .cpu_usage_percent
        .set(sys.global_cpu_usage() as f64);
    let mem_total = sys.total_memory() as f64;
    if mem_total > 0.0 {
        state
            .prom_metrics
            .memory_usage_percent
            .set(sys.used_memory() as f64 / mem_total * 100.0);
    }
}

pub async fn run(
    port: u16,
    database_url: &str,
    anon_cart_path: &Path,
    static_dir: Option<&Path>,
) -> Result<()> {
    let database = db::Database::connect(database_url).await?;
    let functions = crate::functions::from_env(&database)?;
    let anon_carts = AnonCartStore::open(anon_cart_path);
    let state = AppState::new(database, anon_carts, functions);
    let app = build_router(state.clone(), static_dir);

    // Background task: prune guest carts, surface store anomalies, refresh gauges
    let maintenance_state = Arc::clone(&state);
    tokio::spawn(async move {
        let mut sys = sysinfo::System::new();
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            maintenance_tick(&maintenance_state, &mut sys).await;
        }
    });

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!(port, "server running");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! { _ = ctrl_c => info!("received SIGINT, shutting down"), _ = sigterm.recv() => info!("received SIGTERM, shutting down") }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("received SIGINT, shutting down");
    }
}
