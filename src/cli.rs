//! # CLI Execution Functions
//!
//! Extracted from `main.rs` to keep the entry point slim. Contains the
//! execution logic for the catalog, broadcast, and housekeeping subcommands.

use anyhow::Result;
use estudio::{anon_cart, catalog, dashboard, db, functions, project};

use super::{CatalogAction, Cli};

fn require_database_url(cli: &Cli) -> Result<&str> {
    cli.database_url.as_deref().ok_or_else(|| {
        anyhow::anyhow!("DATABASE_URL is required (set via --database-url or env)")
    })
}

/// Run a `catalog` subcommand: sync a TOML file into the database or list
/// the rows currently stored.
pub fn run_catalog(cli: &Cli, action: &CatalogAction) -> Result<()> {
    let database_url = require_database_url(cli)?;
    let rt = tokio::runtime::Runtime::new()?;

    match action {
        CatalogAction::Sync { file } => {
            // Parse before connecting so file errors surface without a database
            let parsed = catalog::parse_toml_file(file)?;
            let database = rt.block_on(db::Database::connect(database_url))?;
            let report = rt.block_on(catalog::sync_catalog(&database, &parsed))?;
            eprintln!(
                "Catalog synced: {} packs, {} services upserted, {} deactivated",
                report.packs_upserted,
                report.services_upserted,
                report.packs_deactivated + report.services_deactivated
            );
        }
        CatalogAction::List { all } => {
            let database = rt.block_on(db::Database::connect(database_url))?;
            let (packs, services) = if *all {
                (
                    rt.block_on(database.get_all_packs())?,
                    rt.block_on(database.get_all_services())?,
                )
            } else {
                (
                    rt.block_on(database.get_active_packs())?,
                    rt.block_on(database.get_active_services())?,
                )
            };
            if packs.is_empty() && services.is_empty() {
                eprintln!("Catalog is empty");
                return Ok(());
            }
            eprintln!(
                "{:<9} {:<24} {:<30} {:>10} {:<7}",
                "KIND", "SLUG", "NAME", "PRICE", "ACTIVE"
            );
            eprintln!("{}", "-".repeat(84));
            for p in &packs {
                eprintln!(
                    "{:<9} {:<24} {:<30} {:>10.2} {:<7}",
                    "pack", p.slug, p.name, p.price, p.is_active
                );
            }
            for s in &services {
                eprintln!(
                    "{:<9} {:<24} {:<30} {:>10.2} {:<7}",
                    "service", s.slug, s.name, s.price, s.is_active
                );
            }
        }
    }
    Ok(())
}

/// Post one update to every project matching the status filter. Mirrors the
/// admin broadcast endpoint for operators without a browser session.
pub fn run_broadcast(cli: &Cli, status: Option<&str>, title: &str, content: &str) -> Result<()> {
    if title.trim().is_empty() || content.trim().is_empty() {
        anyhow::bail!("Broadcast title and content must not be empty");
    }
    let status_filter = match status {
        Some(raw) => Some(
            project::ProjectStatus::parse(raw)
                .ok_or_else(|| anyhow::anyhow!("Unknown project status '{}'", raw))?,
        ),
        None => None,
    };

    let database_url = require_database_url(cli)?;
    let rt = tokio::runtime::Runtime::new()?;
    let database = rt.block_on(db::Database::connect(database_url))?;

    let report = rt.block_on(project::broadcast_update(
        &database,
        status_filter,
        title,
        content,
    ))?;
    eprintln!(
        "Broadcast '{}': {} projects matched, {} updates posted, {} failed",
        title, report.matched, report.posted, report.failed
    );
    if report.failed > 0 {
        anyhow::bail!("{} projects did not receive the update", report.failed);
    }
    Ok(())
}

/// One maintenance pass outside the server: prune stale guest carts and
/// refresh the operational gauges, then print them.
pub fn run_housekeeping(cli: &Cli) -> Result<()> {
    let database_url = require_database_url(cli)?;
    let rt = tokio::runtime::Runtime::new()?;
    let database = rt.block_on(db::Database::connect(database_url))?;
    let edge = functions::from_env(&database)?;
    let store = anon_cart::AnonCartStore::open(&cli.anon_carts);

    let state = dashboard::AppState::new(database, store, edge);
    let mut sys = sysinfo::System::new();
    rt.block_on(dashboard::maintenance_tick(&state, &mut sys));

    eprintln!("Housekeeping pass complete:");
    eprintln!(
        "  Guest carts:          {}",
        state.prom_metrics.guest_carts.get()
    );
    eprintln!(
        "  Active carts:         {}",
        state.prom_metrics.active_carts.get()
    );
    eprintln!(
        "  Duplicate-cart users: {}",
        state.prom_metrics.duplicate_cart_users.get()
    );
    eprintln!(
        "  Orphaned paid orders: {}",
        state.prom_metrics.orphaned_paid_orders.get()
    );
    eprintln!(
        "  Projects in progress: {}",
        state.prom_metrics.projects_in_progress.get()
    );
    Ok(())
}
