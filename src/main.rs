//! # Main — CLI Entry Point
//!
//! Routes CLI subcommands to the server and operational tooling. Handles
//! shared concerns: environment loading, structured logging, and the
//! Tokio runtime.
//!
//! ## Subcommands
//!
//! - `serve`: start the HTTP server (public API, client dashboard, admin
//!   back office, locally mounted functions, per-project WebSocket).
//! - `catalog sync|list`: push a TOML catalog file into the database, or
//!   print the rows currently live.
//! - `broadcast`: post one project update to every project matching a
//!   status filter.
//! - `housekeeping`: run one maintenance pass and exit.
//!
//! ## Global Options
//!
//! - `--database-url` / `DATABASE_URL`: PostgreSQL connection.
//! - `--anon-carts` / `ANON_CART_PATH`: guest cart snapshot file.

mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "estudio", about = "Web agency client platform: catalog, carts, orders, projects")]
struct Cli {
    /// PostgreSQL connection URL (or set DATABASE_URL env var)
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Path to the guest cart snapshot file
    #[arg(long, env = "ANON_CART_PATH", default_value = "estudio-carts.json")]
    anon_carts: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on
        #[arg(long, default_value_t = 7001)]
        port: u16,
        /// Directory to serve static files from (e.g. a built frontend)
        #[arg(long)]
        static_dir: Option<PathBuf>,
    },
    /// Manage the pack and service catalog
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },
    /// Post a project update to every project matching a status filter
    Broadcast {
        /// Restrict to projects with this status (pending, in_progress, completed, cancelled)
        #[arg(long)]
        status: Option<String>,
        /// Update title
        #[arg(long)]
        title: String,
        /// Update body
        #[arg(long)]
        content: String,
    },
    /// Run one maintenance pass (prune stale guest carts, refresh gauges) and exit
    Housekeeping,
}

#[derive(Subcommand)]
enum CatalogAction {
    /// Push a TOML catalog file into the database
    Sync {
        /// Path to the TOML catalog file
        #[arg(long)]
        file: PathBuf,
    },
    /// List catalog rows currently in the database
    List {
        /// Include deactivated entries
        #[arg(long)]
        all: bool,
    },
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // Initialize structured logging: LOG_FORMAT=json for K8s, human-readable otherwise
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt().json().with_target(false).init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve { port, static_dir } => {
            let database_url = cli.database_url.as_deref().ok_or_else(|| {
                anyhow::anyhow!("DATABASE_URL is required (set via --database-url or env)")
            })?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(estudio::dashboard::run(
                *port,
                database_url,
                &cli.anon_carts,
                static_dir.as_deref(),
            ))
        }
        Commands::Catalog { action } => cli::run_catalog(&cli, action),
        Commands::Broadcast {
            status,
            title,
            content,
        } => cli::run_broadcast(&cli, status.as_deref(), title, content),
        Commands::Housekeeping => cli::run_housekeeping(&cli),
    }
}
