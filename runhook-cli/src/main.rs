//! runhook CLI - operate on run records and their endpoint notifications
//!
//! - Schema setup and store connectivity checks (`db`)
//! - Inspect runs, change their status and re-send notifications (`runs`)

use std::collections::HashMap;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use runhook_core::settings::{DATABASE_CONNECTION_LIMIT, DATABASE_POOL_TIMEOUT, DATABASE_URL};
use runhook_core::Settings;
use runhook_db::{ConnectionTarget, PgStore};

mod commands;
mod tracing_setup;

#[derive(Parser, Debug)]
#[command(
    name = "runhook",
    author,
    version,
    about = "Run record store client with endpoint notifications",
    long_about = "Manage the run record schema, inspect run graphs and deliver \
                  DELIVER_EVENT_NOTIFICATION callbacks to job endpoints."
)]
struct Cli {
    /// Debug logging (RUST_LOG still wins when set)
    #[arg(long, global = true)]
    debug: bool,

    /// Export traces over OTLP (needs the telemetry feature)
    #[arg(long, global = true)]
    otel: bool,

    /// Database URL, overrides DATABASE_URL
    #[arg(long, global = true, value_name = "URL")]
    database_url: Option<String>,

    /// Maximum pooled connections, overrides DATABASE_CONNECTION_LIMIT
    #[arg(long, global = true, value_name = "N")]
    connection_limit: Option<u32>,

    /// Seconds to wait for a pooled connection, overrides DATABASE_POOL_TIMEOUT
    #[arg(long, global = true, value_name = "SECS")]
    pool_timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Store operations (check, migrate)
    Db(commands::db::DbArgs),
    /// Run record operations (list, show, set-status, notify)
    Runs(commands::runs::RunsArgs),
}

impl Cli {
    /// Environment settings with command-line overrides applied
    fn settings(&self) -> Result<Settings> {
        let mut overrides: HashMap<&str, String> = HashMap::new();
        if let Some(url) = &self.database_url {
            overrides.insert(DATABASE_URL, url.clone());
        }
        if let Some(limit) = self.connection_limit {
            overrides.insert(DATABASE_CONNECTION_LIMIT, limit.to_string());
        }
        if let Some(timeout) = self.pool_timeout {
            overrides.insert(DATABASE_POOL_TIMEOUT, timeout.to_string());
        }

        Settings::from_lookup(|name| {
            overrides
                .get(name)
                .cloned()
                .or_else(|| std::env::var(name).ok())
        })
        .context("invalid settings")
    }
}

/// Build the one store client this process uses
async fn connect(settings: &Settings) -> Result<PgStore> {
    let target = ConnectionTarget::from_settings(settings)?;
    runhook_db::connect(&target)
        .await
        .with_context(|| format!("failed to connect to {}", target.redacted()))
}

#[tokio::main]
async fn main() -> Result<()> {
    runhook_core::load_dotenv();
    let cli = Cli::parse();

    tracing_setup::init(&tracing_setup::TracingConfig {
        debug: cli.debug,
        otel: cli.otel,
    })
    .ok();

    let settings = cli.settings()?;
    let result = match cli.command {
        Commands::Db(args) => commands::run_db(args, &settings).await,
        Commands::Runs(args) => commands::run_runs(args, &settings).await,
    };

    tracing_setup::shutdown_otel();
    result
}
