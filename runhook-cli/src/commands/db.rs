//! Store commands: connectivity check and schema setup

use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use runhook_core::Settings;
use runhook_db::{run_in_transaction, DbError, IsolationLevel, TransactionOptions};
use tracing::info;

#[derive(Parser, Debug)]
pub struct DbArgs {
    #[command(subcommand)]
    pub command: DbCommands,
}

#[derive(Subcommand, Debug)]
pub enum DbCommands {
    /// Connect and run a trivial transaction
    Check(CheckArgs),
    /// Create the run record tables
    Migrate,
}

#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Isolation level for the check transaction (e.g. serializable)
    #[arg(long, value_name = "LEVEL")]
    pub isolation: Option<IsolationLevel>,

    /// Milliseconds to wait for the transaction to start
    #[arg(long, value_name = "MS")]
    pub max_wait_ms: Option<u64>,

    /// Milliseconds the transaction may run
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,
}

impl CheckArgs {
    fn options(&self) -> TransactionOptions {
        let mut options = TransactionOptions::default().rethrowing();
        if let Some(level) = self.isolation {
            options = options.with_isolation_level(level);
        }
        if let Some(ms) = self.max_wait_ms {
            options = options.with_max_wait(Duration::from_millis(ms));
        }
        if let Some(ms) = self.timeout_ms {
            options = options.with_timeout(Duration::from_millis(ms));
        }
        options
    }
}

pub async fn run_db(args: DbArgs, settings: &Settings) -> Result<()> {
    match args.command {
        DbCommands::Check(args) => run_check(args, settings).await,
        DbCommands::Migrate => run_migrate(settings).await,
    }
}

async fn run_check(args: CheckArgs, settings: &Settings) -> Result<()> {
    let store = crate::connect(settings).await?;
    let options = args.options();

    let isolation = run_in_transaction(
        store.client(),
        |conn| {
            Box::pin(async move {
                let level: String = sqlx::query_scalar("SHOW transaction_isolation")
                    .fetch_one(&mut *conn)
                    .await?;
                Ok::<_, DbError>(level)
            })
        },
        &options,
    )
    .await?
    .ok_or_else(|| anyhow!("check transaction was aborted"))?;

    info!(isolation = %isolation, "store check passed");
    println!("ok (isolation: {})", isolation);
    Ok(())
}

async fn run_migrate(settings: &Settings) -> Result<()> {
    let store = crate::connect(settings).await?;
    runhook_db::migrations::run(store.pool()).await?;
    println!("schema up to date");
    Ok(())
}
