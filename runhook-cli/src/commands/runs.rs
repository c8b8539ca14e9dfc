//! Run record commands
//!
//! ```bash
//! runhook runs list --status started --limit 10
//! runhook runs show run_123 | jq '.runConnections'
//! runhook runs set-status run_123 success   # notifies the endpoint
//! runhook runs notify run_123               # re-send without writing
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use runhook_core::models::DEFAULT_RUN_LIMIT;
use runhook_core::{RunFilter, RunGraph, RunStatus, RunUpdate, Settings};
use runhook_db::{PgRunRepository, RunRepository};
use runhook_notify::{HttpNotifier, NotifierConfig};
use tracing::info;

#[derive(Parser, Debug)]
pub struct RunsArgs {
    #[command(subcommand)]
    pub command: RunsCommands,
}

#[derive(Subcommand, Debug)]
pub enum RunsCommands {
    /// List runs, newest first
    List(ListArgs),
    /// Print a run with all of its relations as JSON
    Show(ShowArgs),
    /// Change a run's status and notify its endpoint
    SetStatus(SetStatusArgs),
    /// Send the run's current state to its endpoint again
    Notify(NotifyArgs),
}

#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Only runs in this environment
    #[arg(long, value_name = "ID")]
    pub environment: Option<String>,

    /// Only runs with this status (e.g. started, success)
    #[arg(long)]
    pub status: Option<RunStatus>,

    /// Number of runs to return
    #[arg(long, default_value_t = DEFAULT_RUN_LIMIT)]
    pub limit: i64,
}

#[derive(Parser, Debug)]
pub struct ShowArgs {
    /// Run ID
    pub id: String,

    /// Print the environment API key instead of masking it
    #[arg(long)]
    pub reveal_secrets: bool,
}

#[derive(Parser, Debug)]
pub struct SetStatusArgs {
    /// Run ID
    pub id: String,

    /// New status (e.g. started, success, failure)
    pub status: RunStatus,
}

#[derive(Parser, Debug)]
pub struct NotifyArgs {
    /// Run ID
    pub id: String,
}

pub async fn run_runs(args: RunsArgs, settings: &Settings) -> Result<()> {
    let store = crate::connect(settings).await?;
    let repo = PgRunRepository::new(store.pool().clone());

    match args.command {
        RunsCommands::List(args) => run_list(&repo, args).await,
        RunsCommands::Show(args) => run_show(&repo, args).await,
        RunsCommands::SetStatus(args) => run_set_status(repo, settings, args).await,
        RunsCommands::Notify(args) => run_notify(repo, settings, args).await,
    }
}

fn notifier(settings: &Settings) -> HttpNotifier {
    HttpNotifier::new(NotifierConfig {
        timeout: settings.notification_timeout,
    })
}

async fn run_list(repo: &PgRunRepository, args: ListArgs) -> Result<()> {
    let runs = repo
        .find_many(RunFilter {
            environment_id: args.environment,
            status: args.status,
            limit: args.limit,
        })
        .await?;

    for run in &runs {
        println!(
            "{}\t#{}\t{}\t{}",
            run.id,
            run.number,
            run.status,
            run.created_at.to_rfc3339()
        );
    }
    info!(count = runs.len(), "listed runs");
    Ok(())
}

async fn run_show(repo: &PgRunRepository, args: ShowArgs) -> Result<()> {
    let Some(mut graph) = repo.load_graph(&args.id).await? else {
        bail!("run {} not found", args.id);
    };
    if !args.reveal_secrets {
        mask_secrets(&mut graph);
    }

    let json = serde_json::to_string_pretty(&graph).context("failed to serialize run")?;
    println!("{}", json);
    Ok(())
}

fn mask_secrets(graph: &mut RunGraph) {
    graph.environment.api_key = "********".to_string();
}

async fn run_set_status(
    repo: PgRunRepository,
    settings: &Settings,
    args: SetStatusArgs,
) -> Result<()> {
    let repo = repo.with_notifier(notifier(settings));

    let Some(run) = repo.update(&args.id, RunUpdate::status(args.status)).await? else {
        bail!("run {} not found", args.id);
    };

    println!("{}\t{}", run.id, run.status);
    Ok(())
}

async fn run_notify(repo: PgRunRepository, settings: &Settings, args: NotifyArgs) -> Result<()> {
    let repo = repo.with_notifier(notifier(settings));

    if !repo.redeliver(&args.id).await? {
        bail!("run {} not found", args.id);
    }

    println!("notification delivered for {}", args.id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use runhook_core::fixtures;

    #[test]
    fn parses_lowercase_status() {
        let args = SetStatusArgs::try_parse_from(["set-status", "run_1", "waiting_on_connections"])
            .unwrap();
        assert_eq!(args.status, RunStatus::WaitingOnConnections);
        assert!(SetStatusArgs::try_parse_from(["set-status", "run_1", "exploded"]).is_err());
    }

    #[test]
    fn list_defaults_to_standard_page() {
        let args = ListArgs::try_parse_from(["list"]).unwrap();
        assert_eq!(args.limit, DEFAULT_RUN_LIMIT);
        assert!(args.status.is_none());
    }

    #[test]
    fn show_masks_api_key_by_default() {
        let mut graph = fixtures::run_graph(fixtures::job_run("run_1"), "https://acme.dev", "tr_secret");
        mask_secrets(&mut graph);

        let json = serde_json::to_string(&graph).unwrap();
        assert!(!json.contains("tr_secret"));
        assert_eq!(graph.endpoint.url, "https://acme.dev");
    }
}
