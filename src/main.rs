//! `complaint-engine` maintenance binary: migrations, counter repair, reports.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use complaint_engine::db::{self, PgRecordStore};
use complaint_engine::notify::TracingEmitter;
use complaint_engine::{Config, Engine};

#[derive(Parser)]
#[command(name = "complaint-engine")]
#[command(about = "Maintenance and reporting for the complaint lifecycle store")]
struct Cli {
    /// Postgres connection string (overrides the environment)
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply schema migrations
    Migrate,
    /// Recompute cached user counters (one user, or everyone)
    Reconcile {
        #[arg(long)]
        user: Option<Uuid>,
    },
    /// Check one user's counters without writing; non-zero exit on drift
    Verify {
        #[arg(long)]
        user: Uuid,
    },
    /// Print the dashboard as JSON
    Dashboard,
    /// Print the full performance snapshot as JSON
    Snapshot,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment from .env if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "complaint_engine=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if cli.database_url.is_some() {
        config.database.url = cli.database_url;
    }

    let pool = db::connect(&config.database, config.database_url()?).await?;
    let engine = || Engine::new(Arc::new(PgRecordStore::new(pool.clone())), Arc::new(TracingEmitter), &config);

    match cli.command {
        Command::Migrate => db::migrate(&pool).await?,
        Command::Reconcile { user: Some(user_id) } => {
            print_json(&engine().counters.reconcile(user_id).await?)?;
        }
        Command::Reconcile { user: None } => {
            let sweep = engine().counters.reconcile_all().await?;
            info!(
                checked = sweep.users_checked,
                repaired = sweep.users_repaired,
                failed = sweep.failures.len(),
                "reconcile sweep finished"
            );
            print_json(&sweep)?;
        }
        Command::Verify { user } => {
            print_json(&engine().counters.verify(user).await?)?;
        }
        Command::Dashboard => print_json(&engine().analytics.dashboard().await?)?,
        Command::Snapshot => print_json(&engine().analytics.snapshot().await?)?,
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
