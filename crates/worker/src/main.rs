use anyhow::Context;
use carteira_core::review::{RunOutcome, ReviewOrchestrator};
use carteira_core::storage::{AnalysisStore, PgAnalysisStore};
use carteira_core::time::schedule::ReviewSchedule;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "carteira_worker")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Review every asset of every portfolio once.
    Full,

    /// Review the assets of one portfolio.
    Portfolio {
        #[arg(long)]
        name: String,
    },

    /// Review a single asset.
    Asset {
        #[arg(long)]
        ticker: String,

        #[arg(long)]
        portfolio: String,
    },

    /// Stay up and run the full review on the configured schedule.
    Schedule,

    /// Print active analyses whose next review date has passed.
    #[command(name = "status-pending")]
    StatusPending,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = carteira_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let db_url = settings.require_database_url()?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;

    carteira_core::storage::migrate(&pool).await?;

    let store: Arc<dyn AnalysisStore> = Arc::new(PgAnalysisStore::new(pool.clone()));
    let orchestrator =
        carteira_core::review::build_orchestrator(&settings, store.clone(), Some(pool))?;

    match args.command {
        Command::Full => report(orchestrator.run_full().await, &orchestrator),
        Command::Portfolio { name } => report(orchestrator.run_portfolio(&name).await, &orchestrator),
        Command::Asset { ticker, portfolio } => {
            match orchestrator.run_asset(&ticker, &portfolio).await {
                Some(analysis) => println!("{}", serde_json::to_string_pretty(&analysis)?),
                None => anyhow::bail!("no analysis produced for {ticker} in {portfolio}"),
            }
            Ok(())
        }
        Command::Schedule => {
            let schedule = ReviewSchedule::from_env()?;
            let orchestrator = Arc::new(orchestrator);
            let timer = carteira_core::review::spawn_review_timer(orchestrator, schedule);
            tokio::select! {
                res = timer => res.context("review timer task failed")?,
                _ = tokio::signal::ctrl_c() => tracing::info!("shutdown requested"),
            }
            Ok(())
        }
        Command::StatusPending => {
            let pending = store.list_pending_review(chrono::Utc::now()).await?;
            println!("{}", serde_json::to_string_pretty(&pending)?);
            Ok(())
        }
    }
}

fn report(outcome: RunOutcome, orchestrator: &ReviewOrchestrator) -> anyhow::Result<()> {
    let status = orchestrator.status();
    match outcome {
        RunOutcome::Completed(analyses) => {
            tracing::info!(
                assets = analyses.len(),
                failures = status.last_run_failures,
                status = %status.last_run_status,
                "review run completed"
            );
            println!("{}", serde_json::to_string_pretty(&analyses)?);
            Ok(())
        }
        RunOutcome::AlreadyRunning => {
            tracing::warn!("review run already in progress; nothing to do");
            Ok(())
        }
        RunOutcome::Aborted(error) => {
            let err = anyhow::anyhow!(error);
            sentry_anyhow::capture_anyhow(&err);
            Err(err.context("review run aborted"))
        }
    }
}

fn init_sentry(settings: &carteira_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_subcommands() {
        let args = Args::try_parse_from(["carteira_worker", "status-pending"]).unwrap();
        assert!(matches!(args.command, Command::StatusPending));

        let args = Args::try_parse_from([
            "carteira_worker",
            "asset",
            "--ticker",
            "TAEE11",
            "--portfolio",
            "Dividendos",
        ])
        .unwrap();
        assert!(matches!(
            args.command,
            Command::Asset { ref ticker, ref portfolio } if ticker == "TAEE11" && portfolio == "Dividendos"
        ));

        assert!(Args::try_parse_from(["carteira_worker", "pending"]).is_err());
    }
}
