use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use pipeline::config::{Config, ConfigManager};
use pipeline::constants::cleanup;
use pipeline::database::{status, Database};
use pipeline::operation_tracker::RunLeaseTracker;
use pipeline::run_context::Trigger;
use pipeline::scheduler::WorkflowScheduler;
use pipeline::services::{AlertService, WorkflowRunner};
use pipeline::spotify::SpotifyClient;
use pipeline::web::{start_web_server, AppState};

#[derive(Parser)]
#[command(name = "pipeline", version, about = "Spotify recently-played ELT pipeline")]
struct Cli {
    /// Directory holding main.toml and secrets.toml
    #[arg(long, env = "PIPELINE_CONFIG_DIR", default_value = "config", global = true)]
    config_dir: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler and the HTTP API (default)
    Serve,
    /// Execute one run in the foreground and exit
    Run {
        /// Logical date as RFC 3339; defaults to the current minute
        #[arg(long)]
        logical_date: Option<DateTime<Utc>>,
    },
    /// Print the URL that grants the pipeline access to the account
    AuthUrl,
    /// Exchange an authorization code and write the token cache
    AuthExchange {
        #[arg(long)]
        code: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::from_default_env()
        .add_directive("pipeline=info".parse()?)
        .add_directive("tower_http=warn".parse()?)
        .add_directive("tokio_cron_scheduler=warn".parse()?)
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?)
        .add_directive("sqlx=warn".parse()?);

    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    let config_manager = ConfigManager::new(cli.config_dir.clone()).await?;
    let config = config_manager.get_current_config();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Run { logical_date } => run_once(config, logical_date).await,
        Command::AuthUrl => {
            let client = SpotifyClient::new(&config)?;
            println!("{}", client.auth().authorize_url()?);
            Ok(())
        }
        Command::AuthExchange { code } => {
            let client = SpotifyClient::new(&config)?;
            let token = client.auth().exchange_code(&code).await?;
            info!(
                "Token cache written to {} (scope '{}')",
                client.auth().cache_path().display(),
                token.scope
            );
            Ok(())
        }
    }
}

async fn build_runner(config: &Arc<Config>) -> Result<(Arc<Database>, WorkflowRunner)> {
    let database = Arc::new(Database::new(&config.database_path).await?);
    info!("Database initialized");

    let alert_service = AlertService::new(config.alert_webhook_url.clone())?;
    if alert_service.is_enabled() {
        info!("Failure alerts enabled");
    } else {
        warn!("No alert_webhook_url configured, failure alerts are disabled");
    }

    let runner = WorkflowRunner::from_config(
        config.clone(),
        database.clone(),
        RunLeaseTracker::new(database.clone()),
        alert_service,
    )?;
    Ok((database, runner))
}

async fn run_once(config: Arc<Config>, logical_date: Option<DateTime<Utc>>) -> Result<()> {
    let (_database, runner) = build_runner(&config).await?;

    let ctx = runner.context(logical_date.unwrap_or_else(Utc::now), Trigger::Manual);
    info!("Running {} for {}", ctx.workflow_id, ctx.logical_date.to_rfc3339());

    let record = runner.run(ctx).await?;
    if record.status == status::SUCCESS {
        info!(
            "Run {} succeeded: {} archived under {}",
            record.run_id,
            record.archived_count.unwrap_or(0),
            config.storage.raw_prefix
        );
        Ok(())
    } else {
        Err(anyhow!(
            "Run {} ended with status {}: {}",
            record.run_id,
            record.status,
            record.error_message.unwrap_or_default()
        ))
    }
}

async fn serve(config: Arc<Config>) -> Result<()> {
    info!("Starting pipeline service for workflow {}", config.workflow.id);

    let (database, runner) = build_runner(&config).await?;

    // Periodic stale lease cleanup
    let leases = runner.leases().clone();
    let stale_hours = config.workflow.stale_run_hours;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(
            cleanup::CLEANUP_INTERVAL_SECONDS,
        ));
        loop {
            interval.tick().await;
            match leases.cleanup_stale(stale_hours).await {
                Ok(0) => {}
                Ok(cleaned) => warn!(
                    "Released {} stale run lease(s) older than {} hours",
                    cleaned, stale_hours
                ),
                Err(e) => error!("Stale lease cleanup failed: {}", e),
            }
        }
    });

    let scheduler = WorkflowScheduler::new(config.clone(), runner.clone()).await?;
    if let Err(e) = scheduler.start().await {
        error!("Failed to start scheduler: {}", e);
        return Err(e);
    }
    info!("Scheduler started");

    let state = AppState::new(config, database, runner);
    start_web_server(state).await?;

    Ok(())
}
