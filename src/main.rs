use anyhow::{Context, Result};
use clap::Parser;
use encore_server::background_jobs::jobs::TrendingRecomputeJob;
use encore_server::background_jobs::JobScheduler;
use encore_server::broadcast::VoteBroadcaster;
use encore_server::catalog_store::{CatalogStore, SqliteCatalogStore};
use encore_server::config::{AppConfig, CliConfig, FileConfig};
use encore_server::server::websocket::TopicConnectionManager;
use encore_server::server::{metrics, run_server, RequestsLoggingLevel, ServerState};
use encore_server::server_store::{ServerStore, SqliteServerStore};
use encore_server::vote_store::{SqliteVoteStore, VoteStore};
use encore_server::votes::VoteEventHandler;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about = "Setlist vote trending server")]
struct CliArgs {
    /// Directory holding the sqlite databases.
    #[arg(long)]
    db_dir: Option<PathBuf>,

    /// Optional TOML config file; values there override CLI flags.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Port for the API and websocket endpoint.
    #[arg(long, default_value_t = 3001)]
    port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, default_value_t = 9091)]
    metrics_port: u16,

    /// How much of each HTTP request to log.
    #[arg(long, value_enum, default_value_t = RequestsLoggingLevel::Path)]
    logging_level: RequestsLoggingLevel,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args = CliArgs::parse();

    let file_config = match &args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let cli = CliConfig {
        db_dir: args.db_dir,
        port: args.port,
        metrics_port: args.metrics_port,
        logging_level: args.logging_level,
    };
    let config = AppConfig::resolve(&cli, file_config).context("Failed to resolve config")?;

    let catalog_store: Arc<dyn CatalogStore> =
        Arc::new(SqliteCatalogStore::new(config.catalog_db_path())?);
    let vote_store: Arc<dyn VoteStore> = Arc::new(SqliteVoteStore::new(config.votes_db_path())?);
    let server_store: Arc<dyn ServerStore> =
        Arc::new(SqliteServerStore::new(config.server_db_path())?);

    metrics::init_metrics();
    metrics::set_catalog_counts(
        catalog_store.get_artists_count(),
        catalog_store.get_shows_count(),
        catalog_store.get_setlist_songs_count(),
    );
    info!(
        "Catalog loaded: {} artists, {} shows, {} setlist songs",
        catalog_store.get_artists_count(),
        catalog_store.get_shows_count(),
        catalog_store.get_setlist_songs_count()
    );

    let connections = Arc::new(TopicConnectionManager::new());
    let broadcaster: Arc<dyn VoteBroadcaster> = connections.clone();
    let vote_handler = Arc::new(VoteEventHandler::new(
        catalog_store.clone(),
        vote_store.clone(),
        server_store.clone(),
        broadcaster,
        config.scoring.clone(),
        config.anomaly.clone(),
        config.broadcast.clone(),
    ));

    let shutdown = CancellationToken::new();

    let mut scheduler = JobScheduler::new(
        catalog_store.clone(),
        vote_store.clone(),
        server_store.clone(),
        shutdown.clone(),
    );
    scheduler.register(Arc::new(TrendingRecomputeJob::from_settings(
        config.trending_job.clone(),
        config.scoring.clone(),
    )));
    let scheduler_handle = tokio::spawn(scheduler.run());

    let ctrl_c_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Shutdown signal received");
        ctrl_c_shutdown.cancel();
    });

    let state = ServerState {
        catalog_store,
        vote_store,
        server_store,
        connections,
        vote_handler,
        logging_level: config.logging_level.clone(),
    };

    run_server(state, config.port, config.metrics_port, shutdown.clone()).await?;

    shutdown.cancel();
    if let Err(e) = scheduler_handle.await {
        error!("Job scheduler task failed: {}", e);
    }
    info!("Shutdown complete");

    Ok(())
}
