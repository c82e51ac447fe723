use anyhow::Result;
use clap::Parser;
use codetrail::capture::CaptureService;
use codetrail::config::Config;
use codetrail::discovery;
use codetrail::poller::Poller;
use codetrail::storage::SqliteStore;
use std::path::PathBuf;
use std::sync::Arc;

/// Background capture of git development activity
#[derive(Parser, Debug)]
#[command(name = "codetrail", version, about)]
struct Args {
    /// Directories to watch for git repositories (comma-separated)
    #[arg(long = "watch", env = "CODETRAIL_WATCH", value_delimiter = ',')]
    watch: Vec<String>,

    /// Path to the configuration file
    #[arg(long, env = "CODETRAIL_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database path
    #[arg(long, env = "CODETRAIL_DB")]
    database: Option<PathBuf>,

    /// Poll interval in seconds
    #[arg(long, env = "CODETRAIL_POLL_INTERVAL")]
    interval: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let mut config = Config::load_or_default(args.config.as_deref())?;
    if !args.watch.is_empty() {
        config.watch.directories = args.watch;
    }
    if let Some(database) = args.database {
        config.storage.database_path = database;
    }
    if let Some(interval) = args.interval {
        config.watch.poll_interval_secs = interval;
    }

    let repos = discovery::discover_repositories(&config.watch.directories);
    if repos.is_empty() {
        tracing::warn!("no git repositories found under the configured watch directories");
    }

    let store = Arc::new(SqliteStore::open(&config.storage.database_path)?);
    let poller = Poller::new(config.watch.poll_interval());
    let results = poller.start(repos).await?;

    let capture = CaptureService::new(store);
    let capture_task = tokio::spawn(async move { capture.run(results).await });

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    poller.stop().await;
    capture_task.await?;

    Ok(())
}
