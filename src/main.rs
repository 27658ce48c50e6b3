use alloy::primitives::Address;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use ecp_notify::chain::{ChainEventSource, RpcClient};
use ecp_notify::config::Config;
use ecp_notify::db::Database;
use ecp_notify::ecp::cache::CommentCache;
use ecp_notify::ecp::client::EcpApiClient;
use ecp_notify::ecp::models::CommentId;
use ecp_notify::pipeline::{
    CommentProcessingJob, CommentProcessor, DbNotificationQueue, EventToJobAdapter, Subscription,
    Worker, WorkerOptions,
};
use ecp_notify::subscribers::DbSubscriberResolver;

/// ecp-notify: push notifications for on-chain comments.
///
/// Listens for CommentAdded events and turns each comment into reply,
/// reaction, mention, and new-post notification jobs.
#[derive(Parser)]
#[command(name = "ecp-notify", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Poll the chain for CommentAdded events and queue them
    Listen,

    /// Process queued comments into notifications
    Work {
        /// Number of worker loops to run (default: 4)
        #[arg(long, default_value = "4")]
        concurrency: u32,
    },

    /// Run the listener and workers in one process
    Run {
        /// Number of worker loops to run (default: 4)
        #[arg(long, default_value = "4")]
        concurrency: u32,
    },

    /// Queue a comment for processing by hand
    Enqueue {
        /// The comment id (bytes32 hex)
        comment_id: String,

        /// Chain the comment lives on (default: CHAIN_ID)
        #[arg(long)]
        chain_id: Option<u64>,

        /// Parent comment id, if this is a reply or reaction
        #[arg(long)]
        parent_id: Option<String>,

        /// 0 = comment, 1 = reaction
        #[arg(long, default_value = "0")]
        comment_type: u8,

        /// Raw comment content
        #[arg(long, default_value = "")]
        content: String,
    },

    /// Subscribe a user to an author's new posts
    Subscribe {
        user_id: String,
        /// Author address to follow
        author: String,
    },

    /// Register a notification device for a user
    RegisterDevice {
        user_id: String,
        /// Push token
        token: String,
        /// Device platform (ios, android, web)
        #[arg(long)]
        platform: Option<String>,
    },

    /// Show system status (queue depth, listener cursor, cache)
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Set up structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("ecp_notify=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            info!("Initializing ecp-notify database...");
            let config = Config::load()?;
            let db = ecp_notify::db::initialize_sqlite(&config.db_path)?;
            let table_count = db.table_count().await?;
            println!("Database initialized at: {}", config.db_path);
            println!("Tables created: {table_count}");
            println!("\nNext step: set BASE_RPC_URL in your .env file");
            println!("  (see .env.example for the optional settings)");
            println!("\nThen run: ecp-notify run");
        }

        Commands::Listen => {
            let config = Config::load()?;
            config.require_rpc()?;
            let db = ecp_notify::db::open_sqlite(&config.db_path)?;

            let subscription = start_listener(&config, db).await?;
            let signal = wait_for_ctrl_c().await;
            subscription.unsubscribe().await;
            signal?;
        }

        Commands::Work { concurrency } => {
            let config = Config::load()?;
            let db = ecp_notify::db::open_sqlite(&config.db_path)?;

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let workers = start_workers(&config, db, concurrency, shutdown_rx)?;
            let signal = wait_for_ctrl_c().await;
            let _ = shutdown_tx.send(true);
            futures::future::join_all(workers).await;
            signal?;
        }

        Commands::Run { concurrency } => {
            let config = Config::load()?;
            config.require_rpc()?;
            let db = ecp_notify::db::open_sqlite(&config.db_path)?;

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let workers = start_workers(&config, db.clone(), concurrency, shutdown_rx)?;
            let subscription = start_listener(&config, db).await?;
            let signal = wait_for_ctrl_c().await;
            subscription.unsubscribe().await;
            let _ = shutdown_tx.send(true);
            futures::future::join_all(workers).await;
            signal?;
        }

        Commands::Enqueue {
            comment_id,
            chain_id,
            parent_id,
            comment_type,
            content,
        } => {
            let config = Config::load()?;
            let db = ecp_notify::db::open_sqlite(&config.db_path)?;

            let job = CommentProcessingJob {
                comment_id: CommentId::new(&comment_id),
                chain_id: chain_id.unwrap_or(config.chain_id),
                content,
                parent_id: parent_id.as_deref().and_then(CommentId::parent),
                comment_type,
            };
            if db.enqueue_comment_job(&job, config.job_max_attempts).await? {
                println!("{} Queued {}", "✓".green(), job.comment_id);
            } else {
                println!(
                    "{} A job for {} already exists",
                    "-".dimmed(),
                    job.comment_id
                );
            }
        }

        Commands::Subscribe { user_id, author } => {
            let config = Config::load()?;
            let db = ecp_notify::db::open_sqlite(&config.db_path)?;
            db.add_post_subscription(&user_id, &author).await?;
            println!(
                "{} {} now follows posts by {}",
                "✓".green(),
                user_id,
                author.to_lowercase()
            );
        }

        Commands::RegisterDevice {
            user_id,
            token,
            platform,
        } => {
            let config = Config::load()?;
            let db = ecp_notify::db::open_sqlite(&config.db_path)?;
            db.register_device(&user_id, &token, platform.as_deref())
                .await?;
            println!("{} Device registered for {}", "✓".green(), user_id);
        }

        Commands::Status => {
            let config = Config::load()?;
            let db = ecp_notify::db::open_sqlite(&config.db_path)?;
            ecp_notify::status::show(&db, &config.db_path).await?;
        }
    }

    Ok(())
}

/// Start polling from the saved cursor (or the chain head on first run).
async fn start_listener(config: &Config, db: Arc<dyn Database>) -> Result<Subscription> {
    let contract: Address = config
        .comment_manager_address
        .parse()
        .with_context(|| {
            format!(
                "Invalid COMMENT_MANAGER_ADDRESS: {}",
                config.comment_manager_address
            )
        })?;
    let rpc = Arc::new(RpcClient::new(&config.rpc_url)?);
    let adapter = EventToJobAdapter::new(db, config.job_max_attempts);
    let cursor = adapter.saved_cursor().await?;

    let source = ChainEventSource::new(
        rpc,
        contract,
        config.chain_id,
        config.poll_interval,
        config.max_block_range,
    )
    .starting_at(cursor);

    match cursor {
        Some(block) => info!(block, "Resuming listener"),
        None => info!("No saved cursor, starting at chain head"),
    }
    info!(
        address = %contract,
        chain_id = config.chain_id,
        "Listening for CommentAdded events"
    );

    Ok(ecp_notify::pipeline::subscribe(source, adapter))
}

fn start_workers(
    config: &Config,
    db: Arc<dyn Database>,
    concurrency: u32,
    shutdown: watch::Receiver<bool>,
) -> Result<Vec<tokio::task::JoinHandle<()>>> {
    let api = Arc::new(EcpApiClient::new(&config.api_url)?);
    let cache = CommentCache::new(api, db.clone(), config.cache_ttl);
    let processor = Arc::new(CommentProcessor::new(
        cache,
        Arc::new(DbNotificationQueue::new(db.clone())),
        Arc::new(DbSubscriberResolver::new(db.clone())),
        config.fetch_options(),
    ));

    let concurrency = concurrency.max(1);
    info!(concurrency, "Starting workers");

    let handles = (0..concurrency)
        .map(|i| {
            let worker = Worker::new(
                db.clone(),
                processor.clone(),
                WorkerOptions {
                    worker_id: format!("worker-{i}"),
                    backoff: config.job_backoff,
                    stall_timeout: config.stall_timeout,
                    ..WorkerOptions::default()
                },
            );
            let shutdown = shutdown.clone();
            tokio::spawn(async move { worker.run(shutdown).await })
        })
        .collect();

    Ok(handles)
}

/// Block until Ctrl-C. Callers shut down either way, then surface the error.
async fn wait_for_ctrl_c() -> Result<()> {
    wait_for_signal(tokio::signal::ctrl_c()).await
}

async fn wait_for_signal(signal: impl Future<Output = std::io::Result<()>>) -> Result<()> {
    signal.await.context("Failed to listen for Ctrl-C")?;
    info!("Shutting down...");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_signal_registration_failure_is_an_error() {
        let failed = std::future::ready(Err(std::io::Error::other("no signal driver")));
        let err = wait_for_signal(failed).await.unwrap_err();
        assert!(err.to_string().contains("Failed to listen for Ctrl-C"));
    }

    #[tokio::test]
    async fn test_signal_received() {
        assert!(wait_for_signal(std::future::ready(Ok(()))).await.is_ok());
    }
}
