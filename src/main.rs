use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use nyaawatch::config::Config;
use nyaawatch::feed::{parse_feed, FeedSource, HttpFeedSource};
use nyaawatch::notify::{LogSink, NotificationSink, WebhookSink};
use nyaawatch::pipeline::Dispatcher;
use nyaawatch::storage::{StoreError, SubscriptionStore};
use nyaawatch::watcher::FeedWatcher;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Get the config directory path (~/.config/nyaawatch/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("nyaawatch"))
}

#[derive(Parser, Debug)]
#[command(name = "nyaawatch", about = "Forward new feed releases matching your subscriptions")]
struct Args {
    /// Config file (default: ~/.config/nyaawatch/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the feed URL
    #[arg(long, value_name = "URL")]
    feed_url: Option<String>,

    /// Override the polling interval in seconds
    #[arg(long, value_name = "SECS")]
    interval: Option<u64>,

    /// Fetch and parse the feed once, print the item count and exit
    #[arg(long)]
    once: bool,
}

/// Cancel `token` on Ctrl-C or SIGTERM.
fn spawn_shutdown_listener(token: CancellationToken) -> Result<()> {
    #[cfg(unix)]
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::spawn(async move {
        #[cfg(unix)]
        let sigterm_fut = sigterm.recv();
        #[cfg(not(unix))]
        let sigterm_fut = std::future::pending::<Option<()>>();

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received SIGINT, shutting down gracefully");
            }
            _ = sigterm_fut => {
                tracing::info!("Received SIGTERM, shutting down gracefully");
            }
        }
        token.cancel();
    });

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));

    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    config.apply_env();
    config.apply_overrides(args.feed_url, args.interval);
    config.validate().context("Invalid configuration")?;
    tracing::debug!(config = ?config, "Effective configuration");

    let client = reqwest::Client::builder()
        .user_agent(concat!("nyaawatch/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    let source = HttpFeedSource::new(client.clone(), config.feed_url.clone(), config.fetch_limits());

    if args.once {
        let raw = source.fetch().await.context("Failed to fetch feed")?;
        let items = parse_feed(&raw).context("Failed to parse feed")?;
        println!("{}: {} items", source.url(), items.len());
        if let Some(head) = items.first() {
            println!("newest: {} ({})", head.title, head.guid);
        }
        return Ok(());
    }

    let db_path = match &config.database_path {
        Some(path) => PathBuf::from(path),
        None => {
            std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
            config_dir.join("subscriptions.db")
        }
    };
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let store = match SubscriptionStore::open(db_path_str).await {
        Ok(store) => store,
        Err(StoreError::Locked) => {
            eprintln!("Error: The subscription database is locked by another process.");
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open subscription database: {}", e)),
    };

    let sink: Arc<dyn NotificationSink> = match config.webhook_url.take() {
        Some(url) => Arc::new(WebhookSink::new(client, url, config.request_timeout())),
        None => {
            tracing::warn!("No webhook configured, matched releases will only be logged");
            Arc::new(LogSink)
        }
    };

    let cancel = CancellationToken::new();
    spawn_shutdown_listener(cancel.clone())?;

    let watcher = FeedWatcher::new(source, parse_feed, config.poll_interval());
    tracing::info!(
        feed = %config.feed_url,
        interval_secs = config.poll_interval_secs,
        batch_size = config.batch_size,
        "Listening to feed"
    );

    let events = watcher.watch(cancel.clone());
    let stats = nyaawatch::runner::run(
        events,
        &store,
        sink.as_ref(),
        Dispatcher::new(config.batch_size),
        &cancel,
    )
    .await;

    println!(
        "Stopped after {} events: {} matched, {} batches delivered, {} failed, {} undelivered",
        stats.events,
        stats.matched_items,
        stats.delivered_batches,
        stats.failed_batches,
        stats.undelivered_batches
    );
    Ok(())
}
