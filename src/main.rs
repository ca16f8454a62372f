//! xrpl-remote - rippled stream monitor
//!
//! Keeps one WebSocket session open to a rippled server, subscribes to the
//! configured streams and prints every event as a JSON line on stdout.

use std::io::Write;
use tracing_subscriber::EnvFilter;
use xrpl_remote_client::{Config, Remote, SessionEnd};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Load configuration (from file if XRPL_REMOTE_CONFIG is set, then env overrides)
    let config = match Config::load() {
        Ok(c) => {
            if let Ok(path) = std::env::var("XRPL_REMOTE_CONFIG") {
                tracing::info!("Loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };

    if config.subscribe.streams.is_empty() && config.subscribe.accounts.is_empty() {
        tracing::error!("Nothing to subscribe to");
        return Err("subscribe.streams and subscribe.accounts are both empty".into());
    }

    let connection = config.connection_config();
    tracing::info!("Starting xrpl-remote monitor");
    tracing::info!("  Endpoint: {}", connection.endpoint);
    tracing::info!(
        "  Liveness window: {:?} (ping every {:?})",
        connection.liveness_window,
        connection.ping_interval
    );
    let names: Vec<_> = config.subscribe.streams.iter().map(|s| s.as_str()).collect();
    tracing::info!("  Streams: {}", names.join(", "));
    if !config.subscribe.accounts.is_empty() {
        tracing::info!("  Accounts: {}", config.subscribe.accounts.len());
    }

    let remote = Remote::connect(connection).await?;
    let mut events = remote
        .stream_events()
        .ok_or("stream events already taken")?;

    let result = remote
        .subscribe_accounts(&config.subscribe.streams, &config.subscribe.accounts)
        .await?;
    match result.ledger_index {
        Some(index) => tracing::info!("Subscribed at ledger {}", index),
        None => tracing::info!("Subscribed"),
    }

    let mut stdout = std::io::stdout().lock();
    let end = loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    serde_json::to_writer(&mut stdout, &event)?;
                    writeln!(stdout)?;
                    stdout.flush()?;
                }
                None => break remote.closed().await,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received shutdown signal");
                break remote.close().await;
            }
        }
    };

    match end {
        SessionEnd::Closed => {
            tracing::info!("Monitor stopped");
            Ok(())
        }
        other => {
            tracing::error!("Session ended: {}", other);
            Err(other.into())
        }
    }
}
