//! xrpl-remote-cli - Command-line interface for rippled
//!
//! Provides both a REPL and one-shot command execution.

mod commands;
mod repl;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use xrpl_remote_client::{ConnectionConfig, Remote};
use xrpl_remote_protocol::{StreamCategory, DEFAULT_ENDPOINT};

#[derive(Parser)]
#[command(name = "xrpl-remote-cli")]
#[command(about = "Command-line interface for a rippled WebSocket endpoint")]
#[command(version)]
struct Cli {
    /// Server endpoint (ws:// URL)
    #[arg(short, long, env = "XRPL_REMOTE_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    server: String,

    /// Seconds to wait for each response (0 = wait indefinitely)
    #[arg(short, long, default_value = "30")]
    timeout: u64,

    /// Seconds of silence before the session is considered dead
    #[arg(long, default_value = "60")]
    liveness: u64,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Start interactive REPL
    Repl,

    /// Ping the server
    Ping,

    /// Get server info
    ServerInfo,

    /// Look up a transaction by hash
    Tx {
        /// Transaction hash (64 hex characters)
        hash: String,
    },

    /// Submit a signed transaction
    Submit {
        /// Transaction blob as hex (or @file to read raw bytes from a file)
        blob: String,

        /// Do not fall back to queuing or relaying on failure
        #[arg(long)]
        fail_hard: bool,
    },

    /// Send any command with JSON parameters
    Request {
        /// Command name, e.g. account_info
        command: String,

        /// Parameters JSON (or @file.json to read from file)
        params: Option<String>,
    },

    /// Subscribe to streams and print events until Ctrl+C
    Watch {
        /// Streams to follow
        #[arg(short, long, value_delimiter = ',', default_value = "ledger")]
        streams: Vec<StreamCategory>,

        /// Also follow transactions affecting these accounts
        #[arg(short, long, value_delimiter = ',')]
        accounts: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = ConnectionConfig::new(cli.server.clone())
        .with_liveness_window(Duration::from_secs(cli.liveness));
    config = match cli.timeout {
        0 => config.without_request_timeout(),
        secs => config.with_request_timeout(Duration::from_secs(secs)),
    };

    match cli.command {
        Some(Commands::Repl) | None => {
            repl::run(config).await?;
        }
        Some(Commands::Watch { streams, accounts }) => {
            let remote = connect(config).await?;
            let mut events = remote
                .stream_events()
                .ok_or("stream events already taken")?;

            match remote.subscribe_accounts(&streams, &accounts).await {
                Ok(result) => {
                    let names: Vec<_> = streams.iter().map(|s| s.as_str()).collect();
                    eprintln!(
                        "{} {} (ledger: {})",
                        "Watching".green(),
                        names.join(", ").cyan(),
                        result
                            .ledger_index
                            .map(|i| i.to_string())
                            .unwrap_or_else(|| "-".to_string())
                    );
                    eprintln!("{}", "Press Ctrl+C to stop...".dimmed());
                }
                Err(e) => {
                    eprintln!("{}: {}", "Error".red(), e);
                    std::process::exit(1);
                }
            }

            // Stream events until interrupted
            loop {
                tokio::select! {
                    event = events.recv() => {
                        match event {
                            Some(e) => println!("{}", serde_json::to_string(&e)?),
                            None => {
                                let end = remote.closed().await;
                                eprintln!("{}: {}", "Connection closed".red(), end);
                                break;
                            }
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        eprintln!("\n{}", "Stopping watch...".dimmed());
                        break;
                    }
                }
            }

            // Undelivered events would hold up the unsubscribe response.
            drop(events);
            if remote.is_connected() {
                let _ = remote.unsubscribe(&streams).await;
            }
            remote.close().await;
        }
        Some(cmd) => {
            let remote = connect(config).await?;

            match commands::execute(&remote, cmd).await {
                Ok(output) => {
                    println!("{}", output);
                }
                Err(e) => {
                    eprintln!("{}: {}", "Error".red(), e);
                    std::process::exit(1);
                }
            }

            remote.close().await;
        }
    }

    Ok(())
}

async fn connect(config: ConnectionConfig) -> Result<Remote, Box<dyn std::error::Error>> {
    tracing::debug!("Connecting to {}", config.endpoint);
    Remote::connect(config).await.map_err(|e| {
        eprintln!("{}: {}", "Connection failed".red(), e);
        e.into()
    })
}
