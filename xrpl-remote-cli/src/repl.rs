//! Interactive REPL.

use crate::commands::{format_json, format_submit, format_tx, parse_blob_arg};
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};
use serde_json::Value;
use xrpl_remote_client::{ConnectionConfig, Remote};
use xrpl_remote_protocol::{StreamCategory, StreamEvent};

const HELP_TEXT: &str = r#"
Available commands:
  help                            Show this help
  ping                            Ping the server
  info                            Get server info

  tx <hash>                       Look up a transaction
  submit <hex_blob>               Submit a signed transaction

  subscribe <stream>...           Follow ledger, transactions or server
  unsubscribe <stream>...         Stop following streams

  request <command> [params_json] Send any command

  quit, exit                      Exit the REPL
"#;

pub async fn run(config: ConnectionConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "xrpl-remote CLI".bold().cyan());
    println!("Connecting to {}...", config.endpoint);

    let remote = Remote::connect(config).await?;
    println!("{}", "Connected!".green());

    // Print stream events as they arrive
    if let Some(mut events) = remote.stream_events() {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                println!("{}", format_event(&event).dimmed());
            }
        });
    }

    // Create readline editor
    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .build();
    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(config)?;

    // Load history
    let history_path = std::env::var("HOME")
        .map(|h| std::path::PathBuf::from(h).join(".xrpl_remote_history"))
        .unwrap_or_else(|_| ".xrpl_remote_history".into());
    let _ = rl.load_history(&history_path);

    println!("Type 'help' for available commands.\n");

    loop {
        if !remote.is_connected() {
            println!("{}: {}", "Connection lost".red(), remote.closed().await);
            break;
        }

        let prompt = format!("{} ", "xrpl>".cyan());
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                match execute_repl_command(&remote, line).await {
                    Ok(Some(output)) => println!("{}\n", output),
                    Ok(None) => break, // Exit command
                    Err(e) => println!("{}: {}\n", "Error".red(), e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                println!("{}: {:?}", "Error".red(), err);
                break;
            }
        }
    }

    // Save history
    let _ = rl.save_history(&history_path);

    // Disconnect
    remote.close().await;
    println!("{}", "Disconnected.".dimmed());

    Ok(())
}

async fn execute_repl_command(
    remote: &Remote,
    line: &str,
) -> Result<Option<String>, Box<dyn std::error::Error>> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.is_empty() {
        return Ok(Some(String::new()));
    }

    let cmd = parts[0].to_lowercase();
    let args = &parts[1..];

    match cmd.as_str() {
        "help" | "?" => Ok(Some(HELP_TEXT.to_string())),

        "quit" | "exit" | "q" => Ok(None),

        "ping" => {
            remote.ping().await?;
            Ok(Some("PONG".green().to_string()))
        }

        "info" => {
            let info = remote.server_info().await?;
            Ok(Some(format_json(&info.info)))
        }

        "tx" => {
            if args.is_empty() {
                return Ok(Some("Usage: tx <hash>".to_string()));
            }
            let result = remote.tx(args[0].parse()?).await?;
            Ok(Some(format_tx(&result)))
        }

        "submit" => {
            if args.is_empty() {
                return Ok(Some("Usage: submit <hex_blob>".to_string()));
            }
            let result = remote.request(parse_blob_arg(args[0])?).await?;
            Ok(Some(format_submit(&result)))
        }

        "subscribe" | "sub" => {
            let streams = parse_streams(args)?;
            if streams.is_empty() {
                return Ok(Some("Usage: subscribe <stream>...".to_string()));
            }
            let result = remote.subscribe(&streams).await?;
            let mut output = format!("{} {}", "Subscribed".green(), join_streams(&streams).cyan());
            if let Some(index) = result.ledger_index {
                output.push_str(&format!(" (ledger: {})", index));
            }
            Ok(Some(output))
        }

        "unsubscribe" | "unsub" => {
            let streams = parse_streams(args)?;
            if streams.is_empty() {
                return Ok(Some("Usage: unsubscribe <stream>...".to_string()));
            }
            remote.unsubscribe(&streams).await?;
            Ok(Some(format!(
                "{} {}",
                "Unsubscribed".green(),
                join_streams(&streams).cyan()
            )))
        }

        "request" | "r" => {
            if args.is_empty() {
                return Ok(Some("Usage: request <command> [params_json]".to_string()));
            }
            let params: Value = if args.len() > 1 {
                serde_json::from_str(&args[1..].join(" "))?
            } else {
                Value::Null
            };
            let result = remote.raw(args[0], params).await?;
            Ok(Some(format_json(&result)))
        }

        _ => Ok(Some(format!(
            "Unknown command: {}. Type 'help' for help.",
            cmd
        ))),
    }
}

fn parse_streams(args: &[&str]) -> Result<Vec<StreamCategory>, Box<dyn std::error::Error>> {
    let mut streams = Vec::new();
    for arg in args.iter().flat_map(|a| a.split(',')) {
        if !arg.is_empty() {
            streams.push(arg.parse()?);
        }
    }
    Ok(streams)
}

fn join_streams(streams: &[StreamCategory]) -> String {
    streams
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_event(event: &StreamEvent) -> String {
    match event {
        StreamEvent::Ledger(ledger) => format!(
            "[ledger] #{} closed with {} tx",
            ledger.ledger_index, ledger.txn_count
        ),
        StreamEvent::Transaction(tx) => format!(
            "[transaction] {} {}",
            tx.hash().unwrap_or("?"),
            tx.engine_result
        ),
        StreamEvent::Server(status) => format!(
            "[server] {} (load {}/{})",
            status.server_status, status.load_factor, status.load_base
        ),
    }
}
