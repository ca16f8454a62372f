//! Command execution.

use crate::Commands;
use colored::Colorize;
use serde_json::Value;
use xrpl_remote_client::Remote;
use xrpl_remote_protocol::message::{SubmitCommand, SubmitResult, TxResult};
use xrpl_remote_protocol::Hash256;

/// Executes a command and returns the formatted output.
pub async fn execute(remote: &Remote, cmd: Commands) -> Result<String, Box<dyn std::error::Error>> {
    match cmd {
        // Handled directly in main.rs
        Commands::Repl | Commands::Watch { .. } => unreachable!(),

        Commands::Ping => {
            remote.ping().await?;
            Ok("PONG".green().to_string())
        }

        Commands::ServerInfo => {
            let info = remote.server_info().await?;
            Ok(format_json(&info.info))
        }

        Commands::Tx { hash } => {
            let hash: Hash256 = hash.parse()?;
            let result = remote.tx(hash).await?;
            Ok(format_tx(&result))
        }

        Commands::Submit { blob, fail_hard } => {
            let mut command = parse_blob_arg(&blob)?;
            if fail_hard {
                command = command.with_fail_hard();
            }
            let result = remote.request(command).await?;
            Ok(format_submit(&result))
        }

        Commands::Request { command, params } => {
            let params = match params {
                Some(arg) => parse_json_arg(&arg)?,
                None => Value::Null,
            };
            let result = remote.raw(&command, params).await?;
            Ok(format_json(&result))
        }
    }
}

/// Builds a submit command from hex, or from raw bytes when given `@file`.
pub fn parse_blob_arg(arg: &str) -> Result<SubmitCommand, Box<dyn std::error::Error>> {
    if let Some(path) = arg.strip_prefix('@') {
        let raw = std::fs::read(path)?;
        if raw.is_empty() {
            return Err(format!("{} is empty", path).into());
        }
        Ok(SubmitCommand::from_bytes(raw))
    } else {
        Ok(SubmitCommand::from_blob(arg)?)
    }
}

/// Parses a JSON argument (either inline JSON or @file.json).
pub fn parse_json_arg(arg: &str) -> Result<Value, Box<dyn std::error::Error>> {
    if let Some(path) = arg.strip_prefix('@') {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    } else {
        Ok(serde_json::from_str(arg)?)
    }
}

pub fn format_tx(result: &TxResult) -> String {
    let status = if result.validated {
        "validated".green()
    } else {
        "pending".yellow()
    };
    let mut output = format!(
        "{} {} ({})",
        result.transaction_type.as_deref().unwrap_or("Transaction").bold(),
        result.hash.to_string().cyan(),
        status
    );
    if let Some(account) = &result.account {
        output.push_str(&format!("\n  Account: {}", account));
    }
    if let Some(index) = result.ledger_index {
        output.push_str(&format!("\n  Ledger:  {}", index));
    }
    if let Some(outcome) = result.transaction_result() {
        output.push_str(&format!("\n  Result:  {}", color_engine_result(outcome)));
    }
    output
}

pub fn format_submit(result: &SubmitResult) -> String {
    format!(
        "{} ({}): {}",
        color_engine_result(&result.engine_result),
        result.engine_result_code,
        result.engine_result_message
    )
}

/// Colors a transaction engine result by its class prefix.
fn color_engine_result(code: &str) -> String {
    match code.get(..3) {
        Some("tes") => code.green().to_string(),
        Some("ter") | Some("tec") => code.yellow().to_string(),
        _ => code.red().to_string(),
    }
}

/// Formats JSON for display.
pub fn format_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
