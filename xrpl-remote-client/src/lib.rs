//! # xrpl-remote-client
//!
//! Client library for rippled's WebSocket API.
//!
//! This crate provides:
//! - A single persistent session per [`Remote`], shared by concurrent callers
//! - Request/response correlation by numeric identifier
//! - Stream events (ledger, transactions, server) on a separate queue
//! - Ping/pong keepalive with a liveness deadline
//!
//! ```no_run
//! use xrpl_remote_client::{ConnectionConfig, Remote};
//! use xrpl_remote_protocol::StreamCategory;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let remote = Remote::connect(ConnectionConfig::new("ws://127.0.0.1:6006")).await?;
//! let mut events = remote.stream_events().expect("first call");
//! remote.subscribe(&[StreamCategory::Ledger]).await?;
//! while let Some(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
mod dispatch;
pub mod error;
mod pump;
pub mod remote;

pub use config::{Config, ConfigError};
pub use connection::{Connection, ConnectionConfig};
pub use error::{ClientError, ConnectError, SessionEnd};
pub use remote::Remote;
