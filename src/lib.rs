//! A PostgreSQL client connection: TLS negotiation, authentication, and
//! session lifecycle management.
//!
//! This crate speaks the Postgres frontend/backend wire protocol (version 3)
//! far enough to get a connection from a bare TCP or Unix socket to
//! `ReadyForQuery`: optional TLS upgrade via `SSLRequest`, cleartext/MD5/
//! SCRAM-SHA-256 authentication, and the startup parameter exchange. It does
//! not execute queries or decode result rows; see the crate's Non-goals.
//!
//! ```ignore
//! use pgsession_wire::{Client, ConnectionOptions};
//!
//! # async fn example() -> pgsession_wire::Result<()> {
//! let options = ConnectionOptions::new("localhost", 5432, "alice", "mydb")
//!     .password("hunter2");
//! let mut client = Client::new(options)?;
//! client.connect().await?;
//! assert!(client.connected());
//! client.end().await;
//! # Ok(())
//! # }
//! ```

pub mod auth;
mod client;
pub mod connection;
mod error;
pub mod metrics;
mod options;
pub mod protocol;
mod session;

pub use client::Client;
pub use error::{Error, Result};
pub use options::{ConnectionOptions, Endpoint, RetryOptions, TlsOptions};
pub use session::{Session, TransactionStatus};
