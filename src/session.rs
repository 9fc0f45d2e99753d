//! Observable session state
//!
//! A [`Session`] is a snapshot published by the Controller once the startup
//! handshake reaches `ReadyForQuery`. It is cheap to clone and carries no
//! transport handle, so callers can hold onto it (for logging, health
//! checks, metrics labels) without keeping the connection borrowed.

use std::collections::HashMap;

/// Transaction status reported in the last `ReadyForQuery` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Not in a transaction block
    Idle,
    /// Inside an open transaction block
    InTransaction,
    /// Inside a transaction block that has seen an error and will reject
    /// further commands until a ROLLBACK
    InFailedTransaction,
}

impl TransactionStatus {
    pub(crate) fn from_wire(status: u8) -> Option<Self> {
        use crate::protocol::constants::tx_status;
        match status {
            tx_status::IDLE => Some(Self::Idle),
            tx_status::IN_TRANSACTION => Some(Self::InTransaction),
            tx_status::FAILED => Some(Self::InFailedTransaction),
            _ => None,
        }
    }
}

/// A snapshot of an established Postgres session.
#[derive(Debug, Clone, Default)]
pub struct Session {
    /// Backend process ID, from BackendKeyData
    pub pid: Option<i32>,
    /// Backend secret key, from BackendKeyData (used for cancel requests)
    pub secret_key: Option<i32>,
    /// Whether the session is running over TLS
    pub tls: Option<bool>,
    /// Server parameters reported via ParameterStatus (server_version, client_encoding, ...)
    pub server_params: HashMap<String, String>,
    /// Transaction status reported in the last ReadyForQuery
    pub transaction_status: Option<TransactionStatus>,
}

impl Session {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}
