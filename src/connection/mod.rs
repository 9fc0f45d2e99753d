//! Connection management
//!
//! This module handles:
//! * Transport abstraction (TCP vs Unix socket)
//! * The startup handshake (TLS negotiation, authentication, up to ReadyForQuery)
//! * State machine enforcement
//! * TLS configuration

mod handshake;
mod state;
mod tls;
mod transport;

pub use handshake::Connection;
pub use state::ConnectionState;
pub use tls::{parse_server_name, TlsConfig, TlsConfigBuilder};
pub use transport::Transport;
