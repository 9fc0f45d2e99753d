//! Connection options
//!
//! Everything needed to dial a server and complete the startup handshake.
//! Constructing a [`ConnectionOptions`] performs no I/O.

use std::collections::HashMap;
use std::time::Duration;

/// Where to reach the server.
#[derive(Debug, Clone)]
pub enum Endpoint {
    /// TCP host and port
    Tcp { host: String, port: u16 },
    /// Unix domain socket path
    Unix(std::path::PathBuf),
}

/// TLS negotiation settings.
#[derive(Debug, Clone, Default)]
pub struct TlsOptions {
    /// Attempt TLS negotiation at all
    pub enabled: bool,
    /// Treat a failed TLS handshake (rejected by server, or handshake error
    /// other than an invalid certificate) as fatal instead of falling back
    /// to a plaintext connection
    pub enforce: bool,
    /// Custom CA certificate files (PEM). Empty means use system roots.
    pub ca_certificates: Vec<String>,
}

/// How many times the Controller's handshake retry loop will try to connect.
#[derive(Debug, Clone, Copy)]
pub struct RetryOptions {
    /// Total handshake attempts. `0` is treated as `1` (one try, no retries).
    pub attempts: u32,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self { attempts: 1 }
    }
}

/// Full set of parameters needed to open a session with a Postgres server.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// Where to dial
    pub endpoint: Endpoint,
    /// Startup username
    pub user: String,
    /// Database to connect to
    pub database: String,
    /// Password, if the server ends up requesting one
    pub password: Option<String>,
    /// `application_name` startup parameter
    pub application_name: Option<String>,
    /// TLS negotiation settings
    pub tls: TlsOptions,
    /// Handshake retry policy
    pub connection: RetryOptions,
    /// Additional startup parameters sent verbatim
    pub runtime_params: HashMap<String, String>,
    /// Timeout for opening the underlying transport. `None` means no timeout.
    pub connect_timeout: Option<Duration>,
}

impl ConnectionOptions {
    /// Create options for a TCP endpoint with TLS disabled and default retry policy.
    pub fn new(host: impl Into<String>, port: u16, user: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            endpoint: Endpoint::Tcp {
                host: host.into(),
                port,
            },
            user: user.into(),
            database: database.into(),
            password: None,
            application_name: None,
            tls: TlsOptions::default(),
            connection: RetryOptions::default(),
            runtime_params: HashMap::new(),
            connect_timeout: None,
        }
    }

    /// Set the password used if the server requests cleartext, MD5, or SCRAM authentication.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the `application_name` startup parameter.
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    /// Configure TLS negotiation.
    pub fn tls(mut self, tls: TlsOptions) -> Self {
        self.tls = tls;
        self
    }

    /// Configure the handshake retry budget.
    pub fn attempts(mut self, attempts: u32) -> Self {
        self.connection.attempts = attempts;
        self
    }

    /// Set the transport connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Add a startup parameter sent verbatim in the StartupMessage.
    pub fn runtime_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.runtime_params.insert(key.into(), value.into());
        self
    }

    /// Hostname used for TLS SNI and certificate verification, if this is a TCP endpoint.
    pub fn tls_hostname(&self) -> Option<&str> {
        match &self.endpoint {
            Endpoint::Tcp { host, .. } => Some(host.as_str()),
            Endpoint::Unix(_) => None,
        }
    }
}
