//! Connection controller
//!
//! Owns the retry policy around the startup handshake and the one-shot
//! reconnect hook for a session lost mid-operation. This is the type
//! application code constructs and holds onto.

use crate::connection::{Connection, TlsConfig};
use crate::options::ConnectionOptions;
use crate::session::Session;
use crate::{Error, Result};

/// A controlled connection to a Postgres server.
///
/// `Client::new` performs no I/O; call [`Client::connect`] to dial the
/// server and run the startup handshake, with the configured retry policy.
pub struct Client {
    options: ConnectionOptions,
    tls_config: Option<TlsConfig>,
    connection: Option<Connection>,
    session: Session,
    connected: bool,
}

impl Client {
    /// Build a client from its options. Performs no I/O.
    pub fn new(options: ConnectionOptions) -> Result<Self> {
        let tls_config = if options.tls.enabled {
            let mut builder = TlsConfig::builder();
            for path in &options.tls.ca_certificates {
                builder = builder.ca_cert_path(path.clone());
            }
            Some(builder.build()?)
        } else {
            None
        };

        Ok(Self {
            options,
            tls_config,
            connection: None,
            session: Session::new(),
            connected: false,
        })
    }

    /// Whether the client currently holds a live session.
    pub fn connected(&self) -> bool {
        self.connected
    }

    /// The last published session snapshot. Stale (but not cleared) once
    /// [`Client::on_disconnected_mid_operation`] marks the session lost,
    /// until a reconnect succeeds and republishes it.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Dial the server and run the startup handshake.
    ///
    /// Retries up to `options.connection.attempts` times (a value of `0`
    /// behaves like `1`: exactly one try, no retries), but only on errors
    /// [`Error::is_retry_eligible`] marks as transient (transport-open,
    /// transport-io, TLS-availability). Authentication, protocol, and
    /// certificate-validity failures fail immediately without consuming the
    /// rest of the retry budget.
    pub async fn connect(&mut self) -> Result<()> {
        let attempts = self.options.connection.attempts.max(1);
        let mut last_err = None;

        for attempt in 1..=attempts {
            crate::metrics::counters::connect_attempted();

            match Connection::establish(&self.options, self.tls_config.as_ref()).await {
                Ok((connection, session)) => {
                    crate::metrics::counters::connect_succeeded();
                    self.connection = Some(connection);
                    self.session = session;
                    self.connected = true;
                    return Ok(());
                }
                Err(e) => {
                    let retryable = e.is_retry_eligible();
                    crate::metrics::counters::connect_failed(retryable);
                    tracing::warn!(attempt, attempts, error = %e, retryable, "connection attempt failed");

                    if !retryable || attempt == attempts {
                        last_err = Some(e);
                        break;
                    }
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.expect("loop always sets last_err before exiting without returning Ok"))
    }

    /// Terminate the session and close the transport.
    ///
    /// Idempotent: calling this on an already-disconnected client is a no-op.
    /// Best-effort: failures sending Terminate or shutting down the transport
    /// are swallowed, since the caller is closing regardless.
    pub async fn end(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close().await;
        }
        self.connected = false;
        self.session = Session::new();
    }

    /// Called when the running session is found to have been lost
    /// mid-operation (EOF on read, or a FATAL `57P01` admin-termination
    /// error). Marks the client disconnected and, if the retry budget
    /// allows it, attempts exactly one reconnect.
    ///
    /// Returns `Ok(())` if a reconnect succeeded (the session is republished),
    /// or the original-shaped error otherwise: [`Error::ClientDisconnected`]
    /// if no retry budget remains, or the reconnect's own error if the retry
    /// itself failed.
    pub async fn on_disconnected_mid_operation(&mut self) -> Result<()> {
        crate::metrics::counters::session_lost();
        self.connected = false;
        self.connection = None;
        self.session = Session::new();

        if self.options.connection.attempts < 1 {
            return Err(Error::ClientDisconnected);
        }

        crate::metrics::counters::reconnect_attempted();
        match Connection::establish(&self.options, self.tls_config.as_ref()).await {
            Ok((connection, session)) => {
                self.connection = Some(connection);
                self.session = session;
                self.connected = true;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ConnectionOptions;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn write_message(buf: &mut Vec<u8>, tag: u8, body: &[u8]) {
        buf.push(tag);
        buf.extend_from_slice(&((body.len() + 4) as i32).to_be_bytes());
        buf.extend_from_slice(body);
    }

    async fn trust_backend(listener: TcpListener) {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut discard = vec![0u8; 4096];
        let _ = socket.read(&mut discard).await.unwrap();

        let mut response = Vec::new();
        write_message(&mut response, b'R', &0i32.to_be_bytes());
        write_message(&mut response, b'Z', b"I");
        socket.write_all(&response).await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_succeeds_first_try() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(trust_backend(listener));

        let options = ConnectionOptions::new(addr.ip().to_string(), addr.port(), "alice", "mydb");
        let mut client = Client::new(options).unwrap();
        client.connect().await.unwrap();

        assert!(client.connected());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_retries_on_transport_open_failure() {
        // Port 0 connect then immediately closed listener simulates a dead port:
        // bind, grab the address, drop the listener so nothing is listening.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let options = ConnectionOptions::new(addr.ip().to_string(), addr.port(), "alice", "mydb")
            .attempts(3);
        let mut client = Client::new(options).unwrap();
        let result = client.connect().await;

        assert!(matches!(result, Err(Error::TransportOpen(_))));
        assert!(!client.connected());
    }

    #[tokio::test]
    async fn test_attempts_zero_behaves_as_one() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let options = ConnectionOptions::new(addr.ip().to_string(), addr.port(), "alice", "mydb")
            .attempts(0);
        let mut client = Client::new(options).unwrap();
        let result = client.connect().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_end_is_idempotent() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(trust_backend(listener));

        let options = ConnectionOptions::new(addr.ip().to_string(), addr.port(), "alice", "mydb");
        let mut client = Client::new(options).unwrap();
        client.connect().await.unwrap();
        server.await.unwrap();

        client.end().await;
        assert!(!client.connected());
        client.end().await;
        assert!(!client.connected());
    }

    #[tokio::test]
    async fn test_on_disconnected_mid_operation_without_retry_budget() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(trust_backend(listener));

        let options = ConnectionOptions::new(addr.ip().to_string(), addr.port(), "alice", "mydb")
            .attempts(0);
        let mut client = Client::new(options).unwrap();
        client.connect().await.unwrap();
        server.await.unwrap();

        let result = client.on_disconnected_mid_operation().await;
        assert!(matches!(result, Err(Error::ClientDisconnected)));
        assert!(!client.connected());
    }

    #[tokio::test]
    async fn test_on_disconnected_mid_operation_reconnects() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            trust_backend_twice(listener).await;
        });

        let options = ConnectionOptions::new(addr.ip().to_string(), addr.port(), "alice", "mydb")
            .attempts(1);
        let mut client = Client::new(options).unwrap();
        client.connect().await.unwrap();

        client.on_disconnected_mid_operation().await.unwrap();
        assert!(client.connected());

        server.await.unwrap();
    }

    async fn trust_backend_twice(listener: TcpListener) {
        for _ in 0..2 {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut discard = vec![0u8; 4096];
            let _ = socket.read(&mut discard).await.unwrap();

            let mut response = Vec::new();
            write_message(&mut response, b'R', &0i32.to_be_bytes());
            write_message(&mut response, b'Z', b"I");
            socket.write_all(&response).await.unwrap();
        }
    }
}
