//! Startup handshake: TLS negotiation, authentication, and the run up to
//! the first `ReadyForQuery`.

use super::state::ConnectionState;
use super::tls::TlsConfig;
use super::transport::Transport;
use crate::auth::{md5, ChannelBinding, ScramClient};
use crate::options::{ConnectionOptions, Endpoint};
use crate::protocol::{
    decode_message, encode_message, AuthenticationMessage, BackendMessage, FrontendMessage,
};
use crate::session::{Session, TransactionStatus};
use crate::{Error, Result};
use bytes::{Buf, BytesMut};
use tracing::Instrument;

/// A single Postgres wire connection, from raw transport up through the
/// authenticated, ReadyForQuery session.
pub struct Connection {
    transport: Option<Transport>,
    state: ConnectionState,
    read_buf: BytesMut,
}

impl Connection {
    fn new(transport: Transport) -> Self {
        Self {
            transport: Some(transport),
            state: ConnectionState::Initial,
            read_buf: BytesMut::with_capacity(8192),
        }
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Open a transport, negotiate TLS, run the startup handshake and
    /// authentication, and return the connection together with the
    /// published session snapshot.
    pub async fn establish(
        options: &ConnectionOptions,
        tls_config: Option<&TlsConfig>,
    ) -> Result<(Connection, Session)> {
        let transport = Self::open_transport(options).await?;
        let mut conn = Connection::new(transport);
        let tls_active = conn.negotiate_tls(options, tls_config).await?;
        let session = conn.run_startup(options, tls_active).await?;
        Ok((conn, session))
    }

    async fn open_transport(options: &ConnectionOptions) -> Result<Transport> {
        match &options.endpoint {
            Endpoint::Tcp { host, port } => Transport::connect_tcp(host, *port).await,
            Endpoint::Unix(path) => Transport::connect_unix(path).await,
        }
    }

    /// Negotiate TLS via the SSLRequest handshake. Returns whether TLS ended
    /// up active. On a failed upgrade that isn't a certificate problem and
    /// isn't `enforce`d, falls back to a freshly dialed plaintext connection:
    /// the half-completed TLS handshake cannot be trusted to resume in the clear.
    async fn negotiate_tls(
        &mut self,
        options: &ConnectionOptions,
        tls_config: Option<&TlsConfig>,
    ) -> Result<bool> {
        if !options.tls.enabled {
            return Ok(false);
        }

        let tls_config = tls_config
            .ok_or_else(|| Error::Config("TLS enabled but no TlsConfig was provided".into()))?;
        let hostname = options.tls_hostname().ok_or_else(|| {
            Error::Config("TLS negotiation requires a TCP endpoint with a hostname".into())
        })?;

        self.state.transition(ConnectionState::Negotiating)?;
        self.send_message(&FrontendMessage::SslRequest).await?;
        let response = self.read_ssl_response_byte().await?;

        match response {
            b'S' => {
                tracing::debug!("server accepted TLS, upgrading connection");
                let transport = self.transport.take().expect("transport present");
                match transport.upgrade_to_tls(tls_config, hostname).await {
                    Ok(upgraded) => {
                        self.transport = Some(upgraded);
                        tracing::info!("TLS connection established");
                        Ok(true)
                    }
                    Err(Error::TlsHandshake {
                        invalid_certificate,
                        source,
                    }) => {
                        if options.tls.enforce || invalid_certificate {
                            return Err(Error::TlsHandshake {
                                invalid_certificate,
                                source,
                            });
                        }
                        tracing::warn!(
                            error = %source,
                            "TLS handshake failed, falling back to plaintext"
                        );
                        self.transport = Some(Self::open_transport(options).await?);
                        self.read_buf.clear();
                        Ok(false)
                    }
                    Err(other) => Err(other),
                }
            }
            b'N' => {
                tracing::debug!("server rejected TLS");
                if options.tls.enforce {
                    return Err(Error::TlsAvailability(
                        "server rejected TLS negotiation".into(),
                    ));
                }
                Ok(false)
            }
            other => Err(Error::TlsAvailability(format!(
                "unexpected SSLRequest response byte: 0x{:02X}",
                other
            ))),
        }
    }

    async fn read_ssl_response_byte(&mut self) -> Result<u8> {
        while self.read_buf.is_empty() {
            let transport = self.transport.as_mut().expect("transport not available");
            let n = transport.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Err(Error::TlsAvailability(
                    "connection closed before SSLRequest response".into(),
                ));
            }
        }
        let response = self.read_buf[0];
        self.read_buf.advance(1);
        Ok(response)
    }

    async fn run_startup(&mut self, options: &ConnectionOptions, tls_active: bool) -> Result<Session> {
        async {
            self.state.transition(ConnectionState::Starting)?;

            let mut params = vec![
                ("user".to_string(), options.user.clone()),
                ("database".to_string(), options.database.clone()),
            ];
            if let Some(app_name) = &options.application_name {
                params.push(("application_name".to_string(), app_name.clone()));
            }
            for (k, v) in &options.runtime_params {
                params.push((k.clone(), v.clone()));
            }

            let startup = FrontendMessage::Startup {
                version: crate::protocol::constants::PROTOCOL_VERSION,
                params,
            };
            self.send_message(&startup).await?;

            let mut session = Session::new();
            session.tls = Some(tls_active);

            let handshake_start = std::time::Instant::now();

            loop {
                let msg = self.receive_message().await?;

                match msg {
                    BackendMessage::Authentication(auth) => {
                        self.handle_authentication(options, auth).await?;
                    }
                    BackendMessage::BackendKeyData {
                        process_id,
                        secret_key,
                    } => {
                        session.pid = Some(process_id);
                        session.secret_key = Some(secret_key);
                    }
                    BackendMessage::ParameterStatus { name, value } => {
                        session.server_params.insert(name, value);
                    }
                    BackendMessage::NegotiateProtocolVersion {
                        minor_version,
                        unrecognized_options,
                    } => {
                        tracing::warn!(
                            minor_version,
                            ?unrecognized_options,
                            "server negotiated down protocol options"
                        );
                    }
                    BackendMessage::NoticeResponse(notice) => {
                        tracing::debug!(%notice, "notice during startup");
                    }
                    BackendMessage::ReadyForQuery { status } => {
                        session.transaction_status = TransactionStatus::from_wire(status);
                        break;
                    }
                    BackendMessage::ErrorResponse(fields) => {
                        return Err(Error::from(fields));
                    }
                    other => {
                        return Err(Error::Protocol(format!(
                            "unexpected message during startup: {:?}",
                            other
                        )));
                    }
                }
            }

            self.state.transition(ConnectionState::Ready)?;
            crate::metrics::histograms::handshake_duration(
                handshake_start.elapsed().as_millis() as u64
            );
            tracing::info!("startup complete");
            Ok(session)
        }
        .instrument(tracing::info_span!(
            "startup",
            user = %options.user,
            database = %options.database
        ))
        .await
    }

    async fn handle_authentication(
        &mut self,
        options: &ConnectionOptions,
        auth: AuthenticationMessage,
    ) -> Result<()> {
        match auth {
            AuthenticationMessage::Ok => {
                self.state.transition(ConnectionState::WaitingReady)?;
                Ok(())
            }
            AuthenticationMessage::CleartextPassword => {
                self.enter_authenticating()?;
                let mechanism = crate::metrics::labels::MECHANISM_CLEARTEXT;
                crate::metrics::counters::auth_attempted(mechanism);
                let start = std::time::Instant::now();

                let password = options
                    .password
                    .as_ref()
                    .ok_or_else(|| Error::Authentication("password required".into()))?;
                self.send_message(&FrontendMessage::Password(password.clone()))
                    .await?;
                crate::metrics::counters::auth_successful(mechanism);
                crate::metrics::histograms::auth_duration(mechanism, start.elapsed().as_millis() as u64);
                Ok(())
            }
            AuthenticationMessage::Md5Password { salt } => {
                self.enter_authenticating()?;
                let mechanism = crate::metrics::labels::MECHANISM_MD5;
                crate::metrics::counters::auth_attempted(mechanism);
                let start = std::time::Instant::now();

                let password = options
                    .password
                    .as_ref()
                    .ok_or_else(|| Error::Authentication("password required".into()))?;
                let response = md5::encode(&options.user, password, salt);
                self.send_message(&FrontendMessage::Password(response))
                    .await?;
                crate::metrics::counters::auth_successful(mechanism);
                crate::metrics::histograms::auth_duration(mechanism, start.elapsed().as_millis() as u64);
                Ok(())
            }
            AuthenticationMessage::Sasl { mechanisms } => {
                self.enter_authenticating()?;
                let mechanism = crate::metrics::labels::MECHANISM_SCRAM;
                crate::metrics::counters::auth_attempted(mechanism);
                let start = std::time::Instant::now();
                match self.authenticate_scram(options, &mechanisms).await {
                    Ok(()) => {
                        crate::metrics::counters::auth_successful(mechanism);
                        crate::metrics::histograms::auth_duration(
                            mechanism,
                            start.elapsed().as_millis() as u64,
                        );
                        Ok(())
                    }
                    Err(e) => {
                        crate::metrics::counters::auth_failed(mechanism, "scram_failure");
                        Err(e)
                    }
                }
            }
            AuthenticationMessage::SaslContinue { .. } => Err(Error::Protocol(
                "unexpected SaslContinue outside of a SCRAM exchange".into(),
            )),
            AuthenticationMessage::SaslFinal { .. } => Err(Error::Protocol(
                "unexpected SaslFinal outside of a SCRAM exchange".into(),
            )),
            AuthenticationMessage::Unsupported { code } => {
                Err(Error::UnsupportedAuthenticationMethod(code))
            }
        }
    }

    fn enter_authenticating(&mut self) -> Result<()> {
        if self.state == ConnectionState::Starting {
            self.state.transition(ConnectionState::Authenticating)?;
        }
        Ok(())
    }

    /// Run the SCRAM-SHA-256 exchange: client-first, server-first, client-final, server-final.
    async fn authenticate_scram(
        &mut self,
        options: &ConnectionOptions,
        mechanisms: &[String],
    ) -> Result<()> {
        if !mechanisms.iter().any(|m| m == "SCRAM-SHA-256") {
            return Err(Error::Authentication(format!(
                "server does not support SCRAM-SHA-256 (offered: {})",
                mechanisms.join(", ")
            )));
        }

        let password = options
            .password
            .as_ref()
            .ok_or_else(|| Error::Authentication("password required for SCRAM authentication".into()))?;

        // Channel binding is not wired up: this crate does not currently offer
        // `tls-server-end-point` to the server even when the session is over TLS.
        let mut scram = ScramClient::with_channel_binding(password.clone(), ChannelBinding::None);

        let client_first = scram.client_first();
        self.send_message(&FrontendMessage::SaslInitialResponse {
            mechanism: "SCRAM-SHA-256".to_string(),
            data: client_first.into_bytes(),
        })
        .await?;

        let server_first_data = match self.receive_message().await? {
            BackendMessage::Authentication(AuthenticationMessage::SaslContinue { data }) => data,
            BackendMessage::ErrorResponse(fields) => return Err(Error::from(fields)),
            other => {
                return Err(Error::Protocol(format!(
                    "expected SaslContinue, got {:?}",
                    other
                )))
            }
        };
        let server_first = String::from_utf8(server_first_data)
            .map_err(|e| Error::Authentication(format!("invalid UTF-8 in server-first message: {}", e)))?;

        let (client_final, scram_state) = scram
            .client_final(&server_first)
            .map_err(|e| Error::Authentication(format!("SCRAM error: {}", e)))?;

        self.send_message(&FrontendMessage::SaslResponse {
            data: client_final.into_bytes(),
        })
        .await?;

        let server_final_data = match self.receive_message().await? {
            BackendMessage::Authentication(AuthenticationMessage::SaslFinal { data }) => data,
            BackendMessage::ErrorResponse(fields) => return Err(Error::from(fields)),
            other => {
                return Err(Error::Protocol(format!(
                    "expected SaslFinal, got {:?}",
                    other
                )))
            }
        };
        let server_final = String::from_utf8(server_final_data)
            .map_err(|e| Error::Authentication(format!("invalid UTF-8 in server-final message: {}", e)))?;

        scram
            .verify_server_final(&server_final, &scram_state)
            .map_err(|e| Error::Authentication(format!("SCRAM verification failed: {}", e)))?;

        Ok(())
    }

    async fn send_message(&mut self, msg: &FrontendMessage) -> Result<()> {
        let buf = encode_message(msg).map_err(|e| Error::Protocol(e.to_string()))?;
        let transport = self.transport.as_mut().expect("transport not available");
        transport.write_all(&buf).await?;
        transport.flush().await?;
        Ok(())
    }

    async fn receive_message(&mut self) -> Result<BackendMessage> {
        loop {
            match decode_message(&mut self.read_buf) {
                Ok((msg, consumed)) => {
                    self.read_buf.advance(consumed);
                    return Ok(msg);
                }
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    // Incomplete message: fall through to read more bytes.
                }
                Err(e) => return Err(Error::Protocol(e.to_string())),
            }

            let transport = self.transport.as_mut().expect("transport not available");
            let n = transport.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                // receive_message is only ever used during Starting/Authenticating/
                // WaitingReady, before a session is handed to the caller, so a closed
                // transport here is a handshake failure, not a mid-operation session
                // loss: retry-eligible rather than `ConnectionLost`.
                return Err(Error::TransportIo(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed mid-handshake",
                )));
            }
        }
    }

    /// Send Terminate and shut down the transport. Best-effort: errors from
    /// either step are ignored, since the caller is tearing the connection
    /// down regardless.
    pub async fn close(mut self) {
        let _ = self.send_message(&FrontendMessage::Terminate).await;
        if let Some(transport) = self.transport.as_mut() {
            let _ = transport.shutdown().await;
        }
        let _ = self.state.transition(ConnectionState::Closed);
    }
}
