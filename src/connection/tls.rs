//! TLS configuration and support for secure connections to Postgres.
//!
//! Certificate verification is always strict: this crate has no knob to
//! accept an invalid certificate over an established TLS session. What
//! `enforce` controls (see [`crate::options::TlsOptions`]) is what happens
//! when the handshake itself fails, not what the handshake accepts.

use crate::{Error, Result};
use rustls::ClientConfig;
use rustls::RootCertStore;
use rustls_pemfile::Item;
use std::fs;
use std::sync::Arc;

/// TLS configuration for secure Postgres connections.
///
/// By default, server certificates are validated against system root
/// certificates. Supplying one or more `ca_certificates` paths replaces the
/// system roots with exactly those CAs.
///
/// # Examples
///
/// ```ignore
/// use pgsession_wire::connection::TlsConfig;
///
/// let tls = TlsConfig::builder().build()?;
///
/// let tls = TlsConfig::builder()
///     .ca_cert_path("/path/to/ca.pem")
///     .build()?;
/// ```
#[derive(Clone)]
pub struct TlsConfig {
    ca_cert_paths: Vec<String>,
    client_config: Arc<ClientConfig>,
}

impl TlsConfig {
    /// Create a new TLS configuration builder.
    pub fn builder() -> TlsConfigBuilder {
        TlsConfigBuilder::default()
    }

    /// Get the rustls ClientConfig for this TLS configuration.
    pub fn client_config(&self) -> Arc<ClientConfig> {
        self.client_config.clone()
    }
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig")
            .field("ca_cert_paths", &self.ca_cert_paths)
            .field("client_config", &"<ClientConfig>")
            .finish()
    }
}

/// Builder for TLS configuration.
#[derive(Default)]
pub struct TlsConfigBuilder {
    ca_cert_paths: Vec<String>,
}

impl TlsConfigBuilder {
    /// Add a custom CA certificate file (PEM format).
    ///
    /// If none are added, system root certificates are used instead.
    pub fn ca_cert_path(mut self, path: impl Into<String>) -> Self {
        self.ca_cert_paths.push(path.into());
        self
    }

    /// Build the TLS configuration.
    pub fn build(self) -> Result<TlsConfig> {
        let root_store = if self.ca_cert_paths.is_empty() {
            let result = rustls_native_certs::load_native_certs();

            let mut store = RootCertStore::empty();
            for cert in result.certs {
                let _ = store.add_parsable_certificates(std::iter::once(cert));
            }

            if !result.errors.is_empty() && store.is_empty() {
                return Err(Error::Config(
                    "failed to load any system root certificates".to_string(),
                ));
            }

            store
        } else {
            let mut store = RootCertStore::empty();
            for path in &self.ca_cert_paths {
                load_ca_into(path, &mut store)?;
            }
            store
        };

        let client_config = Arc::new(
            ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );

        Ok(TlsConfig {
            ca_cert_paths: self.ca_cert_paths,
            client_config,
        })
    }
}

/// Load a custom CA certificate file into a root store.
fn load_ca_into(ca_path: &str, root_store: &mut RootCertStore) -> Result<()> {
    let ca_cert_data = fs::read(ca_path)
        .map_err(|e| Error::Config(format!("failed to read CA certificate '{}': {}", ca_path, e)))?;

    let mut reader = std::io::Cursor::new(&ca_cert_data);
    let mut found_certs = 0;

    loop {
        match rustls_pemfile::read_one(&mut reader) {
            Ok(Some(Item::X509Certificate(cert))) => {
                let _ = root_store.add_parsable_certificates(std::iter::once(cert));
                found_certs += 1;
            }
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(_) => {
                return Err(Error::Config(format!(
                    "failed to parse CA certificate from '{}'",
                    ca_path
                )));
            }
        }
    }

    if found_certs == 0 {
        return Err(Error::Config(format!(
            "no valid certificates found in '{}'",
            ca_path
        )));
    }

    Ok(())
}

/// Parse a hostname for TLS Server Name Indication.
pub fn parse_server_name(hostname: &str) -> Result<String> {
    let hostname = hostname.trim_end_matches('.');

    if hostname.is_empty() || hostname.len() > 253 {
        return Err(Error::Config(format!(
            "invalid hostname for TLS: '{}'",
            hostname
        )));
    }

    if !hostname
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '.')
    {
        return Err(Error::Config(format!(
            "invalid hostname for TLS: '{}'",
            hostname
        )));
    }

    Ok(hostname.to_string())
}

/// Classify a TLS handshake failure as a certificate problem or something else
/// (network reset, protocol mismatch, non-Postgres peer on the port, ...).
///
/// Used to populate `Error::TlsHandshake { invalid_certificate, .. }` so the
/// Controller can decide whether falling back to plaintext is sensible.
pub fn is_certificate_error(err: &std::io::Error) -> bool {
    err.get_ref()
        .and_then(|inner| inner.downcast_ref::<rustls::Error>())
        .is_some_and(|rustls_err| matches!(rustls_err, rustls::Error::InvalidCertificate(_)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tls_config_builder_defaults() {
        let tls = TlsConfigBuilder::default();
        assert!(tls.ca_cert_paths.is_empty());
    }

    #[test]
    fn test_tls_config_builder_with_system_roots() {
        let tls = TlsConfig::builder().build().expect("build should succeed");
        assert!(tls.ca_cert_paths.is_empty());
    }

    #[test]
    fn test_tls_config_builder_with_missing_ca_file() {
        let result = TlsConfig::builder().ca_cert_path("/nonexistent/ca.pem").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_server_name_valid() {
        assert!(parse_server_name("localhost").is_ok());
        assert!(parse_server_name("example.com").is_ok());
        assert!(parse_server_name("db.internal.example.com").is_ok());
    }

    #[test]
    fn test_parse_server_name_trailing_dot() {
        assert!(parse_server_name("example.com.").is_ok());
    }

    #[test]
    fn test_parse_server_name_empty_fails() {
        assert!(parse_server_name("").is_err());
    }

    #[test]
    fn test_parse_server_name_too_long_fails() {
        let long = "a".repeat(300);
        assert!(parse_server_name(&long).is_err());
    }

    #[test]
    fn test_is_certificate_error_false_for_plain_io_error() {
        let err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(!is_certificate_error(&err));
    }

    #[test]
    fn test_tls_config_debug() {
        let tls = TlsConfig::builder().build().expect("build should succeed");
        let debug_str = format!("{:?}", tls);
        assert!(debug_str.contains("TlsConfig"));
    }
}
