//! Observability hooks
//!
//! Thin wrappers over the `metrics` crate's facade. Call sites in
//! `connection::handshake` and `client` record counts and durations without
//! depending on any particular metrics backend (Prometheus exporter, etc. is
//! the caller's choice to install).

/// Mechanism labels used across counters/histograms
pub mod labels {
    /// Cleartext password authentication
    pub const MECHANISM_CLEARTEXT: &str = "cleartext";
    /// MD5 password authentication
    pub const MECHANISM_MD5: &str = "md5";
    /// SCRAM-SHA-256 authentication
    pub const MECHANISM_SCRAM: &str = "scram-sha-256";
}

/// Monotonic counters
pub mod counters {
    use metrics::counter;

    /// A connection attempt was started (one per handshake retry loop iteration)
    pub fn connect_attempted() {
        counter!("pgsession_connect_attempted_total").increment(1);
    }

    /// A connection attempt succeeded
    pub fn connect_succeeded() {
        counter!("pgsession_connect_succeeded_total").increment(1);
    }

    /// A connection attempt failed and will be retried (or exhausted the budget)
    pub fn connect_failed(retryable: bool) {
        counter!("pgsession_connect_failed_total", "retryable" => retryable.to_string())
            .increment(1);
    }

    /// Authentication was attempted with the given mechanism
    pub fn auth_attempted(mechanism: &'static str) {
        counter!("pgsession_auth_attempted_total", "mechanism" => mechanism).increment(1);
    }

    /// Authentication succeeded with the given mechanism
    pub fn auth_successful(mechanism: &'static str) {
        counter!("pgsession_auth_successful_total", "mechanism" => mechanism).increment(1);
    }

    /// Authentication failed with the given mechanism
    pub fn auth_failed(mechanism: &'static str, reason: &'static str) {
        counter!("pgsession_auth_failed_total", "mechanism" => mechanism, "reason" => reason)
            .increment(1);
    }

    /// The session was lost mid-operation (EOF or FATAL termination)
    pub fn session_lost() {
        counter!("pgsession_session_lost_total").increment(1);
    }

    /// A reconnect was attempted after a mid-operation session loss
    pub fn reconnect_attempted() {
        counter!("pgsession_reconnect_attempted_total").increment(1);
    }
}

/// Duration histograms (milliseconds)
pub mod histograms {
    use metrics::histogram;

    /// Time spent in the authentication sub-protocol
    pub fn auth_duration(mechanism: &'static str, millis: u64) {
        histogram!("pgsession_auth_duration_ms", "mechanism" => mechanism).record(millis as f64);
    }

    /// Time spent in the full startup handshake (TLS negotiation through ReadyForQuery)
    pub fn handshake_duration(millis: u64) {
        histogram!("pgsession_handshake_duration_ms").record(millis as f64);
    }
}
