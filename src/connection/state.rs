//! Connection state machine

use crate::{Error, Result};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Initial state (not connected)
    Initial,

    /// TLS negotiation in progress (SSLRequest sent, awaiting S/N response)
    Negotiating,

    /// StartupMessage sent, awaiting the server's first reply
    Starting,

    /// Authentication sub-protocol in progress (cleartext/MD5/SCRAM exchange)
    Authenticating,

    /// Authenticated, draining ParameterStatus/BackendKeyData up to ReadyForQuery
    WaitingReady,

    /// Session established and idle
    Ready,

    /// Closed
    Closed,
}

impl ConnectionState {
    /// Check if transition is valid
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        matches!(
            (self, next),
            (Initial, Negotiating)
                | (Initial, Starting)
                | (Negotiating, Starting)
                | (Starting, Authenticating)
                | (Starting, WaitingReady)
                | (Authenticating, WaitingReady)
                | (WaitingReady, Ready)
                | (_, Closed)
        )
    }

    /// Transition to new state
    pub fn transition(&mut self, next: ConnectionState) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(Error::Protocol(format!(
                "invalid state transition from {:?} to {:?}",
                self, next
            )));
        }
        *self = next;
        Ok(())
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initial => write!(f, "initial"),
            Self::Negotiating => write!(f, "negotiating"),
            Self::Starting => write!(f, "starting"),
            Self::Authenticating => write!(f, "authenticating"),
            Self::WaitingReady => write!(f, "waiting_ready"),
            Self::Ready => write!(f, "ready"),
            Self::Closed => write!(f, "closed"),
        }
    }
}
