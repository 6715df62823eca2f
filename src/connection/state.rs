//! Connection lifecycle state machine

use crate::{Error, Result};

/// Connection lifecycle state
///
/// Establishment walks Initial → Connecting → Handshaking → Established;
/// teardown reaches Closed from anywhere. Peer half-close and sticky errors
/// are per-connection flags, not lifecycle states: an established connection
/// stays established until it is consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Initial state (nothing allocated)
    Initial,

    /// Transport connect in progress
    Connecting,

    /// TLS handshake in progress (session bound to the transport)
    Handshaking,

    /// Established (application data may flow)
    Established,

    /// Closed
    Closed,
}

impl ConnectionState {
    /// Check if transition is valid
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        matches!(
            (self, next),
            (Initial, Connecting)
                | (Connecting, Handshaking)
                | (Handshaking, Established)
                | (_, Closed)
        )
    }

    /// Transition to new state
    pub fn transition(&mut self, next: ConnectionState) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(Error::InvalidState {
                expected: format!("valid transition from {:?}", self),
                actual: format!("{:?}", next),
            });
        }
        *self = next;
        Ok(())
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initial => write!(f, "initial"),
            Self::Connecting => write!(f, "connecting"),
            Self::Handshaking => write!(f, "handshaking"),
            Self::Established => write!(f, "established"),
            Self::Closed => write!(f, "closed"),
        }
    }
}
