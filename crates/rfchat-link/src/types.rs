//! Core value types shared by the link components

use core::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Peer Identity
// ----------------------------------------------------------------------------

/// Opaque identifier and display name of a remote endpoint
///
/// Handles are produced by the transport layer when a connection is accepted
/// or initiated, and never change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerHandle {
    address: String,
    display_name: String,
}

impl PeerHandle {
    /// Create a new peer handle
    pub fn new(address: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            display_name: display_name.into(),
        }
    }

    /// Create a handle whose display name is its address
    pub fn from_address(address: impl Into<String>) -> Self {
        let address = address.into();
        Self {
            display_name: address.clone(),
            address,
        }
    }

    /// Transport-level address of the peer
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Human-readable name of the peer
    pub fn display_name(&self) -> &str {
        &self.display_name
    }
}

impl fmt::Display for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.display_name == self.address {
            write!(f, "{}", self.address)
        } else {
            write!(f, "{} ({})", self.display_name, self.address)
        }
    }
}

// ----------------------------------------------------------------------------
// Service Identity
// ----------------------------------------------------------------------------

/// Well-known service record peers listen and connect on
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceId {
    pub name: String,
    pub uuid: Uuid,
}

impl ServiceId {
    pub fn new(name: impl Into<String>, uuid: Uuid) -> Self {
        Self {
            name: name.into(),
            uuid,
        }
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.name, self.uuid)
    }
}

// ----------------------------------------------------------------------------
// Link State
// ----------------------------------------------------------------------------

/// Lifecycle state of the link manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LinkState {
    #[default]
    Idle,
    Listening,
    Connecting,
    Connected,
}

impl LinkState {
    pub fn is_connected(&self) -> bool {
        *self == LinkState::Connected
    }

    /// Whether a freshly opened stream may still be promoted to the session
    pub fn accepts_handoff(&self) -> bool {
        matches!(self, LinkState::Listening | LinkState::Connecting)
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkState::Idle => "idle",
            LinkState::Listening => "listening",
            LinkState::Connecting => "connecting",
            LinkState::Connected => "connected",
        };
        f.write_str(name)
    }
}

// ----------------------------------------------------------------------------
// Attempt Identity
// ----------------------------------------------------------------------------

/// Identifies one spawned listener, initiator, or session
///
/// Reports carrying an id that no longer matches the current worker for its
/// role are stale and get discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttemptId(u64);

impl AttemptId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_handle_display() {
        let named = PeerHandle::new("00:11:22:33:44:55", "Rescue Team");
        assert_eq!(named.to_string(), "Rescue Team (00:11:22:33:44:55)");

        let bare = PeerHandle::from_address("127.0.0.1:7001");
        assert_eq!(bare.display_name(), "127.0.0.1:7001");
        assert_eq!(bare.to_string(), "127.0.0.1:7001");
    }

    #[test]
    fn test_handoff_states() {
        assert!(LinkState::Listening.accepts_handoff());
        assert!(LinkState::Connecting.accepts_handoff());
        assert!(!LinkState::Idle.accepts_handoff());
        assert!(!LinkState::Connected.accepts_handoff());
        assert_eq!(LinkState::default(), LinkState::Idle);
    }
}
