//! Error types for the peer link
//!
//! Transport failures are handled inside the component that owns the failing
//! resource and turned into link transitions. The types here only surface at
//! construction time or from a transport provider.

use thiserror::Error;

// ----------------------------------------------------------------------------
// Transport Errors
// ----------------------------------------------------------------------------

/// Errors reported by a transport provider
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Transport is not available: {transport_type}")]
    Unavailable { transport_type: String },

    #[error("Failed to listen on service {service}: {reason}")]
    ListenFailed { service: String, reason: String },

    #[error("Accept failed: {reason}")]
    AcceptFailed { reason: String },

    #[error("Connection failed to peer {peer}: {reason}")]
    ConnectionFailed { peer: String, reason: String },

    #[error("Transport resource closed")]
    Closed,

    #[error("Network I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ----------------------------------------------------------------------------
// Link Errors
// ----------------------------------------------------------------------------

/// Errors surfaced by the link manager API
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Invalid link configuration: {reason}")]
    InvalidConfiguration { reason: String },

    #[error("Link manager has shut down")]
    ManagerClosed,
}

pub type TransportResult<T> = Result<T, TransportError>;

pub type LinkResult<T> = Result<T, LinkError>;
