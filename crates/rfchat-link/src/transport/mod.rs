//! Transport provider abstraction
//!
//! A transport exposes the three blocking primitives the link is built on:
//! listening for inbound peers, accepting the next one, and connecting out.
//! Closing a listener or stream is done by dropping it, which is also how the
//! link cancels an in-flight accept, connect, or read.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::errors::TransportResult;
use crate::types::{PeerHandle, ServiceId};

pub mod memory;
#[cfg(all(feature = "rfcomm", target_os = "linux"))]
pub mod rfcomm;
pub mod tcp;

pub use memory::{MemoryNetwork, MemoryTransport};
#[cfg(all(feature = "rfcomm", target_os = "linux"))]
pub use rfcomm::RfcommTransport;
pub use tcp::TcpTransport;

// ----------------------------------------------------------------------------
// Stream Types
// ----------------------------------------------------------------------------

/// Duplex byte stream carried by a session
pub trait LinkStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> LinkStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Owned, type-erased link stream
pub type BoxedStream = Box<dyn LinkStream>;

// ----------------------------------------------------------------------------
// Transport Traits
// ----------------------------------------------------------------------------

/// Open listening resource
#[async_trait]
pub trait TransportListener: Send {
    /// Wait for the next inbound connection
    async fn accept(&mut self) -> TransportResult<(BoxedStream, PeerHandle)>;
}

/// Capability to listen for and open peer connections
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Open a listening resource registered under `service`
    async fn listen(&self, service: &ServiceId) -> TransportResult<Box<dyn TransportListener>>;

    /// Open an outbound stream to `peer`
    async fn connect(&self, peer: &PeerHandle, service: &ServiceId) -> TransportResult<BoxedStream>;

    /// Pause any running peer discovery before a connect
    async fn pause_discovery(&self) {}

    /// Resume peer discovery paused by [`Transport::pause_discovery`]
    async fn resume_discovery(&self) {}
}
