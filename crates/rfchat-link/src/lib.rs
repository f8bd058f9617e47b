//! RfChat peer link
//!
//! Maintains a single duplex messaging session with one nearby peer over an
//! RFCOMM-style stream transport. A [`LinkManager`] listens passively, connects
//! actively on request, resolves the race between the two by letting the
//! first ready stream win, and returns to listening whenever the session is
//! lost. Received bytes are delivered to a [`LinkObserver`] as text.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod config;
pub mod discovery;
pub mod errors;
pub mod manager;
pub mod observer;
pub mod transport;
pub mod types;

mod initiator;
mod listener;
mod session;
mod worker;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use config::{LinkConfig, DEFAULT_READ_BUFFER_SIZE, DEFAULT_SERVICE_NAME, DEFAULT_SERVICE_UUID};
pub use discovery::{AutoConnectPolicy, AutoConnector};
pub use errors::{LinkError, LinkResult, TransportError, TransportResult};
pub use manager::{LinkManager, LinkManagerBuilder};
pub use observer::{CallbackObserver, ChannelObserver, LinkEvent, LinkObserver, NoopObserver};
pub use transport::{
    BoxedStream, LinkStream, MemoryNetwork, MemoryTransport, TcpTransport, Transport,
    TransportListener,
};
#[cfg(all(feature = "rfcomm", target_os = "linux"))]
pub use transport::RfcommTransport;
pub use types::{AttemptId, LinkState, PeerHandle, ServiceId};
