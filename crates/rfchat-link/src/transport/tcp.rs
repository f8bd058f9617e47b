//! TCP stand-in for the RFCOMM channel
//!
//! Useful on machines without a Bluetooth adapter: peers are addressed as
//! `host:port` and the service identity is only used for logging.

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use super::{BoxedStream, Transport, TransportListener};
use crate::errors::{TransportError, TransportResult};
use crate::types::{PeerHandle, ServiceId};

/// Transport that listens on a fixed local socket address
#[derive(Debug, Clone)]
pub struct TcpTransport {
    bind_addr: SocketAddr,
}

impl TcpTransport {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self { bind_addr }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn name(&self) -> &str {
        "tcp"
    }

    async fn listen(&self, service: &ServiceId) -> TransportResult<Box<dyn TransportListener>> {
        let listener = TcpListener::bind(self.bind_addr)
            .await
            .map_err(|e| TransportError::ListenFailed {
                service: service.to_string(),
                reason: e.to_string(),
            })?;
        info!("Listening for {} on {}", service.name, self.bind_addr);
        Ok(Box::new(TcpServiceListener { listener }))
    }

    async fn connect(&self, peer: &PeerHandle, service: &ServiceId) -> TransportResult<BoxedStream> {
        let addr: SocketAddr = peer
            .address()
            .parse()
            .map_err(|_| TransportError::ConnectionFailed {
                peer: peer.to_string(),
                reason: "address is not host:port".to_string(),
            })?;

        debug!("Connecting to {} for {}", addr, service.name);
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| TransportError::ConnectionFailed {
                peer: peer.to_string(),
                reason: e.to_string(),
            })?;
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }
}

struct TcpServiceListener {
    listener: TcpListener,
}

#[async_trait]
impl TransportListener for TcpServiceListener {
    async fn accept(&mut self) -> TransportResult<(BoxedStream, PeerHandle)> {
        let (stream, remote) = self
            .listener
            .accept()
            .await
            .map_err(|e| TransportError::AcceptFailed {
                reason: e.to_string(),
            })?;
        stream.set_nodelay(true)?;
        Ok((Box::new(stream), PeerHandle::from_address(remote.to_string())))
    }
}
