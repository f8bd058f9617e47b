//! Bluetooth RFCOMM transport using bluer (BlueZ)
//!
//! Peers listen on a fixed RFCOMM channel taken from the link configuration.
//! Service discovery records are not registered; both sides must agree on the
//! channel number.
//!
//! Device discovery is optional: [`RfcommTransport::start_discovery`] opens a
//! BlueZ discovery session and feeds found devices to the caller. The session
//! is dropped while a connect is in flight and reopened if the connect fails.

use async_trait::async_trait;
use bluer::rfcomm::{Listener, SocketAddr, Stream};
use bluer::{Adapter, AdapterEvent, Address, Session};
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{BoxedStream, Transport, TransportListener};
use crate::errors::{TransportError, TransportResult};
use crate::types::{PeerHandle, ServiceId};

// ----------------------------------------------------------------------------
// Linux Implementation
// ----------------------------------------------------------------------------

/// RFCOMM transport bound to the default BlueZ adapter
pub struct RfcommTransport {
    _session: Session,
    adapter: Adapter,
    channel: u8,
    discovery: Mutex<DiscoveryState>,
}

#[derive(Default)]
struct DiscoveryState {
    found: Option<mpsc::UnboundedSender<PeerHandle>>,
    scan: Option<DiscoveryScan>,
}

/// Running BlueZ discovery session
struct DiscoveryScan {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl DiscoveryScan {
    async fn stop(self) {
        let _ = self.shutdown.send(());
        let _ = self.handle.await;
    }
}

impl RfcommTransport {
    /// Open the default adapter, powering it on if needed
    ///
    /// Fails with [`TransportError::Unavailable`] when the host has no
    /// Bluetooth support, in which case no link manager should be built.
    pub async fn new(channel: u8) -> TransportResult<Self> {
        let session = Session::new()
            .await
            .map_err(|e| TransportError::Unavailable {
                transport_type: format!("BlueZ session: {}", e),
            })?;

        let adapter = session
            .default_adapter()
            .await
            .map_err(|e| TransportError::Unavailable {
                transport_type: format!("Bluetooth adapter: {}", e),
            })?;

        if !adapter.is_powered().await.unwrap_or(false) {
            adapter
                .set_powered(true)
                .await
                .map_err(|e| TransportError::Unavailable {
                    transport_type: format!("Failed to power on adapter: {}", e),
                })?;
        }

        info!("Bluetooth adapter {} ready for RFCOMM", adapter.name());
        Ok(Self {
            _session: session,
            adapter,
            channel,
            discovery: Mutex::new(DiscoveryState::default()),
        })
    }

    /// Start scanning for nearby devices
    ///
    /// Every device BlueZ reports is sent on the returned channel. Scanning
    /// stops for good once the receiver is dropped.
    pub async fn start_discovery(&self) -> TransportResult<mpsc::UnboundedReceiver<PeerHandle>> {
        let (found, feed) = mpsc::unbounded_channel();
        let mut state = self.discovery.lock().await;
        if let Some(scan) = state.scan.take() {
            scan.stop().await;
        }
        state.scan = Some(self.open_scan(found.clone()).await?);
        state.found = Some(found);
        info!("Scanning for devices on {}", self.adapter.name());
        Ok(feed)
    }

    /// Whether a discovery session is currently open
    pub async fn is_discovering(&self) -> bool {
        self.discovery.lock().await.scan.is_some()
    }

    async fn open_scan(
        &self,
        found: mpsc::UnboundedSender<PeerHandle>,
    ) -> TransportResult<DiscoveryScan> {
        let events = self
            .adapter
            .discover_devices()
            .await
            .map_err(|e| TransportError::Unavailable {
                transport_type: format!("Bluetooth discovery: {}", e),
            })?;
        let adapter = self.adapter.clone();
        let (shutdown, mut shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            tokio::pin!(events);
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    event = events.next() => match event {
                        Some(AdapterEvent::DeviceAdded(address)) => {
                            let peer = describe_peer(&adapter, address).await;
                            debug!("Discovered {}", peer);
                            if found.send(peer).is_err() {
                                break;
                            }
                        }
                        Some(_) => {}
                        None => break,
                    },
                }
            }
            // Dropping the event stream ends the BlueZ discovery session
            debug!("Discovery scan closed");
        });

        Ok(DiscoveryScan { shutdown, handle })
    }
}

#[async_trait]
impl Transport for RfcommTransport {
    fn name(&self) -> &str {
        "rfcomm"
    }

    async fn listen(&self, service: &ServiceId) -> TransportResult<Box<dyn TransportListener>> {
        let local = SocketAddr::new(Address::any(), self.channel);
        let listener = Listener::bind(local)
            .await
            .map_err(|e| TransportError::ListenFailed {
                service: service.to_string(),
                reason: e.to_string(),
            })?;
        info!("Listening for {} on RFCOMM channel {}", service.name, self.channel);

        Ok(Box::new(RfcommListener {
            listener,
            adapter: self.adapter.clone(),
        }))
    }

    async fn connect(&self, peer: &PeerHandle, service: &ServiceId) -> TransportResult<BoxedStream> {
        let address: Address = peer
            .address()
            .parse()
            .map_err(|_| TransportError::ConnectionFailed {
                peer: peer.to_string(),
                reason: "not a Bluetooth address".to_string(),
            })?;

        debug!(
            "Opening RFCOMM channel {} to {} for {}",
            self.channel, address, service.name
        );
        let stream = Stream::connect(SocketAddr::new(address, self.channel))
            .await
            .map_err(|e| TransportError::ConnectionFailed {
                peer: peer.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Box::new(stream))
    }

    async fn pause_discovery(&self) {
        let mut state = self.discovery.lock().await;
        if let Some(scan) = state.scan.take() {
            scan.stop().await;
            info!("Discovery paused for outbound connect");
        }
    }

    async fn resume_discovery(&self) {
        let mut state = self.discovery.lock().await;
        if state.scan.is_some() {
            return;
        }
        let Some(found) = state.found.clone() else {
            return;
        };
        if found.is_closed() {
            state.found = None;
            return;
        }
        match self.open_scan(found).await {
            Ok(scan) => {
                state.scan = Some(scan);
                info!("Discovery resumed");
            }
            Err(e) => warn!("Could not resume discovery: {}", e),
        }
    }
}

struct RfcommListener {
    listener: Listener,
    adapter: Adapter,
}

#[async_trait]
impl TransportListener for RfcommListener {
    async fn accept(&mut self) -> TransportResult<(BoxedStream, PeerHandle)> {
        let (stream, remote) = self
            .listener
            .accept()
            .await
            .map_err(|e| TransportError::AcceptFailed {
                reason: e.to_string(),
            })?;

        let peer = describe_peer(&self.adapter, remote.addr).await;
        Ok((Box::new(stream), peer))
    }
}

/// Peer handle carrying the remote device name when BlueZ knows it
async fn describe_peer(adapter: &Adapter, address: Address) -> PeerHandle {
    let name = match adapter.device(address) {
        Ok(device) => device.name().await.ok().flatten(),
        Err(_) => None,
    };
    match name {
        Some(name) => PeerHandle::new(address.to_string(), name),
        None => PeerHandle::from_address(address.to_string()),
    }
}
