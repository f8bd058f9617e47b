//! In-process transport over `tokio::io::duplex`
//!
//! A [`MemoryNetwork`] plays the role of the radio: every node gets a
//! [`MemoryTransport`] bound to its own address, listeners register under
//! (address, service uuid), and connects are paired with the matching
//! listener. Each transport counts the listeners and streams it currently
//! owns so tests can check resource ownership.

use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use super::{BoxedStream, Transport, TransportListener};
use crate::errors::{TransportError, TransportResult};
use crate::types::{PeerHandle, ServiceId};

const DUPLEX_CAPACITY: usize = 64 * 1024;

type ListenerKey = (String, Uuid);

// ----------------------------------------------------------------------------
// Network
// ----------------------------------------------------------------------------

struct PendingConnection {
    stream: TrackedStream,
    from: PeerHandle,
}

struct RegisteredListener {
    sender: mpsc::UnboundedSender<PendingConnection>,
    counters: Arc<ResourceCounters>,
}

#[derive(Default)]
struct NetworkState {
    listeners: HashMap<ListenerKey, RegisteredListener>,
}

/// Shared medium connecting in-process transports
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport for the node identified by `local`
    pub fn transport(&self, local: PeerHandle) -> MemoryTransport {
        MemoryTransport {
            network: self.clone(),
            local,
            counters: Arc::new(ResourceCounters::default()),
        }
    }

    /// Whether a live listener is registered for `address` and `service`
    pub fn is_listening(&self, address: &str, service: &ServiceId) -> bool {
        let state = self.lock();
        state
            .listeners
            .get(&(address.to_string(), service.uuid))
            .map(|registered| !registered.sender.is_closed())
            .unwrap_or(false)
    }

    /// Poll until a listener for `address` shows up or `within` elapses
    pub async fn wait_until_listening(
        &self,
        address: &str,
        service: &ServiceId,
        within: Duration,
    ) -> bool {
        let poll = async {
            while !self.is_listening(address, service) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(within, poll).await.is_ok()
    }

    fn lock(&self) -> MutexGuard<'_, NetworkState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ----------------------------------------------------------------------------
// Resource Accounting
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ResourceCounters {
    listeners: AtomicUsize,
    streams: AtomicUsize,
    discovery_pauses: AtomicUsize,
    discovery_resumes: AtomicUsize,
}

/// Duplex half that keeps its owner's live stream count accurate
struct TrackedStream {
    inner: DuplexStream,
    counters: Arc<ResourceCounters>,
}

impl TrackedStream {
    fn new(inner: DuplexStream, counters: Arc<ResourceCounters>) -> Self {
        counters.streams.fetch_add(1, Ordering::SeqCst);
        Self { inner, counters }
    }
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        self.counters.streams.fetch_sub(1, Ordering::SeqCst);
    }
}

impl AsyncRead for TrackedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for TrackedStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

// ----------------------------------------------------------------------------
// Transport
// ----------------------------------------------------------------------------

/// One node's view of a [`MemoryNetwork`]
#[derive(Clone)]
pub struct MemoryTransport {
    network: MemoryNetwork,
    local: PeerHandle,
    counters: Arc<ResourceCounters>,
}

impl MemoryTransport {
    /// Identity other nodes see for this transport
    pub fn local_peer(&self) -> &PeerHandle {
        &self.local
    }

    /// Listeners currently held open by this node
    pub fn live_listeners(&self) -> usize {
        self.counters.listeners.load(Ordering::SeqCst)
    }

    /// Streams currently held open by this node
    pub fn live_streams(&self) -> usize {
        self.counters.streams.load(Ordering::SeqCst)
    }

    pub fn discovery_pauses(&self) -> usize {
        self.counters.discovery_pauses.load(Ordering::SeqCst)
    }

    pub fn discovery_resumes(&self) -> usize {
        self.counters.discovery_resumes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn name(&self) -> &str {
        "memory"
    }

    async fn listen(&self, service: &ServiceId) -> TransportResult<Box<dyn TransportListener>> {
        let key = (self.local.address().to_string(), service.uuid);
        let (sender, receiver) = mpsc::unbounded_channel();

        {
            let mut state = self.network.lock();
            if let Some(existing) = state.listeners.get(&key) {
                if !existing.sender.is_closed() {
                    return Err(TransportError::ListenFailed {
                        service: service.to_string(),
                        reason: format!("address {} already in use", key.0),
                    });
                }
            }
            state.listeners.insert(
                key.clone(),
                RegisteredListener {
                    sender: sender.clone(),
                    counters: self.counters.clone(),
                },
            );
        }

        self.counters.listeners.fetch_add(1, Ordering::SeqCst);
        debug!("Memory listener open on {}", key.0);

        Ok(Box::new(MemoryListener {
            receiver,
            registered: sender,
            key,
            network: self.network.clone(),
            counters: self.counters.clone(),
        }))
    }

    async fn connect(&self, peer: &PeerHandle, service: &ServiceId) -> TransportResult<BoxedStream> {
        let key = (peer.address().to_string(), service.uuid);
        let (sender, remote_counters) = {
            let state = self.network.lock();
            let registered = state
                .listeners
                .get(&key)
                .ok_or_else(|| TransportError::ConnectionFailed {
                    peer: peer.to_string(),
                    reason: "no listener for service".to_string(),
                })?;
            (registered.sender.clone(), registered.counters.clone())
        };

        let (local_half, remote_half) = tokio::io::duplex(DUPLEX_CAPACITY);
        let local_stream = TrackedStream::new(local_half, self.counters.clone());
        let pending = PendingConnection {
            stream: TrackedStream::new(remote_half, remote_counters),
            from: self.local.clone(),
        };

        sender
            .send(pending)
            .map_err(|_| TransportError::ConnectionFailed {
                peer: peer.to_string(),
                reason: "listener closed".to_string(),
            })?;

        Ok(Box::new(local_stream))
    }

    async fn pause_discovery(&self) {
        self.counters.discovery_pauses.fetch_add(1, Ordering::SeqCst);
    }

    async fn resume_discovery(&self) {
        self.counters.discovery_resumes.fetch_add(1, Ordering::SeqCst);
    }
}

// ----------------------------------------------------------------------------
// Listener
// ----------------------------------------------------------------------------

struct MemoryListener {
    receiver: mpsc::UnboundedReceiver<PendingConnection>,
    registered: mpsc::UnboundedSender<PendingConnection>,
    key: ListenerKey,
    network: MemoryNetwork,
    counters: Arc<ResourceCounters>,
}

#[async_trait]
impl TransportListener for MemoryListener {
    async fn accept(&mut self) -> TransportResult<(BoxedStream, PeerHandle)> {
        let pending = self.receiver.recv().await.ok_or(TransportError::Closed)?;
        Ok((Box::new(pending.stream), pending.from))
    }
}

impl Drop for MemoryListener {
    fn drop(&mut self) {
        self.receiver.close();
        let mut state = self.network.lock();
        let ours = state
            .listeners
            .get(&self.key)
            .map(|registered| registered.sender.same_channel(&self.registered))
            .unwrap_or(false);
        if ours {
            state.listeners.remove(&self.key);
        }
        self.counters.listeners.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn service() -> ServiceId {
        ServiceId::new("RfChat", Uuid::from_u128(7))
    }

    #[tokio::test]
    async fn test_connect_pairs_with_listener() {
        let network = MemoryNetwork::new();
        let alice = network.transport(PeerHandle::new("alice", "Alice"));
        let bob = network.transport(PeerHandle::new("bob", "Bob"));

        let mut listener = alice.listen(&service()).await.unwrap();
        assert!(network.is_listening("alice", &service()));
        assert_eq!(alice.live_listeners(), 1);

        let mut outbound = bob
            .connect(&PeerHandle::from_address("alice"), &service())
            .await
            .unwrap();
        let (mut inbound, from) = listener.accept().await.unwrap();
        assert_eq!(from.display_name(), "Bob");
        assert_eq!(alice.live_streams(), 1);
        assert_eq!(bob.live_streams(), 1);

        outbound.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        inbound.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        drop(outbound);
        assert_eq!(inbound.read(&mut buf).await.unwrap(), 0);
        drop(inbound);
        assert_eq!(alice.live_streams(), 0);
        assert_eq!(bob.live_streams(), 0);
    }

    #[tokio::test]
    async fn test_dropping_listener_unregisters() {
        let network = MemoryNetwork::new();
        let alice = network.transport(PeerHandle::from_address("alice"));
        let bob = network.transport(PeerHandle::from_address("bob"));

        let listener = alice.listen(&service()).await.unwrap();
        assert!(alice.listen(&service()).await.is_err());
        drop(listener);

        assert!(!network.is_listening("alice", &service()));
        assert_eq!(alice.live_listeners(), 0);
        assert!(bob
            .connect(&PeerHandle::from_address("alice"), &service())
            .await
            .is_err());

        // A fresh listener can take the address again
        let _listener = alice.listen(&service()).await.unwrap();
        assert!(network.is_listening("alice", &service()));
    }
}
