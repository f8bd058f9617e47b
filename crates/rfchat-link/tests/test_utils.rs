//! Test utilities for deterministic link lifecycle tests
//!
//! [`ScriptedTransport`] hands control of every transport outcome to the test:
//! inbound peers are injected into whichever listener is open, and each
//! outbound connect waits until the test completes or fails it. The test keeps
//! the remote half of every stream, so it can write to the link, close the
//! connection, or check whether the link closed its side.

#![allow(dead_code)]

use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use rfchat_link::{
    BoxedStream, ChannelObserver, LinkEvent, LinkManager, PeerHandle, ServiceId, Transport,
    TransportError, TransportListener, TransportResult,
};
use tokio::io::{duplex, AsyncRead, AsyncReadExt, AsyncWrite, DuplexStream, ReadBuf};
use tokio::sync::{mpsc, oneshot};

const STREAM_CAPACITY: usize = 16 * 1024;

// ----------------------------------------------------------------------------
// Resource Counters
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Counters {
    listen_calls: AtomicUsize,
    live_listeners: AtomicUsize,
    connect_calls: AtomicUsize,
    pending_connects: AtomicUsize,
    live_streams: AtomicUsize,
    discovery_pauses: AtomicUsize,
}

/// Link-side stream half that counts itself while alive
struct CountedStream {
    inner: DuplexStream,
    counters: Arc<Counters>,
}

impl CountedStream {
    fn new(inner: DuplexStream, counters: Arc<Counters>) -> Self {
        counters.live_streams.fetch_add(1, Ordering::SeqCst);
        Self { inner, counters }
    }
}

impl Drop for CountedStream {
    fn drop(&mut self) {
        self.counters.live_streams.fetch_sub(1, Ordering::SeqCst);
    }
}

impl AsyncRead for CountedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for CountedStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Decrements the pending connect count when a connect finishes or is dropped
struct PendingGuard(Arc<Counters>);

impl PendingGuard {
    fn new(counters: Arc<Counters>) -> Self {
        counters.pending_connects.fetch_add(1, Ordering::SeqCst);
        Self(counters)
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.pending_connects.fetch_sub(1, Ordering::SeqCst);
    }
}

// ----------------------------------------------------------------------------
// Scripted Transport
// ----------------------------------------------------------------------------

type ConnectOutcome = Result<DuplexStream, String>;

#[derive(Default)]
struct Script {
    inbound: Option<mpsc::UnboundedSender<(DuplexStream, PeerHandle)>>,
    connect: Option<oneshot::Sender<ConnectOutcome>>,
    targets: Vec<PeerHandle>,
}

/// Transport whose every outcome is decided by the test
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
    counters: Arc<Counters>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }

    /// Offer an inbound connection to the open listener
    ///
    /// Returns the remote half. Without an open listener the connection is
    /// refused and the returned half reads end of stream.
    pub fn inject_inbound(&self, from: PeerHandle) -> DuplexStream {
        let (local, remote) = duplex(STREAM_CAPACITY);
        if let Some(inbound) = &self.script().inbound {
            let _ = inbound.send((local, from));
        }
        remote
    }

    /// Complete the in-flight connect successfully
    ///
    /// Returns the remote half, or `None` when no connect was in flight.
    pub fn complete_connect(&self) -> Option<DuplexStream> {
        let waiting = self.script().connect.take()?;
        let (local, remote) = duplex(STREAM_CAPACITY);
        waiting.send(Ok(local)).ok()?;
        Some(remote)
    }

    /// Fail the in-flight connect; false when none was in flight
    pub fn fail_connect(&self, reason: &str) -> bool {
        match self.script().connect.take() {
            Some(waiting) => waiting.send(Err(reason.to_string())).is_ok(),
            None => false,
        }
    }

    pub fn listen_calls(&self) -> usize {
        self.counters.listen_calls.load(Ordering::SeqCst)
    }

    pub fn live_listeners(&self) -> usize {
        self.counters.live_listeners.load(Ordering::SeqCst)
    }

    pub fn connect_calls(&self) -> usize {
        self.counters.connect_calls.load(Ordering::SeqCst)
    }

    pub fn pending_connects(&self) -> usize {
        self.counters.pending_connects.load(Ordering::SeqCst)
    }

    pub fn live_streams(&self) -> usize {
        self.counters.live_streams.load(Ordering::SeqCst)
    }

    pub fn discovery_pauses(&self) -> usize {
        self.counters.discovery_pauses.load(Ordering::SeqCst)
    }

    pub fn connect_targets(&self) -> Vec<PeerHandle> {
        self.script().targets.clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn listen(&self, _service: &ServiceId) -> TransportResult<Box<dyn TransportListener>> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.script().inbound = Some(sender);
        self.counters.listen_calls.fetch_add(1, Ordering::SeqCst);
        self.counters.live_listeners.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedListener {
            receiver,
            counters: self.counters.clone(),
        }))
    }

    async fn connect(&self, peer: &PeerHandle, _service: &ServiceId) -> TransportResult<BoxedStream> {
        let _pending = PendingGuard::new(self.counters.clone());
        let (sender, receiver) = oneshot::channel();
        {
            let mut script = self.script();
            script.connect = Some(sender);
            script.targets.push(peer.clone());
        }
        self.counters.connect_calls.fetch_add(1, Ordering::SeqCst);

        match receiver.await {
            Ok(Ok(stream)) => Ok(Box::new(CountedStream::new(stream, self.counters.clone()))),
            Ok(Err(reason)) => Err(TransportError::ConnectionFailed {
                peer: peer.to_string(),
                reason,
            }),
            Err(_) => Err(TransportError::Closed),
        }
    }

    async fn pause_discovery(&self) {
        self.counters.discovery_pauses.fetch_add(1, Ordering::SeqCst);
    }
}

struct ScriptedListener {
    receiver: mpsc::UnboundedReceiver<(DuplexStream, PeerHandle)>,
    counters: Arc<Counters>,
}

#[async_trait]
impl TransportListener for ScriptedListener {
    async fn accept(&mut self) -> TransportResult<(BoxedStream, PeerHandle)> {
        let (stream, peer) = self.receiver.recv().await.ok_or(TransportError::Closed)?;
        let stream = CountedStream::new(stream, self.counters.clone());
        Ok((Box::new(stream), peer))
    }
}

impl Drop for ScriptedListener {
    fn drop(&mut self) {
        self.counters.live_listeners.fetch_sub(1, Ordering::SeqCst);
    }
}

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

pub fn peer(name: &str) -> PeerHandle {
    PeerHandle::new(format!("addr-{}", name), name)
}

/// Manager over `transport` reporting into a channel
pub fn build_manager(
    transport: &ScriptedTransport,
) -> (LinkManager, mpsc::UnboundedReceiver<LinkEvent>) {
    let (observer, events) = ChannelObserver::new();
    let manager = LinkManager::builder()
        .with_transport(transport.clone())
        .with_observer(observer)
        .build()
        .expect("manager should build");
    (manager, events)
}

/// Let every runnable task make progress
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

/// Poll `condition` until it holds or two seconds pass
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .is_ok()
}

pub async fn next_event(events: &mut mpsc::UnboundedReceiver<LinkEvent>) -> LinkEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out waiting for link event")
        .expect("observer channel closed")
}

/// Assert that no further event arrives for a while
pub async fn assert_quiet(events: &mut mpsc::UnboundedReceiver<LinkEvent>) {
    if let Ok(Some(event)) =
        tokio::time::timeout(Duration::from_millis(100), events.recv()).await
    {
        panic!("unexpected link event {:?}", event);
    }
}

/// Whether the link side of `remote` has been closed
pub async fn is_closed(remote: &mut DuplexStream) -> bool {
    let mut buf = [0u8; 64];
    matches!(
        tokio::time::timeout(Duration::from_millis(100), remote.read(&mut buf)).await,
        Ok(Ok(0))
    )
}
