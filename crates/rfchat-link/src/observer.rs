//! Observer capabilities through which the link reports to its host
//!
//! The link never depends on a concrete UI. Hosts either implement
//! [`LinkObserver`] directly, receive [`LinkEvent`]s from a
//! [`ChannelObserver`], or hand three closures to a [`CallbackObserver`].

use tokio::sync::mpsc;
use tracing::debug;

use crate::types::PeerHandle;

// ----------------------------------------------------------------------------
// Observer Trait
// ----------------------------------------------------------------------------

/// Receives the asynchronous notifications of a link manager
///
/// Callbacks run on link tasks and must not block.
pub trait LinkObserver: Send + Sync + 'static {
    /// A chunk of text arrived from the connected peer
    fn on_message(&self, text: &str);

    /// A peer won the hand-off and the session is live
    fn on_connected(&self, peer: &PeerHandle);

    /// The live session ended
    fn on_disconnected(&self);
}

// ----------------------------------------------------------------------------
// Channel Observer
// ----------------------------------------------------------------------------

/// Link notification as a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    MessageReceived { text: String },
    PeerConnected { peer: PeerHandle },
    PeerDisconnected,
}

/// Observer that forwards every notification into an mpsc channel
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    event_sender: mpsc::UnboundedSender<LinkEvent>,
}

impl ChannelObserver {
    /// Create an observer and the receiver its events arrive on
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LinkEvent>) {
        let (event_sender, event_receiver) = mpsc::unbounded_channel();
        (Self { event_sender }, event_receiver)
    }

    fn forward(&self, event: LinkEvent) {
        if self.event_sender.send(event).is_err() {
            debug!("Link event dropped - receiver closed");
        }
    }
}

impl LinkObserver for ChannelObserver {
    fn on_message(&self, text: &str) {
        self.forward(LinkEvent::MessageReceived {
            text: text.to_string(),
        });
    }

    fn on_connected(&self, peer: &PeerHandle) {
        self.forward(LinkEvent::PeerConnected { peer: peer.clone() });
    }

    fn on_disconnected(&self) {
        self.forward(LinkEvent::PeerDisconnected);
    }
}

// ----------------------------------------------------------------------------
// Callback Observer
// ----------------------------------------------------------------------------

type MessageCallback = Box<dyn Fn(&str) + Send + Sync>;
type ConnectedCallback = Box<dyn Fn(&PeerHandle) + Send + Sync>;
type DisconnectedCallback = Box<dyn Fn() + Send + Sync>;

/// Observer assembled from one independent closure per notification
pub struct CallbackObserver {
    on_message: MessageCallback,
    on_connected: ConnectedCallback,
    on_disconnected: DisconnectedCallback,
}

impl CallbackObserver {
    pub fn new(
        on_message: impl Fn(&str) + Send + Sync + 'static,
        on_connected: impl Fn(&PeerHandle) + Send + Sync + 'static,
        on_disconnected: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            on_message: Box::new(on_message),
            on_connected: Box::new(on_connected),
            on_disconnected: Box::new(on_disconnected),
        }
    }
}

impl LinkObserver for CallbackObserver {
    fn on_message(&self, text: &str) {
        (self.on_message)(text)
    }

    fn on_connected(&self, peer: &PeerHandle) {
        (self.on_connected)(peer)
    }

    fn on_disconnected(&self) {
        (self.on_disconnected)()
    }
}

/// Observer that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl LinkObserver for NoopObserver {
    fn on_message(&self, _text: &str) {}

    fn on_connected(&self, _peer: &PeerHandle) {}

    fn on_disconnected(&self) {}
}
