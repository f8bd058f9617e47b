//! Link manager: the public handle of a peer link
//!
//! A [`LinkManager`] is a cheap, cloneable handle. Every request is queued to
//! a single coordinator task that owns the listener, initiator, and session
//! and applies transitions one at a time. The current [`LinkState`] is
//! published through a watch channel so queries never wait on a transition.

mod coordinator;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::config::LinkConfig;
use crate::discovery::AutoConnectPolicy;
use crate::errors::{LinkError, LinkResult, TransportError};
use crate::observer::{LinkObserver, NoopObserver};
use crate::transport::{BoxedStream, Transport};
use crate::types::{AttemptId, LinkState, PeerHandle};

use coordinator::Coordinator;

// ----------------------------------------------------------------------------
// Commands
// ----------------------------------------------------------------------------

/// Requests and worker reports processed by the coordinator in arrival order
pub(crate) enum Command {
    Start,
    Stop,
    Connect {
        peer: PeerHandle,
    },
    Discovered {
        peer: PeerHandle,
        policy: AutoConnectPolicy,
    },
    Write {
        bytes: Vec<u8>,
    },
    Accepted {
        listener: AttemptId,
        stream: BoxedStream,
        peer: PeerHandle,
    },
    Initiated {
        initiator: AttemptId,
        stream: BoxedStream,
        peer: PeerHandle,
    },
    InitiationFailed {
        initiator: AttemptId,
    },
    ListenerClosed {
        listener: AttemptId,
    },
    SessionLost {
        session: AttemptId,
    },
    Shutdown,
}

impl Command {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::Stop => "stop",
            Command::Connect { .. } => "connect",
            Command::Discovered { .. } => "discovered",
            Command::Write { .. } => "write",
            Command::Accepted { .. } => "accepted",
            Command::Initiated { .. } => "initiated",
            Command::InitiationFailed { .. } => "initiation-failed",
            Command::ListenerClosed { .. } => "listener-closed",
            Command::SessionLost { .. } => "session-lost",
            Command::Shutdown => "shutdown",
        }
    }
}

// ----------------------------------------------------------------------------
// Link Manager
// ----------------------------------------------------------------------------

/// Stops the coordinator once the last handle is gone
struct ShutdownOnDrop {
    commands: mpsc::UnboundedSender<Command>,
}

impl Drop for ShutdownOnDrop {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}

/// Handle to a running peer link
///
/// All methods return immediately; transitions complete on the coordinator
/// task and are observed through the [`LinkObserver`] or [`LinkManager::subscribe`].
#[derive(Clone)]
pub struct LinkManager {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<LinkState>,
    _lifetime: Arc<ShutdownOnDrop>,
}

impl LinkManager {
    pub fn builder() -> LinkManagerBuilder {
        LinkManagerBuilder::new()
    }

    /// Enter listening mode
    ///
    /// Cancels any outbound attempt, ends any live session, and opens the
    /// listener unless one is already running.
    pub fn start(&self) -> LinkResult<()> {
        self.send(Command::Start)
    }

    /// Cancel every worker and return to idle without restarting
    pub fn stop(&self) -> LinkResult<()> {
        self.send(Command::Stop)
    }

    /// Attempt an outbound connection to `peer`
    ///
    /// Replaces any in-flight attempt and ends any live session. The listener
    /// keeps running, so an inbound peer may still win the race.
    pub fn connect(&self, peer: PeerHandle) -> LinkResult<()> {
        self.send(Command::Connect { peer })
    }

    /// Offer a discovered peer, connecting if `policy` accepts it
    ///
    /// The policy is applied against the coordinator's own state when the
    /// offer is dequeued, so of a burst of sightings only the first accepted
    /// one starts an attempt.
    pub fn offer_peer(&self, peer: PeerHandle, policy: AutoConnectPolicy) -> LinkResult<()> {
        self.send(Command::Discovered { peer, policy })
    }

    /// Queue bytes for the connected peer
    ///
    /// Returns false and drops the bytes when no session is live.
    pub fn write(&self, bytes: impl Into<Vec<u8>>) -> bool {
        if !self.is_connected() {
            debug!("Dropping write - link is {}", self.state());
            return false;
        }
        self.commands
            .send(Command::Write {
                bytes: bytes.into(),
            })
            .is_ok()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    /// Receiver that observes every published state
    pub fn subscribe(&self) -> watch::Receiver<LinkState> {
        self.state.clone()
    }

    /// Wait until the published state equals `target`
    ///
    /// Returns false if `within` elapses first or the link has shut down.
    pub async fn wait_for_state(&self, target: LinkState, within: Duration) -> bool {
        let mut state = self.state.clone();
        let reached = async move {
            loop {
                if *state.borrow_and_update() == target {
                    return true;
                }
                if state.changed().await.is_err() {
                    return false;
                }
            }
        };
        tokio::time::timeout(within, reached).await.unwrap_or(false)
    }

    fn send(&self, command: Command) -> LinkResult<()> {
        self.commands
            .send(command)
            .map_err(|_| LinkError::ManagerClosed)
    }
}

// ----------------------------------------------------------------------------
// Builder
// ----------------------------------------------------------------------------

/// Assembles a [`LinkManager`] from a transport, an observer, and config
#[derive(Default)]
pub struct LinkManagerBuilder {
    config: LinkConfig,
    transport: Option<Arc<dyn Transport>>,
    observer: Option<Arc<dyn LinkObserver>>,
}

impl LinkManagerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: LinkConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_transport(self, transport: impl Transport) -> Self {
        self.with_shared_transport(Arc::new(transport))
    }

    pub fn with_shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_observer(self, observer: impl LinkObserver) -> Self {
        self.with_shared_observer(Arc::new(observer))
    }

    pub fn with_shared_observer(mut self, observer: Arc<dyn LinkObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Spawn the coordinator on the current tokio runtime
    ///
    /// Fails with [`TransportError::Unavailable`] when no transport was given;
    /// the link starts out `Idle`.
    pub fn build(self) -> LinkResult<LinkManager> {
        self.config.validate()?;

        let transport = self.transport.ok_or_else(|| {
            LinkError::Transport(TransportError::Unavailable {
                transport_type: "no transport provider configured".to_string(),
            })
        })?;
        let observer = self
            .observer
            .unwrap_or_else(|| Arc::new(NoopObserver) as Arc<dyn LinkObserver>);

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            LinkError::InvalidConfiguration {
                reason: "Link manager must be built inside a tokio runtime".to_string(),
            }
        })?;

        let (command_sender, command_receiver) = mpsc::unbounded_channel();
        let (state_sender, state_receiver) = watch::channel(LinkState::Idle);

        info!(
            "Link manager created on {} transport for {}",
            transport.name(),
            self.config.service()
        );
        let coordinator = Coordinator::new(
            transport,
            &self.config,
            observer,
            state_sender,
            command_sender.clone(),
        );
        runtime.spawn(coordinator.run(command_receiver));

        Ok(LinkManager {
            commands: command_sender.clone(),
            state: state_receiver,
            _lifetime: Arc::new(ShutdownOnDrop {
                commands: command_sender,
            }),
        })
    }
}
