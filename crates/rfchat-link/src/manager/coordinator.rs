//! Coordinator task: single owner of the link state machine
//!
//! Handles one [`Command`] at a time, so every transition is atomic with
//! respect to every other. Worker reports carry the [`AttemptId`] of the
//! worker that produced them; a report whose id is no longer current, or that
//! arrives in a state where it no longer applies, is dropped and any stream it
//! carries is closed.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use super::Command;
use crate::config::LinkConfig;
use crate::discovery::AutoConnectPolicy;
use crate::initiator::spawn_initiator;
use crate::listener::spawn_listener;
use crate::observer::LinkObserver;
use crate::session::Session;
use crate::transport::{BoxedStream, Transport};
use crate::types::{AttemptId, LinkState, PeerHandle, ServiceId};
use crate::worker::Worker;

/// Which role produced a candidate stream
#[derive(Debug, Clone, Copy)]
enum Origin {
    Inbound,
    Outbound,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Inbound => f.write_str("inbound"),
            Origin::Outbound => f.write_str("outbound"),
        }
    }
}

pub(crate) struct Coordinator {
    transport: Arc<dyn Transport>,
    service: ServiceId,
    read_buffer_size: usize,
    observer: Arc<dyn LinkObserver>,
    state: LinkState,
    state_sender: watch::Sender<LinkState>,
    commands: mpsc::UnboundedSender<Command>,
    next_attempt: u64,
    listener: Option<Worker>,
    initiator: Option<Worker>,
    session: Option<Session>,
}

impl Coordinator {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        config: &LinkConfig,
        observer: Arc<dyn LinkObserver>,
        state_sender: watch::Sender<LinkState>,
        commands: mpsc::UnboundedSender<Command>,
    ) -> Self {
        Self {
            transport,
            service: config.service(),
            read_buffer_size: config.read_buffer_size,
            observer,
            state: LinkState::Idle,
            state_sender,
            commands,
            next_attempt: 0,
            listener: None,
            initiator: None,
            session: None,
        }
    }

    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        debug!("Link coordinator running");
        while let Some(command) = commands.recv().await {
            if let Command::Shutdown = command {
                break;
            }
            self.handle(command).await;
        }
        self.stop().await;
        info!("Link coordinator stopped");
    }

    pub(crate) async fn handle(&mut self, command: Command) {
        debug!("Handling {} while {}", command.label(), self.state);
        match command {
            Command::Start => self.start().await,
            Command::Stop => self.stop().await,
            Command::Connect { peer } => self.connect(peer).await,
            Command::Discovered { peer, policy } => self.discovered(peer, policy).await,
            Command::Write { bytes } => self.write(bytes),
            Command::Accepted {
                listener,
                stream,
                peer,
            } => {
                let current = self.listener.as_ref().map(Worker::id) == Some(listener);
                self.hand_off(Origin::Inbound, current, stream, peer).await;
            }
            Command::Initiated {
                initiator,
                stream,
                peer,
            } => {
                let current = self.initiator.as_ref().map(Worker::id) == Some(initiator);
                self.hand_off(Origin::Outbound, current, stream, peer).await;
            }
            Command::InitiationFailed { initiator } => self.initiation_failed(initiator).await,
            Command::ListenerClosed { listener } => self.listener_closed(listener).await,
            Command::SessionLost { session } => self.session_lost(session).await,
            Command::Shutdown => self.stop().await,
        }
    }

    // ------------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------------

    async fn start(&mut self) {
        if let Some(initiator) = self.initiator.take() {
            initiator.cancel().await;
        }
        let ended = self.end_session().await;
        self.set_state(LinkState::Listening);
        if ended {
            self.observer.on_disconnected();
        }

        if self.listener.is_none() {
            let id = self.next_id();
            debug!("Opening listener {}", id);
            self.listener = Some(spawn_listener(
                id,
                self.transport.clone(),
                self.service.clone(),
                self.state_sender.subscribe(),
                self.commands.clone(),
            ));
        }
    }

    async fn stop(&mut self) {
        if let Some(initiator) = self.initiator.take() {
            initiator.cancel().await;
        }
        let ended = self.end_session().await;
        if let Some(listener) = self.listener.take() {
            listener.cancel().await;
        }
        self.set_state(LinkState::Idle);
        if ended {
            self.observer.on_disconnected();
        }
    }

    async fn connect(&mut self, peer: PeerHandle) {
        if let Some(initiator) = self.initiator.take() {
            debug!("Replacing connect {} with a new attempt", initiator.id());
            initiator.cancel().await;
        }
        let ended = self.end_session().await;

        let id = self.next_id();
        self.initiator = Some(spawn_initiator(
            id,
            self.transport.clone(),
            self.service.clone(),
            peer,
            self.commands.clone(),
        ));
        self.set_state(LinkState::Connecting);
        if ended {
            self.observer.on_disconnected();
        }
    }

    async fn discovered(&mut self, peer: PeerHandle, policy: AutoConnectPolicy) {
        if !policy.should_connect(&peer, self.state) {
            debug!("Skipping discovered peer {} while {}", peer, self.state);
            return;
        }
        info!("Auto-connecting to discovered peer {}", peer);
        self.connect(peer).await;
    }

    fn write(&self, bytes: Vec<u8>) {
        match &self.session {
            Some(session) if self.state.is_connected() => {
                if !session.write(bytes) {
                    debug!("Session {} already closed, write dropped", session.id());
                }
            }
            _ => debug!("Dropping {} bytes - link is {}", bytes.len(), self.state),
        }
    }

    // ------------------------------------------------------------------------
    // Worker Reports
    // ------------------------------------------------------------------------

    /// Promote a freshly opened stream to the session if it wins the race
    async fn hand_off(
        &mut self,
        origin: Origin,
        current: bool,
        stream: BoxedStream,
        peer: PeerHandle,
    ) {
        if !current || !self.state.accepts_handoff() {
            debug!("Discarding {} stream from {} while {}", origin, peer, self.state);
            drop(stream);
            return;
        }

        // Losers are closed before the winner is published
        if let Some(initiator) = self.initiator.take() {
            initiator.cancel().await;
        }
        if let Some(listener) = self.listener.take() {
            listener.cancel().await;
        }
        if let Some(stale) = self.session.take() {
            stale.cancel().await;
        }

        let id = self.next_id();
        self.set_state(LinkState::Connected);
        info!("Connected to {} ({} session {})", peer, origin, id);
        self.observer.on_connected(&peer);

        self.session = Some(Session::spawn(
            id,
            stream,
            peer,
            self.observer.clone(),
            self.commands.clone(),
            self.read_buffer_size,
        ));
    }

    async fn initiation_failed(&mut self, id: AttemptId) {
        let current = self.initiator.as_ref().map(Worker::id) == Some(id);
        if !current || self.state != LinkState::Connecting {
            debug!("Ignoring stale failure of connect {}", id);
            return;
        }
        if let Some(initiator) = self.initiator.take() {
            initiator.cancel().await;
        }

        info!("Connect {} failed, returning to listening", id);
        self.set_state(LinkState::Listening);
        self.observer.on_disconnected();
        self.start().await;
    }

    async fn listener_closed(&mut self, id: AttemptId) {
        if self.listener.as_ref().map(Worker::id) != Some(id) {
            return;
        }
        if let Some(listener) = self.listener.take() {
            listener.cancel().await;
        }
        debug!("Listener {} closed while {}", id, self.state);
    }

    async fn session_lost(&mut self, id: AttemptId) {
        if self.session.as_ref().map(Session::id) != Some(id) {
            debug!("Ignoring loss of stale session {}", id);
            return;
        }
        if let Some(session) = self.session.take() {
            info!("Connection to {} lost", session.peer());
            session.cancel().await;
        }

        self.set_state(LinkState::Listening);
        self.observer.on_disconnected();
        self.start().await;
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    /// Close the live session; true if there was one
    async fn end_session(&mut self) -> bool {
        match self.session.take() {
            Some(session) => {
                debug!("Ending session {} with {}", session.id(), session.peer());
                session.cancel().await;
                true
            }
            None => false,
        }
    }

    fn set_state(&mut self, next: LinkState) {
        if self.state != next {
            debug!("Link state {} -> {}", self.state, next);
        }
        self.state = next;
        self.state_sender.send_replace(next);
    }

    fn next_id(&mut self) -> AttemptId {
        self.next_attempt += 1;
        AttemptId::new(self.next_attempt)
    }
}
