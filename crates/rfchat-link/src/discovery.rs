//! Automatic connection to discovered peers
//!
//! Discovery itself is platform specific; whatever drives it feeds found peers
//! into an [`AutoConnector`], which decides whether to initiate a connection.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::manager::LinkManager;
use crate::types::{LinkState, PeerHandle};

/// Decides which discovered peers are worth connecting to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutoConnectPolicy {
    name_hint: Option<String>,
}

impl AutoConnectPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefer peers whose display name contains `hint`, even over a live session
    pub fn with_name_hint(mut self, hint: impl Into<String>) -> Self {
        let hint = hint.into();
        self.name_hint = if hint.is_empty() { None } else { Some(hint) };
        self
    }

    pub fn name_hint(&self) -> Option<&str> {
        self.name_hint.as_deref()
    }

    /// Whether `peer` should be connected to given the current link state
    ///
    /// While an attempt is in flight discovery is paused, so later sightings
    /// are ignored. Otherwise a peer matching the name hint is always taken,
    /// and any peer is taken when no session is live.
    pub fn should_connect(&self, peer: &PeerHandle, state: LinkState) -> bool {
        match state {
            LinkState::Connecting => false,
            LinkState::Connected => self.matches_hint(peer),
            LinkState::Idle | LinkState::Listening => true,
        }
    }

    fn matches_hint(&self, peer: &PeerHandle) -> bool {
        self.name_hint
            .as_deref()
            .is_some_and(|hint| peer.display_name().contains(hint))
    }
}

/// Feeds discovered peers into a link manager according to a policy
///
/// Sightings are queued to the link together with the policy; the decision is
/// made in order against the link's own state, so the first acceptable peer
/// of a burst wins and later ones find the link already `Connecting`.
#[derive(Clone)]
pub struct AutoConnector {
    manager: LinkManager,
    policy: AutoConnectPolicy,
}

impl AutoConnector {
    pub fn new(manager: LinkManager, policy: AutoConnectPolicy) -> Self {
        Self { manager, policy }
    }

    pub fn policy(&self) -> &AutoConnectPolicy {
        &self.policy
    }

    /// Offer one discovered peer; false once the link has shut down
    pub fn peer_found(&self, peer: PeerHandle) -> bool {
        debug!("Offering discovered peer {}", peer);
        match self.manager.offer_peer(peer, self.policy.clone()) {
            Ok(()) => true,
            Err(e) => {
                warn!("Auto-connect unavailable: {}", e);
                false
            }
        }
    }

    /// Offer a burst of sightings in discovery order
    ///
    /// Returns the peer the policy picks against the current state, which is
    /// the one the link will try unless another request overtakes it.
    pub fn peers_found(&self, peers: impl IntoIterator<Item = PeerHandle>) -> Option<PeerHandle> {
        let state = self.manager.state();
        let mut chosen = None;
        for peer in peers {
            if chosen.is_none() && self.policy.should_connect(&peer, state) {
                info!("Auto-connecting to discovered peer {}", peer);
                chosen = Some(peer.clone());
            }
            if !self.peer_found(peer) {
                return None;
            }
        }
        chosen
    }

    /// Consume discovered peers until the sender side closes
    pub fn spawn(self, mut found: mpsc::UnboundedReceiver<PeerHandle>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(peer) = found.recv().await {
                if !self.peer_found(peer) {
                    break;
                }
            }
            debug!("Discovery feed closed");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LinkConfig;
    use crate::observer::{ChannelObserver, LinkEvent};
    use crate::transport::MemoryNetwork;
    use std::time::Duration;

    #[test]
    fn test_policy_without_hint() {
        let policy = AutoConnectPolicy::new();
        let peer = PeerHandle::new("aa", "Field Unit");
        assert!(policy.should_connect(&peer, LinkState::Idle));
        assert!(policy.should_connect(&peer, LinkState::Listening));
        assert!(!policy.should_connect(&peer, LinkState::Connecting));
        assert!(!policy.should_connect(&peer, LinkState::Connected));
    }

    #[test]
    fn test_policy_hint_overrides_live_session() {
        let policy = AutoConnectPolicy::new().with_name_hint("Disaster");
        let preferred = PeerHandle::new("aa", "Disaster Relief 3");
        let other = PeerHandle::new("bb", "Phone");
        assert!(policy.should_connect(&preferred, LinkState::Connected));
        assert!(!policy.should_connect(&other, LinkState::Connected));
        assert!(!policy.should_connect(&preferred, LinkState::Connecting));
    }

    #[test]
    fn test_empty_hint_is_none() {
        let policy = AutoConnectPolicy::new().with_name_hint("");
        assert_eq!(policy.name_hint(), None);
    }

    async fn listening_node(
        network: &MemoryNetwork,
        peer: PeerHandle,
    ) -> (LinkManager, mpsc::UnboundedReceiver<LinkEvent>) {
        let (observer, events) = ChannelObserver::new();
        let manager = LinkManager::builder()
            .with_transport(network.transport(peer.clone()))
            .with_observer(observer)
            .build()
            .unwrap();
        manager.start().unwrap();
        let service = LinkConfig::default().service();
        assert!(
            network
                .wait_until_listening(peer.address(), &service, Duration::from_secs(2))
                .await
        );
        (manager, events)
    }

    #[tokio::test]
    async fn test_burst_of_sightings_connects_first_peer() {
        let network = MemoryNetwork::new();
        let field_a = PeerHandle::new("field-a", "Field A");
        let field_b = PeerHandle::new("field-b", "Field B");
        let field_c = PeerHandle::new("field-c", "Field C");
        let (_a, mut a_events) = listening_node(&network, field_a.clone()).await;
        let (_b, mut b_events) = listening_node(&network, field_b.clone()).await;
        let (_c, mut c_events) = listening_node(&network, field_c.clone()).await;

        let scout_transport = network.transport(PeerHandle::from_address("scout"));
        let (observer, mut scout_events) = ChannelObserver::new();
        let scout = LinkManager::builder()
            .with_transport(scout_transport.clone())
            .with_observer(observer)
            .build()
            .unwrap();
        scout.start().unwrap();

        let connector = AutoConnector::new(scout.clone(), AutoConnectPolicy::new());
        let chosen = connector.peers_found(vec![field_a.clone(), field_b, field_c]);
        assert_eq!(chosen, Some(field_a.clone()));

        let event = tokio::time::timeout(Duration::from_secs(2), scout_events.recv())
            .await
            .unwrap();
        assert_eq!(event, Some(LinkEvent::PeerConnected { peer: field_a }));
        let inbound = tokio::time::timeout(Duration::from_secs(2), a_events.recv())
            .await
            .unwrap();
        assert!(matches!(inbound, Some(LinkEvent::PeerConnected { .. })));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(b_events.try_recv().is_err());
        assert!(c_events.try_recv().is_err());
        assert_eq!(scout_transport.discovery_pauses(), 1);
        assert!(scout.is_connected());
    }

    #[tokio::test]
    async fn test_connector_requests_connect() {
        let network = MemoryNetwork::new();
        let transport = network.transport(PeerHandle::from_address("scout"));
        let manager = LinkManager::builder()
            .with_transport(transport.clone())
            .build()
            .unwrap();
        manager.start().unwrap();

        let (found, feed) = mpsc::unbounded_channel();
        let task = AutoConnector::new(manager.clone(), AutoConnectPolicy::new()).spawn(feed);
        found.send(PeerHandle::from_address("base")).unwrap();
        drop(found);
        task.await.unwrap();

        // Nobody listens on "base", so the attempt fails and discovery resumes
        let resumed = tokio::time::timeout(Duration::from_secs(2), async {
            while transport.discovery_resumes() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(resumed.is_ok());
        assert_eq!(transport.discovery_pauses(), 1);
        assert!(
            manager
                .wait_for_state(LinkState::Listening, Duration::from_secs(2))
                .await
        );
    }
}
