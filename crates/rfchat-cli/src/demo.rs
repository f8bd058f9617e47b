//! In-process demo: two nodes on a memory network trade messages

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::info;

use rfchat_link::{
    ChannelObserver, LinkConfig, LinkEvent, LinkManager, LinkState, MemoryNetwork, PeerHandle,
};

use crate::app::describe_event;
use crate::error::{CliError, Result};

const STEP_TIMEOUT: Duration = Duration::from_secs(5);

struct DemoNode {
    name: &'static str,
    manager: LinkManager,
    events: mpsc::UnboundedReceiver<LinkEvent>,
}

impl DemoNode {
    fn new(
        name: &'static str,
        network: &MemoryNetwork,
        peer: PeerHandle,
        config: &LinkConfig,
    ) -> Result<Self> {
        let (observer, events) = ChannelObserver::new();
        let manager = LinkManager::builder()
            .with_config(config.clone())
            .with_transport(network.transport(peer))
            .with_observer(observer)
            .build()?;
        Ok(Self {
            name,
            manager,
            events,
        })
    }

    /// Print events until one satisfies `done`
    async fn wait_for(&mut self, done: impl Fn(&LinkEvent) -> bool) -> Result<()> {
        loop {
            let name = self.name;
            let event = tokio::time::timeout(STEP_TIMEOUT, self.events.recv())
                .await
                .map_err(|_| CliError::Demo(format!("{} timed out waiting for the link", name)))?
                .ok_or_else(|| CliError::Demo(format!("{} lost its event channel", name)))?;
            for line in describe_event(&event) {
                println!("[{}] {}", self.name, line);
            }
            if done(&event) {
                return Ok(());
            }
        }
    }

    fn send(&self, text: &str) -> Result<()> {
        if !self.manager.write(text) {
            return Err(CliError::Demo(format!("{} is not connected", self.name)));
        }
        println!("[{}] Sent: {}", self.name, text);
        Ok(())
    }
}

/// Run the demo and return once both nodes are idle again
pub async fn run_demo(config: &LinkConfig) -> Result<()> {
    let network = MemoryNetwork::new();
    let shelter_peer = PeerHandle::new("shelter", "Disaster Shelter");
    let service = config.service();

    let mut shelter = DemoNode::new("shelter", &network, shelter_peer.clone(), config)?;
    let mut scout = DemoNode::new("scout", &network, PeerHandle::new("scout", "Scout"), config)?;

    shelter.manager.start()?;
    if !network
        .wait_until_listening(shelter_peer.address(), &service, STEP_TIMEOUT)
        .await
    {
        return Err(CliError::Demo("shelter never started listening".to_string()));
    }
    info!("Shelter is listening; scout connecting");

    scout.manager.connect(shelter_peer)?;
    scout
        .wait_for(|e| matches!(e, LinkEvent::PeerConnected { .. }))
        .await?;
    shelter
        .wait_for(|e| matches!(e, LinkEvent::PeerConnected { .. }))
        .await?;

    scout.send("Scout here, two injured at the bridge")?;
    shelter
        .wait_for(|e| matches!(e, LinkEvent::MessageReceived { .. }))
        .await?;

    shelter.send("🚨 SOS: water rising at the shelter")?;
    scout
        .wait_for(|e| matches!(e, LinkEvent::MessageReceived { .. }))
        .await?;

    shelter.manager.stop()?;
    shelter
        .wait_for(|e| matches!(e, LinkEvent::PeerDisconnected))
        .await?;
    scout
        .wait_for(|e| matches!(e, LinkEvent::PeerDisconnected))
        .await?;

    scout.manager.stop()?;
    scout
        .manager
        .wait_for_state(LinkState::Idle, STEP_TIMEOUT)
        .await;
    println!("Demo complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_demo_runs_to_completion() {
        tokio_test::assert_ok!(run_demo(&LinkConfig::default()).await);
    }
}
