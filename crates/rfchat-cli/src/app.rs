//! Interactive chat application
//!
//! Wires a [`LinkManager`] to the terminal: input lines become messages or
//! slash commands, and link events become printed lines.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use rfchat_link::{
    AutoConnectPolicy, AutoConnector, ChannelObserver, LinkEvent, LinkManager, LinkState,
    PeerHandle, Transport,
};

use crate::config::AppConfig;
use crate::error::Result;

// ----------------------------------------------------------------------------
// Input Parsing
// ----------------------------------------------------------------------------

/// One line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    Message(String),
    Connect(String),
    Discover,
    Sos,
    Status,
    Quit,
    Empty,
    Unknown(String),
}

impl ChatInput {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return ChatInput::Empty;
        }
        let Some(command) = line.strip_prefix('/') else {
            return ChatInput::Message(line.to_string());
        };

        let mut parts = command.splitn(2, char::is_whitespace);
        let name = parts.next().unwrap_or_default();
        let argument = parts.next().map(str::trim).unwrap_or_default();
        match (name, argument) {
            ("connect", address) if !address.is_empty() => ChatInput::Connect(address.to_string()),
            ("discover", _) => ChatInput::Discover,
            ("sos", _) => ChatInput::Sos,
            ("status", _) => ChatInput::Status,
            ("quit" | "exit", _) => ChatInput::Quit,
            _ => ChatInput::Unknown(line.to_string()),
        }
    }
}

/// Whether received text is an emergency call
pub fn is_emergency(text: &str) -> bool {
    text.contains("SOS") || text.contains('🚨')
}

/// Printed lines for a link event
pub fn describe_event(event: &LinkEvent) -> Vec<String> {
    match event {
        LinkEvent::MessageReceived { text } => {
            let mut lines = Vec::new();
            if is_emergency(text) {
                lines.push("🚨 EMERGENCY SOS RECEIVED! 🚨".to_string());
            }
            lines.push(format!("Received: {}", text));
            lines
        }
        LinkEvent::PeerConnected { peer } => vec![
            format!("Connected to: {}", peer.display_name()),
            "System: Connected! You can now send messages.".to_string(),
        ],
        LinkEvent::PeerDisconnected => {
            vec!["System: Connection lost. Use /discover or /connect to reconnect.".to_string()]
        }
    }
}

// ----------------------------------------------------------------------------
// Chat Application
// ----------------------------------------------------------------------------

/// Result of handling one input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Lines(Vec<String>),
    Quit,
}

pub struct ChatApp {
    config: AppConfig,
    manager: LinkManager,
    connector: AutoConnector,
    events: mpsc::UnboundedReceiver<LinkEvent>,
    discovery: Option<JoinHandle<()>>,
}

impl ChatApp {
    /// Build the link over `transport`; the link stays idle until [`ChatApp::run`]
    pub fn new(config: AppConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let (observer, events) = ChannelObserver::new();
        let manager = LinkManager::builder()
            .with_config(config.link.clone())
            .with_shared_transport(transport)
            .with_observer(observer)
            .build()?;

        let mut policy = AutoConnectPolicy::new();
        if let Some(hint) = &config.chat.auto_connect_hint {
            policy = policy.with_name_hint(hint.clone());
        }
        let connector = AutoConnector::new(manager.clone(), policy);

        Ok(Self {
            config,
            manager,
            connector,
            events,
            discovery: None,
        })
    }

    /// Auto-connect to peers reported by the transport's discovery
    pub fn with_discovery(mut self, found: mpsc::UnboundedReceiver<PeerHandle>) -> Self {
        if let Some(previous) = self.discovery.take() {
            previous.abort();
        }
        self.discovery = Some(self.connector.clone().spawn(found));
        self
    }

    pub fn manager(&self) -> &LinkManager {
        &self.manager
    }

    pub fn handle_input(&self, input: ChatInput) -> Reply {
        let lines = match input {
            ChatInput::Empty => Vec::new(),
            ChatInput::Quit => return Reply::Quit,
            ChatInput::Message(text) => {
                if self.manager.write(text.as_bytes()) {
                    vec![format!("Sent: {}", text)]
                } else {
                    vec!["System: Not connected! Use /discover or /connect <address> first."
                        .to_string()]
                }
            }
            ChatInput::Sos => {
                let sos = &self.config.chat.sos_message;
                if self.manager.write(sos.as_bytes()) {
                    vec![format!("🚨 SOS SENT: {}", sos)]
                } else {
                    vec!["System: SOS failed - no connection! Find devices first.".to_string()]
                }
            }
            ChatInput::Connect(address) => {
                let peer = PeerHandle::from_address(address);
                match self.manager.connect(peer.clone()) {
                    Ok(()) => vec![format!("System: Connecting to {}...", peer)],
                    Err(e) => vec![format!("System: Connect failed: {}", e)],
                }
            }
            ChatInput::Discover => self.discover(),
            ChatInput::Status => vec![format!(
                "Status: {} ({})",
                self.manager.state(),
                self.config.node.name
            )],
            ChatInput::Unknown(line) => vec![format!(
                "System: Unknown command {} (try /connect, /discover, /sos, /status, /quit)",
                line
            )],
        };
        Reply::Lines(lines)
    }

    /// Replay known peers through the auto-connect policy
    fn discover(&self) -> Vec<String> {
        let peers = self.config.known_peer_handles();
        let mut lines = vec!["System: 🔍 Searching for nearby devices...".to_string()];
        if peers.is_empty() {
            lines.push("System: No known peers configured".to_string());
            return lines;
        }
        lines.extend(peers.iter().map(|peer| format!("Found: {}", peer)));
        if let Some(peer) = self.connector.peers_found(peers) {
            lines.push(format!("System: Connecting to {}...", peer.display_name()));
        }
        lines.push("System: Device search completed".to_string());
        lines
    }

    /// Run the chat loop on stdin until `/quit` or end of input
    pub async fn run(mut self) -> Result<()> {
        println!("System: 🚨 RfChat initialized as {}", self.config.node.name);
        println!("System: This chat works WITHOUT internet or cellular service");

        self.manager.start()?;
        println!("System: Link service ready - waiting for connections");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        self.show_prompt();
        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        debug!("Input closed");
                        break;
                    };
                    match self.handle_input(ChatInput::parse(&line)) {
                        Reply::Quit => break,
                        Reply::Lines(output) => output.iter().for_each(|l| println!("{}", l)),
                    }
                    self.show_prompt();
                }
                Some(event) = self.events.recv() => {
                    println!();
                    describe_event(&event).iter().for_each(|l| println!("{}", l));
                    self.show_prompt();
                }
            }
        }

        if let Some(discovery) = self.discovery.take() {
            discovery.abort();
        }
        info!("Shutting down link");
        self.manager.stop()?;
        self.manager
            .wait_for_state(LinkState::Idle, Duration::from_secs(2))
            .await;
        Ok(())
    }

    fn show_prompt(&self) {
        print!("{}", self.config.chat.prompt);
        let _ = std::io::stdout().flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KnownPeer;
    use rfchat_link::MemoryNetwork;

    #[test]
    fn test_parse_input() {
        assert_eq!(ChatInput::parse("  "), ChatInput::Empty);
        assert_eq!(
            ChatInput::parse("hello there"),
            ChatInput::Message("hello there".to_string())
        );
        assert_eq!(
            ChatInput::parse("/connect 10.0.0.2:7070"),
            ChatInput::Connect("10.0.0.2:7070".to_string())
        );
        assert_eq!(
            ChatInput::parse("/connect"),
            ChatInput::Unknown("/connect".to_string())
        );
        assert_eq!(ChatInput::parse("/discover"), ChatInput::Discover);
        assert_eq!(ChatInput::parse("/sos"), ChatInput::Sos);
        assert_eq!(ChatInput::parse("/status"), ChatInput::Status);
        assert_eq!(ChatInput::parse("/exit"), ChatInput::Quit);
        assert_eq!(
            ChatInput::parse("/dance"),
            ChatInput::Unknown("/dance".to_string())
        );
    }

    #[test]
    fn test_emergency_detection() {
        assert!(is_emergency("SOS trapped under rubble"));
        assert!(is_emergency("🚨 help"));
        assert!(!is_emergency("all clear"));

        let lines = describe_event(&LinkEvent::MessageReceived {
            text: "SOS".to_string(),
        });
        assert_eq!(lines[0], "🚨 EMERGENCY SOS RECEIVED! 🚨");
        assert_eq!(lines[1], "Received: SOS");
    }

    fn app_on(network: &MemoryNetwork, config: AppConfig) -> ChatApp {
        let transport = network.transport(PeerHandle::from_address("local"));
        ChatApp::new(config, Arc::new(transport)).unwrap()
    }

    #[tokio::test]
    async fn test_send_while_disconnected() {
        let app = app_on(&MemoryNetwork::new(), AppConfig::default());
        let Reply::Lines(lines) = app.handle_input(ChatInput::parse("anyone?")) else {
            panic!("expected lines");
        };
        assert!(lines[0].contains("Not connected"));

        let Reply::Lines(lines) = app.handle_input(ChatInput::Sos) else {
            panic!("expected lines");
        };
        assert!(lines[0].contains("SOS failed"));
        assert_eq!(app.handle_input(ChatInput::Quit), Reply::Quit);
    }

    #[tokio::test]
    async fn test_discover_connects_to_known_peer() {
        let network = MemoryNetwork::new();
        let mut config = AppConfig::default();
        config.node.known_peers.push(KnownPeer {
            name: "Base Camp".to_string(),
            address: "base".to_string(),
        });
        let app = app_on(&network, config);

        let Reply::Lines(lines) = app.handle_input(ChatInput::Discover) else {
            panic!("expected lines");
        };
        assert!(lines.contains(&"Found: Base Camp (base)".to_string()));
        assert!(lines.contains(&"System: Connecting to Base Camp...".to_string()));
    }

    #[tokio::test]
    async fn test_discover_connects_to_first_of_several_peers() {
        let network = MemoryNetwork::new();
        let service = rfchat_link::LinkConfig::default().service();
        let mut config = AppConfig::default();
        let mut nodes = Vec::new();
        let fields = [
            ("field-a", "Field A"),
            ("field-b", "Field B"),
            ("field-c", "Field C"),
        ];
        for (address, name) in fields {
            config.node.known_peers.push(KnownPeer {
                name: name.to_string(),
                address: address.to_string(),
            });
            let node = LinkManager::builder()
                .with_transport(network.transport(PeerHandle::new(address, name)))
                .build()
                .unwrap();
            node.start().unwrap();
            assert!(
                network
                    .wait_until_listening(address, &service, Duration::from_secs(2))
                    .await
            );
            nodes.push(node);
        }
        let mut app = app_on(&network, config);
        app.manager().start().unwrap();

        let Reply::Lines(lines) = app.handle_input(ChatInput::Discover) else {
            panic!("expected lines");
        };
        let connecting: Vec<&String> = lines
            .iter()
            .filter(|line| line.starts_with("System: Connecting to"))
            .collect();
        assert_eq!(connecting, vec!["System: Connecting to Field A..."]);

        let event = tokio::time::timeout(Duration::from_secs(2), app.events.recv())
            .await
            .unwrap();
        assert_eq!(
            event,
            Some(LinkEvent::PeerConnected {
                peer: PeerHandle::new("field-a", "Field A")
            })
        );
        assert!(
            nodes[0]
                .wait_for_state(LinkState::Connected, Duration::from_secs(2))
                .await
        );
        assert_eq!(nodes[1].state(), LinkState::Listening);
        assert_eq!(nodes[2].state(), LinkState::Listening);
    }

    #[tokio::test]
    async fn test_discovery_feed_drives_auto_connect() {
        let network = MemoryNetwork::new();
        let service = rfchat_link::LinkConfig::default().service();
        let shelter = LinkManager::builder()
            .with_transport(network.transport(PeerHandle::new("shelter", "Disaster Shelter")))
            .build()
            .unwrap();
        shelter.start().unwrap();
        assert!(
            network
                .wait_until_listening("shelter", &service, Duration::from_secs(2))
                .await
        );

        let (found, feed) = mpsc::unbounded_channel();
        let mut app = app_on(&network, AppConfig::default()).with_discovery(feed);
        app.manager().start().unwrap();
        found
            .send(PeerHandle::new("shelter", "Disaster Shelter"))
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), app.events.recv())
            .await
            .unwrap();
        assert!(matches!(event, Some(LinkEvent::PeerConnected { .. })));
    }

    #[tokio::test]
    async fn test_status_reports_state() {
        let app = app_on(&MemoryNetwork::new(), AppConfig::default());
        assert_eq!(
            app.handle_input(ChatInput::Status),
            Reply::Lines(vec!["Status: idle (rfchat-node)".to_string()])
        );
    }
}
