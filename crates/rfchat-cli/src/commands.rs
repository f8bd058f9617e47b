//! Command handlers for the rfchat CLI

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use rfchat_link::{PeerHandle, TcpTransport, Transport};

use crate::app::ChatApp;
use crate::cli::{Cli, Commands, TransportKind};
use crate::config::AppConfig;
use crate::demo::run_demo;
use crate::error::Result;

/// Discovered peers reported by the transport, when it can scan
type DiscoveryFeed = Option<mpsc::UnboundedReceiver<PeerHandle>>;

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command against the fully layered configuration
    pub async fn execute(cli: Cli, config: AppConfig) -> Result<()> {
        match cli.command {
            Commands::Chat { transport, .. } => Self::handle_chat_command(config, transport).await,
            Commands::Demo => run_demo(&config.link).await,
            Commands::Config => {
                println!("{}", AppConfig::example_config());
                Ok(())
            }
        }
    }

    /// Handle the chat command
    async fn handle_chat_command(config: AppConfig, kind: TransportKind) -> Result<()> {
        let (transport, discovery) = Self::open_transport(&config, kind).await?;
        info!(
            "Starting chat as {} over {}",
            config.node.name,
            transport.name()
        );
        let mut app = ChatApp::new(config, transport)?;
        if let Some(feed) = discovery {
            app = app.with_discovery(feed);
        }
        app.run().await
    }

    async fn open_transport(
        config: &AppConfig,
        kind: TransportKind,
    ) -> Result<(Arc<dyn Transport>, DiscoveryFeed)> {
        match kind {
            TransportKind::Tcp => Ok((Arc::new(TcpTransport::new(config.listen_addr()?)), None)),
            TransportKind::Rfcomm => Self::open_rfcomm(config).await,
        }
    }

    #[cfg(all(feature = "rfcomm", target_os = "linux"))]
    async fn open_rfcomm(config: &AppConfig) -> Result<(Arc<dyn Transport>, DiscoveryFeed)> {
        let transport = rfchat_link::RfcommTransport::new(config.link.rfcomm_channel).await?;
        let feed = transport.start_discovery().await?;
        Ok((Arc::new(transport), Some(feed)))
    }

    #[cfg(not(all(feature = "rfcomm", target_os = "linux")))]
    async fn open_rfcomm(_config: &AppConfig) -> Result<(Arc<dyn Transport>, DiscoveryFeed)> {
        Err(crate::error::CliError::FeatureNotAvailable(
            "RFCOMM support requires Linux and the `rfcomm` feature".to_string(),
        ))
    }
}
