//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::ConfigOverrides;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,
}

impl Cli {
    /// Configuration values given as arguments
    pub fn config_overrides(&self) -> ConfigOverrides {
        match &self.command {
            Commands::Chat {
                name, listen, peer, ..
            } => ConfigOverrides {
                name: name.clone(),
                listen_address: listen.clone(),
                peers: peer.clone(),
            },
            Commands::Demo | Commands::Config => ConfigOverrides::default(),
        }
    }
}

/// Stream transport carrying the link
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportKind {
    /// TCP sockets, peers addressed as host:port
    Tcp,
    /// Bluetooth RFCOMM, peers addressed by device address
    Rfcomm,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start interactive chat mode
    Chat {
        /// Your display name
        #[arg(short, long)]
        name: Option<String>,
        /// Local address to listen on (TCP transport)
        #[arg(short, long)]
        listen: Option<String>,
        /// Known peer address, may be repeated
        #[arg(short, long)]
        peer: Vec<String>,
        /// Transport to use
        #[arg(short, long, value_enum, default_value_t = TransportKind::Tcp)]
        transport: TransportKind,
    },
    /// Run two in-process nodes and exchange messages
    Demo,
    /// Print an example configuration file
    Config,
}
