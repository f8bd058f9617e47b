//! rfchat CLI Configuration Management
//!
//! Configuration is layered with figment, lowest priority first:
//! - Default values
//! - The configuration file (`<config dir>/rfchat/config.toml` unless given)
//! - Environment variables (`RFCHAT_<SECTION>__<FIELD>`)
//! - Command line arguments
//!
//! Missing sections and fields fall back to defaults.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use rfchat_link::{LinkConfig, PeerHandle};

// ----------------------------------------------------------------------------
// CLI Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the rfchat CLI application
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Link manager configuration
    pub link: LinkConfig,

    /// Local node identity and known peers
    pub node: NodeConfig,

    /// Chat interface behavior
    pub chat: ChatConfig,
}

/// Local node identity and reachability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Human-readable name shown in the chat
    pub name: String,

    /// Local `host:port` the TCP transport listens on
    pub listen_address: String,

    /// Peers replayed by `/discover`
    pub known_peers: Vec<KnownPeer>,
}

/// A peer this node knows how to reach
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownPeer {
    pub name: String,
    pub address: String,
}

impl KnownPeer {
    pub fn handle(&self) -> PeerHandle {
        PeerHandle::new(self.address.clone(), self.name.clone())
    }
}

/// Chat interface configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Prompt printed before each input line
    pub prompt: String,

    /// Text sent by `/sos`
    pub sos_message: String,

    /// Discovered peers whose name contains this are always connected to
    pub auto_connect_hint: Option<String>,
}

/// Prefix of environment variables read into the configuration
pub const ENV_PREFIX: &str = "RFCHAT_";

/// Values given on the command line, applied over every other layer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub name: Option<String>,
    pub listen_address: Option<String>,
    /// Added to the configured known peers
    pub peers: Vec<String>,
}

// ----------------------------------------------------------------------------
// Default Implementations
// ----------------------------------------------------------------------------

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: "rfchat-node".to_string(),
            listen_address: "0.0.0.0:7070".to_string(),
            known_peers: Vec::new(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            prompt: "rfchat> ".to_string(),
            sos_message: "🚨 SOS! Need help at my location. Please respond.".to_string(),
            auto_connect_hint: Some("Disaster".to_string()),
        }
    }
}

// ----------------------------------------------------------------------------
// Configuration Loading Logic
// ----------------------------------------------------------------------------

impl AppConfig {
    /// Load configuration with the standard priority order:
    /// 1. Command line overrides (highest priority)
    /// 2. Environment variables
    /// 3. Configuration file (`path`, or the default location)
    /// 4. Default values (lowest priority)
    pub fn load_with_overrides(
        path: Option<&Path>,
        overrides: &ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) if !path.exists() => {
                return Err(ConfigError::Loading(format!(
                    "Configuration file {} not found",
                    path.display()
                )));
            }
            Some(path) => path.to_path_buf(),
            None => Self::default_config_path()?,
        };
        info!("Loading configuration from: {}", file.display());

        let mut figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(&file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        // Apply command line overrides
        if let Some(name) = &overrides.name {
            figment = figment.merge(("node.name", name));
        }
        if let Some(listen) = &overrides.listen_address {
            figment = figment.merge(("node.listen_address", listen));
        }
        if !overrides.peers.is_empty() {
            let mut known: Vec<KnownPeer> = figment
                .extract_inner("node.known_peers")
                .map_err(|e| ConfigError::Loading(format!("Invalid known peers: {}", e)))?;
            known.extend(overrides.peers.iter().map(|address| KnownPeer {
                name: address.clone(),
                address: address.clone(),
            }));
            figment = figment.merge(("node.known_peers", known));
        }

        Self::extract(figment)
    }

    /// Load defaults, the default config file and the environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_overrides(None, &ConfigOverrides::default())
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::Loading(format!(
                "Configuration file {} not found",
                path.display()
            )));
        }
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path));
        let config = Self::extract(figment)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Self::extract(
            Figment::new()
                .merge(Serialized::defaults(Self::default()))
                .merge(Toml::string(contents)),
        )
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config: AppConfig = figment
            .extract()
            .map_err(|e| ConfigError::Loading(format!("Failed to load configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let base = dirs::config_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| ConfigError::Environment("No config or home directory".to_string()))?;
        Ok(base.join("rfchat").join("config.toml"))
    }

    /// Save configuration to a specific file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigError::FileSystem(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialization(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path.as_ref(), toml_string)
            .map_err(|e| ConfigError::FileSystem(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.link
            .validate()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;

        if self.node.name.trim().is_empty() {
            return Err(ConfigError::Validation("Node name must not be empty".to_string()));
        }
        self.listen_addr()?;

        for peer in &self.node.known_peers {
            if peer.address.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "Known peer {} has no address",
                    peer.name
                )));
            }
        }

        if self.chat.sos_message.trim().is_empty() {
            return Err(ConfigError::Validation("SOS message must not be empty".to_string()));
        }

        Ok(())
    }

    /// Parsed listen address of the TCP transport
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.node.listen_address.parse().map_err(|_| {
            ConfigError::Validation(format!(
                "Invalid listen address: {}",
                self.node.listen_address
            ))
        })
    }

    /// Known peers as link handles
    pub fn known_peer_handles(&self) -> Vec<PeerHandle> {
        self.node.known_peers.iter().map(KnownPeer::handle).collect()
    }

    /// Create example configuration file content
    pub fn example_config() -> String {
        let example_config = AppConfig {
            node: NodeConfig {
                name: "Disaster Relief 1".to_string(),
                listen_address: "0.0.0.0:7070".to_string(),
                known_peers: vec![KnownPeer {
                    name: "Base Camp".to_string(),
                    address: "192.168.4.1:7070".to_string(),
                }],
            },
            ..Default::default()
        };

        toml::to_string_pretty(&example_config)
            .unwrap_or_else(|_| "# Failed to generate example config".to_string())
    }
}

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration loading error: {0}")]
    Loading(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment error: {0}")]
    Environment(String),

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
