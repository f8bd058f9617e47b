//! Error handling for the rfchat CLI

use thiserror::Error;

use crate::config::ConfigError;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Link error: {0}")]
    Link(#[from] rfchat_link::LinkError),

    #[error("Transport error: {0}")]
    Transport(#[from] rfchat_link::TransportError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Demo failed: {0}")]
    Demo(String),

    #[error("Feature not available: {0}")]
    FeatureNotAvailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
