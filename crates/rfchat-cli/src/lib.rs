//! rfchat CLI library
//!
//! Terminal front end for the rfchat peer link: configuration, the
//! interactive chat loop, and an in-process demo.

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod demo;
pub mod error;

pub use app::{ChatApp, ChatInput, Reply};
pub use cli::{Cli, Commands, TransportKind};
pub use config::{AppConfig, ConfigOverrides};
pub use error::{CliError, Result};
