//! CLI argument definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Default configuration file name, looked up in the user config directory
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

#[derive(Parser)]
#[command(name = "tether")]
#[command(about = "Drive an agent process over duplex JSON-RPC")]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (TOML, YAML or JSON)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Agent executable to launch
    #[arg(long, global = true, conflicts_with = "cli_url")]
    pub cli_path: Option<String>,

    /// Connect to a running agent: `port`, `host:port` or a URL
    #[arg(long, global = true)]
    pub cli_url: Option<String>,

    /// Log level passed to the agent and used for local logging
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check that the agent answers and speaks our protocol version
    Ping {
        /// Message the agent should echo back
        message: Option<String>,
    },

    /// Show agent version and authentication status
    Status,

    /// List the models the agent can use
    Models,

    /// Manage sessions known to the agent
    Sessions {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Send one prompt in a new session and print the reply
    Chat {
        prompt: String,

        /// Model to use for the session
        #[arg(long)]
        model: Option<String>,

        /// Resume this session instead of creating one
        #[arg(long)]
        resume: Option<String>,

        /// Approve every permission request
        #[arg(long)]
        allow_all: bool,

        /// Seconds to wait for the agent to go idle
        #[arg(long, default_value_t = 300)]
        timeout: u64,
    },
}

#[derive(Subcommand, Clone)]
pub enum SessionAction {
    /// List sessions
    List,

    /// Delete a session and its history
    Delete { session_id: String },
}

/// `<config dir>/tether/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("tether").join(DEFAULT_CONFIG_FILE))
}
