//! Command implementations

pub mod chat;
pub mod query;
pub mod sessions;

use anyhow::Context;
use tether_core::config::{self, ClientOptions};
use tether_sdk::Client;

use crate::args::{self, Cli};

/// Options from the config file, then `TETHER_*` variables, then flags
pub fn resolve_options(cli: &Cli) -> anyhow::Result<ClientOptions> {
    let mut options = match cli.config.clone().or_else(args::default_config_path) {
        Some(path) => config::load_from_file(&path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ClientOptions::default(),
    };
    config::apply_process_env(&mut options)?;

    if let Some(cli_path) = &cli.cli_path {
        options.cli_path = Some(cli_path.clone());
        options.cli_url = None;
    }
    if let Some(cli_url) = &cli.cli_url {
        options.cli_url = Some(cli_url.clone());
        options.cli_path = None;
    }
    if let Some(level) = &cli.log_level {
        options.log_level = level.clone();
    }
    Ok(options)
}

/// A started client
pub async fn connect(options: ClientOptions) -> anyhow::Result<Client> {
    let client = Client::new(options)?;
    client.start().await.context("starting agent")?;
    Ok(client)
}

/// Close open sessions and stop the agent.
pub async fn disconnect(client: Client) {
    client.stop().await;
}
