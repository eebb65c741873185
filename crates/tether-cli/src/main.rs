//! Tether CLI application
//!
//! Small front end over the tether SDK for poking at an agent from a shell.
//!
//! ```bash
//! tether ping
//! tether --cli-url localhost:9000 sessions list
//! tether chat --allow-all "Summarize the README"
//! ```
//!
//! Options come from `--config` (or `<config dir>/tether/config.toml`),
//! then `TETHER_*` environment variables, then flags.

mod args;
mod commands;
mod router;

use clap::Parser;

use args::Cli;


#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise follow --log-level, defaulting to warnings only
    let fallback = cli
        .log_level
        .as_deref()
        .map(local_filter)
        .unwrap_or("warn");
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(fallback)),
        )
        .with_writer(std::io::stderr)
        .init();

    router::route(cli).await
}

/// Map the agent's log level names onto tracing filter directives.
fn local_filter(level: &str) -> &'static str {
    match level {
        "none" => "off",
        "error" => "error",
        "warning" => "warn",
        "info" => "info",
        "debug" => "debug",
        "all" => "trace",
        _ => "warn",
    }
}
