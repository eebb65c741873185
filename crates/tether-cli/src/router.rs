//! Command routing logic for CLI

use std::time::Duration;

use crate::args::{Cli, Commands, SessionAction};
use crate::commands::{self, chat::ChatArgs};

/// Route CLI commands to their respective handlers
pub async fn route(cli: Cli) -> anyhow::Result<()> {
    let options = commands::resolve_options(&cli)?;
    tracing::debug!(
        cli_path = ?options.cli_path,
        cli_url = ?options.cli_url,
        log_level = %options.log_level,
        "resolved client options"
    );
    let client = commands::connect(options).await?;

    let outcome = match &cli.command {
        Commands::Ping { message } => commands::query::ping(&client, message.as_deref()).await,
        Commands::Status => commands::query::status(&client).await,
        Commands::Models => commands::query::models(&client).await,
        Commands::Sessions { action } => match action {
            SessionAction::List => commands::sessions::list(&client).await,
            SessionAction::Delete { session_id } => {
                commands::sessions::delete(&client, session_id).await
            }
        },
        Commands::Chat {
            prompt,
            model,
            resume,
            allow_all,
            timeout,
        } => {
            commands::chat::chat(
                &client,
                ChatArgs {
                    prompt,
                    model: model.as_deref(),
                    resume: resume.as_deref(),
                    allow_all: *allow_all,
                    timeout: Duration::from_secs(*timeout),
                },
            )
            .await
        }
    };

    commands::disconnect(client).await;
    outcome
}
