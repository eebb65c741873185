//! `chat`: one prompt, one reply

use std::time::Duration;

use tether_sdk::{
    Client, MessageOptions, PermissionDecision, PermissionInvocation, PermissionRequest,
    SessionConfig, event_types,
};
use tracing::info;

pub struct ChatArgs<'a> {
    pub prompt: &'a str,
    pub model: Option<&'a str>,
    pub resume: Option<&'a str>,
    pub allow_all: bool,
    pub timeout: Duration,
}

pub async fn chat(client: &Client, args: ChatArgs<'_>) -> anyhow::Result<()> {
    let mut config = SessionConfig::new();
    if let Some(model) = args.model {
        config = config.with_model(model);
    }
    if args.allow_all {
        config = config.with_permission_handler(
            |request: PermissionRequest, _inv: PermissionInvocation| async move {
                info!("approving '{}' request", request.kind);
                Ok::<_, anyhow::Error>(PermissionDecision::approved())
            },
        );
    }

    let session = match args.resume {
        Some(session_id) => client.resume_session(session_id, config).await?,
        None => client.create_session(config).await?,
    };
    eprintln!("session {}", session.session_id());

    let _tools = session.on_event(event_types::TOOL_EXECUTION_START, |event| {
        if let Some(name) = event.data_str("toolName") {
            eprintln!("[tool] {}", name);
        }
        Ok(())
    })?;

    let reply = session
        .send_and_wait(MessageOptions::new(args.prompt), args.timeout)
        .await;
    let outcome = match reply {
        Ok(Some(message)) => {
            println!("{}", message.data_str("content").unwrap_or_default());
            Ok(())
        }
        Ok(None) => {
            eprintln!("(no reply)");
            Ok(())
        }
        Err(e) => Err(e.into()),
    };

    session.close().await;
    outcome
}
