//! `sessions list` and `sessions delete`

use tether_sdk::Client;

pub async fn list(client: &Client) -> anyhow::Result<()> {
    let sessions = client.list_sessions().await?;
    if sessions.is_empty() {
        println!("No sessions");
        return Ok(());
    }

    let last = client.get_last_session_id().await.unwrap_or_default();
    for session in sessions {
        let marker = if last.as_deref() == Some(session.session_id.as_str()) {
            "*"
        } else {
            " "
        };
        println!(
            "{} {:<40} {:<25} {}{}",
            marker,
            session.session_id,
            session.modified_time.as_deref().unwrap_or("-"),
            session.summary.as_deref().unwrap_or(""),
            if session.is_remote { " [remote]" } else { "" }
        );
    }
    Ok(())
}

pub async fn delete(client: &Client, session_id: &str) -> anyhow::Result<()> {
    client.delete_session(session_id).await?;
    println!("Deleted session {}", session_id);
    Ok(())
}
