//! `ping`, `status` and `models`

use tether_sdk::Client;

pub async fn ping(client: &Client, message: Option<&str>) -> anyhow::Result<()> {
    let started = std::time::Instant::now();
    let pong = client.ping(message).await?;
    println!(
        "pong: {:?} (protocol {}, {}ms)",
        pong.message,
        pong.protocol_version
            .map(|v| v.to_string())
            .unwrap_or_else(|| "unknown".to_string()),
        started.elapsed().as_millis()
    );
    Ok(())
}

pub async fn status(client: &Client) -> anyhow::Result<()> {
    let status = client.get_status().await?;
    let auth = client.get_auth_status().await?;

    println!("Agent version:    {}", status.version);
    if let Some(version) = status.protocol_version {
        println!("Protocol version: {}", version);
    }
    println!("Connection:       {}", client.state());
    if auth.is_authenticated {
        println!(
            "Authenticated:    yes ({}{})",
            auth.auth_type.as_deref().unwrap_or("unknown"),
            auth.login
                .as_deref()
                .map(|login| format!(" as {}", login))
                .unwrap_or_default()
        );
    } else {
        println!(
            "Authenticated:    no{}",
            auth.status_message
                .as_deref()
                .map(|msg| format!(" ({})", msg))
                .unwrap_or_default()
        );
    }
    Ok(())
}

pub async fn models(client: &Client) -> anyhow::Result<()> {
    let models = client.list_models().await?;
    if models.is_empty() {
        println!("No models available");
        return Ok(());
    }
    for model in models {
        match model.default_reasoning_effort {
            Some(effort) => println!("{:<32} {} (reasoning: {})", model.id, model.name, effort),
            None => println!("{:<32} {}", model.id, model.name),
        }
    }
    Ok(())
}
