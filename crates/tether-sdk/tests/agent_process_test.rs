//! Launch failures against real processes

use tether_sdk::{Client, ClientOptions, ConnectionState, TetherError};

#[tokio::test]
async fn missing_binary_is_cli_not_found() {
    let client = Client::new(
        ClientOptions::default().with_cli_path("/nonexistent/tether-test-agent"),
    )
    .unwrap();

    let err = client.start().await.unwrap_err();
    assert!(
        matches!(&err, TetherError::CliNotFound { path } if path == "/nonexistent/tether-test-agent"),
        "{err}"
    );
    assert_eq!(client.state(), ConnectionState::Error);
}

#[cfg(unix)]
#[tokio::test]
async fn early_exit_reports_agent_stderr() {
    // The client's own flags land in $0.. and are ignored by the script
    let options = ClientOptions::default()
        .with_cli_path("sh")
        .with_cli_args(["-c", "echo 'fatal: no credentials configured' >&2; exit 3"]);
    let client = Client::new(options).unwrap();

    let err = client.start().await.unwrap_err();
    match &err {
        TetherError::ProcessExited { stderr, .. } => {
            assert!(stderr.contains("no credentials configured"), "{stderr}");
        }
        other => panic!("expected ProcessExited, got {other:?}"),
    }
    assert!(err.to_string().contains("no credentials configured"));
}

#[cfg(unix)]
#[tokio::test]
async fn socket_mode_surfaces_exit_before_port_announcement() {
    let options = ClientOptions::default()
        .with_cli_path("sh")
        .with_cli_args(["-c", "echo 'port 0 is reserved' >&2; exit 1"])
        .with_port(0);
    let client = Client::new(options).unwrap();

    let err = client.start().await.unwrap_err();
    assert!(
        matches!(err, TetherError::ProcessExited { .. }),
        "{err:?}"
    );
}
