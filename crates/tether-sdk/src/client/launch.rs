//! Building the agent command line from `ClientOptions`

use tether_core::config::ClientOptions;
use tether_core::connection::{ConnectTarget, SpawnMode, SpawnSpec};
use tether_core::error::TetherResult;

/// Environment variable the auth token is handed over in
pub const AUTH_TOKEN_ENV: &str = "TETHER_AUTH_TOKEN";

/// Arguments the client passes after the user's `cli_args`
pub fn agent_args(options: &ClientOptions) -> Vec<String> {
    let mut args = options.cli_args.clone();
    args.push("--server".to_string());
    args.push("--log-level".to_string());
    args.push(options.log_level.clone());

    if options.uses_stdio() {
        args.push("--stdio".to_string());
    } else if options.port > 0 {
        args.push("--port".to_string());
        args.push(options.port.to_string());
    }

    if options.auth_token.is_some() {
        args.push("--auth-token-env".to_string());
        args.push(AUTH_TOKEN_ENV.to_string());
    }
    if !options.uses_logged_in_user() {
        args.push("--no-auto-login".to_string());
    }
    args
}

/// Program and full argument vector. `.js` entry points run under `node`.
pub fn resolve_command(cli_path: &str, args: Vec<String>) -> (String, Vec<String>) {
    if cli_path.to_ascii_lowercase().ends_with(".js") {
        let mut node_args = Vec::with_capacity(args.len() + 1);
        node_args.push(cli_path.to_string());
        node_args.extend(args);
        ("node".to_string(), node_args)
    } else {
        (cli_path.to_string(), args)
    }
}

/// How to launch the agent described by `options`
pub fn spawn_spec(options: &ClientOptions) -> SpawnSpec {
    let (program, args) = resolve_command(options.cli_path_or_default(), agent_args(options));
    let mode = if options.uses_stdio() {
        SpawnMode::Stdio
    } else {
        SpawnMode::Socket {
            startup_timeout: options.startup_timeout(),
        }
    };

    let mut spec = SpawnSpec::new(program, args).with_mode(mode);
    spec.cwd = options.cwd.clone();
    spec.env = options.env.clone();
    if let Some(token) = &options.auth_token {
        spec.extra_env
            .push((AUTH_TOKEN_ENV.to_string(), token.clone()));
    }
    spec
}

/// Spawn the agent, or dial `cli_url` when one is configured
pub fn connect_target(options: &ClientOptions) -> TetherResult<ConnectTarget> {
    Ok(match options.server_address()? {
        Some(address) => ConnectTarget::Remote(address),
        None => ConnectTarget::Spawn(spawn_spec(options)),
    })
}
