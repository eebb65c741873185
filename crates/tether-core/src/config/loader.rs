//! Loading `ClientOptions` from files and the environment

use std::fs;
use std::path::Path;

use super::options::ClientOptions;
use crate::error::{TetherError, TetherResult};

pub const ENV_CLI_PATH: &str = "TETHER_CLI_PATH";
pub const ENV_CLI_URL: &str = "TETHER_CLI_URL";
pub const ENV_LOG_LEVEL: &str = "TETHER_LOG_LEVEL";
pub const ENV_AUTH_TOKEN: &str = "TETHER_AUTH_TOKEN";
pub const ENV_PORT: &str = "TETHER_PORT";

/// Load options from a file
///
/// The format follows the extension: `.toml`, `.yaml`/`.yml`, anything else
/// is read as JSON. A missing file yields the defaults.
pub fn load_from_file(path: &Path) -> TetherResult<ClientOptions> {
    if !path.exists() {
        return Ok(ClientOptions::default());
    }

    let content = fs::read_to_string(path).map_err(|e| {
        TetherError::config(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    let options = match path.extension().and_then(|s| s.to_str()) {
        Some("toml") => toml::from_str(&content).map_err(|e| {
            TetherError::config(format!(
                "Failed to parse TOML config '{}': {}",
                path.display(),
                e
            ))
        })?,
        Some("yaml") | Some("yml") => serde_yaml::from_str(&content).map_err(|e| {
            TetherError::config(format!(
                "Failed to parse YAML config '{}': {}",
                path.display(),
                e
            ))
        })?,
        _ => serde_json::from_str(&content).map_err(|e| {
            TetherError::config(format!(
                "Failed to parse JSON config '{}': {}",
                path.display(),
                e
            ))
        })?,
    };

    Ok(options)
}

/// Overlay `TETHER_*` variables onto `options`.
///
/// `lookup` returns the value of a variable, which keeps tests away from the
/// process environment. Empty values are ignored.
pub fn apply_env_overrides<F>(options: &mut ClientOptions, lookup: F) -> TetherResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

    if let Some(cli_path) = var(ENV_CLI_PATH) {
        options.cli_path = Some(cli_path);
    }
    if let Some(cli_url) = var(ENV_CLI_URL) {
        options.cli_url = Some(cli_url);
    }
    if let Some(level) = var(ENV_LOG_LEVEL) {
        options.log_level = level;
    }
    if let Some(token) = var(ENV_AUTH_TOKEN) {
        options.auth_token = Some(token);
    }
    if let Some(port) = var(ENV_PORT) {
        options.port = port
            .trim()
            .parse()
            .map_err(|_| TetherError::config(format!("Invalid {} value: {}", ENV_PORT, port)))?;
        options.use_stdio = Some(false);
    }
    Ok(())
}

/// `apply_env_overrides` against the process environment
pub fn apply_process_env(options: &mut ClientOptions) -> TetherResult<()> {
    apply_env_overrides(options, |name| std::env::var(name).ok())
}
