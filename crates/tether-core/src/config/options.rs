//! Client configuration model

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::connection::ServerAddress;
use crate::error::{TetherError, TetherResult};

/// Agent executable used when no `cli_path` is configured
pub const DEFAULT_CLI_PATH: &str = "copilot";

/// Log level passed to the agent when none is configured
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Levels the agent understands for `--log-level`
pub const LOG_LEVELS: [&str; 6] = ["none", "error", "warning", "info", "debug", "all"];

const DEFAULT_STARTUP_TIMEOUT_SECS: u64 = 30;

/// How to reach the agent, and how to launch it when the client owns it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    /// Agent executable; `.js` files are run through `node`
    pub cli_path: Option<String>,
    /// Arguments placed before the ones the client adds
    pub cli_args: Vec<String>,
    /// Working directory for the agent process
    pub cwd: Option<PathBuf>,
    /// Port for socket mode; 0 lets the agent choose
    pub port: u16,
    /// Talk over the child's stdin/stdout. Defaults to true unless
    /// `cli_url` is set.
    pub use_stdio: Option<bool>,
    /// Connect to an already running agent instead of spawning one
    pub cli_url: Option<String>,
    pub log_level: String,
    /// Connect on first use instead of requiring an explicit `start`
    pub auto_start: bool,
    /// Replaces the child's environment when set
    pub env: Option<HashMap<String, String>>,
    pub auth_token: Option<String>,
    /// Let the agent fall back to the logged-in user's credentials.
    /// Defaults to true unless `auth_token` is set.
    pub use_logged_in_user: Option<bool>,
    /// Caller-side bound on individual requests; unbounded when unset
    pub request_timeout_secs: Option<u64>,
    /// How long to wait for the agent to announce its port in socket mode
    pub startup_timeout_secs: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            cli_path: None,
            cli_args: Vec::new(),
            cwd: None,
            port: 0,
            use_stdio: None,
            cli_url: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            auto_start: true,
            env: None,
            auth_token: None,
            use_logged_in_user: None,
            request_timeout_secs: None,
            startup_timeout_secs: DEFAULT_STARTUP_TIMEOUT_SECS,
        }
    }
}

impl ClientOptions {
    pub fn with_cli_path(mut self, cli_path: impl Into<String>) -> Self {
        self.cli_path = Some(cli_path.into());
        self
    }

    pub fn with_cli_url(mut self, cli_url: impl Into<String>) -> Self {
        self.cli_url = Some(cli_url.into());
        self
    }

    pub fn with_cli_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cli_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Use a TCP port instead of stdio when spawning the agent.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self.use_stdio = Some(false);
        self
    }

    pub fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = Some(timeout.as_secs());
        self
    }

    pub fn uses_stdio(&self) -> bool {
        self.use_stdio.unwrap_or(self.cli_url.is_none())
    }

    pub fn uses_logged_in_user(&self) -> bool {
        self.use_logged_in_user
            .unwrap_or(self.auth_token.is_none())
    }

    pub fn cli_path_or_default(&self) -> &str {
        self.cli_path.as_deref().unwrap_or(DEFAULT_CLI_PATH)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    /// Parsed `cli_url`, if one is configured
    pub fn server_address(&self) -> TetherResult<Option<ServerAddress>> {
        self.cli_url.as_deref().map(ServerAddress::parse).transpose()
    }

    /// Reject contradictory combinations before anything is spawned.
    pub fn validate(&self) -> TetherResult<()> {
        if self.cli_url.is_some() {
            if self.use_stdio == Some(true) {
                return Err(TetherError::config(
                    "cli_url is mutually exclusive with use_stdio",
                ));
            }
            if self.cli_path.is_some() {
                return Err(TetherError::config(
                    "cli_url is mutually exclusive with cli_path",
                ));
            }
            if self.auth_token.is_some() || self.use_logged_in_user.is_some() {
                return Err(TetherError::config(
                    "auth_token and use_logged_in_user apply only to an agent the client launches",
                ));
            }
            self.server_address()?;
        }

        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(TetherError::config(format!(
                "Invalid log level '{}', expected one of: {}",
                self.log_level,
                LOG_LEVELS.join(", ")
            )));
        }

        if self.cli_path.as_deref().is_some_and(|p| p.trim().is_empty()) {
            return Err(TetherError::config("cli_path cannot be empty"));
        }
        if self.startup_timeout_secs == 0 {
            return Err(TetherError::config("startup_timeout_secs must be positive"));
        }
        if self.request_timeout_secs == Some(0) {
            return Err(TetherError::config("request_timeout_secs must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ClientOptions::default();
        assert!(options.uses_stdio());
        assert!(options.uses_logged_in_user());
        assert!(options.auto_start);
        assert_eq!(options.log_level, "info");
        assert_eq!(options.cli_path_or_default(), DEFAULT_CLI_PATH);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_cli_url_switches_off_stdio() {
        let options = ClientOptions::default().with_cli_url("localhost:8080");
        assert!(!options.uses_stdio());
        assert!(options.validate().is_ok());
        assert_eq!(options.server_address().unwrap().unwrap().port(), 8080);
    }

    #[test]
    fn test_cli_url_conflicts() {
        let mut options = ClientOptions::default().with_cli_url("8080");
        options.use_stdio = Some(true);
        assert!(matches!(options.validate(), Err(TetherError::Config { .. })));

        let options = ClientOptions::default()
            .with_cli_url("8080")
            .with_cli_path("/usr/bin/agent");
        assert!(matches!(options.validate(), Err(TetherError::Config { .. })));

        let options = ClientOptions::default()
            .with_cli_url("8080")
            .with_auth_token("t");
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_bad_cli_url_is_invalid_address() {
        let options = ClientOptions::default().with_cli_url("localhost:notaport");
        assert!(matches!(
            options.validate(),
            Err(TetherError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_rejects_unknown_log_level() {
        let options = ClientOptions::default().with_log_level("verbose");
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_auth_token_disables_logged_in_user_by_default() {
        let options = ClientOptions::default().with_auth_token("secret");
        assert!(!options.uses_logged_in_user());

        let mut options = options;
        options.use_logged_in_user = Some(true);
        assert!(options.uses_logged_in_user());
    }
}
