//! Server address parsing
//!
//! Accepted forms:
//! - `8080` → `http://localhost:8080`
//! - `host:9090` → `https://host:9090`
//! - `scheme://host[:port]` → kept verbatim

use std::fmt;

use url::Url;

use crate::error::{TetherError, TetherResult};

/// Host used when only a port is given
pub const DEFAULT_HOST: &str = "localhost";

/// A normalized address of an already-running agent server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    url: String,
    host: String,
    port: u16,
    secure: bool,
}

impl ServerAddress {
    /// Parse any of the accepted address forms.
    pub fn parse(input: &str) -> TetherResult<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(TetherError::invalid_address(input, "address is empty"));
        }

        // Checked first: `Url::parse("host:9090")` would read `host` as a scheme.
        if trimmed.contains("://") {
            return Self::parse_url(trimmed);
        }

        if trimmed.bytes().all(|b| b.is_ascii_digit()) {
            let port = parse_port(trimmed, trimmed)?;
            return Ok(Self {
                url: format!("http://{}:{}", DEFAULT_HOST, port),
                host: DEFAULT_HOST.to_string(),
                port,
                secure: false,
            });
        }

        let (host, port) = trimmed.rsplit_once(':').ok_or_else(|| {
            TetherError::invalid_address(trimmed, "expected a port, host:port or a URL")
        })?;
        if host.is_empty() {
            return Err(TetherError::invalid_address(trimmed, "host is empty"));
        }
        let port = parse_port(trimmed, port)?;
        Ok(Self {
            url: format!("https://{}:{}", host, port),
            host: host.to_string(),
            port,
            secure: true,
        })
    }

    fn parse_url(input: &str) -> TetherResult<Self> {
        let parsed =
            Url::parse(input).map_err(|e| TetherError::invalid_address(input, e.to_string()))?;
        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| TetherError::invalid_address(input, "URL has no host"))?;
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| TetherError::invalid_address(input, "URL has no port"))?;

        Ok(Self {
            url: input.to_string(),
            host: host.to_string(),
            port,
            secure: matches!(parsed.scheme(), "https" | "wss"),
        })
    }

    /// The normalized URL string
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether the scheme is a secure one
    pub fn is_secure(&self) -> bool {
        self.secure
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

impl std::str::FromStr for ServerAddress {
    type Err = TetherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn parse_port(input: &str, port: &str) -> TetherResult<u16> {
    match port.parse::<u16>() {
        Ok(0) | Err(_) => Err(TetherError::invalid_address(
            input,
            format!("invalid port '{}'", port),
        )),
        Ok(port) => Ok(port),
    }
}
