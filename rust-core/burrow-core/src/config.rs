//! # Configuration
//!
//! Server settings with defaults, optionally overridden from `BURROW_`
//! prefixed environment variables, and the runtime environment profile.
//!
//! | Variable | Field |
//! |---|---|
//! | `BURROW_HOST` | `host` |
//! | `BURROW_PORT` | `port` |
//! | `BURROW_MAX_BODY_SIZE` | `max_body_size` (bytes) |
//! | `BURROW_REQUEST_TIMEOUT_MS` | `request_timeout` |
//! | `BURROW_SHUTDOWN_TIMEOUT_MS` | `shutdown_timeout` |
//! | `BURROW_KEEP_ALIVE` | `keep_alive` |
//! | `BURROW_ENV` | [`Environment::current`] |

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

/// Prefix shared by every configuration variable
pub const ENV_PREFIX: &str = "BURROW_";

/// HTTP server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,
    /// Port to bind
    pub port: u16,
    /// Max request body size in bytes
    pub max_body_size: usize,
    /// Time allowed for one request to be dispatched
    pub request_timeout: Duration,
    /// Time allowed for in-flight connections to finish on shutdown
    pub shutdown_timeout: Duration,
    /// Enable keep-alive connections
    pub keep_alive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_body_size: 1024 * 1024,
            request_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(10),
            keep_alive: true,
        }
    }
}

/// Raw overrides as read from the environment
#[derive(Debug, Default, Deserialize)]
struct EnvOverrides {
    host: Option<String>,
    port: Option<u16>,
    max_body_size: Option<usize>,
    request_timeout_ms: Option<u64>,
    shutdown_timeout_ms: Option<u64>,
    keep_alive: Option<bool>,
}

impl ServerConfig {
    /// Defaults overridden by `BURROW_*` environment variables
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if a variable is set but does not parse
    pub fn from_env() -> Result<Self> {
        let overrides: EnvOverrides = envy::prefixed(ENV_PREFIX).from_env()?;
        Ok(Self::default().apply(overrides))
    }

    /// Like [`from_env`](Self::from_env), reading from explicit `(name, value)` pairs
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if a variable is set but does not parse
    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let overrides: EnvOverrides = envy::prefixed(ENV_PREFIX).from_iter(vars)?;
        Ok(Self::default().apply(overrides))
    }

    fn apply(mut self, overrides: EnvOverrides) -> Self {
        if let Some(host) = overrides.host {
            self.host = host;
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(max) = overrides.max_body_size {
            self.max_body_size = max;
        }
        if let Some(ms) = overrides.request_timeout_ms {
            self.request_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = overrides.shutdown_timeout_ms {
            self.shutdown_timeout = Duration::from_millis(ms);
        }
        if let Some(keep_alive) = overrides.keep_alive {
            self.keep_alive = keep_alive;
        }
        self
    }

    /// Set the bind host
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the bind port
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the max request body size
    #[must_use]
    pub const fn with_max_body_size(mut self, bytes: usize) -> Self {
        self.max_body_size = bytes;
        self
    }

    /// Set the per-request timeout
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the graceful shutdown timeout
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Resolve `host:port` to a socket address
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the host does not resolve
    pub fn address(&self) -> Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| Error::Config(format!("cannot resolve {}:{}", self.host, self.port)))
    }
}

/// Environment profile, read from `BURROW_ENV`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    /// Error details are shown to clients
    Development,
    /// Error details are masked
    Production,
    /// Any other name
    Custom(String),
}

impl Environment {
    /// Detect the current environment; unset means production
    #[must_use]
    pub fn current() -> Self {
        Self::from_value(std::env::var(format!("{ENV_PREFIX}ENV")).ok().as_deref())
    }

    /// Classify a raw `BURROW_ENV` value
    #[must_use]
    pub fn from_value(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("production" | "prod") => Self::Production,
            Some("development" | "dev") => Self::Development,
            Some(other) => Self::Custom(other.to_string()),
        }
    }

    /// Whether this is the development profile
    #[must_use]
    pub const fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }

    /// Whether this is the production profile
    #[must_use]
    pub const fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Profile name
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::current()
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
