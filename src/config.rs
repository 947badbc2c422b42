// Client configuration: server address, application namespace, timeout.

use std::time::Duration;

use url::Url;

use crate::error::KnechtError;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for a [`Knecht`](crate::Knecht) client.
///
/// Set once per client; all requests read from it. The application
/// namespace is sent as the `app` query parameter on every call so one
/// server can host several independent applications.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base address of the game-state server.
    pub server: Url,
    /// Application namespace.
    pub app: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Config {
    /// Create a configuration from a server address and application
    /// namespace. Values are stored raw; percent-encoding happens exactly
    /// once, when a request URL is built.
    pub fn new(server: &str, app: impl Into<String>) -> Result<Self, KnechtError> {
        let server = Url::parse(server)
            .map_err(|e| KnechtError::Config(format!("invalid server address `{server}`: {e}")))?;
        if server.cannot_be_a_base() {
            return Err(KnechtError::Config(format!(
                "server address `{server}` cannot be used as a base URL"
            )));
        }
        Ok(Config {
            server,
            app: app.into(),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Override the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Load configuration from environment variables.
    ///
    /// - `KNECHT_SERVER` - base server address (required)
    /// - `KNECHT_APP` - application namespace (required)
    /// - `KNECHT_TIMEOUT_SECS` - per-request timeout in seconds (default: 30)
    pub fn from_env() -> Result<Self, KnechtError> {
        let server = std::env::var("KNECHT_SERVER")
            .map_err(|_| KnechtError::Config("KNECHT_SERVER is not set".to_string()))?;
        let app = std::env::var("KNECHT_APP")
            .map_err(|_| KnechtError::Config("KNECHT_APP is not set".to_string()))?;

        let mut config = Config::new(&server, app)?;
        if let Ok(secs) = std::env::var("KNECHT_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|_| {
                KnechtError::Config(format!("KNECHT_TIMEOUT_SECS `{secs}` is not a number"))
            })?;
            config.timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }
}
