//! Application configuration loaded from environment variables.
//!
//! # Configuration Hierarchy
//!
//! All configuration is loaded from environment variables with defaults that
//! match the public deployment. A `.env` file is honoured when present.
//!
//! # Upstream
//!
//! - `ALCHEMY_API_KEY`: Provider secret. When unset or empty every POST is
//!   answered with 500 and nothing is forwarded.
//! - `UPSTREAM_BASE_URL`: Base URL the key is appended to
//!   (default: `https://arb-mainnet.g.alchemy.com/v2`)
//!
//! # Admission Limits
//!
//! - `MAX_BODY_BYTES`: Request body ceiling (default: 200000)
//! - `RATE_LIMIT_WINDOW_MS`: Fixed window length (default: 10000)
//! - `RATE_LIMIT_MAX_REQUESTS`: Requests per client per window (default: 60, 0 = off)
//! - `UPSTREAM_TIMEOUT_MS`: Hard upstream deadline (default: 12000)
//!
//! # Logging
//!
//! `RUST_LOG` and `LOG_FORMAT` are read by the binary before configuration
//! loads, so configuration errors are logged in the chosen format.

use std::env;
use std::fmt;
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Default base URL of the upstream provider (Arbitrum One mainnet).
pub const DEFAULT_UPSTREAM_BASE_URL: &str = "https://arb-mainnet.g.alchemy.com/v2";

/// Default path the gate is mounted on.
pub const DEFAULT_RPC_PATH: &str = "/api/rpc";

/// Upstream provider secret.
///
/// `Debug` and `Display` are redacted so the key can't end up in logs via
/// `Config`'s derived `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey([redacted])")
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[redacted]")
    }
}

/// Application configuration loaded from environment variables.
///
/// # Example
///
/// ```rust,ignore
/// let config = Config::from_env()?;
/// println!("Gate will listen on {}{}", config.server_addr(), config.rpc_path);
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 3000)
    pub port: u16,

    /// Path the gate answers on (default: "/api/rpc")
    pub rpc_path: String,

    // =========================================================================
    // Upstream Configuration
    // =========================================================================
    /// Provider key; `None` leaves the upstream unconfigured
    pub upstream_api_key: Option<ApiKey>,

    /// Base URL the key is appended to as the last path segment
    pub upstream_base_url: String,

    /// Hard deadline for one upstream exchange, response body included
    pub upstream_timeout: Duration,

    // =========================================================================
    // Admission Control
    // =========================================================================
    /// Maximum request body size in bytes (default: 200000)
    pub max_body_bytes: usize,

    /// Fixed rate-limit window (default: 10s)
    pub rate_limit_window: Duration,

    /// Requests admitted per client per window (default: 60)
    /// Set to 0 to disable rate limiting
    pub rate_limit_max_requests: u32,

    /// Interval of the background sweep evicting expired counters (default: 60s)
    pub rate_limit_sweep_interval: Duration,

    /// Tracked-client count at which an inline sweep runs (default: 100000)
    pub rate_limit_max_clients: usize,

    /// JSON-RPC methods appended to the built-in whitelist
    pub extra_allowed_methods: Vec<String>,

    // =========================================================================
    // Security Configuration
    // =========================================================================
    /// Origin suffixes echoed back in `Access-Control-Allow-Origin`
    /// (default: [".vercel.app"]). Origins containing "localhost" are always accepted.
    pub cors_origin_suffixes: Vec<String>,

    /// Trusted proxy CIDR ranges. When non-empty, `X-Forwarded-For` is only
    /// honoured if the socket peer falls inside one of them.
    /// Default: Empty (trust all sources)
    pub trusted_proxies: Vec<String>,

    // =========================================================================
    // Health Payload
    // =========================================================================
    /// Service name reported on GET (default: "UluwatuSwap RPC proxy")
    pub service_name: String,

    /// Chain label reported on GET (default: "arbitrum-42161")
    pub chain_label: String,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Port for Prometheus metrics endpoint (default: 9090, 0 = disabled)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a value fails to parse or validation fails.
    pub fn from_env() -> AppResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let config = Self {
            // Server
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_env("PORT", 3000)?,
            rpc_path: env::var("RPC_PATH").unwrap_or_else(|_| DEFAULT_RPC_PATH.to_string()),

            // Upstream
            upstream_api_key: env::var("ALCHEMY_API_KEY")
                .ok()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .map(ApiKey),
            upstream_base_url: env::var("UPSTREAM_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_UPSTREAM_BASE_URL.to_string()),
            upstream_timeout: Duration::from_millis(Self::parse_env("UPSTREAM_TIMEOUT_MS", 12_000)?),

            // Admission control
            max_body_bytes: Self::parse_env("MAX_BODY_BYTES", 200_000)?,
            rate_limit_window: Duration::from_millis(Self::parse_env(
                "RATE_LIMIT_WINDOW_MS",
                10_000,
            )?),
            rate_limit_max_requests: Self::parse_env("RATE_LIMIT_MAX_REQUESTS", 60)?,
            rate_limit_sweep_interval: Duration::from_secs(Self::parse_env(
                "RATE_LIMIT_SWEEP_INTERVAL_SECS",
                60,
            )?),
            rate_limit_max_clients: Self::parse_env("RATE_LIMIT_MAX_CLIENTS", 100_000)?,
            extra_allowed_methods: Self::parse_list("RPC_EXTRA_METHODS", ""),

            // Security
            cors_origin_suffixes: Self::parse_list("CORS_ORIGIN_SUFFIXES", ".vercel.app"),
            trusted_proxies: Self::parse_list("TRUSTED_PROXIES", ""),

            // Health payload
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "UluwatuSwap RPC proxy".to_string()),
            chain_label: env::var("CHAIN_LABEL").unwrap_or_else(|_| "arbitrum-42161".to_string()),

            // Observability
            metrics_port: Self::parse_env("METRICS_PORT", 9090)?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if validation fails.
    pub fn validate(&self) -> AppResult<()> {
        if !self.rpc_path.starts_with('/') {
            return Err(AppError::Config(format!(
                "RPC_PATH must start with '/', got {:?}",
                self.rpc_path
            )));
        }

        if let Some(bad) = self.rpc_path.chars().find(|c| !is_path_char(*c)) {
            return Err(AppError::Config(format!(
                "RPC_PATH may only contain letters, digits and '/-_.~', got {bad:?} in {:?}",
                self.rpc_path
            )));
        }

        if self.max_body_bytes == 0 {
            return Err(AppError::Config(
                "MAX_BODY_BYTES must be greater than 0".to_string(),
            ));
        }

        if self.rate_limit_window.is_zero() {
            return Err(AppError::Config(
                "RATE_LIMIT_WINDOW_MS must be greater than 0".to_string(),
            ));
        }

        if self.upstream_timeout.is_zero() {
            return Err(AppError::Config(
                "UPSTREAM_TIMEOUT_MS must be greater than 0".to_string(),
            ));
        }

        if self.rate_limiting_enabled() && self.rate_limit_max_clients == 0 {
            return Err(AppError::Config(
                "RATE_LIMIT_MAX_CLIENTS must be greater than 0".to_string(),
            ));
        }

        if self.rate_limit_sweep_interval.is_zero() {
            return Err(AppError::Config(
                "RATE_LIMIT_SWEEP_INTERVAL_SECS must be greater than 0".to_string(),
            ));
        }

        if !self.upstream_base_url.starts_with("http://")
            && !self.upstream_base_url.starts_with("https://")
        {
            // The URL itself carries no secret, but keep the message generic anyway.
            return Err(AppError::Config(
                "UPSTREAM_BASE_URL must be an http(s) URL".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if rate limiting is enabled.
    pub fn rate_limiting_enabled(&self) -> bool {
        self.rate_limit_max_requests > 0
    }

    /// Check if an upstream key is present.
    pub fn upstream_configured(&self) -> bool {
        self.upstream_api_key.is_some()
    }

    /// Build the upstream URL from the base URL and the secret key.
    ///
    /// Returns `None` when no key is configured. The result contains the
    /// secret and must never be logged or returned to a client.
    pub fn upstream_url(&self) -> Option<String> {
        self.upstream_api_key.as_ref().map(|key| {
            format!(
                "{}/{}",
                self.upstream_base_url.trim_end_matches('/'),
                key.expose()
            )
        })
    }

    /// Check if Prometheus metrics export is enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port > 0
    }

    /// Get the metrics endpoint address.
    ///
    /// Returns `None` if metrics are disabled (port = 0).
    pub fn metrics_addr(&self) -> Option<std::net::SocketAddr> {
        self.metrics_enabled()
            .then(|| std::net::SocketAddr::from(([0, 0, 0, 0], self.metrics_port)))
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> AppResult<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .trim()
                .parse()
                .map_err(|e| AppError::Config(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    /// Parse a comma-separated list, dropping empty entries.
    fn parse_list(name: &str, default: &str) -> Vec<String> {
        split_list(&env::var(name).unwrap_or_else(|_| default.to_string()))
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Characters allowed in `RPC_PATH`. Route syntax (`{`, `}`, `*`, `:`) is
/// excluded so the path always mounts as a literal route.
fn is_path_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '/' | '-' | '_' | '.' | '~')
}

/// Default configuration for testing and development.
///
/// Production deployments should use `Config::from_env()` instead.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Server
            host: "0.0.0.0".to_string(),
            port: 3000,
            rpc_path: DEFAULT_RPC_PATH.to_string(),
            // Upstream
            upstream_api_key: None,
            upstream_base_url: DEFAULT_UPSTREAM_BASE_URL.to_string(),
            upstream_timeout: Duration::from_millis(12_000),
            // Admission control
            max_body_bytes: 200_000,
            rate_limit_window: Duration::from_millis(10_000),
            rate_limit_max_requests: 60,
            rate_limit_sweep_interval: Duration::from_secs(60),
            rate_limit_max_clients: 100_000,
            extra_allowed_methods: vec![],
            // Security
            cors_origin_suffixes: vec![".vercel.app".to_string()],
            trusted_proxies: vec![], // Empty = trust all
            // Health payload
            service_name: "UluwatuSwap RPC proxy".to_string(),
            chain_label: "arbitrum-42161".to_string(),
            // Observability
            metrics_port: 9090,
        }
    }
}
