//! Configuration loading and validation.
//!
//! Config is a JSON5 file read once at startup, then overlaid with
//! environment variables. Location: `~/.warden/warden.json`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON5 parsing error.
    #[error("Parse error: {0}")]
    Parse(#[from] json5::Error),

    /// Config validation error.
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Credential settings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Rate limiter settings.
    #[serde(default)]
    pub rate_limiter: RateLimiterConfig,

    /// Identity cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Persistence settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// # Errors
    ///
    /// Returns error if config cannot be loaded or parsed.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path.
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = json5::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a path.
    ///
    /// # Errors
    ///
    /// Returns error if serialization or file write fails.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config file path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        Self::state_dir().join("warden.json")
    }

    /// Get the Warden state directory.
    ///
    /// Uses `WARDEN_STATE_DIR` env var if set, otherwise `~/.warden`.
    #[must_use]
    pub fn state_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("WARDEN_STATE_DIR") {
            PathBuf::from(dir)
        } else if let Some(home) = dirs::home_dir() {
            home.join(".warden")
        } else {
            PathBuf::from(".warden")
        }
    }

    /// Apply overrides from the process environment.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    #[must_use]
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(addr) = lookup("WARDEN_ADDR") {
            self.server.addr = addr;
        }
        if let Some(env) = lookup("WARDEN_ENV") {
            self.server.env = env;
        }
        if let Some(secret) = lookup("WARDEN_JWT_SECRET") {
            self.auth.token.secret = Some(secret);
        }
        if let Some(issuer) = lookup("WARDEN_JWT_ISSUER") {
            self.auth.token.issuer = issuer;
        }
        if let Some(audience) = lookup("WARDEN_JWT_AUDIENCE") {
            self.auth.token.audience = audience;
        }
        if let Some(user) = lookup("WARDEN_BASIC_USER") {
            self.auth.basic.username = user;
        }
        if let Some(pass) = lookup("WARDEN_BASIC_PASS") {
            self.auth.basic.password = pass;
        }
        if let Some(enabled) = lookup("WARDEN_RATE_LIMITER_ENABLED") {
            self.rate_limiter.enabled = parse_flag(&enabled);
        }
        if let Some(enabled) = lookup("WARDEN_CACHE_ENABLED") {
            self.cache.enabled = parse_flag(&enabled);
        }
        if let Some(dir) = lookup("WARDEN_DATA_DIR") {
            self.store.path = Some(PathBuf::from(dir));
        }
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limiter.requests_per_window == 0 {
            return Err(ConfigError::Validation(
                "rateLimiter.requestsPerWindow must be at least 1".to_string(),
            ));
        }
        if self.rate_limiter.window_secs == 0 {
            return Err(ConfigError::Validation(
                "rateLimiter.windowSecs must be at least 1".to_string(),
            ));
        }
        if self.rate_limiter.sweep_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "rateLimiter.sweepIntervalSecs must be at least 1".to_string(),
            ));
        }
        if self.auth.token.issuer.is_empty() || self.auth.token.audience.is_empty() {
            return Err(ConfigError::Validation(
                "auth.token issuer and audience cannot be empty".to_string(),
            ));
        }
        if self.auth.token.expiry_hours == 0 {
            return Err(ConfigError::Validation(
                "auth.token.expiryHours must be at least 1".to_string(),
            ));
        }
        if self.server.request_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "server.requestTimeoutSecs must be at least 1".to_string(),
            ));
        }
        if self.store.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "store.timeoutMs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Listen address.
    #[serde(default = "default_addr")]
    pub addr: String,

    /// Deployment environment label reported by the health endpoint.
    #[serde(default = "default_env")]
    pub env: String,

    /// Upper bound on a single request, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Enable permissive CORS.
    #[serde(default = "default_true")]
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            env: default_env(),
            request_timeout_secs: default_request_timeout(),
            cors: true,
        }
    }
}

impl ServerConfig {
    /// Request timeout as a `Duration`.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_env() -> String {
    "dev".to_string()
}

const fn default_request_timeout() -> u64 {
    60
}

const fn default_true() -> bool {
    true
}

/// Credential configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    /// Bearer token settings.
    #[serde(default)]
    pub token: TokenConfig,

    /// Basic credential for operational endpoints.
    #[serde(default)]
    pub basic: BasicConfig,
}

/// Bearer token configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenConfig {
    /// HMAC signing secret. A random one is generated at startup if unset.
    #[serde(default)]
    pub secret: Option<String>,

    /// Expected `iss` claim.
    #[serde(default = "default_issuer")]
    pub issuer: String,

    /// Expected `aud` claim.
    #[serde(default = "default_issuer")]
    pub audience: String,

    /// Token lifetime in hours.
    #[serde(default = "default_expiry_hours")]
    pub expiry_hours: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            secret: None,
            issuer: default_issuer(),
            audience: default_issuer(),
            expiry_hours: default_expiry_hours(),
        }
    }
}

impl TokenConfig {
    /// Token lifetime as a `Duration`.
    #[must_use]
    pub const fn expiry(&self) -> Duration {
        Duration::from_secs(self.expiry_hours * 3600)
    }
}

fn default_issuer() -> String {
    "warden".to_string()
}

const fn default_expiry_hours() -> u64 {
    72
}

/// Basic credential configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicConfig {
    /// Expected username.
    #[serde(default = "default_basic")]
    pub username: String,

    /// Expected password.
    #[serde(default = "default_basic")]
    pub password: String,
}

impl Default for BasicConfig {
    fn default() -> Self {
        Self {
            username: default_basic(),
            password: default_basic(),
        }
    }
}

fn default_basic() -> String {
    "admin".to_string()
}

/// Fixed-window rate limiter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimiterConfig {
    /// Whether rate limiting is active.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Requests admitted per key per window.
    #[serde(default = "default_requests_per_window")]
    pub requests_per_window: u32,

    /// Window length in seconds.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// How often expired counters are swept, in seconds.
    #[serde(default = "default_sweep_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_window: default_requests_per_window(),
            window_secs: default_window_secs(),
            sweep_interval_secs: default_sweep_secs(),
        }
    }
}

impl RateLimiterConfig {
    /// Window length as a `Duration`.
    #[must_use]
    pub const fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Sweep interval as a `Duration`.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

const fn default_requests_per_window() -> u32 {
    20
}

const fn default_window_secs() -> u64 {
    5
}

const fn default_sweep_secs() -> u64 {
    60
}

/// Identity cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    /// Whether identity lookups go through the cache.
    #[serde(default)]
    pub enabled: bool,

    /// Upper bound on cached identities.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_entries: default_max_entries(),
        }
    }
}

const fn default_max_entries() -> usize {
    100_000
}

/// Persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    /// Data directory. Defaults to the platform data dir.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Upper bound on a single store call, in milliseconds.
    #[serde(default = "default_store_timeout")]
    pub timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            timeout_ms: default_store_timeout(),
        }
    }
}

impl StoreConfig {
    /// Store call timeout as a `Duration`.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Resolved data directory.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("warden")
        })
    }
}

const fn default_store_timeout() -> u64 {
    5000
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

/// Log format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format.
    #[default]
    Pretty,
    /// JSON format.
    Json,
}
