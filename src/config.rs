//! Configuration Module
//!
//! Handles configuration loading from Java-style .properties files (KEY=VALUE format).

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Production WebSocket endpoint
pub const REAL_BASE_URL: &str = "wss://www.deribit.com/ws/api/v2/";

/// Testnet WebSocket endpoint
pub const TEST_BASE_URL: &str = "wss://test.deribit.com/ws/api/v2/";

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse property '{key}': {reason}")]
    ParseError { key: String, reason: String },
}

/// Client configuration
///
/// Property names: ADDR, API_KEY, SECRET_KEY, AUTO_RECONNECT, DEBUG_MODE,
/// CONNECT_ATTEMPTS, RETRY_DELAY_MS, DIAL_TIMEOUT_MS, REQUEST_TIMEOUT_MS,
/// CHANNELS, HEARTBEAT_INTERVAL
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub addr: String,
    pub api_key: String,
    pub secret_key: String,
    pub auto_reconnect: bool,
    pub debug_mode: bool,
    /// Dial attempts made by a single `start()` before giving up
    pub connect_attempts: u32,
    /// Fixed pause between two dial attempts
    pub retry_delay: Duration,
    pub dial_timeout: Duration,
    pub request_timeout: Duration,
    pub channels: Vec<String>,
    /// Seconds; `None` leaves the venue heartbeat disabled
    pub heartbeat_interval: Option<u64>,
}

/// Name used by the original public surface
pub type Configuration = Config;

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: TEST_BASE_URL.into(),
            api_key: String::new(),
            secret_key: String::new(),
            auto_reconnect: false,
            debug_mode: false,
            connect_attempts: 10,
            retry_delay: Duration::from_secs(1),
            dial_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            channels: Vec::new(),
            heartbeat_interval: None,
        }
    }
}

fn parse_number<T: std::str::FromStr>(
    key: &str,
    value: &str,
    kind: &str,
) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::ParseError {
        key: key.into(),
        reason: format!("invalid {}: {}", kind, value),
    })
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Config {
    /// Parse a Java-style .properties file into a HashMap.
    /// Skips blank lines and lines starting with '#'.
    fn parse_properties(content: &str) -> HashMap<String, String> {
        let mut map = HashMap::new();
        for line in content.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = trimmed.split_once('=') {
                map.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
        map
    }

    /// Load configuration from a .properties file (Java KEY=VALUE format).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_properties_str(&content)
    }

    /// Parse config from a properties-format string.
    pub fn from_properties_str(content: &str) -> Result<Self, ConfigError> {
        let props = Self::parse_properties(content);
        let defaults = Config::default();

        let millis = |key: &str, default: Duration| -> Result<Duration, ConfigError> {
            props
                .get(key)
                .map(|v| parse_number::<u64>(key, v, "u64").map(Duration::from_millis))
                .transpose()
                .map(|d| d.unwrap_or(default))
        };

        let connect_attempts = props
            .get("CONNECT_ATTEMPTS")
            .map(|v| parse_number::<u32>("CONNECT_ATTEMPTS", v, "u32"))
            .transpose()?
            .unwrap_or(defaults.connect_attempts);
        if connect_attempts == 0 {
            return Err(ConfigError::ParseError {
                key: "CONNECT_ATTEMPTS".into(),
                reason: "must be at least 1".into(),
            });
        }

        Ok(Config {
            addr: props.get("ADDR").cloned().unwrap_or(defaults.addr),
            api_key: props.get("API_KEY").cloned().unwrap_or(defaults.api_key),
            secret_key: props.get("SECRET_KEY").cloned().unwrap_or(defaults.secret_key),
            auto_reconnect: props
                .get("AUTO_RECONNECT")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.auto_reconnect),
            debug_mode: props
                .get("DEBUG_MODE")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.debug_mode),
            connect_attempts,
            retry_delay: millis("RETRY_DELAY_MS", defaults.retry_delay)?,
            dial_timeout: millis("DIAL_TIMEOUT_MS", defaults.dial_timeout)?,
            request_timeout: millis("REQUEST_TIMEOUT_MS", defaults.request_timeout)?,
            channels: props
                .get("CHANNELS")
                .map(|v| parse_list(v))
                .unwrap_or(defaults.channels),
            heartbeat_interval: props
                .get("HEARTBEAT_INTERVAL")
                .map(|v| parse_number::<u64>("HEARTBEAT_INTERVAL", v, "u64"))
                .transpose()?
                .or(defaults.heartbeat_interval),
        })
    }

    /// Load configuration from ./client.properties, falling back to defaults.
    pub fn load_or_default() -> Self {
        let path = "client.properties";
        if Path::new(path).exists() {
            match Self::load(path) {
                Ok(config) => {
                    log::info!("Loaded configuration from {}", path);
                    return config;
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {}", path, e);
                }
            }
        }

        log::warn!("No client.properties found, using defaults");
        Self::default()
    }

    /// Whether credentials for `public/auth` are present
    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.secret_key.is_empty()
    }

    /// Log all configuration parameters for debugging
    pub fn log_config(&self) {
        let mask = |s: &str| if s.is_empty() { "<unset>" } else { "****" };
        log::debug!("Configuration:");
        log::debug!("  addr: {}", self.addr);
        log::debug!("  api_key: {}", mask(&self.api_key));
        log::debug!("  secret_key: {}", mask(&self.secret_key));
        log::debug!("  auto_reconnect: {}", self.auto_reconnect);
        log::debug!("  debug_mode: {}", self.debug_mode);
        log::debug!("  connect_attempts: {}", self.connect_attempts);
        log::debug!("  retry_delay: {:?}", self.retry_delay);
        log::debug!("  dial_timeout: {:?}", self.dial_timeout);
        log::debug!("  request_timeout: {:?}", self.request_timeout);
        log::debug!("  channels: {:?}", self.channels);
        log::debug!("  heartbeat_interval: {:?}", self.heartbeat_interval);
    }
}
