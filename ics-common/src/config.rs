//! Bootstrap configuration loading and vardata directory resolution
//!
//! Sources, highest priority first:
//! 1. Command-line argument
//! 2. Environment variable (`ICS_CONFIG`, `ICS_VARDATA`)
//! 3. TOML config file
//! 4. OS-dependent compiled default
//!
//! A missing config file is not an error: a warning is logged and the
//! built-in defaults are used.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming the TOML config file
pub const CONFIG_ENV_VAR: &str = "ICS_CONFIG";

/// Environment variable naming the vardata directory
pub const VARDATA_ENV_VAR: &str = "ICS_VARDATA";

/// Bootstrap configuration loaded from TOML file
///
/// Read once at startup; the service must restart to pick up changes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Root of the durable store (`{vardata}/database/{kind}`)
    pub vardata_directory: Option<PathBuf>,

    /// HTTP listen address
    pub bind_address: String,

    /// HTTP listen port
    pub port: u16,

    /// Outbound proxy for job status callbacks
    pub http_proxy: HttpProxyConfig,

    /// Outbound callback timeouts and retry timing
    pub callbacks: CallbackConfig,

    /// Producer supervision cadence
    pub supervision: SupervisionConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            vardata_directory: None,
            bind_address: "127.0.0.1".to_string(),
            port: 8083,
            http_proxy: HttpProxyConfig::default(),
            callbacks: CallbackConfig::default(),
            supervision: SupervisionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// HTTP proxy settings. Port 0 or an empty host disables the proxy.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HttpProxyConfig {
    pub host: String,
    pub port: u16,
}

impl HttpProxyConfig {
    /// Proxy URL if one is configured
    pub fn proxy_url(&self) -> Option<String> {
        if self.port > 0 && !self.host.is_empty() {
            Some(format!("http://{}:{}", self.host, self.port))
        } else {
            None
        }
    }
}

/// Outbound callback settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CallbackConfig {
    /// Per-request timeout
    pub request_timeout_ms: u64,
    /// TCP connect timeout
    pub connect_timeout_ms: u64,
    /// Base delay shared by every callback retry policy
    pub retry_base_delay_ms: u64,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
            connect_timeout_ms: 10_000,
            retry_base_delay_ms: 1_000,
        }
    }
}

impl CallbackConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

/// Producer supervision settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SupervisionConfig {
    /// Seconds between two supervision rounds
    pub interval_secs: u64,
    /// Consecutive failed supervision calls before a producer is dead
    pub dead_threshold: u32,
}

impl Default for SupervisionConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            dead_threshold: 3,
        }
    }
}

impl SupervisionConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl TomlConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
    }

    /// Load configuration from `path`.
    ///
    /// `None` or a non-existent file yields the defaults. A file that
    /// exists but cannot be parsed is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            warn!("No config file found, using built-in defaults");
            return Ok(Self::default());
        };

        if !path.exists() {
            warn!(path = %path.display(), "Config file missing, using built-in defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }
}

/// Locate the config file: CLI argument, then `ICS_CONFIG`, then the
/// platform config locations. Returns `None` when nothing is found.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(path));
    }

    // Priority 3: Platform locations
    let user_config = dirs::config_dir().map(|d| d.join("ics").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    let system_config = PathBuf::from("/etc/ics/config.toml");
    if cfg!(unix) && system_config.exists() {
        return Some(system_config);
    }

    None
}

/// Resolve the vardata directory following the standard priority order
pub fn resolve_vardata_directory(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(VARDATA_ENV_VAR) {
        return PathBuf::from(path);
    }

    // Priority 3: TOML config file
    if let Some(path) = &config.vardata_directory {
        return path.clone();
    }

    // Priority 4: OS-dependent compiled default
    default_vardata_directory()
}

/// OS-dependent default vardata directory
fn default_vardata_directory() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("ics"))
        .unwrap_or_else(|| PathBuf::from("/var/lib/ics"))
}

/// Directory holding the persisted entities of one kind
pub fn database_directory(vardata: &Path, entity_kind: &str) -> PathBuf {
    vardata.join("database").join(entity_kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.port, 8083);
        assert_eq!(config.callbacks.retry_base_delay(), Duration::from_secs(1));
        assert_eq!(config.supervision.dead_threshold, 3);
        assert!(config.http_proxy.proxy_url().is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = TomlConfig::from_toml_str(
            r#"
            port = 9000

            [http_proxy]
            host = "proxy.local"
            port = 3128
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.bind_address, "127.0.0.1");
        assert_eq!(config.http_proxy.proxy_url().as_deref(), Some("http://proxy.local:3128"));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let result = TomlConfig::from_toml_str("port = \"not a number\"");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_database_directory_layout() {
        let dir = database_directory(Path::new("/var/ics"), "infotypes");
        assert_eq!(dir, PathBuf::from("/var/ics/database/infotypes"));
    }
}
