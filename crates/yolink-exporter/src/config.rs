//! Configuration management for the exporter.
//!
//! Loads settings from a TOML file or falls back to defaults. Credentials
//! resolve with precedence CLI flag > environment variable > config file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Default config file path
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Environment variable holding the API key
pub const API_KEY_ENV: &str = "YOLINK_API_KEY";

/// Environment variable holding the API secret
pub const API_SECRET_ENV: &str = "YOLINK_SECRET";

/// Top-level exporter configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub scrape: ScrapeConfig,
}

/// HTTP server bind settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Upstream YoLink API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API base URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// API key (UAID); may instead come from a flag or the environment
    #[serde(default)]
    pub key: String,

    /// API secret; may instead come from a flag or the environment
    #[serde(default)]
    pub secret: String,
}

/// Cache staleness settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeConfig {
    /// Cached device data older than this is refreshed on the next scrape
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_endpoint() -> String {
    "https://api.yosmart.com".to_string()
}

fn default_interval_secs() -> u64 {
    60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            key: String::new(),
            secret: String::new(),
        }
    }
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Address the HTTP server binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Cache staleness threshold.
    pub fn scrape_interval(&self) -> Duration {
        Duration::from_secs(self.scrape.interval_secs)
    }
}

/// Resolve a credential with precedence: CLI flag > environment variable >
/// config file. Empty values at one level fall through to the next.
pub fn resolve_credential(flag: Option<String>, env_var: &str, file_value: &str) -> String {
    if let Some(value) = flag {
        if !value.is_empty() {
            return value;
        }
    }
    if let Ok(value) = std::env::var(env_var) {
        if !value.is_empty() {
            return value;
        }
    }
    file_value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.api.endpoint, "https://api.yosmart.com");
        assert!(config.api.key.is_empty());
        assert!(config.api.secret.is_empty());
        assert_eq!(config.scrape.interval_secs, 60);
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.scrape_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 9100

            [api]
            key = "uaid"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.api.key, "uaid");
        assert_eq!(config.api.endpoint, "https://api.yosmart.com");
        assert_eq!(config.scrape.interval_secs, 60);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = Config::load(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[scrape]\ninterval_secs = 30\n\n[api]\nsecret = \"s3cret\"\n"
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.scrape.interval_secs, 30);
        assert_eq!(config.api.secret, "s3cret");
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_load_rejects_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not valid toml [").unwrap();
        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_credential_precedence_flag_wins() {
        std::env::set_var("YOLINK_TEST_CRED_FLAG", "from-env");
        let value = resolve_credential(
            Some("from-flag".to_string()),
            "YOLINK_TEST_CRED_FLAG",
            "from-file",
        );
        assert_eq!(value, "from-flag");
        std::env::remove_var("YOLINK_TEST_CRED_FLAG");
    }

    #[test]
    fn test_credential_precedence_env_over_file() {
        std::env::set_var("YOLINK_TEST_CRED_ENV", "from-env");
        let value = resolve_credential(None, "YOLINK_TEST_CRED_ENV", "from-file");
        assert_eq!(value, "from-env");
        std::env::remove_var("YOLINK_TEST_CRED_ENV");
    }

    #[test]
    fn test_credential_falls_back_to_file() {
        let value = resolve_credential(None, "YOLINK_TEST_CRED_UNSET", "from-file");
        assert_eq!(value, "from-file");
    }

    #[test]
    fn test_empty_flag_falls_through() {
        let value = resolve_credential(Some(String::new()), "YOLINK_TEST_CRED_EMPTY", "from-file");
        assert_eq!(value, "from-file");
    }
}
