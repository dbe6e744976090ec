//! Configuration module for zurg-edge
//!
//! Supports configuration via:
//! - YAML/TOML/JSON config files
//! - Environment variables (with ZURG_EDGE_ prefix)
//! - The variable names existing worker deployments already use
//!   (`ZURG_BASE_URL`, `WORKER_USERNAME`, `WORKER_PASSWORD`)
//!
//! This is the process configuration. The rewrite rules live in the config
//! store and can change at runtime; see [`crate::store`].

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Also write JSON logs to this file
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Base URL of the Zurg WebDAV server. Every request fails with 500
    /// while this is unset.
    #[serde(default)]
    pub upstream_url: Option<String>,

    /// Largest request body buffered for forwarding, and largest
    /// multi-status body buffered for rewriting
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Basic auth in front of the proxy
    #[serde(default)]
    pub auth: AuthConfig,

    /// Where rewrite rules are persisted
    #[serde(default)]
    pub store: StoreConfig,

    /// Metrics settings
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Basic auth configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Realm sent with the 401 challenge
    #[serde(default = "default_realm")]
    pub realm: String,
}

/// Config store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    File,
    Memory,
}

/// Config store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub kind: StoreKind,

    /// Directory holding `proxy-config.json`
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable the Prometheus exporter
    #[serde(default)]
    pub enabled: bool,

    /// Address of the exporter's own listener
    #[serde(default = "default_metrics_addr")]
    pub listen_addr: String,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_body_bytes() -> usize {
    64 * 1024 * 1024
}

fn default_realm() -> String {
    "Zurg RFC1123 Proxy".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_metrics_addr() -> String {
    "127.0.0.1:9464".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            realm: default_realm(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::default(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: default_metrics_addr(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            log_file: None,
            upstream_url: None,
            max_body_bytes: default_max_body_bytes(),
            auth: AuthConfig::default(),
            store: StoreConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl AuthConfig {
    /// Credentials to enforce; `None` when either half is missing
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => Some((user, pass)),
            _ => None,
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self> {
        // Try to load .env file if present
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            // Start with defaults
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // Load from config file if present
            .add_source(config::File::with_name("config/zurg-edge").required(false))
            .add_source(config::File::with_name("/etc/zurg-edge/config").required(false))
            // Override with environment variables (ZURG_EDGE_ prefix)
            .add_source(
                config::Environment::with_prefix("ZURG_EDGE")
                    .separator("__")
                    .try_parsing(true),
            )
            // Variable names used by existing deployments win last
            .set_override_option("upstream_url", non_empty_env("ZURG_BASE_URL"))?
            .set_override_option("auth.username", non_empty_env("WORKER_USERNAME"))?
            .set_override_option("auth.password", non_empty_env("WORKER_PASSWORD"))?
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app_config.validate()?;

        Ok(app_config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("Port cannot be 0");
        }

        if self.max_body_bytes == 0 {
            anyhow::bail!("max_body_bytes cannot be 0");
        }

        if let Some(upstream) = &self.upstream_url {
            let url = url::Url::parse(upstream)
                .with_context(|| format!("Invalid upstream URL: {}", upstream))?;
            if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
                anyhow::bail!("Upstream URL must be an http(s) URL with a host: {}", upstream);
            }
        }

        if self.auth.credentials().is_none()
            && (self.auth.username.is_some() || self.auth.password.is_some())
        {
            warn!("Only one of auth username/password is set; basic auth is disabled");
        }

        Ok(())
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.port, 8080);
        assert!(config.upstream_url.is_none());
        assert!(config.auth.credentials().is_none());
        assert_eq!(config.store.kind, StoreKind::File);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let config = AppConfig {
            port: 0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());

        let config = AppConfig {
            upstream_url: Some("ftp://zurg:9999".into()),
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());

        let config = AppConfig {
            upstream_url: Some("http://zurg:9999".into()),
            ..AppConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_credentials_need_both_halves() {
        let mut auth = AuthConfig {
            username: Some("user".into()),
            ..AuthConfig::default()
        };
        assert!(auth.credentials().is_none());

        auth.password = Some("pass".into());
        assert_eq!(auth.credentials(), Some(("user", "pass")));

        auth.password = Some(String::new());
        assert!(auth.credentials().is_none());
    }
}
