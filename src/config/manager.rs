//! Configuration Manager

use super::Config;
use crate::Result;
use anyhow::{bail, Context};
use std::net::SocketAddr;
use std::path::Path;

/// Manages configuration loading and validation
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from file
    pub fn load_from_file(path: &Path) -> Result<Config> {
        if path.exists() {
            tracing::info!("Loading configuration from: {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;

            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

            config
                .validate()
                .with_context(|| "Configuration validation failed")?;

            tracing::info!("Configuration loaded and validated successfully");
            Ok(config)
        } else {
            tracing::warn!(
                "Configuration file not found at {}, using defaults",
                path.display()
            );
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Load configuration from environment variables
    pub fn load_from_env() -> Result<Config> {
        let mut config = Config::default();

        // Override with environment variables if present
        if let Ok(ws_addr) = std::env::var("SUBBRIDGE_WS_ADDR") {
            config.server.ws_bind_addr = ws_addr
                .parse::<SocketAddr>()
                .with_context(|| format!("Invalid SUBBRIDGE_WS_ADDR: {}", ws_addr))?;
        }

        if let Ok(http_addr) = std::env::var("SUBBRIDGE_HTTP_ADDR") {
            config.server.http_bind_addr = http_addr
                .parse::<SocketAddr>()
                .with_context(|| format!("Invalid SUBBRIDGE_HTTP_ADDR: {}", http_addr))?;
        }

        if let Ok(timeout) = std::env::var("SUBBRIDGE_DEFAULT_TIMEOUT") {
            config.extraction.default_timeout = humantime::parse_duration(&timeout)
                .with_context(|| format!("Invalid SUBBRIDGE_DEFAULT_TIMEOUT: {}", timeout))?;
        }

        if let Ok(timeout) = std::env::var("SUBBRIDGE_SHUTDOWN_TIMEOUT") {
            config.server.shutdown_timeout = humantime::parse_duration(&timeout)
                .with_context(|| format!("Invalid SUBBRIDGE_SHUTDOWN_TIMEOUT: {}", timeout))?;
        }

        if let Ok(log_level) = std::env::var("SUBBRIDGE_LOG_LEVEL") {
            config.monitoring.log_level = log_level;
        }

        config.validate()?;
        Ok(config)
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_server_config()
            .with_context(|| "Server configuration validation failed")?;

        self.validate_extraction_config()
            .with_context(|| "Extraction configuration validation failed")?;

        self.validate_monitoring_config()
            .with_context(|| "Monitoring configuration validation failed")?;

        Ok(())
    }

    /// Validate server configuration
    fn validate_server_config(&self) -> Result<()> {
        if self.server.ws_bind_addr == self.server.http_bind_addr {
            bail!("ws_bind_addr and http_bind_addr must differ");
        }

        if self.server.shutdown_timeout.as_secs() == 0 {
            bail!("shutdown_timeout must be greater than 0");
        }

        if self.server.shutdown_timeout.as_secs() > 300 {
            bail!("shutdown_timeout cannot exceed 5 minutes");
        }

        Ok(())
    }

    /// Validate extraction configuration
    fn validate_extraction_config(&self) -> Result<()> {
        if self.extraction.default_timeout.as_millis() == 0 {
            bail!("default_timeout must be greater than 0");
        }

        if self.extraction.default_timeout > self.extraction.max_timeout {
            bail!("default_timeout cannot exceed max_timeout");
        }

        if self.extraction.max_timeout.as_secs() > 3600 {
            bail!("max_timeout cannot exceed 1 hour");
        }

        Ok(())
    }

    /// Validate monitoring configuration
    fn validate_monitoring_config(&self) -> Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.monitoring.log_level.as_str()) {
            bail!(
                "monitoring.log_level must be one of: {}",
                valid_log_levels.join(", ")
            );
        }

        Ok(())
    }

    /// Merge with CLI arguments
    pub fn merge_with_cli_args(
        &mut self,
        ws_port: Option<u16>,
        http_port: Option<u16>,
        default_timeout: Option<u64>,
    ) {
        // Override WebSocket port if provided
        if let Some(port) = ws_port {
            self.server.ws_bind_addr.set_port(port);
            tracing::info!("CLI override: WebSocket port set to {}", port);
        }

        // Override HTTP port if provided
        if let Some(port) = http_port {
            self.server.http_bind_addr.set_port(port);
            tracing::info!("CLI override: HTTP port set to {}", port);
        }

        // Override default extraction timeout if provided
        if let Some(timeout_secs) = default_timeout {
            self.extraction.default_timeout = std::time::Duration::from_secs(timeout_secs);
            tracing::info!("CLI override: default timeout set to {}s", timeout_secs);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_default_timeout_rejected() {
        let mut config = Config::default();
        config.extraction.default_timeout = Duration::from_secs(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_timeout_above_max_rejected() {
        let mut config = Config::default();
        config.extraction.default_timeout = Duration::from_secs(600);
        config.extraction.max_timeout = Duration::from_secs(300);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_colliding_bind_addrs_rejected() {
        let mut config = Config::default();
        config.server.http_bind_addr = config.server.ws_bind_addr;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let mut config = Config::default();
        config.monitoring.log_level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[server]
ws_bind_addr = "127.0.0.1:9090"
http_bind_addr = "127.0.0.1:9091"
shutdown_timeout = "10s"

[extraction]
default_timeout = "45s"
max_timeout = "2m"

[monitoring]
log_level = "debug"
"#
        )
        .unwrap();

        let config = ConfigManager::load_from_file(file.path()).unwrap();
        assert_eq!(config.server.ws_bind_addr.port(), 9090);
        assert_eq!(config.extraction.default_timeout, Duration::from_secs(45));
        assert_eq!(config.monitoring.log_level, "debug");
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let config =
            ConfigManager::load_from_file(Path::new("/nonexistent/subbridge.toml")).unwrap();
        assert_eq!(config.server.ws_bind_addr.port(), 8080);
    }

    #[test]
    fn test_cli_override_ports() {
        let mut config = Config::default();
        config.merge_with_cli_args(Some(9999), Some(9998), Some(60));
        assert_eq!(config.server.ws_bind_addr.port(), 9999);
        assert_eq!(config.server.http_bind_addr.port(), 9998);
        assert_eq!(config.extraction.default_timeout, Duration::from_secs(60));
    }
}
