//! Configuration Manager

use super::Config;
use crate::Result;
use anyhow::{bail, Context};
use std::net::SocketAddr;
use std::path::Path;

/// Bearer token for the upstream API
pub const ENV_TOKEN: &str = "TOKEN";
/// Inbound listen port
pub const ENV_PORT: &str = "PORT";
pub const ENV_BIND_ADDR: &str = "RELAY_BIND_ADDR";
pub const ENV_UPSTREAM_URL: &str = "RELAY_UPSTREAM_URL";
pub const ENV_LOG_LEVEL: &str = "RELAY_LOG_LEVEL";
pub const ENV_SHUTDOWN_TIMEOUT: &str = "RELAY_SHUTDOWN_TIMEOUT";

/// Manages configuration loading and validation
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from file, falling back to defaults when it is missing.
    ///
    /// The result is not validated: the token usually arrives through the
    /// environment afterwards.
    pub fn load_from_file(path: &Path) -> Result<Config> {
        if path.exists() {
            tracing::info!("Loading configuration from: {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;

            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

            Ok(config)
        } else {
            tracing::warn!("Configuration file not found at {}, using defaults", path.display());
            Ok(Config::default())
        }
    }

    /// Load the file (if any), then layer the process environment on top
    pub fn load(path: &Path) -> Result<Config> {
        let mut config = Self::load_from_file(path)?;
        Self::apply_env(&mut config, |key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Override configuration values from an environment lookup
    pub fn apply_env<F>(config: &mut Config, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup(ENV_TOKEN) {
            config.upstream.token = token;
        }

        if let Some(bind_addr) = lookup(ENV_BIND_ADDR) {
            config.server.bind_addr = bind_addr
                .parse::<SocketAddr>()
                .with_context(|| format!("Invalid {}: {}", ENV_BIND_ADDR, bind_addr))?;
        }

        if let Some(port) = lookup(ENV_PORT) {
            let port = port
                .parse::<u16>()
                .with_context(|| format!("Invalid {}: {}", ENV_PORT, port))?;
            config.server.bind_addr.set_port(port);
        }

        if let Some(url) = lookup(ENV_UPSTREAM_URL) {
            config.upstream.url = url;
        }

        if let Some(log_level) = lookup(ENV_LOG_LEVEL) {
            config.monitoring.log_level = log_level;
        }

        if let Some(timeout) = lookup(ENV_SHUTDOWN_TIMEOUT) {
            config.server.shutdown_timeout = humantime::parse_duration(&timeout)
                .with_context(|| format!("Invalid {}: {}", ENV_SHUTDOWN_TIMEOUT, timeout))?;
        }

        Ok(())
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_server_config()
            .with_context(|| "Server configuration validation failed")?;

        self.validate_upstream_config()
            .with_context(|| "Upstream configuration validation failed")?;

        self.validate_monitoring_config()
            .with_context(|| "Monitoring configuration validation failed")?;

        Ok(())
    }

    fn validate_server_config(&self) -> Result<()> {
        if !self.server.path.starts_with('/') {
            bail!("server.path must start with '/'");
        }

        if self.server.shutdown_timeout.is_zero() {
            bail!("shutdown_timeout must be greater than 0");
        }

        Ok(())
    }

    fn validate_upstream_config(&self) -> Result<()> {
        if self.upstream.token.trim().is_empty() {
            bail!("upstream token is not set (export {} or set upstream.token)", ENV_TOKEN);
        }

        if !(self.upstream.url.starts_with("ws://") || self.upstream.url.starts_with("wss://")) {
            bail!("upstream.url must use the ws:// or wss:// scheme");
        }

        if self.upstream.beta.is_empty() {
            bail!("upstream.beta must not be empty");
        }

        Ok(())
    }

    fn validate_monitoring_config(&self) -> Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.monitoring.log_level.as_str()) {
            bail!("monitoring.log_level must be one of: {}", valid_log_levels.join(", "));
        }

        Ok(())
    }

    /// Merge with CLI arguments. An unparsable bind address is an error.
    pub fn merge_with_cli_args(
        &mut self,
        bind: Option<&str>,
        port: Option<u16>,
        upstream_url: Option<&str>,
    ) -> Result<()> {
        if let Some(bind_str) = bind {
            let addr: SocketAddr = bind_str
                .parse()
                .with_context(|| format!("Invalid bind address provided: {}", bind_str))?;
            self.server.bind_addr = addr;
            tracing::info!("CLI override: bind address set to {}", addr);
        }

        if let Some(port) = port {
            self.server.bind_addr.set_port(port);
            tracing::info!("CLI override: port set to {}", port);
        }

        if let Some(url) = upstream_url {
            self.upstream.url = url.to_string();
            tracing::info!("CLI override: upstream url set to {}", url);
        }

        Ok(())
    }
}
