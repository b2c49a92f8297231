//! # Configuration Module
//!
//! Configuration for the caching proxy, assembled from layered sources:
//!
//! 1. built-in defaults,
//! 2. an optional YAML file,
//! 3. environment variables (`GRAPHCL_*`),
//! 4. command-line flags.
//!
//! Each source produces a [`PartialProxyConfig`] where every field is optional.
//! Layers are merged with later sources winning, then [`PartialProxyConfig::resolve`]
//! fills defaults and validates the result into a [`ProxyConfig`]. Any error
//! here is fatal at startup.

use crate::caching::ttl::EntityTtls;
use crate::core::error::{GatewayError, GatewayResult};
use crate::observability::config::{LogConfig, LogFormat};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default listen port
pub const DEFAULT_PORT: u16 = 7370;

/// Default bind address
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";

/// Default maximum buffered request body size (16MB)
pub const DEFAULT_MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

/// Fully resolved proxy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Upstream GraphQL endpoint
    pub endpoint: Url,

    /// Address to bind the listener to
    pub bind_address: String,

    /// Port to listen on
    pub port: u16,

    /// Per-entity cache durations, `Entity:Seconds` pairs
    pub cache_times: EntityTtls,

    /// Largest request body the proxy will buffer
    pub max_body_size: usize,

    /// Bound on upstream calls; `None` keeps the HTTP client's default
    #[serde(with = "humantime_serde", default)]
    pub upstream_timeout: Option<Duration>,

    /// Logging settings
    pub logging: LogConfig,
}

impl ProxyConfig {
    /// Configuration with defaults for everything but the endpoint
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            port: DEFAULT_PORT,
            cache_times: EntityTtls::default(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            upstream_timeout: None,
            logging: LogConfig::default(),
        }
    }

    /// Parse and validate an endpoint string
    pub fn parse_endpoint(raw: &str) -> GatewayResult<Url> {
        let endpoint = Url::parse(raw.trim())
            .map_err(|e| crate::config_error!("invalid endpoint URL: {}", e))?;

        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(crate::config_error!(
                "endpoint must use http or https, got '{}'",
                endpoint.scheme()
            ));
        }

        if endpoint.host_str().is_none() {
            return Err(GatewayError::config("endpoint URL has no host"));
        }

        Ok(endpoint)
    }

    /// Socket address the server listens on
    pub fn listen_addr(&self) -> GatewayResult<SocketAddr> {
        format!("{}:{}", self.bind_address, self.port)
            .parse()
            .map_err(|e| {
                crate::config_error!(
                    "Invalid listen address {}:{}: {}",
                    self.bind_address, self.port, e
                )
            })
    }

    /// Validation with every problem reported at once
    pub fn validate(&self) -> GatewayResult<()> {
        let mut errors = Vec::new();

        if !matches!(self.endpoint.scheme(), "http" | "https") {
            errors.push(format!(
                "endpoint must use http or https, got '{}'",
                self.endpoint.scheme()
            ));
        }

        if self.port == 0 {
            errors.push("port must be greater than 0".to_string());
        }

        if self.max_body_size == 0 {
            errors.push("max_body_size must be greater than 0".to_string());
        }

        if let Some(timeout) = self.upstream_timeout {
            if timeout.is_zero() {
                errors.push("upstream_timeout must be greater than 0".to_string());
            }
        }

        if let Err(e) = self.listen_addr() {
            errors.push(e.to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(crate::config_error!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            ))
        }
    }
}

/// One configuration layer; unset fields defer to lower layers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialProxyConfig {
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub bind_address: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,

    /// `Entity:Seconds` pairs, comma separated
    #[serde(default)]
    pub cache: Option<String>,

    #[serde(default)]
    pub max_body_size: Option<usize>,

    #[serde(with = "humantime_serde", default)]
    pub upstream_timeout: Option<Duration>,

    #[serde(default)]
    pub log_level: Option<String>,

    #[serde(default)]
    pub log_format: Option<LogFormat>,
}

impl PartialProxyConfig {
    /// Load a layer from a YAML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> GatewayResult<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            crate::config_error!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            )
        })?;

        Self::from_yaml(&content)
    }

    /// Parse a layer from YAML text
    pub fn from_yaml(content: &str) -> GatewayResult<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| crate::config_error!("Failed to parse config: {}", e))
    }

    /// Build a layer from `GRAPHCL_*` environment variables
    pub fn from_env() -> GatewayResult<Self> {
        Self::from_env_with(|name| std::env::var(name).ok())
    }

    /// Build a layer from an arbitrary variable lookup
    pub fn from_env_with<F>(lookup: F) -> GatewayResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut layer = Self {
            endpoint: lookup("GRAPHCL_ENDPOINT"),
            bind_address: lookup("GRAPHCL_BIND_ADDRESS"),
            cache: lookup("GRAPHCL_CACHE"),
            log_level: lookup("GRAPHCL_LOG_LEVEL"),
            ..Self::default()
        };

        if let Some(port) = lookup("GRAPHCL_PORT") {
            layer.port = Some(
                port.parse()
                    .map_err(|e| crate::config_error!("Invalid GRAPHCL_PORT: {}", e))?,
            );
        }

        if let Some(size) = lookup("GRAPHCL_MAX_BODY_SIZE") {
            layer.max_body_size = Some(size.parse().map_err(|e| {
                crate::config_error!("Invalid GRAPHCL_MAX_BODY_SIZE: {}", e)
            })?);
        }

        if let Some(timeout) = lookup("GRAPHCL_UPSTREAM_TIMEOUT") {
            layer.upstream_timeout = Some(humantime::parse_duration(&timeout).map_err(|e| {
                crate::config_error!("Invalid GRAPHCL_UPSTREAM_TIMEOUT: {}", e)
            })?);
        }

        if let Some(format) = lookup("GRAPHCL_LOG_FORMAT") {
            layer.log_format = Some(match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "text" => LogFormat::Text,
                other => {
                    return Err(crate::config_error!(
                        "Invalid GRAPHCL_LOG_FORMAT: {}",
                        other
                    ))
                }
            });
        }

        Ok(layer)
    }

    /// Overlay `overrides` on top of this layer
    pub fn merge(self, overrides: PartialProxyConfig) -> Self {
        Self {
            endpoint: overrides.endpoint.or(self.endpoint),
            bind_address: overrides.bind_address.or(self.bind_address),
            port: overrides.port.or(self.port),
            cache: overrides.cache.or(self.cache),
            max_body_size: overrides.max_body_size.or(self.max_body_size),
            upstream_timeout: overrides.upstream_timeout.or(self.upstream_timeout),
            log_level: overrides.log_level.or(self.log_level),
            log_format: overrides.log_format.or(self.log_format),
        }
    }

    /// Fill defaults, parse and validate
    pub fn resolve(self) -> GatewayResult<ProxyConfig> {
        let endpoint = self
            .endpoint
            .filter(|endpoint| !endpoint.trim().is_empty())
            .ok_or_else(|| {
                GatewayError::config(
                    "endpoint is missing: provide --endpoint or the GRAPHCL_ENDPOINT environment variable",
                )
            })?;

        let mut config = ProxyConfig::new(ProxyConfig::parse_endpoint(&endpoint)?);

        if let Some(bind_address) = self.bind_address {
            config.bind_address = bind_address;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(cache) = self.cache {
            config.cache_times = cache.parse()?;
        }
        if let Some(max_body_size) = self.max_body_size {
            config.max_body_size = max_body_size;
        }
        config.upstream_timeout = self.upstream_timeout;
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }

        config.validate()?;
        Ok(config)
    }
}
