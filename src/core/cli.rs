use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::core::config::PartialProxyConfig;
use crate::observability::config::LogFormat;

/// Command-line arguments for the graphcl binary.
#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "graphcl",
    version,
    about = "Caching proxy that turns GraphQL queries into cacheable redirects"
)]
pub struct CliArgs {
    /// Optional path to a YAML configuration file.
    #[arg(long = "config", env = "GRAPHCL_CONFIG", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    /// Target GraphQL endpoint.
    #[arg(long, value_name = "URL")]
    pub endpoint: Option<String>,

    /// Port to listen on [default: 7370].
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Address to bind to [default: 0.0.0.0].
    #[arg(long = "bind-address", value_name = "ADDR")]
    pub bind_address: Option<String>,

    /// Entity cache times in seconds, comma separated [default: User:300,Post:600].
    #[arg(long, value_name = "ENTITY:SECONDS,...")]
    pub cache: Option<String>,

    /// Largest request body to buffer, in bytes.
    #[arg(long = "max-body-size", value_name = "BYTES")]
    pub max_body_size: Option<usize>,

    /// Bound upstream calls, e.g. `30s` or `1m 30s`.
    #[arg(long = "upstream-timeout", value_name = "DURATION", value_parser = parse_duration)]
    pub upstream_timeout: Option<Duration>,

    /// Base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Log output format.
    #[arg(long = "log-format", value_enum, value_name = "FORMAT")]
    pub log_format: Option<LogFormat>,
}

impl CliArgs {
    /// The configuration layer contributed by command-line flags
    pub fn overrides(&self) -> PartialProxyConfig {
        PartialProxyConfig {
            endpoint: self.endpoint.clone(),
            bind_address: self.bind_address.clone(),
            port: self.port,
            cache: self.cache.clone(),
            max_body_size: self.max_body_size,
            upstream_timeout: self.upstream_timeout,
            log_level: self.log_level.clone(),
            log_format: self.log_format,
        }
    }
}

fn parse_duration(raw: &str) -> Result<Duration, humantime::DurationError> {
    humantime::parse_duration(raw)
}
