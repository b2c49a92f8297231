//! # graphcl - Main Entry Point
//!
//! Resolves the configuration from its layers (built-in defaults, an optional
//! YAML file, `GRAPHCL_*` environment variables, command-line flags; later
//! layers win), installs logging and serves until Ctrl+C or SIGTERM.
//!
//! A configuration error is reported on stderr and the process exits with a
//! non-zero status before anything is bound.

use clap::Parser;
use tracing::{error, info};

use graphcl::core::cli::CliArgs;
use graphcl::observability::init_logging;
use graphcl::{GatewayResult, GatewayServer, PartialProxyConfig, ProxyConfig};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    let config = match load_config(&args).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("graphcl: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config.logging);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting graphcl");
    info!(
        endpoint = %config.endpoint,
        bind_address = %config.bind_address,
        port = config.port,
        "Proxy configured"
    );
    info!(
        cache_times = %config.cache_times,
        default_ttl_secs = config.cache_times.default_ttl().as_secs(),
        "Entity cache times"
    );

    if let Err(e) = run(config).await {
        error!(error = %e, "graphcl stopped with an error");
        std::process::exit(1);
    }
}

/// Build the layered configuration, lowest precedence first
async fn load_config(args: &CliArgs) -> GatewayResult<ProxyConfig> {
    let file_layer = match &args.config_file {
        Some(path) => PartialProxyConfig::load_from_file(path).await?,
        None => PartialProxyConfig::default(),
    };

    file_layer
        .merge(PartialProxyConfig::from_env()?)
        .merge(args.overrides())
        .resolve()
}

async fn run(config: ProxyConfig) -> GatewayResult<()> {
    let server = GatewayServer::new(config)?;
    server.start().await
}
