//!
//! mediagate server binary
//! -----------------------
//! Command-line entry point. Configuration comes from CLI flags and
//! `MEDIAGATE_*` environment variables (see `config`).

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use mediagate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .context("building log filter")?;
    fmt().with_env_filter(filter).init();

    let args: Vec<String> = std::env::args().collect();
    let config = ServerConfig::from_env_and_args(&args).context("invalid configuration")?;

    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(target: "mediagate", "mediagate starting: RUST_LOG='{}', http_port={}", rust_log, config.http_port);

    mediagate::server::run(config).await
}
