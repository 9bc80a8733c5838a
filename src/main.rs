//! Entry point for the CCNL Cost Engine binary.
//!
//! Running this binary starts an HTTP server exposing the cost
//! calculator, the comparison assembler and the agreement catalog.
//! Settings come from an optional TOML file named by `CCNL_CONFIG`
//! and from the `CCNL_*` environment variables; see
//! [`ccnl_engine::config`].

use anyhow::Result;
use ccnl_engine::config::AppConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env()?;

    // RUST_LOG takes precedence over the configured filter
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    ccnl_engine::api::serve(config).await
}
