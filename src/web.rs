#![cfg(not(tarpaulin_include))]

use data_extractor::app;
use data_extractor::config::Config;

/// Main entry point for the extractor web application
///
/// Initialises logging (`RUST_LOG`, default `info`), reads the configuration
/// from the environment and serves until Ctrl+C.
///
/// # Returns
/// * `Result<(), Box<dyn std::error::Error>>` - Success or error object
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env();
    log::info!(
        "Starting data extractor on {} (uploads: {})",
        config.bind_addr,
        config.allowed_extensions.join(", ")
    );

    app::run(config).await
}
