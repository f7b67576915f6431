//! GraphRAG Relay - Main entry point.

use anyhow::Result;
use relay_common::config::Config;
use relay_common::logging::init_logging_with_exclusions;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration (.env, config file, environment)
    let config = Config::load_and_validate()?;

    // Initialize logging
    init_logging_with_exclusions(
        &config.observability.log_level,
        &config.observability.log_format,
        &config.observability.excluded_targets,
    );

    tracing::info!("GraphRAG relay v{}", env!("CARGO_PKG_VERSION"));

    relay_server::start_server(config).await
}
