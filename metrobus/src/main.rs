use clap::Parser;
use color_eyre::Result;

use metrobus_scraper::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli.log_filter())?;
    color_eyre::install()?;

    cli.run().await
}

/// Logs go to stderr; stdout carries the JSON results.
fn setup_logging(default_filter: &str) -> Result<()> {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{fmt, EnvFilter};

    let filter_layer =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_filter))?;

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(ErrorLayer::default())
        .init();

    Ok(())
}
