use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use hopwatch::application::{Cli, CommandExecutor};
use hopwatch::ConfigLoader;

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    // Priority: CLI flags > environment > config file > defaults
    let mut config = ConfigLoader::load(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;
    cli.apply_overrides(&mut config);

    CommandExecutor::execute(cli.command, config).await
}
