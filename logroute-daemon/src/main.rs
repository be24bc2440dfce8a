//! logroute-daemon entry point.
//!
//! Loads `logroute.toml`, initializes tracing, then either validates or
//! prints the output modules, or runs the output service until SIGTERM/SIGINT.

use anyhow::Result;
use clap::Parser;

use logroute_core::config::LogrouteConfig;
use logroute_daemon::cli::DaemonCli;
use logroute_daemon::logging;
use logroute_daemon::orchestrator::{self, Orchestrator};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    let mut config = LogrouteConfig::load(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load {}: {}", cli.config.display(), e))?;
    cli.apply_overrides(&mut config.general);

    logging::init_tracing(&config.general)?;

    if cli.validate {
        let accepted = orchestrator::validate_modules(&config)?;
        tracing::info!(modules = accepted, "configuration is valid");
        println!("configuration OK ({accepted} modules)");
        return Ok(());
    }

    if cli.print_modules {
        print!("{}", orchestrator::describe_modules(&config)?);
        return Ok(());
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "logroute-daemon starting"
    );

    let mut daemon = Orchestrator::build_from_config(config).await?;
    daemon.run().await?;

    tracing::info!("logroute-daemon stopped");
    Ok(())
}
