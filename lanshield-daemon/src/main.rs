use anyhow::Result;
use clap::Parser;

use lanshield_core::config::LanshieldConfig;
use lanshield_daemon::cli::DaemonCli;
use lanshield_daemon::logging::init_tracing;
use lanshield_daemon::metrics_server::install_metrics_recorder;
use lanshield_daemon::monitor::Collaborators;
use lanshield_daemon::orchestrator::Orchestrator;
use lanshield_packet_engine::default_backend;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    // file -> environment -> command line
    let mut config = LanshieldConfig::from_file(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load {}: {e}", cli.config.display()))?;
    config.apply_env_overrides();
    cli.apply_overrides(&mut config);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("config validation failed: {e}"))?;

    if cli.validate {
        println!("configuration OK: {}", cli.config.display());
        return Ok(());
    }

    init_tracing(&config.general)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "lanshield-daemon starting"
    );

    if config.metrics.enabled {
        install_metrics_recorder(&config.metrics)?;
    }

    let mut orchestrator =
        Orchestrator::build_from_config(config, default_backend(), Collaborators::default())?;
    orchestrator.run().await?;

    tracing::info!("lanshield-daemon shut down");
    Ok(())
}
