//! CLI argument definitions for lanshield-daemon.

use std::path::PathBuf;

use clap::Parser;

use lanshield_core::config::LanshieldConfig;

/// LanShield network monitoring daemon.
///
/// Captures frames on the configured interface, runs the anomaly detectors
/// and traffic aggregators, and dispatches deduplicated alerts.
#[derive(Parser, Debug)]
#[command(name = "lanshield-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to lanshield.toml configuration file.
    #[arg(short, long, default_value = "/etc/lanshield/lanshield.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    #[arg(long)]
    pub log_format: Option<String>,

    /// Override capture interface.
    #[arg(short, long)]
    pub interface: Option<String>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,

    /// Override PID file path. An empty string disables the PID file.
    #[arg(long)]
    pub pid_file: Option<String>,
}

impl DaemonCli {
    /// Apply CLI overrides on top of file and environment values.
    ///
    /// Call before `validate()` so overridden values are checked too.
    pub fn apply_overrides(&self, config: &mut LanshieldConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.general.log_format = format.clone();
        }
        if let Some(interface) = &self.interface {
            config.capture.interface = interface.clone();
        }
        if let Some(pid_file) = &self.pid_file {
            config.general.pid_file = pid_file.clone();
        }
    }
}
