//! CLI argument definitions for logroute-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// logroute output daemon.
///
/// Loads the output modules, routes structured log messages to their
/// destinations and keeps rotation and retention running.
#[derive(Parser, Debug)]
#[command(name = "logroute-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to logroute.toml configuration file.
    #[arg(short, long, default_value = "/etc/logroute/logroute.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration and every output module, then exit.
    #[arg(long)]
    pub validate: bool,

    /// Print the parsed modules with their resolved destinations, then exit.
    #[arg(long)]
    pub print_modules: bool,
}

impl DaemonCli {
    /// Apply command-line overrides to the general configuration.
    pub fn apply_overrides(&self, general: &mut logroute_core::config::GeneralConfig) {
        if let Some(level) = &self.log_level {
            general.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            general.log_format = format.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = DaemonCli::parse_from(["logroute-daemon"]);
        assert_eq!(cli.config, PathBuf::from("/etc/logroute/logroute.toml"));
        assert!(!cli.validate);
        assert!(!cli.print_modules);
    }

    #[test]
    fn overrides_apply_to_general_config() {
        let cli = DaemonCli::parse_from([
            "logroute-daemon",
            "--config",
            "/tmp/l.toml",
            "--log-level",
            "debug",
            "--print-modules",
        ]);
        let mut general = logroute_core::config::GeneralConfig::default();
        cli.apply_overrides(&mut general);
        assert_eq!(general.log_level, "debug");
        assert_eq!(general.log_format, "json");
        assert!(cli.print_modules);
    }
}
