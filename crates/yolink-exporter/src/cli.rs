//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap. Credentials given here take
//! precedence over environment variables and the config file.

use clap::Parser;
use std::path::PathBuf;

/// YoLink exporter CLI
#[derive(Debug, Parser)]
#[command(name = "yolink-exporter")]
#[command(about = "Prometheus exporter for YoLink temperature/humidity sensors", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to config file (default is ./config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// YoLink API key (overrides $YOLINK_API_KEY and the config file)
    #[arg(long)]
    pub api_key: Option<String>,

    /// YoLink API secret (overrides $YOLINK_SECRET and the config file)
    #[arg(long)]
    pub secret: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_no_args() {
        let cli = Cli::parse_from(["yolink-exporter"]);
        assert!(cli.config.is_none());
        assert!(cli.api_key.is_none());
        assert!(cli.secret.is_none());
    }

    #[test]
    fn test_parse_all_flags() {
        let cli = Cli::parse_from([
            "yolink-exporter",
            "--config",
            "/etc/yolink/config.toml",
            "--api-key",
            "key",
            "--secret",
            "shh",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/yolink/config.toml")));
        assert_eq!(cli.api_key.as_deref(), Some("key"));
        assert_eq!(cli.secret.as_deref(), Some("shh"));
    }
}
