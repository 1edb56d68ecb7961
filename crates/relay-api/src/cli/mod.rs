//! CLI command definitions for the `relayd` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod chat;
pub mod config;
pub mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Chat relay with an adaptive request-dispatch pipeline.
#[derive(Parser)]
#[command(name = "relayd", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all log output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// More log output (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to relay.toml (defaults to `$RELAY_DATA_DIR/relay.toml`).
    #[arg(long, global = true, env = "RELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log line format: `pretty` or `json`.
    #[arg(long, global = true, default_value = "pretty")]
    pub log_format: relay_observe::LogFormat,

    /// Also export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the relay: console transport on stdin plus the stats API.
    Serve {
        /// Port to listen on (overrides `server.port`).
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (overrides `server.host`).
        #[arg(long)]
        host: Option<String>,

        /// Do not read chat lines from stdin.
        #[arg(long)]
        no_console: bool,
    },

    /// Interactive single-chat console session.
    Chat {
        /// Chat ID (also used as the sender ID).
        #[arg(long, default_value = "console")]
        chat_id: String,
    },

    /// Show live statistics from a running relay.
    Status {
        /// Base URL of the relay (defaults to `server.host:server.port`).
        #[arg(long)]
        url: Option<String>,
    },

    /// Manage the configuration file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Write a default relay.toml.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration (file plus environment overrides).
    Show,

    /// Print the configuration file path.
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_serve_overrides() {
        let cli = Cli::parse_from(["relayd", "-v", "serve", "--port", "8080", "--no-console"]);
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Serve {
                port,
                host,
                no_console,
            } => {
                assert_eq!(port, Some(8080));
                assert!(host.is_none());
                assert!(no_console);
            }
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "relayd",
            "config",
            "show",
            "--json",
            "--log-format",
            "json",
            "--config",
            "/tmp/relay.toml",
        ]);
        assert!(cli.json);
        assert_eq!(cli.log_format, relay_observe::LogFormat::Json);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/relay.toml")));
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Show
            }
        ));
    }
}
