//! CLI argument parsing for the `sds` maintenance tool.
//!
//! CLI flags override all other config sources.

use clap::{Parser, Subcommand};

use sds_types::{Field, RecordKind, State};

/// Smart data store maintenance tool
///
/// Inspect, prune and drain a device-local store-and-forward buffer.
#[derive(Parser, Debug)]
#[command(name = "sds")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default <config dir>/smart-data-store/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Override database path
    #[arg(long, global = true)]
    pub db_path: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Maintenance commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Show row counts per table and state
    Stats,

    /// Print the rows of a table
    Dump {
        /// Table (telemetry, location, alarm, attribute)
        kind: RecordKind,

        /// Only rows in this state
        #[arg(short, long)]
        state: Option<State>,
    },

    /// Apply the configured retention policy to a table now
    Prune {
        kind: RecordKind,
    },

    /// Mark near-duplicate unsent samples
    Smooth {
        kind: RecordKind,

        /// Numeric column to compare (value, latitude, speed, ...)
        field: Field,

        /// Largest change still considered insignificant
        threshold: f64,

        /// State given to marked rows
        #[arg(long, default_value = "ignore")]
        mark_state: State,
    },

    /// Delete every row of a table in a state
    Purge {
        kind: RecordKind,

        #[arg(short, long)]
        state: State,
    },

    /// Run a raw SQL batch in one transaction
    Exec {
        sql: String,
    },

    /// Publish unsent rows as JSON lines on stdout
    Drain {
        kind: RecordKind,

        /// State applied to drained rows (default from config)
        #[arg(long)]
        to_state: Option<State>,
    },

    /// Insert one telemetry sample
    InsertTelemetry {
        #[arg(long)]
        name: String,

        #[arg(long, allow_negative_numbers = true)]
        value: f64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_stats() {
        let cli = Cli::parse_from(["sds", "stats"]);
        assert!(matches!(cli.command, Commands::Stats));
    }

    #[test]
    fn test_cli_global_flags() {
        let cli = Cli::parse_from([
            "sds",
            "stats",
            "--db-path",
            "/tmp/device.db",
            "--config",
            "/etc/sds.toml",
            "-l",
            "debug",
        ]);
        assert_eq!(cli.db_path, Some("/tmp/device.db".to_string()));
        assert_eq!(cli.config, Some("/etc/sds.toml".to_string()));
        assert_eq!(cli.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_cli_dump_with_state() {
        let cli = Cli::parse_from(["sds", "dump", "alarm", "--state", "unsent"]);
        match cli.command {
            Commands::Dump { kind, state } => {
                assert_eq!(kind, RecordKind::Alarm);
                assert_eq!(state, Some(State::Unsent));
            }
            _ => panic!("Expected Dump command"),
        }
    }

    #[test]
    fn test_cli_smooth_defaults_to_ignore() {
        let cli = Cli::parse_from(["sds", "smooth", "location", "speed", "0.5"]);
        match cli.command {
            Commands::Smooth {
                kind,
                field,
                threshold,
                mark_state,
            } => {
                assert_eq!(kind, RecordKind::Location);
                assert_eq!(field, Field::Speed);
                assert_eq!(threshold, 0.5);
                assert_eq!(mark_state, State::Ignore);
            }
            _ => panic!("Expected Smooth command"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_table() {
        let result = Cli::try_parse_from(["sds", "dump", "gps"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_insert_negative_value() {
        let cli = Cli::parse_from(["sds", "insert-telemetry", "--name", "temp", "--value", "-4.5"]);
        match cli.command {
            Commands::InsertTelemetry { name, value } => {
                assert_eq!(name, "temp");
                assert_eq!(value, -4.5);
            }
            _ => panic!("Expected InsertTelemetry command"),
        }
    }

    #[test]
    fn test_cli_drain() {
        let cli = Cli::parse_from(["sds", "drain", "telemetry", "--to-state", "retain"]);
        match cli.command {
            Commands::Drain { kind, to_state } => {
                assert_eq!(kind, RecordKind::Telemetry);
                assert_eq!(to_state, Some(State::Retain));
            }
            _ => panic!("Expected Drain command"),
        }
    }
}
