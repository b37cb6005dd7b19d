//! Smart data store maintenance tool
//!
//! # Usage
//!
//! ```bash
//! sds stats
//! sds dump telemetry --state unsent
//! sds smooth location speed 0.5
//! sds drain alarm --to-state sent > alarms.jsonl
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (<config dir>/smart-data-store/config.toml)
//! 3. Environment variables (SDS_*)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;

use sds_admin::{init_logging, load_settings, run, Cli};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = load_settings(
        cli.config.as_deref(),
        cli.db_path.as_deref(),
        cli.log_level.as_deref(),
    )?;
    init_logging(&settings.log_level)?;

    run(cli.command, &settings)
}
