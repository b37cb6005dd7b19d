//! Command implementations for the `sds` tool.
//!
//! Each command opens the store, runs once and closes it again, so the
//! connection is released on every exit path.

use std::io::Write;

use anyhow::{Context, Result};
use tracing::info;

use sds_publish::{JsonLinesTransport, PublishConfig, PublishCoordinator};
use sds_storage::Store;
use sds_types::Settings;

use crate::cli::Commands;

/// Load settings and apply CLI overrides (highest precedence)
pub fn load_settings(
    config_path: Option<&str>,
    db_path_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;

    if let Some(db_path) = db_path_override {
        settings.db_path = db_path.to_string();
    }
    if let Some(log_level) = log_level_override {
        settings.log_level = log_level.to_string();
    }
    Ok(settings)
}

/// Install the tracing subscriber; `RUST_LOG` wins over the configured level
pub fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

/// Open the configured store with its retention policy
pub fn open_store(settings: &Settings) -> Result<Store> {
    let db_path = settings.expanded_db_path();
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let policy = settings
        .retention
        .to_policy()
        .context("Invalid retention settings")?;
    let key = settings.encryption_key.as_ref();

    Store::open_with_policy(&db_path, key, policy)
        .with_context(|| format!("Failed to open store at {}", db_path.display()))
}

/// Open the store, run one command against it and close it
pub fn run(command: Commands, settings: &Settings) -> Result<()> {
    let mut store = open_store(settings)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    let result = execute(&mut store, command, settings, &mut out);
    store.close().context("Failed to close store")?;
    result
}

/// Run one command against an open store, writing output to `out`
pub fn execute(
    store: &mut Store,
    command: Commands,
    settings: &Settings,
    out: &mut dyn Write,
) -> Result<()> {
    match command {
        Commands::Stats => {
            let stats = store.stats()?;
            for table in &stats.tables {
                let states: Vec<String> = table
                    .by_state
                    .iter()
                    .map(|(state, count)| format!("{state}={count}"))
                    .collect();
                writeln!(
                    out,
                    "{:<10} {:>8}  {}",
                    table.kind.table_name(),
                    table.rows,
                    states.join(" ")
                )?;
            }
            writeln!(out, "disk usage: {} bytes", stats.disk_usage_bytes)?;
        }
        Commands::Dump { kind, state } => {
            let rows = match state {
                Some(state) => store.select_by_state(kind, state),
                None => store.select_all(kind),
            };
            for row in rows {
                let row = row?;
                writeln!(
                    out,
                    "{:>8}  {}  {:<9}  {}",
                    row.index,
                    row.timestamp_text(),
                    row.state.as_str(),
                    serde_json::to_string(&row.record)?
                )?;
            }
        }
        Commands::Prune { kind } => {
            let outcome = store
                .apply_retention(kind)
                .with_context(|| format!("Retention on {kind} failed"))?;
            writeln!(out, "evicted {} rows from {kind}", outcome.evicted)?;
        }
        Commands::Smooth {
            kind,
            field,
            threshold,
            mark_state,
        } => {
            let outcome = store.smooth(kind, field, threshold, mark_state)?;
            writeln!(
                out,
                "marked {} rows of {kind} as {mark_state} ({} failed)",
                outcome.marked.len(),
                outcome.failed.len()
            )?;
        }
        Commands::Purge { kind, state } => {
            let deleted = store.delete_by_state(kind, state)?;
            writeln!(out, "deleted {deleted} {state} rows from {kind}")?;
        }
        Commands::Exec { sql } => {
            store.raw_execute(&sql).context("Command failed")?;
            info!("Raw command committed");
        }
        Commands::Drain { kind, to_state } => {
            let success_state = to_state.unwrap_or(settings.publish.success_state);
            let coordinator =
                PublishCoordinator::new(PublishConfig::default().with_success_state(success_state))?;
            let mut transport = JsonLinesTransport::new(&mut *out);
            let report = coordinator.publish_unsent(store, kind, &mut transport)?;
            info!(
                kind = %kind,
                delivered = report.delivered,
                transitioned = report.transitioned,
                "Drain complete"
            );
        }
        Commands::InsertTelemetry { name, value } => {
            let index = store.insert_telemetry(name, value)?;
            writeln!(out, "inserted telemetry row {index}")?;
        }
    }
    Ok(())
}
