use anyhow::{Context, Result, bail};
use serde_json::json;
use tiller_common::{Dialect, Error, SchemaVersion};
use tiller_config::AppConfig;
use tiller_db::{MigrationRegistry, Runner, SqliteStore, VersionStore};
use tracing::{info, warn};

use crate::dry_run;
use crate::status::render_status;

fn open_store(config: &AppConfig) -> Result<SqliteStore> {
    if config.database.dialect != Dialect::Sqlite {
        bail!(
            "{} databases cannot be migrated directly; use `migrate --dry-run` to render the statements",
            config.database.dialect
        );
    }

    let path = config.database.resolved_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let timeout = std::time::Duration::from_millis(config.database.busy_timeout_ms);
    SqliteStore::open_with_timeout(&path, timeout)
        .with_context(|| format!("failed to open {}", path.display()))
}

/// Open a database that must already exist. Read-only commands use this so a
/// mistyped path is reported instead of creating an empty store.
fn existing_store(config: &AppConfig) -> Result<SqliteStore> {
    let path = config.database.resolved_path();
    if !path.is_file() {
        bail!(
            "no database at {}; run `tiller migrate` to create it",
            path.display()
        );
    }
    open_store(config)
}

pub fn status(config: &AppConfig, as_json: bool) -> Result<()> {
    let registry = MigrationRegistry::builtin()?;
    let store = existing_store(config)?;
    let runner = Runner::new(&registry, &store, &store);

    let current = runner.current_version()?;
    let pending = match runner.pending() {
        Ok(pending) => pending,
        Err(Error::VersionMismatch { expected, found }) => {
            warn!("schema version {found} is not reachable by this build (expected {expected})");
            Vec::new()
        }
        Err(e) => return Err(e.into()),
    };

    if as_json {
        let pending: Vec<_> = pending
            .iter()
            .map(|m| json!({ "from": m.from, "to": m.to, "name": m.name }))
            .collect();
        let doc = json!({
            "database": config.database.resolved_path(),
            "current": current,
            "latest": registry.latest(),
            "pending": pending,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    let names: Vec<_> = pending.iter().map(|m| m.name).collect();
    let path = config.database.resolved_path();
    for line in render_status(&path, current, registry.latest(), &names) {
        println!("{line}");
    }
    Ok(())
}

pub fn migrate(
    config: &AppConfig,
    target: Option<u32>,
    from: Option<u32>,
    dry_run: bool,
) -> Result<()> {
    let registry = MigrationRegistry::builtin()?;
    let target = target.map(SchemaVersion).unwrap_or_else(|| registry.latest());

    if dry_run {
        let current = match from {
            Some(v) => SchemaVersion(v),
            None => stored_version(config)?,
        };
        let dialect = config.database.dialect;
        for line in dry_run::render_plan(&registry, dialect, current, target)? {
            println!("{line}");
        }
        return Ok(());
    }

    let store = open_store(config)?;
    let runner = Runner::new(&registry, &store, &store);
    let version = runner
        .run_to(target)
        .context("migration failed; schema version was not advanced")?;

    info!("schema is at version {version}");
    // Bare integer on stdout for wrapping scripts.
    println!("{version}");
    Ok(())
}

/// Version of an existing SQLite database, or the initial version when there
/// is nothing to read yet.
fn stored_version(config: &AppConfig) -> Result<SchemaVersion> {
    if config.database.dialect != Dialect::Sqlite || !config.database.resolved_path().exists() {
        return Ok(SchemaVersion::INITIAL);
    }
    Ok(open_store(config)?.current_version()?)
}

pub fn list(config: &AppConfig) -> Result<()> {
    let registry = MigrationRegistry::builtin()?;
    let current = stored_version(config)?;

    for unit in registry.iter() {
        let mark = if unit.to <= current { "x" } else { " " };
        println!("[{mark}] {:>5} -> {:<5} {}", unit.from, unit.to, unit.name);
    }
    Ok(())
}

pub fn history(config: &AppConfig, as_json: bool) -> Result<()> {
    let store = existing_store(config)?;
    let history = store.history()?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&history)?);
        return Ok(());
    }

    if history.is_empty() {
        println!("no migrations applied");
        return Ok(());
    }
    for record in &history {
        println!(
            "{}  {:>5} -> {:<5} {}",
            record.applied_at.format("%Y-%m-%d %H:%M:%S"),
            record.from_version,
            record.to_version,
            record.name
        );
    }
    Ok(())
}
