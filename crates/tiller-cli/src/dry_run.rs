use std::sync::Mutex;

use tiller_common::{Dialect, Error, Result, SchemaVersion};
use tiller_db::{Database, MemoryVersionStore, MigrationRegistry, Runner, VersionStore};

/// Handle that collects statements instead of executing them.
struct DryRunDatabase {
    dialect: Dialect,
    lines: Mutex<Vec<String>>,
}

impl DryRunDatabase {
    fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            lines: Mutex::new(Vec::new()),
        }
    }

    fn push(&self, line: String) -> Result<()> {
        self.lines
            .lock()
            .map_err(|_| Error::Other("dry run buffer poisoned".into()))?
            .push(line);
        Ok(())
    }

    fn into_lines(self) -> Result<Vec<String>> {
        self.lines
            .into_inner()
            .map_err(|_| Error::Other("dry run buffer poisoned".into()))
    }
}

impl Database for DryRunDatabase {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn execute(&self, statement: &str) -> Result<()> {
        self.push(format!("{statement};"))
    }
}

/// Walk the chain from `current` to `target` through the regular runner,
/// against a collecting handle and an in-memory version counter.
pub fn render_plan(
    registry: &MigrationRegistry,
    dialect: Dialect,
    current: SchemaVersion,
    target: SchemaVersion,
) -> Result<Vec<String>> {
    let db = DryRunDatabase::new(dialect);
    let versions = MemoryVersionStore::new(current);
    {
        let runner = Runner::new(registry, &db, &versions);
        let plan = runner.plan(target)?;
        if plan.is_empty() {
            return Ok(vec![format!("-- schema already at version {current}")]);
        }

        for unit in plan {
            db.push(format!("-- {} ({} -> {})", unit.name, unit.from, unit.to))?;
            runner.apply_unit(unit)?;
        }
    }
    db.push(format!(
        "-- schema would be at version {}",
        versions.current_version()?
    ))?;
    db.into_lines()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_mysql_cache_flag_from_100() {
        let registry = MigrationRegistry::builtin().unwrap();
        let lines = render_plan(
            &registry,
            Dialect::Mysql,
            SchemaVersion(100),
            SchemaVersion(101),
        )
        .unwrap();

        assert_eq!(
            lines,
            [
                "-- pages_cache_flag (100 -> 101)",
                "ALTER TABLE pages ADD cache TINYINT(1) UNSIGNED NOT NULL DEFAULT '0' AFTER privilege;",
                "-- schema would be at version 101",
            ]
        );
    }

    #[test]
    fn renders_full_sqlite_chain() {
        let registry = MigrationRegistry::builtin().unwrap();
        let lines = render_plan(
            &registry,
            Dialect::Sqlite,
            SchemaVersion::INITIAL,
            registry.latest(),
        )
        .unwrap();

        assert_eq!(lines[0], "-- baseline (0 -> 100)");
        assert!(lines.iter().any(|l| l.starts_with("CREATE TABLE IF NOT EXISTS pages")));
        assert!(lines.iter().any(|l| l.contains("ADD COLUMN cache")));
        assert_eq!(lines.last().unwrap(), "-- schema would be at version 101");
    }

    #[test]
    fn up_to_date_plan_is_a_single_note() {
        let registry = MigrationRegistry::builtin().unwrap();
        let lines = render_plan(
            &registry,
            Dialect::Sqlite,
            SchemaVersion(101),
            SchemaVersion(101),
        )
        .unwrap();
        assert_eq!(lines, ["-- schema already at version 101"]);
    }

    #[test]
    fn unknown_target_is_rejected() {
        let registry = MigrationRegistry::builtin().unwrap();
        let err = render_plan(
            &registry,
            Dialect::Sqlite,
            SchemaVersion::INITIAL,
            SchemaVersion(42),
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnknownTarget(SchemaVersion(42))));
    }
}
