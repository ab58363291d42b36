use std::borrow::Cow;

use tiller_common::{Dialect, Error, Result, SchemaVersion};
use tracing::debug;

use crate::Database;

/// Migration system for tracking and applying database schema changes.
///
/// Each migration upgrades the schema from one version to a later one.
/// Migrations are applied in order and tracked in a `_migrations` table.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub from: SchemaVersion,
    pub to: SchemaVersion,
    pub name: &'static str,
    pub statements: fn(Dialect) -> Vec<Cow<'static, str>>,
}

impl Migration {
    /// The statements this migration runs against a handle of `dialect`.
    pub fn render(&self, dialect: Dialect) -> Vec<Cow<'static, str>> {
        (self.statements)(dialect)
    }

    /// Run every statement against `db`, stopping at the first failure.
    ///
    /// Callers must make sure the stored version equals `self.from` first;
    /// [`Runner::apply_unit`](crate::Runner::apply_unit) does.
    pub fn apply(&self, db: &dyn Database) -> Result<SchemaVersion> {
        for statement in self.render(db.dialect()) {
            debug!("migration {} executing: {statement}", self.name);
            db.execute(&statement)
                .map_err(|e| Error::StatementExecution {
                    version: self.from,
                    statement: statement.to_string(),
                    reason: e.to_string(),
                })?;
        }
        Ok(self.to)
    }
}

pub const BASELINE: Migration = Migration {
    from: SchemaVersion(0),
    to: SchemaVersion(100),
    name: "baseline",
    statements: baseline,
};

pub const PAGES_CACHE_FLAG: Migration = Migration {
    from: SchemaVersion(100),
    to: SchemaVersion(101),
    name: "pages_cache_flag",
    statements: pages_cache_flag,
};

/// Every migration shipped with this build, in chain order.
pub static MIGRATIONS: &[Migration] = &[BASELINE, PAGES_CACHE_FLAG];

const PAGES_SQLITE: &str = "CREATE TABLE IF NOT EXISTS pages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    parent_id INTEGER REFERENCES pages(id) ON DELETE SET NULL,
    title TEXT NOT NULL,
    slug TEXT NOT NULL UNIQUE,
    content TEXT NOT NULL DEFAULT '',
    privilege INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
)";

const PAGES_MYSQL: &str = "CREATE TABLE IF NOT EXISTS pages (
    id INT UNSIGNED NOT NULL AUTO_INCREMENT,
    parent_id INT UNSIGNED NULL,
    title VARCHAR(255) NOT NULL,
    slug VARCHAR(255) NOT NULL,
    content MEDIUMTEXT NOT NULL,
    privilege TINYINT(3) UNSIGNED NOT NULL DEFAULT '0',
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
    PRIMARY KEY (id),
    UNIQUE KEY uniq_pages_slug (slug),
    KEY idx_pages_parent (parent_id)
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4";

fn baseline(dialect: Dialect) -> Vec<Cow<'static, str>> {
    match dialect {
        Dialect::Sqlite => vec![
            PAGES_SQLITE.into(),
            "CREATE INDEX IF NOT EXISTS idx_pages_parent ON pages(parent_id)".into(),
        ],
        Dialect::Mysql => vec![PAGES_MYSQL.into()],
    }
}

fn pages_cache_flag(dialect: Dialect) -> Vec<Cow<'static, str>> {
    match dialect {
        // SQLite has no column positioning and no UNSIGNED after a size.
        Dialect::Sqlite => {
            vec!["ALTER TABLE pages ADD COLUMN cache INTEGER NOT NULL DEFAULT 0".into()]
        }
        Dialect::Mysql => vec![
            "ALTER TABLE pages ADD cache TINYINT(1) UNSIGNED NOT NULL DEFAULT '0' AFTER privilege"
                .into(),
        ],
    }
}

/// Ordered, validated chain of migrations.
///
/// Every migration moves strictly forward, no two share a source version,
/// and each one starts where the previous one ends.
#[derive(Debug, Clone)]
pub struct MigrationRegistry {
    migrations: Vec<Migration>,
}

impl MigrationRegistry {
    pub fn new(migrations: impl IntoIterator<Item = Migration>) -> Result<Self> {
        let mut migrations: Vec<Migration> = migrations.into_iter().collect();
        migrations.sort_by_key(|m| m.from);

        for m in &migrations {
            if m.to <= m.from {
                return Err(Error::InvalidRegistry(format!(
                    "migration {} does not move forward ({} -> {})",
                    m.name, m.from, m.to
                )));
            }
        }
        for pair in migrations.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if prev.from == next.from {
                return Err(Error::InvalidRegistry(format!(
                    "migrations {} and {} both start at version {}",
                    prev.name, next.name, prev.from
                )));
            }
            if prev.to != next.from {
                return Err(Error::InvalidRegistry(format!(
                    "gap in chain: {} ends at {} but {} starts at {}",
                    prev.name, prev.to, next.name, next.from
                )));
            }
        }

        Ok(Self { migrations })
    }

    /// The registry of migrations shipped with this build.
    pub fn builtin() -> Result<Self> {
        Self::new(MIGRATIONS.iter().copied())
    }

    /// The version a fresh store must be at for the chain to apply.
    pub fn initial(&self) -> SchemaVersion {
        self.migrations
            .first()
            .map(|m| m.from)
            .unwrap_or(SchemaVersion::INITIAL)
    }

    pub fn latest(&self) -> SchemaVersion {
        self.migrations
            .last()
            .map(|m| m.to)
            .unwrap_or(SchemaVersion::INITIAL)
    }

    /// The migration that upgrades from `version`, if any.
    pub fn find_from(&self, version: SchemaVersion) -> Option<&Migration> {
        self.migrations.iter().find(|m| m.from == version)
    }

    /// Whether `version` is a point the chain passes through.
    pub fn contains_version(&self, version: SchemaVersion) -> bool {
        version == self.initial() || self.migrations.iter().any(|m| m.to == version)
    }

    /// Highest chain version not above `version`, falling back to the initial one.
    pub fn nearest_below(&self, version: SchemaVersion) -> SchemaVersion {
        self.migrations
            .iter()
            .map(|m| m.to)
            .filter(|v| *v <= version)
            .max()
            .unwrap_or_else(|| self.initial())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Migration> {
        self.migrations.iter()
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}
