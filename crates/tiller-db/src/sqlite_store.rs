use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use tiller_common::{Dialect, Error, Result, SchemaVersion};
use tracing::{debug, info};

use crate::Database;
use crate::version_store::{MigrationRecord, VersionStore};

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// SQLite-backed store. Serves as both the database handle migrations run
/// against and the home of the schema version counter.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        Self::open_with_timeout(db_path, DEFAULT_BUSY_TIMEOUT)
    }

    pub fn open_with_timeout(db_path: &Path, busy_timeout: Duration) -> Result<Self> {
        info!("opening migration store at {}", db_path.display());
        let conn = Connection::open(db_path)
            .map_err(|e| Error::Database(format!("failed to open database: {e}")))?;
        conn.busy_timeout(busy_timeout)
            .map_err(|e| Error::Database(format!("failed to set busy timeout: {e}")))?;

        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("failed to open in-memory database: {e}")))?;

        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.bootstrap()?;
        Ok(store)
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Database("migration store lock poisoned".into()))
    }

    /// Create the bookkeeping tables. The version row starts at 0.
    fn bootstrap(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS _schema_version (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            INSERT OR IGNORE INTO _schema_version (id, version) VALUES (1, 0);

            CREATE TABLE IF NOT EXISTS _migrations (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                from_version INTEGER NOT NULL,
                to_version INTEGER NOT NULL,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            );",
        )
        .map_err(|e| Error::Database(format!("bootstrap failed: {e}")))?;

        Ok(())
    }

    /// Whether a table with this name exists in the main schema.
    pub fn table_exists(&self, name: &str) -> Result<bool> {
        let conn = self.connection()?;
        conn.query_row(
            "SELECT count(*) > 0 FROM sqlite_master WHERE type='table' AND name=?1",
            params![name],
            |row| row.get(0),
        )
        .map_err(|e| Error::Database(format!("failed to check table {name}: {e}")))
    }

    /// Column names of `table`, in declaration order.
    pub fn columns(&self, table: &str) -> Result<Vec<String>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")
            .map_err(|e| Error::Database(format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map(params![table], |row| row.get::<_, String>(0))
            .map_err(|e| Error::Database(format!("failed to query columns: {e}")))?;

        let mut columns = Vec::new();
        for row in rows {
            columns.push(row.map_err(|e| Error::Database(format!("failed to read column: {e}")))?);
        }
        Ok(columns)
    }
}

impl Database for SqliteStore {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn execute(&self, statement: &str) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch(statement)
            .map_err(|e| Error::Database(e.to_string()))
    }

    fn begin(&self) -> Result<()> {
        debug!("BEGIN IMMEDIATE");
        let conn = self.connection()?;
        conn.execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| Error::Database(format!("failed to begin transaction: {e}")))
    }

    fn commit(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch("COMMIT")
            .map_err(|e| Error::Database(format!("failed to commit transaction: {e}")))
    }

    fn rollback(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch("ROLLBACK")
            .map_err(|e| Error::Database(format!("failed to roll back transaction: {e}")))
    }
}

impl VersionStore for SqliteStore {
    fn current_version(&self) -> Result<SchemaVersion> {
        let conn = self.connection()?;
        read_version(&conn)
    }

    fn set_current_version(&self, version: SchemaVersion) -> Result<()> {
        let conn = self.connection()?;
        let current = read_version(&conn)?;
        if version < current {
            return Err(Error::VersionRegression {
                current,
                requested: version,
            });
        }

        conn.execute(
            "UPDATE _schema_version SET version = ?1, updated_at = datetime('now') WHERE id = 1",
            params![version.get()],
        )
        .map_err(|e| Error::Database(format!("failed to store schema version: {e}")))?;
        Ok(())
    }

    fn record_migration(&self, record: &MigrationRecord) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO _migrations (from_version, to_version, name, applied_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                record.from_version.get(),
                record.to_version.get(),
                record.name,
                record.applied_at.to_rfc3339(),
            ],
        )
        .map_err(|e| Error::Database(format!("failed to record migration: {e}")))?;
        Ok(())
    }

    fn history(&self) -> Result<Vec<MigrationRecord>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT from_version, to_version, name, applied_at
                 FROM _migrations
                 ORDER BY seq ASC",
            )
            .map_err(|e| Error::Database(format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map([], |row| {
                Ok(MigrationRecord {
                    from_version: SchemaVersion(row.get(0)?),
                    to_version: SchemaVersion(row.get(1)?),
                    name: row.get(2)?,
                    applied_at: parse_datetime(row.get::<_, String>(3)?),
                })
            })
            .map_err(|e| Error::Database(format!("failed to query history: {e}")))?;

        let mut history = Vec::new();
        for row in rows {
            history.push(
                row.map_err(|e| Error::Database(format!("failed to read history row: {e}")))?,
            );
        }
        Ok(history)
    }
}

fn read_version(conn: &Connection) -> Result<SchemaVersion> {
    let version: u32 = conn
        .query_row("SELECT version FROM _schema_version WHERE id = 1", [], |row| {
            row.get(0)
        })
        .map_err(|e| Error::Database(format!("failed to read schema version: {e}")))?;
    Ok(SchemaVersion(version))
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            // SQLite datetime('now') produces "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S")
                .map(|naive| naive.and_utc())
                .unwrap_or_else(|_| Utc::now())
        })
}
