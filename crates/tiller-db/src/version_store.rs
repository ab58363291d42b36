use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tiller_common::{Error, Result, SchemaVersion};

/// One applied migration, as kept in the history table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub from_version: SchemaVersion,
    pub to_version: SchemaVersion,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

/// Persistent home of the schema version counter.
///
/// Implementations must refuse to move the version backwards.
pub trait VersionStore {
    fn current_version(&self) -> Result<SchemaVersion>;

    fn set_current_version(&self, version: SchemaVersion) -> Result<()>;

    /// Append an entry to the migration history. Stores without history
    /// ignore it.
    fn record_migration(&self, _record: &MigrationRecord) -> Result<()> {
        Ok(())
    }

    fn history(&self) -> Result<Vec<MigrationRecord>> {
        Ok(Vec::new())
    }
}

/// Version store that lives only in memory. Used for dry runs, where the
/// plan is computed from a snapshot of the real version.
#[derive(Debug, Default)]
pub struct MemoryVersionStore {
    version: Mutex<SchemaVersion>,
    history: Mutex<Vec<MigrationRecord>>,
}

impl MemoryVersionStore {
    pub fn new(version: SchemaVersion) -> Self {
        Self {
            version: Mutex::new(version),
            history: Mutex::new(Vec::new()),
        }
    }

    fn version(&self) -> Result<MutexGuard<'_, SchemaVersion>> {
        self.version
            .lock()
            .map_err(|_| Error::Database("version store lock poisoned".into()))
    }
}

impl VersionStore for MemoryVersionStore {
    fn current_version(&self) -> Result<SchemaVersion> {
        Ok(*self.version()?)
    }

    fn set_current_version(&self, version: SchemaVersion) -> Result<()> {
        let mut current = self.version()?;
        if version < *current {
            return Err(Error::VersionRegression {
                current: *current,
                requested: version,
            });
        }
        *current = version;
        Ok(())
    }

    fn record_migration(&self, record: &MigrationRecord) -> Result<()> {
        self.history
            .lock()
            .map_err(|_| Error::Database("version store lock poisoned".into()))?
            .push(record.clone());
        Ok(())
    }

    fn history(&self) -> Result<Vec<MigrationRecord>> {
        Ok(self
            .history
            .lock()
            .map_err(|_| Error::Database("version store lock poisoned".into()))?
            .clone())
    }
}
