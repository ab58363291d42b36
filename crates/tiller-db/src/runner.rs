use chrono::Utc;
use tiller_common::{Error, Result, SchemaVersion};
use tracing::{info, warn};

use crate::Database;
use crate::migrations::{Migration, MigrationRegistry};
use crate::version_store::{MigrationRecord, VersionStore};

/// Drives a [`MigrationRegistry`] against a database handle and the store
/// holding its schema version.
///
/// Units run one at a time, in chain order. A unit only runs while the stored
/// version equals its source version, so each one is applied at most once.
///
/// When the version store is the handle itself, the version bump joins the
/// unit's transaction. A separate store is only written after the handle
/// commits.
pub struct Runner<'a> {
    registry: &'a MigrationRegistry,
    db: &'a dyn Database,
    versions: &'a dyn VersionStore,
    shares_handle: bool,
}

impl<'a> Runner<'a> {
    pub fn new(
        registry: &'a MigrationRegistry,
        db: &'a dyn Database,
        versions: &'a dyn VersionStore,
    ) -> Self {
        let shares_handle = std::ptr::addr_eq(db, versions);
        Self {
            registry,
            db,
            versions,
            shares_handle,
        }
    }

    pub fn current_version(&self) -> Result<SchemaVersion> {
        self.versions.current_version()
    }

    /// Units still to run to reach the latest version.
    pub fn pending(&self) -> Result<Vec<&'a Migration>> {
        self.plan(self.registry.latest())
    }

    /// Units that would run to move from the stored version to `target`.
    /// Nothing is executed.
    pub fn plan(&self, target: SchemaVersion) -> Result<Vec<&'a Migration>> {
        let current = self.current_version()?;
        self.plan_from(current, target)
    }

    fn plan_from(
        &self,
        current: SchemaVersion,
        target: SchemaVersion,
    ) -> Result<Vec<&'a Migration>> {
        let latest = self.registry.latest();
        if current > latest {
            return Err(Error::VersionMismatch {
                expected: latest,
                found: current,
            });
        }
        if !self.registry.contains_version(target) {
            return Err(Error::UnknownTarget(target));
        }
        if target < current {
            return Err(Error::VersionRegression {
                current,
                requested: target,
            });
        }

        let mut plan = Vec::new();
        let mut version = current;
        while version < target {
            let unit = self
                .registry
                .find_from(version)
                .ok_or_else(|| Error::VersionMismatch {
                    expected: self.registry.nearest_below(version),
                    found: version,
                })?;
            plan.push(unit);
            version = unit.to;
        }
        Ok(plan)
    }

    /// Apply a single unit: check the stored version, run its statements in a
    /// transaction on the handle, and persist its target version. A failure at
    /// any step, the commit included, rolls back and leaves the version alone.
    pub fn apply_unit(&self, unit: &Migration) -> Result<SchemaVersion> {
        let current = self.current_version()?;
        if current != unit.from {
            return Err(Error::VersionMismatch {
                expected: unit.from,
                found: current,
            });
        }

        self.db.begin()?;
        match self.apply_in_transaction(unit) {
            Ok(next) => {
                if !self.shares_handle {
                    self.persist(unit, next)?;
                }
                info!(
                    "applied migration {} ({} -> {})",
                    unit.name, unit.from, next
                );
                Ok(next)
            }
            Err(e) => {
                if let Err(rollback_err) = self.db.rollback() {
                    warn!(
                        "rollback after failed migration {} failed: {rollback_err}",
                        unit.name
                    );
                }
                Err(e)
            }
        }
    }

    /// Everything between `begin` and a successful `commit`.
    fn apply_in_transaction(&self, unit: &Migration) -> Result<SchemaVersion> {
        let next = unit.apply(self.db)?;
        if self.shares_handle {
            self.persist(unit, next)?;
        }
        self.db.commit()?;
        Ok(next)
    }

    fn persist(&self, unit: &Migration, next: SchemaVersion) -> Result<()> {
        self.versions.set_current_version(next)?;
        self.versions.record_migration(&MigrationRecord {
            from_version: unit.from,
            to_version: next,
            name: unit.name.to_string(),
            applied_at: Utc::now(),
        })
    }

    /// Apply every pending unit. Returns the terminal schema version.
    pub fn run(&self) -> Result<SchemaVersion> {
        let plan = self.pending()?;
        self.execute(plan)
    }

    /// Apply units until the schema reaches `target`.
    pub fn run_to(&self, target: SchemaVersion) -> Result<SchemaVersion> {
        let plan = self.plan(target)?;
        self.execute(plan)
    }

    fn execute(&self, plan: Vec<&'a Migration>) -> Result<SchemaVersion> {
        if plan.is_empty() {
            let current = self.current_version()?;
            info!("schema already at version {current}, nothing to apply");
            return Ok(current);
        }

        info!("applying {} migration(s)", plan.len());
        let mut version = self.current_version()?;
        for unit in plan {
            version = self.apply_unit(unit)?;
        }
        Ok(version)
    }
}
