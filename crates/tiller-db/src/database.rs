use tiller_common::{Dialect, Result};

/// A connection to the persistent store that migrations run against.
///
/// Handles are owned by the caller and only borrowed by the runner. Methods
/// take `&self` so one store can act as both the [`Database`] and the
/// [`VersionStore`](crate::VersionStore) of a run.
pub trait Database {
    /// The SQL flavour this handle speaks.
    fn dialect(&self) -> Dialect;

    /// Execute one raw statement.
    fn execute(&self, statement: &str) -> Result<()>;

    fn begin(&self) -> Result<()> {
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        Ok(())
    }
}
