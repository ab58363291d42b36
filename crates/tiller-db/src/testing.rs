use std::sync::Mutex;

use tiller_common::{Dialect, Error, Result};

use crate::Database;

/// Records every statement it is asked to run. Statements containing
/// `fail_on` are rejected after being recorded; `fail_commit` rejects every
/// commit.
pub(crate) struct RecordingDatabase {
    dialect: Dialect,
    fail_on: Option<&'static str>,
    fail_commit: bool,
    executed: Mutex<Vec<String>>,
    events: Mutex<Vec<&'static str>>,
}

impl RecordingDatabase {
    pub(crate) fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            fail_on: None,
            fail_commit: false,
            executed: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing_on(dialect: Dialect, needle: &'static str) -> Self {
        Self {
            fail_on: Some(needle),
            ..Self::new(dialect)
        }
    }

    pub(crate) fn failing_commit(dialect: Dialect) -> Self {
        Self {
            fail_commit: true,
            ..Self::new(dialect)
        }
    }

    pub(crate) fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub(crate) fn events(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().clone()
    }
}

impl Database for RecordingDatabase {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn execute(&self, statement: &str) -> Result<()> {
        self.executed.lock().unwrap().push(statement.to_string());
        match self.fail_on {
            Some(needle) if statement.contains(needle) => {
                Err(Error::Database("Duplicate column name 'cache'".into()))
            }
            _ => Ok(()),
        }
    }

    fn begin(&self) -> Result<()> {
        self.events.lock().unwrap().push("begin");
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        self.events.lock().unwrap().push("commit");
        if self.fail_commit {
            return Err(Error::Database("disk I/O error".into()));
        }
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        self.events.lock().unwrap().push("rollback");
        Ok(())
    }
}
