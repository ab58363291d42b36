use thiserror::Error;

use crate::types::SchemaVersion;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("migration {version} failed executing `{statement}`: {reason}")]
    StatementExecution {
        version: SchemaVersion,
        statement: String,
        reason: String,
    },

    #[error("schema version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        expected: SchemaVersion,
        found: SchemaVersion,
    },

    #[error("schema version cannot move backwards from {current} to {requested}")]
    VersionRegression {
        current: SchemaVersion,
        requested: SchemaVersion,
    },

    #[error("unknown target version: {0}")]
    UnknownTarget(SchemaVersion),

    #[error("invalid migration registry: {0}")]
    InvalidRegistry(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::Error;
    use crate::SchemaVersion;

    #[test]
    fn error_display_includes_context() {
        let e = Error::Config("bad yaml".into());
        assert_eq!(e.to_string(), "configuration error: bad yaml");

        let e = Error::VersionMismatch {
            expected: SchemaVersion(100),
            found: SchemaVersion(99),
        };
        assert_eq!(
            e.to_string(),
            "schema version mismatch: expected 100, found 99"
        );

        let e = Error::StatementExecution {
            version: SchemaVersion(100),
            statement: "ALTER TABLE pages".into(),
            reason: "duplicate column".into(),
        };
        assert_eq!(
            e.to_string(),
            "migration 100 failed executing `ALTER TABLE pages`: duplicate column"
        );

        let e = Error::Other("misc".into());
        assert_eq!(e.to_string(), "misc");
    }
}
