use tiller_common::{Error, SchemaVersion};
use tiller_db::{Database, MigrationRegistry, Runner, SqliteStore, VersionStore};

fn migrate_fresh() -> (SqliteStore, SchemaVersion) {
    let registry = MigrationRegistry::builtin().unwrap();
    let store = SqliteStore::in_memory().unwrap();
    let version = Runner::new(&registry, &store, &store).run().unwrap();
    (store, version)
}

#[test]
fn fresh_database_reaches_latest_version() {
    let (store, version) = migrate_fresh();

    assert_eq!(version, SchemaVersion(101));
    assert_eq!(store.current_version().unwrap(), SchemaVersion(101));

    let columns = store.columns("pages").unwrap();
    assert!(columns.iter().any(|c| c == "privilege"));
    assert_eq!(columns.last().map(String::as_str), Some("cache"));

    let history = store.history().unwrap();
    let names: Vec<_> = history.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["baseline", "pages_cache_flag"]);
}

#[test]
fn replaying_the_chain_is_deterministic() {
    let (first, first_version) = migrate_fresh();
    let (second, second_version) = migrate_fresh();

    assert_eq!(first_version, second_version);
    assert_eq!(
        first.columns("pages").unwrap(),
        second.columns("pages").unwrap()
    );
}

#[test]
fn rerunning_a_migrated_database_is_a_no_op() {
    let registry = MigrationRegistry::builtin().unwrap();
    let (store, version) = migrate_fresh();

    let again = Runner::new(&registry, &store, &store).run().unwrap();

    assert_eq!(again, version);
    assert_eq!(store.history().unwrap().len(), 2);
}

#[test]
fn cache_column_is_filled_by_default() {
    let registry = MigrationRegistry::builtin().unwrap();
    let store = SqliteStore::in_memory().unwrap();
    let runner = Runner::new(&registry, &store, &store);

    runner.run_to(SchemaVersion(100)).unwrap();
    store
        .execute("INSERT INTO pages (title, slug, privilege) VALUES ('Home', 'home', 2)")
        .unwrap();
    runner.run().unwrap();

    store
        .execute("INSERT INTO pages (title, slug) VALUES ('About', 'about')")
        .unwrap();
    let err = store
        .execute("INSERT INTO pages (title, slug, cache) VALUES ('Bad', 'bad', NULL)")
        .unwrap_err();
    assert!(err.to_string().contains("NOT NULL"));
}

#[test]
fn failed_migration_keeps_version_and_schema() {
    let registry = MigrationRegistry::builtin().unwrap();
    let store = SqliteStore::in_memory().unwrap();
    let runner = Runner::new(&registry, &store, &store);

    runner.run_to(SchemaVersion(100)).unwrap();
    // Someone added the column by hand.
    store
        .execute("ALTER TABLE pages ADD COLUMN cache INTEGER")
        .unwrap();

    let err = runner.run().unwrap_err();
    match err {
        Error::StatementExecution { version, reason, .. } => {
            assert_eq!(version, SchemaVersion(100));
            assert!(reason.contains("duplicate column name"));
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(store.current_version().unwrap(), SchemaVersion(100));
    assert_eq!(store.history().unwrap().len(), 1);

    // The transaction was rolled back, so the store accepts new work.
    store.begin().unwrap();
    store.rollback().unwrap();
}

#[test]
fn database_file_survives_reopen_between_steps() {
    let registry = MigrationRegistry::builtin().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("site.db");

    {
        let store = SqliteStore::open(&path).unwrap();
        let version = Runner::new(&registry, &store, &store)
            .run_to(SchemaVersion(100))
            .unwrap();
        assert_eq!(version, SchemaVersion(100));
    }

    let store = SqliteStore::open(&path).unwrap();
    let runner = Runner::new(&registry, &store, &store);
    assert_eq!(runner.pending().unwrap().len(), 1);
    assert_eq!(runner.run().unwrap(), SchemaVersion(101));
}

#[test]
fn store_ahead_of_registry_is_a_mismatch_for_every_entry_point() {
    let registry = MigrationRegistry::builtin().unwrap();
    let store = SqliteStore::in_memory().unwrap();
    store.set_current_version(SchemaVersion(120)).unwrap();
    let runner = Runner::new(&registry, &store, &store);

    for err in [
        runner.run().unwrap_err(),
        runner.run_to(registry.latest()).unwrap_err(),
        runner.pending().unwrap_err(),
    ] {
        assert!(
            matches!(
                err,
                Error::VersionMismatch {
                    expected: SchemaVersion(101),
                    found: SchemaVersion(120),
                }
            ),
            "{err}"
        );
    }
    assert_eq!(store.current_version().unwrap(), SchemaVersion(120));
}
