//! Unit testing database handler
//!
//! This module provides the main type to create and drop testing databases,
//! populating them from preexisting dumps (if supplied).
//!
//! A dump directory contains the database schema in `table.sql` plus one
//! optional tab-separated data file (without headers) per table, following
//! the convention `<table_name>.txt`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use rusqlite::{params_from_iter, Connection, Transaction};
use tracing::debug;

use crate::database::connection::DbConnection;
use crate::database::url::{DbUrl, Dialect};

/// Username used to prefix test database names.
fn test_username() -> String {
    std::env::var("USER").unwrap_or_else(|_| "testuser".to_string())
}

/// An ephemeral, uniquely-named test database.
///
/// The database is created eagerly at construction and deleted when the
/// value is dropped, so cleanup happens even when a test fails. Call
/// [`TestDb::drop_db`] to delete it explicitly, or [`TestDb::persist`] to
/// keep it around for inspection.
///
/// ```rust,ignore
/// use petri::database::TestDb;
///
/// let db = TestDb::new("sqlite://", Some(Path::new("tests/data/mock_db")))?;
/// let rows = db.dbc().count_rows("gibberish")?;
/// db.drop_db()?;
/// ```
pub struct TestDb {
    dbc: DbConnection,
    db_path: PathBuf,
    dropped: bool,
}

impl TestDb {
    /// Creates a test database on the given server, populated from
    /// `dump_dir` if provided. See [`TestDb::builder`] for the remaining
    /// knobs.
    pub fn new(server_url: &str, dump_dir: Option<&Path>) -> Result<Self> {
        let mut builder = Self::builder(server_url);
        if let Some(dir) = dump_dir {
            builder = builder.dump_dir(dir);
        }
        builder.build()
    }

    pub fn builder(server_url: &str) -> TestDbBuilder {
        TestDbBuilder {
            server_url: server_url.to_string(),
            dump_dir: None,
            name: None,
            schema: Vec::new(),
            tmp_path: None,
        }
    }

    /// Returns the connection handler for this database.
    pub fn dbc(&self) -> &DbConnection {
        &self.dbc
    }

    /// Returns the backing database file path.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Checks whether the database currently exists on the backend.
    pub fn exists(&self) -> bool {
        self.db_path.exists()
    }

    /// Drops the database and releases its connections.
    ///
    /// Consumes the handle, so a double drop is unrepresentable. Dropping a
    /// database that no longer exists is a fatal error, not retried.
    pub fn drop_db(mut self) -> Result<()> {
        self.dropped = true;
        if !self.db_path.exists() {
            bail!(
                "test database '{}' does not exist",
                self.db_path.display()
            );
        }
        fs::remove_file(&self.db_path).with_context(|| {
            format!("Failed to drop test database '{}'", self.db_path.display())
        })
    }

    /// Disarms the automatic cleanup, keeping the database on disk after
    /// the handle goes away.
    pub fn persist(&mut self) {
        self.dropped = true;
    }
}

impl Drop for TestDb {
    fn drop(&mut self) {
        if !self.dropped {
            debug!("removing test database '{}'", self.db_path.display());
            let _ = fs::remove_file(&self.db_path);
        }
    }
}

impl std::fmt::Debug for TestDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestDb")
            .field("url", &self.dbc.masked_url())
            .finish()
    }
}

pub struct TestDbBuilder {
    server_url: String,
    dump_dir: Option<PathBuf>,
    name: Option<String>,
    schema: Vec<String>,
    tmp_path: Option<PathBuf>,
}

impl TestDbBuilder {
    /// Directory with `table.sql` plus per-table `<table>.txt` data files.
    pub fn dump_dir(mut self, dir: &Path) -> Self {
        self.dump_dir = Some(dir.to_path_buf());
        self
    }

    /// Logical name for the new database. Defaults to the dump directory
    /// name, or `testdb` when there is no dump directory. The final name is
    /// prefixed by the username either way.
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Schema descriptor: ordered SQL statements applied instead of a
    /// `table.sql` file.
    pub fn schema(mut self, statements: &[&str]) -> Self {
        self.schema = statements.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Directory where the database file is created (defaults to the
    /// current directory).
    pub fn tmp_path(mut self, dir: &Path) -> Self {
        self.tmp_path = Some(dir.to_path_buf());
        self
    }

    pub fn build(self) -> Result<TestDb> {
        let server: DbUrl = self.server_url.parse()?;
        let logical = self
            .name
            .clone()
            .or_else(|| {
                self.dump_dir
                    .as_deref()
                    .and_then(Path::file_name)
                    .map(|n| n.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| "testdb".to_string());
        let db_name = format!("{}_{}", test_username(), logical);

        let db_path = match server.dialect() {
            Dialect::Sqlite => {
                let file = format!("{db_name}.db");
                match &self.tmp_path {
                    Some(dir) => dir.join(file),
                    None => PathBuf::from(file),
                }
            }
            other => bail!(
                "unsupported backend '{other}' for test databases: \
                 only the embedded sqlite engine is available"
            ),
        };
        let db_url = server.set_database(&db_path.to_string_lossy());

        // Clean slate: drop any leftover database with the same name
        if db_path.exists() {
            fs::remove_file(&db_path).with_context(|| {
                format!("Failed to remove stale test database '{}'", db_path.display())
            })?;
        }
        create_database(&db_path)?;

        let mut dbc = DbConnection::from_url(db_url, false)?;
        let populated = load_schema_and_data(&dbc, self.dump_dir.as_deref(), &self.schema)
            .and_then(|()| dbc.load_metadata());
        if let Err(e) = populated {
            // Make sure the database is deleted before raising the error
            let _ = fs::remove_file(&db_path);
            return Err(e);
        }
        debug!("created test database '{}'", db_path.display());
        Ok(TestDb {
            dbc,
            db_path,
            dropped: false,
        })
    }
}

fn create_database(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory '{}'", parent.display())
            })?;
        }
    }
    let conn = Connection::open(path)
        .map_err(|e| anyhow!("Failed to create database '{}': {e}", path.display()))?;
    conn.close()
        .map_err(|(_, e)| anyhow!("Failed to create database '{}': {e}", path.display()))
}

/// Loads the schema (from a descriptor or the dump's `table.sql`) and any
/// per-table data files, all within one transaction.
fn load_schema_and_data(
    dbc: &DbConnection,
    dump_dir: Option<&Path>,
    schema: &[String],
) -> Result<()> {
    dbc.session_scope(|tx| {
        if !schema.is_empty() {
            for statement in schema {
                tx.execute(statement, [])
                    .map_err(|e| anyhow!("Failed to apply schema statement: {e}"))?;
            }
        } else if let Some(dir) = dump_dir {
            let schema_path = dir.join("table.sql");
            let sql = fs::read_to_string(&schema_path).with_context(|| {
                format!("Failed to read schema file '{}'", schema_path.display())
            })?;
            // Statements run in file order
            for statement in sql.split(';') {
                let statement = statement.trim();
                if !statement.is_empty() {
                    tx.execute(statement, []).map_err(|e| {
                        anyhow!("Failed to execute schema statement from '{}': {e}",
                            schema_path.display())
                    })?;
                }
            }
        }

        if let Some(dir) = dump_dir {
            let mut data_files: Vec<PathBuf> = fs::read_dir(dir)
                .with_context(|| format!("Failed to read dump directory '{}'", dir.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| path.extension().is_some_and(|ext| ext == "txt"))
                .collect();
            data_files.sort();
            for data_file in data_files {
                let table = match data_file.file_stem() {
                    Some(stem) => stem.to_string_lossy().into_owned(),
                    None => continue,
                };
                load_table_data(tx, &table, &data_file)?;
            }
        }
        Ok(())
    })
}

/// Bulk-loads one table from a tab-separated file without headers.
fn load_table_data(tx: &Transaction<'_>, table: &str, src: &Path) -> Result<()> {
    let content = fs::read_to_string(src)
        .with_context(|| format!("Failed to read data file '{}'", src.display()))?;
    let mut lines = content.lines().filter(|line| !line.is_empty()).peekable();
    let width = match lines.peek() {
        Some(first) => first.split('\t').count(),
        None => return Ok(()),
    };
    let placeholders = vec!["?"; width].join(", ");
    let mut insert = tx
        .prepare(&format!("INSERT INTO {table} VALUES ({placeholders})"))
        .map_err(|e| anyhow!("Failed to prepare bulk insert for '{table}': {e}"))?;
    for line in lines {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != width {
            bail!(
                "inconsistent field count in '{}': expected {width}, found {}",
                src.display(),
                fields.len()
            );
        }
        insert
            .execute(params_from_iter(fields))
            .map_err(|e| anyhow!("Failed to load row into '{table}': {e}"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_mock_dump(dir: &Path) {
        fs::write(
            dir.join("table.sql"),
            "CREATE TABLE gibberish (\n\
             \x20 id INTEGER NOT NULL,\n\
             \x20 grp VARCHAR(30) NOT NULL,\n\
             \x20 value INTEGER,\n\
             \x20 PRIMARY KEY (id, grp)\n\
             );",
        )
        .unwrap();
        fs::write(
            dir.join("gibberish.txt"),
            "1\tgrp1\t10\n2\tgrp1\t20\n3\tgrp2\t30\n4\tgrp2\t40\n5\tgrp3\t50\n6\tgrp3\t60\n",
        )
        .unwrap();
    }

    #[test]
    fn test_create_from_dump() {
        let tmp = tempfile::tempdir().unwrap();
        let dump = tmp.path().join("mock_db");
        fs::create_dir(&dump).unwrap();
        write_mock_dump(&dump);

        let db = TestDb::builder("sqlite://")
            .dump_dir(&dump)
            .tmp_path(tmp.path())
            .build()
            .unwrap();
        let expected = format!("{}_mock_db.db", test_username());
        assert_eq!(db.db_path().file_name().unwrap().to_str(), Some(expected.as_str()));
        assert_eq!(db.dbc().count_rows("gibberish").unwrap(), 6);
        assert_eq!(
            db.dbc().tables().keys().collect::<Vec<_>>(),
            vec!["gibberish"]
        );
        db.drop_db().unwrap();
    }

    #[test]
    fn test_rename_database() {
        let tmp = tempfile::tempdir().unwrap();
        let dump = tmp.path().join("mock_db");
        fs::create_dir(&dump).unwrap();
        write_mock_dump(&dump);

        let db = TestDb::builder("sqlite://")
            .dump_dir(&dump)
            .name("renamed_db")
            .tmp_path(tmp.path())
            .build()
            .unwrap();
        let expected = format!("{}_renamed_db.db", test_username());
        assert_eq!(db.db_path().file_name().unwrap().to_str(), Some(expected.as_str()));
    }

    #[test]
    fn test_create_from_schema_descriptor() {
        let tmp = tempfile::tempdir().unwrap();
        let db = TestDb::builder("sqlite://")
            .schema(&[
                "CREATE TABLE mock_table (
                     id INTEGER PRIMARY KEY,
                     grp VARCHAR(30) NOT NULL,
                     value INTEGER NOT NULL
                 )",
            ])
            .tmp_path(tmp.path())
            .build()
            .unwrap();
        assert_eq!(
            db.dbc().tables().keys().collect::<Vec<_>>(),
            vec!["mock_table"]
        );
    }

    #[test]
    fn test_create_without_schema() {
        let tmp = tempfile::tempdir().unwrap();
        let db = TestDb::builder("sqlite://")
            .tmp_path(tmp.path())
            .build()
            .unwrap();
        assert!(db.dbc().tables().is_empty());
        assert!(db.exists());
    }

    #[test]
    fn test_drop_db() {
        let tmp = tempfile::tempdir().unwrap();
        let db = TestDb::builder("sqlite://")
            .tmp_path(tmp.path())
            .build()
            .unwrap();
        let db_path = db.db_path().to_path_buf();
        assert!(db_path.exists());
        db.drop_db().unwrap();
        assert!(!db_path.exists());
    }

    #[test]
    fn test_raii_cleanup() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = {
            let db = TestDb::builder("sqlite://")
                .tmp_path(tmp.path())
                .build()
                .unwrap();
            db.db_path().to_path_buf()
        };
        assert!(!db_path.exists(), "database should be cleaned up on drop");
    }

    #[test]
    fn test_persist_keeps_database() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = {
            let mut db = TestDb::builder("sqlite://")
                .tmp_path(tmp.path())
                .build()
                .unwrap();
            db.persist();
            db.db_path().to_path_buf()
        };
        assert!(db_path.exists(), "persisted database should survive drop");
    }

    #[test]
    fn test_missing_dump_dir_leaves_no_orphan() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("mock_dir");
        let result = TestDb::builder("sqlite://")
            .dump_dir(&missing)
            .tmp_path(tmp.path())
            .build();
        assert!(result.is_err());
        let orphan = tmp.path().join(format!("{}_mock_dir.db", test_username()));
        assert!(!orphan.exists(), "failed setup should not leak a database");
    }

    #[test]
    fn test_population_failure_leaves_no_orphan() {
        let tmp = tempfile::tempdir().unwrap();
        let dump = tmp.path().join("bad_db");
        fs::create_dir(&dump).unwrap();
        fs::write(dump.join("table.sql"), "CREATE BOGUS SYNTAX").unwrap();
        let result = TestDb::builder("sqlite://")
            .dump_dir(&dump)
            .tmp_path(tmp.path())
            .build();
        assert!(result.is_err());
        let orphan = tmp.path().join(format!("{}_bad_db.db", test_username()));
        assert!(!orphan.exists(), "failed population should not leak a database");
    }

    #[test]
    fn test_existing_database_is_replaced() {
        let tmp = tempfile::tempdir().unwrap();
        // Leave a stale file with data where the new database will go
        let stale = tmp.path().join(format!("{}_testdb.db", test_username()));
        let conn = Connection::open(&stale).unwrap();
        conn.execute("CREATE TABLE leftover (id INTEGER)", [])
            .unwrap();
        conn.close().map_err(|(_, e)| e).unwrap();

        let db = TestDb::builder("sqlite://")
            .tmp_path(tmp.path())
            .build()
            .unwrap();
        assert!(
            !db.dbc().table_exists("leftover").unwrap(),
            "pre-existing database should have been dropped first"
        );
    }
}
