//! Database connection handler
//!
//! This module provides the main type to connect to and access databases.
//! It is an ORM-less wrapper: data is only accessed via SQL, either through
//! caller-owned connections or through the transactional scopes below.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, bail, Result};
use rusqlite::{Connection, Params, Transaction};

use crate::database::url::{DbUrl, Dialect};

const TEST_SCOPE_SAVEPOINT: &str = "petri_scope";

/// Reflected metadata for a single table: column names in backend order and
/// the subset forming the primary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub columns: Vec<String>,
    pub primary_key: Vec<String>,
}

/// Database connection handler, providing also the database's schema and
/// properties.
///
/// The schema snapshot reflects backend state at the time of the last
/// [`DbConnection::load_metadata`] call; external DDL makes it stale until
/// the caller refreshes it explicitly.
pub struct DbConnection {
    url: DbUrl,
    tables: BTreeMap<String, TableInfo>,
}

impl DbConnection {
    /// Opens a connection wrapper for the given URL and reflects the schema.
    pub fn open(url: &str) -> Result<Self> {
        Self::from_url(url.parse()?, true)
    }

    /// Opens a connection wrapper for an already-parsed URL, optionally
    /// reflecting the schema immediately.
    pub fn from_url(url: DbUrl, reflect: bool) -> Result<Self> {
        let mut dbc = DbConnection {
            url,
            tables: BTreeMap::new(),
        };
        if reflect {
            dbc.load_metadata()?;
        }
        Ok(dbc)
    }

    /// Returns the database URL, including the password if any.
    pub fn url(&self) -> String {
        self.url.as_string()
    }

    /// Returns the database URL with the password masked.
    pub fn masked_url(&self) -> String {
        self.url.masked()
    }

    /// Returns the database name (the file path for the embedded engine).
    pub fn db_name(&self) -> Option<&str> {
        self.url.database()
    }

    pub fn host(&self) -> Option<&str> {
        self.url.host()
    }

    pub fn port(&self) -> Option<u16> {
        self.url.port()
    }

    pub fn dialect(&self) -> Dialect {
        self.url.dialect()
    }

    /// Replaces the in-memory schema snapshot with a fresh reflection.
    ///
    /// A full reflect rather than an incremental merge, so tables that no
    /// longer exist in the backend are dropped from the snapshot.
    pub fn load_metadata(&mut self) -> Result<()> {
        let conn = self.connect()?;
        let mut tables = BTreeMap::new();
        let mut stmt = conn
            .prepare(
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
                 ORDER BY name",
            )
            .map_err(|e| anyhow!("Failed to list tables: {e}"))?;
        let names: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .map_err(|e| anyhow!("Failed to list tables: {e}"))?
            .collect::<Result<_, _>>()
            .map_err(|e| anyhow!("Failed to list tables: {e}"))?;
        for name in names {
            tables.insert(name.clone(), Self::reflect_table(&conn, &name)?);
        }
        self.tables = tables;
        Ok(())
    }

    fn reflect_table(conn: &Connection, table: &str) -> Result<TableInfo> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info(\"{table}\")"))
            .map_err(|e| anyhow!("Failed to reflect table '{table}': {e}"))?;
        // (cid-ordered column name, 1-based primary key position or 0)
        let rows: Vec<(String, i64)> = stmt
            .query_map([], |row| Ok((row.get(1)?, row.get(5)?)))
            .map_err(|e| anyhow!("Failed to reflect table '{table}': {e}"))?
            .collect::<Result<_, _>>()
            .map_err(|e| anyhow!("Failed to reflect table '{table}': {e}"))?;
        let columns = rows.iter().map(|(name, _)| name.clone()).collect();
        let mut key_parts: Vec<(i64, String)> = rows
            .into_iter()
            .filter(|(_, pk)| *pk > 0)
            .map(|(name, pk)| (pk, name))
            .collect();
        key_parts.sort();
        let primary_key = key_parts.into_iter().map(|(_, name)| name).collect();
        Ok(TableInfo {
            columns,
            primary_key,
        })
    }

    /// Returns the reflected tables keyed to their name; empty if no
    /// metadata was loaded.
    pub fn tables(&self) -> &BTreeMap<String, TableInfo> {
        &self.tables
    }

    fn table_info(&self, table: &str) -> Result<&TableInfo> {
        self.tables
            .get(table)
            .ok_or_else(|| anyhow!("table '{table}' not found in schema metadata"))
    }

    /// Returns the column names for the given table, in backend order.
    pub fn columns(&self, table: &str) -> Result<Vec<String>> {
        Ok(self.table_info(table)?.columns.clone())
    }

    /// Returns the primary key column names for the given table.
    pub fn primary_key_columns(&self, table: &str) -> Result<Vec<String>> {
        Ok(self.table_info(table)?.primary_key.clone())
    }

    /// Applies schema statements in order and re-reflects the metadata.
    pub fn create_tables(&mut self, statements: &[&str]) -> Result<()> {
        let conn = self.connect()?;
        for statement in statements {
            conn.execute(statement, [])
                .map_err(|e| anyhow!("Failed to apply schema statement: {e}"))?;
        }
        self.load_metadata()
    }

    /// Returns a new live connection; the caller owns its lifecycle.
    ///
    /// The embedded engine opens connections per use (pool-less), so this
    /// is cheap; networked dialects are not supported.
    pub fn connect(&self) -> Result<Connection> {
        match self.url.dialect() {
            Dialect::Sqlite => {}
            other => bail!(
                "unsupported backend '{other}': only the embedded sqlite engine can be opened"
            ),
        }
        let database = self
            .url
            .database()
            .ok_or_else(|| anyhow!("database URL '{}' has no database name", self.masked_url()))?;
        Connection::open(Path::new(database))
            .map_err(|e| anyhow!("Failed to open database '{database}': {e}"))
    }

    /// Executes a single statement on a fresh connection, returning the
    /// number of affected rows.
    pub fn execute(&self, sql: &str) -> Result<usize> {
        let conn = self.connect()?;
        conn.execute(sql, [])
            .map_err(|e| anyhow!("Failed to execute SQL: {e}"))
    }

    /// Checks if a table exists in the backend (not the snapshot).
    pub fn table_exists(&self, table: &str) -> Result<bool> {
        let conn = self.connect()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |row| row.get(0),
            )
            .map_err(|e| anyhow!("Failed to check table existence: {e}"))?;
        Ok(count > 0)
    }

    /// Returns the row count for a table.
    pub fn count_rows(&self, table: &str) -> Result<u64> {
        let conn = self.connect()?;
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
            row.get(0)
        })
        .map_err(|e| anyhow!("Failed to count rows in '{table}': {e}"))
    }

    /// Runs `f` inside a transaction on a dedicated connection.
    ///
    /// Commits on success; on error rolls back and propagates the original
    /// error unchanged. The connection is released on every exit path.
    pub fn session_scope<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.connect()?;
        let tx = conn
            .transaction()
            .map_err(|e| anyhow!("Failed to begin transaction: {e}"))?;
        match f(&tx) {
            Ok(value) => {
                tx.commit()
                    .map_err(|e| anyhow!("Failed to commit transaction: {e}"))?;
                Ok(value)
            }
            Err(e) => {
                let _ = tx.rollback();
                Err(e)
            }
        }
    }

    /// Runs `f` in a scope whose changes are always rolled back at the end.
    ///
    /// The session runs inside an outer transaction that is never
    /// committed; [`TestSession::commit`] only cycles a savepoint, so
    /// commits inside the scope cannot escape the final rollback. Bear in
    /// mind that storage engines without transaction support will not honor
    /// the rollback.
    pub fn test_session_scope<T>(&self, f: impl FnOnce(&TestSession) -> Result<T>) -> Result<T> {
        let conn = self.connect()?;
        conn.execute_batch(&format!("BEGIN; SAVEPOINT {TEST_SCOPE_SAVEPOINT};"))
            .map_err(|e| anyhow!("Failed to begin test scope: {e}"))?;
        let session = TestSession { conn };
        let result = f(&session);
        // Whatever happened in the scope, discard it all.
        let _ = session.conn.execute_batch("ROLLBACK");
        result
    }

    /// Consumes the wrapper, releasing its resources.
    ///
    /// Connections are opened per operation for the embedded engine, so
    /// this only ends the wrapper's lifetime; constructing a new wrapper is
    /// required for any further use.
    pub fn dispose(self) {
        drop(self);
    }
}

impl std::fmt::Debug for DbConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConnection")
            .field("url", &self.masked_url())
            .finish()
    }
}

/// Unit-of-work handle yielded by [`DbConnection::test_session_scope`].
pub struct TestSession {
    conn: Connection,
}

impl TestSession {
    /// Returns the underlying connection for queries.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Executes a statement within the scope.
    pub fn execute<P: Params>(&self, sql: &str, params: P) -> Result<usize> {
        self.conn
            .execute(sql, params)
            .map_err(|e| anyhow!("Failed to execute SQL: {e}"))
    }

    /// Commits work done so far *within the scope*.
    ///
    /// Releases the scope savepoint and opens a new one; the outer
    /// transaction still rolls everything back when the scope ends.
    pub fn commit(&self) -> Result<()> {
        self.conn
            .execute_batch(&format!(
                "RELEASE SAVEPOINT {TEST_SCOPE_SAVEPOINT}; SAVEPOINT {TEST_SCOPE_SAVEPOINT};"
            ))
            .map_err(|e| anyhow!("Failed to commit test scope savepoint: {e}"))
    }

    /// Returns the row count for a table as seen from inside the scope.
    pub fn count_rows(&self, table: &str) -> Result<u64> {
        self.conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get(0)
            })
            .map_err(|e| anyhow!("Failed to count rows in '{table}': {e}"))
    }
}
