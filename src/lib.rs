#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! Petri - a utility toolkit for genomics pipelines
//!
//! Petri collects the small, independent helpers that genomics tooling
//! keeps reinventing: ephemeral test databases, file checksums, remote
//! file loading, and CLI/logging setup. Each module is a shallow layer
//! over a mature crate; the heavy lifting (SQL execution, transactions,
//! hashing, HTTP fetch) is delegated.
//!
//! # Modules
//!
//! | Module | Description | Key Dependencies |
//! |--------|-------------|------------------|
//! | [`database`] | Connection wrapper, schema reflection, ephemeral test databases | `rusqlite` |
//! | [`testkit`] | Test fixtures: database factory, file comparison | - |
//! | [`cli`] | Validating value parsers and reusable argument groups | `clap` |
//! | [`logging`] | Logging initialization (stderr + optional file sink) | `tracing-subscriber` |
//! | [`checksums`] | File hashing and validation | `md-5`, `sha1`, `sha2` |
//! | [`rloader`] | Remote file loading with format-specific parsing | `oneio`, `config` |
//! | [`archive`] | Transparent gzip reading and extraction | `oneio` |
//! | [`config`] | Toolkit configuration file and environment overrides | `config` |
//!
//! # Quick Start Examples
//!
//! ## Ephemeral test databases
//!
//! ```rust,ignore
//! use petri::database::TestDb;
//!
//! // Create <user>_mock_db from a dump directory (schema + TSV files),
//! // dropped automatically when `db` goes out of scope.
//! let db = TestDb::new("sqlite://", Some(Path::new("tests/data/mock_db")))?;
//! assert_eq!(db.dbc().count_rows("gibberish")?, 6);
//! ```
//!
//! ## Connection scopes
//!
//! ```rust,ignore
//! use petri::database::DbConnection;
//!
//! let dbc = DbConnection::open("sqlite:///work/my_db.db")?;
//! // Committing scope: rolls back and re-raises on error
//! dbc.session_scope(|tx| {
//!     tx.execute("INSERT INTO gibberish VALUES (7, 'grp4', 1)", [])?;
//!     Ok(())
//! })?;
//! // Test scope: always rolled back, even after an in-scope commit
//! dbc.test_session_scope(|session| {
//!     session.execute("DELETE FROM gibberish", [])?;
//!     session.commit()?;
//!     Ok(())
//! })?;
//! ```
//!
//! ## Checksums
//!
//! ```rust,ignore
//! use petri::checksums::{file_hash, HashAlgorithm};
//!
//! let digest = file_hash(Path::new("genome.fa"), HashAlgorithm::Md5)?;
//! ```

pub mod archive;
pub mod checksums;
pub mod cli;
pub mod config;
pub mod database;
pub mod logging;
pub mod rloader;
pub mod testkit;

// =============================================================================
// Configuration
// =============================================================================

pub use crate::config::PetriConfig;

// =============================================================================
// Database Module - Re-export commonly used types
// =============================================================================

pub use database::{DbConnection, DbUrl, Dialect, TableInfo, TestDb, TestDbBuilder, TestSession};

// =============================================================================
// Helper modules
// =============================================================================

pub use checksums::{file_hash, validate_file_hash, HashAlgorithm};
pub use logging::{init_logging, init_logging_with_args};
pub use rloader::{FileFormat, RemoteContent, RemoteFileLoader};
pub use testkit::DbFactory;
