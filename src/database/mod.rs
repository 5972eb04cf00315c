//! Database module
//!
//! This module provides all database functionality for petri, organized
//! into:
//!
//! - **url**: database URL parsing and dialect selection
//! - **connection**: ORM-less connection wrapper with schema reflection and
//!   transactional scopes
//! - **testdb**: ephemeral, self-cleaning test databases populated from
//!   dump directories or schema descriptors
//!
//! # Architecture
//!
//! ```text
//! database/
//! ├── url         # DbUrl / Dialect
//! ├── connection  # DbConnection, TestSession, TableInfo
//! └── testdb      # TestDb, TestDbBuilder
//! ```
//!
//! # Backend strategy
//!
//! The executable backend is the embedded SQLite engine. URLs for
//! networked dialects parse fine (so tooling can pass them around and mask
//! passwords), but opening them fails fast with an unsupported-backend
//! error.

mod connection;
mod testdb;
mod url;

pub use connection::{DbConnection, TableInfo, TestSession};
pub use testdb::{TestDb, TestDbBuilder};
pub use url::{DbUrl, Dialect};
