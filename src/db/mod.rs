//! Database access layer.
//!
//! This module provides the MySQL side of the server:
//! - DSN parsing and connection handles
//! - Bounded query execution with deadlines and row caps
//! - Schema-agnostic row decoding
//! - The [`DatabaseClient`] facade used by the MCP tools

pub mod client;
pub mod decoder;
pub mod dsn;
pub mod executor;
pub mod identifier;
pub mod pool;
pub mod types;

pub use client::{ClientConfig, DatabaseClient, DatabaseScope, DEFAULT_MAX_ROWS};
pub use dsn::Dsn;
pub use executor::{QueryContext, QueryExecutor};
pub use identifier::SafeIdentifier;
pub use pool::{ConnectionHandle, MySqlHandle, MySqlSession, PoolSettings, RowStream, Session};
pub use types::{ColumnInfo, Row, ScanSlot, ScannedRow, TypeCategory, Value};
