//! MySQL MCP Server Library
//!
//! This library provides MCP (Model Context Protocol) tools for AI assistants
//! to explore and query a MySQL database: list databases and tables, describe
//! tables and run row-capped, time-bounded queries.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod mcp;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use db::{ClientConfig, DatabaseClient, QueryContext};
pub use error::{DbError, DbResult};
pub use mcp::MySqlService;
