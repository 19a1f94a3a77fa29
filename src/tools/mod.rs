//! MCP tool implementations.
//!
//! This module contains all database tool handlers:
//! - `list_databases`: List databases visible to the server account
//! - `list_tables`: List tables in a database
//! - `describe_table`: Get table column information
//! - `run_query`: Execute a SQL statement with a row cap
//! - `tokens`: Token usage estimation attached to tool results

pub mod query;
pub mod schema;
pub mod tokens;

pub use query::{QueryToolHandler, RunQueryInput, RunQueryOutput};
pub use schema::{
    DescribeTableInput, DescribeTableOutput, ListDatabasesInput, ListDatabasesOutput,
    ListTablesInput, ListTablesOutput, SchemaToolHandler,
};
pub use tokens::{TiktokenEstimator, TokenEstimator, TokenTracking, TokenUsage};
