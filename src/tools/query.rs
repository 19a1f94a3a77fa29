//! Query execution tool.
//!
//! This module implements the `run_query` MCP tool. SQL is forwarded to the
//! server unmodified; read-only access is the responsibility of the MySQL
//! account the server connects with.

use crate::db::{ConnectionHandle, DatabaseClient, MySqlHandle, QueryContext, Row};
use crate::error::DbResult;
use crate::tools::tokens::{TokenTracking, TokenUsage};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Input for the run_query tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RunQueryInput {
    /// SQL statement to execute, e.g. SELECT or SHOW
    pub sql: String,
    /// Maximum rows to return. Omitted, zero, negative or larger than the
    /// server limit means the server limit.
    #[serde(default)]
    pub max_rows: Option<i64>,
}

/// Output from the run_query tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct RunQueryOutput {
    /// Result rows as column name to value maps, in column order
    pub rows: Vec<Row>,
    /// Number of rows returned
    pub count: usize,
    /// Row cap applied to this call
    pub max_rows: usize,
    /// True if the row cap was reached and more rows may exist
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
}

/// Handler for the run_query tool.
pub struct QueryToolHandler<H: ConnectionHandle = MySqlHandle> {
    client: Arc<DatabaseClient<H>>,
    tokens: TokenTracking,
}

impl<H: ConnectionHandle> QueryToolHandler<H> {
    pub fn new(client: Arc<DatabaseClient<H>>, tokens: TokenTracking) -> Self {
        Self { client, tokens }
    }

    pub async fn run_query(
        &self,
        ctx: &QueryContext,
        input: RunQueryInput,
    ) -> DbResult<RunQueryOutput> {
        let requested = input.max_rows.unwrap_or(0);
        let max_rows = self.client.config().effective_row_cap(requested);
        info!(sql_len = input.sql.len(), max_rows, "Running query");

        let rows = self.client.run_query(ctx, &input.sql, requested).await?;
        let truncated = rows.len() >= max_rows;
        if truncated {
            warn!(limit = max_rows, "Query result truncated");
        }

        let mut output = RunQueryOutput {
            count: rows.len(),
            rows,
            max_rows,
            truncated,
            token_usage: None,
        };
        output.token_usage = self.tokens.usage(&input, &output);
        Ok(output)
    }
}

impl<H: ConnectionHandle> Clone for QueryToolHandler<H> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            tokens: self.tokens.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_query_input_max_rows_optional() {
        let input: RunQueryInput = serde_json::from_str(r#"{"sql":"SELECT 1"}"#).unwrap();
        assert_eq!(input.max_rows, None);

        let input: RunQueryInput =
            serde_json::from_str(r#"{"sql":"SELECT 1","max_rows":-5}"#).unwrap();
        assert_eq!(input.max_rows, Some(-5));
    }

    #[test]
    fn test_run_query_input_requires_sql() {
        let result: Result<RunQueryInput, _> = serde_json::from_str(r#"{"max_rows":5}"#);
        assert!(result.is_err());
    }
}
