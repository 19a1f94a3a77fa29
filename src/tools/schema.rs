//! Schema introspection tools.
//!
//! This module implements the `list_databases`, `list_tables` and
//! `describe_table` MCP tools.

use crate::db::{ConnectionHandle, DatabaseClient, MySqlHandle, QueryContext, Row};
use crate::error::DbResult;
use crate::tools::tokens::{TokenTracking, TokenUsage};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Input for the list_databases tool. Takes no arguments.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ListDatabasesInput {}

/// Output for the list_databases tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ListDatabasesOutput {
    pub databases: Vec<String>,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
}

/// Input for the list_tables tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListTablesInput {
    /// Database name from list_databases
    pub database: String,
}

/// Output from the list_tables tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ListTablesOutput {
    pub database: String,
    pub tables: Vec<String>,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
}

/// Input for the describe_table tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DescribeTableInput {
    /// Database containing the table
    pub database: String,
    /// Table name from list_tables
    pub table: String,
}

/// Output from the describe_table tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct DescribeTableOutput {
    pub database: String,
    pub table: String,
    /// One entry per column with the server's DESCRIBE fields
    /// (Field, Type, Null, Key, Default, Extra)
    pub columns: Vec<Row>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
}

/// Handler for schema introspection tools.
pub struct SchemaToolHandler<H: ConnectionHandle = MySqlHandle> {
    client: Arc<DatabaseClient<H>>,
    tokens: TokenTracking,
}

impl<H: ConnectionHandle> SchemaToolHandler<H> {
    pub fn new(client: Arc<DatabaseClient<H>>, tokens: TokenTracking) -> Self {
        Self { client, tokens }
    }

    pub async fn list_databases(&self, ctx: &QueryContext) -> DbResult<ListDatabasesOutput> {
        info!("Listing databases");

        let databases = self.client.list_databases(ctx).await?;
        let mut output = ListDatabasesOutput {
            count: databases.len(),
            databases,
            token_usage: None,
        };
        output.token_usage = self.tokens.usage(&ListDatabasesInput::default(), &output);
        Ok(output)
    }

    pub async fn list_tables(
        &self,
        ctx: &QueryContext,
        input: ListTablesInput,
    ) -> DbResult<ListTablesOutput> {
        info!(database = %input.database, "Listing tables");

        let tables = self.client.list_tables(ctx, &input.database).await?;
        let mut output = ListTablesOutput {
            database: input.database.clone(),
            count: tables.len(),
            tables,
            token_usage: None,
        };
        output.token_usage = self.tokens.usage(&input, &output);
        Ok(output)
    }

    pub async fn describe_table(
        &self,
        ctx: &QueryContext,
        input: DescribeTableInput,
    ) -> DbResult<DescribeTableOutput> {
        info!(database = %input.database, table = %input.table, "Describing table");

        let columns = self
            .client
            .describe_table(ctx, &input.database, &input.table)
            .await?;
        let mut output = DescribeTableOutput {
            database: input.database.clone(),
            table: input.table.clone(),
            columns,
            token_usage: None,
        };
        output.token_usage = self.tokens.usage(&input, &output);
        Ok(output)
    }
}

impl<H: ConnectionHandle> Clone for SchemaToolHandler<H> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            tokens: self.tokens.clone(),
        }
    }
}
