//! MCP service implementation using rmcp.
//!
//! This module defines the MySqlService struct with the database tools
//! exposed via the MCP protocol using the rmcp framework's macros.

use crate::db::{DatabaseClient, QueryContext};
use crate::tools::query::{QueryToolHandler, RunQueryInput, RunQueryOutput};
use crate::tools::schema::{
    DescribeTableInput, DescribeTableOutput, ListDatabasesOutput, ListTablesInput,
    ListTablesOutput, SchemaToolHandler,
};
use crate::tools::tokens::TokenTracking;
use rmcp::Json;
use rmcp::{
    ErrorData as McpError, RoleServer, ServerHandler,
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{Implementation, ProtocolVersion, ServerCapabilities, ServerInfo},
    service::RequestContext,
    tool, tool_handler, tool_router,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct MySqlService {
    /// Shared database client, closed by the transport on shutdown
    client: Arc<DatabaseClient>,
    schema: SchemaToolHandler,
    query: QueryToolHandler,
    /// Tool router for MCP tool dispatch (auto-generated)
    tool_router: ToolRouter<Self>,
}

impl MySqlService {
    /// Create a new service over a connected client.
    pub fn new(client: Arc<DatabaseClient>, tokens: TokenTracking) -> Self {
        Self {
            schema: SchemaToolHandler::new(Arc::clone(&client), tokens.clone()),
            query: QueryToolHandler::new(Arc::clone(&client), tokens),
            client,
            tool_router: Self::tool_router(),
        }
    }

    pub fn client(&self) -> &Arc<DatabaseClient> {
        &self.client
    }

    /// Per-call context tied to the request's cancellation token. A
    /// `notifications/cancelled` from the client ends the query with
    /// `Cancelled`; the configured query timeout still applies.
    fn call_context(ct: &CancellationToken) -> QueryContext {
        QueryContext::new().with_cancellation(ct.clone())
    }
}

#[tool_router]
impl MySqlService {
    #[tool(description = "List all databases visible to the configured MySQL account.")]
    async fn list_databases(
        &self,
        context: RequestContext<RoleServer>,
    ) -> Result<Json<ListDatabasesOutput>, McpError> {
        self.schema
            .list_databases(&Self::call_context(&context.ct))
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(description = "List all tables in a database.\nUse a database name from list_databases.")]
    async fn list_tables(
        &self,
        Parameters(input): Parameters<ListTablesInput>,
        context: RequestContext<RoleServer>,
    ) -> Result<Json<ListTablesOutput>, McpError> {
        self.schema
            .list_tables(&Self::call_context(&context.ct), input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Describe the columns of a table.\nReturns one entry per column with Field, Type, Null, Key, Default and Extra."
    )]
    async fn describe_table(
        &self,
        Parameters(input): Parameters<DescribeTableInput>,
        context: RequestContext<RoleServer>,
    ) -> Result<Json<DescribeTableOutput>, McpError> {
        self.schema
            .describe_table(&Self::call_context(&context.ct), input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Execute a SQL statement and return its rows.\nResults are capped at max_rows (and never more than the server limit); `truncated` is true when the cap was reached.\nQualify tables with their database (`db.table`) since no default database is selected."
    )]
    async fn run_query(
        &self,
        Parameters(input): Parameters<RunQueryInput>,
        context: RequestContext<RoleServer>,
    ) -> Result<Json<RunQueryOutput>, McpError> {
        self.query
            .run_query(&Self::call_context(&context.ct), input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }
}

#[tool_handler]
impl ServerHandler for MySqlService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "mysql-mcp-server".to_owned(),
                title: Some("MySQL MCP Server".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Tools for exploring and querying a MySQL server.\n\
                \n\
                ## Workflow\n\
                1. Call `list_databases` to see available databases\n\
                2. Call `list_tables` with a database name\n\
                3. Call `describe_table` to inspect columns before writing queries\n\
                4. Call `run_query` with fully qualified table names (`db.table`)\n\
                \n\
                ## Limits\n\
                - `run_query` returns at most the server's row limit; check `truncated`\n\
                - Every call is bounded by the server's query timeout\n\
                - Database and table names containing backticks are rejected"
                    .to_string(),
            ),
        }
    }
}
