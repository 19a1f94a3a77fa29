//! Error types for the MySQL MCP Server.
//!
//! Every failure the database core can report is a variant of [`DbError`].
//! Variants carry enough context for an AI assistant to understand what went
//! wrong and, where possible, a suggestion for how to recover.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid DSN: {message}")]
    Dsn { message: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("{message}")]
    InvalidInput { message: String },

    #[error("invalid {field} name")]
    InvalidIdentifier { field: &'static str },

    #[error("Failed to select database '{database}': {message}")]
    Selection { database: String, message: String },

    #[error("Query failed: {message}")]
    Query {
        message: String,
        /// e.g., "42S02" for unknown table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Failed to decode result set: {message}")]
    Decode { message: String },

    #[error("Timeout: {operation} exceeded {elapsed_ms}ms")]
    Timeout { operation: String, elapsed_ms: u64 },

    #[error("Cancelled: {operation}")]
    Cancelled { operation: String },

    #[error("Database client is closed")]
    Closed,

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a DSN parsing error.
    pub fn dsn(message: impl Into<String>) -> Self {
        Self::Dsn {
            message: message.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create an invalid input error. The message is shown verbatim.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn invalid_identifier(field: &'static str) -> Self {
        Self::InvalidIdentifier { field }
    }

    /// Create a database selection error for the first step of a two-step operation.
    pub fn selection(database: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Selection {
            database: database.into(),
            message: message.into(),
        }
    }

    /// Create a query error with optional SQL state.
    pub fn query(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Query {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_ms,
        }
    }

    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Query { suggestion, .. } => Some(suggestion),
            Self::Selection { .. } => Some("Call list_databases to see which databases exist"),
            Self::Timeout { .. } => {
                Some("Consider increasing the query timeout or narrowing the query")
            }
            _ => None,
        }
    }

    /// Whether the error was caused by the caller's input and never reached the database.
    pub fn is_caller_fault(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput { .. } | Self::InvalidIdentifier { .. }
        )
    }

    /// Reclassify an error raised while an operation was running. Losing
    /// the server at that point is a statement failure; `Connection` is
    /// kept for failures while the client is being built.
    pub(crate) fn into_statement_error(self) -> Self {
        match self {
            Self::Connection {
                message,
                suggestion,
            } => Self::Query {
                message,
                sql_state: None,
                suggestion,
            },
            other => other,
        }
    }

    /// Reclassify an error raised while iterating a result set that had
    /// already produced rows. Driver-level faults at that point are decode
    /// failures; deadline and cancellation errors keep their kind.
    pub(crate) fn into_mid_stream(self, rows_read: usize) -> Self {
        match self {
            Self::Timeout { .. } | Self::Cancelled { .. } | Self::Decode { .. } => self,
            other => Self::decode(format!("after {} rows: {}", rows_read, other)),
        }
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::config(msg.to_string()),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::query(
                    db_err.message(),
                    code,
                    "Check the SQL syntax, referenced objects and privileges",
                )
            }
            sqlx::Error::RowNotFound => DbError::query(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::PoolTimedOut => DbError::timeout("connection pool acquire", 0),
            sqlx::Error::PoolClosed => DbError::Closed,
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::decode(format!(
                "column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::decode(format!("column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::decode(source.to_string()),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Build suggestion data as JSON value.
fn suggestion_data(suggestion: Option<&str>) -> Option<serde_json::Value> {
    suggestion.map(|s| serde_json::json!({ "suggestion": s }))
}

/// Convert DbError to MCP ErrorData for semantic error categorization.
/// Includes the suggestion field in the `data` object when available.
impl From<DbError> for rmcp::ErrorData {
    fn from(err: DbError) -> Self {
        let data = suggestion_data(err.suggestion());
        match &err {
            // Caller faults -> invalid_params
            DbError::InvalidInput { .. } | DbError::InvalidIdentifier { .. } => {
                rmcp::ErrorData::invalid_params(err.to_string(), data)
            }

            DbError::Selection { .. } => rmcp::ErrorData::resource_not_found(err.to_string(), data),

            // Query errors -> invalid_params with sql_state in message
            DbError::Query {
                message, sql_state, ..
            } => {
                let msg = match sql_state {
                    Some(code) => format!("{} (SQLSTATE: {})", message, code),
                    None => message.clone(),
                };
                rmcp::ErrorData::invalid_params(msg, data)
            }

            // Everything else is on the server side
            DbError::Config { .. }
            | DbError::Dsn { .. }
            | DbError::Connection { .. }
            | DbError::Decode { .. }
            | DbError::Timeout { .. }
            | DbError::Cancelled { .. }
            | DbError::Closed
            | DbError::Internal { .. } => rmcp::ErrorData::internal_error(err.to_string(), data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_input_message_is_verbatim() {
        let err = DbError::invalid_input("sql is required");
        assert_eq!(err.to_string(), "sql is required");
    }

    #[test]
    fn test_invalid_identifier_message() {
        assert_eq!(
            DbError::invalid_identifier("database").to_string(),
            "invalid database name"
        );
        assert_eq!(
            DbError::invalid_identifier("table").to_string(),
            "invalid table name"
        );
    }

    #[test]
    fn test_caller_fault() {
        assert!(DbError::invalid_input("x").is_caller_fault());
        assert!(DbError::invalid_identifier("table").is_caller_fault());
        assert!(!DbError::timeout("query", 10).is_caller_fault());
        assert!(!DbError::selection("db", "unknown").is_caller_fault());
    }

    #[test]
    fn test_mid_stream_reclassification() {
        let err = DbError::connection("I/O error: reset", "retry").into_mid_stream(3);
        assert!(matches!(err, DbError::Decode { .. }));
        assert!(err.to_string().contains("after 3 rows"));

        let err = DbError::timeout("query execution", 100).into_mid_stream(3);
        assert!(matches!(err, DbError::Timeout { .. }));
    }

    #[test]
    fn test_query_error_suggestion() {
        let err = DbError::query("syntax error", Some("42000".to_string()), "Check SQL syntax");
        assert_eq!(err.suggestion(), Some("Check SQL syntax"));
    }

    #[test]
    fn test_invalid_input_maps_to_invalid_params() {
        let mcp_err: rmcp::ErrorData = DbError::invalid_input("bad input").into();
        assert_eq!(mcp_err.code.0, -32602);
    }

    #[test]
    fn test_invalid_identifier_maps_to_invalid_params() {
        let mcp_err: rmcp::ErrorData = DbError::invalid_identifier("database").into();
        assert_eq!(mcp_err.code.0, -32602);
    }

    #[test]
    fn test_selection_maps_to_resource_not_found() {
        let mcp_err: rmcp::ErrorData = DbError::selection("nope", "Unknown database").into();
        assert_eq!(mcp_err.code.0, -32002);
        assert!(mcp_err.data.is_some());
    }

    #[test]
    fn test_query_error_includes_sql_state() {
        let err = DbError::query("syntax error", Some("42000".to_string()), "check syntax");
        let mcp_err: rmcp::ErrorData = err.into();
        assert!(mcp_err.message.contains("42000"));
        assert_eq!(mcp_err.data.unwrap()["suggestion"], "check syntax");
    }

    #[test]
    fn test_timeout_maps_to_internal_error() {
        let mcp_err: rmcp::ErrorData = DbError::timeout("query", 30_000).into();
        assert_eq!(mcp_err.code.0, -32603);
    }

    #[test]
    fn test_connection_error_includes_suggestion_in_data() {
        let mcp_err: rmcp::ErrorData = DbError::connection("failed", "try reconnecting").into();
        assert_eq!(mcp_err.code.0, -32603);
        assert_eq!(mcp_err.data.unwrap()["suggestion"], "try reconnecting");
    }

    #[test]
    fn test_pool_closed_maps_to_closed() {
        let err: DbError = sqlx::Error::PoolClosed.into();
        assert!(matches!(err, DbError::Closed));
    }

    #[test]
    fn test_lost_connection_during_statement_is_query_error() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let err: DbError = sqlx::Error::Io(io).into();
        assert!(matches!(err, DbError::Connection { .. }));

        match err.into_statement_error() {
            DbError::Query {
                message,
                sql_state,
                ..
            } => {
                assert!(message.contains("reset by peer"));
                assert_eq!(sql_state, None);
            }
            other => panic!("expected query error, got {:?}", other),
        }
    }

    #[test]
    fn test_statement_error_keeps_other_kinds() {
        let err = DbError::timeout("query", 10).into_statement_error();
        assert!(matches!(err, DbError::Timeout { .. }));
        let err = DbError::selection("app", "unknown").into_statement_error();
        assert!(matches!(err, DbError::Selection { .. }));
    }
}
