//! The database client facade.
//!
//! [`DatabaseClient`] exposes the four read operations the server offers:
//! list databases, list tables, describe a table and run a query. Each call
//! validates its input first, then runs under a [`QueryContext`] bounded by
//! the configured query timeout.
//!
//! Operations scoped to a database use a [`DatabaseScope`]: one session is
//! checked out, `USE` selects the database and the follow-up statement runs
//! on that same session. The session is retired afterwards so a connection
//! with a changed default database never returns to the pool.

use crate::db::decoder::first_column_strings;
use crate::db::executor::{QueryContext, QueryExecutor, fetch_rows};
use crate::db::identifier::{SafeIdentifier, statements};
use crate::db::pool::{ConnectionHandle, MySqlHandle, PoolSettings, Session};
use crate::db::types::Row;
use crate::error::{DbError, DbResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Default cap on rows returned by [`DatabaseClient::run_query`].
pub const DEFAULT_MAX_ROWS: usize = 200;

/// Default bound on every operation.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Row cap and timeout for a [`DatabaseClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    max_rows: usize,
    query_timeout: Duration,
}

impl ClientConfig {
    /// A `max_rows` of 0 selects [`DEFAULT_MAX_ROWS`]. A zero timeout is
    /// rejected.
    pub fn new(max_rows: usize, query_timeout: Duration) -> DbResult<Self> {
        if query_timeout.is_zero() {
            return Err(DbError::config("query timeout must be greater than zero"));
        }
        Ok(Self {
            max_rows: if max_rows == 0 {
                DEFAULT_MAX_ROWS
            } else {
                max_rows
            },
            query_timeout,
        })
    }

    pub fn max_rows(&self) -> usize {
        self.max_rows
    }

    pub fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    /// The row cap for a call requesting `requested` rows.
    ///
    /// Positive requests up to the configured maximum are honored; zero,
    /// negative and oversized requests fall back to the maximum.
    pub fn effective_row_cap(&self, requested: i64) -> usize {
        match usize::try_from(requested) {
            Ok(n) if n > 0 && n <= self.max_rows => n,
            _ => self.max_rows,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_rows: DEFAULT_MAX_ROWS,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }
}

/// A session with a database selected.
pub struct DatabaseScope<S: Session> {
    session: S,
    database: SafeIdentifier,
}

impl<S: Session> DatabaseScope<S> {
    /// Select `database` on `session`. Any failure is a selection error.
    pub async fn enter(mut session: S, database: SafeIdentifier) -> DbResult<Self> {
        session.retire_on_release();
        session
            .execute(&statements::use_database(&database))
            .await
            .map_err(|e| DbError::selection(database.as_str(), e.to_string()))?;
        debug!(database = %database, "Selected database");
        Ok(Self { session, database })
    }

    pub fn database(&self) -> &SafeIdentifier {
        &self.database
    }

    pub async fn fetch_rows(&mut self, sql: &str) -> DbResult<Vec<Row>> {
        fetch_rows(&mut self.session, sql, None).await
    }
}

/// Read-only access to a MySQL server.
pub struct DatabaseClient<H: ConnectionHandle = MySqlHandle> {
    handle: H,
    config: ClientConfig,
    executor: QueryExecutor,
    closed: AtomicBool,
}

impl<H: ConnectionHandle> std::fmt::Debug for DatabaseClient<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseClient")
            .field("config", &self.config)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl DatabaseClient<MySqlHandle> {
    /// Connect to the server described by `settings`.
    pub async fn connect(settings: &PoolSettings, config: ClientConfig) -> DbResult<Self> {
        let handle = MySqlHandle::connect(settings).await?;
        Self::with_handle(handle, config)
    }
}

impl<H: ConnectionHandle> DatabaseClient<H> {
    /// Build a client over an open handle.
    pub fn with_handle(handle: H, config: ClientConfig) -> DbResult<Self> {
        if handle.is_closed() {
            return Err(DbError::config("connection handle is closed"));
        }
        Ok(Self {
            executor: QueryExecutor::new(config.query_timeout),
            handle,
            config,
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn handle(&self) -> &H {
        &self.handle
    }

    /// Names of all databases visible to the connected user.
    #[instrument(skip_all)]
    pub async fn list_databases(&self, ctx: &QueryContext) -> DbResult<Vec<String>> {
        self.ensure_open()?;
        let rows = self
            .executor
            .run(&self.handle, ctx, statements::SHOW_DATABASES, None)
            .await?;
        first_column_strings(rows)
    }

    /// Names of the tables in `database`.
    #[instrument(skip(self, ctx))]
    pub async fn list_tables(&self, ctx: &QueryContext, database: &str) -> DbResult<Vec<String>> {
        let database = SafeIdentifier::validate("database", database)?;
        self.ensure_open()?;

        self.executor
            .bounded(ctx, "list tables", async {
                let session = self.handle.acquire().await?;
                let mut scope = DatabaseScope::enter(session, database).await?;
                let rows = scope.fetch_rows(statements::SHOW_TABLES).await?;
                first_column_strings(rows)
            })
            .await
    }

    /// Column descriptions of `table` in `database`, one row per column as
    /// reported by `DESCRIBE`.
    #[instrument(skip(self, ctx))]
    pub async fn describe_table(
        &self,
        ctx: &QueryContext,
        database: &str,
        table: &str,
    ) -> DbResult<Vec<Row>> {
        let database = SafeIdentifier::validate("database", database)?;
        let table = SafeIdentifier::validate("table", table)?;
        self.ensure_open()?;

        let sql = statements::describe_table(&table);
        self.executor
            .bounded(ctx, "describe table", async {
                let session = self.handle.acquire().await?;
                let mut scope = DatabaseScope::enter(session, database).await?;
                scope.fetch_rows(&sql).await
            })
            .await
    }

    /// Run caller-supplied SQL and return at most the effective row cap.
    ///
    /// The statement is passed through unmodified; permission to read is
    /// enforced by the server account.
    #[instrument(skip(self, ctx, sql), fields(sql_len = sql.len()))]
    pub async fn run_query(
        &self,
        ctx: &QueryContext,
        sql: &str,
        max_rows: i64,
    ) -> DbResult<Vec<Row>> {
        if sql.trim().is_empty() {
            return Err(DbError::invalid_input("sql is required"));
        }
        self.ensure_open()?;

        let row_cap = self.config.effective_row_cap(max_rows);
        let rows = self
            .executor
            .run(&self.handle, ctx, sql, Some(row_cap))
            .await?;

        if rows.len() == row_cap {
            debug!(row_cap, "Result reached the row cap");
        }
        Ok(rows)
    }

    /// Close the underlying handle. Later calls are no-ops.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            debug!("Database client already closed");
            return;
        }
        info!("Closing database connections");
        self.handle.close().await;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.handle.is_closed()
    }

    fn ensure_open(&self) -> DbResult<()> {
        if self.is_closed() {
            return Err(DbError::Closed);
        }
        Ok(())
    }
}
