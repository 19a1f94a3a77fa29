//! Connection handles and sessions.
//!
//! The database core talks to the driver through two traits:
//! - [`ConnectionHandle`]: a shared pool that hands out sessions.
//! - [`Session`]: one physical connection, held for the duration of a
//!   logical operation so that `USE` and the statement after it run on the
//!   same connection.
//!
//! [`MySqlHandle`] implements both on top of an sqlx `MySqlPool`.

use crate::db::dsn::Dsn;
use crate::db::types::{self, ColumnInfo, ScannedRow};
use crate::error::{DbError, DbResult};
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use sqlx::pool::PoolConnection;
use sqlx::{Connection, Executor, MySql};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Stream of scanned rows borrowed from a session.
pub type RowStream<'a> = BoxStream<'a, DbResult<ScannedRow>>;

/// One physical connection checked out of a handle.
pub trait Session: Send {
    /// Execute a statement that returns no rows.
    fn execute(&mut self, sql: &str) -> impl Future<Output = DbResult<u64>> + Send;

    /// Execute a statement and stream its rows.
    fn fetch<'a>(&'a mut self, sql: &'a str) -> RowStream<'a>;

    /// Discard the connection instead of returning it to the pool when the
    /// session is dropped. Used once session state (the default database)
    /// has been changed.
    fn retire_on_release(&mut self) {}
}

/// A shared, cloneable source of sessions.
pub trait ConnectionHandle: Send + Sync + 'static {
    type Session: Session;

    fn acquire(&self) -> impl Future<Output = DbResult<Self::Session>> + Send;

    /// Verify the server is reachable.
    fn ping(&self) -> impl Future<Output = DbResult<()>> + Send;

    fn close(&self) -> impl Future<Output = ()> + Send;

    fn is_closed(&self) -> bool;
}

/// Pool settings for [`MySqlHandle::connect`].
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub dsn: String,
    pub max_connections: u32,
    /// Bound on establishing the first connection and on every acquire
    pub connect_timeout: Duration,
    pub idle_timeout: Option<Duration>,
}

// =============================================================================
// MySQL
// =============================================================================

#[derive(Debug, Clone)]
pub struct MySqlHandle {
    pool: MySqlPool,
}

impl MySqlHandle {
    /// Wrap an existing pool.
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Build a pool from `settings` and verify the server answers a ping.
    pub async fn connect(settings: &PoolSettings) -> DbResult<Self> {
        let dsn = Dsn::parse(&settings.dsn)?;
        let target = dsn.target().to_string();

        info!(
            target = %target,
            max_connections = settings.max_connections,
            "Connecting to MySQL"
        );

        let pool = MySqlPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.connect_timeout)
            .idle_timeout(settings.idle_timeout)
            .connect_lazy_with(dsn.into_options());
        let handle = Self::new(pool);

        let ping = tokio::time::timeout(settings.connect_timeout, handle.ping()).await;
        let failure = match ping {
            Ok(Ok(())) => {
                info!(target = %target, "Connected successfully");
                return Ok(handle);
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!(
                "no response within {}s",
                settings.connect_timeout.as_secs()
            ),
        };

        warn!(target = %target, error = %failure, "Connection check failed");
        handle.pool.close().await;
        Err(DbError::connection(
            format!("{}: {}", target, failure),
            connection_suggestion(&failure),
        ))
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

impl ConnectionHandle for MySqlHandle {
    type Session = MySqlSession;

    async fn acquire(&self) -> DbResult<MySqlSession> {
        let conn = self.pool.acquire().await?;
        Ok(MySqlSession { conn })
    }

    async fn ping(&self) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        conn.ping().await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}

/// A pooled MySQL connection.
#[derive(Debug)]
pub struct MySqlSession {
    conn: PoolConnection<MySql>,
}

impl Session for MySqlSession {
    async fn execute(&mut self, sql: &str) -> DbResult<u64> {
        debug!(sql = %sql, "Executing statement");
        let result = (&mut *self.conn).execute(sql).await?;
        Ok(result.rows_affected())
    }

    fn fetch<'a>(&'a mut self, sql: &'a str) -> RowStream<'a> {
        debug!(sql = %sql, "Executing query");
        // Column metadata is identical for every row, compute it once
        let mut columns: Option<Arc<[ColumnInfo]>> = None;
        (&mut *self.conn)
            .fetch(sql)
            .map(move |result| {
                let row = result?;
                let columns = columns
                    .get_or_insert_with(|| types::mysql::column_info(&row))
                    .clone();
                types::mysql::scan_row(&row, columns)
            })
            .boxed()
    }

    fn retire_on_release(&mut self) {
        self.conn.close_on_drop();
    }
}

/// Generate a helpful suggestion for connection errors.
fn connection_suggestion(error: &str) -> &'static str {
    let error = error.to_lowercase();

    if error.contains("connection refused") {
        return "Check that the MySQL server is running and accessible";
    }
    if error.contains("access denied") || error.contains("password") {
        return "Verify the username and password in MYSQL_DSN";
    }
    if error.contains("unknown database") {
        return "Check that the database named in MYSQL_DSN exists";
    }
    if error.contains("tls") || error.contains("ssl") {
        return "Check the tls parameter of MYSQL_DSN or try disabling it";
    }
    if error.contains("no response") {
        return "Check network connectivity or increase MYSQL_CONNECT_TIMEOUT_SECONDS";
    }
    "Verify the DSN format: user:password@tcp(host:3306)/database"
}
