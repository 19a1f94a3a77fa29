//! Bounded query execution.
//!
//! Every operation runs under an effective deadline: the earlier of the
//! caller's deadline and `now + query_timeout`. Cancellation through a
//! [`CancellationToken`] ends the operation with [`DbError::Cancelled`].
//! Dropping the in-flight future drops the session and its cursor, so the
//! connection is released on every exit path.

use crate::db::decoder::decode_rows;
use crate::db::pool::{ConnectionHandle, Session};
use crate::db::types::Row;
use crate::error::{DbError, DbResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Caller-side bounds for one operation.
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    deadline: Option<Instant>,
    cancellation: Option<CancellationToken>,
}

impl QueryContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    async fn cancelled(&self) {
        match &self.cancellation {
            Some(token) => token.cancelled().await,
            None => std::future::pending().await,
        }
    }
}

/// Runs statements under the configured timeout.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    query_timeout: Duration,
}

impl QueryExecutor {
    pub fn new(query_timeout: Duration) -> Self {
        Self { query_timeout }
    }

    pub fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    /// The earlier of the caller's deadline and `now + query_timeout`.
    pub fn effective_deadline(&self, ctx: &QueryContext) -> Instant {
        let own = Instant::now() + self.query_timeout;
        match ctx.deadline {
            Some(deadline) => deadline.min(own),
            None => own,
        }
    }

    /// Run `fut` under the effective deadline and the caller's cancellation.
    ///
    /// An already expired deadline or cancelled context fails before `fut`
    /// is polled, so no connection is acquired. Connectivity lost while
    /// `fut` runs is reported as a query error.
    pub async fn bounded<T, F>(&self, ctx: &QueryContext, operation: &str, fut: F) -> DbResult<T>
    where
        F: Future<Output = DbResult<T>>,
    {
        let start = Instant::now();
        let deadline = self.effective_deadline(ctx);

        if ctx.is_cancelled() {
            return Err(DbError::cancelled(operation));
        }
        if deadline <= start {
            return Err(DbError::timeout(operation, 0));
        }

        tokio::select! {
            result = tokio::time::timeout_at(deadline, fut) => match result {
                Ok(result) => result.map_err(DbError::into_statement_error),
                Err(_) => {
                    let elapsed_ms = start.elapsed().as_millis() as u64;
                    warn!(operation = %operation, elapsed_ms, "Operation timed out");
                    Err(DbError::timeout(operation, elapsed_ms))
                }
            },
            _ = ctx.cancelled() => {
                debug!(operation = %operation, "Operation cancelled");
                Err(DbError::cancelled(operation))
            }
        }
    }

    /// Acquire a session from `handle`, run `sql` and decode up to
    /// `row_cap` rows, all under the effective deadline.
    pub async fn run<H: ConnectionHandle>(
        &self,
        handle: &H,
        ctx: &QueryContext,
        sql: &str,
        row_cap: Option<usize>,
    ) -> DbResult<Vec<Row>> {
        self.bounded(ctx, "query execution", async {
            let mut session = handle.acquire().await?;
            fetch_rows(&mut session, sql, row_cap).await
        })
        .await
    }
}

/// Run `sql` on an already acquired session and decode its rows.
pub async fn fetch_rows<S: Session>(
    session: &mut S,
    sql: &str,
    row_cap: Option<usize>,
) -> DbResult<Vec<Row>> {
    let rows = decode_rows(session.fetch(sql), row_cap).await?;
    debug!(rows = rows.len(), row_cap = ?row_cap, "Fetched rows");
    Ok(rows)
}
