//! Scripted connection handle for driving the client without a server.
//!
//! Each statement the client issues consumes the next [`Step`] of the
//! script. Every statement text is recorded, along with how many sessions
//! were acquired and whether each was returned to the pool or retired.

#![allow(dead_code)]

use futures_util::StreamExt;
use futures_util::stream;
use mysql_mcp_server::db::{
    ColumnInfo, ConnectionHandle, RowStream, ScanSlot, ScannedRow, Session,
};
use mysql_mcp_server::error::{DbError, DbResult};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// The scripted outcome of one statement.
pub enum Step {
    /// Answer an `execute` call.
    Exec(DbResult<u64>),
    /// Answer a `fetch` call with these items, in order.
    Rows(Vec<DbResult<ScannedRow>>),
    /// A `fetch` whose cursor never yields.
    Hang,
}

#[derive(Default)]
struct MockState {
    script: VecDeque<Step>,
    statements: Vec<String>,
    acquired: usize,
    returned: usize,
    retired: usize,
    closed: bool,
    acquire_error: Option<String>,
}

#[derive(Clone, Default)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    pub fn new(script: impl IntoIterator<Item = Step>) -> Self {
        let handle = Self::default();
        handle.state.lock().unwrap().script = script.into_iter().collect();
        handle
    }

    /// Make every `acquire` fail with a connection error.
    pub fn failing_acquire(message: &str) -> Self {
        let handle = Self::default();
        handle.state.lock().unwrap().acquire_error = Some(message.to_string());
        handle
    }

    pub fn statements(&self) -> Vec<String> {
        self.state.lock().unwrap().statements.clone()
    }

    pub fn acquired(&self) -> usize {
        self.state.lock().unwrap().acquired
    }

    /// Sessions handed back to the pool for reuse.
    pub fn returned(&self) -> usize {
        self.state.lock().unwrap().returned
    }

    /// Sessions discarded instead of reused.
    pub fn retired(&self) -> usize {
        self.state.lock().unwrap().retired
    }

    pub fn mark_closed(&self) {
        self.state.lock().unwrap().closed = true;
    }

    pub fn assert_all_consumed(&self) {
        let remaining = self.state.lock().unwrap().script.len();
        assert_eq!(remaining, 0, "{} scripted steps were never used", remaining);
    }

    fn next_step(&self, sql: &str) -> Step {
        let mut state = self.state.lock().unwrap();
        state.statements.push(sql.to_string());
        state
            .script
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected statement: {}", sql))
    }
}

impl ConnectionHandle for MockHandle {
    type Session = MockSession;

    async fn acquire(&self) -> DbResult<MockSession> {
        let mut state = self.state.lock().unwrap();
        if let Some(message) = &state.acquire_error {
            return Err(DbError::connection(message.clone(), "retry later"));
        }
        state.acquired += 1;
        Ok(MockSession {
            handle: self.clone(),
            retire: false,
        })
    }

    async fn ping(&self) -> DbResult<()> {
        Ok(())
    }

    async fn close(&self) {
        self.state.lock().unwrap().closed = true;
    }

    fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }
}

pub struct MockSession {
    handle: MockHandle,
    retire: bool,
}

impl Session for MockSession {
    async fn execute(&mut self, sql: &str) -> DbResult<u64> {
        match self.handle.next_step(sql) {
            Step::Exec(result) => result,
            _ => panic!("expected a fetch for: {}", sql),
        }
    }

    fn fetch<'a>(&'a mut self, sql: &'a str) -> RowStream<'a> {
        match self.handle.next_step(sql) {
            Step::Rows(items) => stream::iter(items).boxed(),
            Step::Hang => stream::pending::<DbResult<ScannedRow>>().boxed(),
            Step::Exec(_) => panic!("expected an execute for: {}", sql),
        }
    }

    fn retire_on_release(&mut self) {
        self.retire = true;
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        let mut state = self.handle.state.lock().unwrap();
        if self.retire {
            state.retired += 1;
        } else {
            state.returned += 1;
        }
    }
}

// =============================================================================
// Row builders
// =============================================================================

/// Rows of a single text column, as returned by `SHOW DATABASES`.
pub fn name_rows(column: &str, names: &[&str]) -> Vec<DbResult<ScannedRow>> {
    let columns: Arc<[ColumnInfo]> = vec![ColumnInfo::new(column, "VARCHAR")].into();
    names
        .iter()
        .map(|name| {
            Ok(ScannedRow {
                columns: Arc::clone(&columns),
                slots: vec![ScanSlot::Bytes(name.as_bytes().to_vec())],
            })
        })
        .collect()
}

/// Rows of `(id BIGINT, name VARCHAR)` numbered from 1.
pub fn numbered_rows(count: usize) -> Vec<DbResult<ScannedRow>> {
    let columns: Arc<[ColumnInfo]> = vec![
        ColumnInfo::new("id", "BIGINT"),
        ColumnInfo::new("name", "VARCHAR"),
    ]
    .into();
    (1..=count)
        .map(|i| {
            Ok(ScannedRow {
                columns: Arc::clone(&columns),
                slots: vec![
                    ScanSlot::Int(i as i64),
                    ScanSlot::Bytes(format!("row{}", i).into_bytes()),
                ],
            })
        })
        .collect()
}

/// `DESCRIBE` output for a two-column table.
pub fn describe_rows() -> Vec<DbResult<ScannedRow>> {
    let columns: Arc<[ColumnInfo]> = ["Field", "Type", "Null", "Key", "Default", "Extra"]
        .into_iter()
        .map(|name| ColumnInfo::new(name, "VARCHAR"))
        .collect::<Vec<_>>()
        .into();
    let text = |s: &str| ScanSlot::Bytes(s.as_bytes().to_vec());
    vec![
        Ok(ScannedRow {
            columns: Arc::clone(&columns),
            slots: vec![
                text("id"),
                text("int"),
                text("NO"),
                text("PRI"),
                ScanSlot::Null,
                text("auto_increment"),
            ],
        }),
        Ok(ScannedRow {
            columns: Arc::clone(&columns),
            slots: vec![
                text("email"),
                text("varchar(255)"),
                text("YES"),
                text(""),
                ScanSlot::Null,
                text(""),
            ],
        }),
    ]
}
