#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use session_table::{Dialect, Error, Param, QueryExecutor, Row};

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct TestUser {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct TestSession {
    pub user: TestUser,
    pub preferences: TestPreferences,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct TestPreferences {
    pub theme: String,
    pub language: String,
}

pub fn create_test_session() -> TestSession {
    TestSession {
        user: TestUser {
            id: 1,
            name: "Test User".to_string(),
        },
        preferences: TestPreferences {
            theme: "dark".to_string(),
            language: "en".to_string(),
        },
    }
}

/// What the next statement run by a [`RecordingExecutor`] returns.
#[derive(Clone, Debug)]
pub enum Reply {
    Rows(Vec<Row>),
    Affected(u64),
    ConnectionLost,
    Rejected(&'static str),
}

/// A statement seen by a [`RecordingExecutor`].
#[derive(Clone, Debug, PartialEq)]
pub struct Call {
    pub sql: String,
    pub params: Vec<Param>,
}

/// A scripted executor that records every statement.
///
/// Replies are consumed in order; once exhausted, queries return no rows and
/// updates affect nothing.
pub struct RecordingExecutor {
    dialect: Dialect,
    open: AtomicBool,
    closes: Arc<AtomicUsize>,
    failing_closes: AtomicUsize,
    calls: Mutex<Vec<Call>>,
    replies: Mutex<VecDeque<Reply>>,
}

impl RecordingExecutor {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            open: AtomicBool::new(true),
            closes: Arc::new(AtomicUsize::new(0)),
            failing_closes: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            replies: Mutex::new(VecDeque::new()),
        }
    }

    pub fn closed(dialect: Dialect) -> Self {
        let executor = Self::new(dialect);
        executor.open.store(false, Ordering::SeqCst);
        executor
    }

    pub fn reply(self, reply: Reply) -> Self {
        self.replies.lock().push_back(reply);
        self
    }

    /// Makes the next `count` calls to `close` fail.
    pub fn failing_closes(self, count: usize) -> Self {
        self.failing_closes.store(count, Ordering::SeqCst);
        self
    }

    /// A handle on the close counter that outlives the executor.
    pub fn close_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.closes)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn record(&self, sql: &str, params: &[Param]) -> Option<Reply> {
        self.calls.lock().push(Call {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        self.replies.lock().pop_front()
    }
}

impl QueryExecutor for RecordingExecutor {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn fetch_all(&self, sql: &str, params: &[Param]) -> Result<Vec<Row>, Error> {
        match self.record(sql, params) {
            None | Some(Reply::Affected(_)) => Ok(Vec::new()),
            Some(Reply::Rows(rows)) => Ok(rows),
            Some(Reply::ConnectionLost) => Err(Error::connection("connection reset by peer")),
            Some(Reply::Rejected(reason)) => Err(Error::query(reason)),
        }
    }

    async fn execute(&self, sql: &str, params: &[Param]) -> Result<u64, Error> {
        match self.record(sql, params) {
            None | Some(Reply::Rows(_)) => Ok(0),
            Some(Reply::Affected(affected)) => Ok(affected),
            Some(Reply::ConnectionLost) => Err(Error::connection("connection reset by peer")),
            Some(Reply::Rejected(reason)) => Err(Error::query(reason)),
        }
    }

    async fn close(&self) -> Result<(), Error> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing_closes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1));
        if failing.is_ok() {
            return Err(Error::connection("close timed out"));
        }
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }
}
