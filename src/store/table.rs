use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Serialize, de::DeserializeOwned};

use crate::executor::{Param, QueryExecutor, Row, Value};
use crate::expiry::{Expiry, now_seconds};
use crate::options::StoreOptions;
use crate::schema::Statements;
use crate::store::{Error, Result};

/// A session row read back from the table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionRecord<T> {
    pub id: String,
    /// Whole Unix seconds after which the row is no longer readable.
    pub expires_at: i64,
    pub payload: T,
}

/// A relational session store.
///
/// Every statement is rendered once, at construction, from the configured
/// [`SchemaConfig`](crate::SchemaConfig) and issued through the executor `E`.
/// Cloning is cheap and clones share the executor.
///
/// Rows past their expiry are invisible to [`fetch`](Self::fetch) but stay in
/// the table until [`delete`](Self::delete), [`clear_all`](Self::clear_all)
/// or [`sweep_expired`](Self::sweep_expired) removes them.
pub struct SessionTable<E: QueryExecutor> {
    inner: Arc<Inner<E>>,
}

struct Inner<E> {
    executor: E,
    options: StoreOptions,
    statements: Statements,
    owns_executor: bool,
    closed: AtomicBool,
}

impl<E: QueryExecutor> Clone for SessionTable<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: QueryExecutor> fmt::Debug for SessionTable<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTable")
            .field("options", &self.inner.options)
            .field("dialect", &self.inner.executor.dialect())
            .field("owns_executor", &self.inner.owns_executor)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<E: QueryExecutor> SessionTable<E> {
    /// Creates a table over a connection the caller already opened.
    ///
    /// The caller keeps ownership of the connection: [`close`](Self::close)
    /// leaves it open.
    pub fn new(options: StoreOptions, executor: E) -> Result<Self> {
        if !executor.is_open() {
            tracing::error!("the supplied db connection is not open");
            return Err(Error::Configuration(
                "The supplied db connection is not open".to_string(),
            ));
        }

        tracing::debug!("using supplied connection");
        Self::assemble(options, executor, false)
    }

    /// Creates a table that takes over `executor` and closes it on
    /// [`close`](Self::close).
    pub fn owning(options: StoreOptions, executor: E) -> Result<Self> {
        Self::assemble(options, executor, true)
    }

    fn assemble(options: StoreOptions, executor: E, owns_executor: bool) -> Result<Self> {
        options.schema.validate()?;
        let statements = Statements::new(&options.schema, executor.dialect());

        Ok(Self {
            inner: Arc::new(Inner {
                executor,
                options,
                statements,
                owns_executor,
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Takes over `executor` like [`owning`](Self::owning), then creates the
    /// table if `create_table` is set and the table is missing.
    ///
    /// If that setup fails the executor is closed before the error is
    /// returned.
    pub async fn open(options: StoreOptions, executor: E) -> Result<Self> {
        let table = Self::owning(options, executor)?;

        if let Err(err) = table.prepare().await {
            if let Err(close_err) = table.close().await {
                tracing::warn!(err = %close_err, "failed to close connection after setup error");
            }
            return Err(err);
        }

        Ok(table)
    }

    async fn prepare(&self) -> Result<()> {
        if self.inner.options.create_table && !self.ensure_table_exists().await? {
            self.create_table().await?;
        }
        Ok(())
    }

    pub fn options(&self) -> &StoreOptions {
        &self.inner.options
    }

    pub fn statements(&self) -> &Statements {
        &self.inner.statements
    }

    pub fn executor(&self) -> &E {
        &self.inner.executor
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Gets the session stored at `id`, if it has not expired.
    ///
    /// Returns [`Error::CorruptPayload`] when the stored data cannot be
    /// decoded into `T`.
    #[tracing::instrument(name = "fetching session from table", skip(self))]
    pub async fn fetch<T>(&self, id: &str) -> Result<Option<SessionRecord<T>>>
    where
        T: DeserializeOwned,
    {
        let now = now_seconds();
        let rows = self
            .fetch_rows(&self.inner.statements.fetch, &[id.into(), now.into()])
            .await?;

        let Some(row) = rows.into_iter().next() else {
            tracing::debug!("session not found");
            return Ok(None);
        };

        let corrupt = |source| Error::CorruptPayload {
            id: id.to_string(),
            source,
        };

        let data = row.get("data").and_then(Value::as_str).ok_or_else(|| {
            tracing::error!("session data is missing or not text");
            corrupt(None)
        })?;
        let payload = serde_json::from_str(data).map_err(|err| {
            tracing::error!(err = %err, "failed to parse session data");
            corrupt(Some(err))
        })?;
        let expires_at = row
            .get("expires")
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::query("result row has no integer expires column"))?;

        tracing::debug!("got session");
        Ok(Some(SessionRecord {
            id: id.to_string(),
            expires_at,
            payload,
        }))
    }

    /// Writes `payload` at `id`, replacing both data and expiry of an existing row.
    ///
    /// The payload is serialized before any statement runs, so an encoding
    /// failure never leaves a partial write behind.
    ///
    /// With [`Dialect::Generic`](crate::Dialect::Generic) the write is a
    /// `COUNT` followed by an `INSERT` or `UPDATE`. Two concurrent upserts of
    /// a new id may both choose `INSERT`; the loser receives the primary-key
    /// violation as [`Error::Query`].
    #[tracing::instrument(name = "upserting session in table", skip(self, payload))]
    pub async fn upsert<T>(&self, id: &str, payload: &T, expiry: Expiry) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let expires = expiry.resolve(self.inner.options.expiration_duration());
        let data = serde_json::to_string(payload).map_err(|err| {
            tracing::error!(err = %err, "failed to encode session data");
            Error::Encode(err)
        })?;

        let statements = &self.inner.statements;
        if let Some(upsert) = &statements.upsert {
            self.execute(upsert, &[id.into(), expires.into(), data.into()])
                .await?;
            return Ok(());
        }

        let rows = self.fetch_rows(&statements.exists, &[id.into()]).await?;
        if first_count(&rows, "length") > 0 {
            tracing::debug!("session already exists, will update it");
            self.execute(&statements.update, &[expires.into(), data.into(), id.into()])
                .await?;
        } else {
            tracing::debug!("session will be inserted");
            self.execute(&statements.insert, &[id.into(), expires.into(), data.into()])
                .await?;
        }

        Ok(())
    }

    /// Moves the expiry of `id` without touching its data.
    ///
    /// Returns `false` when no row matched; a missing session is not an error.
    #[tracing::instrument(name = "refreshing session expiry", skip(self))]
    pub async fn refresh_expiry(&self, id: &str, expiry: Expiry) -> Result<bool> {
        let expires = expiry.resolve(self.inner.options.expiration_duration());
        tracing::debug!(expires, "touching session");

        let updated = self
            .execute(&self.inner.statements.touch, &[expires.into(), id.into()])
            .await?;
        Ok(updated > 0)
    }

    /// Deletes the row at `id`. Returns `false` if there was none.
    #[tracing::instrument(name = "deleting session from table", skip(self))]
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let deleted = self
            .execute(&self.inner.statements.delete, &[id.into()])
            .await?;
        Ok(deleted > 0)
    }

    /// Counts every row, expired ones included.
    #[tracing::instrument(name = "counting sessions", skip(self))]
    pub async fn count(&self) -> Result<u64> {
        let rows = self.fetch_rows(&self.inner.statements.count, &[]).await?;
        Ok(first_count(&rows, "length"))
    }

    /// Deletes every row, returning how many were removed.
    #[tracing::instrument(name = "clearing all sessions", skip(self))]
    pub async fn clear_all(&self) -> Result<u64> {
        self.execute(&self.inner.statements.clear, &[]).await
    }

    /// Deletes the rows whose expiry is strictly before now.
    #[tracing::instrument(name = "sweeping expired sessions", skip(self))]
    pub async fn sweep_expired(&self) -> Result<u64> {
        let now = now_seconds();
        let purged = self
            .execute(&self.inner.statements.sweep, &[now.into()])
            .await?;
        tracing::debug!(purged, "swept expired sessions");
        Ok(purged)
    }

    /// Checks the database catalog for the configured table.
    #[tracing::instrument(name = "checking session table exists", skip(self))]
    pub async fn ensure_table_exists(&self) -> Result<bool> {
        let table_name = self.inner.options.schema.table_name.as_str();
        let rows = self
            .fetch_rows(&self.inner.statements.table_exists, &[table_name.into()])
            .await?;
        Ok(first_count(&rows, "count") > 0)
    }

    /// Creates the session table and the index on its expiry column.
    #[tracing::instrument(name = "creating session table", skip(self))]
    pub async fn create_table(&self) -> Result<()> {
        let statements = &self.inner.statements;
        self.execute(&statements.create_table, &[]).await?;
        self.execute(&statements.create_index, &[]).await?;
        tracing::debug!(table = %self.inner.options.schema.table_name, "created session table");
        Ok(())
    }

    /// Drops the session table. Refused unless `allow_drop` was configured.
    #[tracing::instrument(name = "dropping session table", skip(self))]
    pub async fn drop_table(&self) -> Result<()> {
        if !self.inner.options.allow_drop {
            tracing::error!("dropping the session table is not allowed");
            return Err(Error::Configuration(
                "Dropping session table not allowed by config. \
                 Set allow_drop to true to enable this."
                    .to_string(),
            ));
        }

        self.execute(&self.inner.statements.drop_table, &[]).await?;
        Ok(())
    }

    /// Closes the connection if this table opened it.
    ///
    /// A caller-supplied connection is left open. Calling this more than once
    /// is harmless, and a close that failed can be retried.
    #[tracing::instrument(name = "closing session table", skip(self))]
    pub async fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        if !self.inner.owns_executor {
            tracing::debug!("connection is owned by the caller, leaving it open");
            return Ok(());
        }

        self.inner.executor.close().await.map_err(|err| {
            tracing::error!(err = %err, "failed to close the connection");
            self.inner.closed.store(false, Ordering::Release);
            err
        })
    }

    async fn fetch_rows(&self, sql: &str, params: &[Param]) -> Result<Vec<Row>> {
        self.inner
            .executor
            .fetch_all(sql, params)
            .await
            .map_err(|err| {
                tracing::error!(err = %err, sql, "statement failed");
                err
            })
    }

    async fn execute(&self, sql: &str, params: &[Param]) -> Result<u64> {
        self.inner
            .executor
            .execute(sql, params)
            .await
            .map_err(|err| {
                tracing::error!(err = %err, sql, "statement failed");
                err
            })
    }
}

/// Reads a `COUNT(*)` result, treating an empty result set as zero.
fn first_count(rows: &[Row], column: &str) -> u64 {
    rows.first()
        .and_then(|row| row.get(column))
        .and_then(Value::as_i64)
        .map(|count| count.max(0) as u64)
        .unwrap_or(0)
}
