use std::str::FromStr;

use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Column, Row as _, Sqlite, ValueRef};

use crate::executor::{Param, QueryExecutor, Row, Value, map_sqlx_error};
use crate::options::{ConnectOptions, StoreOptions};
use crate::schema::Dialect;
use crate::store::{Error, SessionTable};

/// A [`QueryExecutor`] over a sqlx SQLite pool.
///
/// SQLite does not enforce `VARCHAR` lengths, so oversized payloads are
/// stored rather than rejected.
#[derive(Clone, Debug)]
pub struct SqliteExecutor {
    pool: SqlitePool,
}

impl SqliteExecutor {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens a pool from a DSN such as `sqlite::memory:`, or from `database`
    /// as a file path.
    ///
    /// In-memory databases exist per connection, so they get a single
    /// connection that is never recycled.
    pub async fn connect(options: &ConnectOptions) -> Result<Self, Error> {
        let (connect_options, in_memory) = match (options.raw_dsn(), options.database.as_deref()) {
            (Some(dsn), _) => {
                let connect_options = SqliteConnectOptions::from_str(dsn).map_err(|err| {
                    Error::Configuration(format!("invalid connection string: {err}"))
                })?;
                (connect_options, dsn.contains(":memory:") || dsn.contains("mode=memory"))
            }
            (None, Some(database)) => (
                SqliteConnectOptions::new()
                    .filename(database)
                    .create_if_missing(true),
                false,
            ),
            (None, None) => {
                return Err(Error::Configuration(
                    "a dsn or database file is required for sqlite".to_string(),
                ));
            }
        };

        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(options.max_connections.max(1))
        };

        let pool = pool_options
            .connect_with(connect_options)
            .await
            .map_err(|err| {
                tracing::error!(err = %err, "failed to open sqlite database");
                map_sqlx_error(err)
            })?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn bind_params<'q>(sql: &'q str, params: &'q [Param]) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    params
        .iter()
        .fold(sqlx::query(sql), |query, param| match param {
            Param::Text(text) => query.bind(text.as_str()),
            Param::Int(value) => query.bind(*value),
        })
}

fn decode_row(row: &SqliteRow) -> Result<Row, Error> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(index, column)| decode_value(row, index).map(|value| (column.name(), value)))
        .collect()
}

fn decode_value(row: &SqliteRow, index: usize) -> Result<Value, Error> {
    let is_null = row.try_get_raw(index).map_err(Error::query)?.is_null();

    let value = if is_null {
        Value::Null
    } else if let Ok(value) = row.try_get::<i64, _>(index) {
        Value::Int(value)
    } else {
        Value::Text(row.try_get::<String, _>(index).map_err(Error::query)?)
    };

    Ok(value)
}

impl QueryExecutor for SqliteExecutor {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn is_open(&self) -> bool {
        !self.pool.is_closed()
    }

    async fn fetch_all(&self, sql: &str, params: &[Param]) -> Result<Vec<Row>, Error> {
        let rows = bind_params(sql, params)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        rows.iter().map(decode_row).collect()
    }

    async fn execute(&self, sql: &str, params: &[Param]) -> Result<u64, Error> {
        let result = bind_params(sql, params)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn close(&self) -> Result<(), Error> {
        self.pool.close().await;
        Ok(())
    }
}

impl SessionTable<SqliteExecutor> {
    /// Opens and owns a SQLite pool.
    ///
    /// The table is created when `create_table` is set and it does not exist
    /// yet. The pool is released by [`close`](Self::close).
    pub async fn connect(options: StoreOptions, connect: &ConnectOptions) -> Result<Self, Error> {
        options.schema.validate()?;
        tracing::debug!(?connect, "opening sqlite session store");

        let executor = SqliteExecutor::connect(connect).await?;
        SessionTable::open(options, executor).await
    }
}
