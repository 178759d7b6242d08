use sqlx::postgres::{PgArguments, PgConnectOptions, PgPool, PgPoolOptions, PgRow, PgSslMode};
use sqlx::query::Query;
use sqlx::{Column, Postgres, Row as _, ValueRef};

use crate::executor::{Param, QueryExecutor, Row, Value, map_sqlx_error};
use crate::options::{ConnectOptions, StoreOptions};
use crate::schema::Dialect;
use crate::store::{Error, SessionTable};

/// A [`QueryExecutor`] over a sqlx Postgres pool.
#[derive(Clone, Debug)]
pub struct PgExecutor {
    pool: PgPool,
}

impl PgExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a pool from discrete connection parameters or a raw DSN.
    pub async fn connect(options: &ConnectOptions) -> Result<Self, Error> {
        let mut connect_options = match options.raw_dsn() {
            Some(dsn) => dsn
                .parse::<PgConnectOptions>()
                .map_err(|err| Error::Configuration(format!("invalid connection string: {err}")))?,
            None => {
                let mut connect_options = PgConnectOptions::new().host(&options.host);
                if let Some(port) = options.port {
                    connect_options = connect_options.port(port);
                }
                if let Some(user) = &options.user {
                    connect_options = connect_options.username(user);
                }
                if let Some(password) = &options.password {
                    connect_options = connect_options.password(password);
                }
                if let Some(database) = &options.database {
                    connect_options = connect_options.database(database);
                }
                connect_options
            }
        };

        if options.ssl {
            connect_options = connect_options.ssl_mode(PgSslMode::Require);
        }

        let pool = PgPoolOptions::new()
            .max_connections(options.max_connections.max(1))
            .connect_with(connect_options)
            .await
            .map_err(|err| {
                tracing::error!(err = %err, "failed to connect to postgres");
                map_sqlx_error(err)
            })?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn bind_params<'q>(sql: &'q str, params: &'q [Param]) -> Query<'q, Postgres, PgArguments> {
    params
        .iter()
        .fold(sqlx::query(sql), |query, param| match param {
            Param::Text(text) => query.bind(text.as_str()),
            Param::Int(value) => query.bind(*value),
        })
}

fn decode_row(row: &PgRow) -> Result<Row, Error> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(index, column)| decode_value(row, index).map(|value| (column.name(), value)))
        .collect()
}

fn decode_value(row: &PgRow, index: usize) -> Result<Value, Error> {
    let is_null = row.try_get_raw(index).map_err(Error::query)?.is_null();

    let value = if is_null {
        Value::Null
    } else if let Ok(value) = row.try_get::<i64, _>(index) {
        Value::Int(value)
    } else if let Ok(value) = row.try_get::<i32, _>(index) {
        Value::Int(value.into())
    } else {
        Value::Text(row.try_get::<String, _>(index).map_err(Error::query)?)
    };

    Ok(value)
}

impl QueryExecutor for PgExecutor {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
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

impl SessionTable<PgExecutor> {
    /// Opens and owns a Postgres pool.
    ///
    /// The table is created when `create_table` is set and it does not exist
    /// yet. The pool is released by [`close`](Self::close).
    pub async fn connect(options: StoreOptions, connect: &ConnectOptions) -> Result<Self, Error> {
        options.schema.validate()?;
        tracing::debug!(?connect, "opening postgres session store");

        let executor = PgExecutor::connect(connect).await?;
        SessionTable::open(options, executor).await
    }
}
