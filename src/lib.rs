//! # session-table: Relational Session Storage
//!
//! `session-table` persists user sessions in a single relational table. It
//! stores, fetches, refreshes and expires session records behind a small
//! CRUD contract that a web framework's session layer can wrap.
//!
//! Every statement is rendered from a configurable table and column naming
//! scheme, so deployments that rename the table or its columns are supported
//! without touching SQL.
//!
//! # Quick Start
//!
//! This requires the `sqlite-store` feature.
//!
//! ```rust,no_run
//! # #[cfg(feature = "sqlite-store")]
//! # async fn run() -> Result<(), session_table::Error> {
//! use session_table::executor::sqlite::SqliteExecutor;
//! use session_table::{ConnectOptions, Expiry, SessionTable, StoreOptions};
//! use std::time::Duration;
//!
//! #[derive(serde::Serialize, serde::Deserialize)]
//! struct User {
//!     id: i64,
//! }
//!
//! let options = StoreOptions::build()
//!     .table_name("user_sessions")
//!     .create_table(true);
//! let connect = ConnectOptions::build().dsn("sqlite::memory:");
//!
//! let table = SessionTable::<SqliteExecutor>::connect(options, &connect).await?;
//!
//! table.upsert("abc", &User { id: 1 }, Expiry::After(Duration::from_secs(3600))).await?;
//!
//! if let Some(record) = table.fetch::<User>("abc").await? {
//!     println!("user {} until {}", record.payload.id, record.expires_at);
//! }
//!
//! table.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Expiry
//!
//! Each row carries an expiry in whole Unix seconds. A row past its expiry is
//! invisible to [`SessionTable::fetch`] but still counted by
//! [`SessionTable::count`] until it is deleted, cleared, or purged by
//! [`SessionTable::sweep_expired`]. Nothing is removed in the background
//! unless [`SessionTable::spawn_sweeper`] is started.
//!
//! The expiry of a write is chosen by the caller through [`Expiry`]:
//!
//! ```rust
//! use session_table::Expiry;
//! use session_table::cookie::Cookie;
//! use std::time::Duration;
//!
//! // The table's configured expiration (30 days unless overridden).
//! let _ = Expiry::Default;
//!
//! // A relative lifetime.
//! let _ = Expiry::After(Duration::from_secs(15 * 60));
//!
//! // Whatever the session cookie says, falling back to the default.
//! let cookie = Cookie::new("id", "abc");
//! let _ = Expiry::from_cookie(&cookie);
//! ```
//!
//! # Stores
//!
//! The table talks to the database through a [`QueryExecutor`]. Two are
//! included, each behind a feature flag:
//!
//! - `postgres-store`: [`executor::postgres::PgExecutor`], over a sqlx `PgPool`.
//! - `sqlite-store`: [`executor::sqlite::SqliteExecutor`], over a sqlx `SqlitePool`.
//!
//! Both write with a single `INSERT .. ON CONFLICT DO UPDATE`. Any other
//! database can be used by implementing [`QueryExecutor`] with
//! [`Dialect::Generic`], which upserts with a `COUNT` followed by an
//! `INSERT` or `UPDATE`.
//!
//! ## Connection ownership
//!
//! [`SessionTable::new`] wraps a pool the caller already opened; the caller
//! keeps ownership and [`SessionTable::close`] leaves it open.
//! `SessionTable::connect` opens a pool from [`ConnectOptions`] and releases
//! it on `close`.
//!
//! ```rust,no_run
//! # #[cfg(feature = "postgres-store")]
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use session_table::executor::postgres::PgExecutor;
//! use session_table::{SessionTable, StoreOptions};
//! use sqlx::PgPool;
//!
//! let database_url = std::env::var("DATABASE_URL")?;
//! let pool = PgPool::connect(&database_url).await?;
//!
//! let table = SessionTable::new(StoreOptions::default(), PgExecutor::new(pool))?;
//! if !table.ensure_table_exists().await? {
//!     table.create_table().await?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Errors
//!
//! Every operation returns [`Error`]. [`Error::Connection`] and
//! [`Error::Query`] wrap the driver error; [`Error::CorruptPayload`] is kept
//! apart so a caller may treat an undecodable session as absent.

pub use cookie;

#[cfg(any(feature = "postgres-store", feature = "sqlite-store"))]
pub use sqlx;

pub mod executor;
pub use executor::{Param, QueryExecutor, Row, Value};

mod expiry;
pub use expiry::*;

mod options;
pub use options::*;

pub mod schema;
pub use schema::{ColumnNames, Dialect, SchemaConfig, Statements};

pub mod store;
pub use store::{Error, Result, SessionRecord, SessionTable};
