//! Table layout and the SQL rendered from it.

use serde::{Deserialize, Serialize};

use crate::store::Error;

/// Maximum length of a session id column value.
pub const SESSION_ID_MAX_LEN: usize = 255;

/// Maximum length of the serialized payload column.
pub const DATA_MAX_LEN: usize = 8100;

/// The SQL flavour spoken by a [`QueryExecutor`](crate::executor::QueryExecutor).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dialect {
    /// `$1` placeholders, `ON CONFLICT` upserts, `information_schema` catalog.
    Postgres,
    /// `?` placeholders, `ON CONFLICT` upserts, `sqlite_master` catalog.
    Sqlite,
    /// `?` placeholders and no atomic upsert.
    ///
    /// Upserts fall back to a `COUNT` followed by an `INSERT` or `UPDATE`.
    /// Two writers racing on the same id can both see it missing; the loser
    /// gets a primary-key violation back as [`Error::Query`].
    Generic,
}

impl Dialect {
    /// Renders the `n`th (1-based) positional placeholder.
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            Dialect::Postgres => format!("${n}"),
            Dialect::Sqlite | Dialect::Generic => "?".to_string(),
        }
    }

    /// Whether `INSERT .. ON CONFLICT .. DO UPDATE` is available.
    pub fn supports_upsert(&self) -> bool {
        matches!(self, Dialect::Postgres | Dialect::Sqlite)
    }
}

/// Column names of the session table.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ColumnNames {
    pub session_id: String,
    pub expires: String,
    pub data: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            session_id: "session_id".to_string(),
            expires: "expires".to_string(),
            data: "data".to_string(),
        }
    }
}

/// Naming of the table that holds sessions.
///
/// Missing keys fall back to their defaults when deserialized, so a config
/// that only renames the table keeps the default column names.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct SchemaConfig {
    pub table_name: String,
    pub column_names: ColumnNames,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            table_name: "sessions".to_string(),
            column_names: ColumnNames::default(),
        }
    }
}

impl SchemaConfig {
    pub(crate) fn validate(&self) -> Result<(), Error> {
        let names = [
            ("table name", &self.table_name),
            ("session id column", &self.column_names.session_id),
            ("expires column", &self.column_names.expires),
            ("data column", &self.column_names.data),
        ];

        for (what, name) in names {
            if name.trim().is_empty() {
                return Err(Error::Configuration(format!("the {what} must not be empty")));
            }
        }

        Ok(())
    }
}

/// Double-quotes an identifier, doubling any embedded quote.
pub(crate) fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Every statement a [`SessionTable`](crate::SessionTable) issues, rendered
/// once from a [`SchemaConfig`] and a [`Dialect`].
#[derive(Clone, Debug)]
pub struct Statements {
    /// `(id, now)` -> `data`, `expires`
    pub fetch: String,
    /// `(id)` -> `length`
    pub exists: String,
    /// `(id, expires, data)`
    pub insert: String,
    /// `(expires, data, id)`
    pub update: String,
    /// `(id, expires, data)`; absent when the dialect has no atomic upsert.
    pub upsert: Option<String>,
    /// `(expires, id)`
    pub touch: String,
    /// `(id)`
    pub delete: String,
    /// `()` -> `length`
    pub count: String,
    /// `()`
    pub clear: String,
    /// `(now)`
    pub sweep: String,
    /// `(table name)` -> `count`
    pub table_exists: String,
    /// `()`
    pub create_table: String,
    /// `()`
    pub create_index: String,
    /// `()`
    pub drop_table: String,
}

impl Statements {
    pub fn new(schema: &SchemaConfig, dialect: Dialect) -> Self {
        let table = quote_ident(&schema.table_name);
        let id = quote_ident(&schema.column_names.session_id);
        let expires = quote_ident(&schema.column_names.expires);
        let data = quote_ident(&schema.column_names.data);
        let index = quote_ident(&format!(
            "{}_{}_idx",
            schema.table_name, schema.column_names.expires
        ));
        let p = |n| dialect.placeholder(n);

        let upsert = dialect.supports_upsert().then(|| {
            format!(
                "INSERT INTO {table} ({id}, {expires}, {data}) VALUES ({}, {}, {}) \
                 ON CONFLICT ({id}) DO UPDATE SET {expires} = excluded.{expires}, {data} = excluded.{data}",
                p(1),
                p(2),
                p(3)
            )
        });

        let table_exists = match dialect {
            Dialect::Sqlite => format!(
                "SELECT COUNT(*) AS \"count\" FROM sqlite_master WHERE type = 'table' AND name = {}",
                p(1)
            ),
            Dialect::Postgres => format!(
                "SELECT COUNT(*) AS \"count\" FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name = {}",
                p(1)
            ),
            Dialect::Generic => format!(
                "SELECT COUNT(*) AS \"count\" FROM information_schema.tables WHERE table_name = {}",
                p(1)
            ),
        };

        let create_index = match dialect {
            Dialect::Generic => format!("CREATE INDEX {index} ON {table} ({expires})"),
            Dialect::Postgres | Dialect::Sqlite => {
                format!("CREATE INDEX IF NOT EXISTS {index} ON {table} ({expires})")
            }
        };

        Self {
            fetch: format!(
                "SELECT {data} AS \"data\", {expires} AS \"expires\" FROM {table} \
                 WHERE {id} = {} AND {expires} >= {}",
                p(1),
                p(2)
            ),
            exists: format!(
                "SELECT COUNT(*) AS \"length\" FROM {table} WHERE {id} = {}",
                p(1)
            ),
            insert: format!(
                "INSERT INTO {table} ({id}, {expires}, {data}) VALUES ({}, {}, {})",
                p(1),
                p(2),
                p(3)
            ),
            update: format!(
                "UPDATE {table} SET {expires} = {}, {data} = {} WHERE {id} = {}",
                p(1),
                p(2),
                p(3)
            ),
            upsert,
            touch: format!(
                "UPDATE {table} SET {expires} = {} WHERE {id} = {}",
                p(1),
                p(2)
            ),
            delete: format!("DELETE FROM {table} WHERE {id} = {}", p(1)),
            count: format!("SELECT COUNT(*) AS \"length\" FROM {table}"),
            clear: format!("DELETE FROM {table}"),
            sweep: format!("DELETE FROM {table} WHERE {expires} < {}", p(1)),
            table_exists,
            create_table: format!(
                "CREATE TABLE {table} (\
                 {id} VARCHAR({SESSION_ID_MAX_LEN}) NOT NULL PRIMARY KEY, \
                 {expires} BIGINT NOT NULL, \
                 {data} VARCHAR({DATA_MAX_LEN}))"
            ),
            create_index,
            drop_table: format!("DROP TABLE {table}"),
        }
    }
}
