mod sweeper;
mod table;

pub use sweeper::DEFAULT_SWEEP_INTERVAL;
pub use table::*;

/// A boxed driver error kept as the `source` of an [`Error`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by every [`SessionTable`] operation.
///
/// Variants are kept distinct so callers can choose between retrying
/// ([`Error::Connection`]), failing fast ([`Error::Query`],
/// [`Error::Configuration`]) or treating the session as absent
/// ([`Error::CorruptPayload`]).
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to reach the database: {0}")]
    Connection(#[source] BoxError),

    #[error("query failed: {0}")]
    Query(#[source] BoxError),

    #[error("failed to parse data for session: {id}")]
    CorruptPayload {
        id: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("failed to encode session data: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("{0}")]
    Configuration(String),
}

impl Error {
    pub fn connection(err: impl Into<BoxError>) -> Self {
        Error::Connection(err.into())
    }

    pub fn query(err: impl Into<BoxError>) -> Self {
        Error::Query(err.into())
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    pub fn is_corrupt_payload(&self) -> bool {
        matches!(self, Error::CorruptPayload { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
