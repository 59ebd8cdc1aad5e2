//! Error types shared by the connection handler, the stores and the repository.
//!
//! Every failure surfaces as a [`RepositoryError`]. Driver errors are sorted
//! into the same kinds callers care about (connection, write, index) and are
//! otherwise passed through untouched; nothing here retries.

use mongodb::bson::oid;
use mongodb::error::{Error as DriverError, ErrorKind};

/// Server error code for an index that exists with different options.
const INDEX_OPTIONS_CONFLICT: i32 = 85;

/// Server error code for an index that exists with the same name but different keys.
const INDEX_KEY_SPECS_CONFLICT: i32 = 86;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Errors returned by docrepo operations.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// The store is unreachable or rejected the credentials.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A handle was requested before `connect()` succeeded.
    #[error("Not connected: call connect() first")]
    NotConnected,

    /// A string could not be parsed into an ObjectId.
    #[error("Invalid identifier '{value}': {source}")]
    InvalidIdentifier {
        value: String,
        #[source]
        source: oid::Error,
    },

    /// Insert or update rejected by the store (duplicate key, bad operator...).
    #[error("Write error: {0}")]
    Write(String),

    /// Filter, projection or sort the store refuses to evaluate.
    #[error("Query error: {0}")]
    Query(String),

    /// Conflicting index definition.
    #[error("Index error: {0}")]
    Index(String),

    /// Invalid configuration value.
    #[error("Config error: {0}")]
    Config(String),

    /// Any other driver failure.
    #[error("Driver error: {0}")]
    Driver(#[source] DriverError),
}

impl From<DriverError> for RepositoryError {
    fn from(err: DriverError) -> Self {
        match err.kind.as_ref() {
            ErrorKind::ServerSelection { .. }
            | ErrorKind::Authentication { .. }
            | ErrorKind::Io(_)
            | ErrorKind::DnsResolve { .. } => RepositoryError::Connection(err.to_string()),
            ErrorKind::Write(_) | ErrorKind::InsertMany(_) => {
                RepositoryError::Write(err.to_string())
            }
            ErrorKind::Command(command)
                if command.code == INDEX_OPTIONS_CONFLICT
                    || command.code == INDEX_KEY_SPECS_CONFLICT =>
            {
                RepositoryError::Index(err.to_string())
            }
            _ => RepositoryError::Driver(err),
        }
    }
}

impl From<url::ParseError> for RepositoryError {
    fn from(err: url::ParseError) -> Self {
        RepositoryError::Config(format!("invalid connection URL: {}", err))
    }
}
