use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Unknown entity '{0}'")]
    UnknownEntity(String),

    #[error("Field '{0}' is not declared for entity '{1}'")]
    UnknownField(String, String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    #[error("{entity} {key} is still referenced by {count} record(s)")]
    HasReferences {
        entity: String,
        key: i64,
        count: u64,
    },

    #[error("Malformed key '{0}'")]
    MalformedKey(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{0} {1} has been deleted")]
    RecordDeleted(String, i64),

    #[error("{0} {1} was modified by another request")]
    Conflict(String, i64),

    #[error("Storage error: {0}")]
    StorageError(String),
}

impl RecordError {
    /// Conditions a page handler turns into a message for the user rather
    /// than aborting the request.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotAuthorized(_) | Self::HasReferences { .. } | Self::Conflict(..)
        )
    }
}

pub type Result<T> = std::result::Result<T, RecordError>;

impl<T> From<std::sync::PoisonError<T>> for RecordError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::StorageError(err.to_string())
    }
}

impl From<regex::Error> for RecordError {
    fn from(err: regex::Error) -> Self {
        Self::InvalidFilter(err.to_string())
    }
}
