/// Error types for the ORM layer.
///
/// Registration problems surface once, when a schema is registered. Everything
/// else is reported per call to the immediate caller; nothing is retried.
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrmError {
    /// Schema declaration is unusable (missing or duplicate primary key, ...)
    #[error("registration of table `{table}` failed: {reason}")]
    Registration { table: String, reason: String },

    /// Caller passed a malformed argument (limit shape, placeholder count, ...)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Record has no value stored under this key
    #[error("record has no attribute '{key}'")]
    AttributeMissing { key: String },

    /// Failure reported by the database driver
    #[error("database error: {0}")]
    Engine(#[from] sqlx::Error),

    /// Pool configuration is incomplete or unreadable
    #[error("configuration error: {reason}")]
    Config { reason: String },

    /// Result column of a type rows cannot carry
    #[error("column `{column}` has unsupported type {type_name}")]
    UnsupportedColumn { column: String, type_name: String },

    /// Record values could not be converted into the requested type
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, OrmError>;

impl OrmError {
    pub fn registration(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Registration {
            table: table.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument(reason.into())
    }

    pub fn attribute_missing(key: impl Into<String>) -> Self {
        Self::AttributeMissing { key: key.into() }
    }

    pub fn unsupported_column(column: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::UnsupportedColumn {
            column: column.into(),
            type_name: type_name.into(),
        }
    }

    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }
}
