use std::sync::Arc;

use thiserror::Error;

/// Every failure surfaced by the builder, the driver seam, or the row accessors.
///
/// The type is `Clone` so an executed command can keep the failure in
/// [`FluentSqlCommand::error`](crate::FluentSqlCommand::error) while the
/// original value is still handed back to the caller.
#[derive(Debug, Clone, Error)]
pub enum SqlFluentError {
    #[cfg(feature = "mssql")]
    #[error(transparent)]
    MssqlError(#[from] tiberius::error::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("No parameter with name [\"{0}\"] found")]
    ParameterNotFound(String),

    #[error("The \"{0}\" is not a valid column name.")]
    ColumnNotFound(String),

    #[error("No column at ordinal {ordinal}; the row has {count} columns")]
    OrdinalOutOfRange { ordinal: usize, count: usize },

    #[error("Column \"{0}\" is NULL")]
    NullValue(String),

    #[error("Cannot read {actual} as {expected}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("Command timed out after {0} seconds")]
    Timeout(u32),

    #[error(transparent)]
    Io(Arc<std::io::Error>),
}

impl From<std::io::Error> for SqlFluentError {
    fn from(err: std::io::Error) -> Self {
        SqlFluentError::Io(Arc::new(err))
    }
}

impl SqlFluentError {
    pub(crate) fn type_mismatch(expected: &'static str, actual: &'static str) -> Self {
        SqlFluentError::TypeMismatch { expected, actual }
    }
}
