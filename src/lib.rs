//! Fluent, chainable execution of SQL Server commands plus null-safe typed
//! access to result rows by column name.
//!
//! Build a [`FluentSqlCommand`] over a connection, chain its configuration,
//! run it once with one of the `exec_*` methods and read typed values from
//! the rows through [`DataRecordExt`].

pub mod command;
pub mod connection;
pub mod conversion;
pub mod error;
pub mod prelude;
pub mod record;
pub mod results;
pub mod types;
pub mod xml;

#[cfg(feature = "mssql")]
pub mod mssql;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use command::{
    DEFAULT_TIMEOUT_SECONDS, ExecStatus, FailureHandler, FluentSqlCommand, ParameterCollection,
    RETURN_VALUE_NAME, SqlParameter,
};
pub use connection::{CommandRequest, Completion, DbConnection, RowSink, Transaction};
pub use conversion::FromSqlValue;
pub use error::SqlFluentError;
pub use record::{DataRecord, DataRecordExt};
pub use results::{ColumnInfo, DataSet, DataTable, SqlRow};
pub use types::{CommandKind, ParameterDirection, SqlType, SqlValue};

#[cfg(feature = "mssql")]
pub use mssql::{MssqlConnection, MssqlOptions, MssqlOptionsBuilder};
