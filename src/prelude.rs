//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and traits
//! to make it easier to get started with the library.

pub use crate::command::{ExecStatus, FluentSqlCommand, SqlParameter};
pub use crate::connection::{DbConnection, Transaction};
pub use crate::conversion::FromSqlValue;
pub use crate::error::SqlFluentError;
pub use crate::record::{DataRecord, DataRecordExt};
pub use crate::results::{ColumnInfo, DataSet, DataTable, SqlRow};
pub use crate::types::{CommandKind, ParameterDirection, SqlType, SqlValue};

#[cfg(feature = "mssql")]
pub use crate::mssql::{MssqlConnection, MssqlOptions, MssqlOptionsBuilder};
