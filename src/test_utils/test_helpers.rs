//! Helper utilities for testing and development.

use std::sync::Arc;

use crate::results::{ColumnInfo, SqlRow};
use crate::types::SqlValue;

/// Create a test row with the given column names and values.
#[must_use]
pub fn create_test_row(column_names: &[&str], values: Vec<SqlValue>) -> SqlRow {
    SqlRow::new(
        Arc::new(ColumnInfo::new(
            column_names.iter().map(|name| (*name).to_string()).collect(),
        )),
        values,
    )
}
