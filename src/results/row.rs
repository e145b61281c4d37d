use std::collections::HashMap;
use std::sync::Arc;

use crate::error::SqlFluentError;
use crate::record::DataRecord;
use crate::types::SqlValue;

/// Column metadata shared by every row of one result set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnInfo {
    names: Vec<String>,
    // First occurrence wins when a result set repeats a column name
    name_to_index: HashMap<String, usize>,
}

impl ColumnInfo {
    #[must_use]
    pub fn new(names: Vec<String>) -> Self {
        let mut name_to_index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            name_to_index.entry(name.clone()).or_insert(i);
        }
        Self {
            names,
            name_to_index,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    #[must_use]
    pub fn name_at(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    /// Position of a column: exact match first, then ASCII case-insensitive.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        if let Some(&idx) = self.name_to_index.get(name) {
            return Some(idx);
        }
        self.names
            .iter()
            .position(|col| col.eq_ignore_ascii_case(name))
    }
}

/// One row of a result set, owned and detached from the driver stream.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlRow {
    columns: Arc<ColumnInfo>,
    values: Vec<SqlValue>,
}

impl SqlRow {
    /// Build a row. Missing trailing values are padded with NULL.
    #[must_use]
    pub fn new(columns: Arc<ColumnInfo>, mut values: Vec<SqlValue>) -> Self {
        if values.len() < columns.len() {
            values.resize(columns.len(), SqlValue::Null);
        }
        Self { columns, values }
    }

    #[must_use]
    pub fn columns(&self) -> &Arc<ColumnInfo> {
        &self.columns
    }

    #[must_use]
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    #[must_use]
    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }

    /// Value by column name, `None` if there is no such column.
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&SqlValue> {
        self.columns
            .index_of(column_name)
            .and_then(|idx| self.values.get(idx))
    }

    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }
}

impl DataRecord for SqlRow {
    fn field_count(&self) -> usize {
        self.columns.len()
    }

    fn name_at(&self, ordinal: usize) -> Result<&str, SqlFluentError> {
        self.columns
            .name_at(ordinal)
            .ok_or(SqlFluentError::OrdinalOutOfRange {
                ordinal,
                count: self.columns.len(),
            })
    }

    fn ordinal(&self, name: &str) -> Result<usize, SqlFluentError> {
        self.columns
            .index_of(name)
            .ok_or_else(|| SqlFluentError::ColumnNotFound(name.to_string()))
    }

    fn value_at(&self, ordinal: usize) -> Result<&SqlValue, SqlFluentError> {
        self.values
            .get(ordinal)
            .ok_or(SqlFluentError::OrdinalOutOfRange {
                ordinal,
                count: self.columns.len(),
            })
    }

    fn bytes(&self, ordinal: usize) -> Result<Option<Vec<u8>>, SqlFluentError> {
        match self.value_at(ordinal)? {
            SqlValue::Null => Ok(None),
            SqlValue::Binary(bytes) => Ok(Some(bytes.clone())),
            other => Err(SqlFluentError::type_mismatch("binary", other.type_name())),
        }
    }
}
