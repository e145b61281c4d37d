use std::sync::Arc;

use serde_json::{Map, Value as JsonValue};

use super::row::{ColumnInfo, SqlRow};
use crate::types::SqlValue;

/// Name given to the table that receives result set `index` during a fill.
#[must_use]
pub fn table_name_for(index: usize) -> String {
    if index == 0 {
        "Table".to_string()
    } else {
        format!("Table{index}")
    }
}

/// Column names a fill gives one result set: unnamed columns become
/// `Column1`, `Column2`, ... and a repeated name gets a numeric suffix
/// (`a`, `a1`, ...), so no two positions share a column.
fn fill_names(incoming: &ColumnInfo) -> Vec<String> {
    let mut names: Vec<String> = Vec::with_capacity(incoming.len());
    for name in incoming.names() {
        let (base, mut suffix) = if name.is_empty() {
            ("Column", 1_usize)
        } else {
            (name.as_str(), 0)
        };
        let mut candidate = if suffix == 0 {
            base.to_string()
        } else {
            format!("{base}{suffix}")
        };
        while names.iter().any(|taken| taken.eq_ignore_ascii_case(&candidate)) {
            suffix += 1;
            candidate = format!("{base}{suffix}");
        }
        names.push(candidate);
    }
    names
}

/// A named, fully materialized result table.
#[derive(Debug, Clone, PartialEq)]
pub struct DataTable {
    name: String,
    columns: Arc<ColumnInfo>,
    rows: Vec<SqlRow>,
}

impl DataTable {
    #[must_use]
    pub fn new(name: impl Into<String>, columns: Arc<ColumnInfo>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn columns(&self) -> &ColumnInfo {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &[SqlRow] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value at `row` / `column`, `None` when either is out of range.
    #[must_use]
    pub fn value(&self, row: usize, column: &str) -> Option<&SqlValue> {
        self.rows.get(row).and_then(|r| r.get(column))
    }

    /// Add a row whose values follow this table's column order.
    pub fn push_values(&mut self, values: Vec<SqlValue>) {
        self.rows.push(SqlRow::new(Arc::clone(&self.columns), values));
    }

    /// Map each incoming column onto a table column, adding the ones the
    /// table does not have yet. Existing rows get NULL for added columns.
    /// Every incoming position gets its own column (`fill_names`);
    /// matching against existing columns ignores ASCII case.
    pub(crate) fn merge_columns(&mut self, incoming: &ColumnInfo) -> Vec<usize> {
        let mut names = self.columns.names().to_vec();
        let mut mapping = Vec::with_capacity(incoming.len());
        for name in fill_names(incoming) {
            let idx = match names.iter().position(|existing| existing.eq_ignore_ascii_case(&name)) {
                Some(idx) => idx,
                None => {
                    names.push(name);
                    names.len() - 1
                }
            };
            mapping.push(idx);
        }

        if names.len() != self.columns.len() {
            let columns = Arc::new(ColumnInfo::new(names));
            self.rows = std::mem::take(&mut self.rows)
                .into_iter()
                .map(|row| SqlRow::new(Arc::clone(&columns), row.into_values()))
                .collect();
            self.columns = columns;
        }
        mapping
    }

    /// Append a row produced under another column layout using `mapping`
    /// from [`merge_columns`](Self::merge_columns).
    pub(crate) fn append_mapped(&mut self, row: &SqlRow, mapping: &[usize]) {
        let mut values = vec![SqlValue::Null; self.columns.len()];
        for (source, &target) in mapping.iter().enumerate() {
            if let Some(value) = row.get_by_index(source) {
                values[target] = value.clone();
            }
        }
        self.push_values(values);
    }

    fn to_json(&self) -> JsonValue {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let mut object = Map::new();
                for (name, value) in self.columns.names().iter().zip(row.values()) {
                    object.insert(
                        name.clone(),
                        serde_json::to_value(value).unwrap_or(JsonValue::Null),
                    );
                }
                JsonValue::Object(object)
            })
            .collect();
        JsonValue::Array(rows)
    }
}

/// Container of named tables filled by `exec_fill_data_set`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataSet {
    tables: Vec<DataTable>,
}

impl DataSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn tables(&self) -> &[DataTable] {
        &self.tables
    }

    #[must_use]
    pub fn table(&self, name: &str) -> Option<&DataTable> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn table_mut(&mut self, name: &str) -> Option<&mut DataTable> {
        self.tables.iter_mut().find(|t| t.name == name)
    }

    pub fn add_table(&mut self, table: DataTable) {
        self.tables.push(table);
    }

    /// Existing table with `name`, or a new empty one appended to the set.
    pub(crate) fn table_or_insert(&mut self, name: &str) -> &mut DataTable {
        let idx = match self.tables.iter().position(|t| t.name == name) {
            Some(idx) => idx,
            None => {
                self.tables
                    .push(DataTable::new(name, Arc::new(ColumnInfo::default())));
                self.tables.len() - 1
            }
        };
        &mut self.tables[idx]
    }

    /// Render every table as `{ "<table>": [ { "<column>": value, ... } ] }`.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        let mut object = Map::new();
        for table in &self.tables {
            object.insert(table.name.clone(), table.to_json());
        }
        JsonValue::Object(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(names: &[&str], values: Vec<SqlValue>) -> SqlRow {
        let columns = ColumnInfo::new(names.iter().map(|n| (*n).to_string()).collect());
        SqlRow::new(Arc::new(columns), values)
    }

    #[test]
    fn tables_are_named_like_adapter_fill() {
        assert_eq!(table_name_for(0), "Table");
        assert_eq!(table_name_for(2), "Table2");
    }

    #[test]
    fn merging_new_columns_pads_existing_rows() {
        let mut set = DataSet::new();
        let first = row(&["id"], vec![SqlValue::I32(1)]);
        let table = set.table_or_insert("Table");
        let mapping = table.merge_columns(first.columns());
        table.append_mapped(&first, &mapping);

        let second = row(&["name", "id"], vec![SqlValue::from("b"), SqlValue::I32(2)]);
        let table = set.table_or_insert("Table");
        let mapping = table.merge_columns(second.columns());
        assert_eq!(mapping, vec![1, 0]);
        table.append_mapped(&second, &mapping);

        let table = set.table("Table").unwrap();
        assert_eq!(table.columns().names(), ["id", "name"]);
        assert_eq!(table.value(0, "name"), Some(&SqlValue::Null));
        assert_eq!(table.value(1, "id"), Some(&SqlValue::I32(2)));
    }

    #[test]
    fn unnamed_and_repeated_columns_keep_every_value() {
        let mut set = DataSet::new();
        let source = row(&["", "", "a", "a", "A"], vec![
            SqlValue::I32(1),
            SqlValue::I32(2),
            SqlValue::I32(3),
            SqlValue::I32(4),
            SqlValue::I32(5),
        ]);
        let table = set.table_or_insert("Table");
        let mapping = table.merge_columns(source.columns());
        assert_eq!(mapping, vec![0, 1, 2, 3, 4]);
        table.append_mapped(&source, &mapping);

        let table = set.table("Table").unwrap();
        assert_eq!(table.columns().names(), ["Column1", "Column2", "a", "a1", "A2"]);
        assert_eq!(table.value(0, "Column2"), Some(&SqlValue::I32(2)));
        assert_eq!(table.value(0, "a1"), Some(&SqlValue::I32(4)));
        assert_eq!(table.value(0, "A2"), Some(&SqlValue::I32(5)));
    }

    #[test]
    fn refill_matches_existing_columns_ignoring_case() {
        let mut set = DataSet::new();
        let first = row(&["Id", ""], vec![SqlValue::I32(1), SqlValue::I32(10)]);
        let table = set.table_or_insert("Table");
        let mapping = table.merge_columns(first.columns());
        table.append_mapped(&first, &mapping);

        let second = row(&["ID", ""], vec![SqlValue::I32(2), SqlValue::I32(20)]);
        let table = set.table_or_insert("Table");
        let mapping = table.merge_columns(second.columns());
        assert_eq!(mapping, vec![0, 1]);
        table.append_mapped(&second, &mapping);

        let table = set.table("Table").unwrap();
        assert_eq!(table.columns().len(), 2);
        assert_eq!(table.value(1, "Column1"), Some(&SqlValue::I32(20)));
    }

    #[test]
    fn json_rendering_keys_rows_by_column() {
        let mut set = DataSet::new();
        let source = row(&["my"], vec![SqlValue::from("123")]);
        let table = set.table_or_insert("Table");
        let mapping = table.merge_columns(source.columns());
        table.append_mapped(&source, &mapping);

        assert_eq!(
            set.to_json(),
            serde_json::json!({ "Table": [ { "my": "123" } ] })
        );
    }
}
