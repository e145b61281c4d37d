pub mod data_set;
pub mod row;

pub use data_set::{DataSet, DataTable};
pub use row::{ColumnInfo, SqlRow};
