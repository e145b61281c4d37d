use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use tiberius::{ColumnData, FromSql, Query};

use super::batch::Bind;
use crate::error::SqlFluentError;
use crate::results::{ColumnInfo, SqlRow};
use crate::types::{SqlType, SqlValue};

/// Bind every value to the query as `@P1..@Pn`, in order.
pub fn bind_all<'a>(query: &mut Query<'a>, binds: &[Bind]) {
    for bind in binds {
        bind_value(query, bind);
    }
}

fn bind_value(query: &mut Query<'_>, bind: &Bind) {
    match &bind.value {
        SqlValue::Null => match bind.sql_type {
            // A NULL nvarchar does not convert implicitly to binary types
            Some(SqlType::VarBinary | SqlType::Binary) => query.bind(Option::<Vec<u8>>::None),
            _ => query.bind(Option::<String>::None),
        },
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::U8(v) => query.bind(*v),
        SqlValue::I16(v) => query.bind(*v),
        SqlValue::I32(v) => query.bind(*v),
        SqlValue::I64(v) => query.bind(*v),
        SqlValue::F32(v) => query.bind(*v),
        SqlValue::F64(v) => query.bind(*v),
        SqlValue::Decimal(v) => query.bind(*v),
        SqlValue::String(v) | SqlValue::Xml(v) => query.bind(v.clone()),
        SqlValue::Binary(v) => query.bind(v.clone()),
        SqlValue::Guid(v) => query.bind(*v),
        SqlValue::DateTime(v) => query.bind(*v),
        SqlValue::DateTimeOffset(v) => query.bind(*v),
        SqlValue::Date(v) => query.bind(*v),
        SqlValue::Time(v) => query.bind(*v),
    }
}

fn decoded<'a, T, F>(data: &'a ColumnData<'static>, wrap: F) -> Result<SqlValue, SqlFluentError>
where
    T: FromSql<'a>,
    F: FnOnce(T) -> SqlValue,
{
    Ok(T::from_sql(data)?.map_or(SqlValue::Null, wrap))
}

/// Convert one cell as delivered by tiberius.
///
/// # Errors
///
/// Returns the driver error when a temporal or numeric value cannot be decoded.
pub fn column_value(data: &ColumnData<'static>) -> Result<SqlValue, SqlFluentError> {
    let value = match data {
        ColumnData::U8(v) => v.map_or(SqlValue::Null, SqlValue::U8),
        ColumnData::I16(v) => v.map_or(SqlValue::Null, SqlValue::I16),
        ColumnData::I32(v) => v.map_or(SqlValue::Null, SqlValue::I32),
        ColumnData::I64(v) => v.map_or(SqlValue::Null, SqlValue::I64),
        ColumnData::F32(v) => v.map_or(SqlValue::Null, SqlValue::F32),
        ColumnData::F64(v) => v.map_or(SqlValue::Null, SqlValue::F64),
        ColumnData::Bit(v) => v.map_or(SqlValue::Null, SqlValue::Bool),
        ColumnData::Guid(v) => v.map_or(SqlValue::Null, SqlValue::Guid),
        ColumnData::String(v) => v
            .as_deref()
            .map_or(SqlValue::Null, |s| SqlValue::String(s.to_string())),
        ColumnData::Binary(v) => v
            .as_deref()
            .map_or(SqlValue::Null, |b| SqlValue::Binary(b.to_vec())),
        ColumnData::Xml(v) => v
            .as_deref()
            .map_or(SqlValue::Null, |x| SqlValue::Xml(x.clone().into_string())),
        ColumnData::Numeric(_) => decoded::<Decimal, _>(data, SqlValue::Decimal)?,
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            decoded::<NaiveDateTime, _>(data, SqlValue::DateTime)?
        }
        ColumnData::Date(_) => decoded::<NaiveDate, _>(data, SqlValue::Date)?,
        ColumnData::Time(_) => decoded::<NaiveTime, _>(data, SqlValue::Time)?,
        ColumnData::DateTimeOffset(_) => {
            decoded::<DateTime<FixedOffset>, _>(data, SqlValue::DateTimeOffset)?
        }
    };
    Ok(value)
}

/// Column layout of a tiberius result set.
#[must_use]
pub fn column_info(columns: &[tiberius::Column]) -> Arc<ColumnInfo> {
    Arc::new(ColumnInfo::new(
        columns.iter().map(|col| col.name().to_string()).collect(),
    ))
}

/// Detach a tiberius row into an owned [`SqlRow`].
///
/// # Errors
///
/// Returns the driver error when a cell cannot be decoded.
pub fn to_sql_row(columns: &Arc<ColumnInfo>, row: tiberius::Row) -> Result<SqlRow, SqlFluentError> {
    let values = row
        .into_iter()
        .map(|data| column_value(&data))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(SqlRow::new(Arc::clone(columns), values))
}
