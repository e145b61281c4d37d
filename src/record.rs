//! Row-reader abstraction and the by-name typed accessors built on it.
//!
//! Any type that can hand out values by position and resolve a column
//! name to a position implements [`DataRecord`]; [`DataRecordExt`] then
//! adds the null-safe getters to it:
//! ```rust
//! use std::sync::Arc;
//! use sql_fluent::prelude::*;
//!
//! let columns = Arc::new(ColumnInfo::new(vec!["id".into(), "nickname".into()]));
//! let row = SqlRow::new(columns, vec![SqlValue::I32(7), SqlValue::Null]);
//!
//! assert_eq!(row.get_i32("id")?, 7);
//! assert_eq!(row.get_i32_null("id")?, Some(7));
//! assert_eq!(row.get_string("nickname")?, None);
//! # Ok::<(), SqlFluentError>(())
//! ```

use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::conversion::FromSqlValue;
use crate::error::SqlFluentError;
use crate::types::SqlValue;

const BYTES_CHUNK: usize = 8192;

/// A positionable row of column values.
pub trait DataRecord {
    fn field_count(&self) -> usize;

    /// Column name at `ordinal`.
    ///
    /// # Errors
    ///
    /// Returns `SqlFluentError::OrdinalOutOfRange` when `ordinal` is out of range.
    fn name_at(&self, ordinal: usize) -> Result<&str, SqlFluentError>;

    /// Position of the column called `name`.
    ///
    /// # Errors
    ///
    /// Returns `SqlFluentError::ColumnNotFound` when no column matches.
    fn ordinal(&self, name: &str) -> Result<usize, SqlFluentError>;

    /// Native value at `ordinal`.
    ///
    /// # Errors
    ///
    /// Returns `SqlFluentError::OrdinalOutOfRange` when `ordinal` is out of range.
    fn value_at(&self, ordinal: usize) -> Result<&SqlValue, SqlFluentError>;

    /// Whether the value at `ordinal` is database-null.
    ///
    /// # Errors
    ///
    /// Returns `SqlFluentError::OrdinalOutOfRange` when `ordinal` is out of range.
    fn is_null_at(&self, ordinal: usize) -> Result<bool, SqlFluentError> {
        Ok(self.value_at(ordinal)?.is_null())
    }

    /// Copy up to `buffer.len()` bytes of a binary column, starting at
    /// `field_offset`. Returns how many bytes were copied (0 at the end).
    ///
    /// # Errors
    ///
    /// Returns an error for NULL or non-binary columns.
    fn read_bytes(
        &self,
        ordinal: usize,
        field_offset: usize,
        buffer: &mut [u8],
    ) -> Result<usize, SqlFluentError> {
        let bytes = match self.value_at(ordinal)? {
            SqlValue::Binary(bytes) => bytes,
            SqlValue::Null => {
                return Err(SqlFluentError::NullValue(self.name_at(ordinal)?.to_string()));
            }
            other => return Err(SqlFluentError::type_mismatch("binary", other.type_name())),
        };
        if field_offset >= bytes.len() {
            return Ok(0);
        }
        let count = buffer.len().min(bytes.len() - field_offset);
        buffer[..count].copy_from_slice(&bytes[field_offset..field_offset + count]);
        Ok(count)
    }

    /// Whole binary value, `None` for NULL.
    ///
    /// Readers without direct access to the buffer get a chunked copy
    /// through [`read_bytes`](Self::read_bytes).
    ///
    /// # Errors
    ///
    /// Returns an error for non-binary columns.
    fn bytes(&self, ordinal: usize) -> Result<Option<Vec<u8>>, SqlFluentError> {
        if self.is_null_at(ordinal)? {
            return Ok(None);
        }
        let mut out = Vec::new();
        let mut chunk = [0_u8; BYTES_CHUNK];
        loop {
            let read = self.read_bytes(ordinal, out.len(), &mut chunk)?;
            if read == 0 {
                break;
            }
            out.extend_from_slice(&chunk[..read]);
        }
        Ok(Some(out))
    }
}

/// Resolve `name`, then extract a typed value; `Ok(None)` for NULL.
fn read_typed<R, T>(
    record: &R,
    name: &str,
    expected: &'static str,
    extract: impl FnOnce(&SqlValue) -> Option<T>,
) -> Result<Option<T>, SqlFluentError>
where
    R: DataRecord + ?Sized,
{
    let ordinal = record.ordinal(name)?;
    let value = record.value_at(ordinal)?;
    if value.is_null() {
        return Ok(None);
    }
    extract(value)
        .map(Some)
        .ok_or_else(|| SqlFluentError::type_mismatch(expected, value.type_name()))
}

fn required<T>(name: &str, value: Option<T>) -> Result<T, SqlFluentError> {
    value.ok_or_else(|| SqlFluentError::NullValue(name.to_string()))
}

fn as_date_time(value: &SqlValue) -> Option<NaiveDateTime> {
    match value {
        SqlValue::DateTime(v) => Some(*v),
        SqlValue::Date(d) => Some(d.and_time(NaiveTime::default())),
        _ => None,
    }
}

fn as_time(value: &SqlValue) -> Option<NaiveTime> {
    if let SqlValue::Time(v) = value {
        Some(*v)
    } else {
        None
    }
}

/// Typed accessors keyed by column name.
///
/// Plain getters fail with `SqlFluentError::NullValue` on database-null;
/// the `_null` variants return `None` instead. Getters do not coerce
/// between native types: `get_i32` on a `bigint` column is a type mismatch.
pub trait DataRecordExt: DataRecord {
    fn get_i64(&self, name: &str) -> Result<i64, SqlFluentError> {
        required(name, self.get_i64_null(name)?)
    }

    fn get_i64_null(&self, name: &str) -> Result<Option<i64>, SqlFluentError> {
        read_typed(self, name, "bigint", |v| match v {
            SqlValue::I64(v) => Some(*v),
            _ => None,
        })
    }

    fn get_i32(&self, name: &str) -> Result<i32, SqlFluentError> {
        required(name, self.get_i32_null(name)?)
    }

    fn get_i32_null(&self, name: &str) -> Result<Option<i32>, SqlFluentError> {
        read_typed(self, name, "int", |v| match v {
            SqlValue::I32(v) => Some(*v),
            _ => None,
        })
    }

    fn get_i16(&self, name: &str) -> Result<i16, SqlFluentError> {
        required(name, self.get_i16_null(name)?)
    }

    fn get_i16_null(&self, name: &str) -> Result<Option<i16>, SqlFluentError> {
        read_typed(self, name, "smallint", |v| match v {
            SqlValue::I16(v) => Some(*v),
            _ => None,
        })
    }

    fn get_u8(&self, name: &str) -> Result<u8, SqlFluentError> {
        required(name, self.get_u8_null(name)?)
    }

    fn get_u8_null(&self, name: &str) -> Result<Option<u8>, SqlFluentError> {
        read_typed(self, name, "tinyint", |v| match v {
            SqlValue::U8(v) => Some(*v),
            _ => None,
        })
    }

    fn get_f64(&self, name: &str) -> Result<f64, SqlFluentError> {
        required(name, self.get_f64_null(name)?)
    }

    fn get_f64_null(&self, name: &str) -> Result<Option<f64>, SqlFluentError> {
        read_typed(self, name, "float", |v| match v {
            SqlValue::F64(v) => Some(*v),
            _ => None,
        })
    }

    fn get_f32(&self, name: &str) -> Result<f32, SqlFluentError> {
        required(name, self.get_f32_null(name)?)
    }

    fn get_f32_null(&self, name: &str) -> Result<Option<f32>, SqlFluentError> {
        read_typed(self, name, "real", |v| match v {
            SqlValue::F32(v) => Some(*v),
            _ => None,
        })
    }

    fn get_bool(&self, name: &str) -> Result<bool, SqlFluentError> {
        required(name, self.get_bool_null(name)?)
    }

    fn get_bool_null(&self, name: &str) -> Result<Option<bool>, SqlFluentError> {
        read_typed(self, name, "bit", |v| match v {
            SqlValue::Bool(v) => Some(*v),
            _ => None,
        })
    }

    fn get_guid(&self, name: &str) -> Result<Uuid, SqlFluentError> {
        required(name, self.get_guid_null(name)?)
    }

    fn get_guid_null(&self, name: &str) -> Result<Option<Uuid>, SqlFluentError> {
        read_typed(self, name, "uniqueidentifier", |v| match v {
            SqlValue::Guid(v) => Some(*v),
            _ => None,
        })
    }

    fn get_decimal(&self, name: &str) -> Result<Decimal, SqlFluentError> {
        required(name, self.get_decimal_null(name)?)
    }

    fn get_decimal_null(&self, name: &str) -> Result<Option<Decimal>, SqlFluentError> {
        read_typed(self, name, "decimal", |v| match v {
            SqlValue::Decimal(v) => Some(*v),
            _ => None,
        })
    }

    fn get_date_time(&self, name: &str) -> Result<NaiveDateTime, SqlFluentError> {
        required(name, self.get_date_time_null(name)?)
    }

    fn get_date_time_null(&self, name: &str) -> Result<Option<NaiveDateTime>, SqlFluentError> {
        read_typed(self, name, "datetime", as_date_time)
    }

    /// Same clock fields as [`get_date_time`](Self::get_date_time), marked as UTC.
    fn get_date_time_utc(&self, name: &str) -> Result<DateTime<Utc>, SqlFluentError> {
        Ok(self.get_date_time(name)?.and_utc())
    }

    fn get_date_time_utc_null(&self, name: &str) -> Result<Option<DateTime<Utc>>, SqlFluentError> {
        Ok(self.get_date_time_null(name)?.map(|dt| dt.and_utc()))
    }

    /// Value of a `time` column as a time of day.
    fn get_time(&self, name: &str) -> Result<NaiveTime, SqlFluentError> {
        required(name, read_typed(self, name, "time", as_time)?)
    }

    /// Value of a `time` column as the elapsed time since midnight.
    fn get_time_span(&self, name: &str) -> Result<Duration, SqlFluentError> {
        let time = self.get_time(name)?;
        Ok(time.signed_duration_since(NaiveTime::default()))
    }

    /// Text value, `None` for NULL.
    fn get_string(&self, name: &str) -> Result<Option<String>, SqlFluentError> {
        read_typed(self, name, "nvarchar", |v| v.as_str().map(str::to_string))
    }

    /// First character of the text value; `None` for NULL or empty text.
    fn get_char(&self, name: &str) -> Result<Option<char>, SqlFluentError> {
        Ok(self.get_string(name)?.and_then(|s| s.chars().next()))
    }

    fn get_bytes(&self, name: &str) -> Result<Vec<u8>, SqlFluentError> {
        required(name, self.get_bytes_null(name)?)
    }

    fn get_bytes_null(&self, name: &str) -> Result<Option<Vec<u8>>, SqlFluentError> {
        let ordinal = self.ordinal(name)?;
        self.bytes(ordinal)
    }

    /// Text of an `xml` column, `None` for NULL.
    fn get_xml(&self, name: &str) -> Result<Option<String>, SqlFluentError> {
        read_typed(self, name, "xml", |v| match v {
            SqlValue::Xml(s) => Some(s.clone()),
            _ => None,
        })
    }

    fn is_db_null(&self, name: &str) -> Result<bool, SqlFluentError> {
        let ordinal = self.ordinal(name)?;
        self.is_null_at(ordinal)
    }

    /// The native value, NULL included.
    fn get_value(&self, name: &str) -> Result<SqlValue, SqlFluentError> {
        let ordinal = self.ordinal(name)?;
        self.value_at(ordinal).cloned()
    }

    /// Convert the native value to `T`, or return `default` for NULL.
    fn get_field_safe<T: FromSqlValue>(&self, name: &str, default: T) -> Result<T, SqlFluentError> {
        let ordinal = self.ordinal(name)?;
        let value = self.value_at(ordinal)?;
        if value.is_null() {
            Ok(default)
        } else {
            T::from_sql_value(value)
        }
    }

    /// Snapshot of every value of the row in column order.
    fn get_row(&self) -> Result<Vec<SqlValue>, SqlFluentError> {
        (0..self.field_count())
            .map(|i| self.value_at(i).cloned())
            .collect()
    }

    /// Snapshot of every column name in column order.
    fn get_all_columns(&self) -> Result<Vec<String>, SqlFluentError> {
        (0..self.field_count())
            .map(|i| self.name_at(i).map(str::to_string))
            .collect()
    }
}

impl<R: DataRecord + ?Sized> DataRecordExt for R {}
