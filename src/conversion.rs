use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::SqlFluentError;
use crate::types::SqlValue;

/// Caller-driven coercion of a [`SqlValue`] into a Rust type.
///
/// This is the `T` behind `exec_scalar::<T>()`, `get_param_value::<T>()`,
/// `get_return_value::<T>()` and `get_field_safe::<T>()`. Integers widen
/// losslessly and narrow only when the value fits; everything else must
/// match the stored type. NULL converts only into `Option<T>` (as `None`)
/// and into [`SqlValue`] itself.
pub trait FromSqlValue: Sized {
    /// Convert a value read from the database.
    ///
    /// # Errors
    ///
    /// Returns `SqlFluentError::TypeMismatch` when the stored type cannot
    /// be represented as `Self`.
    fn from_sql_value(value: &SqlValue) -> Result<Self, SqlFluentError>;
}

fn mismatch<T>(expected: &'static str, value: &SqlValue) -> Result<T, SqlFluentError> {
    Err(SqlFluentError::type_mismatch(expected, value.type_name()))
}

macro_rules! impl_integer {
    ($($target:ty),* $(,)?) => {
        $(
            impl FromSqlValue for $target {
                fn from_sql_value(value: &SqlValue) -> Result<Self, SqlFluentError> {
                    let converted = match value {
                        SqlValue::U8(v) => <$target>::try_from(*v).ok(),
                        SqlValue::I16(v) => <$target>::try_from(*v).ok(),
                        SqlValue::I32(v) => <$target>::try_from(*v).ok(),
                        SqlValue::I64(v) => <$target>::try_from(*v).ok(),
                        _ => return mismatch(stringify!($target), value),
                    };
                    converted.ok_or_else(|| {
                        SqlFluentError::type_mismatch(stringify!($target), "out-of-range integer")
                    })
                }
            }
        )*
    };
}

impl_integer!(u8, i16, i32, i64);

impl FromSqlValue for f64 {
    fn from_sql_value(value: &SqlValue) -> Result<Self, SqlFluentError> {
        match value {
            SqlValue::F64(v) => Ok(*v),
            SqlValue::F32(v) => Ok(f64::from(*v)),
            _ => mismatch("f64", value),
        }
    }
}

impl FromSqlValue for f32 {
    fn from_sql_value(value: &SqlValue) -> Result<Self, SqlFluentError> {
        match value {
            SqlValue::F32(v) => Ok(*v),
            _ => mismatch("f32", value),
        }
    }
}

impl FromSqlValue for bool {
    fn from_sql_value(value: &SqlValue) -> Result<Self, SqlFluentError> {
        match value {
            SqlValue::Bool(v) => Ok(*v),
            _ => mismatch("bool", value),
        }
    }
}

impl FromSqlValue for Decimal {
    fn from_sql_value(value: &SqlValue) -> Result<Self, SqlFluentError> {
        match value {
            SqlValue::Decimal(v) => Ok(*v),
            SqlValue::U8(v) => Ok(Decimal::from(*v)),
            SqlValue::I16(v) => Ok(Decimal::from(*v)),
            SqlValue::I32(v) => Ok(Decimal::from(*v)),
            SqlValue::I64(v) => Ok(Decimal::from(*v)),
            _ => mismatch("Decimal", value),
        }
    }
}

impl FromSqlValue for String {
    fn from_sql_value(value: &SqlValue) -> Result<Self, SqlFluentError> {
        match value.as_str() {
            Some(s) => Ok(s.to_string()),
            None => mismatch("String", value),
        }
    }
}

impl FromSqlValue for Vec<u8> {
    fn from_sql_value(value: &SqlValue) -> Result<Self, SqlFluentError> {
        match value {
            SqlValue::Binary(bytes) => Ok(bytes.clone()),
            _ => mismatch("Vec<u8>", value),
        }
    }
}

impl FromSqlValue for Uuid {
    fn from_sql_value(value: &SqlValue) -> Result<Self, SqlFluentError> {
        match value {
            SqlValue::Guid(v) => Ok(*v),
            _ => mismatch("Uuid", value),
        }
    }
}

impl FromSqlValue for NaiveDateTime {
    fn from_sql_value(value: &SqlValue) -> Result<Self, SqlFluentError> {
        match value {
            SqlValue::DateTime(v) => Ok(*v),
            SqlValue::Date(d) => Ok(d.and_time(NaiveTime::default())),
            _ => mismatch("NaiveDateTime", value),
        }
    }
}

impl FromSqlValue for DateTime<FixedOffset> {
    fn from_sql_value(value: &SqlValue) -> Result<Self, SqlFluentError> {
        match value {
            SqlValue::DateTimeOffset(v) => Ok(*v),
            _ => mismatch("DateTime<FixedOffset>", value),
        }
    }
}

impl FromSqlValue for DateTime<Utc> {
    fn from_sql_value(value: &SqlValue) -> Result<Self, SqlFluentError> {
        match value {
            SqlValue::DateTimeOffset(v) => Ok(v.with_timezone(&Utc)),
            SqlValue::DateTime(v) => Ok(v.and_utc()),
            _ => mismatch("DateTime<Utc>", value),
        }
    }
}

impl FromSqlValue for NaiveDate {
    fn from_sql_value(value: &SqlValue) -> Result<Self, SqlFluentError> {
        match value {
            SqlValue::Date(v) => Ok(*v),
            _ => mismatch("NaiveDate", value),
        }
    }
}

impl FromSqlValue for NaiveTime {
    fn from_sql_value(value: &SqlValue) -> Result<Self, SqlFluentError> {
        match value {
            SqlValue::Time(v) => Ok(*v),
            _ => mismatch("NaiveTime", value),
        }
    }
}

/// `time` columns read as the elapsed time since midnight.
impl FromSqlValue for Duration {
    fn from_sql_value(value: &SqlValue) -> Result<Self, SqlFluentError> {
        match value {
            SqlValue::Time(v) => Ok(v.signed_duration_since(NaiveTime::default())),
            _ => mismatch("Duration", value),
        }
    }
}

impl FromSqlValue for SqlValue {
    fn from_sql_value(value: &SqlValue) -> Result<Self, SqlFluentError> {
        Ok(value.clone())
    }
}

impl<T: FromSqlValue> FromSqlValue for Option<T> {
    fn from_sql_value(value: &SqlValue) -> Result<Self, SqlFluentError> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_sql_value(value).map(Some)
        }
    }
}

/// Convert a value, mapping NULL to `T::default()`.
pub(crate) fn from_sql_or_default<T: FromSqlValue + Default>(
    value: &SqlValue,
) -> Result<T, SqlFluentError> {
    if value.is_null() {
        Ok(T::default())
    } else {
        T::from_sql_value(value)
    }
}
