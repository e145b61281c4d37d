use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// A single database value, either bound as a parameter or read from a row.
///
/// `Null` is the database-null sentinel. Binding `None` through
/// [`From<Option<T>>`] produces it automatically:
/// ```rust
/// use sql_fluent::prelude::*;
///
/// let missing: Option<i32> = None;
/// assert!(SqlValue::from(missing).is_null());
/// assert_eq!(SqlValue::from(Some(7_i32)), SqlValue::I32(7));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    /// Database NULL
    Null,
    /// `bit`
    Bool(bool),
    /// `tinyint`
    U8(u8),
    /// `smallint`
    I16(i16),
    /// `int`
    I32(i32),
    /// `bigint`
    I64(i64),
    /// `real`
    F32(f32),
    /// `float`
    F64(f64),
    /// `decimal` / `numeric` / `money`
    Decimal(Decimal),
    /// Any character type
    String(String),
    /// Any binary type
    Binary(Vec<u8>),
    /// `uniqueidentifier`
    Guid(Uuid),
    /// `datetime`, `datetime2`, `smalldatetime`
    DateTime(NaiveDateTime),
    /// `datetimeoffset`
    DateTimeOffset(DateTime<FixedOffset>),
    /// `date`
    Date(NaiveDate),
    /// `time`
    Time(NaiveTime),
    /// `xml`
    Xml(String),
}

impl SqlValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short name of the carried type, used in conversion errors.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "NULL",
            SqlValue::Bool(_) => "bit",
            SqlValue::U8(_) => "tinyint",
            SqlValue::I16(_) => "smallint",
            SqlValue::I32(_) => "int",
            SqlValue::I64(_) => "bigint",
            SqlValue::F32(_) => "real",
            SqlValue::F64(_) => "float",
            SqlValue::Decimal(_) => "decimal",
            SqlValue::String(_) => "nvarchar",
            SqlValue::Binary(_) => "varbinary",
            SqlValue::Guid(_) => "uniqueidentifier",
            SqlValue::DateTime(_) => "datetime2",
            SqlValue::DateTimeOffset(_) => "datetimeoffset",
            SqlValue::Date(_) => "date",
            SqlValue::Time(_) => "time",
            SqlValue::Xml(_) => "xml",
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::String(s) | SqlValue::Xml(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        if let SqlValue::Binary(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }
}

macro_rules! impl_from_native {
    ($($native:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$native> for SqlValue {
                fn from(value: $native) -> Self {
                    SqlValue::$variant(value)
                }
            }
        )*
    };
}

impl_from_native! {
    bool => Bool,
    u8 => U8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    f32 => F32,
    f64 => F64,
    Decimal => Decimal,
    String => String,
    Vec<u8> => Binary,
    Uuid => Guid,
    NaiveDateTime => DateTime,
    DateTime<FixedOffset> => DateTimeOffset,
    NaiveDate => Date,
    NaiveTime => Time,
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::String(value.to_string())
    }
}

impl From<&[u8]> for SqlValue {
    fn from(value: &[u8]) -> Self {
        SqlValue::Binary(value.to_vec())
    }
}

impl From<char> for SqlValue {
    fn from(value: char) -> Self {
        SqlValue::String(value.to_string())
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(value: DateTime<Utc>) -> Self {
        SqlValue::DateTimeOffset(value.fixed_offset())
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(SqlValue::Null, Into::into)
    }
}

/// Declared SQL Server type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    BigInt,
    Int,
    SmallInt,
    TinyInt,
    Bit,
    Float,
    Real,
    Decimal,
    Money,
    NVarChar,
    VarChar,
    NChar,
    Char,
    VarBinary,
    Binary,
    UniqueIdentifier,
    DateTime,
    DateTime2,
    SmallDateTime,
    Date,
    Time,
    DateTimeOffset,
    Xml,
}

impl SqlType {
    /// Size applied to an output parameter registered without one.
    ///
    /// Wide text gets 4000, narrow text and binary 8000, fixed-width types 0.
    #[must_use]
    pub fn default_output_size(self) -> i32 {
        match self {
            SqlType::NVarChar => 4000,
            SqlType::VarChar | SqlType::VarBinary => 8000,
            _ => 0,
        }
    }

    /// Type the driver would infer for a bound value with no declared type.
    ///
    /// Date-times are declared `datetime2` so fractional seconds survive.
    /// `None` for NULL, which carries no type of its own.
    #[must_use]
    pub fn infer(value: &SqlValue) -> Option<SqlType> {
        let inferred = match value {
            SqlValue::Null => return None,
            SqlValue::Bool(_) => SqlType::Bit,
            SqlValue::U8(_) => SqlType::TinyInt,
            SqlValue::I16(_) => SqlType::SmallInt,
            SqlValue::I32(_) => SqlType::Int,
            SqlValue::I64(_) => SqlType::BigInt,
            SqlValue::F32(_) => SqlType::Real,
            SqlValue::F64(_) => SqlType::Float,
            SqlValue::Decimal(_) => SqlType::Decimal,
            SqlValue::String(_) => SqlType::NVarChar,
            SqlValue::Binary(_) => SqlType::VarBinary,
            SqlValue::Guid(_) => SqlType::UniqueIdentifier,
            SqlValue::DateTime(_) => SqlType::DateTime2,
            SqlValue::DateTimeOffset(_) => SqlType::DateTimeOffset,
            SqlValue::Date(_) => SqlType::Date,
            SqlValue::Time(_) => SqlType::Time,
            SqlValue::Xml(_) => SqlType::Xml,
        };
        Some(inferred)
    }
}

/// Direction of a command parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ParameterDirection {
    #[default]
    Input,
    Output,
    InputOutput,
    ReturnValue,
}

impl ParameterDirection {
    /// Whether the final value is read back after execution.
    #[must_use]
    pub fn is_output(self) -> bool {
        !matches!(self, ParameterDirection::Input)
    }
}

/// How the command text is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandKind {
    /// Ad-hoc batch text
    #[default]
    Text,
    /// Name of a stored procedure
    StoredProcedure,
}
