use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use sql_fluent::prelude::*;
use sql_fluent::test_utils::create_test_row;
use uuid::Uuid;

fn sample_row() -> SqlRow {
    let at = NaiveDate::from_ymd_opt(2024, 3, 9)
        .unwrap()
        .and_hms_milli_opt(14, 30, 5, 250)
        .unwrap();
    create_test_row(
        &[
            "id", "count", "small", "tiny", "ratio", "weight", "active", "key", "price",
            "created", "starts", "name", "initial", "blank", "payload", "doc", "nothing",
        ],
        vec![
            SqlValue::I64(9_000_000_000),
            SqlValue::I32(12),
            SqlValue::I16(-3),
            SqlValue::U8(200),
            SqlValue::F64(0.25),
            SqlValue::F32(1.5),
            SqlValue::Bool(true),
            SqlValue::Guid(Uuid::nil()),
            SqlValue::Decimal(Decimal::new(1999, 2)),
            SqlValue::DateTime(at),
            SqlValue::Time(NaiveTime::from_hms_opt(8, 15, 0).unwrap()),
            SqlValue::from("Ada"),
            SqlValue::from("Zed"),
            SqlValue::from(""),
            SqlValue::Binary(vec![1, 2, 3]),
            SqlValue::Xml("<a/>".into()),
            SqlValue::Null,
        ],
    )
}

#[test]
fn typed_getters_read_native_values() {
    let row = sample_row();
    assert_eq!(row.get_i64("id").unwrap(), 9_000_000_000);
    assert_eq!(row.get_i32("count").unwrap(), 12);
    assert_eq!(row.get_i16("small").unwrap(), -3);
    assert_eq!(row.get_u8("tiny").unwrap(), 200);
    assert!((row.get_f64("ratio").unwrap() - 0.25).abs() < f64::EPSILON);
    assert!((row.get_f32("weight").unwrap() - 1.5).abs() < f32::EPSILON);
    assert!(row.get_bool("active").unwrap());
    assert_eq!(row.get_guid("key").unwrap(), Uuid::nil());
    assert_eq!(row.get_decimal("price").unwrap(), Decimal::new(1999, 2));
    assert_eq!(row.get_string("name").unwrap().as_deref(), Some("Ada"));
    assert_eq!(row.get_bytes("payload").unwrap(), [1, 2, 3]);
    assert_eq!(row.get_xml("doc").unwrap().as_deref(), Some("<a/>"));
}

#[test]
fn nullable_getters_agree_with_plain_getters() {
    let row = sample_row();
    assert_eq!(row.get_i64_null("id").unwrap(), Some(row.get_i64("id").unwrap()));
    assert_eq!(row.get_i32_null("count").unwrap(), Some(row.get_i32("count").unwrap()));
    assert_eq!(row.get_bool_null("active").unwrap(), Some(true));
    assert_eq!(
        row.get_date_time_null("created").unwrap(),
        Some(row.get_date_time("created").unwrap())
    );

    assert_eq!(row.get_i32_null("nothing").unwrap(), None);
    assert_eq!(row.get_guid_null("nothing").unwrap(), None);
    assert_eq!(row.get_date_time_utc_null("nothing").unwrap(), None);
    assert_eq!(row.get_bytes_null("nothing").unwrap(), None);
    assert_eq!(row.get_string("nothing").unwrap(), None);
    assert!(matches!(
        row.get_i32("nothing"),
        Err(SqlFluentError::NullValue(name)) if name == "nothing"
    ));
}

#[test]
fn utc_variant_keeps_the_clock_fields() {
    let row = sample_row();
    let local = row.get_date_time("created").unwrap();
    let utc = row.get_date_time_utc("created").unwrap();
    assert_eq!(utc.naive_utc(), local);
    assert_eq!(utc.to_rfc3339(), "2024-03-09T14:30:05.250+00:00");
}

#[test]
fn time_reads_as_time_of_day_and_span() {
    let row = sample_row();
    assert_eq!(row.get_time("starts").unwrap(), NaiveTime::from_hms_opt(8, 15, 0).unwrap());
    assert_eq!(row.get_time_span("starts").unwrap(), chrono::Duration::minutes(8 * 60 + 15));
}

#[test]
fn char_reads_the_first_character() {
    let row = sample_row();
    assert_eq!(row.get_char("initial").unwrap(), Some('Z'));
    assert_eq!(row.get_char("blank").unwrap(), None);
    assert_eq!(row.get_char("nothing").unwrap(), None);
}

#[test]
fn unknown_column_names_the_column() {
    let row = sample_row();
    let err = row.get_string("nmae").unwrap_err();
    assert_eq!(err.to_string(), "The \"nmae\" is not a valid column name.");
    assert!(matches!(row.get_i32_null("missing"), Err(SqlFluentError::ColumnNotFound(_))));
    assert!(row.is_db_null("missing").is_err());
}

#[test]
fn column_lookup_falls_back_to_case_insensitive() {
    let row = sample_row();
    assert_eq!(row.get_i32("COUNT").unwrap(), 12);
}

#[test]
fn getters_do_not_coerce_between_types() {
    let row = sample_row();
    assert!(matches!(row.get_i32("id"), Err(SqlFluentError::TypeMismatch { .. })));
    assert!(matches!(row.get_string("count"), Err(SqlFluentError::TypeMismatch { .. })));
}

#[test]
fn field_safe_converts_or_falls_back() {
    let row = sample_row();
    assert_eq!(row.get_field_safe("count", 0_i64).unwrap(), 12);
    assert_eq!(row.get_field_safe("nothing", 77_i32).unwrap(), 77);
    assert_eq!(row.get_field_safe("name", String::new()).unwrap(), "Ada");
    assert!(row.get_field_safe("id", 0_i32).is_err());
}

#[test]
fn whole_row_snapshots() {
    let row = sample_row();
    assert!(row.is_db_null("nothing").unwrap());
    assert!(!row.is_db_null("name").unwrap());
    assert_eq!(row.get_value("count").unwrap(), SqlValue::I32(12));
    assert_eq!(row.get_value("nothing").unwrap(), SqlValue::Null);

    let values = row.get_row().unwrap();
    assert_eq!(values.len(), 17);
    assert_eq!(values[1], SqlValue::I32(12));
    let columns = row.get_all_columns().unwrap();
    assert_eq!(columns.first().map(String::as_str), Some("id"));
    assert_eq!(columns.last().map(String::as_str), Some("nothing"));
}

/// A reader that only hands out binary data through `read_bytes`.
struct StreamingRecord {
    payload: SqlValue,
}

impl DataRecord for StreamingRecord {
    fn field_count(&self) -> usize {
        1
    }

    fn name_at(&self, ordinal: usize) -> Result<&str, SqlFluentError> {
        match ordinal {
            0 => Ok("blob"),
            _ => Err(SqlFluentError::OrdinalOutOfRange { ordinal, count: 1 }),
        }
    }

    fn ordinal(&self, name: &str) -> Result<usize, SqlFluentError> {
        if name.eq_ignore_ascii_case("blob") {
            Ok(0)
        } else {
            Err(SqlFluentError::ColumnNotFound(name.to_string()))
        }
    }

    fn value_at(&self, ordinal: usize) -> Result<&SqlValue, SqlFluentError> {
        match ordinal {
            0 => Ok(&self.payload),
            _ => Err(SqlFluentError::OrdinalOutOfRange { ordinal, count: 1 }),
        }
    }
}

#[test]
fn bytes_are_read_in_chunks_from_custom_records() {
    let data: Vec<u8> = (0..20_000_u32).map(|i| (i % 251) as u8).collect();
    let record = StreamingRecord {
        payload: SqlValue::Binary(data.clone()),
    };
    assert_eq!(record.get_bytes("blob").unwrap(), data);

    let empty = StreamingRecord {
        payload: SqlValue::Binary(Vec::new()),
    };
    assert_eq!(empty.get_bytes("blob").unwrap(), Vec::<u8>::new());

    let null = StreamingRecord {
        payload: SqlValue::Null,
    };
    assert_eq!(null.get_bytes_null("blob").unwrap(), None);
    assert!(matches!(null.get_bytes("blob"), Err(SqlFluentError::NullValue(_))));
}
