//! Normalized records and the field conventions applied before classification

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Timelike, Utc};
use serde_json::{Map, Value};
use std::fmt::Display;

/// A transformer's output: a JSON object ready for classification
pub type Record = Map<String, Value>;

/// Fields Miso reads as timestamps
///
/// Values arriving from templates are plain JSON and are uploaded as they
/// are; numbers in these fields are not reinterpreted as epochs.
pub const TIMESTAMP_FIELDS: [&str; 3] = ["updated_at", "created_at", "timestamp"];

/// True when a transformer output means "nothing to upload"
pub fn is_empty_output(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().map(|f| f == 0.0).unwrap_or(false),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// ISO-8601 text of a datetime with whole seconds and its own offset,
/// e.g. `2022-03-26T18:45:53+00:00`
pub fn format_timestamp<Tz>(dt: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let dt = dt.with_nanosecond(0).unwrap_or_else(|| dt.clone());
    dt.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// JSON value for a datetime produced in code, for use in [`TIMESTAMP_FIELDS`]
pub fn timestamp_value<Tz>(dt: &DateTime<Tz>) -> Value
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    Value::String(format_timestamp(dt))
}

/// Like [`timestamp_value`] for a datetime without an offset, read as UTC
pub fn naive_timestamp_value(dt: &NaiveDateTime) -> Value {
    timestamp_value(&Utc.from_utc_datetime(dt))
}
