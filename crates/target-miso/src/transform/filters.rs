//! Template filters for cleaning up raw source values

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Timelike};
use minijinja::{Error, ErrorKind, Value};

const NAIVE_DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

fn invalid(msg: String) -> Error {
    Error::new(ErrorKind::InvalidOperation, msg)
}

fn is_null_marker(value: &Value) -> bool {
    !value.is_true() || value.as_str() == Some("NULL")
}

/// Parse a date or datetime and render it as ISO-8601 with seconds precision
///
/// Values without an offset are taken as UTC.
pub fn datetime_format(value: Value) -> Result<String, Error> {
    let text = value.to_string();
    let text = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        let dt = dt.with_nanosecond(0).unwrap_or(dt);
        return Ok(dt.to_rfc3339_opts(SecondsFormat::Secs, false));
    }

    let naive = NAIVE_DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| invalid(format!("cannot parse '{}' as a date", text)))?;

    Ok(naive
        .and_utc()
        .to_rfc3339_opts(SecondsFormat::Secs, false))
}

/// Wrap a value as a one-element list of strings; empty or `NULL` gives none
pub fn list_of_str(value: Value) -> Value {
    if is_null_marker(&value) {
        return Value::from(());
    }
    Value::from(vec![value.to_string()])
}

/// Wrap a value as a single one-level category path; empty or `NULL` gives none
pub fn convert_categories(value: Value) -> Value {
    if is_null_marker(&value) {
        return Value::from(());
    }
    Value::from(vec![vec![value.to_string()]])
}

/// Strip quotes, backslashes, escaped nulls and line breaks
pub fn remove_symbol(value: Value) -> String {
    if !value.is_true() {
        return String::new();
    }
    if value.is_number() {
        return value.to_string();
    }

    value
        .to_string()
        .replace("\\N", "")
        .replace("\\r", "")
        .replace(['"', '\\', '\u{201c}', '\r', '\n'], "")
        .replace("â€œ", "")
}

/// Split a comma separated value; empty gives an empty list
pub fn split(value: Value) -> Vec<String> {
    if !value.is_true() {
        return Vec::new();
    }
    value.to_string().split(',').map(str::to_string).collect()
}

/// Percent-encode the path of a URL
pub fn fix_url(value: String) -> String {
    match url::Url::parse(&value) {
        Ok(parsed) => parsed.to_string(),
        Err(_) => value
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/"),
    }
}

/// Serialize a value as JSON text
pub fn jsonify(value: Value) -> Result<String, Error> {
    serde_json::to_string(&value).map_err(|e| invalid(format!("cannot serialize value: {}", e)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_datetime_format() {
        assert_eq!(
            datetime_format(Value::from("2022-03-26 18:45:53")).unwrap(),
            "2022-03-26T18:45:53+00:00"
        );
        assert_eq!(
            datetime_format(Value::from("2022-03-26T18:45:53.123456")).unwrap(),
            "2022-03-26T18:45:53+00:00"
        );
        assert_eq!(
            datetime_format(Value::from("2022-03-26T18:45:53.5+08:00")).unwrap(),
            "2022-03-26T18:45:53+08:00"
        );
        assert_eq!(
            datetime_format(Value::from("2022-03-26")).unwrap(),
            "2022-03-26T00:00:00+00:00"
        );
        assert!(datetime_format(Value::from("yesterday-ish")).is_err());
    }

    #[test]
    fn test_list_of_str() {
        assert_eq!(list_of_str(Value::from("red")), Value::from(vec!["red"]));
        assert_eq!(list_of_str(Value::from(7)), Value::from(vec!["7"]));
        assert!(list_of_str(Value::from("NULL")).is_none());
        assert!(list_of_str(Value::from("")).is_none());
        assert!(list_of_str(Value::from(())).is_none());
    }

    #[test]
    fn test_convert_categories() {
        assert_eq!(
            convert_categories(Value::from("Shoes")),
            Value::from(vec![vec!["Shoes"]])
        );
        assert!(convert_categories(Value::from("NULL")).is_none());
    }

    #[test]
    fn test_remove_symbol() {
        assert_eq!(remove_symbol(Value::from("say \"hi\"\r\n")), "say hi");
        assert_eq!(remove_symbol(Value::from("a\\Nb\\c")), "abc");
        assert_eq!(remove_symbol(Value::from("\u{201c}quoted")), "quoted");
        assert_eq!(remove_symbol(Value::from(42)), "42");
        assert_eq!(remove_symbol(Value::from(())), "");
        assert_eq!(remove_symbol(Value::from("")), "");
    }

    #[test]
    fn test_split() {
        assert_eq!(split(Value::from("a,b,,c")), vec!["a", "b", "", "c"]);
        assert!(split(Value::from("")).is_empty());
        assert!(split(Value::from(())).is_empty());
    }

    #[test]
    fn test_fix_url() {
        assert_eq!(
            fix_url("https://cdn.example.com/img/red shoe.png".to_string()),
            "https://cdn.example.com/img/red%20shoe.png"
        );
        assert_eq!(
            fix_url("https://cdn.example.com/a%20b.png".to_string()),
            "https://cdn.example.com/a%20b.png"
        );
        assert_eq!(fix_url("img/red shoe.png".to_string()), "img/red%20shoe.png");
    }

    #[test]
    fn test_jsonify() {
        let value = Value::from_serialize(serde_json::json!({"a": [1, "b"]}));
        assert_eq!(jsonify(value).unwrap(), r#"{"a":[1,"b"]}"#);
        assert_eq!(jsonify(Value::from("x")).unwrap(), r#""x""#);
    }
}
