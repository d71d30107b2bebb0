//! Content hashing for upload deduplication
//!
//! Hashes are computed over a canonical serialization with the keys of every
//! object sorted, so field order never changes the result. The text is the
//! same as Python's `json.dumps(value, sort_keys=True)`: `", "` and `": "`
//! separators, non-ASCII escaped as `\uXXXX`, floats in `repr` form. Hashes
//! already stored in checkpoints therefore stay valid.

use serde::Serialize;
use serde_json::ser::{Formatter, Serializer};
use serde_json::{Map, Value};
use std::io;

/// Compute the lowercase hex MD5 of raw bytes
pub fn compute_md5(data: &[u8]) -> String {
    let digest = md5::compute(data);
    format!("{:x}", digest)
}

/// Rebuild a JSON value with the keys of every nested object in sorted order
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(canonical_object(map)),
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

fn canonical_object(map: &Map<String, Value>) -> Map<String, Value> {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();

    let mut sorted = Map::with_capacity(map.len());
    for key in keys {
        if let Some(value) = map.get(key) {
            sorted.insert(key.clone(), canonicalize(value));
        }
    }
    sorted
}

/// Canonical JSON text of a value
pub fn canonical_json(value: &Value) -> String {
    to_ascii_json(&canonicalize(value))
}

/// Content hash of any JSON value
pub fn content_hash(value: &Value) -> String {
    compute_md5(canonical_json(value).as_bytes())
}

/// Content hash of a JSON object, without wrapping it in a `Value` first
pub fn record_hash(record: &Map<String, Value>) -> String {
    compute_md5(to_ascii_json(&Value::Object(canonical_object(record))).as_bytes())
}

fn to_ascii_json(value: &Value) -> String {
    let mut out = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut out, AsciiFormatter);
    // Writing a Value into memory cannot fail
    let _ = value.serialize(&mut serializer);
    String::from_utf8_lossy(&out).into_owned()
}

// ============================================================================
// Formatter
// ============================================================================

/// Spaced separators with ASCII-only output
struct AsciiFormatter;

impl Formatter for AsciiFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_f64<W>(&mut self, writer: &mut W, value: f64) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(float_repr(value).as_bytes())
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut units = [0_u16; 2];
        for c in fragment.chars() {
            if (' '..='~').contains(&c) {
                let mut buf = [0_u8; 4];
                writer.write_all(c.encode_utf8(&mut buf).as_bytes())?;
            } else {
                for unit in c.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

/// Shortest round-trip text of a float: fixed notation for exponents in
/// `-4..16`, otherwise `d.ddde+XX`
fn float_repr(value: f64) -> String {
    let scientific = format!("{:e}", value);
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return scientific;
    };
    let (sign, mantissa) = match mantissa.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", mantissa),
    };

    if !(-4..16).contains(&exponent) {
        let exponent_sign = if exponent < 0 { '-' } else { '+' };
        return format!("{}{}e{}{:02}", sign, mantissa, exponent_sign, exponent.abs());
    }

    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let body = if exponent >= 0 {
        let point = exponent as usize + 1;
        if digits.len() <= point {
            format!("{}{}.0", digits, "0".repeat(point - digits.len()))
        } else {
            format!("{}.{}", &digits[..point], &digits[point..])
        }
    } else {
        format!("0.{}{}", "0".repeat((-exponent - 1) as usize), digits)
    };
    format!("{}{}", sign, body)
}
