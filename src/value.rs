//! Loosely-typed SQL values
//!
//! [`Value`] is used both for arguments bound to `$n` placeholders and for
//! the column values decoded out of result rows before they are reshaped
//! into caller types.

use chrono::{DateTime, NaiveDateTime, Utc};
use uuid::Uuid;
use serde_json::Number;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::Postgres;

/// A single SQL scalar, argument or decoded column
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    /// JSON / JSONB document
    Json(serde_json::Value),
    /// Native `TEXT[]`-like array
    TextArray(Vec<String>),
    /// `TIMESTAMPTZ`
    Timestamp(DateTime<Utc>),
    /// `TIMESTAMP` without time zone
    NaiveTimestamp(NaiveDateTime),
    Uuid(Uuid),
}

/// Text form of a timestamp without time zone, readable by `NaiveDateTime`'s serde impl
pub const NAIVE_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Convert into the generic document representation used for materialization
    ///
    /// Timestamps become RFC 3339 strings and byte strings become arrays of
    /// numbers; both deserialize back into `DateTime<Utc>` and `Vec<u8>`.
    /// Naive timestamps carry no offset so they deserialize into
    /// `NaiveDateTime`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Integer(i) => serde_json::Value::Number(Number::from(*i)),
            Value::Float(f) => Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(bytes) => serde_json::Value::Array(
                bytes
                    .iter()
                    .map(|b| serde_json::Value::Number(Number::from(*b)))
                    .collect(),
            ),
            Value::Json(doc) => doc.clone(),
            Value::TextArray(items) => serde_json::Value::Array(
                items
                    .iter()
                    .cloned()
                    .map(serde_json::Value::String)
                    .collect(),
            ),
            Value::Timestamp(ts) => serde_json::Value::String(ts.to_rfc3339()),
            Value::NaiveTimestamp(ts) => {
                serde_json::Value::String(ts.format(NAIVE_TIMESTAMP_FORMAT).to_string())
            }
            Value::Uuid(id) => serde_json::Value::String(id.to_string()),
        }
    }

    /// Best-effort coercion of raw column bytes when no type metadata is usable
    ///
    /// Tries a JSON document first, then a Postgres array literal
    /// (`{a,"b c"}`), then plain text. Bytes that are not UTF-8 are kept as
    /// they are. Because it guesses, `"42"` in a text column comes back as
    /// `Json(42)`; columns with known types never reach this path.
    pub fn coerce_raw(raw: &[u8]) -> Value {
        if let Ok(doc) = serde_json::from_slice::<serde_json::Value>(raw) {
            return Value::Json(doc);
        }

        match std::str::from_utf8(raw) {
            Ok(text) => match parse_text_array(text) {
                Some(items) => Value::TextArray(items),
                None => Value::Text(text.to_string()),
            },
            Err(_) => Value::Bytes(raw.to_vec()),
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Json(doc) => doc,
            Value::Text(s) => serde_json::Value::String(s),
            other => other.to_json(),
        }
    }
}

/// Parse a one-dimensional Postgres array literal of strings
///
/// Returns `None` for anything that is not such a literal, including arrays
/// with unquoted `NULL` elements or nested dimensions.
pub fn parse_text_array(text: &str) -> Option<Vec<String>> {
    let inner = text.strip_prefix('{')?.strip_suffix('}')?;
    let mut items = Vec::new();
    if inner.is_empty() {
        return Some(items);
    }

    let mut chars = inner.chars().peekable();
    loop {
        let mut item = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            loop {
                match chars.next()? {
                    '\\' => item.push(chars.next()?),
                    '"' => break,
                    c => item.push(c),
                }
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c == ',' {
                    break;
                }
                if matches!(c, '{' | '}' | '"' | '\\') {
                    return None;
                }
                item.push(c);
                chars.next();
            }
            let trimmed = item.trim();
            if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("NULL") {
                return None;
            }
            item = trimmed.to_string();
        }
        items.push(item);

        match chars.next() {
            None => return Some(items),
            Some(',') => continue,
            Some(_) => return None,
        }
    }
}

/// Bind a value to the next placeholder of a query
pub(crate) fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &Value,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Integer(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::Text(s) => query.bind(s.clone()),
        Value::Bytes(bytes) => query.bind(bytes.clone()),
        Value::Json(doc) => query.bind(sqlx::types::Json(doc.clone())),
        Value::TextArray(items) => query.bind(items.clone()),
        Value::Timestamp(ts) => query.bind(*ts),
        Value::NaiveTimestamp(ts) => query.bind(*ts),
        Value::Uuid(id) => query.bind(*id),
    }
}

/// Bind every value in order
pub(crate) fn bind_all<'q>(
    query: Query<'q, Postgres, PgArguments>,
    values: &[Value],
) -> Query<'q, Postgres, PgArguments> {
    values.iter().fold(query, bind_value)
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Integer(i64::from(v))
            }
        })*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Value::TextArray(v)
    }
}

impl From<Vec<&str>> for Value {
    fn from(v: Vec<&str>) -> Self {
        Value::TextArray(v.into_iter().map(str::to_string).collect())
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::NaiveTimestamp(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Uuid(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // =========================================================================
    // Conversion Tests
    // =========================================================================

    #[test]
    fn test_from_scalars() {
        assert_eq!(Value::from(18), Value::Integer(18));
        assert_eq!(Value::from(7u32), Value::Integer(7));
        assert_eq!(Value::from(1.5), Value::Float(1.5));
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from("a"), Value::Text("a".to_string()));
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::Text("x".to_string()));
        assert_eq!(
            Value::from(vec!["a", "b"]),
            Value::TextArray(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn test_to_json() {
        assert_eq!(Value::Null.to_json(), json!(null));
        assert_eq!(Value::Integer(3).to_json(), json!(3));
        assert_eq!(Value::Float(f64::NAN).to_json(), json!(null));
        assert_eq!(Value::Bytes(vec![1, 2]).to_json(), json!([1, 2]));
        assert_eq!(
            Value::TextArray(vec!["x".to_string()]).to_json(),
            json!(["x"])
        );
        assert_eq!(
            Value::Json(json!({"k": [1, 2]})).to_json(),
            json!({"k": [1, 2]})
        );
    }

    #[test]
    fn test_timestamp_to_json_round_trips_through_chrono() {
        let ts = DateTime::parse_from_rfc3339("2024-05-01T10:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let doc = Value::Timestamp(ts).to_json();
        let back: DateTime<Utc> = serde_json::from_value(doc).unwrap();
        assert_eq!(back, ts);
    }

    #[test]
    fn test_naive_timestamp_to_json_has_no_offset() {
        let ts = chrono::NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_micro_opt(12, 0, 0, 250)
            .unwrap();
        let doc = Value::from(ts).to_json();
        assert_eq!(doc, json!("2024-03-01T12:00:00.000250"));
        let back: NaiveDateTime = serde_json::from_value(doc).unwrap();
        assert_eq!(back, ts);
    }

    #[test]
    fn test_uuid_is_native() {
        let id = Uuid::parse_str("a1b2c3d4-0000-4000-8000-000000000000").unwrap();
        assert_eq!(Value::from(id), Value::Uuid(id));
        assert_eq!(
            Value::Uuid(id).to_json(),
            json!("a1b2c3d4-0000-4000-8000-000000000000")
        );
        let back: Uuid = serde_json::from_value(Value::Uuid(id).to_json()).unwrap();
        assert_eq!(back, id);
    }

    // =========================================================================
    // Raw Coercion Tests
    // =========================================================================

    #[test]
    fn test_coerce_raw_prefers_json() {
        assert_eq!(
            Value::coerce_raw(br#"{"a": 1}"#),
            Value::Json(json!({"a": 1}))
        );
        assert_eq!(Value::coerce_raw(b"[1,2]"), Value::Json(json!([1, 2])));
    }

    #[test]
    fn test_coerce_raw_then_array() {
        assert_eq!(
            Value::coerce_raw(br#"{red,"dark blue"}"#),
            Value::TextArray(vec!["red".to_string(), "dark blue".to_string()])
        );
    }

    #[test]
    fn test_coerce_raw_then_text() {
        assert_eq!(
            Value::coerce_raw(b"happy"),
            Value::Text("happy".to_string())
        );
    }

    #[test]
    fn test_coerce_raw_non_utf8() {
        assert_eq!(
            Value::coerce_raw(&[0xff, 0xfe]),
            Value::Bytes(vec![0xff, 0xfe])
        );
    }

    // =========================================================================
    // Array Literal Tests
    // =========================================================================

    #[test]
    fn test_parse_text_array() {
        assert_eq!(parse_text_array("{}"), Some(vec![]));
        assert_eq!(
            parse_text_array("{a,b,c}"),
            Some(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        );
        assert_eq!(
            parse_text_array(r#"{"with,comma","quote\"d","back\\slash"}"#),
            Some(vec![
                "with,comma".to_string(),
                "quote\"d".to_string(),
                "back\\slash".to_string()
            ])
        );
        assert_eq!(
            parse_text_array(r#"{"NULL"}"#),
            Some(vec!["NULL".to_string()])
        );
    }

    #[test]
    fn test_parse_text_array_rejects() {
        assert_eq!(parse_text_array("plain"), None);
        assert_eq!(parse_text_array("{a,NULL}"), None);
        assert_eq!(parse_text_array("{{a},{b}}"), None);
        assert_eq!(parse_text_array(r#"{"open}"#), None);
        assert_eq!(parse_text_array("{a,}"), None);
    }
}
