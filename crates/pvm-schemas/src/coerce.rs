//! Coercions for noisy, free-form wire values.
//!
//! Foreign groups send numeric fields as numbers, quoted numbers, or prose
//! ("2 baños"). The contract is: extract the first embedded unsigned integer,
//! otherwise treat the field as absent.

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Extract an integer from a JSON value of any shape.
///
/// Numbers are truncated; strings yield their first embedded run of digits.
pub fn coerce_int(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => first_integer(s),
        _ => None,
    }
}

/// First run of ASCII digits in `s`, if any.
pub fn first_integer(s: &str) -> Option<i64> {
    let mut digits = String::new();
    for c in s.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
        } else if !digits.is_empty() {
            break;
        }
    }
    if digits.is_empty() {
        None
    } else {
        digits.parse().ok()
    }
}

/// Identifiers arrive as strings or bare numbers; render both as strings so
/// group-id comparison is consistent across groups.
pub fn coerce_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn coerce_bool(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1"),
        _ => false,
    }
}

/// Parse an ISO-8601 timestamp; anything unparseable is treated as absent
/// (the store falls back to `now()`).
pub fn coerce_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_integer_extracts_leading_run() {
        assert_eq!(first_integer("3 dormitorios"), Some(3));
        assert_eq!(first_integer("aprox 120 m2"), Some(120));
        assert_eq!(first_integer("12-14"), Some(12));
        assert_eq!(first_integer("studio"), None);
        assert_eq!(first_integer(""), None);
    }

    #[test]
    fn coerce_int_handles_numbers_and_strings() {
        assert_eq!(coerce_int(&json!(4)), Some(4));
        assert_eq!(coerce_int(&json!(4.9)), Some(4));
        assert_eq!(coerce_int(&json!("4 baños")), Some(4));
        assert_eq!(coerce_int(&json!(null)), None);
        assert_eq!(coerce_int(&json!({"n": 1})), None);
    }

    #[test]
    fn coerce_string_renders_numbers() {
        assert_eq!(coerce_string(&json!("g6")), Some("g6".to_string()));
        assert_eq!(coerce_string(&json!(14)), Some("14".to_string()));
        assert_eq!(coerce_string(&json!(null)), None);
    }

    #[test]
    fn coerce_timestamp_accepts_z_suffix() {
        let t = coerce_timestamp("2026-03-01T12:00:00Z").unwrap();
        assert_eq!(t.timezone(), Utc);
        assert!(coerce_timestamp("yesterday-ish").is_none());
    }
}
