//! Canonical rendering of argument values into key fragments.
//!
//! Equal values must always render to equal strings, whatever incidental
//! formatting they arrived with.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Number, Value};

/// Largest integer an `f64` represents exactly.
const MAX_EXACT_FLOAT: f64 = 9_007_199_254_740_992.0;

/// Renders a value as a key fragment.
pub fn render(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => render_number(n),
        Value::String(s) => render_string(s),
        Value::Array(_) | Value::Object(_) => canonical(value).to_string(),
    }
}

fn render_number(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        Some(f) => render_float(f),
        None => n.to_string(),
    }
}

/// Integral floats collapse to their integer form; `-0.0` renders as `0`.
fn render_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() <= MAX_EXACT_FLOAT {
        return format!("{}", f as i64);
    }
    format!("{}", f)
}

/// RFC 3339 timestamps are normalised to UTC; other strings pass through.
fn render_string(s: &str) -> String {
    match DateTime::parse_from_rfc3339(s) {
        Ok(ts) => ts
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::AutoSi, true),
        Err(_) => s.to_string(),
    }
}

/// Structured values with numbers and timestamps normalised.
///
/// Object keys are sorted so field order never leaks into the key.
fn canonical(value: &Value) -> Value {
    match value {
        Value::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(_), _, _) | (_, Some(_), _) => value.clone(),
            (_, _, Some(f)) if f.is_finite() && f.fract() == 0.0 && f.abs() <= MAX_EXACT_FLOAT => {
                Value::from(f as i64)
            }
            _ => value.clone(),
        },
        Value::String(s) => Value::String(render_string(s)),
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        Value::Object(map) => {
            let mut fields: Vec<_> = map.iter().collect();
            fields.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                fields
                    .into_iter()
                    .map(|(k, v)| (k.clone(), canonical(v)))
                    .collect(),
            )
        }
        Value::Null | Value::Bool(_) => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};
    use serde_json::json;

    #[test]
    fn test_render_scalars() {
        assert_eq!(render(&json!(42)), "42");
        assert_eq!(render(&json!(-7)), "-7");
        assert_eq!(render(&json!(u64::MAX)), u64::MAX.to_string());
        assert_eq!(render(&json!("alice")), "alice");
        assert_eq!(render(&json!(true)), "true");
        assert_eq!(render(&Value::Null), "null");
    }

    #[test]
    fn test_integral_float_matches_integer() {
        assert_eq!(render(&json!(42.0)), render(&json!(42)));
        assert_eq!(render(&json!(-0.0)), "0");
        assert_eq!(render(&json!(1.5)), "1.5");
        assert_eq!(render(&json!(0.1)), "0.1");
    }

    #[test]
    fn test_timestamps_normalised_to_utc() {
        let offset = FixedOffset::east_opt(8 * 3600).unwrap();
        let local = offset.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let utc = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();

        let a = render(&serde_json::to_value(local).unwrap());
        let b = render(&serde_json::to_value(utc).unwrap());
        assert_eq!(a, b);
        assert_eq!(a, "2024-03-01T00:00:00Z");

        // Zero fractional seconds do not change the fragment
        assert_eq!(render(&json!("2024-03-01T00:00:00.000Z")), a);
    }

    #[test]
    fn test_plain_dates_pass_through() {
        assert_eq!(render(&json!("2024-03-01")), "2024-03-01");
    }

    #[test]
    fn test_structured_values_are_canonical() {
        let a = json!({"b": 2.0, "a": [1, "2024-03-01T08:00:00+08:00"]});
        let b = json!({"a": [1.0, "2024-03-01T00:00:00Z"], "b": 2});
        assert_eq!(render(&a), render(&b));
        assert_eq!(render(&a), r#"{"a":[1,"2024-03-01T00:00:00Z"],"b":2}"#);
    }
}
