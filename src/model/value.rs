//! Value helpers: document-store ordering and scalar coercion.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, Utc};

use crate::{Error, Result};

/// Documents, parameters and query results are plain JSON values.
pub use serde_json::Value;

/// Name of the date-like scalar stored as epoch milliseconds.
pub const DATE_TIME_SCALAR: &str = "DateTime";

/// Current time as epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

// ============================================================================
// Coercion
// ============================================================================

/// Convert an input value to its stored representation for a scalar type.
///
/// `DateTime` values (single or list) become epoch-millisecond numbers; every
/// other scalar passes through unchanged.
pub fn format_fix_value(scalar: &str, value: &Value) -> Result<Value> {
    if scalar != DATE_TIME_SCALAR {
        return Ok(value.clone());
    }
    match value {
        Value::Array(items) => items
            .iter()
            .map(date_to_millis)
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        other => date_to_millis(other),
    }
}

fn date_to_millis(value: &Value) -> Result<Value> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Number(_) => Ok(value.clone()),
        Value::String(s) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Ok(Value::from(dt.timestamp_millis()));
            }
            if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                let millis = d
                    .and_hms_opt(0, 0, 0)
                    .map(|dt| dt.and_utc().timestamp_millis())
                    .ok_or_else(|| Error::Input(format!("invalid DateTime '{s}'")))?;
                return Ok(Value::from(millis));
            }
            Err(Error::Input(format!("invalid DateTime '{s}'")))
        }
        other => Err(Error::Input(format!("invalid DateTime {other}"))),
    }
}

// ============================================================================
// Comparison (document-store ordering rules)
// ============================================================================

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over values: null < bool < number < string < array < object.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                match compare_values(l, r) {
                    Ordering::Equal => continue,
                    other => return other,
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => {
            let mut xk: Vec<&String> = x.keys().collect();
            let mut yk: Vec<&String> = y.keys().collect();
            xk.sort();
            yk.sort();
            match xk.cmp(&yk) {
                Ordering::Equal => {}
                other => return other,
            }
            for k in xk {
                match compare_values(&x[k.as_str()], &y[k.as_str()]) {
                    Ordering::Equal => continue,
                    other => return other,
                }
            }
            Ordering::Equal
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_date_time_single() {
        let v = format_fix_value("DateTime", &json!("1970-01-01T00:00:01Z")).unwrap();
        assert_eq!(v, json!(1000));
    }

    #[test]
    fn test_date_time_list() {
        let v = format_fix_value("DateTime", &json!(["1970-01-02", "1970-01-01T00:00:00.5Z"])).unwrap();
        assert_eq!(v, json!([86_400_000, 500]));
    }

    #[test]
    fn test_other_scalars_pass_through() {
        assert_eq!(format_fix_value("String", &json!("x")).unwrap(), json!("x"));
        assert_eq!(format_fix_value("Int", &json!([1, 2])).unwrap(), json!([1, 2]));
    }

    #[test]
    fn test_invalid_date() {
        assert!(format_fix_value("DateTime", &json!("yesterday")).is_err());
    }

    #[test]
    fn test_mixed_type_ordering() {
        assert_eq!(compare_values(&json!(null), &json!(false)), Ordering::Less);
        assert_eq!(compare_values(&json!(1), &json!("1")), Ordering::Less);
        assert_eq!(compare_values(&json!(2), &json!(1.5)), Ordering::Greater);
        assert_eq!(compare_values(&json!([1, 2]), &json!([1, 2, 0])), Ordering::Less);
    }
}
