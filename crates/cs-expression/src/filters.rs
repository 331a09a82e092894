//! Filters available inside presence expressions

use minijinja::value::Value;
use minijinja::{Error, ErrorKind};
use std::convert::TryFrom;

fn value_to_f64(value: &Value) -> Option<f64> {
    f64::try_from(value.clone())
        .ok()
        .or_else(|| value.as_i64().map(|i| i as f64))
}

fn parse_number(value: &Value) -> Option<f64> {
    value_to_f64(value).or_else(|| value.as_str().and_then(|s| s.trim().parse::<f64>().ok()))
}

/// `value | float(default)`
pub fn to_float(value: Value, default: Option<Value>) -> Result<Value, Error> {
    if let Some(f) = parse_number(&value) {
        return Ok(Value::from(f));
    }
    match default {
        Some(d) => Ok(Value::from(value_to_f64(&d).unwrap_or(0.0))),
        None if value.is_undefined() || value.is_none() => Ok(Value::from(0.0)),
        None => Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("cannot convert {} to float", value),
        )),
    }
}

/// `value | int(default)`, truncating floats
pub fn to_int(value: Value, default: Option<Value>) -> Result<Value, Error> {
    if let Some(i) = value.as_i64() {
        return Ok(Value::from(i));
    }
    if let Some(f) = parse_number(&value) {
        return Ok(Value::from(f as i64));
    }
    match default {
        Some(d) => Ok(Value::from(
            d.as_i64()
                .or_else(|| value_to_f64(&d).map(|f| f as i64))
                .unwrap_or(0),
        )),
        None if value.is_undefined() || value.is_none() => Ok(Value::from(0)),
        None => Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("cannot convert {} to int", value),
        )),
    }
}

/// `value | bool`, using the presence truthiness rules
pub fn to_bool(value: Value) -> bool {
    crate::truthy::coerce_bool(&value)
}

/// `value is number`, also accepting numeric strings
pub fn is_number(value: Value) -> bool {
    parse_number(&value).is_some()
}

/// `value | round(precision)`
pub fn round_filter(value: f64, precision: Option<i32>) -> f64 {
    let factor = 10f64.powi(precision.unwrap_or(0));
    (value * factor).round() / factor
}

/// `value | abs`
pub fn abs_filter(value: f64) -> f64 {
    value.abs()
}

/// `value | contains(needle)` for strings and lists
pub fn contains(value: Value, search: Value) -> bool {
    if let (Some(haystack), Some(needle)) = (value.as_str(), search.as_str()) {
        return haystack.contains(needle);
    }

    match value.try_iter() {
        Ok(mut iter) => iter.any(|item| {
            if let (Some(a), Some(b)) = (item.as_str(), search.as_str()) {
                return a == b;
            }
            match (value_to_f64(&item), value_to_f64(&search)) {
                (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
                _ => false,
            }
        }),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_float() {
        assert_eq!(to_float(Value::from("21.5"), None).unwrap(), Value::from(21.5));
        assert_eq!(
            to_float(Value::from("unknown"), Some(Value::from(3.0))).unwrap(),
            Value::from(3.0)
        );
        assert!(to_float(Value::from("unknown"), None).is_err());
        assert_eq!(to_float(Value::UNDEFINED, None).unwrap(), Value::from(0.0));
    }

    #[test]
    fn test_to_int() {
        assert_eq!(to_int(Value::from("2.9"), None).unwrap(), Value::from(2));
        assert_eq!(to_int(Value::from(7), None).unwrap(), Value::from(7));
        assert_eq!(
            to_int(Value::from("x"), Some(Value::from(1))).unwrap(),
            Value::from(1)
        );
    }

    #[test]
    fn test_round_and_contains() {
        assert_eq!(round_filter(3.14159, Some(2)), 3.14);
        assert!(contains(Value::from("not_home"), Value::from("home")));
        assert!(contains(
            Value::from(vec![Value::from("a"), Value::from("b")]),
            Value::from("b")
        ));
        assert!(!contains(Value::from(5), Value::from("5")));
    }
}
