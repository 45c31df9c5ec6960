// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Structured document semantics
//!
//! Equality, ordering and containment over `serde_json::Value` that agree with
//! the database's binary JSON type, so predicates evaluated in-process return
//! the same rows the server would.
//!
//! - numbers compare by value (`1` equals `1.0`)
//! - values of different kinds order as `null < string < number < bool < array < object`
//! - arrays and objects order by length first, then element by element
//! - a top-level array contains a scalar when one of its elements equals it;
//!   nested values must match structurally

use serde_json::{Map, Number, Value};
use std::cmp::Ordering;

/// Name of the value's type as the database's `jsonb_typeof` reports it.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

fn kind_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::String(_) => 1,
        Value::Number(_) => 2,
        Value::Bool(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn number_cmp(a: &Number, b: &Number) -> Ordering {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x.cmp(&y);
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return x.cmp(&y);
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    }
}

/// Keys in the order the database stores them: shorter first, then bytewise.
fn storage_order(map: &Map<String, Value>) -> Vec<(&String, &Value)> {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by(|(a, _), (b, _)| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
    entries
}

/// Total order over documents.
pub fn compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::String(x), Value::String(y)) => x.as_bytes().cmp(y.as_bytes()),
        (Value::Number(x), Value::Number(y)) => number_cmp(x, y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x.len().cmp(&y.len()).then_with(|| {
            x.iter()
                .zip(y.iter())
                .map(|(l, r)| compare(l, r))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        }),
        (Value::Object(x), Value::Object(y)) => x.len().cmp(&y.len()).then_with(|| {
            storage_order(x)
                .into_iter()
                .zip(storage_order(y))
                .map(|((lk, lv), (rk, rv))| {
                    lk.len()
                        .cmp(&rk.len())
                        .then_with(|| lk.cmp(rk))
                        .then_with(|| compare(lv, rv))
                })
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        }),
        _ => kind_rank(a).cmp(&kind_rank(b)),
    }
}

/// Structural equality: arrays are order exact, objects key exact.
pub fn equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => number_cmp(x, y) == Ordering::Equal,
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(l, r)| equals(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).map_or(false, |other| equals(v, other)))
        }
        _ => a == b,
    }
}

/// Containment (`container @> contained`).
pub fn contains(container: &Value, contained: &Value) -> bool {
    match (container, contained) {
        (Value::Array(items), scalar) if is_scalar(scalar) => {
            items.iter().any(|item| equals(item, scalar))
        }
        _ => deep_contains(container, contained),
    }
}

fn deep_contains(container: &Value, contained: &Value) -> bool {
    match (container, contained) {
        (Value::Object(outer), Value::Object(inner)) => inner.iter().all(|(key, want)| {
            outer.get(key).map_or(false, |have| value_contains(have, want))
        }),
        (Value::Array(outer), Value::Array(inner)) => inner.iter().all(|want| {
            outer.iter().any(|have| {
                if is_scalar(want) {
                    equals(have, want)
                } else {
                    value_contains(have, want)
                }
            })
        }),
        (a, b) if is_scalar(a) && is_scalar(b) => equals(a, b),
        _ => false,
    }
}

/// Containment between values nested inside a document: kinds must match.
pub fn value_contains(have: &Value, want: &Value) -> bool {
    match (have, want) {
        (Value::Object(_), Value::Object(_)) | (Value::Array(_), Value::Array(_)) => {
            deep_contains(have, want)
        }
        (a, b) if is_scalar(a) && is_scalar(b) => equals(a, b),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_equality_ignores_representation() {
        assert!(equals(&json!(1), &json!(1.0)));
        assert!(!equals(&json!(1), &json!("1")));
    }

    #[test]
    fn test_array_equality_is_order_exact() {
        assert!(equals(&json!([1, 2]), &json!([1, 2])));
        assert!(!equals(&json!([1, 2]), &json!([2, 1])));
        assert!(!equals(&json!([1, 2]), &json!([1])));
    }

    #[test]
    fn test_cross_kind_ordering() {
        assert_eq!(compare(&json!(null), &json!("a")), Ordering::Less);
        assert_eq!(compare(&json!("z"), &json!(1)), Ordering::Less);
        assert_eq!(compare(&json!(100), &json!(false)), Ordering::Less);
        assert_eq!(compare(&json!(true), &json!([])), Ordering::Less);
        assert_eq!(compare(&json!([1, 2, 3]), &json!({})), Ordering::Less);
    }

    #[test]
    fn test_same_kind_ordering() {
        assert_eq!(compare(&json!(1990), &json!(1995)), Ordering::Less);
        assert_eq!(compare(&json!(2.5), &json!(2)), Ordering::Greater);
        assert_eq!(compare(&json!("abc"), &json!("abd")), Ordering::Less);
        assert_eq!(compare(&json!([9]), &json!([1, 1])), Ordering::Less);
    }

    #[test]
    fn test_top_level_array_contains_scalar() {
        assert!(contains(&json!([1, 2, 3]), &json!(2)));
        assert!(!contains(&json!([1, 2, 3]), &json!(4)));
        assert!(!contains(&json!("abc"), &json!("b")));
    }

    #[test]
    fn test_nested_containment_is_structural() {
        assert!(contains(&json!({"a": 1, "b": 2}), &json!({"a": 1})));
        assert!(!contains(&json!({"a": [1, 2]}), &json!({"a": 1})));
        assert!(contains(&json!({"a": [1, 2]}), &json!({"a": [2]})));
        assert!(!contains(&json!({"c": {"d": "hi"}}), &json!({"c": "hi"})));
    }
}
