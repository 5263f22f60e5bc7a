use std::cmp::Ordering;

use crate::error::{Error, ErrorKind};
use crate::value::{Value, ValueRepr};

pub enum CoerceResult {
    I64(i64, i64),
    F64(f64, f64),
}

/// Converts a value into a number the way the arithmetic filters do.
///
/// Numbers pass through, strings are parsed after trimming (`"1.5"` becomes a
/// float, otherwise the leading integer is taken) and everything else is `0`.
pub fn to_number(value: &Value) -> Value {
    match value.0 {
        ValueRepr::I64(_) | ValueRepr::F64(_) => value.clone(),
        ValueRepr::String(ref s) => parse_number(s).unwrap_or(Value::from(0)),
        ValueRepr::Lazy(ref lazy) => to_number(&lazy.resolve()),
        _ => Value::from(0),
    }
}

fn is_float_literal(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    match digits.split_once('.') {
        Some((int, frac)) => {
            !int.is_empty()
                && !frac.is_empty()
                && int.bytes().all(|b| b.is_ascii_digit())
                && frac.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

fn parse_number(s: &str) -> Option<Value> {
    let s = s.trim();
    if is_float_literal(s) {
        return s.parse::<f64>().ok().map(Value::from);
    }
    let end = s
        .char_indices()
        .find(|&(idx, c)| !(c.is_ascii_digit() || (idx == 0 && (c == '-' || c == '+'))))
        .map_or(s.len(), |(idx, _)| idx);
    s[..end].parse::<i64>().ok().map(Value::from)
}

/// Like [`parse_number`] but only accepts strings that are entirely numeric.
fn strict_number(value: &Value) -> Option<Value> {
    match value.0 {
        ValueRepr::I64(_) | ValueRepr::F64(_) => Some(value.clone()),
        ValueRepr::String(ref s) => {
            let s = s.trim();
            if is_float_literal(s) {
                s.parse::<f64>().ok().map(Value::from)
            } else {
                s.parse::<i64>().ok().map(Value::from)
            }
        }
        _ => None,
    }
}

fn coerce(a: &Value, b: &Value) -> CoerceResult {
    match (to_number(a).0, to_number(b).0) {
        (ValueRepr::I64(a), ValueRepr::I64(b)) => CoerceResult::I64(a, b),
        (ValueRepr::I64(a), ValueRepr::F64(b)) => CoerceResult::F64(a as f64, b),
        (ValueRepr::F64(a), ValueRepr::I64(b)) => CoerceResult::F64(a, b as f64),
        (ValueRepr::F64(a), ValueRepr::F64(b)) => CoerceResult::F64(a, b),
        _ => CoerceResult::I64(0, 0),
    }
}

fn zero_division() -> Error {
    Error::new(ErrorKind::ZeroDivision, "divided by 0")
}

macro_rules! math_binop {
    ($name:ident, $int:ident, $float:tt) => {
        pub fn $name(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
            match coerce(lhs, rhs) {
                CoerceResult::I64(a, b) => Ok(match a.$int(b) {
                    Some(val) => Value::from(val),
                    None => Value::from(a as f64 $float b as f64),
                }),
                CoerceResult::F64(a, b) => Ok(Value::from(a $float b)),
            }
        }
    };
}

math_binop!(add, checked_add, +);
math_binop!(sub, checked_sub, -);
math_binop!(mul, checked_mul, *);

/// Integer division floors, float division is exact.
pub fn div(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
    match coerce(lhs, rhs) {
        CoerceResult::I64(_, 0) => Err(zero_division()),
        CoerceResult::I64(a, b) => match a.checked_div(b) {
            Some(q) => Ok(Value::from(if a % b != 0 && ((a < 0) != (b < 0)) {
                q - 1
            } else {
                q
            })),
            None => Ok(Value::from((a as f64 / b as f64).floor())),
        },
        CoerceResult::F64(_, b) if b == 0.0 => Err(zero_division()),
        CoerceResult::F64(a, b) => Ok(Value::from(a / b)),
    }
}

/// Modulo where the result takes the sign of the divisor.
pub fn rem(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
    match coerce(lhs, rhs) {
        CoerceResult::I64(_, 0) => Err(zero_division()),
        CoerceResult::I64(a, b) => {
            let r = a.checked_rem(b).unwrap_or(0);
            Ok(Value::from(if r != 0 && ((r < 0) != (b < 0)) {
                r + b
            } else {
                r
            }))
        }
        CoerceResult::F64(_, b) if b == 0.0 => Err(zero_division()),
        CoerceResult::F64(a, b) => {
            let r = a % b;
            Ok(Value::from(if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
                r + b
            } else {
                r
            }))
        }
    }
}

/// Value equality without type coercion.  Integers and floats compare
/// numerically.
pub fn equals(lhs: &Value, rhs: &Value) -> bool {
    match (&lhs.0, &rhs.0) {
        (ValueRepr::Lazy(a), _) => equals(&a.resolve(), rhs),
        (_, ValueRepr::Lazy(b)) => equals(lhs, &b.resolve()),
        (
            ValueRepr::Undefined | ValueRepr::None,
            ValueRepr::Undefined | ValueRepr::None,
        ) => true,
        (ValueRepr::Bool(a), ValueRepr::Bool(b)) => a == b,
        (ValueRepr::I64(a), ValueRepr::I64(b)) => a == b,
        (ValueRepr::F64(a), ValueRepr::F64(b)) => a == b,
        (ValueRepr::I64(a), ValueRepr::F64(b)) | (ValueRepr::F64(b), ValueRepr::I64(a)) => {
            *a as f64 == *b
        }
        (ValueRepr::String(a), ValueRepr::String(b)) => a == b,
        (ValueRepr::Seq(a), ValueRepr::Seq(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(a, b)| equals(a, b))
        }
        (ValueRepr::Map(a, _), ValueRepr::Map(b, _)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(key, value)| b.get(key).map_or(false, |other| equals(value, other)))
        }
        (ValueRepr::Range(a1, a2), ValueRepr::Range(b1, b2)) => a1 == b1 && a2 == b2,
        (ValueRepr::Object(a), ValueRepr::Object(b)) => {
            std::ptr::eq(
                a.as_ref() as *const _ as *const (),
                b.as_ref() as *const _ as *const (),
            )
        }
        _ => false,
    }
}

/// Returns the name of the value's type for error messages.
fn type_name(value: &Value) -> &'static str {
    match value.0 {
        ValueRepr::Undefined | ValueRepr::None => "NilClass",
        ValueRepr::Bool(true) => "TrueClass",
        ValueRepr::Bool(false) => "FalseClass",
        ValueRepr::I64(_) => "Integer",
        ValueRepr::F64(_) => "Float",
        ValueRepr::String(_) => "String",
        ValueRepr::Seq(_) => "Array",
        ValueRepr::Map(..) => "Hash",
        ValueRepr::Range(..) => "Range",
        ValueRepr::Object(_) => "Drop",
        ValueRepr::Lazy(_) => "Proc",
    }
}

fn incomparable(lhs: &Value, rhs: &Value) -> Error {
    Error::new(
        ErrorKind::ArgumentError,
        format!(
            "comparison of {} with {} failed",
            type_name(lhs),
            type_name(rhs)
        ),
    )
}

/// Orders two values for `<`, `<=`, `>` and `>=`.
///
/// `Ok(None)` means the comparison is false without being an error which is
/// the case when either side is `nil`.  Numbers compare with numeric strings
/// after parsing; other mismatches are an argument error.
pub fn compare(lhs: &Value, rhs: &Value) -> Result<Option<Ordering>, Error> {
    match (&lhs.0, &rhs.0) {
        (ValueRepr::Lazy(a), _) => compare(&a.resolve(), rhs),
        (_, ValueRepr::Lazy(b)) => compare(lhs, &b.resolve()),
        (ValueRepr::Undefined | ValueRepr::None, _)
        | (_, ValueRepr::Undefined | ValueRepr::None) => Ok(None),
        (ValueRepr::String(a), ValueRepr::String(b)) => Ok(Some(a.cmp(b))),
        (ValueRepr::I64(a), ValueRepr::I64(b)) => Ok(Some(a.cmp(b))),
        (ValueRepr::I64(_) | ValueRepr::F64(_), ValueRepr::I64(_) | ValueRepr::F64(_)) => {
            Ok(as_f64(lhs).partial_cmp(&as_f64(rhs)))
        }
        (ValueRepr::I64(_) | ValueRepr::F64(_), ValueRepr::String(_)) => match strict_number(rhs) {
            Some(rhs) => compare(lhs, &rhs),
            None => Err(incomparable(lhs, rhs)),
        },
        (ValueRepr::String(_), ValueRepr::I64(_) | ValueRepr::F64(_)) => match strict_number(lhs) {
            Some(lhs) => compare(&lhs, rhs),
            None => Err(incomparable(lhs, rhs)),
        },
        _ => Err(incomparable(lhs, rhs)),
    }
}

fn as_f64(value: &Value) -> f64 {
    match value.0 {
        ValueRepr::I64(x) => x as f64,
        ValueRepr::F64(x) => x,
        _ => 0.0,
    }
}

/// Implements the `contains` operator.
///
/// Strings check for a substring, arrays for a member and hashes for a key.
/// Everything else never contains anything.
pub fn contains(container: &Value, value: &Value) -> bool {
    match container.0 {
        ValueRepr::String(ref s) => {
            if value.is_nil() {
                false
            } else {
                s.contains(&value.to_string() as &str)
            }
        }
        ValueRepr::Seq(ref items) => items.iter().any(|item| equals(item, value)),
        ValueRepr::Map(ref map, _) => match value.as_str() {
            Some(key) => map.contains_key(key),
            None => map.contains_key(&value.to_string() as &str),
        },
        ValueRepr::Range(start, end) => match value.0 {
            ValueRepr::I64(v) => v >= start && v <= end,
            _ => false,
        },
        ValueRepr::Object(ref obj) => obj
            .iterate()
            .map_or(false, |items| items.iter().any(|item| equals(item, value))),
        ValueRepr::Lazy(ref lazy) => contains(&lazy.resolve(), value),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_to_number() {
        assert_eq!(to_number(&Value::from("12")), Value::from(12));
        assert_eq!(to_number(&Value::from(" 1.5 ")), Value::from(1.5));
        assert_eq!(to_number(&Value::from("12abc")), Value::from(12));
        assert_eq!(to_number(&Value::from("abc")), Value::from(0));
        assert_eq!(to_number(&Value::NIL), Value::from(0));
    }

    #[test]
    fn test_division() {
        assert_eq!(div(&Value::from(7), &Value::from(2)).unwrap(), Value::from(3));
        assert_eq!(div(&Value::from(-7), &Value::from(2)).unwrap(), Value::from(-4));
        assert_eq!(div(&Value::from(7), &Value::from(2.0)).unwrap(), Value::from(3.5));
        let err = div(&Value::from(5), &Value::from(0)).unwrap_err();
        assert_eq!(err.to_string(), "Liquid error: divided by 0");
        assert_eq!(
            div(&Value::from(5.0), &Value::from(0)).unwrap_err().kind(),
            ErrorKind::ZeroDivision
        );
    }

    #[test]
    fn test_modulo_sign() {
        assert_eq!(rem(&Value::from(-7), &Value::from(3)).unwrap(), Value::from(2));
        assert_eq!(rem(&Value::from(7), &Value::from(-3)).unwrap(), Value::from(-2));
        assert!(rem(&Value::from(7), &Value::from(0)).is_err());
    }

    #[test]
    fn test_arithmetic_coercion() {
        assert_eq!(add(&Value::from("3"), &Value::from(4)).unwrap(), Value::from(7));
        assert_eq!(mul(&Value::from(1.5), &Value::from(2)).unwrap(), Value::from(3.0));
        assert_eq!(
            add(&Value::from(i64::MAX), &Value::from(1)).unwrap().kind(),
            crate::value::ValueKind::Number
        );
    }

    #[test]
    fn test_equality_without_coercion() {
        assert!(equals(&Value::from(1), &Value::from(1.0)));
        assert!(!equals(&Value::from(1), &Value::from("1")));
        assert!(equals(&Value::NIL, &Value::UNDEFINED));
    }

    #[test]
    fn test_compare() {
        assert_eq!(
            compare(&Value::from(1), &Value::from(2)).unwrap(),
            Some(Ordering::Less)
        );
        assert_eq!(
            compare(&Value::from(10), &Value::from("9")).unwrap(),
            Some(Ordering::Greater)
        );
        assert_eq!(compare(&Value::NIL, &Value::from(2)).unwrap(), None);
        let err = compare(&Value::from(1), &Value::from("abc")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Liquid error: comparison of Integer with String failed"
        );
    }

    #[test]
    fn test_contains() {
        assert!(contains(&Value::from("hello"), &Value::from("ell")));
        assert!(contains(&Value::from(vec![1, 2]), &Value::from(2)));
        assert!(!contains(&Value::from(vec![1, 2]), &Value::from("2")));
        assert!(contains(&Value::from_range(1, 5), &Value::from(3)));
        assert!(!contains(&Value::NIL, &Value::from(3)));
    }
}
