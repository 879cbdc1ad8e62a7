//! Runtime values shared by the tree-walking interpreter and the bytecode
//! machine. Both backends must print the same text for the same value, so
//! all formatting lives here.

use std::fmt;

use thiserror::Error;

/// A value operation that cannot proceed. Both backends surface these as
/// runtime errors, so the messages are shared too.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueOpError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("operator '{op}' cannot be applied to '{lhs}' and '{rhs}'")]
    Unsupported {
        op: &'static str,
        lhs: &'static str,
        rhs: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    Decimal(f64),
    String(String),
    Boolean(bool),
    Null,
    Undefined,
}

impl Value {
    /// Truthiness for conditions. Zero, the empty string, false, null and
    /// undefined are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Integer(n) => *n != 0,
            Value::Decimal(d) => *d != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Boolean(b) => *b,
            Value::Null | Value::Undefined => false,
        }
    }

    /// Text printed by `println` and used when a value meets a string
    /// under `+`.
    pub fn to_output(&self) -> String {
        match self {
            Value::Integer(n) => n.to_string(),
            Value::Decimal(d) => d.to_string(),
            Value::String(s) => s.clone(),
            Value::Boolean(b) => b.to_string(),
            Value::Null => "null".to_string(),
            Value::Undefined => "undefined".to_string(),
        }
    }

    pub fn as_decimal(&self) -> Option<f64> {
        match self {
            Value::Integer(n) => Some(*n as f64),
            Value::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Decimal(_) => "decimal",
            Value::String(_) => "string",
            Value::Boolean(_) => "boolean",
            Value::Null => "null",
            Value::Undefined => "undefined",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_output())
    }
}

/// Numeric and logical primitives shared by the interpreter and the virtual
/// machine. Two integers stay in integer arithmetic (division truncates);
/// any decimal operand widens the whole operation to decimal.
pub mod ops {
    use super::{Value, ValueOpError};

    type OpResult = Result<Value, ValueOpError>;

    fn unsupported(op: &'static str, lhs: &Value, rhs: &Value) -> ValueOpError {
        ValueOpError::Unsupported {
            op,
            lhs: lhs.type_name(),
            rhs: rhs.type_name(),
        }
    }

    pub fn add(lhs: &Value, rhs: &Value) -> OpResult {
        match (lhs, rhs) {
            (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a.wrapping_add(*b))),
            _ => match (lhs.as_decimal(), rhs.as_decimal()) {
                (Some(a), Some(b)) => Ok(Value::Decimal(a + b)),
                _ => Err(unsupported("+", lhs, rhs)),
            },
        }
    }

    pub fn sub(lhs: &Value, rhs: &Value) -> OpResult {
        match (lhs, rhs) {
            (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a.wrapping_sub(*b))),
            _ => match (lhs.as_decimal(), rhs.as_decimal()) {
                (Some(a), Some(b)) => Ok(Value::Decimal(a - b)),
                _ => Err(unsupported("-", lhs, rhs)),
            },
        }
    }

    pub fn mul(lhs: &Value, rhs: &Value) -> OpResult {
        match (lhs, rhs) {
            (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a.wrapping_mul(*b))),
            _ => match (lhs.as_decimal(), rhs.as_decimal()) {
                (Some(a), Some(b)) => Ok(Value::Decimal(a * b)),
                _ => Err(unsupported("*", lhs, rhs)),
            },
        }
    }

    pub fn div(lhs: &Value, rhs: &Value) -> OpResult {
        match (lhs, rhs) {
            (Value::Integer(a), Value::Integer(b)) => {
                if *b == 0 {
                    Err(ValueOpError::DivisionByZero)
                } else {
                    Ok(Value::Integer(a.wrapping_div(*b)))
                }
            }
            _ => match (lhs.as_decimal(), rhs.as_decimal()) {
                (Some(a), Some(b)) => Ok(Value::Decimal(a / b)),
                _ => Err(unsupported("/", lhs, rhs)),
            },
        }
    }

    pub fn rem(lhs: &Value, rhs: &Value) -> OpResult {
        match (lhs, rhs) {
            (Value::Integer(a), Value::Integer(b)) => {
                if *b == 0 {
                    Err(ValueOpError::DivisionByZero)
                } else {
                    Ok(Value::Integer(a.wrapping_rem(*b)))
                }
            }
            _ => match (lhs.as_decimal(), rhs.as_decimal()) {
                (Some(a), Some(b)) => Ok(Value::Decimal(a % b)),
                _ => Err(unsupported("%", lhs, rhs)),
            },
        }
    }

    pub fn neg(value: &Value) -> OpResult {
        match value {
            Value::Integer(n) => Ok(Value::Integer(n.wrapping_neg())),
            Value::Decimal(d) => Ok(Value::Decimal(-d)),
            _ => Err(unsupported("-", value, value)),
        }
    }

    pub fn shl(lhs: &Value, rhs: &Value) -> OpResult {
        match (lhs, rhs) {
            (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a.wrapping_shl(*b as u32))),
            _ => Err(unsupported("<<", lhs, rhs)),
        }
    }

    pub fn shr(lhs: &Value, rhs: &Value) -> OpResult {
        match (lhs, rhs) {
            (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a.wrapping_shr(*b as u32))),
            _ => Err(unsupported(">>", lhs, rhs)),
        }
    }

    /// Bitwise on two integers, logical conjunction otherwise. Both sides
    /// are always evaluated before this runs; there is no short-circuit.
    pub fn and(lhs: &Value, rhs: &Value) -> Value {
        match (lhs, rhs) {
            (Value::Integer(a), Value::Integer(b)) => Value::Integer(a & b),
            _ => Value::Boolean(lhs.is_truthy() && rhs.is_truthy()),
        }
    }

    pub fn or(lhs: &Value, rhs: &Value) -> Value {
        match (lhs, rhs) {
            (Value::Integer(a), Value::Integer(b)) => Value::Integer(a | b),
            _ => Value::Boolean(lhs.is_truthy() || rhs.is_truthy()),
        }
    }

    pub fn xor(lhs: &Value, rhs: &Value) -> OpResult {
        match (lhs, rhs) {
            (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a ^ b)),
            _ => Err(unsupported("^", lhs, rhs)),
        }
    }

    pub fn not(value: &Value) -> Value {
        Value::Boolean(!value.is_truthy())
    }

    /// Equality is numeric-aware: `1 == 1.0`. Values of unrelated types
    /// compare unequal rather than erroring.
    pub fn eq(lhs: &Value, rhs: &Value) -> bool {
        match (lhs.as_decimal(), rhs.as_decimal()) {
            (Some(a), Some(b)) => a == b,
            _ => lhs == rhs,
        }
    }

    pub fn ordering(
        op: &'static str,
        lhs: &Value,
        rhs: &Value,
    ) -> Result<std::cmp::Ordering, ValueOpError> {
        match (lhs.as_decimal(), rhs.as_decimal()) {
            (Some(a), Some(b)) => a
                .partial_cmp(&b)
                .ok_or(ValueOpError::Unsupported {
                    op,
                    lhs: lhs.type_name(),
                    rhs: rhs.type_name(),
                }),
            _ => match (lhs, rhs) {
                (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
                _ => Err(unsupported(op, lhs, rhs)),
            },
        }
    }

    /// String concatenation: either operand is stringified with the same
    /// formatting `println` uses.
    pub fn concat(lhs: &Value, rhs: &Value) -> Value {
        Value::String(format!("{}{}", lhs.to_output(), rhs.to_output()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_text() {
        assert_eq!(Value::Integer(42).to_output(), "42");
        assert_eq!(Value::Decimal(2.5).to_output(), "2.5");
        assert_eq!(Value::Decimal(3.0).to_output(), "3");
        assert_eq!(Value::String("hi".into()).to_output(), "hi");
        assert_eq!(Value::Boolean(true).to_output(), "true");
        assert_eq!(Value::Null.to_output(), "null");
        assert_eq!(Value::Undefined.to_output(), "undefined");
    }

    #[test]
    fn integer_division_truncates() {
        assert_eq!(
            ops::div(&Value::Integer(7), &Value::Integer(2)),
            Ok(Value::Integer(3))
        );
        assert_eq!(
            ops::div(&Value::Integer(-7), &Value::Integer(2)),
            Ok(Value::Integer(-3))
        );
        assert_eq!(
            ops::div(&Value::Integer(1), &Value::Integer(0)),
            Err(ValueOpError::DivisionByZero)
        );
    }

    #[test]
    fn mixed_arithmetic_widens_to_decimal() {
        assert_eq!(
            ops::add(&Value::Integer(1), &Value::Decimal(0.5)),
            Ok(Value::Decimal(1.5))
        );
        assert_eq!(
            ops::div(&Value::Decimal(1.0), &Value::Integer(4)),
            Ok(Value::Decimal(0.25))
        );
    }

    #[test]
    fn equality_is_numeric_aware() {
        assert!(ops::eq(&Value::Integer(1), &Value::Decimal(1.0)));
        assert!(!ops::eq(&Value::Integer(1), &Value::String("1".into())));
        assert!(ops::eq(&Value::Null, &Value::Null));
    }

    #[test]
    fn and_or_are_bitwise_on_integers_and_logical_otherwise() {
        assert_eq!(ops::and(&Value::Integer(6), &Value::Integer(3)), Value::Integer(2));
        assert_eq!(ops::or(&Value::Integer(6), &Value::Integer(3)), Value::Integer(7));
        assert_eq!(
            ops::and(&Value::Boolean(true), &Value::Integer(0)),
            Value::Boolean(false)
        );
        assert_eq!(
            ops::or(&Value::Boolean(false), &Value::String("x".into())),
            Value::Boolean(true)
        );
    }

    #[test]
    fn truthiness() {
        assert!(Value::Integer(1).is_truthy());
        assert!(!Value::Integer(0).is_truthy());
        assert!(!Value::Decimal(0.0).is_truthy());
        assert!(!Value::String(String::new()).is_truthy());
        assert!(Value::String(" ".into()).is_truthy());
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Undefined.is_truthy());
    }
}
