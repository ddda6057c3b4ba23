use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;

use crate::AbacusError;

/// A computed value.
///
/// Decimal comparisons are numeric, so `1.0` and `1.00` are equal. Values of
/// different variants are never equal.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Absent value, e.g. an unbound variable
    #[default]
    Null,
    Bool(bool),
    Decimal(BigDecimal),
    String(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<&BigDecimal> {
        match self {
            Value::Decimal(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Name of the variant, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Decimal(_) => "decimal",
            Value::String(_) => "string",
        }
    }

    /// Total ordering between two values of the same ordered variant.
    ///
    /// Returns `None` when the pair cannot be ordered (mixed variants or null).
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Decimal(a), Value::Decimal(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<BigDecimal> for Value {
    fn from(d: BigDecimal) -> Self {
        Value::Decimal(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

macro_rules! value_from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    Value::Decimal(BigDecimal::from(n))
                }
            }
        )*
    };
}

value_from_integer!(i8, i16, i32, i64, u8, u16, u32, u64);

impl TryFrom<f64> for Value {
    type Error = AbacusError;

    /// Converts through the float's shortest round-trip text, so `0.1` becomes
    /// exactly `0.1` rather than its binary expansion.
    fn try_from(n: f64) -> Result<Self, Self::Error> {
        if !n.is_finite() {
            return Err(AbacusError::InvalidInput {
                message: format!("{n} has no decimal representation"),
            });
        }
        BigDecimal::from_str(&n.to_string())
            .map(Value::Decimal)
            .map_err(|e| AbacusError::InvalidInput {
                message: format!("cannot convert {n} to decimal: {e}"),
            })
    }
}
