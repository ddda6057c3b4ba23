//! Named methods callable from expressions as `name(arg, ...)`.
//!
//! A [`MethodRegistry`] is a plain value: build one with
//! [`MethodRegistry::builtin`] or [`MethodRegistry::empty`], add host methods
//! with [`MethodRegistry::with_method`], and pass it to
//! [`crate::evaluate_with`]. Registries are never mutated during evaluation and
//! can be shared between threads.
//!
//! ## Built-in methods
//!
//! - `min(a, b, ...)` / `max(a, b, ...)`: decimal extremum. Arguments are
//!   coerced to decimals; null arguments are skipped and the result is null
//!   only when every argument is null.
//! - `stringContainsAny(haystack, needle, ...)`: true when the text of any
//!   non-null needle occurs in the text of the haystack. A null haystack gives
//!   false.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use bigdecimal::BigDecimal;

use crate::AbacusError;
use crate::numeric::to_decimal;
use crate::value::Value;

/// Native implementation of a method
pub type MethodFn = fn(&[Value]) -> Result<Value, AbacusError>;

/// Arity constraints for methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly n arguments required
    Exact(usize),
    /// At least n arguments required
    AtLeast(usize),
    /// Between min and max arguments (inclusive)
    Range(usize, usize),
    /// Any number of arguments (0 or more)
    Any,
}

impl Arity {
    /// Check if the given number of arguments is valid for this arity constraint
    pub fn validate(&self, method: &str, arg_count: usize) -> Result<(), AbacusError> {
        let valid = match self {
            Arity::Exact(n) => arg_count == *n,
            Arity::AtLeast(n) => arg_count >= *n,
            Arity::Range(min, max) => arg_count >= *min && arg_count <= *max,
            Arity::Any => true,
        };

        if valid {
            Ok(())
        } else {
            Err(AbacusError::Arity {
                method: method.to_string(),
                expected: self.to_string(),
                got: arg_count,
            })
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "exactly {n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
            Arity::Range(min, max) => write!(f, "between {min} and {max}"),
            Arity::Any => write!(f, "any number of"),
        }
    }
}

/// A registered method
#[derive(Debug, Clone, Copy)]
pub struct MethodDef {
    pub arity: Arity,
    pub func: MethodFn,
}

/// Definition of a built-in method
struct BuiltinMethod {
    name: &'static str,
    arity: Arity,
    func: MethodFn,
}

//
// Built-in method implementations
//

fn extremum(args: &[Value], wanted: Ordering) -> Result<Value, AbacusError> {
    let mut best: Option<BigDecimal> = None;
    for arg in args.iter().filter(|a| !a.is_null()) {
        let current = to_decimal(arg)?;
        best = match best {
            Some(b) if current.cmp(&b) != wanted => Some(b),
            _ => Some(current),
        };
    }
    Ok(best.map_or(Value::Null, Value::Decimal))
}

pub fn builtin_min(args: &[Value]) -> Result<Value, AbacusError> {
    extremum(args, Ordering::Less)
}

pub fn builtin_max(args: &[Value]) -> Result<Value, AbacusError> {
    extremum(args, Ordering::Greater)
}

pub fn builtin_string_contains_any(args: &[Value]) -> Result<Value, AbacusError> {
    let Some((haystack, needles)) = args.split_first() else {
        return Ok(Value::Bool(false));
    };
    if haystack.is_null() {
        return Ok(Value::Bool(false));
    }
    let haystack = haystack.to_string();
    let found = needles
        .iter()
        .filter(|n| !n.is_null())
        .any(|n| haystack.contains(n.to_string().as_str()));
    Ok(Value::Bool(found))
}

static BUILTIN_METHODS: &[BuiltinMethod] = &[
    BuiltinMethod {
        name: "min",
        arity: Arity::AtLeast(2),
        func: builtin_min,
    },
    BuiltinMethod {
        name: "max",
        arity: Arity::AtLeast(2),
        func: builtin_max,
    },
    BuiltinMethod {
        name: "stringContainsAny",
        arity: Arity::AtLeast(2),
        func: builtin_string_contains_any,
    },
];

static DEFAULT_REGISTRY: LazyLock<MethodRegistry> = LazyLock::new(MethodRegistry::builtin);

/// Shared registry holding only the built-in methods
pub fn default_registry() -> &'static MethodRegistry {
    &DEFAULT_REGISTRY
}

/// Mapping from method name to native implementation
#[derive(Debug, Clone, Default)]
pub struct MethodRegistry {
    methods: HashMap<String, MethodDef>,
}

impl MethodRegistry {
    /// A registry with no methods at all
    pub fn empty() -> Self {
        MethodRegistry::default()
    }

    /// A registry with `min`, `max` and `stringContainsAny`
    pub fn builtin() -> Self {
        let methods = BUILTIN_METHODS
            .iter()
            .map(|m| {
                (
                    m.name.to_string(),
                    MethodDef {
                        arity: m.arity,
                        func: m.func,
                    },
                )
            })
            .collect();
        MethodRegistry { methods }
    }

    /// Add or replace a method
    pub fn with_method(mut self, name: impl Into<String>, arity: Arity, func: MethodFn) -> Self {
        self.register(name, arity, func);
        self
    }

    pub fn register(&mut self, name: impl Into<String>, arity: Arity, func: MethodFn) {
        self.methods.insert(name.into(), MethodDef { arity, func });
    }

    pub fn get(&self, name: &str) -> Option<&MethodDef> {
        self.methods.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Registered names in sorted order
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Look up, check arity and call a method
    pub fn invoke(&self, name: &str, args: &[Value]) -> Result<Value, AbacusError> {
        let method = self.get(name).ok_or_else(|| AbacusError::UnknownMethod {
            name: name.to_string(),
        })?;
        method.arity.validate(name, args.len())?;
        log::debug!("invoking {name} with {} arguments", args.len());
        (method.func)(args)
    }
}
