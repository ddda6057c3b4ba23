//! Embeddable decimal expression language.
//!
//! Source text is parsed into a generic parse tree, translated into an
//! [`ExpressionSet`], collapsed into its canonical form and evaluated against an
//! [`EvaluationContext`] under a [`NumericPolicy`]:
//!
//! ```
//! use abacus::{EvaluationContext, NumericPolicy, Value};
//!
//! let set = abacus::parse("$1 < $2 ? $3 * 2 : 0").unwrap();
//! let context = EvaluationContext::new()
//!     .with("$1", 1)
//!     .with("$2", 2)
//!     .with("$3", "1.5");
//! let value = abacus::evaluate(&set, &context, &NumericPolicy::default()).unwrap();
//! assert_eq!(value, Value::from(3));
//! ```

use thiserror::Error;

/// Error types for parsing and evaluation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AbacusError {
    #[error("Syntax error at position {position}: {message}")]
    Syntax { message: String, position: usize },
    #[error("Unknown method: {name}")]
    UnknownMethod { name: String },
    #[error("Arity error: {method} expects {expected} arguments, got {got}")]
    Arity {
        method: String,
        expected: String,
        got: usize,
    },
    #[error("Type mismatch: {message}{}", context_suffix(.expression))]
    TypeMismatch { message: String, expression: String },
    #[error("Null operand: {message}{}", context_suffix(.expression))]
    NullOperand { message: String, expression: String },
    #[error("Arithmetic error: {message}{}", context_suffix(.expression))]
    Arithmetic { message: String, expression: String },
    #[error("Internal invariant violated: {message}{}", context_suffix(.expression))]
    InternalInvariant { message: String, expression: String },
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },
}

fn context_suffix(expression: &str) -> String {
    if expression.is_empty() {
        String::new()
    } else {
        format!("\n  Context: while evaluating: {expression}")
    }
}

impl AbacusError {
    pub(crate) fn type_mismatch(message: impl Into<String>) -> Self {
        AbacusError::TypeMismatch {
            message: message.into(),
            expression: String::new(),
        }
    }

    pub(crate) fn null_operand(message: impl Into<String>) -> Self {
        AbacusError::NullOperand {
            message: message.into(),
            expression: String::new(),
        }
    }

    pub(crate) fn arithmetic(message: impl Into<String>) -> Self {
        AbacusError::Arithmetic {
            message: message.into(),
            expression: String::new(),
        }
    }

    pub(crate) fn invariant(message: impl Into<String>) -> Self {
        AbacusError::InternalInvariant {
            message: message.into(),
            expression: String::new(),
        }
    }

    /// Attach the source text of the expression being evaluated.
    ///
    /// Errors that already carry an expression keep it, so the innermost
    /// failing node is what gets reported.
    pub fn in_expression(self, text: &str) -> Self {
        match self {
            AbacusError::TypeMismatch {
                message,
                expression,
            } if expression.is_empty() => AbacusError::TypeMismatch {
                message,
                expression: text.to_string(),
            },
            AbacusError::NullOperand {
                message,
                expression,
            } if expression.is_empty() => AbacusError::NullOperand {
                message,
                expression: text.to_string(),
            },
            AbacusError::Arithmetic {
                message,
                expression,
            } if expression.is_empty() => AbacusError::Arithmetic {
                message,
                expression: text.to_string(),
            },
            AbacusError::InternalInvariant {
                message,
                expression,
            } if expression.is_empty() => AbacusError::InternalInvariant {
                message,
                expression: text.to_string(),
            },
            other => other,
        }
    }
}

pub mod ast;
pub mod calculator;
pub mod collapse;
pub mod evaluator;
#[cfg(feature = "json")]
pub mod json;
pub mod methods;
pub mod numeric;
pub mod parser;
mod stack;
pub mod translator;
pub mod value;

pub use ast::{ExpressionKind, ExpressionNode, ExpressionSet, NodeId};
pub use collapse::collapse;
pub use evaluator::{EvaluationContext, evaluate, evaluate_with};
pub use methods::{Arity, MethodRegistry};
pub use numeric::{NumericPolicy, PrecisionContext, RoundingMode};
pub use parser::{ParseNode, Production};
pub use translator::translate;
pub use value::Value;

/// Parse source text into a translated (not yet collapsed) expression set
pub fn parse(source: &str) -> Result<ExpressionSet, AbacusError> {
    let tree = parser::parse(source)?;
    translator::translate(&tree)
}
