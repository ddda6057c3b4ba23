//! JSON loading of evaluation contexts and numeric policies.
//!
//! Numbers keep their exact decimal text, so `0.1` in a JSON context is the
//! decimal `0.1` and not the nearest binary float.

use crate::AbacusError;
use crate::evaluator::EvaluationContext;
use crate::numeric::{NumericPolicy, parse_literal};
use crate::value::Value;

fn invalid_json(e: serde_json::Error) -> AbacusError {
    AbacusError::InvalidInput {
        message: format!("Invalid JSON: {e}"),
    }
}

impl TryFrom<&serde_json::Value> for Value {
    type Error = AbacusError;

    fn try_from(json: &serde_json::Value) -> Result<Self, Self::Error> {
        match json {
            serde_json::Value::Null => Ok(Value::Null),
            serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
            serde_json::Value::Number(n) => {
                let text = n.to_string();
                parse_literal(&text)
                    .map(Value::Decimal)
                    .map_err(|_| AbacusError::InvalidInput {
                        message: format!("number {text} is not a supported decimal"),
                    })
            }
            serde_json::Value::String(s) => Ok(Value::String(s.clone())),
            serde_json::Value::Array(_) => Err(AbacusError::InvalidInput {
                message: "arrays are not supported as values".to_string(),
            }),
            serde_json::Value::Object(_) => Err(AbacusError::InvalidInput {
                message: "objects are not supported as values".to_string(),
            }),
        }
    }
}

impl TryFrom<serde_json::Value> for Value {
    type Error = AbacusError;

    fn try_from(json: serde_json::Value) -> Result<Self, Self::Error> {
        Value::try_from(&json)
    }
}

impl EvaluationContext {
    /// Bindings from a JSON object such as `{"$1": 1, "name": "abc"}`
    pub fn from_json(input: &str) -> Result<Self, AbacusError> {
        let json: serde_json::Value = serde_json::from_str(input).map_err(invalid_json)?;
        EvaluationContext::from_json_value(&json)
    }

    pub fn from_json_value(json: &serde_json::Value) -> Result<Self, AbacusError> {
        let serde_json::Value::Object(object) = json else {
            return Err(AbacusError::InvalidInput {
                message: "an evaluation context must be a JSON object".to_string(),
            });
        };
        let mut context = EvaluationContext::new();
        for (name, value) in object {
            let value = Value::try_from(value).map_err(|e| match e {
                AbacusError::InvalidInput { message } => AbacusError::InvalidInput {
                    message: format!("binding '{name}': {message}"),
                },
                other => other,
            })?;
            context.define(name.as_str(), value);
        }
        Ok(context)
    }
}

impl NumericPolicy {
    /// Policy from JSON; missing fields take their defaults.
    ///
    /// ```
    /// use abacus::{NumericPolicy, RoundingMode};
    ///
    /// let policy = NumericPolicy::from_json(
    ///     r#"{"default_scale": 4, "default_rounding_mode": "HALF_EVEN"}"#,
    /// ).unwrap();
    /// assert_eq!(policy.default_scale, 4);
    /// assert_eq!(policy.default_rounding_mode, RoundingMode::HalfEven);
    /// assert!(policy.precision.is_none());
    /// ```
    pub fn from_json(input: &str) -> Result<Self, AbacusError> {
        serde_json::from_str(input).map_err(invalid_json)
    }
}
