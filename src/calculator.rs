//! One calculation rule per [`ExpressionKind`].
//!
//! Every rule reads the values of the children it needs from the side table
//! filled in by the driver; it never evaluates children itself. Which children
//! have been computed when a rule runs is decided by the driver.

use std::cmp::Ordering;

use crate::AbacusError;
use crate::ast::{ExpressionKind, ExpressionNode, ExpressionSet, NodeId};
use crate::evaluator::Environment;
use crate::numeric::{ArithmeticOperator, calculate_number, parse_literal};
use crate::value::Value;

/// Computed value of a node, or an invariant error when it was skipped
pub(crate) fn computed(values: &[Option<Value>], id: NodeId) -> Result<&Value, AbacusError> {
    values
        .get(id.index())
        .and_then(Option::as_ref)
        .ok_or_else(|| AbacusError::invariant(format!("node {} used before it was computed", id.index())))
}

fn symbol<'s>(set: &'s ExpressionSet, id: NodeId) -> Result<&'s str, AbacusError> {
    let node = set.node(id)?;
    if node.kind == ExpressionKind::Symbol {
        Ok(&node.text)
    } else {
        Err(AbacusError::invariant(format!(
            "expected an operator symbol but found {} '{}'",
            node.kind, node.text
        )))
    }
}

fn shape_error(node: &ExpressionNode) -> AbacusError {
    AbacusError::invariant(format!(
        "{} node with {} children",
        node.kind,
        node.children.len()
    ))
}

fn expect_bool(value: &Value, role: &str) -> Result<bool, AbacusError> {
    value.as_bool().ok_or_else(|| {
        AbacusError::type_mismatch(format!(
            "{role} must be a boolean but was {} {value}",
            value.type_name()
        ))
    })
}

/// Left fold over `operand (op operand)*`.
///
/// A single operand is passed through unchanged, whatever its type.
pub(crate) fn fold_chain(
    set: &ExpressionSet,
    ids: &[NodeId],
    values: &[Option<Value>],
    env: &Environment<'_>,
) -> Result<Value, AbacusError> {
    let Some((&first, rest)) = ids.split_first() else {
        return Err(AbacusError::invariant("empty operator chain"));
    };
    let mut result = computed(values, first)?.clone();
    for pair in rest.chunks(2) {
        let &[op, operand] = pair else {
            return Err(AbacusError::invariant("operator without a right operand"));
        };
        let op_text = symbol(set, op)?;
        let op = ArithmeticOperator::from_symbol(op_text).ok_or_else(|| {
            AbacusError::invariant(format!("'{op_text}' is not an arithmetic operator"))
        })?;
        let right = computed(values, operand)?;
        result = Value::Decimal(calculate_number(&result, op, right, env.policy)?);
    }
    Ok(result)
}

/// Value of `id`, given that the children it needs are already computed
pub fn calculate(
    set: &ExpressionSet,
    id: NodeId,
    values: &[Option<Value>],
    env: &Environment<'_>,
) -> Result<Value, AbacusError> {
    let node = set.node(id)?;
    let children = node.children.as_slice();
    match node.kind {
        ExpressionKind::Additive | ExpressionKind::Multiplicative => {
            fold_chain(set, children, values, env)
        }

        ExpressionKind::Arithmetic => {
            let &[sign, operand] = children else {
                return Err(shape_error(node));
            };
            let op = match symbol(set, sign)? {
                "+" => ArithmeticOperator::Add,
                "-" => ArithmeticOperator::Subtract,
                other => {
                    return Err(AbacusError::invariant(format!("'{other}' is not a sign")));
                }
            };
            let operand = computed(values, operand)?;
            calculate_number(&Value::from(0), op, operand, env.policy).map(Value::Decimal)
        }

        ExpressionKind::Parenthesis
        | ExpressionKind::Primary
        | ExpressionKind::Unary
        | ExpressionKind::Expression
        | ExpressionKind::ConditionalCondition
        | ExpressionKind::ConditionalThen
        | ExpressionKind::ConditionalElse => match children {
            &[only] => Ok(computed(values, only)?.clone()),
            _ => Err(shape_error(node)),
        },

        ExpressionKind::Conditional => {
            let &[condition, then, otherwise] = children else {
                return Err(shape_error(node));
            };
            let branch = if expect_bool(computed(values, condition)?, "condition")? {
                then
            } else {
                otherwise
            };
            Ok(computed(values, branch)?.clone())
        }

        ExpressionKind::ConditionalOr | ExpressionKind::ConditionalAnd => {
            let (token, short_circuit) = if node.kind == ExpressionKind::ConditionalOr {
                ("||", true)
            } else {
                ("&&", false)
            };
            match children {
                &[only] => Ok(computed(values, only)?.clone()),
                &[left, op, right] => {
                    if symbol(set, op)? != token {
                        return Err(shape_error(node));
                    }
                    let left = expect_bool(computed(values, left)?, "left operand")?;
                    if left == short_circuit {
                        return Ok(Value::Bool(short_circuit));
                    }
                    let right = expect_bool(computed(values, right)?, "right operand")?;
                    Ok(Value::Bool(right))
                }
                _ => Err(shape_error(node)),
            }
        }

        ExpressionKind::Equality => match children {
            &[only] => Ok(computed(values, only)?.clone()),
            &[left, op, right] => {
                let equal = computed(values, left)? == computed(values, right)?;
                match symbol(set, op)? {
                    "==" => Ok(Value::Bool(equal)),
                    "!=" => Ok(Value::Bool(!equal)),
                    other => Err(AbacusError::invariant(format!(
                        "'{other}' is not an equality operator"
                    ))),
                }
            }
            _ => Err(shape_error(node)),
        },

        ExpressionKind::Relational => match children {
            &[only] => Ok(computed(values, only)?.clone()),
            &[left, op, right] => {
                let (left, right) = (computed(values, left)?, computed(values, right)?);
                let ordering = left.compare(right).ok_or_else(|| {
                    AbacusError::type_mismatch(format!(
                        "can't compare {} {left} with {} {right}",
                        left.type_name(),
                        right.type_name()
                    ))
                })?;
                let result = match symbol(set, op)? {
                    "<" => ordering == Ordering::Less,
                    ">" => ordering == Ordering::Greater,
                    "<=" => ordering != Ordering::Greater,
                    ">=" => ordering != Ordering::Less,
                    other => {
                        return Err(AbacusError::invariant(format!(
                            "'{other}' is not a relational operator"
                        )));
                    }
                };
                Ok(Value::Bool(result))
            }
            _ => Err(shape_error(node)),
        },

        ExpressionKind::MethodInvocation => {
            let Some((&name, args)) = children.split_first() else {
                return Err(shape_error(node));
            };
            let name = symbol(set, name)?;
            let args = args
                .iter()
                .map(|&arg| computed(values, arg).cloned())
                .collect::<Result<Vec<_>, _>>()?;
            env.registry.invoke(name, &args)
        }

        ExpressionKind::Number => parse_literal(&node.text).map(Value::Decimal),

        ExpressionKind::StringLiteral => node
            .text
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .map(Value::from)
            .ok_or_else(|| AbacusError::invariant(format!("unquoted string literal {}", node.text))),

        ExpressionKind::Symbol => Ok(Value::from(node.text.as_str())),

        ExpressionKind::Variable => Ok(env.context.get(&node.text).cloned().unwrap_or_default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    use bigdecimal::BigDecimal;
    use crate::evaluator::EvaluationContext;
    use crate::methods::MethodRegistry;
    use crate::numeric::NumericPolicy;

    struct Fixture {
        context: EvaluationContext,
        policy: NumericPolicy,
        registry: MethodRegistry,
    }

    impl Fixture {
        fn new() -> Self {
            Fixture {
                context: EvaluationContext::new().with("x", 5).with("name", "abacus"),
                policy: NumericPolicy::default(),
                registry: MethodRegistry::builtin(),
            }
        }

        fn env(&self) -> Environment<'_> {
            Environment {
                context: &self.context,
                policy: &self.policy,
                registry: &self.registry,
            }
        }
    }

    /// Compute every leaf, then `parent` from them
    fn calc(set: &ExpressionSet, parent: NodeId, fixture: &Fixture) -> Result<Value, AbacusError> {
        let env = fixture.env();
        let mut values = vec![None; set.len()];
        for &child in &set.node(parent).unwrap().children {
            values[child.index()] = Some(calculate(set, child, &values, &env)?);
        }
        calculate(set, parent, &values, &env)
    }

    fn leaves(set: &mut ExpressionSet, items: &[(ExpressionKind, &str)]) -> Vec<NodeId> {
        items
            .iter()
            .map(|(kind, text)| set.add_leaf(*kind, *text).unwrap())
            .collect()
    }

    use ExpressionKind::*;

    #[test]
    fn test_leaves() {
        let fixture = Fixture::new();
        let env = fixture.env();
        let mut set = ExpressionSet::new();
        let ids = leaves(
            &mut set,
            &[
                (Number, "1.50"),
                (StringLiteral, "\"3.141592653\""),
                (Variable, "x"),
                (Variable, "missing"),
                (Symbol, "+"),
            ],
        );
        let values = vec![None; set.len()];
        let results: Vec<Value> = ids
            .iter()
            .map(|&id| calculate(&set, id, &values, &env).unwrap())
            .collect();
        assert_eq!(
            results,
            vec![
                Value::Decimal(BigDecimal::from_str("1.5").unwrap()),
                Value::from("3.141592653"),
                Value::from(5),
                Value::Null,
                Value::from("+"),
            ]
        );
    }

    #[test]
    fn test_number_out_of_range() {
        let fixture = Fixture::new();
        let env = fixture.env();
        let mut set = ExpressionSet::new();
        let ids = leaves(&mut set, &[(Number, "1e9999999999999999999"), (Number, "1e300000000")]);
        let values = vec![None; set.len()];
        for id in ids {
            assert!(matches!(
                calculate(&set, id, &values, &env),
                Err(AbacusError::Arithmetic { .. })
            ));
        }
    }

    #[test]
    fn test_chain_fold() {
        let fixture = Fixture::new();
        let mut set = ExpressionSet::new();
        let ids = leaves(
            &mut set,
            &[(Number, "10"), (Symbol, "-"), (Variable, "x"), (Symbol, "/"), (Number, "2")],
        );
        let chain = set.add_node(Additive, "10 - x / 2", ids).unwrap();
        // strictly left to right: (10 - 5) / 2
        assert_eq!(
            calc(&set, chain, &fixture).unwrap(),
            Value::Decimal(BigDecimal::from_str("2.5").unwrap())
        );
    }

    #[test]
    fn test_chain_passes_single_operand_through() {
        let fixture = Fixture::new();
        let mut set = ExpressionSet::new();
        let ids = leaves(&mut set, &[(StringLiteral, "\"abc\"")]);
        let chain = set.add_node(Multiplicative, "\"abc\"", ids).unwrap();
        assert_eq!(calc(&set, chain, &fixture).unwrap(), Value::from("abc"));
    }

    #[test]
    fn test_sign() {
        let fixture = Fixture::new();
        let mut set = ExpressionSet::new();
        let ids = leaves(&mut set, &[(Symbol, "-"), (Variable, "x")]);
        let negated = set.add_node(Arithmetic, "-x", ids).unwrap();
        assert_eq!(calc(&set, negated, &fixture).unwrap(), Value::from(-5));

        let ids = leaves(&mut set, &[(Symbol, "-"), (Variable, "missing")]);
        let negated = set.add_node(Arithmetic, "-missing", ids).unwrap();
        assert!(matches!(
            calc(&set, negated, &fixture),
            Err(AbacusError::NullOperand { .. })
        ));
    }

    #[test]
    fn test_comparisons() {
        let fixture = Fixture::new();
        let mut set = ExpressionSet::new();
        let cases = [
            (Relational, "<", "1", "2", true),
            (Relational, ">=", "2", "2.00", true),
            (Relational, ">", "1", "2", false),
            (Equality, "==", "1.0", "1", true),
            (Equality, "!=", "1.0", "1", false),
        ];
        for (kind, op, left, right, expected) in cases {
            let ids = leaves(&mut set, &[(Number, left), (Symbol, op), (Number, right)]);
            let node = set.add_node(kind, format!("{left} {op} {right}"), ids).unwrap();
            assert_eq!(calc(&set, node, &fixture).unwrap(), Value::Bool(expected), "{left} {op} {right}");
        }

        let ids = leaves(&mut set, &[(Number, "1"), (Symbol, "<"), (StringLiteral, "\"2\"")]);
        let node = set.add_node(Relational, "1 < \"2\"", ids).unwrap();
        assert!(matches!(
            calc(&set, node, &fixture),
            Err(AbacusError::TypeMismatch { .. })
        ));

        // mixed variants are simply unequal
        let ids = leaves(&mut set, &[(Number, "1"), (Symbol, "=="), (StringLiteral, "\"1\"")]);
        let node = set.add_node(Equality, "1 == \"1\"", ids).unwrap();
        assert_eq!(calc(&set, node, &fixture).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_conditional_requires_boolean() {
        let fixture = Fixture::new();
        let mut set = ExpressionSet::new();
        let ids = leaves(&mut set, &[(Number, "1"), (Number, "2"), (Number, "3")]);
        let node = set.add_node(Conditional, "1 ? 2 : 3", ids).unwrap();
        assert!(matches!(
            calc(&set, node, &fixture),
            Err(AbacusError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_logical_with_uncomputed_right() {
        let fixture = Fixture::new();
        let env = fixture.env();
        let mut set = ExpressionSet::new();
        let left = set.add_leaf(Variable, "flag").unwrap();
        let op = set.add_leaf(Symbol, "&&").unwrap();
        let right = set.add_leaf(Variable, "never").unwrap();
        let and = set.add_node(ConditionalAnd, "flag && never", vec![left, op, right]).unwrap();

        let mut values = vec![None; set.len()];
        values[left.index()] = Some(Value::Bool(false));
        assert_eq!(calculate(&set, and, &values, &env).unwrap(), Value::Bool(false));

        values[left.index()] = Some(Value::Bool(true));
        assert!(matches!(
            calculate(&set, and, &values, &env),
            Err(AbacusError::InternalInvariant { .. })
        ));
    }

    #[test]
    fn test_method_invocation() {
        let fixture = Fixture::new();
        let mut set = ExpressionSet::new();
        let ids = leaves(
            &mut set,
            &[(Symbol, "stringContainsAny"), (Variable, "name"), (StringLiteral, "\"bac\"")],
        );
        let call = set.add_node(MethodInvocation, "stringContainsAny(name, \"bac\")", ids).unwrap();
        assert_eq!(calc(&set, call, &fixture).unwrap(), Value::Bool(true));

        let ids = leaves(&mut set, &[(Symbol, "nope"), (Number, "1")]);
        let call = set.add_node(MethodInvocation, "nope(1)", ids).unwrap();
        assert!(matches!(
            calc(&set, call, &fixture),
            Err(AbacusError::UnknownMethod { .. })
        ));
    }

    #[test]
    fn test_shape_errors() {
        let fixture = Fixture::new();
        let mut set = ExpressionSet::new();
        let ids = leaves(&mut set, &[(Number, "1"), (Number, "2")]);
        let node = set.add_node(Parenthesis, "(1 2)", ids).unwrap();
        assert!(matches!(
            calc(&set, node, &fixture),
            Err(AbacusError::InternalInvariant { .. })
        ));

        let ids = leaves(&mut set, &[(Number, "1"), (Number, "2"), (Number, "3")]);
        let node = set.add_node(Additive, "1 2 3", ids).unwrap();
        assert!(calc(&set, node, &fixture).is_err());
    }
}
