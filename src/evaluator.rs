use std::collections::HashMap;

use crate::AbacusError;
use crate::ast::{ExpressionKind, ExpressionSet, NodeId};
use crate::calculator::{calculate, computed, fold_chain};
use crate::collapse::collapse;
use crate::methods::{MethodRegistry, default_registry};
use crate::numeric::NumericPolicy;
use crate::stack::ensure_sufficient_stack;
use crate::value::Value;

/// Variable bindings for one or more evaluations
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EvaluationContext {
    bindings: HashMap<String, Value>,
}

impl EvaluationContext {
    pub fn new() -> Self {
        EvaluationContext {
            bindings: HashMap::new(),
        }
    }

    pub fn define(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.bindings.insert(name.into(), value.into());
    }

    /// Builder form of [`EvaluationContext::define`]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.define(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for EvaluationContext {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut context = EvaluationContext::new();
        context.extend(iter);
        context
    }
}

impl<K: Into<String>, V: Into<Value>> Extend<(K, V)> for EvaluationContext {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (name, value) in iter {
            self.define(name, value);
        }
    }
}

/// Read-only inputs shared by every calculation of one evaluation
#[derive(Debug, Clone, Copy)]
pub struct Environment<'a> {
    pub context: &'a EvaluationContext,
    pub policy: &'a NumericPolicy,
    pub registry: &'a MethodRegistry,
}

/// Evaluate with the built-in methods
pub fn evaluate(
    set: &ExpressionSet,
    context: &EvaluationContext,
    policy: &NumericPolicy,
) -> Result<Value, AbacusError> {
    evaluate_with(set, context, policy, default_registry())
}

/// Evaluate a set against `context`, calling methods from `registry`.
///
/// The set is collapsed first unless it already is. Several top-level
/// siblings are folded like an additive chain.
pub fn evaluate_with(
    set: &ExpressionSet,
    context: &EvaluationContext,
    policy: &NumericPolicy,
    registry: &MethodRegistry,
) -> Result<Value, AbacusError> {
    let collapsed;
    let set = if set.is_collapsed() {
        set
    } else {
        collapsed = collapse(set)?;
        &collapsed
    };
    log::debug!("evaluating {set} with {} bindings", context.len());

    let mut evaluation = Evaluation {
        set,
        env: Environment {
            context,
            policy,
            registry,
        },
        values: vec![None; set.len()],
    };
    for &root in set.roots() {
        evaluation.force(root)?;
    }

    let result = match set.roots() {
        [] => Err(AbacusError::invariant("nothing to evaluate")),
        &[only] => computed(&evaluation.values, only).cloned(),
        roots => fold_chain(set, roots, &evaluation.values, &evaluation.env).map_err(|e| {
            if set.source().is_empty() {
                e.in_expression(&set.to_string())
            } else {
                e.in_expression(set.source())
            }
        }),
    }?;
    log::debug!("result {result}");
    Ok(result)
}

/// Per-call state: the computed value of every node forced so far
struct Evaluation<'a> {
    set: &'a ExpressionSet,
    env: Environment<'a>,
    values: Vec<Option<Value>>,
}

impl Evaluation<'_> {
    fn is_bool(&self, id: NodeId, wanted: bool) -> bool {
        matches!(self.values.get(id.index()), Some(Some(Value::Bool(b))) if *b == wanted)
    }

    /// Compute `id` and whichever of its children its kind requires
    fn force(&mut self, id: NodeId) -> Result<(), AbacusError> {
        ensure_sufficient_stack(|| self.force_level(id))
    }

    fn force_level(&mut self, id: NodeId) -> Result<(), AbacusError> {
        if matches!(self.values.get(id.index()), Some(Some(_))) {
            return Ok(());
        }
        let set = self.set;
        let node = set.node(id)?;

        match (node.kind, node.children.as_slice()) {
            // Only the selected branch runs; the other one may fail
            (ExpressionKind::Conditional, &[condition, then, otherwise]) => {
                self.force(condition)?;
                if self.is_bool(condition, true) {
                    self.force(then)?;
                } else if self.is_bool(condition, false) {
                    self.force(otherwise)?;
                }
            }
            (ExpressionKind::ConditionalAnd, &[left, _, right]) => {
                self.force(left)?;
                if self.is_bool(left, true) {
                    self.force(right)?;
                }
            }
            (ExpressionKind::ConditionalOr, &[left, _, right]) => {
                self.force(left)?;
                if self.is_bool(left, false) {
                    self.force(right)?;
                }
            }
            (_, children) => {
                for &child in children {
                    self.force(child)?;
                }
            }
        }

        let value = calculate(set, id, &self.values, &self.env)
            .map_err(|e| e.in_expression(&node.text))?;
        log::trace!("{} '{}' = {value}", node.kind, node.text);
        match self.values.get_mut(id.index()) {
            Some(slot) => *slot = Some(value),
            None => return Err(AbacusError::invariant(format!("node {} out of range", id.index()))),
        }
        Ok(())
    }
}
