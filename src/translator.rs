//! Parse tree to expression arena.
//!
//! One arm per production. Generic precedence layers keep every parse child
//! in order; the collapse pass removes the redundant ones later.

use crate::AbacusError;
use crate::ast::{ExpressionKind, ExpressionSet, NodeId};
use crate::parser::{ParseNode, Production};
use crate::stack::ensure_sufficient_stack;

/// Translate a parse tree into a (not yet collapsed) expression set.
///
/// Single-child wrappers are followed down from the root. When the first node
/// with several children is an additive chain, its operands and operator
/// symbols become separate top-level siblings; otherwise the whole tree is the
/// only sibling.
pub fn translate(root: &ParseNode) -> Result<ExpressionSet, AbacusError> {
    let mut set = ExpressionSet::new();

    let mut entry = root;
    while let [only] = entry.children.as_slice() {
        entry = only;
    }

    if entry.production == Production::AdditiveExpression {
        expect_odd(entry)?;
        for child in &entry.children {
            let id = translate_node(&mut set, child)?;
            set.push_root(id)?;
        }
    } else {
        let id = translate_node(&mut set, root)?;
        set.push_root(id)?;
    }
    set.set_source(root.text.clone());

    log::debug!(
        "translated '{}' into {} nodes, {} top-level",
        root.text,
        set.len(),
        set.roots().len()
    );
    Ok(set)
}

fn malformed(node: &ParseNode, expected: &str) -> AbacusError {
    AbacusError::invariant(format!(
        "{:?} '{}' has {} children, expected {expected}",
        node.production,
        node.text,
        node.children.len()
    ))
}

fn expect_count(node: &ParseNode, allowed: &[usize]) -> Result<(), AbacusError> {
    if allowed.contains(&node.children.len()) {
        Ok(())
    } else {
        let expected: Vec<String> = allowed.iter().map(|n| n.to_string()).collect();
        Err(malformed(node, &expected.join(" or ")))
    }
}

/// Operand/operator interleaving: `a (op b)*`
fn expect_odd(node: &ParseNode) -> Result<(), AbacusError> {
    if node.children.len() % 2 == 1 {
        Ok(())
    } else {
        Err(malformed(node, "an odd number"))
    }
}

fn expect_production(node: &ParseNode, production: Production) -> Result<(), AbacusError> {
    if node.production == production {
        Ok(())
    } else {
        Err(AbacusError::invariant(format!(
            "expected {production:?} but found {:?} '{}'",
            node.production, node.text
        )))
    }
}

fn translate_children(
    set: &mut ExpressionSet,
    node: &ParseNode,
    kind: ExpressionKind,
) -> Result<NodeId, AbacusError> {
    let children = node
        .children
        .iter()
        .map(|child| translate_node(set, child))
        .collect::<Result<Vec<_>, _>>()?;
    set.add_node(kind, node.text.clone(), children)
}

fn translate_leaf(
    set: &mut ExpressionSet,
    node: &ParseNode,
    kind: ExpressionKind,
) -> Result<NodeId, AbacusError> {
    expect_count(node, &[0])?;
    set.add_leaf(kind, node.text.clone())
}

fn translate_node(set: &mut ExpressionSet, node: &ParseNode) -> Result<NodeId, AbacusError> {
    ensure_sufficient_stack(|| match node.production {
        Production::Expression => translate_children(set, node, ExpressionKind::Expression),
        Production::ConditionalExpression => translate_conditional(set, node),
        Production::ConditionalCondition => {
            expect_count(node, &[1])?;
            translate_children(set, node, ExpressionKind::ConditionalCondition)
        }
        Production::ConditionalThen => {
            expect_count(node, &[1])?;
            translate_children(set, node, ExpressionKind::ConditionalThen)
        }
        Production::ConditionalElse => {
            expect_count(node, &[1])?;
            translate_children(set, node, ExpressionKind::ConditionalElse)
        }
        Production::ConditionalOrExpression => {
            expect_count(node, &[1, 3])?;
            translate_children(set, node, ExpressionKind::ConditionalOr)
        }
        Production::ConditionalAndExpression => {
            expect_count(node, &[1, 3])?;
            translate_children(set, node, ExpressionKind::ConditionalAnd)
        }
        Production::EqualityExpression => {
            expect_count(node, &[1, 3])?;
            translate_children(set, node, ExpressionKind::Equality)
        }
        Production::RelationalExpression => {
            expect_count(node, &[1, 3])?;
            translate_children(set, node, ExpressionKind::Relational)
        }
        Production::AdditiveExpression => {
            expect_odd(node)?;
            translate_children(set, node, ExpressionKind::Additive)
        }
        Production::MultiplicativeExpression => {
            expect_odd(node)?;
            translate_children(set, node, ExpressionKind::Multiplicative)
        }
        Production::UnaryExpression => translate_unary(set, node),
        Production::PrimaryExpression => {
            expect_count(node, &[1])?;
            translate_children(set, node, ExpressionKind::Primary)
        }
        Production::ParenthesisExpression => {
            expect_count(node, &[3])?;
            let inner = translate_node(set, &node.children[1])?;
            set.add_node(ExpressionKind::Parenthesis, node.text.clone(), vec![inner])
        }
        Production::MethodInvocation => translate_method(set, node),
        Production::Scientific => translate_leaf(set, node, ExpressionKind::Number),
        Production::StringLiteral => translate_leaf(set, node, ExpressionKind::StringLiteral),
        Production::Variable => translate_leaf(set, node, ExpressionKind::Variable),
        Production::Terminal => translate_leaf(set, node, ExpressionKind::Symbol),
    })
}

/// `cond ? then : else` keeps exactly the three branches; a plain
/// conditional expression is replaced by its only child
fn translate_conditional(set: &mut ExpressionSet, node: &ParseNode) -> Result<NodeId, AbacusError> {
    match node.children.as_slice() {
        [only] => translate_node(set, only),
        [condition, _, then, _, otherwise] => {
            expect_production(condition, Production::ConditionalCondition)?;
            expect_production(then, Production::ConditionalThen)?;
            expect_production(otherwise, Production::ConditionalElse)?;
            let children = vec![
                translate_node(set, condition)?,
                translate_node(set, then)?,
                translate_node(set, otherwise)?,
            ];
            set.add_node(ExpressionKind::Conditional, node.text.clone(), children)
        }
        _ => Err(malformed(node, "1 or 5")),
    }
}

/// A signed operand becomes `Arithmetic [sign, operand]`
fn translate_unary(set: &mut ExpressionSet, node: &ParseNode) -> Result<NodeId, AbacusError> {
    match node.children.as_slice() {
        [primary] => {
            let child = translate_node(set, primary)?;
            set.add_node(ExpressionKind::Unary, node.text.clone(), vec![child])
        }
        [sign, operand] => {
            expect_production(sign, Production::Terminal)?;
            if sign.text != "+" && sign.text != "-" {
                return Err(AbacusError::invariant(format!(
                    "unexpected sign '{}' in '{}'",
                    sign.text, node.text
                )));
            }
            let symbol = set.add_leaf(ExpressionKind::Symbol, sign.text.clone())?;
            let operand = translate_node(set, operand)?;
            set.add_node(
                ExpressionKind::Arithmetic,
                node.text.clone(),
                vec![symbol, operand],
            )
        }
        _ => Err(malformed(node, "1 or 2")),
    }
}

/// Method name as a `Symbol` followed by the arguments; punctuation is dropped
fn translate_method(set: &mut ExpressionSet, node: &ParseNode) -> Result<NodeId, AbacusError> {
    let Some((name, rest)) = node.children.split_first() else {
        return Err(malformed(node, "at least 1"));
    };
    expect_production(name, Production::Terminal)?;
    let mut children = vec![set.add_leaf(ExpressionKind::Symbol, name.text.clone())?];
    for arg in rest.iter().filter(|c| c.production != Production::Terminal) {
        children.push(translate_node(set, arg)?);
    }
    set.add_node(ExpressionKind::MethodInvocation, node.text.clone(), children)
}
