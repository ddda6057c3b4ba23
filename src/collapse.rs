//! Removal of single-child precedence wrappers.
//!
//! Grammar layering leaves chains such as `Additive -> Multiplicative -> Unary
//! -> Primary -> Number` around every operand. After collapsing, each inner
//! node is an operator chain, a ternary, a call or an explicit grouping.

use crate::AbacusError;
use crate::ast::{ExpressionKind, ExpressionSet, NodeId};
use crate::stack::ensure_sufficient_stack;

/// Collapse every top-level sibling into a fresh, canonical set.
///
/// Collapsing an already collapsed set returns an equal set.
pub fn collapse(set: &ExpressionSet) -> Result<ExpressionSet, AbacusError> {
    if set.is_collapsed() {
        return Ok(set.clone());
    }
    let mut out = ExpressionSet::new();
    for &root in set.roots() {
        let mut id = collapse_node(set, root, false, &mut out)?;
        // A root never stays a bare wrapper, even a grouping one
        loop {
            let node = out.node(id)?;
            match node.children.as_slice() {
                [only] if node.kind != ExpressionKind::MethodInvocation => id = *only,
                _ => break,
            }
        }
        out.push_root(id)?;
    }
    out.set_source(set.source());
    out.mark_collapsed();
    log::debug!(
        "collapsed {} nodes into {}: {}",
        set.len(),
        out.len(),
        out
    );
    Ok(out)
}

fn collapse_node(
    source: &ExpressionSet,
    id: NodeId,
    has_parent: bool,
    out: &mut ExpressionSet,
) -> Result<NodeId, AbacusError> {
    ensure_sufficient_stack(|| collapse_level(source, id, has_parent, out))
}

fn collapse_level(
    source: &ExpressionSet,
    id: NodeId,
    has_parent: bool,
    out: &mut ExpressionSet,
) -> Result<NodeId, AbacusError> {
    let node = source.node(id)?;
    match node.children.as_slice() {
        [] => return out.add_leaf(node.kind, node.text.clone()),
        // zero-argument calls keep their call node
        [_] if node.kind == ExpressionKind::MethodInvocation => {}
        [only] if !has_parent || node.kind != ExpressionKind::Parenthesis => {
            return collapse_node(source, *only, true, out);
        }
        _ => {}
    }

    let children = node
        .children
        .iter()
        .map(|&child| collapse_node(source, child, true, out))
        .collect::<Result<Vec<_>, _>>()?;

    if let (ExpressionKind::Parenthesis, [inner]) = (node.kind, children.as_slice()) {
        let inner_kind = out.node(*inner)?.kind;
        if matches!(
            inner_kind,
            ExpressionKind::Parenthesis | ExpressionKind::Variable | ExpressionKind::Number
        ) {
            return Ok(*inner);
        }
    }
    out.add_node(node.kind, node.text.clone(), children)
}
