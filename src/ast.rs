use std::fmt;

use crate::AbacusError;
use crate::stack::ensure_sufficient_stack;

/// Category of an expression node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExpressionKind {
    Additive,
    Multiplicative,
    /// Unary sign: `[Symbol(+|-), operand]`
    Arithmetic,
    /// Ternary: `[ConditionalCondition, ConditionalThen, ConditionalElse]`
    Conditional,
    ConditionalCondition,
    ConditionalThen,
    ConditionalElse,
    ConditionalOr,
    ConditionalAnd,
    Equality,
    Relational,
    Expression,
    /// Call: `[Symbol(name), arg...]`
    MethodInvocation,
    Number,
    Parenthesis,
    Primary,
    StringLiteral,
    Symbol,
    Unary,
    Variable,
}

impl ExpressionKind {
    /// Kinds whose value comes from their own text (or a context lookup)
    pub fn is_leaf(self) -> bool {
        matches!(
            self,
            ExpressionKind::Number
                | ExpressionKind::StringLiteral
                | ExpressionKind::Symbol
                | ExpressionKind::Variable
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            ExpressionKind::Additive => "Additive",
            ExpressionKind::Multiplicative => "Multiplicative",
            ExpressionKind::Arithmetic => "Arithmetic",
            ExpressionKind::Conditional => "Conditional",
            ExpressionKind::ConditionalCondition => "ConditionalCondition",
            ExpressionKind::ConditionalThen => "ConditionalThen",
            ExpressionKind::ConditionalElse => "ConditionalElse",
            ExpressionKind::ConditionalOr => "ConditionalOr",
            ExpressionKind::ConditionalAnd => "ConditionalAnd",
            ExpressionKind::Equality => "Equality",
            ExpressionKind::Relational => "Relational",
            ExpressionKind::Expression => "Expression",
            ExpressionKind::MethodInvocation => "MethodInvocation",
            ExpressionKind::Number => "Number",
            ExpressionKind::Parenthesis => "Parenthesis",
            ExpressionKind::Primary => "Primary",
            ExpressionKind::StringLiteral => "StringLiteral",
            ExpressionKind::Symbol => "Symbol",
            ExpressionKind::Unary => "Unary",
            ExpressionKind::Variable => "Variable",
        }
    }
}

impl fmt::Display for ExpressionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Index of a node inside its [`ExpressionSet`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A single node. Children are ids into the owning set, in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpressionNode {
    pub kind: ExpressionKind,
    /// Source lexeme for leaves, trimmed source slice for inner nodes
    pub text: String,
    pub children: Vec<NodeId>,
}

impl ExpressionNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Arena of expression nodes plus the ordered top-level roots.
///
/// Nodes are immutable once added; evaluation state lives outside the set, so
/// one set can be evaluated any number of times, from any number of threads.
#[derive(Debug, Clone, Default)]
pub struct ExpressionSet {
    nodes: Vec<ExpressionNode>,
    roots: Vec<NodeId>,
    collapsed: bool,
    source: String,
}

impl ExpressionSet {
    pub fn new() -> Self {
        ExpressionSet::default()
    }

    /// Append a node and return its id. Children must already be in the set.
    pub fn add_node(
        &mut self,
        kind: ExpressionKind,
        text: impl Into<String>,
        children: Vec<NodeId>,
    ) -> Result<NodeId, AbacusError> {
        let text = text.into();
        if let Some(bad) = children.iter().find(|c| c.0 >= self.nodes.len()) {
            return Err(AbacusError::invariant(format!(
                "child {} of {kind} '{text}' is not in the set",
                bad.0
            )));
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(ExpressionNode {
            kind,
            text,
            children,
        });
        self.collapsed = false;
        Ok(id)
    }

    pub fn add_leaf(
        &mut self,
        kind: ExpressionKind,
        text: impl Into<String>,
    ) -> Result<NodeId, AbacusError> {
        self.add_node(kind, text, Vec::new())
    }

    /// Append a top-level sibling
    pub fn push_root(&mut self, id: NodeId) -> Result<(), AbacusError> {
        self.node(id)?;
        self.roots.push(id);
        self.collapsed = false;
        Ok(())
    }

    pub fn node(&self, id: NodeId) -> Result<&ExpressionNode, AbacusError> {
        self.nodes
            .get(id.0)
            .ok_or_else(|| AbacusError::invariant(format!("node {} is not in the set", id.0)))
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Number of nodes in the arena, reachable or not
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_collapsed(&self) -> bool {
        self.collapsed
    }

    pub(crate) fn mark_collapsed(&mut self) {
        self.collapsed = true;
    }

    /// Source text the set was translated from; empty for hand-built sets
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn set_source(&mut self, source: impl Into<String>) {
        self.source = source.into();
    }

    fn same_tree(&self, a: NodeId, other: &ExpressionSet, b: NodeId) -> bool {
        ensure_sufficient_stack(|| match (self.nodes.get(a.0), other.nodes.get(b.0)) {
            (Some(x), Some(y)) => {
                x.kind == y.kind
                    && x.text == y.text
                    && x.children.len() == y.children.len()
                    && x
                        .children
                        .iter()
                        .zip(&y.children)
                        .all(|(&ca, &cb)| self.same_tree(ca, other, cb))
            }
            _ => false,
        })
    }

    fn fmt_node(&self, f: &mut fmt::Formatter<'_>, id: NodeId) -> fmt::Result {
        ensure_sufficient_stack(|| self.fmt_level(f, id))
    }

    fn fmt_level(&self, f: &mut fmt::Formatter<'_>, id: NodeId) -> fmt::Result {
        let Some(node) = self.nodes.get(id.0) else {
            return write!(f, "#<missing:{}>", id.0);
        };
        if node.is_leaf() {
            return write!(f, "{}:{}", node.kind, node.text);
        }
        write!(f, "({}", node.kind)?;
        for &child in &node.children {
            write!(f, " ")?;
            self.fmt_node(f, child)?;
        }
        write!(f, ")")
    }
}

/// Structural equality over the trees reachable from the roots; arena layout
/// and unreachable nodes are ignored.
impl PartialEq for ExpressionSet {
    fn eq(&self, other: &Self) -> bool {
        self.roots.len() == other.roots.len()
            && self
                .roots
                .iter()
                .zip(&other.roots)
                .all(|(&a, &b)| self.same_tree(a, other, b))
    }
}

/// Renders each root as an S-expression, roots separated by spaces
impl fmt::Display for ExpressionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, &root) in self.roots.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            self.fmt_node(f, root)?;
        }
        Ok(())
    }
}
