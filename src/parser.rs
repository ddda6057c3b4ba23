//! Source text to generic parse tree.
//!
//! The translator only relies on the [`ParseNode`] shape (production, text,
//! ordered children), so hosts with their own grammar can build these trees by
//! hand and skip this module entirely.

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::{char, digit0, digit1, multispace0, one_of, satisfy},
    combinator::{cut, opt, recognize},
    error::{Error, ErrorKind},
    multi::separated_list0,
    sequence::{pair, preceded, terminated, tuple},
};

use crate::AbacusError;
use crate::numeric::parse_literal;
use crate::stack::ensure_sufficient_stack;

/// Grouping parentheses and ternaries allowed to nest inside each other
pub const MAX_NESTING: usize = 64;

/// Deepest parse tree handed to the translator
pub const MAX_TREE_DEPTH: usize = 1024;

/// Grammar production of a parse node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Production {
    Expression,
    ConditionalExpression,
    ConditionalCondition,
    ConditionalThen,
    ConditionalElse,
    ConditionalOrExpression,
    ConditionalAndExpression,
    EqualityExpression,
    RelationalExpression,
    AdditiveExpression,
    MultiplicativeExpression,
    UnaryExpression,
    PrimaryExpression,
    ParenthesisExpression,
    MethodInvocation,
    Scientific,
    StringLiteral,
    Variable,
    /// Operator or punctuation token
    Terminal,
}

/// A node of the generic parse tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseNode {
    pub production: Production,
    pub text: String,
    pub children: Vec<ParseNode>,
}

impl ParseNode {
    pub fn new(production: Production, text: impl Into<String>, children: Vec<ParseNode>) -> Self {
        ParseNode {
            production,
            text: text.into(),
            children,
        }
    }

    pub fn leaf(production: Production, text: impl Into<String>) -> Self {
        ParseNode::new(production, text, Vec::new())
    }

    /// Wrap a single child, reusing its text
    fn wrap(production: Production, child: ParseNode) -> Self {
        let text = child.text.clone();
        ParseNode::new(production, text, vec![child])
    }

    /// Longest root-to-leaf path, computed without recursion
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self, 1usize)];
        while let Some((node, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            stack.extend(node.children.iter().map(|c| (c, depth + 1)));
        }
        deepest
    }
}

/// Trimmed source text between `start` and the unconsumed `rest`
fn consumed(start: &str, rest: &str) -> String {
    start[..start.len() - rest.len()].trim().to_string()
}

/// Convert nom parsing errors to user-friendly messages
fn parse_error_to_message(input: &str, error: nom::Err<Error<&str>>) -> (String, usize) {
    match error {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let position = input.len().saturating_sub(e.input.len());
            let message = match e.code {
                _ if e.input.trim().is_empty() => "Unexpected end of input".to_string(),
                ErrorKind::Char if e.input.trim_start().starts_with(')') => {
                    "Unexpected closing parenthesis".to_string()
                }
                ErrorKind::TooLarge => "Expression nests too deeply".to_string(),
                ErrorKind::Float => {
                    let mut literal = String::new();
                    for c in e.input.chars() {
                        let exponent_sign =
                            matches!(c, '+' | '-') && literal.ends_with(['e', 'E']);
                        if !(c.is_ascii_alphanumeric() || c == '.' || exponent_sign) {
                            break;
                        }
                        literal.push(c);
                    }
                    format!("Number literal {literal} is out of range")
                }
                ErrorKind::Tag | ErrorKind::Char => {
                    let near: String = e.input.trim_start().chars().take(10).collect();
                    format!("Unexpected token near '{near}'")
                }
                _ => {
                    let near: String = e.input.trim_start().chars().take(10).collect();
                    format!("Invalid syntax near '{near}'")
                }
            };
            (message, position)
        }
        nom::Err::Incomplete(_) => ("Incomplete input".to_string(), input.len()),
    }
}

/// Reject inputs whose grouping would recurse deeper than [`MAX_NESTING`].
///
/// A `?` stays open until the parenthesis or argument it sits in ends, so
/// ternaries side by side do not add up.
fn check_nesting(input: &str) -> Result<(), AbacusError> {
    // open ternaries per parenthesis level
    let mut levels = vec![0usize];
    let mut ternaries = 0usize;
    let mut in_string = false;
    for (position, c) in input.char_indices() {
        match c {
            '"' => in_string = !in_string,
            _ if in_string => {}
            '(' => levels.push(0),
            ')' if levels.len() > 1 => ternaries -= levels.pop().unwrap_or(0),
            ',' => {
                if let Some(open) = levels.last_mut() {
                    ternaries -= *open;
                    *open = 0;
                }
            }
            '?' => {
                if let Some(open) = levels.last_mut() {
                    *open += 1;
                    ternaries += 1;
                }
            }
            _ => {}
        }
        if levels.len() - 1 + ternaries > MAX_NESTING {
            return Err(AbacusError::Syntax {
                message: format!("Expression nests deeper than {MAX_NESTING} levels"),
                position,
            });
        }
    }
    Ok(())
}

/// Fixed operator or punctuation token, surrounding whitespace skipped
fn terminal<'a>(token: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, ParseNode> {
    move |input: &'a str| {
        let (rest, text) = preceded(multispace0, tag(token))(input)?;
        Ok((rest, ParseNode::leaf(Production::Terminal, text)))
    }
}

/// First matching operator out of `operators`; longer spellings go first
fn operator<'a>(
    operators: &'static [&'static str],
) -> impl FnMut(&'a str) -> IResult<&'a str, ParseNode> {
    move |input: &'a str| {
        let (input, _) = multispace0(input)?;
        for op in operators {
            if let Ok((rest, text)) = tag::<_, _, Error<&str>>(*op)(input) {
                return Ok((rest, ParseNode::leaf(Production::Terminal, text)));
            }
        }
        Err(nom::Err::Error(Error::new(input, ErrorKind::Tag)))
    }
}

type Rule = fn(&str) -> IResult<&str, ParseNode>;

/// `operand (op operand)*` as one flat node
fn flat_chain<'a>(
    input: &'a str,
    production: Production,
    operators: &'static [&'static str],
    operand: Rule,
) -> IResult<&'a str, ParseNode> {
    let start = input;
    let (mut input, first) = operand(input)?;
    let mut children = vec![first];
    loop {
        match pair(operator(operators), cut(operand))(input) {
            Ok((rest, (op, right))) => {
                children.push(op);
                children.push(right);
                input = rest;
            }
            Err(nom::Err::Error(_)) => break,
            Err(e) => return Err(e),
        }
    }
    Ok((input, ParseNode::new(production, consumed(start, input), children)))
}

/// `operand (op operand)*` nested to the left: `((a op b) op c)`
fn left_nested_chain<'a>(
    input: &'a str,
    production: Production,
    operators: &'static [&'static str],
    operand: Rule,
) -> IResult<&'a str, ParseNode> {
    let start = input;
    let (mut input, first) = operand(input)?;
    let mut node = ParseNode::wrap(production, first);
    let mut nesting = 0;
    loop {
        match pair(operator(operators), cut(operand))(input) {
            Ok((rest, (op, right))) => {
                nesting += 1;
                if nesting > MAX_TREE_DEPTH {
                    return Err(nom::Err::Failure(Error::new(input, ErrorKind::TooLarge)));
                }
                node = ParseNode::new(production, consumed(start, rest), vec![node, op, right]);
                input = rest;
            }
            Err(nom::Err::Error(_)) => break,
            Err(e) => return Err(e),
        }
    }
    Ok((input, node))
}

/// `operand (op operand)*` nested to the right: `(a op (b op c))`
fn right_nested_chain<'a>(
    input: &'a str,
    production: Production,
    op: &'static str,
    operand: Rule,
) -> IResult<&'a str, ParseNode> {
    let mut starts = vec![input];
    let (mut input, first) = operand(input)?;
    let mut operands = vec![first];
    let mut operators = Vec::new();
    loop {
        let Ok((after_op, token)) = terminal(op)(input) else {
            break;
        };
        if operators.len() >= MAX_TREE_DEPTH {
            return Err(nom::Err::Failure(Error::new(input, ErrorKind::TooLarge)));
        }
        let (rest, right) = cut(operand)(after_op)?;
        operators.push(token);
        operands.push(right);
        starts.push(after_op);
        input = rest;
    }
    let end = input;
    let (Some(last), Some(last_start)) = (operands.pop(), starts.pop()) else {
        return Err(nom::Err::Error(Error::new(input, ErrorKind::Many1)));
    };
    let mut node = ParseNode::new(production, consumed(last_start, end), vec![last]);
    while let (Some(left), Some(token), Some(start)) = (operands.pop(), operators.pop(), starts.pop()) {
        node = ParseNode::new(production, consumed(start, end), vec![left, token, node]);
    }
    Ok((end, node))
}

fn conditional_expression(input: &str) -> IResult<&str, ParseNode> {
    ensure_sufficient_stack(|| conditional_level(input))
}

fn conditional_level(input: &str) -> IResult<&str, ParseNode> {
    let start = input;
    let (input, condition) = conditional_or_expression(input)?;
    let (rest, branches) = opt(pair(
        terminal("?"),
        cut(tuple((
            conditional_expression,
            terminal(":"),
            conditional_expression,
        ))),
    ))(input)?;
    let node = match branches {
        Some((question, (then, colon, otherwise))) => ParseNode::new(
            Production::ConditionalExpression,
            consumed(start, rest),
            vec![
                ParseNode::wrap(Production::ConditionalCondition, condition),
                question,
                ParseNode::wrap(Production::ConditionalThen, then),
                colon,
                ParseNode::wrap(Production::ConditionalElse, otherwise),
            ],
        ),
        None => ParseNode::wrap(Production::ConditionalExpression, condition),
    };
    Ok((rest, node))
}

fn conditional_or_expression(input: &str) -> IResult<&str, ParseNode> {
    right_nested_chain(
        input,
        Production::ConditionalOrExpression,
        "||",
        conditional_and_expression,
    )
}

fn conditional_and_expression(input: &str) -> IResult<&str, ParseNode> {
    right_nested_chain(
        input,
        Production::ConditionalAndExpression,
        "&&",
        equality_expression,
    )
}

fn equality_expression(input: &str) -> IResult<&str, ParseNode> {
    left_nested_chain(
        input,
        Production::EqualityExpression,
        &["==", "!="],
        relational_expression,
    )
}

fn relational_expression(input: &str) -> IResult<&str, ParseNode> {
    left_nested_chain(
        input,
        Production::RelationalExpression,
        &["<=", ">=", "<", ">"],
        additive_expression,
    )
}

fn additive_expression(input: &str) -> IResult<&str, ParseNode> {
    flat_chain(
        input,
        Production::AdditiveExpression,
        &["+", "-"],
        multiplicative_expression,
    )
}

fn multiplicative_expression(input: &str) -> IResult<&str, ParseNode> {
    flat_chain(
        input,
        Production::MultiplicativeExpression,
        &["*", "/"],
        unary_expression,
    )
}

/// Signs are collected first and nested afterwards, so `- - - x` does not recurse
fn unary_expression(input: &str) -> IResult<&str, ParseNode> {
    let mut signs = Vec::new();
    let mut input = input;
    while let Ok((rest, sign)) = operator(&["+", "-"])(input) {
        if signs.len() >= MAX_NESTING {
            return Err(nom::Err::Failure(Error::new(input, ErrorKind::TooLarge)));
        }
        signs.push((sign, input));
        input = rest;
    }
    let (rest, primary) = if signs.is_empty() {
        primary_expression(input)?
    } else {
        cut(primary_expression)(input)?
    };
    let mut node = ParseNode::wrap(Production::UnaryExpression, primary);
    while let Some((sign, start)) = signs.pop() {
        node = ParseNode::new(
            Production::UnaryExpression,
            consumed(start, rest),
            vec![sign, node],
        );
    }
    Ok((rest, node))
}

fn primary_expression(input: &str) -> IResult<&str, ParseNode> {
    let (rest, child) = preceded(
        multispace0,
        alt((
            parenthesis_expression,
            method_invocation,
            scientific,
            string_literal,
            variable,
        )),
    )(input)?;
    Ok((rest, ParseNode::wrap(Production::PrimaryExpression, child)))
}

fn parenthesis_expression(input: &str) -> IResult<&str, ParseNode> {
    let start = input;
    let (input, open) = terminal("(")(input)?;
    let (rest, (inner, close)) = cut(pair(conditional_expression, terminal(")")))(input)?;
    Ok((
        rest,
        ParseNode::new(
            Production::ParenthesisExpression,
            consumed(start, rest),
            vec![open, inner, close],
        ),
    ))
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c: char| c.is_ascii_alphabetic() || c == '_' || c == '$'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '$'),
    ))(input)
}

/// `name(arg, ...)`; children are the name, `(`, the arguments and `)`
fn method_invocation(input: &str) -> IResult<&str, ParseNode> {
    let start = input;
    let (input, name) = identifier(input)?;
    let (input, open) = terminal("(")(input)?;
    let (rest, (args, close)) = cut(pair(
        separated_list0(terminal(","), conditional_expression),
        terminal(")"),
    ))(input)?;
    let mut children = Vec::with_capacity(args.len() + 3);
    children.push(ParseNode::leaf(Production::Terminal, name));
    children.push(open);
    children.extend(args);
    children.push(close);
    Ok((
        rest,
        ParseNode::new(Production::MethodInvocation, consumed(start, rest), children),
    ))
}

/// Decimal literal: `12`, `3.14`, `12.`, `.5`, `1.5e3`, `2E-4`
fn scientific(input: &str) -> IResult<&str, ParseNode> {
    let (rest, text) = recognize(pair(
        alt((
            recognize(pair(digit1, opt(pair(char('.'), digit0)))),
            recognize(pair(char('.'), digit1)),
        )),
        opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
    ))(input)?;
    if parse_literal(text).is_err() {
        return Err(nom::Err::Failure(Error::new(input, ErrorKind::Float)));
    }
    Ok((rest, ParseNode::leaf(Production::Scientific, text)))
}

/// Double-quoted, no escapes; the leaf keeps its quotes
fn string_literal(input: &str) -> IResult<&str, ParseNode> {
    let (rest, text) = recognize(preceded(
        char('"'),
        cut(terminated(take_while(|c: char| c != '"'), char('"'))),
    ))(input)?;
    Ok((rest, ParseNode::leaf(Production::StringLiteral, text)))
}

fn variable(input: &str) -> IResult<&str, ParseNode> {
    let (rest, name) = identifier(input)?;
    Ok((rest, ParseNode::leaf(Production::Variable, name)))
}

/// Parse a complete expression into a tree rooted at [`Production::Expression`]
pub fn parse(input: &str) -> Result<ParseNode, AbacusError> {
    check_nesting(input)?;
    let node = match terminated(conditional_expression, multispace0)(input) {
        Ok(("", node)) => node,
        Ok((remaining, _)) => {
            let position = input.len() - remaining.len();
            return Err(AbacusError::Syntax {
                message: format!("Unexpected remaining input: '{}'", remaining.trim()),
                position,
            });
        }
        Err(e) => {
            let (message, position) = parse_error_to_message(input, e);
            return Err(AbacusError::Syntax { message, position });
        }
    };
    let root = ParseNode::wrap(Production::Expression, node);
    let depth = root.depth();
    if depth > MAX_TREE_DEPTH {
        return Err(AbacusError::Syntax {
            message: format!("Expression tree deeper than {MAX_TREE_DEPTH} levels"),
            position: 0,
        });
    }
    log::debug!("parsed '{}' ({depth} levels)", root.text);
    Ok(root)
}
