use std::str::FromStr;

use abacus::parser::{MAX_NESTING, MAX_TREE_DEPTH};
use abacus::{
    AbacusError, Arity, EvaluationContext, ExpressionKind, MethodRegistry, NumericPolicy,
    PrecisionContext, RoundingMode, Value, collapse, evaluate, evaluate_with, parse,
};
use bigdecimal::BigDecimal;

/// Helper function to parse and evaluate with the given bindings
fn eval_with(input: &str, context: &EvaluationContext) -> Result<Value, AbacusError> {
    let set = parse(input)?;
    evaluate(&set, context, &NumericPolicy::default())
}

/// Helper function to parse and evaluate without bindings
fn eval_fresh(input: &str) -> Result<Value, AbacusError> {
    eval_with(input, &EvaluationContext::new())
}

fn dec(s: &str) -> Value {
    Value::Decimal(BigDecimal::from_str(s).unwrap())
}

fn numbered(values: &[i64]) -> EvaluationContext {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| (format!("${}", i + 1), *v))
        .collect()
}

#[test]
fn test_operator_precedence() {
    assert_eq!(eval_fresh("2 + 3 * 4").unwrap(), Value::from(14));
    assert_eq!(eval_fresh("2 * 3 + 4").unwrap(), Value::from(10));
    assert_eq!(eval_fresh("(2 + 3) * 4").unwrap(), Value::from(20));
    assert_eq!(eval_fresh("2 - 3 - 4").unwrap(), Value::from(-5));
    assert_eq!(eval_fresh("8 / 4 / 2").unwrap(), Value::from(1));
    assert_eq!(eval_fresh("1 + 2 < 2 * 2").unwrap(), Value::Bool(true));
}

#[test]
fn test_untaken_branch_never_evaluated() {
    assert_eq!(eval_fresh("1 < 2 ? 3 : (1/0)").unwrap(), Value::from(3));
    assert_eq!(eval_fresh("1 > 2 ? (1/0) : 4").unwrap(), Value::from(4));
    // an unbound variable cannot be ordered, so the condition itself fails
    assert!(matches!(
        eval_fresh("$1 > 0 ? 10 / $1 : 0"),
        Err(AbacusError::TypeMismatch { .. })
    ));

    let guarded = "$1 != 0 ? 10 / $1 : 0";
    assert_eq!(eval_with(guarded, &numbered(&[0])).unwrap(), Value::from(0));
    assert_eq!(eval_with(guarded, &numbered(&[4])).unwrap(), dec("2.5"));
    assert!(matches!(
        eval_fresh("1 < 2 ? (1/0) : 3"),
        Err(AbacusError::Arithmetic { .. })
    ));
}

#[test]
fn test_logical_short_circuit() {
    assert_eq!(eval_fresh("1 > 2 && 1/0 > 0").unwrap(), Value::Bool(false));
    assert_eq!(eval_fresh("1 < 2 || 1/0 > 0").unwrap(), Value::Bool(true));
    assert_eq!(eval_fresh("1 > 2 && unknown(1)").unwrap(), Value::Bool(false));
    assert!(eval_fresh("1 < 2 && 1/0 > 0").is_err());
    assert!(eval_fresh("1 > 2 || 1/0 > 0").is_err());
}

#[test]
fn test_division_scale_and_rounding() {
    let policy = NumericPolicy::new(10, RoundingMode::HalfUp);
    let set = parse("1/3").unwrap();
    let value = evaluate(&set, &EvaluationContext::new(), &policy).unwrap();
    assert_eq!(value, dec("0.3333333333"));
    assert_eq!(value.to_string(), "0.3333333333");

    let policy = NumericPolicy::new(2, RoundingMode::Down);
    let value = evaluate(&parse("2/3").unwrap(), &EvaluationContext::new(), &policy).unwrap();
    assert_eq!(value, dec("0.66"));

    let policy = NumericPolicy::new(0, RoundingMode::Unnecessary);
    assert!(matches!(
        evaluate(&parse("1/3").unwrap(), &EvaluationContext::new(), &policy),
        Err(AbacusError::Arithmetic { .. })
    ));
    assert_eq!(
        evaluate(&parse("6/3").unwrap(), &EvaluationContext::new(), &policy).unwrap(),
        Value::from(2)
    );
}

#[test]
fn test_precision_context_overrides_scale() {
    let policy = NumericPolicy::new(10, RoundingMode::HalfUp)
        .with_precision(PrecisionContext::new(4, RoundingMode::HalfEven));
    let context = EvaluationContext::new();
    let eval = |source: &str| evaluate(&parse(source).unwrap(), &context, &policy).unwrap();
    assert_eq!(eval("1/3"), dec("0.3333"));
    assert_eq!(eval("20000/3"), dec("6667"));
    assert_eq!(eval("1.2345 * 1"), dec("1.234"));
    assert_eq!(eval("12345 + 0"), dec("12340"));
}

#[test]
fn test_nested_min_max() {
    assert_eq!(eval_fresh("max(1, max(2, max(3, 4)))").unwrap(), Value::from(4));
    assert_eq!(eval_fresh("min(1, min(2, min(3, 4)))").unwrap(), Value::from(1));
    assert_eq!(eval_fresh("max(min(5, 9), 2) * 2").unwrap(), Value::from(10));
    assert_eq!(eval_fresh("min(missing, other)").unwrap(), Value::Null);
}

#[test]
fn test_string_contains_any() {
    assert_eq!(
        eval_fresh("stringContainsAny(\"abcdef123456\", \"xyz\", \"def123\")").unwrap(),
        Value::Bool(true)
    );
    assert_eq!(
        eval_fresh("stringContainsAny(\"abcdef123456\", \"xyz\", \"xyzxyz\")").unwrap(),
        Value::Bool(false)
    );
    assert_eq!(
        eval_fresh("stringContainsAny(missing, \"a\")").unwrap(),
        Value::Bool(false)
    );
    assert_eq!(
        eval_fresh("1 < 2 && stringContainsAny(\"abc\", \"b\") ? 1 : 2").unwrap(),
        Value::from(1)
    );
}

#[test]
fn test_string_literal_is_not_a_number() {
    assert_eq!(
        eval_fresh(" \"3.141592653\" ").unwrap(),
        Value::from("3.141592653")
    );
}

#[test]
fn test_end_to_end_arithmetic() {
    let context = numbered(&[1, 2, 3, 4, 17]);
    let value = eval_with("(-1 * ($1 + $2 - $3 * $4)) / $5", &context).unwrap();
    // 9 / 17 rounded half-up to 10 places
    assert_eq!(value, dec("0.5294117647"));
}

#[test]
fn test_end_to_end_conditional() {
    let context = numbered(&[1, 2, 3, 7]);
    let value = eval_with("$1 < $2 ? $3/$4 : $4/$3", &context).unwrap();
    assert_eq!(value, dec("0.4285714286"));

    let context = numbered(&[2, 1, 3, 7]);
    let value = eval_with("$1 < $2 ? $3/$4 : $4/$3", &context).unwrap();
    assert_eq!(value, dec("2.3333333333"));
}

#[test]
fn test_conditional_variants() {
    let sources = [
        " $1 < $2 ? $3 / $4 : $4 / $3 ",
        " ($1 < $2) ? $3 / $4 : $4 / $3 ",
        " (((((((($1 < $2)))))))) ? $3 / $4 : $4 / $3 ",
        " $1 + $2 < $1 * $2 ? $3 / $4 : ( $1 + $2 == $1 * $2 ? $4 / $3 : $4 * $3 ) ",
        " $1 + $2 < $1 * $2 ? $3 / $4 : ( $1 + $2 != $1 * $2 && $3 - $1 == $2 ? $4 / $3 : $4 * $3 ) ",
        " $1 + $2 < $1 * $2 ? $3 / $4 : ( $1 + $2 != $1 * $2 && ($3 - $1 == $2) || (((((($4 - $2 == $1)))))) ? $4 / $3 : $4 * $3 ) ",
    ];
    for source in sources {
        for i in 0..4 {
            for j in 0..4 {
                let context = numbered(&[i, j, 3, 7]);
                assert!(eval_with(source, &context).is_ok(), "{source} with {i}, {j}");
            }
        }
    }

    // 2 + 2 == 2 * 2 picks the middle branch
    let context = numbered(&[2, 2, 3, 7]);
    assert_eq!(eval_with(sources[3], &context).unwrap(), dec("2.3333333333"));
    // 1 + 3 > 1 * 3, and 3 - 1 == 3 is false while 7 - 3 == 1 is false
    let context = numbered(&[1, 3, 3, 7]);
    assert_eq!(eval_with(sources[5], &context).unwrap(), Value::from(21));
}

#[test]
fn test_evaluation_is_pure() {
    let context = numbered(&[5, 2, 9]);
    let policy = NumericPolicy::default();
    let source = "max($1, $2) * $3 / ($1 - $2)";
    let first = evaluate(&parse(source).unwrap(), &context, &policy).unwrap();
    let second = evaluate(&parse(source).unwrap(), &context, &policy).unwrap();
    assert_eq!(first, second);

    // one parsed set, evaluated twice
    let set = collapse(&parse(source).unwrap()).unwrap();
    assert_eq!(evaluate(&set, &context, &policy).unwrap(), first);
    assert_eq!(evaluate(&set, &context, &policy).unwrap(), first);
}

#[test]
fn test_shared_across_threads() {
    let set = collapse(&parse("$1 * $1 + 1").unwrap()).unwrap();
    let policy = NumericPolicy::default();
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4i64)
            .map(|n| {
                let set = &set;
                let policy = &policy;
                scope.spawn(move || evaluate(set, &numbered(&[n]), policy).unwrap())
            })
            .collect();
        for (n, handle) in handles.into_iter().enumerate() {
            let n = n as i64;
            assert_eq!(handle.join().unwrap(), Value::from(n * n + 1));
        }
    });
}

#[test]
fn test_host_methods() {
    fn clamp(args: &[Value]) -> Result<Value, AbacusError> {
        let lower = Value::from(0);
        let upper = Value::from(100);
        match args[0].compare(&lower) {
            Some(std::cmp::Ordering::Less) => Ok(lower),
            _ if args[0].compare(&upper) == Some(std::cmp::Ordering::Greater) => Ok(upper),
            _ => Ok(args[0].clone()),
        }
    }

    let registry = MethodRegistry::builtin().with_method("clamp", Arity::Exact(1), clamp);
    let context = numbered(&[250]);
    let set = parse("clamp($1) + max(1, 2)").unwrap();
    assert_eq!(
        evaluate_with(&set, &context, &NumericPolicy::default(), &registry).unwrap(),
        Value::from(102)
    );

    let set = parse("clamp(1, 2)").unwrap();
    assert!(matches!(
        evaluate_with(&set, &context, &NumericPolicy::default(), &registry),
        Err(AbacusError::Arity { got: 2, .. })
    ));
}

#[test]
fn test_error_cases() {
    assert!(matches!(parse("1 +"), Err(AbacusError::Syntax { .. })));
    assert!(matches!(parse("(1"), Err(AbacusError::Syntax { .. })));
    assert!(matches!(
        eval_fresh("median(1, 2)"),
        Err(AbacusError::UnknownMethod { .. })
    ));
    assert!(matches!(
        eval_fresh("$1 * 2"),
        Err(AbacusError::NullOperand { .. })
    ));
    assert!(matches!(
        eval_fresh("\"a\" < 1"),
        Err(AbacusError::TypeMismatch { .. })
    ));
    assert!(matches!(
        eval_fresh("\"abc\" ? 1 : 2"),
        Err(AbacusError::TypeMismatch { .. })
    ));

    let message = eval_fresh("1 + (2 / 0)").unwrap_err().to_string();
    assert!(message.starts_with("Arithmetic error: division by zero"), "{message}");
    assert!(message.contains("while evaluating: 2 / 0"), "{message}");
}

#[cfg(feature = "json")]
#[test]
fn test_json_configuration() {
    let context = EvaluationContext::from_json(r#"{"$1": 0.1, "$2": 0.2, "$3": "0.3"}"#).unwrap();
    let policy = NumericPolicy::from_json(r#"{"default_scale": 3}"#).unwrap();
    let set = parse("$1 + $2 == $3 * 1 ? ($1 + $2) / 3 : 0").unwrap();
    assert_eq!(evaluate(&set, &context, &policy).unwrap(), dec("0.100"));
}

fn chain(operand: &str, op: &str, n: usize) -> String {
    vec![operand; n].join(op)
}

#[test]
fn test_logical_chains_at_depth_limit() {
    for op in [" && ", " || "] {
        // every extra operand adds one level to the parse tree
        let base = abacus::parser::parse(&chain("1 < 2", op, 1)).unwrap().depth();
        let n = MAX_TREE_DEPTH - base + 1;
        let source = chain("1 < 2", op, n);
        assert_eq!(abacus::parser::parse(&source).unwrap().depth(), MAX_TREE_DEPTH);

        let set = parse(&source).unwrap();
        let collapsed = collapse(&set).unwrap();
        assert_eq!(
            evaluate(&collapsed, &EvaluationContext::new(), &NumericPolicy::default()).unwrap(),
            Value::Bool(true)
        );

        assert!(matches!(
            parse(&chain("1 < 2", op, n + 1)),
            Err(AbacusError::Syntax { .. })
        ));
    }
}

#[test]
fn test_nesting_at_limit() {
    let nested = format!("{}$1{}", "(".repeat(MAX_NESTING), " + 1)".repeat(MAX_NESTING));
    let context = EvaluationContext::new().with("$1", 0);
    assert_eq!(eval_with(&nested, &context).unwrap(), Value::from(64));

    let ternaries = format!("{}0", "a ? 1 : ".repeat(MAX_NESTING));
    let context = EvaluationContext::new().with("a", false);
    assert_eq!(eval_with(&ternaries, &context).unwrap(), Value::from(0));
}

#[test]
fn test_long_flat_chains() {
    // additive and multiplicative chains stay flat, so length is not capped
    assert_eq!(eval_fresh(&chain("1", " + ", 5000)).unwrap(), Value::from(5000));
    assert_eq!(eval_fresh(&chain("1", " * ", 5000)).unwrap(), Value::from(1));
}

#[test]
fn test_side_by_side_ternaries() {
    let context = EvaluationContext::new().with("a", true);
    let source = chain("(a ? 1 : 2)", " + ", 100);
    assert_eq!(eval_with(&source, &context).unwrap(), Value::from(100));
}

#[test]
fn test_exponent_range() {
    for source in ["1e300000000 / 3", "1e300000000 + 1", "1e9999999999999999999"] {
        assert!(
            matches!(eval_fresh(source), Err(AbacusError::Syntax { .. })),
            "{source}"
        );
    }

    // in range, but the product is not
    assert!(matches!(
        eval_fresh("1e60000 * 1e60000 + 1"),
        Err(AbacusError::Arithmetic { .. })
    ));

    let context = EvaluationContext::new().with("$1", "1e300000000");
    assert!(matches!(
        eval_with("$1 / 3", &context),
        Err(AbacusError::Arithmetic { .. })
    ));
}

#[test]
fn test_extended_collapsed_set_is_collapsed_again() {
    let mut set = collapse(&parse("1 + 2").unwrap()).unwrap();
    let three = set.add_leaf(ExpressionKind::Number, "3").unwrap();
    let grouped = set
        .add_node(ExpressionKind::Parenthesis, "(3)", vec![three])
        .unwrap();
    let plus = set.add_leaf(ExpressionKind::Symbol, "+").unwrap();
    set.push_root(plus).unwrap();
    set.push_root(grouped).unwrap();
    assert!(!set.is_collapsed());
    assert_eq!(
        evaluate(&set, &EvaluationContext::new(), &NumericPolicy::default()).unwrap(),
        Value::from(6)
    );
}
