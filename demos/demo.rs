use abacus::{EvaluationContext, NumericPolicy, PrecisionContext, RoundingMode, evaluate, parse};

fn main() {
    println!("=== Abacus: Decimal Expression Demo ===\n");

    let context = EvaluationContext::new()
        .with("$1", 120)
        .with("$2", 3)
        .with("tier", "gold-plus");

    let test_cases = vec![
        // Basic arithmetic
        ("1 + 2 * 3", "Precedence"),
        ("0.1 + 0.2", "Exact decimals"),
        ("1 / 3", "Division at the default scale"),
        ("-(4 - 10)", "Unary minus"),
        // Comparison and logic
        ("$1 >= 100 && $2 < 5", "Logical AND"),
        ("$1 == 120.00", "Numeric equality ignores scale"),
        // Methods
        ("max($1 / $2, 45, 12.5)", "Method invocation"),
        ("stringContainsAny(tier, \"gold\", \"platinum\")", "String method"),
        // Conditionals
        ("$1 > 100 ? $1 * 0.9 : $1", "Discount rule"),
        ("missing == null ? 0 : missing", "Unbound variable"),
        // Errors
        ("1 / 0", "Division by zero"),
        ("$1 +", "Syntax error"),
    ];

    for (source, description) in test_cases {
        println!("--- {description} ---");
        println!("Expression: {source}");
        let result = match parse(source) {
            Ok(set) => match evaluate(&set, &context, &NumericPolicy::default()) {
                Ok(value) => format!("{value}"),
                Err(e) => format!("Error: {e}"),
            },
            Err(e) => format!("Parse Error: {e}"),
        };
        println!("Result:     {result}\n");
    }

    println!("--- Precision policies for 2 / 3 ---");
    let set = match parse("2 / 3") {
        Ok(set) => set,
        Err(e) => {
            println!("Parse Error: {e}");
            return;
        }
    };
    let policies = [
        ("scale 10, HALF_UP", NumericPolicy::default()),
        ("scale 2, DOWN", NumericPolicy::new(2, RoundingMode::Down)),
        (
            "7 significant digits, HALF_EVEN",
            NumericPolicy::default().with_precision(PrecisionContext::new(7, RoundingMode::HalfEven)),
        ),
        (
            "decimal128",
            NumericPolicy::default().with_precision(PrecisionContext::decimal128()),
        ),
    ];
    for (name, policy) in policies {
        match evaluate(&set, &context, &policy) {
            Ok(value) => println!("{name:<32} {value}"),
            Err(e) => println!("{name:<32} Error: {e}"),
        }
    }

    println!("\n=== Demo Complete ===");
}
