//! Decimal arithmetic under a configurable numeric policy.
//!
//! Without a [`PrecisionContext`], `+ - *` are exact and `/` rounds to the
//! policy's default scale. With one, all four operators round to its number of
//! significant digits. Rounding is performed on exact big-integer quotients, so
//! every [`RoundingMode`] behaves exactly (there is no intermediate rounding).

use std::cmp::Ordering;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use num_bigint::{BigInt, Sign};

use crate::AbacusError;
use crate::value::Value;

/// Rule for discarding digits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "json", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "json", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum RoundingMode {
    /// Away from zero
    Up,
    /// Towards zero
    Down,
    /// Towards positive infinity
    Ceiling,
    /// Towards negative infinity
    Floor,
    /// Nearest neighbour, ties away from zero
    #[default]
    HalfUp,
    /// Nearest neighbour, ties towards zero
    HalfDown,
    /// Nearest neighbour, ties to the even neighbour
    HalfEven,
    /// The result must be exact; any rounding is an error
    Unnecessary,
}

/// Significant-digit rounding applied to every arithmetic operator.
///
/// `digits == 0` means unlimited precision (exact results).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "json", derive(serde::Serialize, serde::Deserialize))]
pub struct PrecisionContext {
    pub digits: u64,
    pub rounding_mode: RoundingMode,
}

impl PrecisionContext {
    pub fn new(digits: u64, rounding_mode: RoundingMode) -> Self {
        PrecisionContext {
            digits,
            rounding_mode,
        }
    }

    /// 34 digits, half-even
    pub fn decimal128() -> Self {
        PrecisionContext::new(34, RoundingMode::HalfEven)
    }
}

/// Numeric formatting policy for a single evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "json", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "json", serde(default))]
pub struct NumericPolicy {
    /// Scale of division results when no precision context is configured
    pub default_scale: u32,
    pub default_rounding_mode: RoundingMode,
    /// Overrides scale-based rounding for `* / + -` when present
    pub precision: Option<PrecisionContext>,
}

impl Default for NumericPolicy {
    fn default() -> Self {
        NumericPolicy {
            default_scale: 10,
            default_rounding_mode: RoundingMode::HalfUp,
            precision: None,
        }
    }
}

impl NumericPolicy {
    pub fn new(default_scale: u32, default_rounding_mode: RoundingMode) -> Self {
        NumericPolicy {
            default_scale,
            default_rounding_mode,
            precision: None,
        }
    }

    pub fn with_precision(mut self, precision: PrecisionContext) -> Self {
        self.precision = Some(precision);
        self
    }
}

/// Binary arithmetic operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl ArithmeticOperator {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "+" => Some(ArithmeticOperator::Add),
            "-" => Some(ArithmeticOperator::Subtract),
            "*" => Some(ArithmeticOperator::Multiply),
            "/" => Some(ArithmeticOperator::Divide),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            ArithmeticOperator::Add => "+",
            ArithmeticOperator::Subtract => "-",
            ArithmeticOperator::Multiply => "*",
            ArithmeticOperator::Divide => "/",
        }
    }
}

/// Largest decimal exponent, of either sign, an operand or result may carry
pub const MAX_SCALE: i64 = 100_000;

fn check_scale(value: BigDecimal) -> Result<BigDecimal, AbacusError> {
    let (_, scale) = value.as_bigint_and_exponent();
    if scale.abs() > MAX_SCALE {
        Err(AbacusError::arithmetic(format!(
            "decimal exponent {} is outside the supported range of +/-{MAX_SCALE}",
            -scale
        )))
    } else {
        Ok(value)
    }
}

/// Decimal value of a number literal such as `1.5e3`
pub fn parse_literal(text: &str) -> Result<BigDecimal, AbacusError> {
    let value = BigDecimal::from_str(text)
        .map_err(|e| AbacusError::arithmetic(format!("invalid number '{text}': {e}")))?;
    check_scale(value)
}

/// Coerce an operand to a decimal.
///
/// Decimals pass through, strings are parsed as decimal text. Null is a
/// [`AbacusError::NullOperand`], booleans and unparsable strings are a
/// [`AbacusError::TypeMismatch`].
pub fn to_decimal(value: &Value) -> Result<BigDecimal, AbacusError> {
    match value {
        Value::Decimal(d) => check_scale(d.clone()),
        Value::String(s) => BigDecimal::from_str(s.trim())
            .map_err(|_| {
                AbacusError::type_mismatch(format!("expected a decimal but got string \"{s}\""))
            })
            .and_then(check_scale),
        Value::Null => Err(AbacusError::null_operand("operand value can't be null")),
        Value::Bool(b) => Err(AbacusError::type_mismatch(format!(
            "expected a decimal but got boolean {b}"
        ))),
    }
}

/// Apply `left (op) right` under the policy
pub fn calculate_number(
    left: &Value,
    op: ArithmeticOperator,
    right: &Value,
    policy: &NumericPolicy,
) -> Result<BigDecimal, AbacusError> {
    if left.is_null() {
        return Err(AbacusError::null_operand(format!(
            "left operand of '{}' can't be null",
            op.symbol()
        )));
    }
    if right.is_null() {
        return Err(AbacusError::null_operand(format!(
            "right operand of '{}' can't be null",
            op.symbol()
        )));
    }
    let left = to_decimal(left)?;
    let right = to_decimal(right)?;

    let result = match (op, policy.precision) {
        (ArithmeticOperator::Divide, Some(precision)) => divide_with_precision(&left, &right, precision),
        (ArithmeticOperator::Divide, None) => divide_to_scale(
            &left,
            &right,
            i64::from(policy.default_scale),
            policy.default_rounding_mode,
        ),
        (ArithmeticOperator::Add, precision) => round_optional(left + right, precision),
        (ArithmeticOperator::Subtract, precision) => round_optional(left - right, precision),
        (ArithmeticOperator::Multiply, precision) => round_optional(left * right, precision),
    };
    result.and_then(check_scale)
}

fn round_optional(
    value: BigDecimal,
    precision: Option<PrecisionContext>,
) -> Result<BigDecimal, AbacusError> {
    match precision {
        Some(precision) => round_to_precision(&value, precision),
        None => Ok(value),
    }
}

fn digit_count(n: &BigInt) -> i64 {
    i64::try_from(n.magnitude().to_string().len()).unwrap_or(i64::MAX)
}

fn ten_pow(exponent: i64) -> Result<BigInt, AbacusError> {
    let exponent = u32::try_from(exponent)
        .map_err(|_| AbacusError::arithmetic(format!("scale adjustment {exponent} out of range")))?;
    Ok(BigInt::from(10u8).pow(exponent))
}

/// `dividend / divisor` rounded to exactly `scale` fractional digits
pub fn divide_to_scale(
    dividend: &BigDecimal,
    divisor: &BigDecimal,
    scale: i64,
    mode: RoundingMode,
) -> Result<BigDecimal, AbacusError> {
    let (n, n_scale) = dividend.as_bigint_and_exponent();
    let (d, d_scale) = divisor.as_bigint_and_exponent();
    if d.sign() == Sign::NoSign {
        return Err(AbacusError::arithmetic("division by zero"));
    }
    if scale.abs() > MAX_SCALE {
        return Err(AbacusError::arithmetic(format!(
            "division scale {scale} is outside the supported range of +/-{MAX_SCALE}"
        )));
    }

    // n*10^-ns / (d*10^-ds) = q*10^-scale  <=>  q = n*10^(scale-ns+ds) / d
    let shift = scale - n_scale + d_scale;
    let (numerator, denominator) = if shift >= 0 {
        (n * ten_pow(shift)?, d)
    } else {
        (n, d * ten_pow(-shift)?)
    };

    let quotient = &numerator / &denominator;
    let remainder = &numerator % &denominator;
    let rounded = if remainder.sign() == Sign::NoSign {
        quotient
    } else {
        let negative = (numerator.sign() == Sign::Minus) != (denominator.sign() == Sign::Minus);
        let twice = &remainder * BigInt::from(2u8);
        let half = twice.magnitude().cmp(denominator.magnitude());
        if round_away_from_zero(&quotient, negative, half, mode)? {
            quotient + BigInt::from(if negative { -1 } else { 1 })
        } else {
            quotient
        }
    };
    Ok(BigDecimal::new(rounded, scale))
}

/// Whether a truncated quotient with a non-zero remainder moves one unit away
/// from zero. `half` compares twice the remainder with the divisor.
fn round_away_from_zero(
    truncated: &BigInt,
    negative: bool,
    half: Ordering,
    mode: RoundingMode,
) -> Result<bool, AbacusError> {
    Ok(match mode {
        RoundingMode::Up => true,
        RoundingMode::Down => false,
        RoundingMode::Ceiling => !negative,
        RoundingMode::Floor => negative,
        RoundingMode::HalfUp => half != Ordering::Less,
        RoundingMode::HalfDown => half == Ordering::Greater,
        RoundingMode::HalfEven => match half {
            Ordering::Less => false,
            Ordering::Greater => true,
            Ordering::Equal => (truncated % BigInt::from(2u8)).sign() != Sign::NoSign,
        },
        RoundingMode::Unnecessary => {
            return Err(AbacusError::arithmetic(
                "rounding necessary but rounding mode is UNNECESSARY",
            ));
        }
    })
}

/// Round to the precision's number of significant digits
pub fn round_to_precision(
    value: &BigDecimal,
    precision: PrecisionContext,
) -> Result<BigDecimal, AbacusError> {
    if precision.digits == 0 {
        return Ok(value.clone());
    }
    let digits = i64::try_from(precision.digits).unwrap_or(i64::MAX);
    let (int, scale) = value.as_bigint_and_exponent();
    let excess = digit_count(&int) - digits;
    if excess <= 0 {
        return Ok(value.clone());
    }
    let rounded = divide_to_scale(value, &BigDecimal::from(1), scale - excess, precision.rounding_mode)?;
    // 9.99 -> 10.0 gains a digit; one more pass drops it exactly
    let (int, scale) = rounded.as_bigint_and_exponent();
    let excess = digit_count(&int) - digits;
    if excess > 0 {
        divide_to_scale(&rounded, &BigDecimal::from(1), scale - excess, precision.rounding_mode)
    } else {
        Ok(rounded)
    }
}

/// Adjusted exponent: position of the most significant digit
fn magnitude(value: &BigDecimal) -> i64 {
    let (int, scale) = value.as_bigint_and_exponent();
    digit_count(&int) - 1 - scale
}

/// `dividend / divisor` rounded to the precision's significant digits
pub fn divide_with_precision(
    dividend: &BigDecimal,
    divisor: &BigDecimal,
    precision: PrecisionContext,
) -> Result<BigDecimal, AbacusError> {
    if precision.digits == 0 {
        return divide_exact(dividend, divisor);
    }
    let digits = i64::try_from(precision.digits).unwrap_or(i64::MAX);
    if dividend.as_bigint_and_exponent().0.sign() == Sign::NoSign {
        return divide_to_scale(dividend, divisor, 0, precision.rounding_mode);
    }
    // The quotient's leading digit sits at magnitude(a) - magnitude(b) or one
    // below it, so this scale yields `digits` or `digits + 1` digits.
    let estimate = magnitude(dividend) - magnitude(divisor);
    let scale = digits - estimate;
    let quotient = divide_to_scale(dividend, divisor, scale, precision.rounding_mode)?;
    let excess = digit_count(&quotient.as_bigint_and_exponent().0) - digits;
    let quotient = if excess > 0 {
        divide_to_scale(dividend, divisor, scale - excess, precision.rounding_mode)?
    } else {
        quotient
    };
    // a carry (99999.9 -> 100000) can still add one digit
    round_to_precision(&quotient, precision)
}

/// Exact quotient, failing when the decimal expansion does not terminate
fn divide_exact(dividend: &BigDecimal, divisor: &BigDecimal) -> Result<BigDecimal, AbacusError> {
    let (d, d_scale) = divisor.as_bigint_and_exponent();
    if d.sign() == Sign::NoSign {
        return Err(AbacusError::arithmetic("division by zero"));
    }
    // A terminating quotient needs at most one extra digit per factor of 2 or
    // 5 in the divisor.
    let zero = BigInt::from(0u8);
    let mut reduced = BigInt::from_biguint(Sign::Plus, d.magnitude().clone());
    let mut extra = 0i64;
    for factor in [BigInt::from(2u8), BigInt::from(5u8)] {
        while &reduced % &factor == zero {
            reduced /= &factor;
            extra += 1;
        }
    }
    if reduced != BigInt::from(1u8) {
        return Err(AbacusError::arithmetic(
            "non-terminating decimal expansion; no exact representable decimal result",
        ));
    }
    let (_, n_scale) = dividend.as_bigint_and_exponent();
    let scale = n_scale.abs() + d_scale.abs() + extra;
    let quotient = divide_to_scale(dividend, divisor, scale, RoundingMode::Unnecessary)?;
    Ok(quotient.normalized())
}
