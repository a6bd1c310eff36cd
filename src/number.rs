//! Arbitrary precision helpers on top of [`BigDecimal`].
//!
//! Addition, subtraction and multiplication are exact on `BigDecimal`; the
//! routines here cover what needs an explicit precision or rounding rule.

use std::cmp::Ordering;

use bigdecimal::{BigDecimal, Context};
use num_bigint::{BigInt, Sign};
use num_traits::{One, Signed, ToPrimitive, Zero};

use crate::error::{MathError, code};

/// Largest integral exponent evaluated exactly.
const MAX_EXPONENT: u64 = 100_000;

/// Bound on the digits of a power, and on its distance from the point.
const MAX_RESULT_DIGITS: i64 = 1_000_000;

/// Extra digits carried through intermediate logarithms.
const GUARD_DIGITS: u64 = 10;

const MAX_ITERATIONS: usize = 64;

fn pow10(exponent: u64) -> BigInt {
    num_traits::pow(BigInt::from(10u8), exponent as usize)
}

fn digit_count(value: &BigInt) -> i64 {
    if value.is_zero() {
        1
    } else {
        value.magnitude().to_str_radix(10).len() as i64
    }
}

/// Parses `digits[.digits][e[+-]digits]` without going through floats.
pub fn parse_decimal(text: &str) -> Option<BigDecimal> {
    let (mantissa, exponent) = match text.find(['e', 'E']) {
        Some(at) => (&text[..at], text[at + 1..].parse::<i64>().ok()?),
        None => (text, 0),
    };
    let (whole, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if !whole.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }
    let digits = format!("{whole}{fraction}");
    let value = BigInt::parse_bytes(digits.as_bytes(), 10)?;
    let scale = (fraction.len() as i64).checked_sub(exponent)?;
    Some(BigDecimal::new(value, scale))
}

/// Like [`parse_decimal`], with an optional leading sign and surrounding
/// whitespace.
pub fn parse_signed(text: &str) -> Option<BigDecimal> {
    let text = text.trim();
    match text.strip_prefix('-') {
        Some(rest) => parse_decimal(rest).map(|d| -d),
        None => parse_decimal(text.strip_prefix('+').unwrap_or(text)),
    }
}

/// The integer a decimal represents, if it has no fractional part.
pub fn integral(value: &BigDecimal) -> Option<BigInt> {
    let (mantissa, scale) = value.normalized().as_bigint_and_exponent();
    if mantissa.is_zero() {
        return Some(BigInt::zero());
    }
    match scale.cmp(&0) {
        Ordering::Greater => None,
        Ordering::Equal => Some(mantissa),
        Ordering::Less => Some(mantissa * pow10(scale.unsigned_abs())),
    }
}

pub fn is_integral(value: &BigDecimal) -> bool {
    integral(value).is_some()
}

pub fn from_integer(value: BigInt) -> BigDecimal {
    BigDecimal::new(value, 0)
}

/// Divides with at least `precision` significant digits, rounding the last
/// one half away from zero. The divisor must not be zero.
pub fn divide(lhs: &BigDecimal, rhs: &BigDecimal, precision: u64) -> BigDecimal {
    let (numerator, lhs_scale) = lhs.as_bigint_and_exponent();
    let (denominator, rhs_scale) = rhs.as_bigint_and_exponent();
    if numerator.is_zero() {
        return BigDecimal::zero();
    }
    let shift = (precision as i64 + digit_count(&denominator) - digit_count(&numerator)).max(0);
    let scaled = numerator * pow10(shift as u64);
    let mut quotient = &scaled / &denominator;
    let remainder = &scaled % &denominator;
    if remainder.abs() * 2u8 >= denominator.abs() {
        let negative = (scaled.sign() == Sign::Minus) != (denominator.sign() == Sign::Minus);
        if negative {
            quotient -= 1;
        } else {
            quotient += 1;
        }
    }
    BigDecimal::new(quotient, lhs_scale - rhs_scale + shift).normalized()
}

/// `base ** exponent`.
///
/// Integral exponents are computed exactly (negative ones divide at the
/// working precision). Fractional exponents go through `exp(y * ln x)` at
/// `precision` significant digits.
pub fn power(base: &BigDecimal, exponent: &BigDecimal, precision: u64) -> Result<BigDecimal, MathError> {
    let overflow = || MathError::calculation(code::OVERFLOW, "Number too large to calculate.");

    if let Some(exponent) = integral(exponent) {
        let magnitude = exponent.magnitude().to_u64().filter(|n| *n <= MAX_EXPONENT).ok_or_else(overflow)?;
        if base.is_zero() && exponent.is_negative() {
            return Err(MathError::calculation(code::DIVISION_BY_ZERO, "Division by zero"));
        }
        let (mantissa, scale) = base.normalized().as_bigint_and_exponent();
        // base lies in [10^(digits - 1 - scale), 10^(digits - scale))
        let digits = digit_count(&mantissa);
        let n = magnitude as i64;
        if digits * n > MAX_RESULT_DIGITS
            || (digits - scale) * n > MAX_RESULT_DIGITS
            || (digits - 1 - scale) * n < -MAX_RESULT_DIGITS
        {
            return Err(overflow());
        }
        let raised = BigDecimal::new(num_traits::pow(mantissa, magnitude as usize), scale * n);
        return Ok(if exponent.is_negative() {
            divide(&BigDecimal::one(), &raised, precision)
        } else {
            raised
        });
    }

    if base.is_zero() {
        return Ok(BigDecimal::zero());
    }
    if base.is_negative() {
        return Err(MathError::calculation(
            code::OVERFLOW,
            "Fractional powers of negative numbers are not real numbers.",
        ));
    }
    let logarithm = ln(base, precision + GUARD_DIGITS).ok_or_else(overflow)?;
    exp(&(exponent * &logarithm), precision).ok_or_else(overflow)
}

/// `e ** value` to `precision` significant digits, or `None` when the result
/// would have more than [`MAX_RESULT_DIGITS`] digits on either side of the
/// point.
pub fn exp(value: &BigDecimal, precision: u64) -> Option<BigDecimal> {
    let bound = MAX_RESULT_DIGITS as f64 * std::f64::consts::LN_10;
    to_f64(value).filter(|v| v.abs() <= bound)?;
    let context = Context::default().with_prec(precision)?;
    Some(value.exp_with_context(&context))
}

/// Natural logarithm of a positive value to `precision` significant digits.
pub fn ln(value: &BigDecimal, precision: u64) -> Option<BigDecimal> {
    if !value.is_positive() {
        return None;
    }
    let (mantissa, scale) = value.as_bigint_and_exponent();
    // value = reduced * 10^shift with 1 <= reduced < 10
    let shift = digit_count(&mantissa) - 1 - scale;
    let reduced = BigDecimal::new(mantissa, scale + shift);
    let working = precision + GUARD_DIGITS + digit_count(&BigInt::from(shift)) as u64;
    let mut result = ln_reduced(&reduced, working)?;
    if shift != 0 {
        result += ln_reduced(&BigDecimal::from(10), working)? * BigDecimal::from(shift);
    }
    Some(result.with_prec(precision))
}

/// Halley iteration on `exp`, seeded from `f64`. Only meant for arguments
/// between 1 and 10, where the seed is always finite.
fn ln_reduced(value: &BigDecimal, precision: u64) -> Option<BigDecimal> {
    let context = Context::default().with_prec(precision)?;
    let tolerance = BigDecimal::new(BigInt::one(), precision as i64);
    let two = BigDecimal::from(2);
    let mut estimate = from_f64(to_f64(value)?.ln())?;
    for _ in 0..MAX_ITERATIONS {
        let power = estimate.exp_with_context(&context);
        let gap = value - &power;
        let step = divide(&(&gap * &two), &(value + &power), precision);
        estimate = (&estimate + &step).with_prec(precision);
        if step.abs() < tolerance {
            break;
        }
    }
    Some(estimate)
}

/// Rounds to `places` digits after the point, ties to even.
pub fn quantize(value: &BigDecimal, places: i64) -> BigDecimal {
    let (mantissa, scale) = value.as_bigint_and_exponent();
    if scale <= places {
        return value.with_scale(places);
    }
    let divisor = pow10((scale - places) as u64);
    let mut quotient = &mantissa / &divisor;
    let remainder = (&mantissa % &divisor).abs();
    let step = if mantissa.is_negative() { -1 } else { 1 };
    match (remainder * 2u8).cmp(&divisor) {
        Ordering::Greater => quotient += step,
        Ordering::Equal if !(&quotient % 2u8).is_zero() => quotient += step,
        _ => {}
    }
    BigDecimal::new(quotient, places)
}

/// Plain positional notation, never scientific.
pub fn plain_string(value: &BigDecimal) -> String {
    let (mantissa, scale) = value.as_bigint_and_exponent();
    let sign = if mantissa.is_negative() { "-" } else { "" };
    let digits = mantissa.magnitude().to_str_radix(10);
    if scale <= 0 {
        let zeros = if mantissa.is_zero() { 0 } else { scale.unsigned_abs() as usize };
        return format!("{sign}{digits}{}", "0".repeat(zeros));
    }
    let scale = scale as usize;
    let padded = format!("{digits:0>width$}", width = scale + 1);
    let (whole, fraction) = padded.split_at(padded.len() - scale);
    format!("{sign}{whole}.{fraction}")
}

pub fn to_f64(value: &BigDecimal) -> Option<f64> {
    value.to_f64().filter(|n| n.is_finite())
}

pub fn from_f64(value: f64) -> Option<BigDecimal> {
    if !value.is_finite() {
        return None;
    }
    let text = format!("{}", value.abs());
    let parsed = parse_decimal(&text)?;
    Some(if value.is_sign_negative() { -parsed } else { parsed })
}

/// Number of characters in the longest run of ASCII digits.
pub fn longest_digit_run(text: &str) -> usize {
    text.split(|c: char| !c.is_ascii_digit())
        .map(str::len)
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(text: &str) -> BigDecimal {
        parse_signed(text).unwrap()
    }

    #[test]
    fn parses_exponent_forms() {
        assert_eq!(dec("1.5e3"), BigDecimal::from(1500));
        assert_eq!(dec(".5"), dec("0.5"));
        assert_eq!(dec("2."), BigDecimal::from(2));
        assert_eq!(dec("25E-1"), dec("2.5"));
        assert!(parse_decimal(".").is_none());
        assert!(parse_decimal("1e").is_none());
        assert_eq!(parse_signed(" -2.5 "), Some(-dec("2.5")));
        assert!(parse_signed("--1").is_none());
    }

    #[test]
    fn integral_detects_whole_numbers() {
        assert_eq!(integral(&dec("4.000")), Some(BigInt::from(4)));
        assert_eq!(integral(&dec("12e2")), Some(BigInt::from(1200)));
        assert_eq!(integral(&dec("0.1")), None);
        assert_eq!(integral(&BigDecimal::zero()), Some(BigInt::zero()));
    }

    #[test]
    fn divide_keeps_exact_quotients() {
        assert_eq!(divide(&dec("8"), &dec("2"), 100), dec("4"));
        assert_eq!(divide(&dec("-7"), &dec("2"), 100), dec("-3.5"));
        let third = divide(&dec("1"), &dec("3"), 20);
        assert_eq!(quantize(&third, 2), dec("0.33"));
    }

    #[test]
    fn divide_rounds_last_digit() {
        assert_eq!(divide(&dec("2"), &dec("3"), 3), dec("0.667"));
    }

    #[test]
    fn quantize_is_half_even() {
        assert_eq!(quantize(&dec("0.125"), 2), dec("0.12"));
        assert_eq!(quantize(&dec("0.135"), 2), dec("0.14"));
        assert_eq!(quantize(&dec("-2.675"), 2), dec("-2.68"));
        assert_eq!(quantize(&dec("2.5"), 2).to_string(), "2.50");
    }

    #[test]
    fn integral_powers_are_exact() {
        assert_eq!(power(&dec("2"), &dec("10"), 100).unwrap(), dec("1024"));
        assert_eq!(power(&dec("1.5"), &dec("2"), 100).unwrap(), dec("2.25"));
        assert_eq!(power(&dec("2"), &dec("-2"), 100).unwrap(), dec("0.25"));
    }

    #[test]
    fn fractional_powers_keep_working_precision() {
        assert_eq!(quantize(&power(&dec("4"), &dec("0.5"), 100).unwrap(), 50), dec("2"));
        let root = power(&dec("2"), &dec("0.5"), 100).unwrap();
        assert_eq!(
            quantize(&root, 40),
            dec("1.4142135623730950488016887242096980785697")
        );
        let cube = power(&dec("10"), &dec("1.5"), 100).unwrap();
        assert_eq!(quantize(&cube, 30), dec("31.622776601683793319988935444327"));
        assert_eq!(power(&dec("-8"), &dec("0.5"), 100).unwrap_err().code, code::OVERFLOW);
    }

    #[test]
    fn ln_spans_magnitudes() {
        assert_eq!(quantize(&ln(&dec("1"), 100).unwrap(), 10), dec("0"));
        assert_eq!(
            quantize(&ln(&dec("10"), 100).unwrap(), 40),
            dec("2.3025850929940456840179914546843642076011")
        );
        assert_eq!(
            quantize(&ln(&dec("0.002"), 100).unwrap(), 30),
            dec("-6.214608098422191742636742242595")
        );
        assert!(ln(&dec("0"), 100).is_none());
    }

    #[test]
    fn power_rejects_huge_exponents() {
        let error = power(&dec("2"), &dec("1e9"), 100).unwrap_err();
        assert_eq!(error.code, code::OVERFLOW);
    }

    #[test]
    fn power_rejects_huge_results() {
        let big = power(&dec("10"), &dec("100000"), 100).unwrap();
        assert_eq!(power(&big, &dec("100000"), 100).unwrap_err().code, code::OVERFLOW);
        assert_eq!(power(&dec("1e-20000"), &dec("100"), 100).unwrap_err().code, code::OVERFLOW);
        let wide = dec(&"7".repeat(20_000));
        assert_eq!(power(&wide, &dec("100"), 100).unwrap_err().code, code::OVERFLOW);
        assert_eq!(power(&dec("10"), &dec("2000000.5"), 100).unwrap_err().code, code::OVERFLOW);
    }

    #[test]
    fn plain_string_avoids_exponents() {
        assert_eq!(plain_string(&dec("1e3")), "1000");
        assert_eq!(plain_string(&dec("0.05")), "0.05");
        assert_eq!(plain_string(&dec("-12.5")), "-12.5");
    }

    #[test]
    fn digit_runs() {
        assert_eq!(longest_digit_run("12+3456*7"), 4);
        assert_eq!(longest_digit_run("x"), 0);
    }
}
