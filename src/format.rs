use std::fmt::{self, Display};
use std::str::FromStr;

use bigdecimal::BigDecimal;
use log::trace;
use num_bigint::BigInt;
use num_traits::{One, Signed, Zero};

use crate::bits::Radix;
use crate::error::{MathError, code};
use crate::number;
use crate::settings::Settings;

/// Largest denominator a fraction result is approximated with.
const MAX_DENOMINATOR: u32 = 100_000;

pub const INFINITE_SOLUTIONS: &str = "Inf. Solutions";
pub const NO_SOLUTION: &str = "No Solution";

/// A finished result in the kind the caller asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Decimal(BigDecimal),
    Int(BigInt),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Decimal(d) => write!(f, "{}", number::plain_string(d)),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(n) => write!(f, "{n}"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Str(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OutputFormat {
    #[default]
    Decimal,
    Int,
    Float,
    Bool,
    Hex,
    Binary,
    Octal,
    Str,
}

impl OutputFormat {
    fn from_spelling(spelling: &str) -> Option<Self> {
        let spelling = spelling.to_ascii_lowercase();
        let format = match spelling.strip_suffix(':').unwrap_or(&spelling) {
            "d" | "dec" | "decimal" => OutputFormat::Decimal,
            "i" | "int" | "integer" => OutputFormat::Int,
            "f" | "float" => OutputFormat::Float,
            "bo" | "bool" | "boolean" => OutputFormat::Bool,
            "h" | "hex" | "hexadecimal" => OutputFormat::Hex,
            "bi" | "bin" | "binary" => OutputFormat::Binary,
            "o" | "oc" | "oct" | "octal" => OutputFormat::Octal,
            "s" | "str" | "string" => OutputFormat::Str,
            _ => return None,
        };
        Some(format)
    }

    /// Splits a leading `prefix:` off an expression.
    ///
    /// Returns the format, the number of characters consumed and the rest.
    pub fn split_prefix(input: &str) -> (Option<OutputFormat>, usize, &str) {
        if let Some((head, rest)) = input.split_once(':') {
            if let Some(format) = Self::from_spelling(head) {
                return (Some(format), head.chars().count() + 1, rest);
            }
        }
        (None, 0, input)
    }
}

impl FromStr for OutputFormat {
    type Err = MathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_spelling(s.trim()).ok_or_else(|| {
            MathError::config(code::SETTING_VALUE, format!("Unknown output format '{s}'"))
        })
    }
}

impl Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Decimal => "decimal",
            OutputFormat::Int => "int",
            OutputFormat::Float => "float",
            OutputFormat::Bool => "bool",
            OutputFormat::Hex => "hex",
            OutputFormat::Binary => "binary",
            OutputFormat::Octal => "octal",
            OutputFormat::Str => "string",
        };
        write!(f, "{name}")
    }
}

impl From<Radix> for OutputFormat {
    fn from(radix: Radix) -> Self {
        match radix {
            Radix::Hex => OutputFormat::Hex,
            Radix::Binary => OutputFormat::Binary,
            Radix::Octal => OutputFormat::Octal,
        }
    }
}

/// What a pipeline produced before formatting.
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    Number(BigDecimal),
    Bool(bool),
    Infinite,
    NoSolution,
}

/// An answer after rounding or fraction approximation.
#[derive(Debug, Clone, PartialEq)]
enum Shaped {
    Number(BigDecimal),
    Fraction { text: String, number: BigDecimal },
    Bool(bool),
    Sentinel(&'static str),
}

impl Display for Shaped {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shaped::Number(n) => write!(f, "{}", number::plain_string(n)),
            Shaped::Fraction { text, .. } => write!(f, "{text}"),
            Shaped::Bool(b) => write!(f, "{}", Value::Bool(*b)),
            Shaped::Sentinel(s) => write!(f, "{s}"),
        }
    }
}

/// Rounds, wraps and converts an answer. The flag reports whether rounding
/// or fraction approximation changed the value.
pub fn render(answer: Answer, format: OutputFormat, settings: &Settings) -> Result<(Value, bool), MathError> {
    let (shaped, rounded) = cleanup(answer, settings)?;
    let shaped = match shaped {
        Shaped::Number(n) if settings.word_size > 0 => match number::integral(&n) {
            Some(i) => Shaped::Number(number::from_integer(settings.bit_engine().wrap(i))),
            None => Shaped::Number(n),
        },
        other => other,
    };
    Ok((convert(shaped, format, settings)?, rounded))
}

fn cleanup(answer: Answer, settings: &Settings) -> Result<(Shaped, bool), MathError> {
    let n = match answer {
        Answer::Number(n) => n,
        Answer::Bool(b) => return Ok((Shaped::Bool(b), false)),
        Answer::Infinite => return Ok((Shaped::Sentinel(INFINITE_SOLUTIONS), false)),
        Answer::NoSolution => return Ok((Shaped::Sentinel(NO_SOLUTION), false)),
    };
    if number::is_integral(&n) {
        return Ok((Shaped::Number(n.normalized()), false));
    }
    if settings.fractions {
        return fraction(n);
    }
    let rounded = number::quantize(&n, settings.decimal_places.into());
    let changed = rounded != n;
    if changed {
        trace!("rounded {} to {}", number::plain_string(&n), number::plain_string(&rounded));
    }
    Ok((Shaped::Number(rounded), changed))
}

fn fraction(n: BigDecimal) -> Result<(Shaped, bool), MathError> {
    let (mantissa, scale) = n.as_bigint_and_exponent();
    if scale <= 0 {
        return Err(MathError::calculation(
            code::FRACTION_FAILED,
            "Warning: Fraction conversion failed",
        ));
    }
    let denominator = num_traits::pow(BigInt::from(10u8), scale as usize);
    let divisor = gcd(mantissa.abs(), denominator.clone());
    let exact = (&mantissa / &divisor, &denominator / &divisor);
    let (numerator, denominator) = limit_denominator(&exact.0, &exact.1, &BigInt::from(MAX_DENOMINATOR));
    let approximated = numerator.clone() * &exact.1 != exact.0.clone() * &denominator;

    if denominator.is_one() {
        return Ok((Shaped::Number(number::from_integer(numerator)), true));
    }
    let text = if numerator.abs() > denominator {
        let sign = if numerator.is_negative() { "-" } else { "" };
        let whole = numerator.abs() / &denominator;
        let rest = numerator.abs() % &denominator;
        format!("{sign}{whole} {rest}/{denominator}")
    } else {
        format!("{numerator}/{denominator}")
    };
    Ok((Shaped::Fraction { text, number: n }, approximated))
}

fn gcd(mut a: BigInt, mut b: BigInt) -> BigInt {
    while !b.is_zero() {
        let r = &a % &b;
        a = b;
        b = r;
    }
    a
}

/// The closest fraction to `numerator / denominator` whose denominator is
/// at most `max`, found through the continued fraction expansion.
fn limit_denominator(numerator: &BigInt, denominator: &BigInt, max: &BigInt) -> (BigInt, BigInt) {
    if denominator <= max {
        return (numerator.clone(), denominator.clone());
    }
    let negative = numerator.is_negative();
    let target = numerator.abs();
    let (mut p0, mut q0, mut p1, mut q1) = (BigInt::zero(), BigInt::one(), BigInt::one(), BigInt::zero());
    let (mut n, mut d) = (target.clone(), denominator.clone());
    loop {
        let a = &n / &d;
        let q2 = &q0 + &a * &q1;
        if &q2 > max {
            break;
        }
        let p2 = &p0 + &a * &p1;
        (p0, q0, p1, q1) = (p1, q1, p2, q2);
        let r = &n - &a * &d;
        (n, d) = (d, r);
    }
    let k = (max - &q0) / &q1;
    let bound = (&p0 + &k * &p1, &q0 + &k * &q1);
    // |p1/q1 - x| <= |bound - x| with x = target / denominator
    let error_last = (&p1 * denominator - &target * &q1).abs() * &bound.1;
    let error_bound = (&bound.0 * denominator - &target * &bound.1).abs() * &q1;
    let (p, q) = if error_last <= error_bound { (p1, q1) } else { bound };
    (if negative { -p } else { p }, q)
}

fn convert(shaped: Shaped, format: OutputFormat, settings: &Settings) -> Result<Value, MathError> {
    let failed = |shown: &Shaped| {
        MathError::conversion_output(
            code::CONVERSION_FAILED,
            format!("Could not convert '{shown}' to {format}"),
        )
    };
    let value = match (format, &shaped) {
        (OutputFormat::Str, _) => Value::Str(shaped.to_string()),
        (OutputFormat::Decimal, Shaped::Number(n)) => Value::Decimal(n.clone()),
        (OutputFormat::Decimal, Shaped::Fraction { text, .. }) => Value::Str(text.clone()),
        (OutputFormat::Decimal, Shaped::Sentinel(s)) => Value::Str(s.to_string()),
        (OutputFormat::Bool, Shaped::Bool(b)) => Value::Bool(*b),
        (OutputFormat::Bool, Shaped::Number(n)) if n.is_zero() => Value::Bool(false),
        (OutputFormat::Bool, Shaped::Number(n)) if n.is_one() => Value::Bool(true),
        (OutputFormat::Int, Shaped::Number(n) | Shaped::Fraction { number: n, .. }) => {
            Value::Int(number::integral(n).ok_or_else(|| {
                MathError::conversion_output(
                    code::NOT_AN_INTEGER,
                    format!("'{shaped}' is not an integer"),
                )
            })?)
        }
        (OutputFormat::Float, Shaped::Number(n) | Shaped::Fraction { number: n, .. }) => {
            Value::Float(number::to_f64(n).ok_or_else(|| failed(&shaped))?)
        }
        (
            OutputFormat::Hex | OutputFormat::Binary | OutputFormat::Octal,
            Shaped::Number(n) | Shaped::Fraction { number: n, .. },
        ) => {
            let radix = match format {
                OutputFormat::Hex => Radix::Hex,
                OutputFormat::Binary => Radix::Binary,
                _ => Radix::Octal,
            };
            let integer = number::integral(n).ok_or_else(|| failed(&shaped))?;
            Value::Str(settings.bit_engine().to_radix_string(&integer, radix))
        }
        _ => return Err(failed(&shaped)),
    };
    Ok(value)
}
