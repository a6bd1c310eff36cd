use bigdecimal::BigDecimal;
use num_traits::{Signed, Zero};

use crate::error::{MathError, code};
use crate::eval::Context;
use crate::number;

/// π to 110 significant digits; more than any f64-backed function can use.
const PI: &str = "3.1415926535897932384626433832795028841971693993751058209749445923078164062862089986280348253421170679821480865132";

pub fn pi() -> BigDecimal {
    number::parse_decimal(PI).unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scientific {
    Sin,
    Cos,
    Tan,
    Log,
    Exp,
    Sqrt,
}

impl Scientific {
    /// Call prefixes as typed in an expression, `(` included.
    pub const PREFIXES: [(&'static str, Scientific); 7] = [
        ("sin(", Scientific::Sin),
        ("cos(", Scientific::Cos),
        ("tan(", Scientific::Tan),
        ("log(", Scientific::Log),
        ("e^(", Scientific::Exp),
        ("√(", Scientific::Sqrt),
        ("sqrt(", Scientific::Sqrt),
    ];

    pub fn arity(self) -> (usize, usize) {
        match self {
            Scientific::Log => (1, 2),
            _ => (1, 1),
        }
    }

    pub fn call(self, context: &Context, input: &[BigDecimal]) -> Result<BigDecimal, MathError> {
        match self {
            Scientific::Sin => sin(context, input),
            Scientific::Cos => cos(context, input),
            Scientific::Tan => tan(context, input),
            Scientific::Log => log(context, input),
            Scientific::Exp => exp(context, input),
            Scientific::Sqrt => sqrt(context, input),
        }
    }
}

fn failed(name: &str, reason: impl std::fmt::Display) -> MathError {
    MathError::calculation(code::SCIENTIFIC_FUNCTION, format!("{name}: {reason}"))
}

fn first<'a>(name: &str, input: &'a [BigDecimal]) -> Result<&'a BigDecimal, MathError> {
    input.first().ok_or_else(|| failed(name, "missing argument"))
}

fn argument(name: &str, input: &[BigDecimal]) -> Result<f64, MathError> {
    number::to_f64(first(name, input)?).ok_or_else(|| failed(name, "argument out of range"))
}

fn finish(name: &str, result: f64) -> Result<BigDecimal, MathError> {
    number::from_f64(result).ok_or_else(|| failed(name, "result is not a finite number"))
}

fn angle(context: &Context, radians_or_degrees: f64) -> f64 {
    if context.settings.use_degrees {
        radians_or_degrees.to_radians()
    } else {
        radians_or_degrees
    }
}

pub fn sin(context: &Context, input: &[BigDecimal]) -> Result<BigDecimal, MathError> {
    let n = argument("sin", input)?;
    finish("sin", angle(context, n).sin())
}

pub fn cos(context: &Context, input: &[BigDecimal]) -> Result<BigDecimal, MathError> {
    let n = argument("cos", input)?;
    finish("cos", angle(context, n).cos())
}

pub fn tan(context: &Context, input: &[BigDecimal]) -> Result<BigDecimal, MathError> {
    let n = argument("tan", input)?;
    let n = angle(context, n);
    // tan(90°) comes out as a huge finite number in f64
    if (n.cos()).abs() < 1e-15 {
        return Err(failed("tan", "undefined for this angle"));
    }
    finish("tan", n.tan())
}

pub fn log(context: &Context, input: &[BigDecimal]) -> Result<BigDecimal, MathError> {
    let precision = context.precision;
    let n = first("log", input)?;
    let natural = |value: &BigDecimal| number::ln(value, precision + 10);
    let numerator = natural(n).ok_or_else(|| failed("log", "argument must be positive"))?;
    let denominator = match input.get(1) {
        None => natural(&BigDecimal::from(10)),
        Some(base) => natural(base).filter(|ln| !ln.is_zero()),
    }
    .ok_or_else(|| failed("log", "base must be positive and not 1"))?;
    Ok(number::divide(&numerator, &denominator, precision).with_prec(precision))
}

pub fn exp(context: &Context, input: &[BigDecimal]) -> Result<BigDecimal, MathError> {
    let n = first("e^", input)?;
    number::exp(n, context.precision).ok_or_else(|| failed("e^", "result is not a finite number"))
}

pub fn sqrt(context: &Context, input: &[BigDecimal]) -> Result<BigDecimal, MathError> {
    let n = first("sqrt", input)?;
    if n.is_negative() {
        return Err(failed("sqrt", "argument must not be negative"));
    }
    if n.is_zero() {
        return Ok(BigDecimal::zero());
    }
    bigdecimal::Context::default()
        .with_prec(context.precision)
        .and_then(|digits| n.sqrt_with_context(&digits))
        .map(|root| root.normalized())
        .ok_or_else(|| failed("sqrt", "argument must not be negative"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::MIN_PRECISION;
    use crate::settings::Settings;

    fn dec(text: &str) -> BigDecimal {
        number::parse_signed(text).unwrap()
    }

    #[test]
    fn degrees_mode_converts_angles() {
        let mut settings = Settings::default();
        settings.use_degrees = true;
        let context = Context::new(&settings, MIN_PRECISION);
        let half = sin(&context, &[dec("30")]).unwrap();
        assert_eq!(number::quantize(&half, 6), dec("0.5"));
    }

    #[test]
    fn log_defaults_to_base_ten() {
        let settings = Settings::default();
        let context = Context::new(&settings, MIN_PRECISION);
        let thousand = log(&context, &[dec("1000")]).unwrap();
        assert_eq!(number::quantize(&thousand, 60), dec("3"));
        let binary = log(&context, &[dec("8"), dec("2")]).unwrap();
        assert_eq!(number::quantize(&binary, 60), dec("3"));
        assert_eq!(log(&context, &[dec("0")]).unwrap_err().code, code::SCIENTIFIC_FUNCTION);
        assert_eq!(log(&context, &[dec("5"), dec("1")]).unwrap_err().code, code::SCIENTIFIC_FUNCTION);
    }

    #[test]
    fn exp_of_one_is_e() {
        let settings = Settings::default();
        let context = Context::new(&settings, MIN_PRECISION);
        let e = exp(&context, &[dec("1")]).unwrap();
        assert_eq!(
            number::quantize(&e, 40),
            dec("2.7182818284590452353602874713526624977572")
        );
    }

    #[test]
    fn sqrt_of_squares() {
        let settings = Settings::default();
        let context = Context::new(&settings, MIN_PRECISION);
        let root = sqrt(&context, &[dec("16")]).unwrap();
        assert_eq!(number::quantize(&root, 20), dec("4"));
        assert_eq!(sqrt(&context, &[dec("-1")]).unwrap_err().code, code::SCIENTIFIC_FUNCTION);
    }

    #[test]
    fn sqrt_follows_working_precision() {
        let settings = Settings::default();
        let root = sqrt(&Context::new(&settings, 300), &[dec("2")]).unwrap();
        let digits = number::plain_string(&root);
        assert!(digits.len() > 250, "{digits}");
        assert!(!digits.ends_with("000000"), "{digits}");
    }

    #[test]
    fn pi_starts_right() {
        assert_eq!(number::quantize(&pi(), 4), dec("3.1416"));
    }
}
