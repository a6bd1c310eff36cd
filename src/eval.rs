use std::collections::BTreeMap;

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::Zero;

use crate::Bindings;
use crate::bits::BitEngine;
use crate::error::{MathError, code};
use crate::format::Answer;
use crate::lex::Span;
use crate::memory::Memory;
use crate::number;
use crate::parse::{Expr, Op};
use crate::settings::Settings;

/// Significant digits every calculation gets at least.
pub const MIN_PRECISION: u64 = 100;
pub const MAX_PRECISION: u64 = 10_000;
/// Longest digit run accepted in an input.
pub const MAX_INPUT_DIGITS: usize = 20_000;

/// Names with a known value for one call: memory first, then the call-time
/// bindings on top.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Environment {
    values: BTreeMap<String, BigDecimal>,
}

impl Environment {
    pub fn new(memory: &Memory, bindings: &Bindings) -> Self {
        let mut values: BTreeMap<String, BigDecimal> = memory
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        values.extend(bindings.iter().map(|(name, value)| (name.clone(), value.clone())));
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&BigDecimal> {
        self.values.get(name)
    }

    /// Digit count of the longest bound value.
    pub fn longest_value(&self) -> usize {
        self.values
            .values()
            .map(|value| number::plain_string(value).chars().filter(char::is_ascii_digit).count())
            .max()
            .unwrap_or(0)
    }
}

/// Working precision for `input`, in significant digits.
pub fn working_precision(input: &str, environment: &Environment, settings: &Settings) -> Result<u64, MathError> {
    let longest_input = number::longest_digit_run(input);
    if longest_input > MAX_INPUT_DIGITS {
        return Err(MathError::calculation(
            code::OVERFLOW,
            format!("Input number exceeds the limit of {MAX_INPUT_DIGITS} digits."),
        ));
    }
    let precision = [
        MIN_PRECISION,
        longest_input as u64 + 50,
        environment.longest_value() as u64 + 50,
        u64::from(settings.decimal_places) + 50,
    ]
    .into_iter()
    .max()
    .unwrap_or(MIN_PRECISION);
    Ok(precision.min(MAX_PRECISION))
}

#[derive(Debug, Clone, Copy)]
pub struct Context<'a> {
    pub settings: &'a Settings,
    pub precision: u64,
}

impl<'a> Context<'a> {
    pub fn new(settings: &'a Settings, precision: u64) -> Self {
        Self { settings, precision }
    }

    pub fn bits(&self) -> BitEngine {
        self.settings.bit_engine()
    }
}

/// The unformatted outcome of evaluating a tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Raw {
    Number(BigDecimal),
    Bool(bool),
}

impl From<Raw> for Answer {
    fn from(raw: Raw) -> Self {
        match raw {
            Raw::Number(n) => Answer::Number(n),
            Raw::Bool(b) => Answer::Bool(b),
        }
    }
}

impl Expr {
    pub fn evaluate(&self, context: &Context) -> Result<Raw, MathError> {
        match self {
            Expr::Number { value, .. } => Ok(Raw::Number(value.clone())),
            Expr::Variable { var, span } => Err(MathError::solver(
                code::NON_LINEAR,
                format!("Variable '{var}' has no value to evaluate"),
            )
            .at(*span)),
            Expr::Binary { op: Op::Eq, lhs, rhs, .. } => {
                let lhs = lhs.evaluate_number(context)?;
                let rhs = rhs.evaluate_number(context)?;
                Ok(Raw::Bool(lhs == rhs))
            }
            Expr::Binary { op, lhs, rhs, span } => {
                let lhs = lhs.evaluate_number(context)?;
                let rhs = rhs.evaluate_number(context)?;
                apply(*op, &lhs, &rhs, *span, context).map(Raw::Number)
            }
        }
    }

    /// Evaluates a subtree that must produce a number.
    pub fn evaluate_number(&self, context: &Context) -> Result<BigDecimal, MathError> {
        match self.evaluate(context)? {
            Raw::Number(n) => Ok(n),
            Raw::Bool(_) => Err(MathError::calculation(
                code::EQUATION_IN_EVALUATOR,
                "An equation cannot be used as a number",
            )
            .at(self.span())),
        }
    }
}

/// Applies a binary operator to two numbers. `span` is the operator's.
pub(crate) fn apply(op: Op, lhs: &BigDecimal, rhs: &BigDecimal, span: Span, context: &Context) -> Result<BigDecimal, MathError> {
    let engine = context.bits();
    let result = match op {
        Op::Add => lhs + rhs,
        Op::Sub => lhs - rhs,
        Op::Mul => lhs * rhs,
        Op::Div => {
            if rhs.is_zero() {
                return Err(MathError::calculation(code::DIVISION_BY_ZERO, "Division by zero").at(span));
            }
            number::divide(lhs, rhs, context.precision)
        }
        Op::Pow => number::power(lhs, rhs, context.precision).map_err(|e| e.or_at(span))?,
        Op::Eq => {
            return Err(MathError::calculation(
                code::EQUATION_IN_EVALUATOR,
                "An equation cannot be used as a number",
            )
            .at(span));
        }
        Op::BitAnd => {
            let (a, b) = integers(op, lhs, rhs, span)?;
            number::from_integer(engine.and(&a, &b))
        }
        Op::BitOr => {
            let (a, b) = integers(op, lhs, rhs, span)?;
            number::from_integer(engine.or(&a, &b))
        }
        Op::BitXor => {
            let (a, b) = integers(op, lhs, rhs, span)?;
            number::from_integer(engine.xor(&a, &b))
        }
        Op::Shl => {
            let (a, b) = integers(op, lhs, rhs, span)?;
            number::from_integer(engine.shl(&a, &b).map_err(|e| e.or_at(span))?)
        }
        Op::Shr => {
            let (a, b) = integers(op, lhs, rhs, span)?;
            number::from_integer(engine.shr(&a, &b).map_err(|e| e.or_at(span))?)
        }
    };
    Ok(result)
}

fn integers(op: Op, lhs: &BigDecimal, rhs: &BigDecimal, span: Span) -> Result<(BigInt, BigInt), MathError> {
    match (number::integral(lhs), number::integral(rhs)) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(MathError::calculation(
            code::BIT_OPERATOR_INTEGERS,
            format!("Operator '{op}' requires integers"),
        )
        .at(span)),
    }
}
