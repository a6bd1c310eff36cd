//! Solving linear equations in one unknown.
//!
//! Each side of the equation is collected into `factor * x + constant`; the
//! two forms are then compared.

use bigdecimal::BigDecimal;
use num_traits::{One, Zero};

use crate::error::{MathError, code};
use crate::eval::{self, Context};
use crate::format::Answer;
use crate::number;
use crate::parse::{Expr, Op, Var};

/// `factor * x + constant`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearForm {
    pub factor: BigDecimal,
    pub constant: BigDecimal,
}

impl LinearForm {
    fn constant(constant: BigDecimal) -> Self {
        Self {
            factor: BigDecimal::zero(),
            constant,
        }
    }

    fn unknown() -> Self {
        Self {
            factor: BigDecimal::one(),
            constant: BigDecimal::zero(),
        }
    }

    pub fn is_constant(&self) -> bool {
        self.factor.is_zero()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Solution {
    Value(BigDecimal),
    Infinite,
    None,
}

impl From<Solution> for Answer {
    fn from(solution: Solution) -> Self {
        match solution {
            Solution::Value(n) => Answer::Number(n),
            Solution::Infinite => Answer::Infinite,
            Solution::None => Answer::NoSolution,
        }
    }
}

impl Expr {
    pub fn collect_term(&self, var: Var, context: &Context) -> Result<LinearForm, MathError> {
        let (op, lhs, rhs, span) = match self {
            Expr::Number { value, .. } => return Ok(LinearForm::constant(value.clone())),
            Expr::Variable { var: found, .. } if *found == var => return Ok(LinearForm::unknown()),
            Expr::Variable { var: found, span } => {
                return Err(MathError::solver(
                    code::MULTIPLE_VARIABLES,
                    format!("Multiple variables found: {found} next to {var}"),
                )
                .at(*span));
            }
            Expr::Binary { op, lhs, rhs, span } => (*op, lhs, rhs, *span),
        };

        if op == Op::Eq {
            return Err(MathError::solver(
                code::EQUAL_INSIDE_TERM,
                "'=' cannot appear inside a term",
            )
            .at(span));
        }
        if op == Op::Pow {
            return Err(MathError::solver(
                code::POWER_IN_SOLVER,
                "Powers of the unknown are not supported",
            )
            .at(span));
        }

        let lhs = lhs.collect_term(var, context)?;
        let rhs = rhs.collect_term(var, context)?;
        let form = match op {
            Op::Add => LinearForm {
                factor: lhs.factor + rhs.factor,
                constant: lhs.constant + rhs.constant,
            },
            Op::Sub => LinearForm {
                factor: lhs.factor - rhs.factor,
                constant: lhs.constant - rhs.constant,
            },
            Op::Mul => {
                if !lhs.is_constant() && !rhs.is_constant() {
                    return Err(MathError::solver(
                        code::NON_LINEAR,
                        "Non-linear equation: the unknown is multiplied by itself",
                    )
                    .at(span));
                }
                let (scale, form) = if lhs.is_constant() { (lhs.constant, rhs) } else { (rhs.constant, lhs) };
                LinearForm {
                    factor: &form.factor * &scale,
                    constant: &form.constant * &scale,
                }
            }
            Op::Div => {
                if !rhs.is_constant() {
                    return Err(MathError::solver(
                        code::DIVISION_BY_VARIABLE,
                        "Division by the unknown is not supported",
                    )
                    .at(span));
                }
                if rhs.constant.is_zero() {
                    return Err(MathError::solver(code::DIVISION_BY_ZERO, "Solver: Division by zero").at(span));
                }
                LinearForm {
                    factor: number::divide(&lhs.factor, &rhs.constant, context.precision),
                    constant: number::divide(&lhs.constant, &rhs.constant, context.precision),
                }
            }
            op if lhs.is_constant() && rhs.is_constant() => {
                LinearForm::constant(eval::apply(op, &lhs.constant, &rhs.constant, span, context)?)
            }
            op => {
                return Err(MathError::solver(
                    code::UNKNOWN_OPERATOR,
                    format!("Operator '{op}' cannot be applied to the unknown"),
                )
                .at(span));
            }
        };
        Ok(form)
    }
}

/// Solves `root`, which must be an equation, for `var`.
pub fn solve(root: &Expr, var: Var, context: &Context) -> Result<Solution, MathError> {
    let Expr::Binary { op: Op::Eq, lhs, rhs, .. } = root else {
        return Err(MathError::solver(code::UNEXPECTED_TOKEN, "Nothing to solve without '='"));
    };
    let left = lhs.collect_term(var, context)?;
    let right = rhs.collect_term(var, context)?;
    let denominator = left.factor - right.factor;
    let numerator = right.constant - left.constant;
    if denominator.is_zero() {
        return Ok(if numerator.is_zero() { Solution::Infinite } else { Solution::None });
    }
    Ok(Solution::Value(number::divide(&numerator, &denominator, context.precision)))
}
