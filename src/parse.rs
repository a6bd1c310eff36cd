use std::fmt;
use std::iter::Peekable;
use std::vec::IntoIter;

use bigdecimal::BigDecimal;
use num_traits::Zero;

use crate::error::{MathError, code};
use crate::eval::Context;
use crate::lex::{Span, Token, TokenKind, Tokens};
use crate::number;
use crate::plugin::{self, Function, FunctionRegistry};
use crate::settings::Settings;

/// A canonical unknown, numbered in order of first appearance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var(pub usize);

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "var{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Eq,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
            Op::Pow => "**",
            Op::Eq => "=",
            Op::BitAnd => "&",
            Op::BitOr => "|",
            Op::BitXor => "^",
            Op::Shl => "<<",
            Op::Shr => ">>",
        };
        write!(f, "{symbol}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number { value: BigDecimal, span: Span },
    Variable { var: Var, span: Span },
    /// `span` is the operator's.
    Binary {
        op: Op,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        span: Span,
    },
}

impl Expr {
    fn binary(op: Op, lhs: Expr, rhs: Expr, span: Span) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            span,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Expr::Number { span, .. } | Expr::Variable { span, .. } | Expr::Binary { span, .. } => *span,
        }
    }

    /// From the leftmost to the rightmost character of the subtree.
    pub fn extent(&self) -> Span {
        match self {
            Expr::Binary { lhs, rhs, .. } => lhs.extent().to(rhs.extent()),
            leaf => leaf.span(),
        }
    }

    pub fn has_variable(&self) -> bool {
        match self {
            Expr::Number { .. } => false,
            Expr::Variable { .. } => true,
            Expr::Binary { lhs, rhs, .. } => lhs.has_variable() || rhs.has_variable(),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number { value, .. } => write!(f, "{}", number::plain_string(value)),
            Expr::Variable { var, .. } => write!(f, "{var}"),
            Expr::Binary { op, lhs, rhs, .. } => write!(f, "({op} {lhs} {rhs})"),
        }
    }
}

/// How a parsed expression is turned into an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Evaluate,
    Compare,
    Solve(Var),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ast {
    pub root: Expr,
    /// Number of distinct unknowns.
    pub variables: usize,
    /// Set by `==`.
    pub expects_bool: bool,
}

impl Ast {
    pub fn is_equation(&self) -> bool {
        matches!(self.root, Expr::Binary { op: Op::Eq, .. })
    }

    pub fn is_comparison(&self) -> bool {
        self.is_equation() && self.variables == 0
    }

    pub fn mode(&self, settings: &Settings) -> Result<Mode, MathError> {
        match (self.is_equation(), self.variables) {
            (false, 0) => Ok(Mode::Evaluate),
            (true, 0) => Ok(Mode::Compare),
            _ if settings.only_base() => Err(MathError::syntax(
                code::VARIABLES_IN_ONLY_BASE,
                "Variables are not allowed while an only-base mode is active",
            )),
            (true, _) => Ok(Mode::Solve(Var(0))),
            (false, _) => Err(MathError::solver(
                code::UNEXPECTED_TOKEN,
                "Found a variable but no '=' to solve for it",
            )),
        }
    }
}

pub struct Parser<'de, 'ctx> {
    tokens: Peekable<IntoIter<Token<'de>>>,
    variables: usize,
    functions: &'ctx FunctionRegistry,
    context: Context<'ctx>,
}

impl<'de, 'ctx> Parser<'de, 'ctx> {
    pub fn new(tokens: Tokens<'de>, functions: &'ctx FunctionRegistry, context: Context<'ctx>) -> Self {
        Self {
            variables: tokens.variables.len(),
            tokens: tokens.tokens.into_iter().peekable(),
            functions,
            context,
        }
    }

    pub fn parse(mut self) -> Result<Ast, MathError> {
        let tokens: Vec<_> = self.tokens.by_ref().collect();
        let (tokens, expects_bool) = prepare(tokens, self.variables > 0, self.context.settings)?;
        self.tokens = tokens.into_iter().peekable();

        let root = self.parse_equation()?;
        for token in self.tokens.by_ref() {
            if token.kind != TokenKind::RightParen {
                return Err(unexpected(token.literal, token.span));
            }
        }
        Ok(Ast {
            root,
            variables: self.variables,
            expects_bool,
        })
    }

    fn parse_equation(&mut self) -> Result<Expr, MathError> {
        let lhs = self.parse_or()?;
        match self.tokens.next_if(|t| t.kind == TokenKind::Equal) {
            Some(equal) => {
                let rhs = self.parse_or()?;
                Ok(Expr::binary(Op::Eq, lhs, rhs, equal.span))
            }
            None => Ok(lhs),
        }
    }

    fn left_assoc(
        &mut self,
        operand: fn(&mut Self) -> Result<Expr, MathError>,
        operator: fn(&TokenKind) -> Option<Op>,
    ) -> Result<Expr, MathError> {
        let mut lhs = operand(self)?;
        while let Some(token) = self.tokens.next_if(|t| operator(&t.kind).is_some()) {
            let Some(op) = operator(&token.kind) else {
                break;
            };
            let rhs = operand(self)?;
            lhs = Expr::binary(op, lhs, rhs, token.span);
        }
        Ok(lhs)
    }

    fn parse_or(&mut self) -> Result<Expr, MathError> {
        self.left_assoc(Self::parse_xor, |kind| match kind {
            TokenKind::Pipe => Some(Op::BitOr),
            _ => None,
        })
    }

    fn parse_xor(&mut self) -> Result<Expr, MathError> {
        self.left_assoc(Self::parse_and, |kind| match kind {
            TokenKind::Caret => Some(Op::BitXor),
            _ => None,
        })
    }

    fn parse_and(&mut self) -> Result<Expr, MathError> {
        self.left_assoc(Self::parse_shift, |kind| match kind {
            TokenKind::Ampersand => Some(Op::BitAnd),
            _ => None,
        })
    }

    fn parse_shift(&mut self) -> Result<Expr, MathError> {
        self.left_assoc(Self::parse_sum, |kind| match kind {
            TokenKind::LessLess => Some(Op::Shl),
            TokenKind::GreaterGreater => Some(Op::Shr),
            _ => None,
        })
    }

    fn parse_sum(&mut self) -> Result<Expr, MathError> {
        self.left_assoc(Self::parse_term, |kind| match kind {
            TokenKind::Plus => Some(Op::Add),
            TokenKind::Minus => Some(Op::Sub),
            _ => None,
        })
    }

    fn parse_term(&mut self) -> Result<Expr, MathError> {
        self.left_assoc(Self::parse_unary, |kind| match kind {
            TokenKind::Star => Some(Op::Mul),
            TokenKind::Slash => Some(Op::Div),
            _ => None,
        })
    }

    fn parse_unary(&mut self) -> Result<Expr, MathError> {
        let Some(sign) = self
            .tokens
            .next_if(|t| matches!(t.kind, TokenKind::Plus | TokenKind::Minus))
        else {
            return self.parse_power();
        };
        let operand = self.parse_unary()?;
        if sign.kind == TokenKind::Plus {
            return Ok(operand);
        }
        Ok(match operand {
            Expr::Number { value, span } => Expr::Number {
                value: -value,
                span: sign.span.to(span),
            },
            operand => {
                let zero = Expr::Number {
                    value: BigDecimal::zero(),
                    span: sign.span,
                };
                Expr::binary(Op::Sub, zero, operand, sign.span)
            }
        })
    }

    /// `**` binds right to left and folds to a literal when neither side
    /// holds an unknown.
    fn parse_power(&mut self) -> Result<Expr, MathError> {
        let base = self.parse_factor()?;
        let Some(op) = self.tokens.next_if(|t| t.kind == TokenKind::StarStar) else {
            return Ok(base);
        };
        let exponent = self.parse_unary()?;
        if base.has_variable() || exponent.has_variable() {
            return Ok(Expr::binary(Op::Pow, base, exponent, op.span));
        }
        let span = base.extent().to(exponent.extent());
        let value = number::power(
            &base.evaluate_number(&self.context)?,
            &exponent.evaluate_number(&self.context)?,
            self.context.precision,
        )
        .map_err(|e| e.or_at(op.span))?;
        Ok(Expr::Number { value, span })
    }

    fn parse_factor(&mut self) -> Result<Expr, MathError> {
        let Some(token) = self.tokens.next() else {
            return Err(MathError::syntax(code::MISSING_NUMBER, "Missing number"));
        };
        match token.kind {
            TokenKind::LeftParen => {
                let inner = self.parse_or()?;
                self.expect_closing(token.span)?;
                Ok(inner)
            }
            TokenKind::Function(index) => self.call(index, token.literal, token.span),
            TokenKind::Number(value) => Ok(Expr::Number {
                value,
                span: token.span,
            }),
            TokenKind::Ident(index) => Ok(Expr::Variable {
                var: Var(index),
                span: token.span,
            }),
            _ => Err(unexpected(token.literal, token.span)),
        }
    }

    fn expect_closing(&mut self, open: Span) -> Result<Span, MathError> {
        match self.tokens.next_if(|t| t.kind == TokenKind::RightParen) {
            Some(close) => Ok(close.span),
            None => Err(MathError::syntax(
                code::MISSING_PARENTHESIS,
                "Missing closing parenthesis ')'",
            )
            .at_char(open.start)),
        }
    }

    /// Parses a call and folds it into a literal. Arguments are evaluated
    /// right away, so they cannot contain unknowns.
    fn call(&mut self, index: usize, name: &'de str, name_span: Span) -> Result<Expr, MathError> {
        let functions = self.functions;
        let Some(entry) = functions.entry(index) else {
            return Err(unexpected(name, name_span));
        };
        let Some(open) = self.tokens.next_if(|t| t.kind == TokenKind::LeftParen) else {
            return Err(MathError::syntax(
                code::MISSING_CALL_PARENTHESIS,
                format!("Missing '(' after '{name}'"),
            )
            .at_char(name_span.end));
        };

        let mut args = Vec::new();
        let mut commas = Vec::new();
        if self.tokens.peek().is_some_and(|t| t.kind != TokenKind::RightParen) {
            args.push(self.parse_or()?);
            while let Some(comma) = self.tokens.next_if(|t| t.kind == TokenKind::Comma) {
                commas.push(comma.span);
                args.push(self.parse_or()?);
            }
        }
        let close = self.expect_closing(open.span)?;

        let (min, max) = entry.function.arity();
        if args.len() > max {
            let at = commas.get(max.saturating_sub(1)).copied().unwrap_or(open.span);
            return Err(MathError::syntax(
                code::ARGUMENT_COUNT,
                format!("'{name}' takes at most {max} argument(s), got {}", args.len()),
            )
            .at(at));
        }
        if args.len() < min && matches!(entry.function, Function::Plugin(..)) {
            return Err(MathError::syntax(
                code::ARGUMENT_COUNT,
                format!("'{name}' takes {min} argument(s), got {}", args.len()),
            )
            .at(close));
        }
        if args.is_empty() && min > 0 {
            return Err(MathError::syntax(
                code::MISSING_NUMBER,
                format!("'{name}' is missing its argument"),
            )
            .at(close));
        }
        if args.len() < min {
            return Err(MathError::syntax(
                code::MISSING_PARENTHESIS,
                format!("Missing ',' between the arguments of '{name}'"),
            )
            .at(close));
        }

        let span = name_span.to(close);
        let values = args
            .iter()
            .map(|arg| arg.evaluate_number(&self.context))
            .collect::<Result<Vec<_>, _>>()?;
        let value = match &entry.function {
            Function::Scientific(scientific) => scientific.call(&self.context, &values),
            Function::Bit(bit) => self.context.bits().apply(*bit, &values),
            Function::Constant(value) => Ok(value.clone()),
            Function::Plugin(plugin, signature) => values
                .iter()
                .map(|value| signature.argument_type.convert(value))
                .collect::<Result<Vec<_>, _>>()
                .and_then(|converted| plugin.execute(&converted))
                .and_then(|result| plugin::fold_result(name, result)),
        }
        .map_err(|e| e.or_at(span))?;
        Ok(Expr::Number { value, span })
    }
}

fn unexpected(literal: &str, span: Span) -> MathError {
    MathError::syntax(code::UNEXPECTED_TOKEN, format!("Unexpected token: {literal}")).at(span)
}

/// Checks the token stream as a whole before descending, and rewrites
/// augmented assignments. Returns whether `==` asked for a boolean result.
fn prepare<'de>(
    mut tokens: Vec<Token<'de>>,
    has_variables: bool,
    settings: &Settings,
) -> Result<(Vec<Token<'de>>, bool), MathError> {
    let mut expects_bool = false;
    let mut previous = None;
    for (index, token) in tokens.iter().enumerate() {
        if token.kind != TokenKind::Equal {
            continue;
        }
        match previous {
            Some(p) if p + 1 == index => expects_bool = true,
            Some(_) => {
                return Err(MathError::syntax(
                    code::MULTIPLE_EQUAL_SIGNS,
                    "Only one '=' is allowed",
                )
                .at(token.span));
            }
            None => {}
        }
        previous = Some(index);
    }

    if tokens.is_empty() {
        return Err(MathError::syntax(code::EMPTY_INPUT, "Empty input"));
    }

    if expects_bool {
        if !settings.allow_augmented_assignment {
            if let Some(second) = tokens
                .windows(2)
                .find(|pair| pair[0].kind == TokenKind::Equal && pair[1].kind == TokenKind::Equal)
            {
                return Err(MathError::syntax(
                    code::MISSING_NUMBER_BEFORE,
                    "Missing number before '='",
                )
                .at(second[1].span));
            }
        }
        tokens.dedup_by(|later, earlier| later.kind == TokenKind::Equal && earlier.kind == TokenKind::Equal);
    }

    if !has_variables {
        while tokens.last().is_some_and(|t| t.kind == TokenKind::Equal) {
            tokens.pop();
        }
        let leading = tokens.iter().take_while(|t| t.kind == TokenKind::Equal).count();
        tokens.drain(..leading);
    }

    if let Some(first) = tokens.first() {
        if matches!(first.kind, TokenKind::Star | TokenKind::StarStar | TokenKind::Slash) {
            return Err(MathError::syntax(
                code::MISSING_NUMBER_BEFORE,
                format!("Missing number before '{}'", first.literal),
            )
            .at(first.span));
        }
    }

    let mut index = 0;
    while index + 1 < tokens.len() {
        let op = &tokens[index];
        let next = &tokens[index + 1];
        let assigns = op.kind.is_operator() && op.kind != TokenKind::Equal && next.kind == TokenKind::Equal;
        if assigns && !settings.allow_augmented_assignment {
            return Err(MathError::syntax(
                code::MISSING_NUMBER_BEFORE,
                "Missing number before '='",
            )
            .at(next.span));
        }
        if assigns && has_variables {
            return Err(MathError::syntax(
                code::AUGMENTED_WITH_VARIABLES,
                "Augmented assignment cannot be combined with variables",
            )
            .at(op.span));
        }
        if assigns {
            // `A op= B` becomes `A op (B)`.
            let equal = tokens[index + 1].span;
            tokens[index + 1] = Token {
                kind: TokenKind::LeftParen,
                literal: "(",
                span: equal,
            };
            let end = tokens.last().map_or(equal, |t| Span::at(t.span.end));
            tokens.push(Token {
                kind: TokenKind::RightParen,
                literal: ")",
                span: end,
            });
        } else if let Some(last) = tokens.last().filter(|t| t.kind.is_operator()) {
            return Err(MathError::syntax(
                code::MISSING_NUMBER_AFTER,
                format!("Missing number after '{}'", last.literal),
            )
            .at_char(last.span.end));
        }
        index += 1;
    }

    if has_variables {
        let edge = [tokens.first(), tokens.last()]
            .into_iter()
            .flatten()
            .find(|t| t.kind == TokenKind::Equal);
        if let Some(edge) = edge {
            return Err(MathError::syntax(
                code::EQUAL_AT_EDGE,
                "An equation needs a value on both sides of '='",
            )
            .at(edge.span));
        }
    }

    Ok((tokens, expects_bool))
}
