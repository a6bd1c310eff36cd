use std::fmt::{self, Display};

use miette::{Diagnostic, LabeledSpan, SourceCode};
use thiserror::Error;

use crate::lex::Span;

/// Stable error codes surfaced to callers.
pub mod code {
    pub const MULTIPLE_VARIABLES: &str = "3002";
    pub const DIVISION_BY_ZERO: &str = "3003";
    pub const UNKNOWN_OPERATOR: &str = "3004";
    pub const NON_LINEAR: &str = "3005";
    pub const DIVISION_BY_VARIABLE: &str = "3006";
    pub const POWER_IN_SOLVER: &str = "3007";
    pub const DOUBLE_DECIMAL_POINT: &str = "3008";
    pub const MISSING_PARENTHESIS: &str = "3009";
    pub const MISSING_CALL_PARENTHESIS: &str = "3010";
    pub const UNKNOWN_IDENTIFIER: &str = "3011";
    pub const UNEXPECTED_TOKEN: &str = "3012";
    pub const EQUATION_IN_EVALUATOR: &str = "3015";
    pub const FRACTION_FAILED: &str = "3024";
    pub const EQUAL_AT_EDGE: &str = "3025";
    pub const OVERFLOW: &str = "3026";
    pub const MISSING_NUMBER: &str = "3027";
    pub const MISSING_NUMBER_BEFORE: &str = "3028";
    pub const MISSING_NUMBER_AFTER: &str = "3029";
    pub const AUGMENTED_WITH_VARIABLES: &str = "3030";
    pub const DOUBLE_EXPONENT: &str = "3031";
    pub const MISSING_EXPONENT: &str = "3032";
    pub const FUNCTION_IN_ONLY_BASE: &str = "3033";
    pub const EMPTY_INPUT: &str = "3034";
    pub const NON_DECIMAL_DISABLED: &str = "3035";
    pub const MULTIPLE_EQUAL_SIGNS: &str = "3036";
    pub const PREFIX_MISMATCH: &str = "3037";
    pub const VARIABLES_IN_ONLY_BASE: &str = "3038";
    pub const INVALID_SHIFT: &str = "3040";
    pub const BIT_FUNCTION_INTEGERS: &str = "3041";
    pub const BIT_OPERATOR_INTEGERS: &str = "3042";
    pub const SCIENTIFIC_FUNCTION: &str = "3218";
    pub const EQUAL_INSIDE_TERM: &str = "3720";
    pub const UNKNOWN_MEMORY_ENTRY: &str = "4000";
    pub const SETTING_TYPE: &str = "5000";
    pub const SETTING_VALUE: &str = "5002";
    pub const PRESET_UNKNOWN: &str = "5003";
    pub const PRESET_MISSING: &str = "5004";
    pub const CONVERSION_FAILED: &str = "8003";
    pub const INVALID_DIGIT: &str = "8004";
    pub const NOT_AN_INTEGER: &str = "8005";
    pub const EQUALITY_FORMAT: &str = "8006";
    pub const BIT_INDEX: &str = "8007";
    pub const ARGUMENT_COUNT: &str = "8008";
    pub const PLUGIN_NAME: &str = "9003";
    pub const PLUGIN_SEPARATOR: &str = "9004";
    pub const PLUGIN_RESULT: &str = "9010";
    pub const PLUGIN_NAME_PAREN: &str = "9011";
    pub const PLUGIN_DUPLICATE: &str = "9012";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Syntax,
    Calculation,
    Solver,
    Conversion,
    ConversionOutput,
    Config,
    Plugin,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Syntax => write!(f, "syntax error"),
            ErrorKind::Calculation => write!(f, "calculation error"),
            ErrorKind::Solver => write!(f, "solver error"),
            ErrorKind::Conversion => write!(f, "conversion error"),
            ErrorKind::ConversionOutput => write!(f, "output conversion error"),
            ErrorKind::Config => write!(f, "configuration error"),
            ErrorKind::Plugin => write!(f, "plugin error"),
        }
    }
}

/// Every failure the engine reports.
///
/// The span indexes characters (not bytes) of the string handed to the
/// engine. `equation` is attached once, when the error leaves
/// [`Calculator`](crate::Calculator).
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct MathError {
    pub kind: ErrorKind,
    pub code: &'static str,
    pub message: String,
    pub span: Option<Span>,
    pub equation: Option<String>,
}

impl MathError {
    pub fn new(kind: ErrorKind, code: &'static str, message: impl Into<String>) -> Self {
        MathError {
            kind,
            code,
            message: message.into(),
            span: None,
            equation: None,
        }
    }

    pub fn syntax(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Syntax, code, message)
    }

    pub fn calculation(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Calculation, code, message)
    }

    pub fn solver(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Solver, code, message)
    }

    pub fn conversion(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conversion, code, message)
    }

    pub fn conversion_output(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConversionOutput, code, message)
    }

    pub fn config(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, code, message)
    }

    pub fn plugin(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Plugin, code, message)
    }

    pub fn at(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn at_char(self, position: usize) -> Self {
        self.at(Span::at(position))
    }

    /// Sets the span only when the error does not carry one yet.
    pub fn or_at(self, span: Span) -> Self {
        if self.span.is_some() { self } else { self.at(span) }
    }

    pub(crate) fn shifted(mut self, offset: usize) -> Self {
        self.span = self.span.map(|span| span.shift(offset));
        self
    }

    pub(crate) fn with_equation(mut self, equation: &str) -> Self {
        if self.equation.is_none() {
            self.equation = Some(equation.to_string());
        }
        self
    }

    /// Moves the span past `offset` leading characters and attaches the
    /// full input.
    pub fn located(self, offset: usize, input: &str) -> Self {
        self.shifted(offset).with_equation(input)
    }

    pub fn position_start(&self) -> Option<usize> {
        self.span.map(|span| span.start)
    }

    pub fn position_end(&self) -> Option<usize> {
        self.span.map(|span| span.end)
    }

    /// Byte range of the span inside the attached equation.
    fn byte_range(&self) -> Option<std::ops::Range<usize>> {
        let equation = self.equation.as_deref()?;
        let span = self.span?;
        let offset = |nth: usize| {
            equation
                .char_indices()
                .nth(nth)
                .map_or(equation.len(), |(byte, _)| byte)
        };
        let start = offset(span.start);
        let end = offset(span.end + 1).max(start);
        Some(start..end)
    }
}

impl Diagnostic for MathError {
    fn code<'a>(&'a self) -> Option<Box<dyn Display + 'a>> {
        Some(Box::new(format!("{} {}", self.kind, self.code)))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn Display + 'a>> {
        let help = match self.code {
            code::MISSING_PARENTHESIS => "close every `(` with a matching `)`",
            code::UNKNOWN_IDENTIFIER => "bind the name as a variable or use a single-letter unknown",
            code::MISSING_CALL_PARENTHESIS => "function names must be followed by `(`",
            code::BIT_FUNCTION_INTEGERS | code::BIT_OPERATOR_INTEGERS => {
                "bitwise operations only accept whole numbers"
            }
            _ => return None,
        };
        Some(Box::new(help))
    }

    fn source_code(&self) -> Option<&dyn SourceCode> {
        self.equation.as_ref().map(|source| source as &dyn SourceCode)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let range = self.byte_range()?;
        Some(Box::new(std::iter::once(LabeledSpan::at(range, "here"))))
    }
}
