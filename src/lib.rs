use std::collections::BTreeMap;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use log::debug;

pub mod bits;
pub mod error;
pub mod eval;
pub mod format;
pub mod lex;
pub mod memory;
pub mod number;
pub mod parse;
pub mod plugin;
pub mod settings;
pub mod solve;
pub mod system;

pub use error::{ErrorKind, MathError};
pub use format::{OutputFormat, Value};
pub use lex::{Lexer, Span, Token, TokenKind, tokenize};
pub use memory::Memory;
pub use parse::{Ast, Expr, Mode, Parser};
pub use plugin::{ArgType, FunctionRegistry, FunctionSignature, Plugin};
pub use settings::{SettingValue, Settings};

use error::code;
use eval::{Context, Environment};
use format::Answer;

/// Values bound to names for a single call.
pub type Bindings = BTreeMap<String, BigDecimal>;

/// A formatted result and whether rounding changed it.
#[derive(Debug, Clone, PartialEq)]
pub struct Calculation {
    pub value: Value,
    pub rounded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Validate,
    Calculate,
}

/// Settings, memory and registered functions shared by many calls.
#[derive(Debug, Clone, Default)]
pub struct Calculator {
    settings: Settings,
    memory: Memory,
    functions: FunctionRegistry,
}

impl Calculator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn register(&mut self, plugin: impl Plugin + 'static) -> Result<(), MathError> {
        self.functions.register(Arc::new(plugin))
    }

    pub fn evaluate(&self, expr: &str, bindings: &Bindings) -> Result<Value, MathError> {
        self.calculate(expr, bindings).map(|calculation| calculation.value)
    }

    pub fn calculate(&self, expr: &str, bindings: &Bindings) -> Result<Calculation, MathError> {
        self.run(expr, bindings, Stage::Calculate)?.ok_or_else(|| {
            MathError::syntax(code::EMPTY_INPUT, "Nothing was calculated").with_equation(expr)
        })
    }

    /// Checks that `expr` would parse, without evaluating it.
    pub fn validate(&self, expr: &str, bindings: &Bindings) -> Result<(), MathError> {
        self.run(expr, bindings, Stage::Validate).map(|_| ())
    }

    fn run(&self, input: &str, bindings: &Bindings, stage: Stage) -> Result<Option<Calculation>, MathError> {
        let (prefix, offset, expression) = OutputFormat::split_prefix(input);
        self.pipeline(prefix, expression, bindings, stage)
            .map_err(|error| error.located(offset, input))
    }

    fn pipeline(
        &self,
        prefix: Option<OutputFormat>,
        expression: &str,
        bindings: &Bindings,
        stage: Stage,
    ) -> Result<Option<Calculation>, MathError> {
        let settings = &self.settings;
        let environment = Environment::new(&self.memory, bindings);
        let precision = eval::working_precision(expression, &environment, settings)?;
        let context = Context::new(settings, precision);

        let tokens = tokenize(expression, &environment, settings, &self.functions)?;
        if settings.debug {
            debug!("working precision: {precision} digits");
            for token in &tokens.tokens {
                debug!("{token}");
            }
        }

        let ast = Parser::new(tokens, &self.functions, context).parse()?;
        let format = output_format(prefix, &ast, settings)?;
        let mode = ast.mode(settings)?;
        if settings.debug {
            debug!("tree: {}", ast.root);
            debug!("mode: {mode:?}, output: {format}");
        }
        if stage == Stage::Validate {
            return Ok(None);
        }

        let answer: Answer = match mode {
            Mode::Evaluate | Mode::Compare => ast.root.evaluate(&context)?.into(),
            Mode::Solve(var) => solve::solve(&ast.root, var, &context)?.into(),
        };
        let (value, rounded) = format::render(answer, format, settings)?;
        Ok(Some(Calculation { value, rounded }))
    }
}

/// Picks the output format from the prefix, `==`, an only-base mode or the
/// configured default, in that order of strength.
fn output_format(prefix: Option<OutputFormat>, ast: &Ast, settings: &Settings) -> Result<OutputFormat, MathError> {
    let format = match prefix {
        Some(format) if ast.expects_bool && format != OutputFormat::Bool => {
            if !settings.correct_output_format {
                return Err(MathError::syntax(
                    code::PREFIX_MISMATCH,
                    format!("The '{format}' prefix cannot show the result of '=='"),
                ));
            }
            OutputFormat::Bool
        }
        Some(format) => format,
        None if ast.expects_bool || ast.is_comparison() => OutputFormat::Bool,
        None => settings
            .only_radix()
            .map(OutputFormat::from)
            .unwrap_or(settings.default_output_format),
    };
    if ast.is_comparison() && !matches!(format, OutputFormat::Bool | OutputFormat::Str) {
        return Err(MathError::conversion_output(
            code::EQUALITY_FORMAT,
            format!("A comparison cannot be shown as {format}"),
        ));
    }
    Ok(format)
}

/// Evaluates `expr` with the built-in functions only.
pub fn evaluate(expr: &str, bindings: &Bindings, settings: &Settings) -> Result<Value, MathError> {
    Calculator::with_settings(settings.clone()).evaluate(expr, bindings)
}

/// Parses `expr` with the built-in functions only.
pub fn validate(expr: &str, bindings: &Bindings, settings: &Settings) -> Result<(), MathError> {
    Calculator::with_settings(settings.clone()).validate(expr, bindings)
}
