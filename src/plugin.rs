//! The table of callable prefixes: built-in scientific and bit functions,
//! constants, and functions contributed through [`Plugin`].

use std::fmt;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use log::debug;
use num_traits::{One, Zero};

use crate::bits::BitFunction;
use crate::error::{MathError, code};
use crate::format::Value;
use crate::number;
use crate::system::{self, Scientific};

/// Characters a plugin may not use as its argument separator.
const RESERVED_SEPARATORS: &str = "()+-*/=^|&<>.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgType {
    Str,
    Decimal,
    Bool,
    Int,
    Float,
}

impl ArgType {
    /// Converts a folded argument into what the plugin asked for.
    pub fn convert(self, argument: &BigDecimal) -> Result<Value, MathError> {
        Ok(match self {
            ArgType::Decimal => Value::Decimal(argument.clone()),
            ArgType::Str => Value::Str(number::plain_string(argument)),
            ArgType::Bool => Value::Bool(!argument.is_zero()),
            ArgType::Int => Value::Int(number::integral(argument).ok_or_else(|| {
                MathError::calculation(
                    code::BIT_FUNCTION_INTEGERS,
                    format!("Expected an integer argument, got {}", number::plain_string(argument)),
                )
            })?),
            ArgType::Float => Value::Float(number::to_f64(argument).ok_or_else(|| {
                MathError::calculation(code::OVERFLOW, "Number too large to calculate.")
            })?),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSignature {
    pub name: String,
    pub arity: usize,
    pub argument_type: ArgType,
    pub separator: char,
}

impl FunctionSignature {
    pub fn new(name: impl Into<String>, arity: usize, argument_type: ArgType) -> Self {
        FunctionSignature {
            name: name.into(),
            arity,
            argument_type,
            separator: ',',
        }
    }

    pub fn separated_by(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }
}

/// An externally supplied function.
pub trait Plugin: Send + Sync {
    fn signature(&self) -> FunctionSignature;

    fn execute(&self, args: &[Value]) -> Result<Value, MathError>;
}

#[derive(Clone)]
pub enum Function {
    Scientific(Scientific),
    Bit(BitFunction),
    Constant(BigDecimal),
    Plugin(Arc<dyn Plugin>, FunctionSignature),
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Scientific(s) => f.debug_tuple("Scientific").field(s).finish(),
            Function::Bit(b) => f.debug_tuple("Bit").field(b).finish(),
            Function::Constant(c) => f.debug_tuple("Constant").field(c).finish(),
            Function::Plugin(_, signature) => f.debug_tuple("Plugin").field(signature).finish(),
        }
    }
}

impl Function {
    /// Smallest and largest accepted argument count.
    pub fn arity(&self) -> (usize, usize) {
        match self {
            Function::Scientific(s) => s.arity(),
            Function::Bit(b) => (b.arity(), b.arity()),
            Function::Constant(_) => (0, 0),
            Function::Plugin(_, signature) => (signature.arity, signature.arity),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FunctionEntry {
    pub prefix: String,
    pub function: Function,
}

impl FunctionEntry {
    fn new(prefix: impl Into<String>, function: Function) -> Self {
        FunctionEntry {
            prefix: prefix.into(),
            function,
        }
    }

    /// Whether the prefix opens an argument list.
    pub fn is_call(&self) -> bool {
        self.prefix.ends_with('(')
    }

    /// The prefix without its opening parenthesis.
    pub fn name(&self) -> &str {
        self.prefix.strip_suffix('(').unwrap_or(&self.prefix)
    }
}

/// Registered prefixes, longest first with ties in lexicographic order, so
/// the first match is always the longest one.
#[derive(Debug, Clone)]
pub struct FunctionRegistry {
    entries: Vec<FunctionEntry>,
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl FunctionRegistry {
    pub fn builtin() -> Self {
        let mut entries = Vec::new();
        for (prefix, scientific) in Scientific::PREFIXES {
            entries.push(FunctionEntry::new(prefix, Function::Scientific(scientific)));
        }
        for bit in BitFunction::ALL {
            entries.push(FunctionEntry::new(format!("{}(", bit.name()), Function::Bit(bit)));
        }
        for spelling in ["pi", "PI", "Pi", "π"] {
            entries.push(FunctionEntry::new(spelling, Function::Constant(system::pi())));
        }
        let mut registry = FunctionRegistry { entries };
        registry.sort();
        registry
    }

    fn sort(&mut self) {
        self.entries.sort_by(|a, b| {
            b.prefix
                .chars()
                .count()
                .cmp(&a.prefix.chars().count())
                .then_with(|| a.prefix.cmp(&b.prefix))
        });
    }

    pub fn entries(&self) -> &[FunctionEntry] {
        &self.entries
    }

    pub fn entry(&self, index: usize) -> Option<&FunctionEntry> {
        self.entries.get(index)
    }

    /// Index of the longest registered prefix `input` starts with.
    pub fn match_prefix(&self, input: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| input.starts_with(&entry.prefix))
    }

    /// The longest function name an identifier starts with. Such an
    /// identifier is a function name missing its `(`.
    pub fn shadowed_name(&self, identifier: &str) -> Option<&str> {
        self.entries
            .iter()
            .filter(|entry| entry.is_call())
            .map(FunctionEntry::name)
            .filter(|name| !name.is_empty() && identifier.starts_with(name))
            .max_by_key(|name| name.chars().count())
    }

    /// Separators other than `,` that plugins declared.
    pub fn separators(&self) -> impl Iterator<Item = char> + '_ {
        self.entries.iter().filter_map(|entry| match &entry.function {
            Function::Plugin(_, signature) if signature.separator != ',' => {
                Some(signature.separator)
            }
            _ => None,
        })
    }

    pub fn register(&mut self, plugin: Arc<dyn Plugin>) -> Result<(), MathError> {
        let signature = plugin.signature();
        let name = signature.name.trim();
        if name.ends_with(')') {
            return Err(MathError::plugin(
                code::PLUGIN_NAME_PAREN,
                format!("Function name '{name}' must not end with ')'"),
            ));
        }
        let bare = name.strip_suffix('(').unwrap_or(name);
        let malformed = bare.is_empty()
            || bare.starts_with(|c: char| c.is_ascii_digit())
            || bare.chars().any(|c| c.is_whitespace() || c == '(' || c == ')');
        if malformed {
            return Err(MathError::plugin(
                code::PLUGIN_NAME,
                format!("Invalid function name '{}'", signature.name),
            ));
        }

        let separator = signature.separator;
        if separator.is_alphanumeric() || separator.is_whitespace() || RESERVED_SEPARATORS.contains(separator) {
            return Err(MathError::plugin(
                code::PLUGIN_SEPARATOR,
                format!("'{separator}' cannot separate arguments"),
            ));
        }

        let prefix = format!("{bare}(");
        if self.entries.iter().any(|entry| entry.prefix == prefix) {
            return Err(MathError::plugin(
                code::PLUGIN_DUPLICATE,
                format!("A function named '{bare}' is already registered"),
            ));
        }

        debug!("registered function {prefix} with {} argument(s)", signature.arity);
        self.entries.push(FunctionEntry::new(prefix, Function::Plugin(plugin, signature)));
        self.sort();
        Ok(())
    }
}

/// Folds what a plugin returned into a number.
pub fn fold_result(name: &str, value: Value) -> Result<BigDecimal, MathError> {
    let not_numeric = |shown: &dyn fmt::Display| {
        MathError::plugin(
            code::PLUGIN_RESULT,
            format!("'{name}' returned a non-numeric value: {shown}"),
        )
    };
    match value {
        Value::Decimal(d) => Ok(d),
        Value::Int(i) => Ok(number::from_integer(i)),
        Value::Bool(b) => Ok(if b { BigDecimal::one() } else { BigDecimal::zero() }),
        Value::Float(f) => number::from_f64(f).ok_or_else(|| not_numeric(&f)),
        Value::Str(text) => number::parse_signed(&text).ok_or_else(|| not_numeric(&text)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Double;

    impl Plugin for Double {
        fn signature(&self) -> FunctionSignature {
            FunctionSignature::new("double", 1, ArgType::Decimal)
        }

        fn execute(&self, args: &[Value]) -> Result<Value, MathError> {
            match args {
                [Value::Decimal(d)] => Ok(Value::Decimal(d * BigDecimal::from(2))),
                _ => unreachable!(),
            }
        }
    }

    struct Named(&'static str, char);

    impl Plugin for Named {
        fn signature(&self) -> FunctionSignature {
            FunctionSignature::new(self.0, 2, ArgType::Int).separated_by(self.1)
        }

        fn execute(&self, _: &[Value]) -> Result<Value, MathError> {
            Ok(Value::Int(Default::default()))
        }
    }

    #[test]
    fn longest_prefix_wins() {
        let registry = FunctionRegistry::builtin();
        let index = registry.match_prefix("sqrt(4)").unwrap();
        assert_eq!(registry.entries()[index].prefix, "sqrt(");
        assert!(registry.match_prefix("x+1").is_none());
    }

    #[test]
    fn identifiers_starting_with_names_are_shadowed() {
        let registry = FunctionRegistry::builtin();
        assert_eq!(registry.shadowed_name("sin"), Some("sin"));
        assert_eq!(registry.shadowed_name("sqrtx"), Some("sqrt"));
        assert_eq!(registry.shadowed_name("s"), None);
    }

    #[test]
    fn registers_plugins_in_order() {
        let mut registry = FunctionRegistry::builtin();
        registry.register(Arc::new(Double)).unwrap();
        let index = registry.match_prefix("double(3)").unwrap();
        assert!(matches!(registry.entries()[index].function, Function::Plugin(..)));
        assert_eq!(
            registry.register(Arc::new(Double)).unwrap_err().code,
            code::PLUGIN_DUPLICATE
        );
    }

    #[test]
    fn rejects_bad_signatures() {
        let mut registry = FunctionRegistry::builtin();
        let reject = |registry: &mut FunctionRegistry, name, separator| {
            registry.register(Arc::new(Named(name, separator))).unwrap_err().code
        };
        assert_eq!(reject(&mut registry, "", ','), code::PLUGIN_NAME);
        assert_eq!(reject(&mut registry, "f()", ','), code::PLUGIN_NAME_PAREN);
        assert_eq!(reject(&mut registry, "f", '('), code::PLUGIN_SEPARATOR);
        assert_eq!(reject(&mut registry, "f", '+'), code::PLUGIN_SEPARATOR);
        assert_eq!(reject(&mut registry, "f", 'a'), code::PLUGIN_SEPARATOR);
        registry.register(Arc::new(Named("gcd", ';'))).unwrap();
        assert_eq!(registry.separators().collect::<Vec<_>>(), vec![';']);
    }

    #[test]
    fn folds_plugin_results() {
        assert_eq!(fold_result("f", Value::Bool(true)).unwrap(), BigDecimal::one());
        assert_eq!(
            fold_result("f", Value::Str("-2.5".into())).unwrap(),
            number::parse_decimal("2.5").map(|d| -d).unwrap()
        );
        assert_eq!(
            fold_result("f", Value::Str("abc".into())).unwrap_err().code,
            code::PLUGIN_RESULT
        );
    }
}
