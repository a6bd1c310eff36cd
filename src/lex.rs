use std::fmt::Display;

use bigdecimal::BigDecimal;
use num_bigint::BigInt;

use crate::bits::Radix;
use crate::error::{MathError, code};
use crate::eval::Environment;
use crate::number;
use crate::plugin::{Function, FunctionRegistry};
use crate::settings::Settings;

/// Largest exponent a decimal literal may carry.
const MAX_LITERAL_EXPONENT: i64 = 20_000;

/// Inclusive range of character offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }

    pub fn at(position: usize) -> Self {
        Span::new(position, position)
    }

    pub fn to(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }

    pub fn shift(self, offset: usize) -> Span {
        Span::new(self.start + offset, self.end + offset)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token<'de> {
    pub kind: TokenKind,
    pub literal: &'de str,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    LeftParen,
    RightParen,
    Comma,
    Minus,
    Plus,
    Star,
    StarStar,
    Slash,
    Equal,
    Caret,
    Pipe,
    Ampersand,
    LessLess,
    GreaterGreater,
    Less,
    Greater,
    Number(BigDecimal),
    /// Canonical index of an unbound single-letter variable.
    Ident(usize),
    /// Index into the function registry.
    Function(usize),
}

impl TokenKind {
    pub fn is_operator(&self) -> bool {
        matches!(
            self,
            TokenKind::Minus
                | TokenKind::Plus
                | TokenKind::Star
                | TokenKind::StarStar
                | TokenKind::Slash
                | TokenKind::Equal
                | TokenKind::Caret
                | TokenKind::Pipe
                | TokenKind::Ampersand
                | TokenKind::LessLess
                | TokenKind::GreaterGreater
                | TokenKind::Less
                | TokenKind::Greater
        )
    }

    fn ends_operand(&self) -> bool {
        matches!(
            self,
            TokenKind::Number(_) | TokenKind::Ident(_) | TokenKind::RightParen
        )
    }

    fn starts_operand(&self) -> bool {
        matches!(
            self,
            TokenKind::Number(_) | TokenKind::Ident(_) | TokenKind::LeftParen | TokenKind::Function(_)
        )
    }
}

impl Display for Token<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lit = self.literal;
        match &self.kind {
            TokenKind::LeftParen => write!(f, "LEFT_PAREN {lit} null"),
            TokenKind::RightParen => write!(f, "RIGHT_PAREN {lit} null"),
            TokenKind::Comma => write!(f, "COMMA {lit} null"),
            TokenKind::Minus => write!(f, "MINUS {lit} null"),
            TokenKind::Plus => write!(f, "PLUS {lit} null"),
            TokenKind::Star => write!(f, "STAR {lit} null"),
            TokenKind::StarStar => write!(f, "STAR_STAR {lit} null"),
            TokenKind::Slash => write!(f, "SLASH {lit} null"),
            TokenKind::Equal => write!(f, "EQUAL {lit} null"),
            TokenKind::Caret => write!(f, "CARET {lit} null"),
            TokenKind::Pipe => write!(f, "PIPE {lit} null"),
            TokenKind::Ampersand => write!(f, "AMPERSAND {lit} null"),
            TokenKind::LessLess => write!(f, "LESS_LESS {lit} null"),
            TokenKind::GreaterGreater => write!(f, "GREATER_GREATER {lit} null"),
            TokenKind::Less => write!(f, "LESS {lit} null"),
            TokenKind::Greater => write!(f, "GREATER {lit} null"),
            TokenKind::Number(n) => write!(f, "NUMBER {lit} {}", number::plain_string(n)),
            TokenKind::Ident(index) => write!(f, "IDENTIFIER {lit} var{index}"),
            TokenKind::Function(_) => write!(f, "FUNCTION {lit} null"),
        }
    }
}

/// The token stream of one expression plus the names of its unknowns,
/// indexed by canonical variable number.
#[derive(Debug, Clone, PartialEq)]
pub struct Tokens<'de> {
    pub tokens: Vec<Token<'de>>,
    pub variables: Vec<&'de str>,
}

pub struct Lexer<'de, 'env> {
    whole: &'de str,
    rest: &'de str,
    pub byte: usize,
    position: usize,
    settings: &'env Settings,
    functions: &'env FunctionRegistry,
    environment: &'env Environment,
    separators: Vec<char>,
    variables: Vec<&'de str>,
    pending: Option<Token<'de>>,
}

impl<'de, 'env> Lexer<'de, 'env> {
    pub fn new(
        input: &'de str,
        environment: &'env Environment,
        settings: &'env Settings,
        functions: &'env FunctionRegistry,
    ) -> Self {
        Lexer {
            whole: input,
            rest: input,
            byte: 0,
            position: 0,
            settings,
            functions,
            environment,
            separators: functions.separators().collect(),
            variables: Vec::new(),
            pending: None,
        }
    }

    /// Names of the unknowns seen so far.
    pub fn variables(&self) -> &[&'de str] {
        &self.variables
    }

    fn advance(&mut self, len: usize) -> &'de str {
        let (taken, rest) = self.rest.split_at(len);
        self.rest = rest;
        self.byte += len;
        self.position += taken.chars().count();
        taken
    }

    fn token(&mut self, kind: TokenKind, len: usize) -> Token<'de> {
        let start = self.position;
        let literal = self.advance(len);
        Token {
            kind,
            literal,
            span: Span::new(start, self.position.saturating_sub(1).max(start)),
        }
    }

    /// Lexes a registered prefix at the cursor, if one matches.
    fn function(&mut self) -> Option<Result<Token<'de>, MathError>> {
        let functions = self.functions;
        let index = functions.match_prefix(self.rest)?;
        let entry = functions.entry(index)?;
        if self.settings.only_base() {
            return Some(Err(MathError::syntax(
                code::FUNCTION_IN_ONLY_BASE,
                format!("'{}' is not available in only-base mode", entry.name()),
            )
            .at_char(self.position)));
        }
        if let Function::Constant(value) = &entry.function {
            let value = value.clone();
            let len = entry.prefix.len();
            return Some(Ok(self.token(TokenKind::Number(value), len)));
        }
        let name_len = entry.name().len();
        let name = self.token(TokenKind::Function(index), name_len);
        self.pending = Some(self.token(TokenKind::LeftParen, 1));
        Some(Ok(name))
    }

    fn number(&mut self) -> Result<Token<'de>, MathError> {
        let mut chars = self.rest.chars();
        if let (Some('0'), Some(marker)) = (chars.next(), chars.next()) {
            if let Some(radix) = Radix::from_marker(marker) {
                return self.based_literal(radix);
            }
        }
        match self.settings.only_radix() {
            Some(radix) => self.digit_run(radix),
            None => self.decimal(),
        }
    }

    fn decimal(&mut self) -> Result<Token<'de>, MathError> {
        let start = self.position;
        let mut seen_dot = false;
        let mut seen_exponent = false;
        let mut previous = None;
        let mut count = 0;
        let mut len = 0;
        for c in self.rest.chars() {
            match c {
                '0'..='9' => {}
                '.' => {
                    if seen_dot || seen_exponent {
                        return Err(MathError::syntax(
                            code::DOUBLE_DECIMAL_POINT,
                            "Found two decimal separators in one number.",
                        )
                        .at_char(start + count));
                    }
                    seen_dot = true;
                }
                'e' | 'E' => {
                    if seen_exponent {
                        return Err(MathError::syntax(
                            code::DOUBLE_EXPONENT,
                            "Found two exponents in one number.",
                        )
                        .at_char(start + count));
                    }
                    seen_exponent = true;
                }
                '+' | '-' if matches!(previous, Some('e' | 'E')) => {}
                _ => break,
            }
            previous = Some(c);
            count += 1;
            len += c.len_utf8();
        }

        let literal = &self.rest[..len];
        if literal.ends_with(['e', 'E', '+', '-']) {
            return Err(MathError::syntax(
                code::MISSING_EXPONENT,
                format!("Missing digits after the exponent in '{literal}'"),
            )
            .at_char(start + count - 1));
        }
        let value = match number::parse_decimal(literal) {
            Some(value) if value.as_bigint_and_exponent().1.abs() <= MAX_LITERAL_EXPONENT => value,
            Some(_) | None if seen_exponent => {
                return Err(MathError::calculation(code::OVERFLOW, "Number too large to calculate.")
                    .at(Span::new(start, start + count - 1)));
            }
            _ => {
                return Err(MathError::syntax(
                    code::UNEXPECTED_TOKEN,
                    format!("Unexpected token: {literal}"),
                )
                .at_char(start));
            }
        };
        Ok(self.token(TokenKind::Number(value), len))
    }

    fn based_literal(&mut self, radix: Radix) -> Result<Token<'de>, MathError> {
        let start = self.position;
        if !self.settings.allow_non_decimal {
            return Err(MathError::conversion(
                code::NON_DECIMAL_DISABLED,
                "Non-decimal literals are disabled.",
            )
            .at_char(start));
        }
        let body = &self.rest[2..];
        let len = body
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(body.len());
        let value = self.digits(&body[..len], radix, start + 2)?;
        Ok(self.token(TokenKind::Number(value), 2 + len))
    }

    /// A plain digit run read in the radix an only-base mode forces.
    fn digit_run(&mut self, radix: Radix) -> Result<Token<'de>, MathError> {
        let start = self.position;
        let len = self
            .rest
            .find(|c: char| match radix {
                Radix::Hex => !c.is_ascii_hexdigit(),
                _ => !c.is_ascii_digit(),
            })
            .unwrap_or(self.rest.len());
        let run = &self.rest[..len];
        if self.rest[len..].starts_with('.') {
            return Err(MathError::conversion(
                code::INVALID_DIGIT,
                format!("Invalid digit '.' in base {}", radix.base()),
            )
            .at_char(start + run.chars().count()));
        }
        let value = self.digits(run, radix, start)?;
        Ok(self.token(TokenKind::Number(value), len))
    }

    fn digits(&self, digits: &str, radix: Radix, first: usize) -> Result<BigDecimal, MathError> {
        let invalid = |at: usize, what: String| {
            MathError::conversion(code::INVALID_DIGIT, what).at_char(at)
        };
        if let Some((offset, bad)) = digits
            .chars()
            .enumerate()
            .find(|(_, c)| !c.is_digit(radix.base()))
        {
            return Err(invalid(
                first + offset,
                format!("Invalid digit '{bad}' in base {}", radix.base()),
            ));
        }
        BigInt::parse_bytes(digits.as_bytes(), radix.base())
            .map(number::from_integer)
            .ok_or_else(|| invalid(first, format!("Missing digits after '{}'", radix.prefix())))
    }

    fn identifier(&mut self) -> Result<Token<'de>, MathError> {
        let start = self.position;
        let len = self
            .rest
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(self.rest.len());
        let name = &self.rest[..len];

        if let Some(function) = self.functions.shadowed_name(name) {
            return Err(MathError::syntax(
                code::MISSING_CALL_PARENTHESIS,
                format!("Missing opening parenthesis after function {function}"),
            )
            .at_char(start + function.chars().count() - 1));
        }
        if let Some(value) = self.environment.get(name) {
            let value = value.clone();
            return Ok(self.token(TokenKind::Number(value), len));
        }
        let chars = name.chars().count();
        if chars > 1 {
            return Err(MathError::syntax(
                code::UNKNOWN_IDENTIFIER,
                format!("Unknown function or variable too long: '{name}'"),
            )
            .at(Span::new(start, start + chars - 1)));
        }
        let index = match self.variables.iter().position(|known| *known == name) {
            Some(index) => index,
            None => {
                self.variables.push(name);
                self.variables.len() - 1
            }
        };
        Ok(self.token(TokenKind::Ident(index), len))
    }

    fn shift(&mut self, c: char) -> Result<Token<'de>, MathError> {
        let next = self.rest[1..].chars().next();
        match (c, next) {
            ('<', Some('<')) => Ok(self.token(TokenKind::LessLess, 2)),
            ('>', Some('>')) => Ok(self.token(TokenKind::GreaterGreater, 2)),
            ('<', Some('>')) | ('>', Some('<')) => Err(MathError::syntax(
                code::INVALID_SHIFT,
                format!("Invalid shift operator '{c}{}'", next.unwrap_or_default()),
            )
            .at(Span::new(self.position, self.position + 1))),
            ('<', _) => Ok(self.token(TokenKind::Less, 1)),
            _ => Ok(self.token(TokenKind::Greater, 1)),
        }
    }
}

impl<'de> Iterator for Lexer<'de, '_> {
    type Item = Result<Token<'de>, MathError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(pending) = self.pending.take() {
            return Some(Ok(pending));
        }
        loop {
            let c = self.rest.chars().next()?;
            if c.is_whitespace() {
                self.advance(c.len_utf8());
                continue;
            }
            if let Some(function) = self.function() {
                return Some(function);
            }

            enum Start {
                Number,
                HexRun,
                Ident,
                Shift,
            }

            let single = match c {
                '(' => Some(TokenKind::LeftParen),
                ')' => Some(TokenKind::RightParen),
                ',' => Some(TokenKind::Comma),
                '-' => Some(TokenKind::Minus),
                '+' => Some(TokenKind::Plus),
                '/' => Some(TokenKind::Slash),
                '=' | '≈' => Some(TokenKind::Equal),
                '^' => Some(TokenKind::Caret),
                '|' => Some(TokenKind::Pipe),
                '&' => Some(TokenKind::Ampersand),
                '*' if self.rest[1..].starts_with('*') => {
                    return Some(Ok(self.token(TokenKind::StarStar, 2)));
                }
                '*' => Some(TokenKind::Star),
                c if self.separators.contains(&c) => Some(TokenKind::Comma),
                _ => None,
            };
            if let Some(kind) = single {
                return Some(Ok(self.token(kind, c.len_utf8())));
            }

            let started = match c {
                '0'..='9' | '.' => Start::Number,
                '<' | '>' => Start::Shift,
                c if self.settings.only_hex && c.is_ascii_hexdigit() => Start::HexRun,
                c if c.is_alphanumeric() || c == '_' => Start::Ident,
                c => {
                    return Some(Err(MathError::syntax(
                        code::UNEXPECTED_TOKEN,
                        format!("Unexpected token: {c}"),
                    )
                    .at_char(self.position)));
                }
            };

            return Some(match started {
                Start::Number if c == '.' => self.decimal(),
                Start::Number => self.number(),
                Start::HexRun => self.digit_run(Radix::Hex),
                Start::Ident => self.identifier(),
                Start::Shift => self.shift(c),
            });
        }
    }
}

/// Tokenizes `input` and inserts the implicit `*` between adjacent
/// operands, as in `2x` or `(1)(2)`.
pub fn tokenize<'de>(
    input: &'de str,
    environment: &Environment,
    settings: &Settings,
    functions: &FunctionRegistry,
) -> Result<Tokens<'de>, MathError> {
    let mut lexer = Lexer::new(input, environment, settings, functions);
    let tokens = lexer.by_ref().collect::<Result<Vec<_>, _>>()?;
    debug_assert_eq!(lexer.byte, lexer.whole.len());

    let mut out = Vec::with_capacity(tokens.len());
    let mut tokens = tokens.into_iter().peekable();
    while let Some(token) = tokens.next() {
        let implicit = tokens
            .peek()
            .filter(|next| token.kind.ends_operand() && next.kind.starts_operand())
            .map(|next| Span::at(next.span.start));
        out.push(token);
        if let Some(span) = implicit {
            out.push(Token {
                kind: TokenKind::Star,
                literal: "*",
                span,
            });
        }
    }
    Ok(Tokens {
        tokens: out,
        variables: lexer.variables,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Memory;
    use crate::Bindings;

    fn lex(input: &str) -> Result<Tokens<'_>, MathError> {
        lex_with(input, &Settings::default(), &Bindings::new())
    }

    fn lex_with<'de>(input: &'de str, settings: &Settings, bindings: &Bindings) -> Result<Tokens<'de>, MathError> {
        let environment = Environment::new(&Memory::default(), bindings);
        tokenize(input, &environment, settings, &FunctionRegistry::builtin())
    }

    fn kinds(input: &str) -> Vec<TokenKind> {
        lex(input).unwrap().tokens.into_iter().map(|t| t.kind).collect()
    }

    fn number(text: &str) -> TokenKind {
        TokenKind::Number(number::parse_decimal(text).unwrap())
    }

    fn error_at(input: &str) -> (&'static str, Option<usize>) {
        let error = lex(input).unwrap_err();
        (error.code, error.position_start())
    }

    #[test]
    fn operators_and_numbers() {
        assert_eq!(
            kinds("1.5 ** 2 << 3"),
            vec![number("1.5"), TokenKind::StarStar, number("2"), TokenKind::LessLess, number("3")]
        );
        assert_eq!(kinds("2 ≈ 2"), vec![number("2"), TokenKind::Equal, number("2")]);
    }

    #[test]
    fn spans_count_characters() {
        let tokens = lex("√(4) + 10").unwrap().tokens;
        assert_eq!(tokens[0].span, Span::at(0));
        assert_eq!(tokens[1].span, Span::at(1));
        assert_eq!(tokens[5].span, Span::new(7, 8));
    }

    #[test]
    fn implicit_multiplication() {
        assert_eq!(
            kinds("2x"),
            vec![number("2"), TokenKind::Star, TokenKind::Ident(0)]
        );
        assert_eq!(
            kinds("(1)(2)"),
            vec![
                TokenKind::LeftParen,
                number("1"),
                TokenKind::RightParen,
                TokenKind::Star,
                TokenKind::LeftParen,
                number("2"),
                TokenKind::RightParen,
            ]
        );
        let tokens = lex("2sin(0)").unwrap().tokens;
        assert_eq!(tokens[1].kind, TokenKind::Star);
        assert!(matches!(tokens[2].kind, TokenKind::Function(_)));
    }

    #[test]
    fn variables_get_canonical_indices() {
        let tokens = lex("y + x + y").unwrap();
        assert_eq!(tokens.variables, vec!["y", "x"]);
        assert_eq!(tokens.tokens[4].kind, TokenKind::Ident(0));
    }

    #[test]
    fn bound_names_become_numbers() {
        let mut bindings = Bindings::new();
        bindings.insert("LEVEL".to_string(), BigDecimal::from(5));
        let tokens = lex_with("LEVEL+3", &Settings::default(), &bindings).unwrap();
        assert_eq!(tokens.tokens[0].kind, number("5"));
        assert!(tokens.variables.is_empty());
    }

    #[test]
    fn based_literals() {
        assert_eq!(kinds("0xFF"), vec![number("255")]);
        assert_eq!(kinds("0b101"), vec![number("5")]);
        assert_eq!(kinds("0o17"), vec![number("15")]);
        assert_eq!(error_at("0xZZ"), (code::INVALID_DIGIT, Some(2)));

        let mut settings = Settings::default();
        settings.allow_non_decimal = false;
        let error = lex_with("0x1", &settings, &Bindings::new()).unwrap_err();
        assert_eq!(error.code, code::NON_DECIMAL_DISABLED);
    }

    #[test]
    fn only_hex_reads_plain_runs_as_hex() {
        let mut settings = Settings::default();
        settings.set("only_hex", true).unwrap();
        let tokens = lex_with("FF+10", &settings, &Bindings::new()).unwrap().tokens;
        assert_eq!(tokens[0].kind, number("255"));
        assert_eq!(tokens[2].kind, number("16"));

        let error = lex_with("sin(1)", &settings, &Bindings::new()).unwrap_err();
        assert_eq!(error.code, code::FUNCTION_IN_ONLY_BASE);
    }

    #[test]
    fn number_errors() {
        assert_eq!(error_at("1.2.3"), (code::DOUBLE_DECIMAL_POINT, Some(3)));
        assert_eq!(error_at("1e2e3"), (code::DOUBLE_EXPONENT, Some(3)));
        assert_eq!(error_at("1.5e   "), (code::MISSING_EXPONENT, Some(3)));
        assert_eq!(error_at("1e+"), (code::MISSING_EXPONENT, Some(2)));
    }

    #[test]
    fn identifier_errors() {
        assert_eq!(error_at("sin 5"), (code::MISSING_CALL_PARENTHESIS, Some(2)));
        assert_eq!(error_at("meine_variable + 1"), (code::UNKNOWN_IDENTIFIER, Some(0)));
        assert_eq!(error_at("1 + $ 2"), (code::UNEXPECTED_TOKEN, Some(4)));
        assert_eq!(error_at("1 >< 2"), (code::INVALID_SHIFT, Some(2)));
    }

    #[test]
    fn function_tokens_carry_their_parenthesis() {
        let tokens = lex("shl(1, 2)").unwrap().tokens;
        assert_eq!(tokens[0].literal, "shl");
        assert_eq!(tokens[0].span, Span::new(0, 2));
        assert_eq!(tokens[1].kind, TokenKind::LeftParen);
        assert_eq!(tokens[1].span, Span::at(3));
        assert_eq!(kinds("pi")[0], TokenKind::Number(crate::system::pi()));
    }
}
