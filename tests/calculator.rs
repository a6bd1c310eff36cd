use bigdecimal::BigDecimal;
use decicalc::error::code;
use decicalc::{
    ArgType, Bindings, Calculator, ErrorKind, FunctionSignature, MathError, Plugin, Settings, Value,
    evaluate, validate,
};
use num_bigint::BigInt;
use num_traits::Zero;

fn dec(text: &str) -> BigDecimal {
    decicalc::number::parse_signed(text).unwrap()
}

fn eval(input: &str) -> Value {
    evaluate(input, &Bindings::new(), &Settings::default()).unwrap()
}

fn eval_with(input: &str, settings: &Settings) -> Value {
    evaluate(input, &Bindings::new(), settings).unwrap()
}

fn fail(input: &str) -> MathError {
    evaluate(input, &Bindings::new(), &Settings::default()).unwrap_err()
}

fn fail_at(input: &str) -> (&'static str, Option<usize>) {
    let error = fail(input);
    (error.code, error.position_start())
}

fn word(size: i64, signed: bool) -> Settings {
    let mut settings = Settings::default();
    settings.set("word_size", size).unwrap();
    settings.set("signed_mode", signed).unwrap();
    settings
}

#[test]
fn precedence() {
    assert_eq!(eval("3 | 2 * 2 ** 3 + 1"), Value::Decimal(dec("19")));
    assert_eq!(eval("2**2**3"), Value::Decimal(dec("256")));
    assert_eq!(eval("2(3 + 4)"), Value::Decimal(dec("14")));
    assert_eq!(eval("-3 + 5"), Value::Decimal(dec("2")));
}

#[test]
fn fractional_powers_match_square_roots() {
    let mut settings = Settings::default();
    settings.set("decimal_places", 30).unwrap();
    let power = eval_with("2 ** 0.5", &settings);
    assert_eq!(power, eval_with("sqrt(2)", &settings));
    assert_eq!(power, Value::Decimal(dec("1.414213562373095048801688724210")));
}

#[test]
fn long_results_follow_decimal_places() {
    let mut settings = Settings::default();
    settings.set("decimal_places", 150).unwrap();
    let Value::Decimal(root) = eval_with("sqrt(2)", &settings) else {
        panic!("expected a decimal");
    };
    assert!(!decicalc::number::plain_string(&root).ends_with("0000000000"));
}

#[test]
fn powers_with_huge_results_overflow() {
    assert_eq!(fail("(10**100000)**100000").code, code::OVERFLOW);
    assert_eq!(fail("10 ** 2000000.5").code, code::OVERFLOW);
}

#[test]
fn based_output_reads_back() {
    for signed in [true, false] {
        let settings = word(8, signed);
        for value in ["-128", "-1", "0", "5", "127"] {
            let expected = eval_with(value, &settings);
            for prefix in ["hex:", "bin:", "oct:"] {
                let Value::Str(numeral) = eval_with(&format!("{prefix}{value}"), &settings) else {
                    panic!("{prefix}{value} did not render as a numeral");
                };
                assert_eq!(eval_with(&numeral, &settings), expected, "{prefix}{value} -> {numeral}");
            }
        }
    }
}

#[test]
fn based_literals_and_outputs() {
    assert_eq!(eval("0xA+1"), Value::Decimal(dec("11")));
    assert_eq!(eval("0b11+1"), Value::Decimal(dec("4")));
    assert_eq!(eval("0o10+1"), Value::Decimal(dec("9")));
    assert_eq!(eval("hex:3+3"), Value::Str("0x6".into()));
    assert_eq!(eval("hex: 0xFF + 0b10 - 10"), Value::Str("0xf7".into()));
    assert_eq!(eval("bin:5"), Value::Str("0b101".into()));
}

#[test]
fn only_hex_mode() {
    let mut settings = Settings::default();
    settings.set("only_hex", true).unwrap();
    assert_eq!(eval_with("FF+3", &settings), Value::Str("0x102".into()));
    assert_eq!(eval_with("d:10+1", &settings), Value::Decimal(dec("17")));

    let error = evaluate("sin(1)", &Bindings::new(), &settings).unwrap_err();
    assert_eq!(error.code, code::FUNCTION_IN_ONLY_BASE);
}

#[test]
fn word_size_wraps_results() {
    assert_eq!(eval_with("127+1", &word(8, true)), Value::Decimal(dec("-128")));
    assert_eq!(eval_with("5-10", &word(8, false)), Value::Decimal(dec("251")));
    assert_eq!(eval_with("1<<16", &word(16, false)), Value::Decimal(dec("0")));
    assert_eq!(eval_with("hex:-1", &word(8, false)), Value::Str("0xff".into()));
}

#[test]
fn division_rounds_to_decimal_places() {
    let calculator = Calculator::new();
    let third = calculator.calculate("1/3", &Bindings::new()).unwrap();
    assert_eq!(third.value, Value::Decimal(dec("0.33")));
    assert!(third.rounded);

    let half = calculator.calculate("1/2", &Bindings::new()).unwrap();
    assert_eq!(half.value.to_string(), "0.50");
    assert!(!half.rounded);
}

#[test]
fn output_prefixes() {
    assert_eq!(eval("int:6/2"), Value::Int(BigInt::from(3)));
    assert_eq!(eval("str:1+1"), Value::Str("2".into()));
    assert_eq!(eval("f:1/4"), Value::Float(0.25));
    assert_eq!(fail("int:1/4").code, code::NOT_AN_INTEGER);
}

#[test]
fn fractions() {
    let mut settings = Settings::default();
    settings.set("fractions", true).unwrap();
    assert_eq!(eval_with("7/2", &settings), Value::Str("3 1/2".into()));
    assert_eq!(eval_with("1/4", &settings), Value::Str("1/4".into()));
    assert_eq!(eval_with("6/3", &settings), Value::Decimal(dec("2")));
}

#[test]
fn comparisons() {
    assert_eq!(eval("2=2"), Value::Bool(true));
    assert_eq!(eval("1+1 == 3").to_string(), "False");
    assert_eq!(fail("int:2=2").code, code::EQUALITY_FORMAT);
    assert_eq!(eval("int:2==2"), Value::Bool(true));

    let mut settings = Settings::default();
    settings.set("correct_output_format", false).unwrap();
    let error = evaluate("int:2==2", &Bindings::new(), &settings).unwrap_err();
    assert_eq!(error.code, code::PREFIX_MISMATCH);
}

#[test]
fn augmented_assignment() {
    assert_eq!(eval("5 += 2"), Value::Decimal(dec("7")));
    assert_eq!(eval("10 -= 2 + 3"), Value::Decimal(dec("5")));
    assert_eq!(fail("x += 5").code, code::AUGMENTED_WITH_VARIABLES);
}

#[test]
fn solving() {
    assert_eq!(eval("2x = 10"), Value::Decimal(dec("5")));
    assert_eq!(eval("x + 3 = 0"), Value::Decimal(dec("-3")));
    assert_eq!(eval("x/2 = 4"), Value::Decimal(dec("8")));
    assert_eq!(eval("x = x + 1"), Value::Str("No Solution".into()));
    assert_eq!(eval("2x = x + x"), Value::Str("Inf. Solutions".into()));

    assert_eq!(fail("x/0=3").code, code::DIVISION_BY_ZERO);
    assert_eq!(fail("x/0=3").kind, ErrorKind::Solver);
    assert_eq!(fail("x*x=4").code, code::NON_LINEAR);
    assert_eq!(fail("1/x=2").code, code::DIVISION_BY_VARIABLE);
    assert_eq!(fail("x + 1").code, code::UNEXPECTED_TOKEN);
}

#[test]
fn error_positions() {
    assert_eq!(fail_at("(1+2"), (code::MISSING_PARENTHESIS, Some(0)));
    assert_eq!(fail_at("10 / 0"), (code::DIVISION_BY_ZERO, Some(3)));
    assert_eq!(fail_at("setbit(1.5, 1)"), (code::BIT_FUNCTION_INTEGERS, Some(0)));
    assert_eq!(fail_at("bitnot(5, 2)"), (code::ARGUMENT_COUNT, Some(8)));
    assert_eq!(fail_at(""), (code::EMPTY_INPUT, None));
    assert_eq!(fail_at("* 5"), (code::MISSING_NUMBER_BEFORE, Some(0)));
    assert_eq!(fail_at("5 +"), (code::MISSING_NUMBER_AFTER, Some(2)));
    assert_eq!(fail_at("x = 5 = 6"), (code::MULTIPLE_EQUAL_SIGNS, Some(6)));
    assert_eq!(fail_at("abc + 1"), (code::UNKNOWN_IDENTIFIER, Some(0)));
}

#[test]
fn prefix_counts_toward_positions() {
    let error = fail("hex:(1+2");
    assert_eq!(error.position_start(), Some(4));
    assert_eq!(error.equation.as_deref(), Some("hex:(1+2"));
}

#[test]
fn trailing_parentheses_are_ignored() {
    assert_eq!(eval("1+2)"), Value::Decimal(dec("3")));
    assert_eq!(eval("(1+2))"), Value::Decimal(dec("3")));
}

#[test]
fn division_by_zero_is_fatal_everywhere() {
    for input in ["1/0", "(2+3)/(1-1)", "5 + 4/0 * 2", "2 ** (1/0)"] {
        assert_eq!(fail(input).code, code::DIVISION_BY_ZERO, "{input}");
    }
}

#[test]
fn repeated_calls_are_deterministic() {
    let calculator = Calculator::new();
    let first = calculator.evaluate("2 ** 100 / 7", &Bindings::new()).unwrap();
    for _ in 0..3 {
        assert_eq!(calculator.evaluate("2 ** 100 / 7", &Bindings::new()).unwrap(), first);
    }
}

#[test]
fn memory_sits_under_bindings() {
    let mut calculator = Calculator::new();
    calculator.memory_mut().set("LEVEL", "5").unwrap();
    assert_eq!(calculator.evaluate("LEVEL + 1", &Bindings::new()).unwrap(), Value::Decimal(dec("6")));

    let mut bindings = Bindings::new();
    bindings.insert("LEVEL".into(), dec("8"));
    assert_eq!(calculator.evaluate("LEVEL", &bindings).unwrap(), Value::Decimal(dec("8")));
    assert_eq!(calculator.memory().get("LEVEL"), Some(&dec("5")));
}

#[test]
fn validation_does_not_evaluate() {
    let settings = Settings::default();
    assert!(validate("1/0", &Bindings::new(), &settings).is_ok());
    assert!(validate("2x = 4", &Bindings::new(), &settings).is_ok());
    assert_eq!(
        validate("(1", &Bindings::new(), &settings).unwrap_err().code,
        code::MISSING_PARENTHESIS
    );
}

struct Gcd;

impl Plugin for Gcd {
    fn signature(&self) -> FunctionSignature {
        FunctionSignature::new("gcd", 2, ArgType::Int).separated_by(';')
    }

    fn execute(&self, args: &[Value]) -> Result<Value, MathError> {
        let [Value::Int(a), Value::Int(b)] = args else {
            return Err(MathError::plugin(code::PLUGIN_RESULT, "gcd expects two integers"));
        };
        let (mut a, mut b) = (a.clone(), b.clone());
        while !b.is_zero() {
            let r = &a % &b;
            a = b;
            b = r;
        }
        Ok(Value::Int(a))
    }
}

#[test]
fn registered_functions_fold_like_builtins() {
    let mut calculator = Calculator::new();
    calculator.register(Gcd).unwrap();
    assert_eq!(
        calculator.evaluate("gcd(12; 18) + 1", &Bindings::new()).unwrap(),
        Value::Decimal(dec("7"))
    );
    assert_eq!(
        calculator.evaluate("gcd(1.5; 3)", &Bindings::new()).unwrap_err().code,
        code::BIT_FUNCTION_INTEGERS
    );
    assert_eq!(calculator.register(Gcd).unwrap_err().code, code::PLUGIN_DUPLICATE);
}

#[test]
fn registered_functions_check_their_arity() {
    let mut calculator = Calculator::new();
    calculator.register(Gcd).unwrap();
    for input in ["gcd()", "gcd(12)", "gcd(12; 18; 4)"] {
        let error = calculator.evaluate(input, &Bindings::new()).unwrap_err();
        assert_eq!(error.code, code::ARGUMENT_COUNT, "{input}");
    }
}

#[test]
fn errors_render_through_miette() {
    use miette::Diagnostic;

    let error = fail("10 / 0");
    assert_eq!(
        Diagnostic::code(&error).map(|code| code.to_string()).as_deref(),
        Some("calculation error 3003")
    );
    assert!(error.source_code().is_some());
    assert_eq!(error.labels().map(Iterator::count), Some(1));
}
