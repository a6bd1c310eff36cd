use bigdecimal::BigDecimal;
use clap::Parser;
use clap::Subcommand;
use decicalc::eval::{Context, Environment};
use decicalc::{Bindings, Calculator, Memory, OutputFormat, SettingValue, Settings, number, tokenize};
use miette::WrapErr;

#[derive(Parser, Debug)]
#[command(version, about = "Arbitrary precision calculator and linear solver")]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the token stream of an expression.
    Tokenize { expr: String },
    /// Print the folded expression tree.
    Parse { expr: String },
    /// Evaluate an expression or solve an equation.
    Eval {
        expr: String,
        /// Bind a name, as `name=value`. Repeatable.
        #[arg(long = "var", value_parser = parse_binding)]
        vars: Vec<(String, BigDecimal)>,
        #[arg(long)]
        word_size: Option<i64>,
        #[arg(long)]
        signed: bool,
        #[arg(long)]
        decimal_places: Option<i64>,
        #[arg(long)]
        fractions: bool,
        #[arg(long)]
        only_hex: bool,
        #[arg(long)]
        only_binary: bool,
        #[arg(long)]
        only_octal: bool,
    },
}

fn parse_binding(text: &str) -> Result<(String, BigDecimal), String> {
    let (name, value) = text
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got `{text}`"))?;
    let value = number::parse_signed(value).ok_or_else(|| format!("`{value}` is not a number"))?;
    Ok((name.trim().to_string(), value))
}

fn main() -> miette::Result<()> {
    let args = Args::parse();

    match args.command {
        Commands::Tokenize { expr } => {
            let settings = Settings::default();
            let calculator = Calculator::with_settings(settings.clone());
            let environment = Environment::new(&Memory::default(), &Bindings::new());
            let (_, offset, expression) = OutputFormat::split_prefix(&expr);
            let tokens = tokenize(expression, &environment, &settings, calculator.functions())
                .map_err(|e| miette::Report::new(e.located(offset, &expr)))?;
            for token in &tokens.tokens {
                println!("{token}");
            }
            println!("EOF  null");
        }
        Commands::Parse { expr } => {
            let settings = Settings::default();
            let calculator = Calculator::with_settings(settings.clone());
            let environment = Environment::new(&Memory::default(), &Bindings::new());
            let (_, offset, expression) = OutputFormat::split_prefix(&expr);
            let context = Context::new(&settings, decicalc::eval::MIN_PRECISION);
            let ast = tokenize(expression, &environment, &settings, calculator.functions())
                .and_then(|tokens| decicalc::Parser::new(tokens, calculator.functions(), context).parse())
                .map_err(|e| miette::Report::new(e.located(offset, &expr)))?;
            println!("{}", ast.root);
        }
        Commands::Eval {
            expr,
            vars,
            word_size,
            signed,
            decimal_places,
            fractions,
            only_hex,
            only_binary,
            only_octal,
        } => {
            let mut settings = Settings::default();
            let flags: [(&str, Option<SettingValue>); 7] = [
                ("word_size", word_size.map(Into::into)),
                ("decimal_places", decimal_places.map(Into::into)),
                ("signed_mode", signed.then_some(true.into())),
                ("fractions", fractions.then_some(true.into())),
                ("only_hex", only_hex.then_some(true.into())),
                ("only_binary", only_binary.then_some(true.into())),
                ("only_octal", only_octal.then_some(true.into())),
            ];
            for (key, value) in flags {
                if let Some(value) = value {
                    settings
                        .set(key, value)
                        .wrap_err_with(|| format!("invalid --{}", key.replace('_', "-")))?;
                }
            }

            let bindings: Bindings = vars.into_iter().collect();
            let calculator = Calculator::with_settings(settings);
            let calculation = calculator.calculate(&expr, &bindings).map_err(miette::Report::new)?;
            if calculation.rounded {
                eprintln!("(rounded)");
            }
            println!("{}", calculation.value);
        }
    }
    Ok(())
}
