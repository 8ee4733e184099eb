use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use schemelike::{Error, MAX_CALL_DEPTH};
use schemelike::ast::Value;
use schemelike::builtinops::BuiltinOp;
use schemelike::environment::{DEFAULT_CAPACITY, DEFAULT_LOAD_FACTOR, Environment, TableConfig};
use schemelike::evaluator::{EvalConfig, evaluate_with_config};
use schemelike::scheme::{Token, lex, parse_program};

const HEADER: &str = "\x1b[1;95m";
const OKBLUE: &str = "\x1b[1;94m";
const OKGREEN: &str = "\x1b[1;32m";
const FAIL: &str = "\x1b[1;91m";
const ENDC: &str = "\x1b[0m";

/// schemelike runs programs written in a small parenthesized expression language.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Program to run. Without one, an interactive session starts.
    file: Option<PathBuf>,

    /// Print the token stream of the input.
    #[arg(long)]
    tokens: bool,

    /// Echo the parsed AST of every interactive input before its result.
    #[arg(long)]
    ast: bool,

    /// Dump the global binding table after running a file.
    #[arg(long)]
    env: bool,

    /// Load factor that triggers growth of the binding table.
    #[arg(long, default_value_t = DEFAULT_LOAD_FACTOR)]
    load_factor: f32,

    /// Initial slot count of the binding table, rounded up to a prime.
    #[arg(long, default_value_t = DEFAULT_CAPACITY)]
    capacity: usize,

    /// Deepest chain of nested function calls before evaluation stops.
    #[arg(long, default_value_t = MAX_CALL_DEPTH)]
    max_call_depth: usize,

    /// Log filter such as `debug` or `schemelike=trace`. Overrides RUST_LOG.
    #[arg(long)]
    log: Option<String>,
}

#[derive(Debug, thiserror::Error)]
enum HostError {
    #[error("Failed to read '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Interpreter(#[from] Error),
    #[error("Line editor failed: {0}")]
    Editor(#[from] ReadlineError),
}

/// Install a stderr subscriber when `--log` or RUST_LOG asks for one
fn init_tracing(directives: Option<&str>) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = match directives {
        Some(directives) => EnvFilter::new(directives),
        None if std::env::var("RUST_LOG").is_ok() => EnvFilter::from_default_env(),
        None => return,
    };
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.log.as_deref());

    let config = TableConfig {
        load_factor: args.load_factor,
        initial_capacity: args.capacity,
    };
    let outcome = Environment::with_config(config)
        .map_err(HostError::from)
        .and_then(|mut env| match &args.file {
            Some(path) => run_file(path, &args, &mut env),
            None => run_repl(&args, &mut env),
        });

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{FAIL}Error:{ENDC} {e}");
            ExitCode::FAILURE
        }
    }
}

impl Args {
    fn eval_config(&self) -> EvalConfig {
        EvalConfig {
            max_call_depth: self.max_call_depth,
        }
    }
}

fn print_tokens(tokens: &[Token]) {
    println!("{OKBLUE}Tokens: {ENDC}");
    for token in tokens {
        println!("  {:>5}  {:<10} {:?}", token.offset, format!("{:?}", token.kind), token.text);
    }
}

/// Run every top-level form of a file in order, printing the last result
fn run_file(path: &Path, args: &Args, env: &mut Environment) -> Result<(), HostError> {
    let source = fs::read_to_string(path).map_err(|source| HostError::Read {
        path: path.display().to_string(),
        source,
    })?;

    println!("{OKGREEN}Schemelike interpreter!{ENDC}\n");
    println!("{OKBLUE}Source code: {ENDC}");
    println!("{}", source.trim_end());

    let tokens = lex(&source)?;
    if args.tokens {
        print_tokens(&tokens);
    }

    let forms = parse_program(&tokens)?;
    println!("{OKBLUE}AST Representation: {ENDC}");
    for form in &forms {
        println!("{form}");
    }

    let mut result = None;
    for form in &forms {
        result = Some(evaluate_with_config(form, env, args.eval_config())?);
    }
    println!("{FAIL}Result:{ENDC} ");
    match result {
        Some(value) => println!("{value}"),
        None => println!("(empty program)"),
    }

    if args.env {
        println!("{HEADER}Environment:{ENDC}");
        print!("{env}");
    }
    Ok(())
}

fn run_repl(args: &Args, env: &mut Environment) -> Result<(), HostError> {
    println!("{OKGREEN}Schemelike interpreter!{ENDC}");
    println!("Enter expressions like: (+ 1 2)");
    println!("Type :help for more commands, or Ctrl+D to exit.");
    println!();

    let mut rl = DefaultEditor::new()?;

    loop {
        match rl.readline("schemelike> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                match line {
                    ":help" => {
                        print_help();
                        continue;
                    }
                    ":env" => {
                        print_environment(env);
                        continue;
                    }
                    ":table" => {
                        print!("{env}");
                        continue;
                    }
                    ":quit" | ":exit" => {
                        println!("Goodbye!");
                        break;
                    }
                    _ => {}
                }

                // Errors end the input, not the session
                match eval_line(line, args, env) {
                    Ok(Some(value)) => println!("{value}"),
                    Ok(None) => {}
                    Err(e) => println!("Error: {e}"),
                }
            }
            Err(ReadlineError::Eof | ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => return Err(err.into()),
        }
    }

    Ok(())
}

fn eval_line(line: &str, args: &Args, env: &mut Environment) -> Result<Option<Value>, Error> {
    let tokens = lex(line)?;
    if args.tokens {
        print_tokens(&tokens);
    }

    let mut last = None;
    for form in parse_program(&tokens)? {
        if args.ast {
            println!("→ {form}");
        }
        last = Some(evaluate_with_config(&form, env, args.eval_config())?);
    }
    Ok(last)
}

fn print_help() {
    println!("Commands:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show current bindings");
    println!("  :table     - Dump the binding table slot by slot");
    println!("  :quit      - Exit the interpreter");
    println!("  :exit      - Exit the interpreter");
    println!("  Ctrl+D     - Exit the interpreter");
    println!();
    println!("Values: 42, -5, 2.5, true, false, \"text\"");
    println!();
    println!("Builtins (operand count):");
    for op in BuiltinOp::ALL {
        println!("  {:<8} {:<3} {}", op.name(), op.arity().to_string(), op.description());
    }
    println!();
    println!("Examples:");
    println!("  (begin (var a 5) (var b 6) (+ a b))");
    println!("  (func add2 (a b) (+ a b))");
    println!("  (add2 3 4)");
    println!();
}

fn print_environment(env: &Environment) {
    let bindings = env.bindings();

    if bindings.is_empty() {
        println!("Environment is empty.");
        return;
    }

    println!("Environment bindings ({} total):", bindings.len());
    for (name, binding) in bindings {
        if binding.is_constant() {
            println!("  {name} = {} (const)", binding.value);
        } else {
            println!("  {name} = {}", binding.value);
        }
    }
    println!(
        "Table: {} of {} slots used, {} collisions, {} tombstones",
        env.size(),
        env.capacity(),
        env.collisions(),
        env.tombstones()
    );
}
