use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::panic;
use std::process;
use toylisp::ast::{Type, Value};
use toylisp::evaluator::Interpreter;
use toylisp::reader::{ParseConfig, parse_with_config};
use toylisp::{Error, RunResult};

fn main() {
    // RUST_LOG=toylisp=debug shows definitions, scopes and calls
    if std::env::var_os("RUST_LOG").is_some() {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    }

    if let Some(path) = std::env::args().nth(1) {
        process::exit(run_file(&path));
    }

    let result = panic::catch_unwind(|| {
        run_repl();
    });

    if let Err(panic_info) = result {
        eprintln!("The REPL encountered an unexpected error and must exit.");

        if let Some(msg) = panic_info.downcast_ref::<&str>() {
            eprintln!("Error: {msg}");
        } else if let Some(msg) = panic_info.downcast_ref::<String>() {
            eprintln!("Error: {msg}");
        } else {
            eprintln!("Error: Unknown panic occurred");
        }

        process::exit(1);
    }
}

fn parse_config() -> ParseConfig {
    ParseConfig {
        handle_comments: true,
        ..ParseConfig::default()
    }
}

/// Evaluate a whole file and print its last value. Returns the exit code.
fn run_file(path: &str) -> i32 {
    println!("Loading file '{path}'\n");
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error: could not read '{path}': {e}");
            return 1;
        }
    };

    let mut interp = Interpreter::new().with_parse_config(parse_config());
    match interp.run(&source) {
        RunResult { error: Some(e), .. } => {
            eprintln!("Error: {e}");
            1
        }
        RunResult { result, .. } => {
            println!("{}", result.unwrap_or(Value::Nil).display());
            0
        }
    }
}

fn run_repl() {
    println!("Toylisp REPL");
    println!("Enter expressions like: (+ 1 2)");
    println!("Unbalanced input continues on the next line.");
    println!("Type :help for more commands, or Ctrl+C to exit.");
    println!();

    let mut rl = DefaultEditor::new().expect("Could not initialize REPL");
    let mut interp = Interpreter::new().with_parse_config(parse_config());

    // Register custom function that can be called from user code for demonstration purposes
    interp.register_builtin_operation::<_, ()>("help", &[], print_help);
    interp.register_builtin_operation::<_, (f64,)>(
        "sqrt",
        &[("n", Type::Number)],
        |n: f64| n.sqrt(),
    );

    let mut buffer = String::new();

    loop {
        let prompt = if buffer.is_empty() { "toylisp> " } else { "  ...> " };
        match rl.readline(prompt) {
            Ok(line) => {
                if buffer.is_empty() {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(line);

                    // Handle special commands
                    match line {
                        ":help" => {
                            let _ = print_help();
                            continue;
                        }
                        ":env" => {
                            print_environment(&interp);
                            continue;
                        }
                        ":quit" | ":exit" => {
                            println!("Goodbye!");
                            break;
                        }
                        _ => {}
                    }
                    if let Some(source) = line.strip_prefix(":ast") {
                        match parse_with_config(source, parse_config()) {
                            Ok(root) => {
                                for form in root.items {
                                    println!("{form:#?}");
                                }
                            }
                            Err(e) => println!("Error: {e}"),
                        }
                        continue;
                    }
                } else {
                    let _ = rl.add_history_entry(line.trim());
                }

                buffer.push_str(&line);
                buffer.push('\n');

                // Keep reading while the input is an unfinished form
                if let Err(Error::Parse(e)) = parse_with_config(&buffer, parse_config())
                    && e.is_incomplete()
                {
                    continue;
                }

                let outcome = interp.run(&buffer);
                buffer.clear();
                match outcome {
                    RunResult { error: Some(e), .. } => println!("Error: {e}"),
                    RunResult {
                        result: Some(value),
                        ..
                    } => println!("{}", value.display()),
                    RunResult { result: None, .. } => {}
                }
            }

            Err(ReadlineError::Interrupted) if !buffer.is_empty() => {
                // Ctrl+C abandons a half-typed form
                buffer.clear();
            }
            Err(ReadlineError::Eof | ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }
}

fn print_help() -> Result<Value, Error> {
    println!("Toylisp Interpreter:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show global bindings and builtins");
    println!("  :ast EXPR  - Show the parsed tree of EXPR without evaluating it");
    println!("  :quit      - Exit the interpreter");
    println!("  :exit      - Exit the interpreter");
    println!("  Ctrl+C     - Cancel a multi-line form, or exit");
    println!();
    println!("Values:");
    println!("  Numbers: 42, -2.5    Strings: \"hi\\n\"    Keywords: :else");
    println!("  Booleans: true, false    Quoted lists: '(1 2 3)");
    println!();
    println!("Special forms: do, if, case, eval, let, def, defun");
    println!();
    println!("Examples:");
    println!("  (+ 1 2 3)");
    println!("  (if (< 2 5) \"yes\" \"no\")");
    println!("  (let (x 10) (* x x))");
    println!("  (defun sq (n) (* n n))");
    println!("  (case ((= 1 2) :one) (:else :other))");
    println!("  (doc str-cat)");
    println!();

    Ok(Value::Nil)
}

fn print_environment(interp: &Interpreter) {
    let builtins = interp.builtin_names();
    let bindings = interp.global().get_all_bindings();

    println!("Builtin functions ({}):", builtins.len());
    // Print in columns for readability
    let mut col = 0;
    for name in builtins {
        print!("  {name:<15}");
        col += 1;
        if col % 4 == 0 {
            println!();
        }
    }
    if col % 4 != 0 {
        println!();
    }
    println!();

    println!("Global bindings ({}):", bindings.len());
    for (name, value) in bindings {
        println!("  {name} = {}", value.display());
    }
}
