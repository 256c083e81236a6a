//! Toylisp - a small interpreter for a parenthesized, Lisp-like expression language
//!
//! The crate is split into a reader that turns source text into a homogeneous
//! expression tree of [`ast::Value`] nodes, and an evaluator that walks that tree
//! against a chain of lexical scopes, dispatching special forms and builtin or
//! user-defined functions.
//!
//! ```text
//! (+ 1 2 3)                        ; arithmetic, left fold over all operands
//! (if (< 2 5) "yes" "no")          ; conditionals require a Bool condition
//! (let (x 10) (* x x))             ; one binding pair, then a body
//! (defun sq (n) (* n n)) (sq 4)    ; named functions, registered globally
//! '(1 2 3)                         ; quoted list: data, not code
//! (case (false 1) (:else 2))       ; first true branch wins, :else is the fallback
//! ```
//!
//! ## Values and coercion
//!
//! Builtins declare a type for every parameter. Arguments are coerced toward the
//! declared type before the call (`(str-cat "n=" 5)` yields `"n=5"`), following a
//! small closed matrix between Bool, Number and String. Symbols and keywords are
//! never coerced. User-defined functions take untyped (`any`) parameters.
//!
//! ## Entry points
//!
//! - [`run`]: parse and evaluate a whole program in a fresh interpreter
//! - [`evaluator::Interpreter::run`]: same, but keeps global state between calls
//! - [`reader::parse`]: source text to a root list of top-level forms
//!
//! ## Modules
//!
//! - `ast`: the value model, printing and the coercion matrix
//! - `reader`: source text to expression tree
//! - `evaluator`: environments, interpreter state and special forms
//! - `builtinops`: the builtin function library

use std::fmt;

/// Maximum list nesting accepted by the reader
pub const MAX_PARSE_DEPTH: usize = 128;

/// Maximum evaluation depth. The native stack grows on demand, so this bounds
/// runaway recursion rather than stack use. A user function call costs a few
/// levels (call, body, nested forms).
pub const MAX_EVAL_DEPTH: usize = 10_000;

/// A 1-based source position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub line: usize,
    pub col: usize,
}

impl Span {
    pub fn new(line: usize, col: usize) -> Self {
        Span { line, col }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, col {}", self.line, self.col)
    }
}

/// Renders " at line L, col C" when a location is known
fn location_suffix(location: &Option<Span>) -> String {
    match location {
        Some(span) => format!(" at {span}"),
        None => String::new(),
    }
}

/// Categorizes the different kinds of parsing errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Invalid or unexpected syntax (a `)` with no open list)
    InvalidSyntax,
    /// Input ended before the expression was complete (unterminated string, unclosed list)
    Incomplete,
    /// A backslash escape other than `\\`, `\n`, `\t` or `\"`
    InvalidEscape,
    /// List nesting exceeded the configured maximum depth
    TooDeeplyNested,
}

/// A structured error describing malformed source text.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}{}", location_suffix(.location))]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// Where the offending token starts
    pub location: Option<Span>,
    /// The problematic token or character encountered, if identifiable
    pub found: Option<String>,
}

impl ParseError {
    pub fn new(
        kind: ParseErrorKind,
        message: impl Into<String>,
        location: Option<Span>,
        found: Option<String>,
    ) -> Self {
        ParseError {
            kind,
            message: message.into(),
            location,
            found,
        }
    }

    /// Check whether more input could complete the source (used by the REPL)
    pub fn is_incomplete(&self) -> bool {
        self.kind == ParseErrorKind::Incomplete
    }
}

/// The specialisations of a runtime error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeErrorKind {
    /// Symbol has no binding in any scope, the special-form table or the builtin table
    UnboundSymbol,
    /// The head of a non-singleton list is neither a special form nor a function
    NotAFunction,
    /// A value had the wrong type (bad condition, impossible coercion, malformed form)
    Type,
    /// Wrong number of arguments
    Arity,
    /// Any other evaluation failure
    Eval,
}

impl fmt::Display for RuntimeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RuntimeErrorKind::UnboundSymbol => "UnboundSymbolError",
            RuntimeErrorKind::NotAFunction => "NotAFunctionError",
            RuntimeErrorKind::Type => "TypeError",
            RuntimeErrorKind::Arity => "ArityError",
            RuntimeErrorKind::Eval => "RuntimeError",
        };
        f.write_str(name)
    }
}

/// A failure during evaluation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {message}{}", location_suffix(.location))]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub message: String,
    /// Start of the innermost list form being evaluated when the error was raised
    pub location: Option<Span>,
}

/// Error types for the interpreter
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("ParsingError: {0}")]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl Error {
    fn runtime(kind: RuntimeErrorKind, message: impl Into<String>) -> Self {
        Error::Runtime(RuntimeError {
            kind,
            message: message.into(),
            location: None,
        })
    }

    pub fn unbound_symbol(name: &str) -> Self {
        Self::runtime(
            RuntimeErrorKind::UnboundSymbol,
            format!("Unbound symbol '{name}'"),
        )
    }

    pub fn not_a_function(value: &ast::Value) -> Self {
        Self::runtime(
            RuntimeErrorKind::NotAFunction,
            format!("{value} is not a function"),
        )
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::runtime(RuntimeErrorKind::Type, message)
    }

    pub fn arity_error(expected: evaluator::Arity, got: usize) -> Self {
        Self::runtime(
            RuntimeErrorKind::Arity,
            format!("expected {expected} arguments, got {got}"),
        )
    }

    pub fn eval_error(message: impl Into<String>) -> Self {
        Self::runtime(RuntimeErrorKind::Eval, message)
    }

    /// The runtime specialisation, or `None` for parsing errors
    pub fn runtime_kind(&self) -> Option<RuntimeErrorKind> {
        match self {
            Error::Runtime(e) => Some(e.kind),
            Error::Parse(_) => None,
        }
    }

    pub fn is_parse_error(&self) -> bool {
        matches!(self, Error::Parse(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Error::Parse(e) => &e.message,
            Error::Runtime(e) => &e.message,
        }
    }

    pub fn location(&self) -> Option<Span> {
        match self {
            Error::Parse(e) => e.location,
            Error::Runtime(e) => e.location,
        }
    }

    /// Attach a location to a runtime error that doesn't have one yet
    pub(crate) fn or_location(self, span: Option<Span>) -> Self {
        match self {
            Error::Runtime(mut e) if e.location.is_none() => {
                e.location = span;
                Error::Runtime(e)
            }
            other => other,
        }
    }
}

/// Outcome of running a program: the value of its last top-level form, or the
/// error that stopped it.
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    /// `None` when the program has no forms or failed
    pub result: Option<ast::Value>,
    pub error: Option<Error>,
}

impl RunResult {
    pub fn had_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn into_result(self) -> Result<Option<ast::Value>, Error> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.result),
        }
    }
}

/// Parse and evaluate `source` in a fresh interpreter.
///
/// ```
/// use toylisp::ast::Value;
///
/// let outcome = toylisp::run("(+ 1 2 3 4 5)");
/// assert!(!outcome.had_error());
/// assert_eq!(outcome.result, Some(Value::Number(15.0)));
/// ```
pub fn run(source: &str) -> RunResult {
    evaluator::Interpreter::new().run(source)
}

pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod reader;
