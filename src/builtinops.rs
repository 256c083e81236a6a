//! Special forms and the builtin function library.
//!
//! ```text
//! (+ 1 2 3)                 ; math: + - * / // % pow rand-int
//! (<= 1 2)                  ; comparison: = > < >= <=
//! (and true (not false))    ; logic: and or not
//! (str-cat "n=" 5)          ; strings: str-cat str-lower str-upper str-repeat str-len
//! (io-print "hello")        ; output: io-print io-println
//! (eval (read "(+ 1 2)"))   ; meta: read print type-of doc
//! ```
//!
//! ## Functions vs Special Forms
//!
//! - **Functions**: receive evaluated arguments, coerced toward their declared
//!   parameter types (`(str-cat "n=" 5)` yields `"n=5"`)
//! - **Special Forms**: receive the raw form and decide which parts to evaluate
//!   (`do`, `if`, `case`, `eval`, `let`, `def`, `defun`)
//!
//! Both are looked up by name only after the environment chain, so a user
//! definition can shadow any of them.
//!
//! ## Arity
//!
//! Builtins are strict: a missing or surplus argument is an `ArityError`. The
//! variadic math and logic operations need at least one operand since they fold
//! from the first one.
//!
//! ## Adding New Operations
//!
//! 1. **Implement the function** with typed Rust parameters (`f64`, `bool`, `&str`,
//!    `Value`, or a trailing `NumIter`/`BoolIter`/`StringIter` for rest parameters)
//! 2. **Add it to BUILTIN_OPS** with its declared parameters, return type and doc string
//! 3. **Add tests** covering coercion and error cases

use crate::Error;
use crate::ast::{Function, FunctionBody, NumberType, Parameter, Type, Value};
use crate::evaluator::intooperation::{
    BoolIter, IntoOperation, IntoVariadicOperation, NumIter, OperationFn, StringIter,
};
use crate::evaluator::{
    Arity, SpecialFormFn, eval_case, eval_def, eval_defun, eval_do, eval_eval, eval_if, eval_let,
};
use crate::reader::parse;
use rand::Rng;
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::rc::Rc;
use std::sync::{Arc, LazyLock};

/// A named operator that receives its form unevaluated
pub struct SpecialForm {
    pub name: &'static str,
    pub doc: &'static str,
    pub handler: SpecialFormFn,
}

impl fmt::Debug for SpecialForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SpecialForm({})", self.name)
    }
}

static SPECIAL_FORMS: [SpecialForm; 7] = [
    SpecialForm {
        name: "do",
        doc: "Evaluates each expression in order and returns the value of the last one",
        handler: eval_do,
    },
    SpecialForm {
        name: "if",
        doc: "Evaluates the then branch when the bool condition is true, otherwise the optional else branch",
        handler: eval_if,
    },
    SpecialForm {
        name: "case",
        doc: "Returns the result of the first (condition result) branch whose condition is true, falling back to the :else branch",
        handler: eval_case,
    },
    SpecialForm {
        name: "eval",
        doc: "Evaluates its argument, then evaluates the resulting list as code",
        handler: eval_eval,
    },
    SpecialForm {
        name: "let",
        doc: "Binds a (symbol value) pair in a new scope and evaluates the body in it",
        handler: eval_let,
    },
    SpecialForm {
        name: "def",
        doc: "Binds a symbol to a value in the global environment",
        handler: eval_def,
    },
    SpecialForm {
        name: "defun",
        doc: "Defines a named function in the global environment",
        handler: eval_defun,
    },
];

/// Find a special form by name
pub fn find_special_form(name: &str) -> Option<&'static SpecialForm> {
    SPECIAL_FORMS.iter().find(|form| form.name == name)
}

pub fn get_special_forms() -> &'static [SpecialForm] {
    &SPECIAL_FORMS
}

/// Definition of a builtin function
#[derive(Clone)]
pub struct BuiltinOp {
    /// The name the function is bound to
    pub id: String,
    pub doc: String,
    /// Declared parameters; arguments are coerced toward their types before the call
    pub params: Vec<Parameter>,
    pub return_type: Type,
    /// Expected number of arguments
    pub arity: Arity,
    func: Arc<OperationFn>,
}

impl fmt::Debug for BuiltinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinOp")
            .field("id", &self.id)
            .field("params", &self.params)
            .field("return_type", &self.return_type)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        // Compare operations by their id, which uniquely identifies them
        self.id == other.id
    }
}

impl BuiltinOp {
    /// A builtin taking exactly one argument per declared parameter
    pub fn fixed(
        id: &str,
        doc: &str,
        params: Vec<Parameter>,
        return_type: Type,
        func: Arc<OperationFn>,
    ) -> Self {
        BuiltinOp {
            id: id.to_owned(),
            doc: doc.to_owned(),
            arity: Arity::Exact(params.len()),
            params,
            return_type,
            func,
        }
    }

    /// A builtin whose last declared parameter is a rest parameter. `arity` is
    /// checked before `func` runs.
    pub fn variadic(
        id: &str,
        doc: &str,
        params: Vec<Parameter>,
        return_type: Type,
        arity: Arity,
        func: Arc<OperationFn>,
    ) -> Self {
        let checked: Arc<OperationFn> = Arc::new(move |args: Vec<Value>| {
            arity.validate(args.len())?;
            func(args)
        });
        BuiltinOp {
            id: id.to_owned(),
            doc: doc.to_owned(),
            params,
            return_type,
            arity,
            func: checked,
        }
    }

    /// Invoke the operation directly, without coercing arguments
    pub fn call(&self, args: Vec<Value>) -> Result<Value, Error> {
        (self.func)(args)
    }

    /// Wrap the operation as a first-class function value
    pub fn to_value(&self) -> Value {
        Value::Function(Rc::new(Function {
            name: self.id.clone(),
            doc: self.doc.clone(),
            params: self.params.clone(),
            return_type: self.return_type,
            body: FunctionBody::Native(Arc::clone(&self.func)),
        }))
    }
}

//
// Builtin Function Implementations
//

// Left fold over all operands, starting from the first one
macro_rules! numeric_fold {
    ($name:ident, $op:tt) => {
        fn $name(first: NumberType, rest: NumIter<'_>) -> NumberType {
            rest.fold(first, |acc, n| acc $op n)
        }
    };
}

numeric_fold!(builtin_add, +);
numeric_fold!(builtin_sub, -);
numeric_fold!(builtin_mul, *);
numeric_fold!(builtin_div, /);

// Compares exactly two numbers
macro_rules! numeric_comparison {
    ($name:ident, $op:tt) => {
        fn $name(first: NumberType, second: NumberType) -> bool {
            first $op second
        }
    };
}

numeric_comparison!(builtin_eq, ==);
numeric_comparison!(builtin_gt, >);
numeric_comparison!(builtin_lt, <);
numeric_comparison!(builtin_ge, >=);
numeric_comparison!(builtin_le, <=);

fn builtin_floor_div(x: NumberType, y: NumberType) -> NumberType {
    (x / y).floor()
}

// Rust's `%` on f64 matches fmod: the sign follows the dividend
fn builtin_mod(x: NumberType, y: NumberType) -> NumberType {
    x % y
}

fn builtin_pow(base: NumberType, power: NumberType) -> NumberType {
    base.powf(power)
}

fn builtin_rand_int(min: NumberType, max: NumberType) -> NumberType {
    let r: f64 = rand::thread_rng().r#gen();
    (r * (max - min) + min).floor()
}

fn builtin_and(first: bool, rest: BoolIter<'_>) -> bool {
    rest.fold(first, |acc, b| acc && b)
}

fn builtin_or(first: bool, rest: BoolIter<'_>) -> bool {
    rest.fold(first, |acc, b| acc || b)
}

fn builtin_not(b: bool) -> bool {
    !b
}

fn builtin_str_cat(parts: StringIter<'_>) -> String {
    parts.collect()
}

fn builtin_str_lower(s: &str) -> String {
    s.to_lowercase()
}

fn builtin_str_upper(s: &str) -> String {
    s.to_uppercase()
}

/// Largest string `str-repeat` will build
const MAX_STRING_BYTES: usize = 1 << 28;

fn builtin_str_repeat(s: &str, times: NumberType) -> Result<String, Error> {
    if times.is_nan() {
        return Ok(String::new());
    }
    if times < 0.0 || times.is_infinite() {
        return Err(Error::eval_error(format!("Invalid repeat count: {times}")));
    }
    // Fractional counts truncate; the float-to-int cast saturates
    let count = times as usize;
    match s.len().checked_mul(count) {
        Some(len) if len <= MAX_STRING_BYTES => Ok(s.repeat(count)),
        _ => Err(Error::eval_error(format!(
            "Invalid repeat count: {times} (result would exceed {MAX_STRING_BYTES} bytes)"
        ))),
    }
}

fn builtin_str_len(s: &str) -> NumberType {
    s.chars().count() as NumberType
}

fn write_stdout(text: &str) -> Result<(), Error> {
    let mut out = std::io::stdout().lock();
    writeln!(out, "{text}")
        .and_then(|()| out.flush())
        .map_err(|e| Error::eval_error(format!("Failed to write to stdout: {e}")))
}

fn builtin_io_print(s: &str) -> Result<(), Error> {
    write_stdout(s)
}

fn builtin_io_println(s: &str) -> Result<(), Error> {
    write_stdout(&format!("{s}\n"))
}

// Unparseable text reads as nil
fn builtin_read(source: &str) -> Value {
    parse(source)
        .ok()
        .and_then(|root| root.items.into_iter().next())
        .unwrap_or(Value::Nil)
}

fn builtin_print(value: Value) -> String {
    value.to_string()
}

fn builtin_type_of(value: Value) -> String {
    value.type_of().name().to_owned()
}

fn builtin_doc(value: Value) -> Result<String, Error> {
    match value {
        Value::Function(func) => Ok(func.doc.clone()),
        Value::SpecialForm(form) => Ok(form.doc.to_owned()),
        other => Err(Error::type_error(format!(
            "doc expects a function, got {other}"
        ))),
    }
}

/// Global registry of all builtin functions.
///
/// Implementations are wired through the same adapter layer used for host
/// registration, once, at initialization time.
static BUILTIN_OPS: LazyLock<Vec<BuiltinOp>> = LazyLock::new(|| {
    fn params(declared: &[(&str, Type)]) -> Vec<Parameter> {
        declared
            .iter()
            .map(|(name, ty)| Parameter::new(*name, *ty))
            .collect()
    }

    fn builtin_fixed<Args, F>(
        id: &str,
        doc: &str,
        declared: &[(&str, Type)],
        return_type: Type,
        f: F,
    ) -> BuiltinOp
    where
        F: IntoOperation<Args>,
    {
        BuiltinOp::fixed(
            id,
            doc,
            params(declared),
            return_type,
            <F as IntoOperation<Args>>::into_operation(f),
        )
    }

    // All variadic builtins take a single rest parameter and fold from its
    // first element
    fn builtin_variadic<Args, F>(
        id: &str,
        doc: &str,
        rest: (&str, Type),
        return_type: Type,
        f: F,
    ) -> BuiltinOp
    where
        F: IntoVariadicOperation<Args>,
    {
        BuiltinOp::variadic(
            id,
            doc,
            vec![Parameter::rest(rest.0, rest.1)],
            return_type,
            Arity::AtLeast(1),
            <F as IntoVariadicOperation<Args>>::into_variadic_operation(f),
        )
    }

    const X_Y: &[(&str, Type)] = &[("x", Type::Number), ("y", Type::Number)];
    const FIRST_SECOND: &[(&str, Type)] = &[("first", Type::Number), ("second", Type::Number)];
    const STRING: &[(&str, Type)] = &[("string", Type::String)];
    const VALUE: &[(&str, Type)] = &[("value", Type::Any)];
    const OPERANDS: (&str, Type) = ("operands", Type::Number);

    vec![
        // Arithmetic
        builtin_variadic::<(NumberType, NumIter<'static>), _>(
            "+",
            "Performs addition of arbitrary amount of number arguments",
            OPERANDS,
            Type::Number,
            builtin_add,
        ),
        builtin_variadic::<(NumberType, NumIter<'static>), _>(
            "-",
            "Performs subtraction of arbitrary amount of number arguments",
            OPERANDS,
            Type::Number,
            builtin_sub,
        ),
        builtin_variadic::<(NumberType, NumIter<'static>), _>(
            "*",
            "Performs multiplication of arbitrary amount of number arguments",
            OPERANDS,
            Type::Number,
            builtin_mul,
        ),
        builtin_variadic::<(NumberType, NumIter<'static>), _>(
            "/",
            "Performs division of arbitrary amount of number arguments",
            OPERANDS,
            Type::Number,
            builtin_div,
        ),
        builtin_fixed::<(NumberType, NumberType), _>(
            "//",
            "Performs integer division of two numeric values (truncating any decimals from the result)",
            X_Y,
            Type::Number,
            builtin_floor_div,
        ),
        builtin_fixed::<(NumberType, NumberType), _>(
            "%",
            "Returns the result of x modulo y",
            X_Y,
            Type::Number,
            builtin_mod,
        ),
        builtin_fixed::<(NumberType, NumberType), _>(
            "pow",
            "Raises the base value to the power specified",
            &[("base", Type::Number), ("power", Type::Number)],
            Type::Number,
            builtin_pow,
        ),
        // Comparison
        builtin_fixed::<(NumberType, NumberType), _>(
            "=",
            "Compares the first operand to the second, returning true if they are equal",
            FIRST_SECOND,
            Type::Bool,
            builtin_eq,
        ),
        builtin_fixed::<(NumberType, NumberType), _>(
            ">",
            "Compares the first operand to the second, returning true if the first is greater",
            FIRST_SECOND,
            Type::Bool,
            builtin_gt,
        ),
        builtin_fixed::<(NumberType, NumberType), _>(
            "<",
            "Compares the first operand to the second, returning true if the first is lesser",
            FIRST_SECOND,
            Type::Bool,
            builtin_lt,
        ),
        builtin_fixed::<(NumberType, NumberType), _>(
            ">=",
            "Compares the first operand to the second, returning true if the first is greater OR equal",
            FIRST_SECOND,
            Type::Bool,
            builtin_ge,
        ),
        builtin_fixed::<(NumberType, NumberType), _>(
            "<=",
            "Compares the first operand to the second, returning true if the first is lesser OR equal",
            FIRST_SECOND,
            Type::Bool,
            builtin_le,
        ),
        // Misc
        builtin_fixed::<(NumberType, NumberType), _>(
            "rand-int",
            "Generates a pseudo-random integer in the range [min, max)",
            &[("min", Type::Number), ("max", Type::Number)],
            Type::Number,
            builtin_rand_int,
        ),
        // Logic
        builtin_variadic::<(bool, BoolIter<'static>), _>(
            "and",
            "Performs a logical and on all provided operands",
            ("operands", Type::Bool),
            Type::Bool,
            builtin_and,
        ),
        builtin_variadic::<(bool, BoolIter<'static>), _>(
            "or",
            "Performs a logical or on all provided operands",
            ("operands", Type::Bool),
            Type::Bool,
            builtin_or,
        ),
        builtin_fixed::<(bool,), _>(
            "not",
            "Returns the logical negation of its operand",
            &[("operand", Type::Bool)],
            Type::Bool,
            builtin_not,
        ),
        // Strings
        BuiltinOp::variadic(
            "str-cat",
            "Concats an arbitrary number of strings together",
            vec![Parameter::rest("operands", Type::String)],
            Type::String,
            Arity::AtLeast(0),
            IntoVariadicOperation::<(StringIter<'static>,)>::into_variadic_operation(
                builtin_str_cat,
            ),
        ),
        builtin_fixed::<(&str,), _>(
            "str-lower",
            "Converts a string to lowercase",
            STRING,
            Type::String,
            builtin_str_lower,
        ),
        builtin_fixed::<(&str,), _>(
            "str-upper",
            "Converts a string to uppercase",
            STRING,
            Type::String,
            builtin_str_upper,
        ),
        builtin_fixed::<(&str, NumberType), _>(
            "str-repeat",
            "Repeats a string the specified number of times",
            &[("string", Type::String), ("times", Type::Number)],
            Type::String,
            builtin_str_repeat,
        ),
        builtin_fixed::<(&str,), _>(
            "str-len",
            "Returns the length of a string",
            STRING,
            Type::Number,
            builtin_str_len,
        ),
        // Output
        builtin_fixed::<(&str,), _>(
            "io-print",
            "Outputs the provided string to the standard output",
            STRING,
            Type::Nil,
            builtin_io_print,
        ),
        builtin_fixed::<(&str,), _>(
            "io-println",
            "Outputs the provided string to the standard output, appending a new line at the end",
            STRING,
            Type::Nil,
            builtin_io_println,
        ),
        // Meta
        builtin_fixed::<(&str,), _>(
            "read",
            "Parses a string as code",
            STRING,
            Type::Any,
            builtin_read,
        ),
        builtin_fixed::<(Value,), _>(
            "print",
            "Returns the source code form of a value as a string",
            VALUE,
            Type::String,
            builtin_print,
        ),
        builtin_fixed::<(Value,), _>(
            "type-of",
            "Returns the name of the type of a value",
            VALUE,
            Type::String,
            builtin_type_of,
        ),
        builtin_fixed::<(Value,), _>(
            "doc",
            "Returns the documentation string of a function",
            &[("function", Type::Function)],
            Type::String,
            builtin_doc,
        ),
    ]
});

/// Lazy static map from id to BuiltinOp (private - use find_builtin_op)
static BUILTIN_BY_ID: LazyLock<HashMap<&'static str, &'static BuiltinOp>> = LazyLock::new(|| {
    let ops: &'static [BuiltinOp] = BUILTIN_OPS.as_slice();
    ops.iter().map(|op| (op.id.as_str(), op)).collect()
});

/// Get all builtin operations
pub fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS.as_slice()
}

/// Find a builtin operation by name
pub fn find_builtin_op(id: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_BY_ID.get(id).copied()
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::RuntimeErrorKind;
    use crate::ast::{kw, list, nil, quoted, sym, val};
    use pretty_assertions::assert_eq;

    /// Micro-helper for success cases in comprehensive tests
    fn success<T: Into<Value>>(value: T) -> Option<Value> {
        Some(val(value))
    }

    /// Helper to invoke a builtin through the public registry using the
    /// canonical erased signature (Vec<Value> -> Result<Value, Error>).
    ///
    /// Arguments are passed as is, so these tests see the operations after
    /// coercion has already happened.
    fn call_builtin(name: &str, args: &[Value]) -> Result<Value, Error> {
        find_builtin_op(name)
            .unwrap_or_else(|| panic!("builtin not found: {name}"))
            .call(args.to_vec())
    }

    #[test]
    fn test_builtin_ops_registry() {
        let add_op = find_builtin_op("+").unwrap();
        assert_eq!(add_op.arity, Arity::AtLeast(1));
        assert_eq!(add_op.return_type, Type::Number);
        assert_eq!(add_op.params, vec![Parameter::rest("operands", Type::Number)]);
        assert_eq!(
            add_op.doc,
            "Performs addition of arbitrary amount of number arguments"
        );
        assert_eq!(add_op.call(vec![val(1), val(2)]).unwrap(), val(3));

        let repeat_op = find_builtin_op("str-repeat").unwrap();
        assert_eq!(repeat_op.arity, Arity::Exact(2));
        assert_eq!(repeat_op.params[1], Parameter::new("times", Type::Number));

        assert_eq!(find_builtin_op("str-cat").unwrap().arity, Arity::AtLeast(0));

        let all_ops = get_builtin_ops();
        assert_eq!(all_ops.len(), 27);
        assert!(all_ops.iter().all(|op| !op.doc.is_empty()));
        for op in all_ops {
            assert!(std::ptr::eq(find_builtin_op(&op.id).unwrap(), op));
        }

        assert!(find_builtin_op("unknown").is_none());
        // special forms live in their own table
        assert!(find_builtin_op("if").is_none());
    }

    #[test]
    fn test_special_form_table() {
        let names: Vec<&str> = get_special_forms().iter().map(|f| f.name).collect();
        assert_eq!(names, ["do", "if", "case", "eval", "let", "def", "defun"]);
        assert_eq!(find_special_form("let").unwrap().name, "let");
        assert!(find_special_form("+").is_none());
        assert!(find_special_form("quote").is_none());
    }

    #[test]
    fn test_function_values() {
        let func = find_builtin_op("str-repeat").unwrap().to_value();
        let Value::Function(func) = func else {
            panic!("expected a function value");
        };
        assert!(func.is_native());
        assert_eq!(func.name, "str-repeat");
        assert_eq!(func.signature(), "(string, times)");

        let add = find_builtin_op("+").unwrap().to_value();
        assert_eq!(add.display(), "fn + (...operands)");
        assert_eq!(add.to_string(), "#<function:+>");
    }

    /// Macro to create test cases, invoking builtins via the registry.
    macro_rules! test {
        ($name:expr, $args:expr, $expected:expr) => {
            ($name, call_builtin($name, $args), $expected)
        };
    }

    #[test]
    #[expect(clippy::too_many_lines)] // Comprehensive test coverage is intentionally thorough
    fn test_builtin_function_implementations() {
        type TestCase = (&'static str, Result<Value, Error>, Option<Value>);

        let many_ones: Vec<Value> = (0..100).map(|_| val(1)).collect();

        let test_cases: Vec<TestCase> = vec![
            // =================================================================
            // ARITHMETIC
            // =================================================================
            test!("+", &[val(5)], success(5)),
            test!("+", &[val(1), val(2), val(3)], success(6)),
            test!("+", &[val(-5), val(10)], success(5)),
            test!("+", &[val(0.1), val(0.2)], success(0.1 + 0.2)),
            test!("+", &many_ones, success(100)),
            test!("+", &[], None), // folds from the first operand
            test!("+", &[val("1")], None), // uncoerced string
            test!("-", &[val(5)], success(5)), // no unary negation
            test!("-", &[val(10), val(3), val(2)], success(5)),
            test!("-", &[val(0), val(5)], success(-5)),
            test!("-", &[], None),
            test!("*", &[val(2), val(3), val(4)], success(24)),
            test!("*", &[val(-2), val(3)], success(-6)),
            test!("*", &many_ones, success(1)),
            test!("*", &[], None),
            test!("/", &[val(12), val(2), val(3)], success(2)),
            test!("/", &[val(1), val(4)], success(0.25)),
            test!("/", &[val(1), val(0)], success(f64::INFINITY)),
            test!("/", &[val(-1), val(0)], success(f64::NEG_INFINITY)),
            test!("/", &[], None),
            test!("//", &[val(7), val(2)], success(3)),
            test!("//", &[val(-7), val(2)], success(-4)), // floor, not truncation
            test!("//", &[val(6), val(3)], success(2)),
            test!("//", &[val(7)], None),
            test!("%", &[val(7), val(3)], success(1)),
            test!("%", &[val(-7), val(3)], success(-1)),
            test!("%", &[val(5.5), val(2)], success(1.5)),
            test!("%", &[val(1), val(2), val(3)], None),
            test!("pow", &[val(2), val(10)], success(1024)),
            test!("pow", &[val(4), val(0.5)], success(2)),
            test!("pow", &[val(2), val(-1)], success(0.5)),
            // =================================================================
            // COMPARISON
            // =================================================================
            test!("=", &[val(12), val(12)], success(true)),
            test!("=", &[val(8), val(3)], success(false)),
            test!("=", &[val(0), val(-0.0)], success(true)),
            test!("=", &[val(7), val(7), val(7)], None), // exactly two operands
            test!(">", &[val(7), val(3)], success(true)),
            test!(">", &[val(4), val(4)], success(false)),
            test!("<", &[val(2), val(9)], success(true)),
            test!("<", &[val(6), val(6)], success(false)),
            test!(">=", &[val(7), val(7)], success(true)),
            test!(">=", &[val(2), val(6)], success(false)),
            test!("<=", &[val(3), val(3)], success(true)),
            test!("<=", &[val(8), val(2)], success(false)),
            test!("<", &[val(1)], None),
            // =================================================================
            // LOGIC
            // =================================================================
            test!("and", &[val(true)], success(true)),
            test!("and", &[val(true), val(true), val(false)], success(false)),
            test!("and", &[val(true), val(true)], success(true)),
            test!("and", &[], None),
            test!("or", &[val(false), val(false)], success(false)),
            test!("or", &[val(false), val(true)], success(true)),
            test!("or", &[], None),
            test!("not", &[val(true)], success(false)),
            test!("not", &[val(false)], success(true)),
            test!("not", &[], None),
            test!("not", &[val(true), val(false)], None),
            // =================================================================
            // STRINGS
            // =================================================================
            test!("str-cat", &[], success("")),
            test!("str-cat", &[val("hello")], success("hello")),
            test!(
                "str-cat",
                &[val("hello"), val(" "), val("world")],
                success("hello world")
            ),
            test!("str-lower", &[val("MiXeD")], success("mixed")),
            test!("str-upper", &[val("hi")], success("HI")),
            test!("str-upper", &[val("straße")], success("STRASSE")),
            test!("str-repeat", &[val("ab"), val(3)], success("ababab")),
            test!("str-repeat", &[val("ab"), val(0)], success("")),
            test!("str-repeat", &[val("ab"), val(2.7)], success("abab")),
            test!("str-repeat", &[val("ab"), val(f64::NAN)], success("")),
            test!("str-repeat", &[val("ab"), val(-1)], None),
            test!("str-repeat", &[val("ab"), val(f64::INFINITY)], None),
            // results too large to allocate are errors, not aborts
            test!("str-repeat", &[val("ab"), val(1e20)], None),
            test!("str-repeat", &[val("ab"), val(1e10)], None),
            test!("str-repeat", &[val(""), val(1e20)], success("")),
            test!("str-len", &[val("")], success(0)),
            test!("str-len", &[val("hello")], success(5)),
            test!("str-len", &[val("héllo")], success(5)),
            test!("str-len", &[val("a"), val("b")], None),
            // =================================================================
            // META
            // =================================================================
            test!("read", &[val("(+ 1 2)")], Some(list([sym("+"), val(1), val(2)]))),
            test!("read", &[val("'(1 2) 3")], Some(quoted([1, 2]))),
            test!("read", &[val(":kw")], Some(kw("kw"))),
            test!("read", &[val("")], Some(nil())),
            test!("read", &[val("(unclosed")], Some(nil())),
            test!("read", &[val("\"bad \\q\"")], Some(nil())),
            test!("print", &[val(15)], success("15")),
            test!("print", &[val("a\"b\n")], success("\"a\\\"b\\n\"")),
            test!("print", &[quoted([val(1), kw("k"), val(true)])], success("'(1 :k true)")),
            test!("print", &[nil()], success("nil")),
            test!("type-of", &[val(1)], success("number")),
            test!("type-of", &[val("s")], success("string")),
            test!("type-of", &[val(true)], success("bool")),
            test!("type-of", &[nil()], success("nil")),
            test!("type-of", &[kw("k")], success("keyword")),
            test!("type-of", &[sym("s")], success("symbol")),
            test!("type-of", &[quoted([1])], success("list")),
            test!(
                "type-of",
                &[find_builtin_op("+").unwrap().to_value()],
                success("function")
            ),
            test!(
                "type-of",
                &[Value::SpecialForm(find_special_form("if").unwrap())],
                success("function")
            ),
            test!(
                "doc",
                &[find_builtin_op("str-cat").unwrap().to_value()],
                success("Concats an arbitrary number of strings together")
            ),
            test!(
                "doc",
                &[Value::SpecialForm(find_special_form("do").unwrap())],
                success("Evaluates each expression in order and returns the value of the last one")
            ),
            test!("doc", &[val(1)], None),
        ];

        for (test_expr, result, expected) in test_cases {
            match (result, expected) {
                (Ok(actual), Some(expected_val)) => {
                    assert_eq!(actual, expected_val, "Failed for test case: {test_expr}");
                }
                (Err(_), None) => {} // Expected error
                (actual, expected) => panic!(
                    "Unexpected result for test case: {test_expr}\nGot result: {actual:?}, Expected: {expected:?}"
                ),
            }
        }
    }

    #[test]
    fn test_rand_int_range() {
        for _ in 0..200 {
            let Value::Number(n) = call_builtin("rand-int", &[val(3), val(7)]).unwrap() else {
                panic!("rand-int should return a number");
            };
            assert!((3.0..7.0).contains(&n), "{n} out of range");
            assert_eq!(n, n.floor());
        }
        // an empty range always yields min
        assert_eq!(call_builtin("rand-int", &[val(4), val(4)]).unwrap(), val(4));
    }

    #[test]
    fn test_io_builtins_return_nil() {
        assert_eq!(call_builtin("io-print", &[val("from io-print")]).unwrap(), nil());
        assert_eq!(call_builtin("io-println", &[val("from io-println")]).unwrap(), nil());
    }

    #[test]
    fn test_arity_errors() {
        for (name, args) in [
            ("+", vec![]),
            ("and", vec![]),
            ("not", vec![]),
            ("=", vec![val(1)]),
            ("str-repeat", vec![val("a")]),
            ("print", vec![val(1), val(2)]),
        ] {
            let err = call_builtin(name, &args).unwrap_err();
            assert_eq!(
                err.runtime_kind(),
                Some(RuntimeErrorKind::Arity),
                "{name} with {args:?}: {err}"
            );
        }
    }
}
