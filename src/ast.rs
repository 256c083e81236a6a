//! This module defines the core value model of the interpreter. The main enum,
//! [`Value`], is used both as the expression tree produced by the reader and as the
//! runtime representation of every computed result: numbers, strings, symbols,
//! keywords, lists (quoted or not), functions and special forms.
//!
//! Alongside the value model this module holds the closed coercion matrix used when
//! binding arguments to typed parameters ([`Value::coerce_to`]), the round-trippable
//! code form of a value (its `Display` impl) and the human-oriented rendering used by
//! shells ([`Value::display`]). Ergonomic helpers such as [`val`], [`sym`], [`kw`] and
//! [`list`] make building trees in code and tests short.

use crate::Error;
use crate::Span;
use crate::builtinops::SpecialForm;
use crate::evaluator::Environment;
use crate::evaluator::intooperation::OperationFn;
use std::cell::OnceCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// Type alias for number values in interpreter
pub type NumberType = f64;

/// Declared type of a parameter or return value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    /// Universal type, never coerced
    Any,
    Nil,
    Bool,
    Number,
    String,
    Symbol,
    Keyword,
    List,
    Function,
}

impl Type {
    pub fn name(self) -> &'static str {
        match self {
            Type::Any => "any",
            Type::Nil => "nil",
            Type::Bool => "bool",
            Type::Number => "number",
            Type::String => "string",
            Type::Symbol => "symbol",
            Type::Keyword => "keyword",
            Type::List => "list",
            Type::Function => "function",
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A declared function parameter. A rest parameter absorbs all remaining arguments
/// and may only appear last.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub ty: Type,
    pub is_rest: bool,
}

impl Parameter {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Parameter {
            name: name.into(),
            ty,
            is_rest: false,
        }
    }

    pub fn rest(name: impl Into<String>, ty: Type) -> Self {
        Parameter {
            name: name.into(),
            ty,
            is_rest: true,
        }
    }
}

/// How a function produces its result
pub enum FunctionBody {
    /// Builtin implemented in Rust, receives coerced arguments
    Native(Arc<OperationFn>),
    /// User function defined with `defun`. The closure is filled in right after the
    /// function has been registered globally.
    Lambda {
        body: Box<Value>,
        closure: OnceCell<Environment>,
    },
}

/// A callable value: builtin or user-defined
pub struct Function {
    pub name: String,
    pub doc: String,
    pub params: Vec<Parameter>,
    pub return_type: Type,
    pub body: FunctionBody,
}

impl Function {
    pub fn is_native(&self) -> bool {
        matches!(self.body, FunctionBody::Native(_))
    }

    /// Parameter list as it appears in docs: `(a, b, ...rest)`
    pub fn signature(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| {
                if p.is_rest {
                    format!("...{}", p.name)
                } else {
                    p.name.clone()
                }
            })
            .collect();
        format!("({})", params.join(", "))
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.body {
            FunctionBody::Native(_) => write!(f, "Native({} {})", self.name, self.signature()),
            FunctionBody::Lambda { body, .. } => {
                write!(f, "Lambda({} {}, body={body:?})", self.name, self.signature())
            }
        }
    }
}

/// A list node. `quoted` lists are data and evaluate to themselves; unquoted lists
/// are calls. The span is where the list opened in source, when it came from the reader.
#[derive(Clone, Default)]
pub struct List {
    pub items: Vec<Value>,
    pub quoted: bool,
    pub span: Option<Span>,
}

impl List {
    pub fn new(items: Vec<Value>, quoted: bool) -> Self {
        List {
            items,
            quoted,
            span: None,
        }
    }
}

// Spans are diagnostics only and don't participate in equality
impl PartialEq for List {
    fn eq(&self, other: &Self) -> bool {
        self.quoted == other.quoted && self.items == other.items
    }
}

impl fmt::Debug for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", if self.quoted { "Quoted" } else { "List" })?;
        for (i, v) in self.items.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v:?}")?;
        }
        write!(f, ")")
    }
}

/// Core value type of the interpreter
///
/// To build a tree, use the ergonomic helper functions:
/// - `val(42)` for values, `sym("name")` for symbols, `kw("else")` for keywords
/// - `list([sym("+"), val(1)])` for code, `quoted([1, 2])` for data
#[derive(Clone)]
pub enum Value {
    /// Absence of a value
    Nil,
    Bool(bool),
    /// IEEE double
    Number(NumberType),
    String(String),
    /// Identifier, resolved through the environment chain when evaluated
    Symbol(String),
    /// Self-evaluating name, stored without its leading colon
    Keyword(String),
    List(List),
    Function(Rc<Function>),
    SpecialForm(&'static SpecialForm),
}

impl Value {
    pub fn type_of(&self) -> Type {
        match self {
            Value::Nil => Type::Nil,
            Value::Bool(_) => Type::Bool,
            Value::Number(_) => Type::Number,
            Value::String(_) => Type::String,
            Value::Symbol(_) => Type::Symbol,
            Value::Keyword(_) => Type::Keyword,
            Value::List(_) => Type::List,
            Value::Function(_) | Value::SpecialForm(_) => Type::Function,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Coerce this value toward `target`.
    ///
    /// | source \ target | bool        | number        | string          |
    /// |-----------------|-------------|---------------|-----------------|
    /// | bool            | unchanged   | NaN           | "true"/"false"  |
    /// | number          | `n > 0`     | unchanged     | decimal text    |
    /// | string          | non-empty   | float prefix  | unchanged       |
    /// | nil/list/fn     | true        | NaN           | ""              |
    /// | symbol/keyword  | error       | error         | error           |
    ///
    /// `any` and exact matches return the value unchanged. Targets outside the three
    /// primitive types only accept exact matches.
    pub fn coerce_to(self, target: Type) -> Result<Value, Error> {
        let source = self.type_of();
        if target == Type::Any || target == source {
            return Ok(self);
        }
        if matches!(self, Value::Symbol(_) | Value::Keyword(_)) {
            return Err(Error::type_error(format!(
                "cannot coerce {source} {self} to {target}"
            )));
        }

        let coerced = match (target, &self) {
            (Type::Bool, Value::Number(n)) => Value::Bool(*n > 0.0),
            (Type::Bool, Value::String(s)) => Value::Bool(!s.is_empty()),
            (Type::Bool, _) => Value::Bool(true),

            (Type::Number, Value::String(s)) => Value::Number(parse_float_prefix(s)),
            (Type::Number, _) => Value::Number(f64::NAN),

            (Type::String, Value::Bool(b)) => Value::String(b.to_string()),
            (Type::String, Value::Number(n)) => Value::String(format_number(*n)),
            (Type::String, _) => Value::String(String::new()),

            _ => {
                return Err(Error::type_error(format!(
                    "expected {target}, got {source} {self}"
                )));
            }
        };
        Ok(coerced)
    }

    /// Human-oriented rendering used by shells: `<Nil>`, strings quoted but not
    /// escaped, functions as `fn name (params)`
    pub fn display(&self) -> String {
        match self {
            Value::Nil => "<Nil>".to_owned(),
            Value::String(s) => format!("\"{s}\""),
            Value::Keyword(k) => format!(":{k}"),
            Value::List(list) => {
                let items: Vec<String> = list.items.iter().map(Value::display).collect();
                let open = if list.quoted { "'(" } else { "(" };
                format!("{open}{})", items.join(" "))
            }
            Value::Function(func) => format!("fn {} {}", func.name, func.signature()),
            Value::SpecialForm(form) => format!("< {} (special form) >", form.name),
            Value::Bool(_) | Value::Number(_) | Value::Symbol(_) => self.to_string(),
        }
    }
}

/// Parse the longest numeric prefix of `text` the way a lenient float reader does:
/// leading whitespace is skipped, `"1.5.2"` reads as `1.5`, and text without a
/// numeric prefix yields NaN.
pub fn parse_float_prefix(text: &str) -> NumberType {
    let text = text.trim_start();
    let bytes = text.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    if text[end..].starts_with("Infinity") {
        return text[..end + "Infinity".len()].parse().unwrap_or(f64::NAN);
    }

    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;
    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        digits += frac_end - frac_start;
        if digits > 0 {
            end = frac_end;
        }
    }
    if digits == 0 {
        return f64::NAN;
    }

    // Optional exponent, only taken when it has at least one digit
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && matches!(bytes[exp_end], b'+' | b'-') {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    text[..end].parse().unwrap_or(f64::NAN)
}

/// Decimal text of a number: integral values print without a fractional part,
/// negative zero prints as `0`
pub fn format_number(n: NumberType) -> String {
    if n.is_nan() {
        "NaN".to_owned()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_owned()
    } else if n == 0.0 {
        "0".to_owned()
    } else {
        format!("{n}")
    }
}

/// Escape a string body for the code form
fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({})", format_number(*n)),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Symbol(s) => write!(f, "Symbol({s})"),
            Value::Keyword(k) => write!(f, "Keyword({k})"),
            Value::List(list) => write!(f, "{list:?}"),
            Value::Function(func) => write!(f, "Function({func:?})"),
            Value::SpecialForm(form) => write!(f, "SpecialForm({})", form.name),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b))
            | (Value::Symbol(a), Value::Symbol(b))
            | (Value::Keyword(a), Value::Keyword(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::SpecialForm(a), Value::SpecialForm(b)) => a.name == b.name,
            _ => false,
        }
    }
}

/// Code form of a value. Primitive literals print back to source that reads as an
/// equal value.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::String(s) => write!(f, "\"{}\"", escape_string(s)),
            Value::Symbol(s) => f.write_str(s),
            Value::Keyword(k) => write!(f, ":{k}"),
            Value::List(list) => {
                f.write_str(if list.quoted { "'(" } else { "(" })?;
                for (i, item) in list.items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            Value::Function(func) => write!(f, "#<function:{}>", func.name),
            Value::SpecialForm(form) => write!(f, "#<special-form:{}>", form.name),
        }
    }
}

// From trait implementations for Value - enables .into() conversion
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<NumberType> for Value {
    fn from(n: NumberType) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(NumberType::from(n))
    }
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Value::Nil
    }
}

impl From<List> for Value {
    fn from(list: List) -> Self {
        Value::List(list)
    }
}

// Fallible conversions from `Value` back into primitive Rust types.

impl std::convert::TryInto<NumberType> for Value {
    type Error = Error;

    fn try_into(self) -> Result<NumberType, Error> {
        if let Value::Number(n) = self {
            Ok(n)
        } else {
            Err(Error::type_error(format!("expected number, got {self}")))
        }
    }
}

impl std::convert::TryInto<bool> for Value {
    type Error = Error;

    fn try_into(self) -> Result<bool, Error> {
        if let Value::Bool(b) = self {
            Ok(b)
        } else {
            Err(Error::type_error(format!("expected bool, got {self}")))
        }
    }
}

impl std::convert::TryInto<String> for Value {
    type Error = Error;

    fn try_into(self) -> Result<String, Error> {
        if let Value::String(s) = self {
            Ok(s)
        } else {
            Err(Error::type_error(format!("expected string, got {self}")))
        }
    }
}

/// Helper function for creating values - works great in mixed lists!
pub fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// Helper function for creating symbols
pub fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::Symbol(name.as_ref().to_owned())
}

/// Helper function for creating keywords (name without the colon)
pub fn kw<S: AsRef<str>>(name: S) -> Value {
    Value::Keyword(name.as_ref().to_owned())
}

pub fn nil() -> Value {
    Value::Nil
}

/// Unquoted list: code
pub fn list<T: Into<Value>, I: IntoIterator<Item = T>>(items: I) -> Value {
    Value::List(List::new(items.into_iter().map(Into::into).collect(), false))
}

/// Quoted list: data
pub fn quoted<T: Into<Value>, I: IntoIterator<Item = T>>(items: I) -> Value {
    Value::List(List::new(items.into_iter().map(Into::into).collect(), true))
}
