use crate::ast::{Function, FunctionBody, List, Parameter, Type, Value};
use crate::builtinops::{BuiltinOp, find_special_form, get_builtin_ops};
use crate::reader::{ParseConfig, parse_with_config};
use crate::{Error, MAX_EVAL_DEPTH, RunResult};
use std::cell::{OnceCell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, trace};

pub mod intooperation;

use intooperation::{IntoOperation, IntoVariadicOperation};

/// Expected number of arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly n arguments
    Exact(usize),
    /// At least n arguments
    AtLeast(usize),
    /// Between min and max arguments (inclusive)
    Between(usize, usize),
}

impl Arity {
    pub fn validate(self, got: usize) -> Result<(), Error> {
        let ok = match self {
            Arity::Exact(n) => got == n,
            Arity::AtLeast(n) => got >= n,
            Arity::Between(min, max) => (min..=max).contains(&got),
        };
        if ok {
            Ok(())
        } else {
            Err(Error::arity_error(self, got))
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
            Arity::Between(min, max) => write!(f, "{min} to {max}"),
        }
    }
}

struct Scope {
    bindings: RefCell<HashMap<String, Value>>,
    parent: Option<Environment>,
}

/// A scope in the environment chain. Cloning shares the scope.
#[derive(Clone)]
pub struct Environment(Rc<Scope>);

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    /// A new root scope
    pub fn new() -> Self {
        Self::from_parts(None, HashMap::new())
    }

    fn from_parts(parent: Option<Environment>, bindings: HashMap<String, Value>) -> Self {
        Environment(Rc::new(Scope {
            bindings: RefCell::new(bindings),
            parent,
        }))
    }

    /// A nested scope preloaded with `bindings`
    pub fn child<I>(&self, bindings: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        Self::from_parts(Some(self.clone()), bindings.into_iter().collect())
    }

    pub fn parent(&self) -> Option<&Environment> {
        self.0.parent.as_ref()
    }

    pub fn is_root(&self) -> bool {
        self.0.parent.is_none()
    }

    pub fn define(&self, name: impl Into<String>, value: Value) {
        self.0.bindings.borrow_mut().insert(name.into(), value);
    }

    /// Look a name up from this scope outward
    pub fn get(&self, name: &str) -> Option<Value> {
        let mut scope = Some(self);
        while let Some(env) = scope {
            if let Some(value) = env.0.bindings.borrow().get(name) {
                return Some(value.clone());
            }
            scope = env.parent();
        }
        None
    }

    /// Flatten the whole chain into a new parentless scope, keeping the
    /// innermost binding of each name
    pub fn snapshot(&self) -> Environment {
        Self::from_parts(None, self.get_all_bindings().into_iter().collect())
    }

    /// Get all bindings in this environment and its parents
    /// Returns a Vec of (name, value) pairs sorted by name
    pub fn get_all_bindings(&self) -> Vec<(String, Value)> {
        let mut bindings = HashMap::new();

        // Start with parent bindings (so they can be overridden by local bindings)
        if let Some(parent) = self.parent() {
            for (name, value) in parent.get_all_bindings() {
                bindings.insert(name, value);
            }
        }

        for (name, value) in self.0.bindings.borrow().iter() {
            bindings.insert(name.clone(), value.clone());
        }

        let mut result: Vec<_> = bindings.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}

impl PartialEq for Environment {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

// Names only: bound values can be whole functions
impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.0.bindings.borrow().keys().cloned().collect();
        names.sort();
        f.debug_struct("Environment")
            .field("bindings", &names)
            .field("parent", &self.0.parent)
            .finish()
    }
}

/// Interpreter state: the global scope, the active scope and the builtin table.
///
/// Each instance is independent. Global definitions persist across
/// [`Interpreter::run`] calls on the same instance.
pub struct Interpreter {
    global: Environment,
    current: Environment,
    builtins: HashMap<String, Value>,
    parse_config: ParseConfig,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        let global = Environment::new();
        global.define("true", Value::Bool(true));
        global.define("false", Value::Bool(false));

        let builtins = get_builtin_ops()
            .iter()
            .map(|op| (op.id.clone(), op.to_value()))
            .collect();

        Interpreter {
            current: global.clone(),
            global,
            builtins,
            parse_config: ParseConfig::default(),
        }
    }

    /// Use `config` when reading source passed to [`Interpreter::run`]
    pub fn with_parse_config(mut self, config: ParseConfig) -> Self {
        self.parse_config = config;
        self
    }

    pub fn global(&self) -> &Environment {
        &self.global
    }

    pub fn current(&self) -> &Environment {
        &self.current
    }

    /// Parse and evaluate a program, returning the value of its last top-level form.
    ///
    /// Parsing and runtime errors are reported in the envelope; nothing is
    /// evaluated when parsing fails.
    #[tracing::instrument(level = "debug", skip_all, fields(len = source.len()))]
    pub fn run(&mut self, source: &str) -> RunResult {
        let outcome = parse_with_config(source, self.parse_config)
            .and_then(|root| self.eval_program(&root));

        match outcome {
            Ok(result) => {
                debug!(result = ?result, "program finished");
                RunResult {
                    result,
                    error: None,
                }
            }
            Err(error) => {
                debug!(%error, "program failed");
                RunResult {
                    result: None,
                    error: Some(error),
                }
            }
        }
    }

    /// Evaluate each top-level form of a parsed program in order
    pub fn eval_program(&mut self, root: &List) -> Result<Option<Value>, Error> {
        let mut last = None;
        for form in &root.items {
            last = Some(self.eval(form)?);
        }
        Ok(last)
    }

    /// Evaluate a single expression in the current scope
    pub fn eval(&mut self, expr: &Value) -> Result<Value, Error> {
        self.value_of(expr, 0)
    }

    /// Symbols resolve, unquoted lists evaluate, everything else is returned as is
    pub(crate) fn value_of(&mut self, expr: &Value, depth: usize) -> Result<Value, Error> {
        if depth >= MAX_EVAL_DEPTH {
            return Err(Error::eval_error(format!(
                "Evaluation depth limit exceeded (max: {MAX_EVAL_DEPTH})"
            )));
        }
        ensure_sufficient_stack(|| match expr {
            Value::Symbol(name) => self.resolve(name),
            Value::List(list) if !list.quoted => self
                .eval_list(list, depth)
                .map_err(|err| err.or_location(list.span)),
            _ => Ok(expr.clone()),
        })
    }

    /// Evaluate the body of a `let` or user function. A list body is code even
    /// when quoted; any other body is evaluated as an expression.
    fn eval_body(&mut self, body: &Value, depth: usize) -> Result<Value, Error> {
        match body {
            Value::List(list) => ensure_sufficient_stack(|| {
                self.eval_list(list, depth)
                    .map_err(|err| err.or_location(list.span))
            }),
            _ => self.value_of(body, depth),
        }
    }

    /// Evaluate a list as a call. Quoted lists are treated as code here too,
    /// which is what `eval` relies on.
    pub(crate) fn eval_list(&mut self, list: &List, depth: usize) -> Result<Value, Error> {
        let Some((head, arg_exprs)) = list.items.split_first() else {
            return Ok(Value::Nil);
        };

        match self.value_of(head, depth + 1)? {
            Value::SpecialForm(form) => {
                trace!(form = form.name, "special form");
                (form.handler)(list, self, depth)
            }
            Value::Function(func) => {
                let args = arg_exprs
                    .iter()
                    .map(|arg| self.value_of(arg, depth + 1))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call_function(&func, args, depth)
            }
            // (x) with no arguments yields x
            value if arg_exprs.is_empty() => Ok(value),
            value => Err(Error::not_a_function(&value)),
        }
    }

    /// Bind evaluated arguments to `func`'s parameters and run it.
    ///
    /// Native functions are strict about argument counts and receive arguments
    /// coerced to their declared types. User functions bind as many parameters as
    /// there are arguments and run in a fresh scope under their closure.
    pub fn call_function(
        &mut self,
        func: &Function,
        args: Vec<Value>,
        depth: usize,
    ) -> Result<Value, Error> {
        trace!(function = %func.name, argc = args.len(), "call");
        match &func.body {
            FunctionBody::Native(op) => {
                let args = bind_native_args(&func.params, args)?;
                op(args)
            }
            FunctionBody::Lambda { body, closure } => {
                let bindings = func
                    .params
                    .iter()
                    .zip(args)
                    .map(|(param, arg)| {
                        arg.coerce_to(param.ty)
                            .map(|value| (param.name.clone(), value))
                    })
                    .collect::<Result<Vec<_>, Error>>()?;

                let scope = closure.get().unwrap_or(&self.global).clone();
                let saved = std::mem::replace(&mut self.current, scope);
                self.enter_scope(bindings);
                let result = self.eval_body(body, depth + 1);
                self.current = saved;
                result
            }
        }
    }

    /// Push a nested scope preloaded with `bindings` and make it current
    pub fn enter_scope<I>(&mut self, bindings: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        self.current = self.current.child(bindings);
        trace!("enter scope");
    }

    /// Restore the parent of the current scope.
    ///
    /// # Panics
    ///
    /// Panics when the current scope is the root; scopes are always exited by the
    /// form that entered them.
    pub fn exit_scope(&mut self) {
        let Some(parent) = self.current.parent().cloned() else {
            panic!("exit_scope called on the root environment");
        };
        self.current = parent;
        trace!("exit scope");
    }

    /// Resolve a symbol: scope chain first, then globals, then special forms,
    /// then builtins
    pub fn resolve(&self, name: &str) -> Result<Value, Error> {
        // Function scopes are rooted at their detached closure, not the globals
        if let Some(value) = self.current.get(name).or_else(|| self.global.get(name)) {
            return Ok(value);
        }
        if let Some(form) = find_special_form(name) {
            return Ok(Value::SpecialForm(form));
        }
        self.builtins
            .get(name)
            .cloned()
            .ok_or_else(|| Error::unbound_symbol(name))
    }

    /// Bind `name` in the root scope, whatever scope is current
    pub fn define_global(&self, name: impl Into<String>, value: Value) {
        self.global.define(name, value);
    }

    /// Names of all builtin functions, sorted
    pub fn builtin_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.builtins.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn install(&mut self, op: BuiltinOp) {
        debug!(name = %op.id, "register builtin");
        self.builtins.insert(op.id.clone(), op.to_value());
    }

    /// Register a strongly-typed Rust function as a builtin using automatic
    /// argument extraction and result conversion.
    ///
    /// `params` declares a name and type for each parameter; arguments are
    /// coerced toward those types before `func` is invoked, so the Rust
    /// parameter types should match them (`f64` for number, `bool`, `&str` or
    /// `String` for string, `Value` for any).
    ///
    /// ```
    /// use toylisp::ast::{Type, Value};
    /// use toylisp::evaluator::Interpreter;
    ///
    /// let mut interp = Interpreter::new();
    /// interp.register_builtin_operation::<_, (f64, f64)>(
    ///     "hypot",
    ///     &[("x", Type::Number), ("y", Type::Number)],
    ///     |x: f64, y: f64| x.hypot(y),
    /// );
    /// assert_eq!(interp.run("(hypot 3 \"4\")").result, Some(Value::Number(5.0)));
    /// ```
    ///
    /// Builtins can also return `Result<R, Error>`; the error surfaces from `run`
    /// unchanged.
    pub fn register_builtin_operation<F, Args>(
        &mut self,
        name: &str,
        params: &[(&str, Type)],
        func: F,
    ) where
        F: IntoOperation<Args> + 'static,
    {
        let params = params
            .iter()
            .map(|(name, ty)| Parameter::new(*name, *ty))
            .collect();
        self.install(BuiltinOp::fixed(
            name,
            "Host function",
            params,
            Type::Any,
            func.into_operation(),
        ));
    }

    /// Register a builtin whose Rust signature ends in a rest parameter
    /// (`ValueIter`, `NumIter`, `BoolIter` or `StringIter`).
    ///
    /// `rest` declares the name and element type of the trailing arguments.
    /// `arity` is checked at call time, since the minimum number of arguments
    /// isn't derivable from the signature alone.
    pub fn register_variadic_builtin_operation<F, Args>(
        &mut self,
        name: &str,
        params: &[(&str, Type)],
        rest: (&str, Type),
        arity: Arity,
        func: F,
    ) where
        F: IntoVariadicOperation<Args> + 'static,
    {
        let params = params
            .iter()
            .map(|(name, ty)| Parameter::new(*name, *ty))
            .chain(std::iter::once(Parameter::rest(rest.0, rest.1)))
            .collect();
        self.install(BuiltinOp::variadic(
            name,
            "Host function",
            params,
            Type::Any,
            arity,
            func.into_variadic_operation(),
        ));
    }
}

/// Run `f`, first moving to a fresh stack segment when the current one is
/// close to exhausted, so deep recursion is bounded by `MAX_EVAL_DEPTH`
/// rather than the thread's stack size.
#[inline]
#[cfg(not(target_arch = "wasm32"))]
fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    const RED_ZONE: usize = 100 * 1024;
    const STACK_PER_RECURSION: usize = 1024 * 1024;

    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

#[inline]
#[cfg(target_arch = "wasm32")]
fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}

/// Positional binding for native functions: every declared parameter must be
/// supplied, and only a trailing rest parameter accepts more.
fn bind_native_args(params: &[Parameter], args: Vec<Value>) -> Result<Vec<Value>, Error> {
    let (fixed, rest) = match params.split_last() {
        Some((last, init)) if last.is_rest => (init, Some(last)),
        _ => (params, None),
    };

    let arity = match rest {
        Some(_) => Arity::AtLeast(fixed.len()),
        None => Arity::Exact(fixed.len()),
    };
    arity.validate(args.len())?;

    args.into_iter()
        .enumerate()
        .map(|(i, arg)| {
            let ty = fixed.get(i).or(rest).map_or(Type::Any, |param| param.ty);
            arg.coerce_to(ty)
        })
        .collect()
}

/// Signature shared by all special-form handlers: the raw form (head included),
/// the interpreter, and the current evaluation depth
pub type SpecialFormFn = fn(&List, &mut Interpreter, usize) -> Result<Value, Error>;

/// Operands of a special form, without its head
fn operands(form: &List) -> &[Value] {
    form.items.get(1..).unwrap_or(&[])
}

fn expect_bool(value: Value, form: &str) -> Result<bool, Error> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(Error::type_error(format!(
            "{form} condition must be a bool, got {other}"
        ))),
    }
}

/// Evaluate do special form
pub(crate) fn eval_do(form: &List, interp: &mut Interpreter, depth: usize) -> Result<Value, Error> {
    let mut last = Value::Nil;
    for expr in operands(form) {
        last = interp.value_of(expr, depth + 1)?;
    }
    Ok(last)
}

/// Evaluate if special form
pub(crate) fn eval_if(form: &List, interp: &mut Interpreter, depth: usize) -> Result<Value, Error> {
    let args = operands(form);
    Arity::Between(2, 3).validate(args.len())?;

    let condition = interp.value_of(&args[0], depth + 1)?;
    if expect_bool(condition, "if")? {
        interp.value_of(&args[1], depth + 1)
    } else if let Some(else_expr) = args.get(2) {
        interp.value_of(else_expr, depth + 1)
    } else {
        Ok(Value::Nil)
    }
}

/// Evaluate case special form
///
/// Branches are tried in order; a branch whose condition is `:else` is only
/// remembered, and used when no other branch matched.
pub(crate) fn eval_case(
    form: &List,
    interp: &mut Interpreter,
    depth: usize,
) -> Result<Value, Error> {
    let mut else_branch = None;

    for branch in operands(form) {
        let items: &[Value] = match branch {
            Value::List(list) => list.items.as_slice(),
            _ => &[],
        };
        let [condition, result] = items else {
            return Err(Error::type_error(format!(
                "case branch must be a (condition result) list, got {branch}"
            )));
        };

        match interp.value_of(condition, depth + 1)? {
            Value::Keyword(k) if k == "else" => else_branch = Some(result),
            value => {
                if expect_bool(value, "case")? {
                    return interp.value_of(result, depth + 1);
                }
            }
        }
    }

    match else_branch {
        Some(result) => interp.value_of(result, depth + 1),
        None => Ok(Value::Nil),
    }
}

/// Evaluate eval special form
pub(crate) fn eval_eval(
    form: &List,
    interp: &mut Interpreter,
    depth: usize,
) -> Result<Value, Error> {
    let [expr] = operands(form) else {
        return Err(Error::arity_error(Arity::Exact(1), operands(form).len()));
    };
    match interp.value_of(expr, depth + 1)? {
        Value::List(list) => interp
            .eval_list(&list, depth + 1)
            .map_err(|err| err.or_location(list.span)),
        value => Ok(value),
    }
}

/// Evaluate let special form
pub(crate) fn eval_let(
    form: &List,
    interp: &mut Interpreter,
    depth: usize,
) -> Result<Value, Error> {
    let [binding, body] = operands(form) else {
        return Err(Error::arity_error(Arity::Exact(2), operands(form).len()));
    };
    let Value::List(binding) = binding else {
        return Err(Error::type_error(format!(
            "let binding must be a (symbol value) list, got {binding}"
        )));
    };
    let (name, value_expr) = match binding.items.as_slice() {
        [Value::Symbol(name), value_expr] => (name, value_expr),
        [target, _] => {
            return Err(Error::type_error(format!(
                "let binding target must be a symbol, got {target}"
            )));
        }
        items => return Err(Error::arity_error(Arity::Exact(2), items.len())),
    };

    let value = interp.value_of(value_expr, depth + 1)?;
    interp.enter_scope([(name.clone(), value)]);
    let result = interp.eval_body(body, depth + 1);
    interp.exit_scope();
    result
}

/// Evaluate def special form
pub(crate) fn eval_def(
    form: &List,
    interp: &mut Interpreter,
    depth: usize,
) -> Result<Value, Error> {
    match operands(form) {
        [Value::Symbol(name), expr] => {
            let value = interp.value_of(expr, depth + 1)?;
            debug!(%name, "def");
            interp.define_global(name.clone(), value.clone());
            Ok(value)
        }
        [target, _] => Err(Error::type_error(format!(
            "def requires a symbol, got {target}"
        ))),
        args => Err(Error::arity_error(Arity::Exact(2), args.len())),
    }
}

/// Evaluate defun special form
///
/// The closure is a detached snapshot of the globals and the current chain,
/// innermost binding winning, so captured names are frozen. Names it lacks,
/// including the function's own name, resolve through the live globals at
/// call time. Leaving the function out of its own closure keeps the
/// `Rc` graph acyclic, so dropping the interpreter frees every function.
pub(crate) fn eval_defun(
    form: &List,
    interp: &mut Interpreter,
    _depth: usize,
) -> Result<Value, Error> {
    let [name, param_list, body] = operands(form) else {
        return Err(Error::arity_error(Arity::Exact(3), operands(form).len()));
    };
    let Value::Symbol(name) = name else {
        return Err(Error::type_error(format!(
            "defun requires a symbol name, got {name}"
        )));
    };
    let Value::List(param_list) = param_list else {
        return Err(Error::type_error(format!(
            "defun parameters must be a list, got {param_list}"
        )));
    };

    let mut params: Vec<Parameter> = Vec::new();
    for param in &param_list.items {
        let Value::Symbol(param_name) = param else {
            return Err(Error::type_error(format!(
                "defun parameters must be symbols, got {param}"
            )));
        };
        if params.iter().any(|p| &p.name == param_name) {
            return Err(Error::eval_error(format!(
                "Duplicate parameter name: {param_name}"
            )));
        }
        params.push(Parameter::new(param_name.clone(), Type::Any));
    }

    let func = Rc::new(Function {
        name: name.clone(),
        doc: "Custom function".to_owned(),
        params,
        return_type: Type::Any,
        body: FunctionBody::Lambda {
            body: Box::new(body.clone()),
            closure: OnceCell::new(),
        },
    });

    debug!(%name, params = %func.signature(), "defun");
    interp.define_global(name.clone(), Value::Function(Rc::clone(&func)));
    if let FunctionBody::Lambda { closure, .. } = &func.body {
        let mut captured: HashMap<String, Value> =
            interp.global.get_all_bindings().into_iter().collect();
        captured.extend(interp.current.get_all_bindings());
        captured.remove(name.as_str());
        let _ = closure.set(Environment::from_parts(None, captured));
    }
    Ok(Value::Function(func))
}
