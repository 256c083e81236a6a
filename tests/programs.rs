//! Whole-program tests through the public entry points.

use pretty_assertions::assert_eq;
use toylisp::ast::{Value, kw, quoted, val};
use toylisp::evaluator::Interpreter;
use toylisp::reader::{ParseConfig, parse, parse_with_config};
use toylisp::{ParseErrorKind, RuntimeErrorKind, run};

/// Expected outcome of a program
#[derive(Debug)]
enum Outcome {
    Returns(Value),                 // Program finishes with this value
    Empty,                          // Program has no forms
    Fails(RuntimeErrorKind),        // Evaluation stops with this error kind
    FailsToParse(ParseErrorKind),   // Nothing is evaluated
}
use Outcome::*;

fn returns<T: Into<Value>>(value: T) -> Outcome {
    Returns(val(value))
}

fn check_program(source: &str, expected: &Outcome) {
    let outcome = run(source);
    assert_eq!(
        outcome.had_error(),
        matches!(expected, Fails(_) | FailsToParse(_)),
        "'{source}': {outcome:?}"
    );

    match expected {
        Returns(value) => assert_eq!(outcome.result.as_ref(), Some(value), "'{source}'"),
        Empty => assert_eq!(outcome.result, None, "'{source}'"),
        Fails(kind) => {
            let error = outcome.error.as_ref().map(|e| e.runtime_kind());
            assert_eq!(error, Some(Some(*kind)), "'{source}': {outcome:?}");
            assert_eq!(outcome.result, None);
        }
        FailsToParse(kind) => match &outcome.error {
            Some(toylisp::Error::Parse(e)) => assert_eq!(e.kind, *kind, "'{source}': {e}"),
            other => panic!("'{source}' should fail to parse, got {other:?}"),
        },
    }
}

#[test]
fn test_programs() {
    let programs: Vec<(&str, Outcome)> = vec![
        ("(+ 1 2 3 4 5)", returns(15)),
        ("(if (< 2 5) 1 0)", returns(1)),
        ("(str-upper \"hi\")", returns("HI")),
        ("(undefined-symbol)", Fails(RuntimeErrorKind::UnboundSymbol)),
        (
            "(defun fact (n) (if (<= n 1) 1 (* n (fact (- n 1))))) (fact 5)",
            returns(120),
        ),
        (
            "(defun sum (n) (if (= n 0) 0 (+ n (sum (- n 1))))) (sum 1000)",
            returns(500500),
        ),
        ("(let (x 20) '(+ x 1))", returns(21)),
        ("42", returns(42)),
        ("-7.25", returns(-7.25)),
        ("1.5.2", returns(1.5)),
        ("'(1 2 3)", Returns(quoted([1, 2, 3]))),
        ("'(a b)", Returns(quoted([toylisp::ast::sym("a"), toylisp::ast::sym("b")]))),
        ("(// 7 2)", returns(3)),
        ("(% 7 3)", returns(1)),
        ("(- 10 1 2 3)", returns(4)),
        ("(/ 1 0)", returns(f64::INFINITY)),
        ("(case (false 1) (:else 2) (true 3))", returns(3)),
        ("(case (false 1) (:else 2))", returns(2)),
        ("(case (false 1))", Returns(Value::Nil)),
        ("(eval '(+ 1 2))", returns(3)),
        ("(let (x 2) (let (y 3) (* x y)))", returns(6)),
        ("(let (x 1) x) x", Fails(RuntimeErrorKind::UnboundSymbol)),
        ("(1 2 3)", Fails(RuntimeErrorKind::NotAFunction)),
        ("(if 0 1 2)", Fails(RuntimeErrorKind::Type)),
        ("(str-len :kw)", Fails(RuntimeErrorKind::Type)),
        ("(str-repeat \"a\")", Fails(RuntimeErrorKind::Arity)),
        ("", Empty),
        ("   \n\t ", Empty),
        ("1 2 3", returns(3)),
        ("(def a 1) (def b 2) (+ a b)", returns(3)),
        // coercion toward declared parameter types
        ("(str-cat \"n=\" 5)", returns("n=5")),
        ("(str-cat \"ok: \" true)", returns("ok: true")),
        ("(+ \"2\" 3)", returns(5)),
        ("(and 1 \"x\")", returns(true)),
        ("(and 0 true)", returns(false)),
        ("(or \"\" false)", returns(false)),
        ("(str-len 12345)", returns(5)),
        // reflection
        ("(type-of :k)", returns("keyword")),
        ("(type-of '(1))", returns("list")),
        ("(type-of str-cat)", returns("function")),
        ("(print '(1 \"two\" :three))", returns("'(1 \"two\" :three)")),
        ("(doc str-cat)", returns("Concats an arbitrary number of strings together")),
        ("(defun f () 1) (doc f)", returns("Custom function")),
        ("(read \"(\")", Returns(Value::Nil)),
        ("(eval (read \"(* 6 7)\"))", returns(42)),
        ("(io-print \"printed by a test\")", Returns(Value::Nil)),
        // parse failures
        ("(+ 1 2", FailsToParse(ParseErrorKind::Incomplete)),
        ("(+ 1 2))", FailsToParse(ParseErrorKind::InvalidSyntax)),
        ("\"open", FailsToParse(ParseErrorKind::Incomplete)),
        ("\"\\x\"", FailsToParse(ParseErrorKind::InvalidEscape)),
    ];

    for (source, expected) in &programs {
        check_program(source, expected);
    }
}

#[test]
fn test_session_state() {
    let mut interp = Interpreter::new();

    assert_eq!(interp.run("(def counter 1)").result, Some(val(1)));
    assert_eq!(interp.run("(def counter (+ counter 1))").result, Some(val(2)));
    assert_eq!(interp.run("counter").result, Some(val(2)));

    interp.run("(defun inc (n) (+ n 1))");
    assert_eq!(interp.run("(inc counter)").result, Some(val(3)));

    // failed runs don't discard earlier definitions
    assert!(interp.run("(inc missing)").had_error());
    assert_eq!(interp.run("(inc 9)").result, Some(val(10)));

    // a fresh interpreter starts clean
    assert!(Interpreter::new().run("counter").had_error());
}

#[test]
fn test_closures_capture_at_definition() {
    let program = r#"
        (def greeting "hello")
        (defun greet (name) (str-cat greeting ", " name))
        (def greeting "goodbye")
        (greet "world")
    "#;
    assert_eq!(run(program).result, Some(val("hello, world")));

    let program = r#"
        (defun make-adder-result (x)
            (let (offset 100)
                (do (defun add-offset (n) (+ n offset x))
                    (add-offset 1))))
        (make-adder-result 5)
    "#;
    assert_eq!(run(program).result, Some(val(106)));
}

#[test]
fn test_keyword_and_else_behavior() {
    let program = r#"
        (defun classify (n)
            (case (:else :big)
                  ((< n 0) :negative)
                  ((= n 0) :zero)
                  ((< n 10) :small)))
        (str-cat (print (classify -1)) (print (classify 0)) (print (classify 3)) (print (classify 50)))
    "#;
    assert_eq!(
        run(program).result,
        Some(val(":negative:zero:small:big"))
    );
    assert_eq!(run("(classify)").result, None);
    assert_eq!(run(":else").result, Some(kw("else")));
}

#[test]
fn test_printed_primitives_read_back() {
    for source in ["15", "-2.5", "\"a \\\"b\\\" \\\\ \\n \\t\"", ":key", "'(1 (2 \"x\") :k)"] {
        let root = parse(source).unwrap_or_else(|e| panic!("{source}: {e}"));
        let printed = root.items[0].to_string();
        assert_eq!(printed, source);

        let reread = parse(&printed).unwrap_or_else(|e| panic!("{printed}: {e}"));
        assert_eq!(reread.items[0], root.items[0]);
    }
}

#[test]
fn test_comments_when_enabled() {
    let source = "; setup\n(def x 2) ; two\n(* x 21)";
    let config = ParseConfig {
        handle_comments: true,
        ..ParseConfig::default()
    };
    assert_eq!(parse_with_config(source, config).map(|root| root.items.len()), Ok(2));

    let mut interp = Interpreter::new().with_parse_config(config);
    assert_eq!(interp.run(source).result, Some(val(42)));

    // without comment handling `;` is an ordinary symbol character
    assert!(run(source).had_error());
}

#[test]
fn test_error_reports_location() {
    let outcome = run("(def x 1)\n\n   (+ x (oops))");
    let error = outcome.error.unwrap_or_else(|| panic!("should fail: {:?}", outcome.result));
    assert_eq!(error.runtime_kind(), Some(RuntimeErrorKind::UnboundSymbol));
    assert_eq!(error.location().map(|span| (span.line, span.col)), Some((3, 9)));
    assert_eq!(
        error.to_string(),
        "UnboundSymbolError: Unbound symbol 'oops' at line 3, col 9"
    );

    let outcome = run("(+ 1\n  2))");
    let error = outcome.error.unwrap_or_else(|| panic!("should fail"));
    assert!(error.is_parse_error());
    assert!(error.to_string().starts_with("ParsingError: "), "{error}");
}
