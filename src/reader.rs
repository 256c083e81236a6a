use nom::{
    IResult, Parser,
    bytes::complete::{take_while, take_while1},
    character::complete::{char, not_line_ending, satisfy},
    combinator::{opt, recognize},
    error::ErrorKind,
    sequence::{pair, preceded},
};

use crate::ast::{List, Value, parse_float_prefix};
use crate::{Error, MAX_PARSE_DEPTH, ParseError, ParseErrorKind, Span};

/// Reader settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseConfig {
    /// Treat `;` at a token boundary as the start of a comment running to end of line
    pub handle_comments: bool,
    /// Maximum list nesting
    pub max_depth: usize,
}

impl Default for ParseConfig {
    fn default() -> Self {
        ParseConfig {
            handle_comments: false,
            max_depth: MAX_PARSE_DEPTH,
        }
    }
}

/// Characters that end an atom: any Unicode whitespace, and parens
fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')')
}

/// Parse a number: a digit, or `-` directly followed by a digit, then any run of
/// digits and dots. The run is read as its longest valid float prefix.
fn parse_number(input: &str) -> IResult<&str, Value> {
    let (input, number_str) = recognize(pair(
        opt(char('-')),
        pair(
            satisfy(|c| c.is_ascii_digit()),
            take_while(|c: char| c.is_ascii_digit() || c == '.'),
        ),
    ))
    .parse(input)?;

    Ok((input, Value::Number(parse_float_prefix(number_str))))
}

/// Parse a string literal
///
/// Fails with `ErrorKind::Escaped` pointing at the bad escape character, or
/// `ErrorKind::Eof` when input ends before the closing quote.
fn parse_string(input: &str) -> IResult<&str, Value> {
    let (mut remaining, _) = char('"').parse(input)?;
    let mut chars = String::new();

    loop {
        let mut char_iter = remaining.chars();
        match char_iter.next() {
            Some('"') => {
                return Ok((char_iter.as_str(), Value::String(chars)));
            }
            Some('\\') => {
                let escaped = char_iter.as_str();
                match char_iter.next() {
                    Some('n') => chars.push('\n'),
                    Some('t') => chars.push('\t'),
                    Some('\\') => chars.push('\\'),
                    Some('"') => chars.push('"'),
                    Some(_) => {
                        return Err(nom::Err::Failure(nom::error::Error::new(
                            escaped,
                            ErrorKind::Escaped,
                        )));
                    }
                    None => {
                        return Err(nom::Err::Failure(nom::error::Error::new(
                            escaped,
                            ErrorKind::Eof,
                        )));
                    }
                }
                remaining = char_iter.as_str();
            }
            Some(ch) => {
                chars.push(ch);
                remaining = char_iter.as_str();
            }
            None => {
                return Err(nom::Err::Failure(nom::error::Error::new(
                    remaining,
                    ErrorKind::Eof,
                )));
            }
        }
    }
}

/// Parse a keyword: `:` followed by at least one atom character
fn parse_keyword(input: &str) -> IResult<&str, Value> {
    let (input, name) = preceded(char(':'), take_while1(|c| !is_delimiter(c))).parse(input)?;
    Ok((input, Value::Keyword(name.to_owned())))
}

/// Parse a symbol: any other run of non-whitespace, non-paren characters
fn parse_symbol(input: &str) -> IResult<&str, Value> {
    let (input, name) = take_while1(|c| !is_delimiter(c)).parse(input)?;
    Ok((input, Value::Symbol(name.to_owned())))
}

fn parse_atom(input: &str) -> IResult<&str, Value> {
    nom::branch::alt((parse_number, parse_string, parse_keyword, parse_symbol)).parse(input)
}

struct Reader<'a> {
    source: &'a str,
    /// Byte offsets where each line starts
    line_starts: Vec<usize>,
    config: ParseConfig,
}

impl<'a> Reader<'a> {
    fn new(source: &'a str, config: ParseConfig) -> Self {
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Reader {
            source,
            line_starts,
            config,
        }
    }

    /// Source position of the start of `rest`, which must be a suffix of the source
    fn span_of(&self, rest: &str) -> Span {
        let offset = self.source.len() - rest.len();
        let line = self.line_starts.partition_point(|&start| start <= offset);
        let line_start = self.line_starts[line - 1];
        let col = self.source[line_start..offset].chars().count() + 1;
        Span::new(line, col)
    }

    fn error(
        &self,
        kind: ParseErrorKind,
        message: impl Into<String>,
        at: &str,
        found: Option<String>,
    ) -> ParseError {
        ParseError::new(kind, message, Some(self.span_of(at)), found)
    }

    /// Skip whitespace and, when enabled, comments
    fn skip_trivia(&self, mut input: &'a str) -> &'a str {
        loop {
            let skipped: IResult<&str, &str> = take_while(|c: char| c.is_whitespace()).parse(input);
            if let Ok((rest, _)) = skipped {
                input = rest;
            }

            if self.config.handle_comments {
                let comment: IResult<&str, &str> =
                    preceded(char(';'), not_line_ending).parse(input);
                if let Ok((rest, _)) = comment {
                    input = rest;
                    continue;
                }
            }
            return input;
        }
    }

    /// Read forms until the matching `)` (when `open` is set) or end of input
    fn read_sequence(
        &self,
        mut input: &'a str,
        depth: usize,
        open: Option<Span>,
    ) -> Result<(&'a str, Vec<Value>), ParseError> {
        let mut items = Vec::new();

        loop {
            input = self.skip_trivia(input);

            if input.is_empty() {
                return match open {
                    Some(span) => Err(ParseError::new(
                        ParseErrorKind::Incomplete,
                        format!("Unclosed list opened at {span}"),
                        Some(span),
                        None,
                    )),
                    None => Ok((input, items)),
                };
            }

            if let Some(rest) = input.strip_prefix(')') {
                if open.is_some() {
                    return Ok((rest, items));
                }
                return Err(self.error(
                    ParseErrorKind::InvalidSyntax,
                    "Unexpected ')' with no open list",
                    input,
                    Some(")".into()),
                ));
            }

            let (quoted, after_open) = if let Some(rest) = input.strip_prefix("'(") {
                (true, Some(rest))
            } else {
                (false, input.strip_prefix('('))
            };

            if let Some(rest) = after_open {
                if depth >= self.config.max_depth {
                    return Err(self.error(
                        ParseErrorKind::TooDeeplyNested,
                        format!(
                            "Expression too deeply nested (max depth: {})",
                            self.config.max_depth
                        ),
                        input,
                        None,
                    ));
                }
                let span = self.span_of(input);
                let (rest, children) = self.read_sequence(rest, depth + 1, Some(span))?;
                items.push(Value::List(List {
                    items: children,
                    quoted,
                    span: Some(span),
                }));
                input = rest;
                continue;
            }

            let (rest, atom) = parse_atom(input).map_err(|e| self.atom_error(input, e))?;
            items.push(atom);
            input = rest;
        }
    }

    /// Convert nom parsing errors to user-friendly messages
    fn atom_error(
        &self,
        token: &'a str,
        error: nom::Err<nom::error::Error<&'a str>>,
    ) -> ParseError {
        match error {
            nom::Err::Error(e) | nom::Err::Failure(e) => match e.code {
                ErrorKind::Escaped => {
                    let found: String = e.input.chars().take(1).collect();
                    self.error(
                        ParseErrorKind::InvalidEscape,
                        format!("Invalid escape sequence '\\{found}'"),
                        e.input,
                        Some(found),
                    )
                }
                ErrorKind::Eof => self.error(
                    ParseErrorKind::Incomplete,
                    "Unterminated string literal",
                    token,
                    None,
                ),
                _ => {
                    let near: String = token.chars().take(10).collect();
                    self.error(
                        ParseErrorKind::InvalidSyntax,
                        format!("Invalid syntax near '{near}'"),
                        token,
                        Some(near),
                    )
                }
            },
            nom::Err::Incomplete(_) => self.error(
                ParseErrorKind::Incomplete,
                "Incomplete input",
                token,
                None,
            ),
        }
    }
}

/// Parse source text into the root list of its top-level forms, using default settings.
///
/// ```
/// use toylisp::ast::{Value, list, sym, val};
///
/// let root = toylisp::reader::parse("(+ 1 2) \"x\"").unwrap();
/// assert_eq!(root.items, vec![list([sym("+"), val(1), val(2)]), val("x")]);
/// ```
pub fn parse(text: &str) -> Result<List, Error> {
    parse_with_config(text, ParseConfig::default())
}

/// Parse source text into the root list of its top-level forms.
///
/// The root list is unquoted and carries no span; it isn't meaningful as code.
pub fn parse_with_config(text: &str, config: ParseConfig) -> Result<List, Error> {
    let reader = Reader::new(text, config);
    let (_, items) = reader.read_sequence(text, 0, None)?;
    Ok(List::new(items, false))
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{kw, list, quoted, sym, val};
    use pretty_assertions::assert_eq;

    /// Test result variants for reader tests
    #[derive(Debug)]
    enum ParseTestResult {
        Success(Vec<Value>),
        Fails(ParseErrorKind),
    }
    use ParseTestResult::*;

    fn forms<const N: usize>(values: [Value; N]) -> ParseTestResult {
        Success(values.to_vec())
    }

    fn run_parse_tests(test_cases: Vec<(&str, ParseTestResult)>) {
        for (i, (input, expected)) in test_cases.into_iter().enumerate() {
            let test_id = format!("#{} {input:?}", i + 1);
            match (parse(input), expected) {
                (Ok(root), Success(expected)) => {
                    assert_eq!(root.items, expected, "{test_id}");
                }
                (Err(Error::Parse(e)), Fails(kind)) => {
                    assert_eq!(e.kind, kind, "{test_id}: {e}");
                }
                (Ok(root), Fails(kind)) => {
                    panic!("{test_id}: expected {kind:?}, parsed {:?}", root.items)
                }
                (Err(e), Success(expected)) => {
                    panic!("{test_id}: expected {expected:?}, got error {e}")
                }
                (Err(e), Fails(_)) => panic!("{test_id}: unexpected error family {e:?}"),
            }
        }
    }

    #[test]
    fn test_parser_comprehensive() {
        let test_cases = vec![
            // === NUMBERS ===
            ("42", forms([val(42)])),
            ("-5", forms([val(-5)])),
            ("6.25", forms([val(6.25)])),
            ("0.5", forms([val(0.5)])),
            ("1.2.3", forms([val(1.2)])),
            ("12abc", forms([val(12), sym("abc")])),
            // `-` not followed by a digit is a symbol
            ("-", forms([sym("-")])),
            ("-x", forms([sym("-x")])),
            // === STRINGS ===
            (r#""hello world""#, forms([val("hello world")])),
            (r#""""#, forms([val("")])),
            (r#""a\nb\tc\\d\"e""#, forms([val("a\nb\tc\\d\"e")])),
            (r#""(not a list)""#, forms([val("(not a list)")])),
            // === KEYWORDS AND SYMBOLS ===
            (":else", forms([kw("else")])),
            (":", forms([sym(":")])),
            ("str-cat", forms([sym("str-cat")])),
            ("<=", forms([sym("<=")])),
            ("true", forms([sym("true")])),
            ("'a", forms([sym("'a")])),
            // === LISTS ===
            ("()", forms([list(Vec::<Value>::new())])),
            ("(+ 1 2)", forms([list([sym("+"), val(1), val(2)])])),
            ("'(1 2 3)", forms([quoted([1, 2, 3])])),
            (
                "(a '(b (c)))",
                forms([list([sym("a"), quoted([sym("b"), list([sym("c")])])])]),
            ),
            ("(f\n  x\t y)", forms([list([sym("f"), sym("x"), sym("y")])])),
            ("(a)(b)", forms([list([sym("a")]), list([sym("b")])])),
            // === PROGRAMS ===
            ("", forms([])),
            ("   \n ", forms([])),
            ("1 2 3", forms([val(1), val(2), val(3)])),
            // comments are not recognised by default
            ("; x", forms([sym(";"), sym("x")])),
            // === ERRORS ===
            (")", Fails(ParseErrorKind::InvalidSyntax)),
            ("(+ 1 2))", Fails(ParseErrorKind::InvalidSyntax)),
            ("(+ 1 2", Fails(ParseErrorKind::Incomplete)),
            ("'(", Fails(ParseErrorKind::Incomplete)),
            (r#""unterminated"#, Fails(ParseErrorKind::Incomplete)),
            (r#""trailing\"#, Fails(ParseErrorKind::Incomplete)),
            (r#""bad \q escape""#, Fails(ParseErrorKind::InvalidEscape)),
        ];

        run_parse_tests(test_cases);
    }

    #[test]
    fn test_error_locations() {
        let cases: Vec<(&str, Span, Option<&str>)> = vec![
            (")", Span::new(1, 1), Some(")")),
            ("(a)\n  (b))", Span::new(2, 6), Some(")")),
            ("\n\"ab\\x\"", Span::new(2, 5), Some("x")),
            ("(a\n (b", Span::new(2, 2), None),
            ("x \"open", Span::new(1, 3), None),
        ];

        for (input, span, found) in cases {
            let Err(Error::Parse(e)) = parse(input) else {
                panic!("expected parse error for {input:?}");
            };
            assert_eq!(e.location, Some(span), "location for {input:?}");
            assert_eq!(e.found.as_deref(), found, "found for {input:?}");
        }
    }

    #[test]
    fn test_list_spans() {
        let root = parse("(a\n  (b c)\n)").unwrap();
        let Value::List(outer) = &root.items[0] else {
            panic!("expected list");
        };
        assert_eq!(outer.span, Some(Span::new(1, 1)));
        let Value::List(inner) = &outer.items[1] else {
            panic!("expected nested list");
        };
        assert_eq!(inner.span, Some(Span::new(2, 3)));
        assert!(root.span.is_none());
    }

    #[test]
    fn test_comments() {
        let config = ParseConfig {
            handle_comments: true,
            ..ParseConfig::default()
        };
        let root = parse_with_config("; header\n(+ 1 ; inline\n 2) ; trailing", config).unwrap();
        assert_eq!(root.items, vec![list([sym("+"), val(1), val(2)])]);

        // a semicolon inside a string is text
        let root = parse_with_config(r#""a;b""#, config).unwrap();
        assert_eq!(root.items, vec![val("a;b")]);
    }

    #[test]
    fn test_unicode_whitespace_separates_tokens() {
        // form feed, vertical tab, no-break space, ideographic space
        let root = parse("a\u{000C}b\u{000B}c\u{00A0}(d\u{3000}:e)").unwrap();
        assert_eq!(
            root.items,
            vec![
                sym("a"),
                sym("b"),
                sym("c"),
                list([sym("d"), kw("e")]),
            ]
        );
        assert_eq!(parse("\u{00A0}\u{2028}").unwrap().items, vec![]);
    }

    #[test]
    fn test_parser_depth_limit() {
        let config = ParseConfig {
            max_depth: 4,
            ..ParseConfig::default()
        };
        parse_with_config("((((x))))", config).unwrap();
        let err = parse_with_config("(((((x)))))", config).unwrap_err();
        assert!(matches!(
            err,
            Error::Parse(ParseError {
                kind: ParseErrorKind::TooDeeplyNested,
                ..
            })
        ));

        let deep = format!(
            "{}{}",
            "(".repeat(MAX_PARSE_DEPTH + 1),
            ")".repeat(MAX_PARSE_DEPTH + 1)
        );
        assert!(parse(&deep).is_err());
    }

    #[test]
    fn test_print_round_trip() {
        let values = vec![
            val(0),
            val(-17.5),
            val(1e21),
            val(0.1),
            val(true),
            val(false),
            val(""),
            val("quote \" backslash \\ tab \t newline \n done"),
            kw("else"),
            sym("str-upper"),
            quoted([val(1), val("two"), kw("three")]),
            list([sym("f"), quoted([val(1)])]),
        ];

        // booleans read back as the symbols bound to them, so compare printed forms
        for value in values {
            let printed = value.to_string();
            let root = parse(&printed).unwrap();
            assert_eq!(root.items.len(), 1, "{printed}");
            assert_eq!(root.items[0].to_string(), printed);
        }
    }
}
