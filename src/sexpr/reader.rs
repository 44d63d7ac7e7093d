//! Recursive-descent reader for the s-expression grammar.
//!
//! Mirrors the reference parser's token dispatch (`ParseSexp` on `(`, `"`,
//! `|`, or a bare token) but is written as an ordinary Rust parser over a
//! `Peekable<CharIndices>` rather than a hand-rolled C-string iterator.
//! A `(` that never finds its matching `)` is reported as
//! [`ReadOutcome::Incomplete`] rather than an error, since callers reading
//! off a socket need to tell "not enough bytes yet" apart from "malformed
//! input".

use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

use super::value::Value;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SexprError {
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unterminated |...| symbol")]
    UnterminatedBarSymbol,
    #[error("dangling escape character at end of input")]
    DanglingEscape,
    #[error("token consisting only of periods cannot be read")]
    AllPeriodsToken,
    #[error("unexpected ')'")]
    UnexpectedCloseParen,
}

/// Result of attempting to read one expression from a buffer.
pub enum ReadOutcome {
    /// A complete expression was read, consuming `consumed` bytes.
    Complete { value: Value, consumed: usize },
    /// The buffer ended before the expression was complete (e.g. inside
    /// an open list or string); the caller should read more bytes and
    /// retry.
    Incomplete,
}

/// Reads a single expression from the start of `input`, skipping leading
/// whitespace. Returns [`ReadOutcome::Incomplete`] if `input` holds only
/// whitespace or an unterminated expression.
pub fn read(input: &str) -> Result<ReadOutcome, SexprError> {
    let mut chars = input.char_indices().peekable();
    skip_whitespace(&mut chars);

    match parse_sexp(&mut chars, input)? {
        Some(value) => {
            let consumed = chars.peek().map(|&(i, _)| i).unwrap_or(input.len());
            Ok(ReadOutcome::Complete { value, consumed })
        }
        None => Ok(ReadOutcome::Incomplete),
    }
}

/// Reads exactly one expression from `input`, requiring it to be complete
/// and erroring (rather than treating it as incomplete) if trailing
/// non-whitespace garbage remains after it. Used for parsing whole lines
/// from tag files and config, where there's no more data coming.
pub fn parse(input: &str) -> Result<Value, SexprError> {
    match read(input)? {
        ReadOutcome::Complete { value, .. } => Ok(value),
        ReadOutcome::Incomplete => Err(SexprError::UnterminatedString),
    }
}

type Chars<'a> = Peekable<CharIndices<'a>>;

fn skip_whitespace(chars: &mut Chars) {
    while matches!(chars.peek(), Some((_, c)) if c.is_whitespace()) {
        chars.next();
    }
}

fn parse_sexp(chars: &mut Chars, input: &str) -> Result<Option<Value>, SexprError> {
    skip_whitespace(chars);
    match chars.peek() {
        None => Ok(None),
        Some((_, '(')) => parse_list(chars, input),
        Some((_, '"')) => parse_delimited(chars, '"').map(|s| s.map(Value::Str)),
        Some((_, '|')) => parse_delimited(chars, '|').map(|s| s.map(Value::Symbol)),
        Some((_, ')')) => Err(SexprError::UnexpectedCloseParen),
        Some(_) => parse_unquoted_token(chars),
    }
}

fn parse_list(chars: &mut Chars, input: &str) -> Result<Option<Value>, SexprError> {
    chars.next(); // consume '('
    skip_whitespace(chars);

    let mut items = Vec::new();
    let mut improper_tail: Option<Value> = None;

    loop {
        match chars.peek() {
            None => return Ok(None), // input ends before ')'
            Some((_, ')')) => break,
            Some((_, '.')) => {
                // A '.' is only the dotted-pair marker when followed by
                // whitespace; otherwise it's the start of an ordinary
                // token (e.g. a float-looking symbol like `1.5`).
                let mut lookahead = chars.clone();
                lookahead.next();
                let is_dot_marker = matches!(lookahead.peek(), Some((_, c)) if c.is_whitespace());
                if is_dot_marker {
                    chars.next();
                    skip_whitespace(chars);
                    let tail = match parse_sexp(chars, input)? {
                        Some(v) => v,
                        None => return Ok(None),
                    };
                    improper_tail = Some(tail);
                    skip_whitespace(chars);
                    if !matches!(chars.peek(), Some((_, ')'))) {
                        return Err(SexprError::UnexpectedCloseParen);
                    }
                    break;
                } else {
                    match parse_sexp(chars, input)? {
                        Some(v) => items.push(v),
                        None => return Ok(None),
                    }
                }
            }
            Some(_) => match parse_sexp(chars, input)? {
                Some(v) => items.push(v),
                None => return Ok(None),
            },
        }
        skip_whitespace(chars);
    }
    chars.next(); // consume ')'

    let tail = improper_tail.unwrap_or(Value::Nil);
    let list = items
        .into_iter()
        .rev()
        .fold(tail, |cdr, car| Value::cons(car, cdr));
    Ok(Some(list))
}

fn parse_delimited(chars: &mut Chars, delimiter: char) -> Result<Option<String>, SexprError> {
    chars.next(); // consume opening delimiter
    let mut out = String::new();
    loop {
        match chars.next() {
            None => {
                return Err(if delimiter == '"' {
                    SexprError::UnterminatedString
                } else {
                    SexprError::UnterminatedBarSymbol
                })
            }
            Some((_, c)) if c == delimiter => return Ok(Some(out)),
            Some((_, '\\')) => match chars.next() {
                None => return Err(SexprError::DanglingEscape),
                Some((_, c)) => out.push(c),
            },
            Some((_, c)) => out.push(c),
        }
    }
}

fn parse_unquoted_token(chars: &mut Chars) -> Result<Option<Value>, SexprError> {
    let mut token = String::new();
    let mut has_escape = false;

    while let Some(&(_, c)) = chars.peek() {
        if c.is_whitespace() || c == ')' {
            break;
        }
        if c == '\\' {
            has_escape = true;
            chars.next();
            match chars.next() {
                Some((_, escaped)) => token.push(escaped),
                None => return Err(SexprError::DanglingEscape),
            }
            continue;
        }
        token.push(c);
        chars.next();
    }

    if token.is_empty() {
        return Ok(None);
    }

    if !has_escape {
        if let Some(n) = token_as_integer(&token) {
            return Ok(Some(Value::Int(n)));
        }
        if token == "nil" {
            return Ok(Some(Value::Nil));
        }
    }
    if token_is_all_periods(&token) {
        return Err(SexprError::AllPeriodsToken);
    }
    Ok(Some(Value::Symbol(token)))
}

fn token_as_integer(token: &str) -> Option<i64> {
    let body = token.strip_prefix(['+', '-']).unwrap_or(token);
    if body.is_empty() || !body.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse::<i64>().ok()
}

fn token_is_all_periods(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| c == '.')
}

impl fmt::Debug for ReadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadOutcome::Complete { value, consumed } => f
                .debug_struct("Complete")
                .field("value", value)
                .field("consumed", consumed)
                .finish(),
            ReadOutcome::Incomplete => write!(f, "Incomplete"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(s: &str) -> Value {
        parse(s).unwrap_or_else(|e| panic!("failed to parse {s:?}: {e}"))
    }

    #[test]
    fn parses_integer() {
        assert_eq!(parse_ok("42"), Value::Int(42));
        assert_eq!(parse_ok("-7"), Value::Int(-7));
    }

    #[test]
    fn parses_nil() {
        assert_eq!(parse_ok("nil"), Value::Nil);
        assert_eq!(parse_ok("()"), Value::Nil);
    }

    #[test]
    fn parses_quoted_string_with_escapes() {
        assert_eq!(parse_ok(r#""a\"b""#), Value::Str("a\"b".into()));
    }

    #[test]
    fn parses_bar_quoted_symbol() {
        assert_eq!(parse_ok("|hello world|"), Value::Symbol("hello world".into()));
    }

    #[test]
    fn escaped_token_never_becomes_integer() {
        assert_eq!(parse_ok(r"\42"), Value::Symbol("42".into()));
    }

    #[test]
    fn parses_proper_list() {
        let v = parse_ok("(1 2 3)");
        let items: Vec<_> = v.iter_list().cloned().collect();
        assert_eq!(items, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    }

    #[test]
    fn parses_dotted_pair() {
        let v = parse_ok("(1 . 2)");
        assert_eq!(v, Value::cons(Value::Int(1), Value::Int(2)));
    }

    #[test]
    fn nested_lists() {
        let v = parse_ok("(tag (name value) nil)");
        assert!(v.is_list());
    }

    #[test]
    fn incomplete_list_reports_incomplete() {
        match read("(1 2").unwrap() {
            ReadOutcome::Incomplete => {}
            other => panic!("expected incomplete, got {other:?}"),
        }
    }

    #[test]
    fn reads_one_expression_and_reports_consumed_bytes() {
        match read("(a b) (c d)").unwrap() {
            ReadOutcome::Complete { consumed, .. } => assert_eq!(&"(a b) (c d)"[..consumed], "(a b)"),
            ReadOutcome::Incomplete => panic!("expected complete"),
        }
    }

    #[test]
    fn all_periods_token_is_rejected() {
        assert!(matches!(parse(".."), Err(SexprError::AllPeriodsToken)));
    }
}
