//! Canonical printer, mirroring `SExpression::WriteRepr`.

use super::value::Value;

/// Returns the canonical printed representation of `value`.
pub fn repr(value: &Value) -> String {
    let mut out = String::new();
    write_repr(value, &mut out);
    out
}

fn write_repr(value: &Value, out: &mut String) {
    match value {
        Value::Int(n) => out.push_str(&n.to_string()),
        Value::Str(s) => write_quoted_string(s, out),
        Value::Nil => out.push_str("nil"),
        Value::Symbol(s) => write_symbol(s, out),
        Value::Pair(car, cdr) => {
            out.push('(');
            write_repr(car, out);
            write_pair_tail(cdr, out);
            out.push(')');
        }
    }
}

/// Writes the cdr of a pair: a space then the rest of the list if cdr is
/// itself a pair, ` . ` then the raw repr if cdr is a non-nil atom, or
/// nothing if cdr is nil (end of a proper list).
fn write_pair_tail(cdr: &Value, out: &mut String) {
    match cdr {
        Value::Nil => {}
        Value::Pair(car, rest) => {
            out.push(' ');
            write_repr(car, out);
            write_pair_tail(rest, out);
        }
        other => {
            out.push_str(" . ");
            write_repr(other, out);
        }
    }
}

fn write_quoted_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
}

fn write_symbol(name: &str, out: &mut String) {
    if symbol_needs_quoting(name) {
        out.push('|');
        for c in name.chars() {
            if c == '|' || c == '\\' {
                out.push('\\');
            }
            out.push(c);
        }
        out.push('|');
    } else {
        out.push_str(name);
    }
}

/// A symbol can't print literally if it would otherwise read back as an
/// integer or an all-periods token, or if it contains a character outside
/// the allowed unquoted-symbol set.
pub fn symbol_needs_quoting(name: &str) -> bool {
    if name.is_empty() {
        return true;
    }
    let looks_like_integer = {
        let body = name.strip_prefix(['+', '-']).unwrap_or(name);
        !body.is_empty() && body.bytes().all(|b| b.is_ascii_digit())
    };
    let all_periods = name.chars().all(|c| c == '.');
    looks_like_integer || all_periods || !name.chars().all(is_unquoted_symbol_char)
}

/// Allowed characters in an unquoted symbol: alphanumerics plus a set of
/// punctuation that the reader's unquoted-token scanner can't otherwise
/// confuse with list/string/bar-symbol syntax or whitespace.
fn is_unquoted_symbol_char(c: char) -> bool {
    if c.is_alphanumeric() {
        return true;
    }
    matches!(
        c,
        '!' | '$' | '%' | '&' | '*' | '+' | '-' | '.' | '/' | ':' | ';' | '<' | '=' | '>' | '?'
            | '@' | '^' | '_' | '~' | '#'
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sexpr::reader::parse;

    #[test]
    fn round_trips_simple_values() {
        for src in ["42", "-7", "nil", "foo", r#""hi""#, "(1 2 3)", "(1 . 2)"] {
            let v = parse(src).unwrap();
            let printed = repr(&v);
            assert_eq!(parse(&printed).unwrap(), v, "round-trip of {src}");
        }
    }

    #[test]
    fn quotes_symbols_that_look_like_integers() {
        assert!(symbol_needs_quoting("42"));
        assert!(symbol_needs_quoting("-1"));
        assert!(symbol_needs_quoting(".."));
        assert!(!symbol_needs_quoting("foo-bar"));
    }

    #[test]
    fn quotes_symbols_with_disallowed_characters() {
        assert!(symbol_needs_quoting("has space"));
        assert!(symbol_needs_quoting("has(paren"));
    }

    #[test]
    fn escapes_pipes_inside_quoted_symbol() {
        assert_eq!(repr(&Value::symbol("a|b")), "|a\\|b|");
    }

    #[test]
    fn escapes_quotes_inside_strings() {
        assert_eq!(repr(&Value::string("a\"b")), r#""a\"b""#);
    }

    #[test]
    fn prints_proper_list_space_separated() {
        let v = Value::list([Value::Int(1), Value::symbol("x"), Value::Nil]);
        assert_eq!(repr(&v), "(1 x nil)");
    }

    #[test]
    fn prints_dotted_pair() {
        let v = Value::cons(Value::Int(1), Value::Int(2));
        assert_eq!(repr(&v), "(1 . 2)");
    }
}
