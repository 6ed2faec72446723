//! Stripping an `IDENT ( BODY )` envelope from an input string.
//!
//! Unlike the parser's single-failure-latch AST, this is an ordinary
//! fallible function: it has one shot at its input and nothing downstream
//! depends on a deliberately untyped diagnostic, so it returns a typed
//! `thiserror` error the way the rest of the ambient stack does.

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum UnwrapError {
    #[error("could not extract wrapper name")]
    MissingWrapperName,
    #[error("could not match opening '('")]
    MissingOpenParen,
    #[error("could not match closing ')'")]
    MissingCloseParen,
}

/// Strips a leading `IDENT(` and trailing `)` from `input`, returning the
/// wrapper name and the body between them. Whitespace around the name and
/// after the final `)` is ignored; whitespace inside the body is preserved.
pub fn unwrap(input: &str) -> Result<(String, String), UnwrapError> {
    let bytes = input.as_bytes();
    let mut pos = 0;

    while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }

    let name_start = pos;
    while pos < bytes.len() && bytes[pos].is_ascii_alphabetic() {
        pos += 1;
    }
    if pos == name_start {
        return Err(UnwrapError::MissingWrapperName);
    }
    let name = input[name_start..pos].to_string();

    while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }
    if bytes.get(pos) != Some(&b'(') {
        return Err(UnwrapError::MissingOpenParen);
    }
    pos += 1;
    let body_start = pos;

    match input.rfind(')') {
        Some(close) if close >= body_start => {
            let body = input[body_start..close].to_string();
            Ok((name, body))
        }
        _ => Err(UnwrapError::MissingCloseParen),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_round_trip() {
        let (name, body) = unwrap("W( BODY )").unwrap();
        assert_eq!(name, "W");
        assert_eq!(body, " BODY ");
    }

    #[test]
    fn leading_whitespace_before_name_is_ignored() {
        let (name, body) = unwrap("  wrapper(x + y)").unwrap();
        assert_eq!(name, "wrapper");
        assert_eq!(body, "x + y");
    }

    #[test]
    fn missing_name_fails() {
        assert_eq!(unwrap("(body)"), Err(UnwrapError::MissingWrapperName));
        assert_eq!(unwrap("123(body)"), Err(UnwrapError::MissingWrapperName));
    }

    #[test]
    fn missing_open_paren_fails() {
        assert_eq!(unwrap("wrapper body)"), Err(UnwrapError::MissingOpenParen));
    }

    #[test]
    fn missing_close_paren_fails() {
        assert_eq!(unwrap("wrapper(body"), Err(UnwrapError::MissingCloseParen));
    }

    #[test]
    fn nested_parens_in_body_are_preserved() {
        let (name, body) = unwrap("f(g(1) + g(2))").unwrap();
        assert_eq!(name, "f");
        assert_eq!(body, "g(1) + g(2)");
    }
}
