//! Tokenizer for statistic and trigger expressions.

use crate::common::{Result, StatsError};
use crate::expr::ast::Comparison;

/// Token kinds.
#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    /// Numeric literal.
    Number(f64),
    /// Identifier or dotted path.
    Ident(String),
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `**`
    StarStar,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `,`
    Comma,
    /// Comparison operator.
    Compare(Comparison),
    /// `&&`
    AndAnd,
    /// `||`
    OrOr,
    /// `!`
    Bang,
    /// End of input.
    End,
}

/// A token with its byte offset.
#[derive(Clone, Debug, PartialEq)]
pub struct Spanned {
    /// The token.
    pub token: Token,
    /// Offset of its first byte.
    pub offset: usize,
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_' || c == b'.'
}

fn is_ident_continue(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b'.'
}

/// Splits `input` into tokens, terminated by [`Token::End`].
pub fn tokenize(input: &str) -> Result<Vec<Spanned>> {
    let bytes = input.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        let start = i;
        let two = bytes.get(i + 1).copied();
        let token = if c.is_ascii_digit() {
            i = scan_number(bytes, i);
            let text = &input[start..i];
            let value = text
                .replace('_', "")
                .parse::<f64>()
                .map_err(|_| StatsError::parse(input, start, format!("bad number `{text}`")))?;
            Token::Number(value)
        } else if is_ident_start(c) {
            while i < bytes.len() && is_ident_continue(bytes[i]) {
                i += 1;
            }
            Token::Ident(input[start..i].to_string())
        } else {
            let (token, len) = match (c, two) {
                (b'*', Some(b'*')) => (Token::StarStar, 2),
                (b'&', Some(b'&')) => (Token::AndAnd, 2),
                (b'|', Some(b'|')) => (Token::OrOr, 2),
                (b'=', Some(b'=')) => (Token::Compare(Comparison::Eq), 2),
                (b'!', Some(b'=')) => (Token::Compare(Comparison::Ne), 2),
                (b'<', Some(b'=')) => (Token::Compare(Comparison::Le), 2),
                (b'>', Some(b'=')) => (Token::Compare(Comparison::Ge), 2),
                (b'<', _) => (Token::Compare(Comparison::Lt), 1),
                (b'>', _) => (Token::Compare(Comparison::Gt), 1),
                (b'!', _) => (Token::Bang, 1),
                (b'+', _) => (Token::Plus, 1),
                (b'-', _) => (Token::Minus, 1),
                (b'*', _) => (Token::Star, 1),
                (b'/', _) => (Token::Slash, 1),
                (b'(', _) => (Token::LParen, 1),
                (b')', _) => (Token::RParen, 1),
                (b',', _) => (Token::Comma, 1),
                _ => {
                    return Err(StatsError::parse(
                        input,
                        start,
                        format!("unexpected character `{}`", char::from(c)),
                    ));
                }
            };
            i += len;
            token
        };
        out.push(Spanned {
            token,
            offset: start,
        });
    }
    out.push(Spanned {
        token: Token::End,
        offset: input.len(),
    });
    Ok(out)
}

fn scan_number(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.' || bytes[i] == b'_') {
        i += 1;
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        if j < bytes.len() && bytes[j].is_ascii_digit() {
            i = j;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
        }
    }
    i
}
