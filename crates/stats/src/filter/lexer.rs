//! Tokenizer for filter expressions.

use crate::common::{Result, StatsError};
use crate::expr::ast::Comparison;

/// Filter token kinds.
#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    /// Bare word: attribute name, keyword, or unquoted value.
    Word(String),
    /// Single- or double-quoted string.
    Quoted(String),
    /// Comparison operator.
    Compare(Comparison),
    /// `:`
    Colon,
    /// `!`
    Bang,
    /// `&&`
    AndAnd,
    /// `||`
    OrOr,
    /// `^^`
    XorXor,
    /// `(`
    LParen,
    /// `)`
    RParen,
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

fn is_word(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '*' | '+' | '?' | '[' | ']' | '\\' | '$' | '/')
}

/// Splits a filter into tokens, terminated by [`Token::End`].
pub fn tokenize(input: &str) -> Result<Vec<Spanned>> {
    let mut out = Vec::new();
    let mut chars = input.char_indices().peekable();
    while let Some((start, c)) = chars.next() {
        if c.is_whitespace() {
            continue;
        }
        let next = chars.peek().map(|(_, n)| *n);
        let token = match (c, next) {
            ('=', Some('=')) | ('!', Some('=')) | ('<', Some('=')) | ('>', Some('=')) => {
                let _ = chars.next();
                let symbol: String = [c, '='].iter().collect();
                Token::Compare(Comparison::from_symbol(&symbol).ok_or_else(|| {
                    StatsError::parse(input, start, format!("unknown operator `{symbol}`"))
                })?)
            }
            ('&', Some('&')) => {
                let _ = chars.next();
                Token::AndAnd
            }
            ('|', Some('|')) => {
                let _ = chars.next();
                Token::OrOr
            }
            ('^', Some('^')) => {
                let _ = chars.next();
                Token::XorXor
            }
            ('<', _) => Token::Compare(Comparison::Lt),
            ('>', _) => Token::Compare(Comparison::Gt),
            ('!', _) => Token::Bang,
            (':', _) => Token::Colon,
            ('(', _) => Token::LParen,
            (')', _) => Token::RParen,
            ('"' | '\'', _) => {
                let mut text = String::new();
                let mut closed = false;
                for (_, ch) in chars.by_ref() {
                    if ch == c {
                        closed = true;
                        break;
                    }
                    text.push(ch);
                }
                if !closed {
                    return Err(StatsError::parse(input, start, "unterminated string"));
                }
                Token::Quoted(text)
            }
            (c, _) if is_word(c) => {
                let mut word = String::from(c);
                while let Some((_, n)) = chars.peek() {
                    if !is_word(*n) {
                        break;
                    }
                    word.push(*n);
                    let _ = chars.next();
                }
                Token::Word(word)
            }
            _ => {
                return Err(StatsError::parse(
                    input,
                    start,
                    format!("unexpected character `{c}`"),
                ));
            }
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
