//! Recursive-descent parser for filter expressions.
//!
//! Precedence, lowest first: `^^`, `||`, `&&`, prefix `!`/`not`. Attribute
//! predicates accept an operator either before the attribute (`>=vis:normal`) or
//! after it (`vis >= normal`); a bare `attr:value` means equality.

use regex::Regex;

use super::lexer::{Spanned, Token, tokenize};
use super::{FilterExpr, TextMatch};
use crate::common::{InstrumentType, Result, StatsError, Visibility};
use crate::expr::ast::Comparison;

/// Parses `input` into a filter tree.
pub fn parse(input: &str) -> Result<FilterExpr> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        input,
        tokens,
        pos: 0,
    };
    let expr = parser.parse_xor()?;
    match parser.peek() {
        Token::End => Ok(expr),
        other => Err(parser.error(format!("unexpected trailing token {other:?}"))),
    }
}

#[derive(Clone, Copy, Debug)]
enum Operator {
    Compare(Comparison),
    Regex,
}

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .map_or(&Token::End, |spanned| &spanned.token)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map_or(self.input.len(), |spanned| spanned.offset)
    }

    fn bump(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, message: String) -> StatsError {
        StatsError::parse(self.input, self.offset(), message)
    }

    fn parse_xor(&mut self) -> Result<FilterExpr> {
        let mut lhs = self.parse_or()?;
        while self.eat(&Token::XorXor) {
            let rhs = self.parse_or()?;
            lhs = FilterExpr::Xor(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_or(&mut self) -> Result<FilterExpr> {
        let mut lhs = self.parse_and()?;
        while self.eat(&Token::OrOr) {
            let rhs = self.parse_and()?;
            lhs = FilterExpr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<FilterExpr> {
        let mut lhs = self.parse_not()?;
        while self.eat(&Token::AndAnd) {
            let rhs = self.parse_not()?;
            lhs = FilterExpr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<FilterExpr> {
        let negated = match self.peek() {
            Token::Bang => true,
            Token::Word(w) if w == "not" => true,
            _ => false,
        };
        if negated {
            let _ = self.bump();
            return Ok(FilterExpr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<FilterExpr> {
        if self.eat(&Token::LParen) {
            let inner = self.parse_xor()?;
            if !self.eat(&Token::RParen) {
                return Err(self.error(format!("expected `)`, found {:?}", self.peek())));
            }
            return Ok(inner);
        }
        let prefix = self.parse_operator();
        let attr = match self.bump() {
            Token::Word(w) => w,
            other => return Err(self.error(format!("expected attribute, found {other:?}"))),
        };
        if prefix.is_none() {
            match attr.as_str() {
                "true" => return Ok(FilterExpr::Literal(true)),
                "false" => return Ok(FilterExpr::Literal(false)),
                _ => {}
            }
        }
        let operator = match prefix {
            Some(op) => {
                if !self.eat(&Token::Colon) {
                    return Err(self.error(format!("expected `:` after `{attr}`")));
                }
                op
            }
            None => {
                if self.eat(&Token::Colon) {
                    Operator::Compare(Comparison::Eq)
                } else {
                    self.parse_operator()
                        .ok_or_else(|| self.error(format!("expected `:` or operator after `{attr}`")))?
                }
            }
        };
        let value = match self.bump() {
            Token::Word(w) | Token::Quoted(w) => w,
            other => return Err(self.error(format!("expected value for `{attr}`, found {other:?}"))),
        };
        self.predicate(&attr, operator, &value)
    }

    fn parse_operator(&mut self) -> Option<Operator> {
        match self.peek() {
            Token::Compare(c) => {
                let c = *c;
                let _ = self.bump();
                Some(Operator::Compare(c))
            }
            Token::Word(w) if w == "regex" => {
                let _ = self.bump();
                Some(Operator::Regex)
            }
            _ => None,
        }
    }

    fn predicate(&self, attr: &str, operator: Operator, value: &str) -> Result<FilterExpr> {
        match attr {
            "vis" | "visibility" => {
                let Operator::Compare(cmp) = operator else {
                    return Err(self.error("`regex` does not apply to `vis`".to_string()));
                };
                let level = match Visibility::from_name(value) {
                    Some(v) => v,
                    None => value
                        .parse::<u64>()
                        .map(|n| Visibility(u32::try_from(n).unwrap_or(u32::MAX)))
                        .map_err(|_| self.error(format!("unknown visibility `{value}`")))?,
                };
                Ok(FilterExpr::Vis(cmp, level))
            }
            "type" => {
                let negate = match operator {
                    Operator::Compare(Comparison::Eq) => false,
                    Operator::Compare(Comparison::Ne) => true,
                    _ => return Err(self.error("`type` supports only `==` and `!=`".to_string())),
                };
                let ty = InstrumentType::from_filter_name(value)
                    .ok_or_else(|| self.error(format!("unknown type `{value}`")))?;
                Ok(FilterExpr::Type { negate, ty })
            }
            "tag" => Ok(FilterExpr::Tag(self.text_match(operator, value)?)),
            "name" => Ok(FilterExpr::Name(self.text_match(operator, value)?)),
            other => Err(self.error(format!("unknown attribute `{other}`"))),
        }
    }

    fn text_match(&self, operator: Operator, value: &str) -> Result<TextMatch> {
        match operator {
            Operator::Compare(Comparison::Eq) => Ok(TextMatch::Equal(value.to_string())),
            Operator::Compare(Comparison::Ne) => Ok(TextMatch::NotEqual(value.to_string())),
            Operator::Regex => Regex::new(&format!("^(?:{value})$"))
                .map(TextMatch::Regex)
                .map_err(|e| self.error(format!("bad regex `{value}`: {e}"))),
            Operator::Compare(other) => Err(self.error(format!(
                "`{}` does not apply to text attributes",
                other.symbol()
            ))),
        }
    }
}
