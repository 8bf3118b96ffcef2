//! Recursive-descent parser.
//!
//! Precedence, lowest first: `||`, `&&`, comparisons, `+ -`, `* /`, `**` (right
//! associative), prefix `+ - !`, calls and primaries. Identifiers in call position
//! bind to built-ins; bare identifiers that name a constant or free variable bind to
//! it; every other identifier is kept as an unresolved path.

use crate::common::{Result, StatsError};
use crate::expr::ast::{BinaryOp, Expression, UnaryOp};
use crate::expr::function::{Callable, lookup_builtin, lookup_callable};
use crate::expr::lexer::{Spanned, Token, tokenize};

/// Parses `input` into an unresolved expression.
pub fn parse(input: &str) -> Result<Expression> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        input,
        tokens,
        pos: 0,
    };
    let expr = parser.parse_or()?;
    match parser.peek() {
        Token::End => Ok(expr),
        other => Err(parser.error(format!("unexpected trailing token {other:?}"))),
    }
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

    fn expect(&mut self, token: &Token) -> Result<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(format!("expected {token:?}, found {:?}", self.peek())))
        }
    }

    fn error(&self, message: String) -> StatsError {
        StatsError::parse(self.input, self.offset(), message)
    }

    fn parse_or(&mut self) -> Result<Expression> {
        let mut lhs = self.parse_and()?;
        while self.eat(&Token::OrOr) {
            let rhs = self.parse_and()?;
            lhs = Expression::binary(BinaryOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expression> {
        let mut lhs = self.parse_comparison()?;
        while self.eat(&Token::AndAnd) {
            let rhs = self.parse_comparison()?;
            lhs = Expression::binary(BinaryOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> Result<Expression> {
        let lhs = self.parse_sum()?;
        if let Token::Compare(cmp) = *self.peek() {
            self.pos += 1;
            let rhs = self.parse_sum()?;
            return Ok(Expression::binary(BinaryOp::Compare(cmp), lhs, rhs));
        }
        Ok(lhs)
    }

    fn parse_sum(&mut self) -> Result<Expression> {
        let mut lhs = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.parse_term()?;
            lhs = Expression::binary(op, lhs, rhs);
        }
    }

    fn parse_term(&mut self) -> Result<Expression> {
        let mut lhs = self.parse_factor()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.parse_factor()?;
            lhs = Expression::binary(op, lhs, rhs);
        }
    }

    fn parse_factor(&mut self) -> Result<Expression> {
        let base = self.parse_unary()?;
        if self.eat(&Token::StarStar) {
            let exponent = self.parse_factor()?;
            return Ok(Expression::binary(BinaryOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn parse_unary(&mut self) -> Result<Expression> {
        match self.peek() {
            Token::Plus => {
                self.pos += 1;
                self.parse_unary()
            }
            Token::Minus => {
                self.pos += 1;
                let operand = self.parse_unary()?;
                Ok(Expression::Unary(UnaryOp::Neg, Box::new(operand)))
            }
            Token::Bang => {
                self.pos += 1;
                let operand = self.parse_unary()?;
                Ok(Expression::Unary(UnaryOp::Not, Box::new(operand)))
            }
            _ => self.parse_call(),
        }
    }

    fn parse_call(&mut self) -> Result<Expression> {
        let start = self.offset();
        match self.bump() {
            Token::Number(value) => Ok(Expression::Constant(value)),
            Token::LParen => {
                let inner = self.parse_or()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(name) => {
                if self.eat(&Token::LParen) {
                    let callable = lookup_callable(&name).ok_or_else(|| {
                        StatsError::parse(self.input, start, format!("unknown function `{name}`"))
                    })?;
                    let args = self.parse_args()?;
                    if args.len() != callable.arity() {
                        return Err(StatsError::parse(
                            self.input,
                            start,
                            format!(
                                "`{name}` takes {} argument(s), got {}",
                                callable.arity(),
                                args.len()
                            ),
                        ));
                    }
                    return Ok(match callable {
                        Callable::Function(function) => Expression::Call(function, args),
                        Callable::Operator(op) => {
                            let mut args = args.into_iter();
                            match (args.next(), args.next()) {
                                (Some(lhs), Some(rhs)) => Expression::binary(op, lhs, rhs),
                                _ => {
                                    return Err(StatsError::parse(
                                        self.input,
                                        start,
                                        format!("`{name}` takes 2 arguments"),
                                    ));
                                }
                            }
                        }
                    });
                }
                Ok(lookup_builtin(&name).unwrap_or(Expression::Path(name)))
            }
            other => Err(StatsError::parse(
                self.input,
                start,
                format!("expected operand, found {other:?}"),
            )),
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expression>> {
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_or()?);
            if self.eat(&Token::Comma) {
                continue;
            }
            self.expect(&Token::RParen)?;
            return Ok(args);
        }
    }
}
