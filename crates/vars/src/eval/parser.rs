// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recursive-descent parser for the condition language.
//!
//! Precedence, loosest first: `or`, `and`, `not`, comparison, `-`.

use super::ast::{CmpOp, Expr};
use super::lexer::{SpannedToken, Token};
use super::EvaluationError;
use sqlflow_core::Value;

pub struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
}

impl Parser {
    /// Parse a token stream into an expression.
    pub fn parse(tokens: Vec<SpannedToken>) -> Result<Expr, EvaluationError> {
        let mut parser = Parser { tokens, pos: 0 };
        if parser.tokens.is_empty() {
            return Err(EvaluationError::Syntax {
                pos: 0,
                message: "empty condition".to_string(),
            });
        }
        let expr = parser.parse_or()?;
        if let Some(trailing) = parser.peek() {
            return Err(EvaluationError::Syntax {
                pos: trailing.pos,
                message: format!("unexpected {} after expression", trailing.token.describe()),
            });
        }
        Ok(expr)
    }

    fn peek(&self) -> Option<&SpannedToken> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<SpannedToken> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek().map(|t| &t.token) == Some(expected) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn parse_or(&mut self) -> Result<Expr, EvaluationError> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::Or) {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, EvaluationError> {
        let mut left = self.parse_not()?;
        while self.eat(&Token::And) {
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, EvaluationError> {
        if self.eat(&Token::Not) {
            let operand = self.parse_not()?;
            return Ok(Expr::Not(Box::new(operand)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, EvaluationError> {
        let left = self.parse_additive()?;
        let Some(op) = self.peek_cmp_op() else {
            return Ok(left);
        };
        self.pos += 1;
        let right = self.parse_additive()?;

        // Chained comparisons (a < b < c) are outside the grammar.
        if let Some(next) = self.peek_cmp_op() {
            return Err(EvaluationError::Unsupported {
                construct: format!("chained comparison with '{}'", next.as_str()),
            });
        }
        Ok(Expr::Compare(Box::new(left), op, Box::new(right)))
    }

    fn peek_cmp_op(&self) -> Option<CmpOp> {
        match self.peek().map(|t| &t.token) {
            Some(Token::Eq) => Some(CmpOp::Eq),
            Some(Token::Ne) => Some(CmpOp::Ne),
            Some(Token::Lt) => Some(CmpOp::Lt),
            Some(Token::Le) => Some(CmpOp::Le),
            Some(Token::Gt) => Some(CmpOp::Gt),
            Some(Token::Ge) => Some(CmpOp::Ge),
            _ => None,
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, EvaluationError> {
        let mut left = self.parse_primary()?;
        while self.eat(&Token::Minus) {
            let right = self.parse_primary()?;
            left = Expr::Sub(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> Result<Expr, EvaluationError> {
        let Some(spanned) = self.advance() else {
            return Err(EvaluationError::Syntax {
                pos: 0,
                message: "unexpected end of condition".to_string(),
            });
        };
        match spanned.token {
            Token::Int(i) => Ok(Expr::Literal(Value::Int(i))),
            Token::Float(f) => Ok(Expr::Literal(Value::Float(f))),
            Token::Str(s) => Ok(Expr::Literal(Value::Str(s))),
            Token::True => Ok(Expr::Literal(Value::Bool(true))),
            Token::False => Ok(Expr::Literal(Value::Bool(false))),
            Token::None => Ok(Expr::Literal(Value::Null)),
            Token::Ident(name) => Ok(Expr::Ident(name)),
            Token::LParen => {
                let inner = self.parse_or()?;
                if !self.eat(&Token::RParen) {
                    return Err(EvaluationError::Syntax {
                        pos: spanned.pos,
                        message: "unclosed '(' in condition".to_string(),
                    });
                }
                Ok(inner)
            }
            other => Err(EvaluationError::Syntax {
                pos: spanned.pos,
                message: format!("unexpected {}", other.describe()),
            }),
        }
    }
}
