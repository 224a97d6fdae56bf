use log::trace;

use crate::lexer::token::TokenKind;

use super::ast::{BinaryOp, Expr};
use super::{Keyword, ParseError, Parser};

impl Parser<'_> {
    pub(crate) fn parse_expression(&mut self, top: bool) -> Result<Expr, ParseError> {
        let lhs = self.parse_primary(top)?;
        self.parse_bin_op_rhs(0, lhs)
    }

    /// `top` marks positions where the expression may itself be an
    /// application or definition head. Arguments are parsed with `false` so
    /// they never swallow the arguments that follow them.
    pub(crate) fn parse_primary(&mut self, top: bool) -> Result<Expr, ParseError> {
        self.skip_newlines()?;
        match self.current.kind.clone() {
            TokenKind::Int(value) => {
                self.advance()?;
                Ok(Expr::Int(value))
            }
            TokenKind::Float(value) => {
                self.advance()?;
                Ok(Expr::Float(value))
            }
            TokenKind::Char(value) => {
                self.advance()?;
                Ok(Expr::Char(value))
            }
            TokenKind::String(value) | TokenKind::RawString(value) => {
                self.advance()?;
                Ok(Expr::Str(value))
            }
            TokenKind::Symbol('(') => self.parse_paren(),
            TokenKind::Ident(_) => self.parse_ident(top),
            TokenKind::Eof => Err(self.error("unexpected end of input")),
            TokenKind::Symbol(_) => Err(self.error("unexpected token")),
        }
    }

    fn parse_paren(&mut self) -> Result<Expr, ParseError> {
        self.advance()?;
        let inner = self.parse_expression(true)?;
        if !self.current.kind.is_symbol(')') {
            return Err(self.error("expected ')' to close parenthesized expression"));
        }
        self.advance()?;
        Ok(inner)
    }

    pub(crate) fn parse_if(&mut self) -> Result<Expr, ParseError> {
        self.advance()?;
        let cond = self.parse_expression(true)?;
        self.expect_clause(Keyword::Then)?;
        let then_branch = self.parse_expression(true)?;
        self.expect_clause(Keyword::Else)?;
        let else_branch = self.parse_expression(true)?;

        trace!("if expression parsed");
        Ok(Expr::If {
            cond: Box::new(cond),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        })
    }

    fn expect_clause(&mut self, keyword: Keyword) -> Result<(), ParseError> {
        self.skip_newlines()?;
        if !self.at_keyword_of(keyword) {
            return Err(self.error(format!("expected '{}'", keyword)));
        }
        self.advance()
    }

    /// Precedence climbing over the binary operators. A right operand
    /// absorbs any strictly tighter operators before the fold, which keeps
    /// equal-precedence chains left-associative.
    pub(crate) fn parse_bin_op_rhs(
        &mut self,
        min_precedence: i32,
        mut lhs: Expr,
    ) -> Result<Expr, ParseError> {
        loop {
            let Some(op) = self.current_operator() else {
                return Ok(lhs);
            };
            if op.precedence() < min_precedence {
                return Ok(lhs);
            }

            self.advance()?;
            let mut rhs = self.parse_primary(false)?;

            if let Some(next) = self.current_operator() {
                if op.precedence() < next.precedence() {
                    rhs = self.parse_bin_op_rhs(op.precedence() + 1, rhs)?;
                }
            }

            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn current_operator(&self) -> Option<BinaryOp> {
        match self.current.kind {
            TokenKind::Symbol(symbol) => BinaryOp::from_symbol(symbol),
            _ => None,
        }
    }
}
