pub mod ast;
mod expr;

use std::collections::HashSet;
use std::fmt;

use log::{debug, trace};
use thiserror::Error;

use crate::builtins::BuiltinRegistry;
use crate::lexer::token::{Token, TokenKind};
use crate::lexer::{LexError, Scanner};
use crate::typechecker::types::Type;
use ast::{Expr, FunctionDef, Param, Program};

#[derive(Debug, Clone, PartialEq, Error)]
#[error("syntax error at line {line}, column {column}: {message}{}", near(.token))]
pub struct ParseError {
    pub message: String,
    /// Text of the offending token; empty when the scanner itself failed.
    pub token: String,
    pub line: usize,
    pub column: usize,
}

impl ParseError {
    fn new(message: impl Into<String>, token: &Token) -> Self {
        Self {
            message: message.into(),
            token: token.to_string(),
            line: token.line,
            column: token.column,
        }
    }
}

impl From<LexError> for ParseError {
    fn from(err: LexError) -> Self {
        Self {
            message: err.message,
            token: String::new(),
            line: err.line,
            column: err.column,
        }
    }
}

fn near(token: &str) -> String {
    if token.is_empty() {
        String::new()
    } else {
        format!(" (found {})", token)
    }
}

/// Words with a fixed grammatical role. Only `if` opens a form; the other two
/// are clause separators and are never valid on their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    If,
    Then,
    Else,
}

impl Keyword {
    pub fn from_ident(name: &str) -> Option<Self> {
        match name {
            "if" => Some(Keyword::If),
            "then" => Some(Keyword::Then),
            "else" => Some(Keyword::Else),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::If => "if",
            Keyword::Then => "then",
            Keyword::Else => "else",
        }
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an application spine could not become a definition header.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeadError {
    #[error("invalid parameter in function header: {0}")]
    InvalidParameter(String),
    #[error("duplicate parameter name '{0}'")]
    DuplicateParameter(String),
}

/// Converts the arguments collected after a definition's name into formal
/// parameters. Every entry must be a bare identifier (a call with no
/// arguments); `_int`, `_float` and `_chr` suffixes select the type and are
/// stripped from the name.
pub fn spine_to_params(spine: Vec<Expr>) -> Result<Vec<Param>, HeadError> {
    let mut seen = HashSet::new();
    let mut params = Vec::with_capacity(spine.len());

    for entry in spine {
        let raw = match entry {
            Expr::Call { callee, args } if args.is_empty() => callee,
            other => return Err(HeadError::InvalidParameter(other.to_string())),
        };

        let param = decode_param(&raw);
        if !seen.insert(param.name.clone()) {
            return Err(HeadError::DuplicateParameter(param.name));
        }
        params.push(param);
    }

    Ok(params)
}

fn decode_param(raw: &str) -> Param {
    if let Some(split) = raw.rfind('_').filter(|index| *index > 0) {
        if let Some(ty) = Type::from_name(&raw[split + 1..]) {
            return Param {
                name: raw[..split].to_string(),
                ty,
            };
        }
    }

    Param {
        name: raw.to_string(),
        ty: Type::Int,
    }
}

pub struct Parser<'r> {
    scanner: Scanner,
    current: Token,
    builtins: &'r mut BuiltinRegistry,
    /// Parameter names of the definition whose body is being parsed.
    bound_params: Option<HashSet<String>>,
}

impl<'r> Parser<'r> {
    pub fn new(source: &str, builtins: &'r mut BuiltinRegistry) -> Self {
        Self {
            scanner: Scanner::new(source),
            current: Token::new(TokenKind::Eof, String::new(), 1, 1),
            builtins,
            bound_params: None,
        }
    }

    pub fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut items = Vec::new();
        self.advance()?;

        loop {
            match self.current.kind {
                TokenKind::Eof => break,
                TokenKind::Symbol('\n') => {
                    self.advance()?;
                    continue;
                }
                _ => {}
            }

            let item = self.parse_expression(true)?;
            debug!("parsed top-level form: {}", item);
            self.mark_call_sites(&item);
            items.push(item);
            self.end_of_form()?;
        }

        Ok(Program { items })
    }

    fn end_of_form(&mut self) -> Result<(), ParseError> {
        match self.current.kind {
            TokenKind::Eof => Ok(()),
            TokenKind::Symbol('\n') => self.advance(),
            _ => Err(self.error("expected newline after top-level expression")),
        }
    }

    fn mark_call_sites(&mut self, item: &Expr) {
        let builtins = &mut *self.builtins;
        item.for_each_call(&mut |name| {
            if builtins.mark_referenced(name) {
                trace!("builtin '{}' referenced", name);
            }
        });
    }

    fn parse_ident(&mut self, top: bool) -> Result<Expr, ParseError> {
        let TokenKind::Ident(name) = self.current.kind.clone() else {
            return Err(self.error("expected identifier"));
        };

        match Keyword::from_ident(&name) {
            Some(Keyword::If) => return self.parse_if(),
            Some(keyword) => {
                return Err(self.error(format!("unexpected '{}' without a matching 'if'", keyword)))
            }
            None => {}
        }

        trace!("identifier '{}' (top: {})", name, top);
        self.advance()?;

        let mut spine = Vec::new();
        while top && self.current.kind.starts_primary() && !self.at_keyword() {
            spine.push(self.parse_primary(false)?);
        }

        if top && self.current.kind.is_symbol('=') {
            return self.parse_definition(name, spine);
        }

        if self.is_bound(&name) {
            if !spine.is_empty() {
                return Err(self.error(format!(
                    "parameter '{}' cannot be applied to arguments",
                    name
                )));
            }
            trace!("argument reference '{}'", name);
            return Ok(Expr::Argument(name));
        }

        trace!("call to '{}' with {} argument(s)", name, spine.len());
        Ok(Expr::Call {
            callee: name,
            args: spine,
        })
    }

    fn parse_definition(&mut self, name: String, spine: Vec<Expr>) -> Result<Expr, ParseError> {
        let params = spine_to_params(spine).map_err(|err| self.error(err.to_string()))?;
        self.advance()?;

        debug!("definition head '{}' with {} parameter(s)", name, params.len());

        let bound = params.iter().map(|param| param.name.clone()).collect();
        let outer = self.bound_params.replace(bound);
        let body = self.parse_expression(true);
        self.bound_params = outer;

        Ok(Expr::Function(FunctionDef {
            name,
            params,
            body: Box::new(body?),
        }))
    }

    fn is_bound(&self, name: &str) -> bool {
        self.bound_params
            .as_ref()
            .is_some_and(|params| params.contains(name))
    }

    fn at_keyword(&self) -> bool {
        matches!(&self.current.kind, TokenKind::Ident(name) if Keyword::from_ident(name).is_some())
    }

    fn at_keyword_of(&self, keyword: Keyword) -> bool {
        matches!(&self.current.kind, TokenKind::Ident(name) if name == keyword.as_str())
    }

    fn skip_newlines(&mut self) -> Result<(), ParseError> {
        while self.current.kind.is_symbol('\n') {
            self.advance()?;
        }
        Ok(())
    }

    fn advance(&mut self) -> Result<(), ParseError> {
        self.current = self.scanner.scan()?;
        Ok(())
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, &self.current)
    }
}
