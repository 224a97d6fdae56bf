use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Int(i64),
    Float(f64),
    Char(char),
    String(String),
    RawString(String),
    /// Any single character that starts no other token, `'\n'` included.
    Symbol(char),
    Eof,
}

impl TokenKind {
    pub fn is_symbol(&self, expected: char) -> bool {
        matches!(self, TokenKind::Symbol(c) if *c == expected)
    }

    /// Tokens that can open a primary expression.
    pub fn starts_primary(&self) -> bool {
        matches!(
            self,
            TokenKind::Ident(_)
                | TokenKind::Int(_)
                | TokenKind::Float(_)
                | TokenKind::Char(_)
                | TokenKind::String(_)
                | TokenKind::RawString(_)
                | TokenKind::Symbol('(')
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: String, line: usize, column: usize) -> Self {
        Self {
            kind,
            lexeme,
            line,
            column,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TokenKind::Eof => write!(f, "end of input"),
            TokenKind::Symbol('\n') => write!(f, "newline"),
            _ => write!(f, "'{}'", self.lexeme),
        }
    }
}
