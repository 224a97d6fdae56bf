//! Scanner adapter producing a pull-based token stream.
//!
//! Tab, carriage return and space are the only whitespace the scanner
//! swallows. A newline is handed to the parser as `Symbol('\n')` because the
//! grammar uses it to separate top-level forms.

pub mod token;

use thiserror::Error;

use token::{Token, TokenKind};

#[derive(Debug, Clone, PartialEq, Error)]
#[error("lex error at line {line}, column {column}: {message}")]
pub struct LexError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl LexError {
    fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }
}

/// Collects the full token stream, `Eof` included.
pub fn lex(source: &str) -> Result<Vec<Token>, LexError> {
    let mut scanner = Scanner::new(source);
    let mut tokens = Vec::new();
    loop {
        let token = scanner.scan()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

pub struct Scanner {
    chars: Vec<char>,
    current: usize,
    start: usize,
    line: usize,
    column: usize,
    token_line: usize,
    token_column: usize,
}

impl Scanner {
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            current: 0,
            start: 0,
            line: 1,
            column: 1,
            token_line: 1,
            token_column: 1,
        }
    }

    /// Pulls the next token. Once the input is exhausted every call yields `Eof`.
    pub fn scan(&mut self) -> Result<Token, LexError> {
        self.skip_trivia()?;
        self.start_token();

        if self.is_at_end() {
            return Ok(self.make_token(TokenKind::Eof));
        }

        let c = self.advance();
        let kind = match c {
            '\'' => self.char_literal()?,
            '"' => self.string_literal()?,
            '`' => self.raw_string_literal()?,
            '.' if self.peek().is_ascii_digit() => self.number(c)?,
            d if d.is_ascii_digit() => self.number(c)?,
            a if is_ident_start(a) => self.identifier(),
            other => TokenKind::Symbol(other),
        };

        Ok(self.make_token(kind))
    }

    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek() {
                ' ' | '\t' | '\r' => {
                    self.advance();
                }
                '/' if self.peek_next() == '/' => {
                    while !self.is_at_end() && self.peek() != '\n' {
                        self.advance();
                    }
                }
                '/' if self.peek_next() == '*' => {
                    self.start_token();
                    self.advance();
                    self.advance();
                    self.skip_block_comment()?;
                }
                _ => return Ok(()),
            }
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), LexError> {
        while !self.is_at_end() {
            if self.peek() == '*' && self.peek_next() == '/' {
                self.advance();
                self.advance();
                return Ok(());
            }
            self.advance();
        }

        Err(self.error("comment not terminated"))
    }

    fn number(&mut self, first: char) -> Result<TokenKind, LexError> {
        if first == '0' && matches!(self.peek(), 'x' | 'X') {
            self.advance();
            while self.peek().is_ascii_hexdigit() {
                self.advance();
            }
            let lexeme = self.current_lexeme();
            let digits = &lexeme[2..];
            return i64::from_str_radix(digits, 16)
                .map(TokenKind::Int)
                .map_err(|_| self.error(format!("invalid int literal '{}'", lexeme)));
        }

        let mut is_float = first == '.';
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        if !is_float && self.peek() == '.' {
            is_float = true;
            self.advance();
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        if matches!(self.peek(), 'e' | 'E') {
            let sign = matches!(self.peek_next(), '+' | '-');
            let digit_at = if sign { 2 } else { 1 };
            if self.peek_at(digit_at).is_ascii_digit() {
                is_float = true;
                for _ in 0..digit_at {
                    self.advance();
                }
                while self.peek().is_ascii_digit() {
                    self.advance();
                }
            }
        }

        let lexeme = self.current_lexeme();
        if is_float {
            lexeme
                .parse::<f64>()
                .map(TokenKind::Float)
                .map_err(|_| self.error(format!("invalid float literal '{}'", lexeme)))
        } else {
            lexeme
                .parse::<i64>()
                .map(TokenKind::Int)
                .map_err(|_| self.error(format!("invalid int literal '{}'", lexeme)))
        }
    }

    fn char_literal(&mut self) -> Result<TokenKind, LexError> {
        if self.is_at_end() || self.peek() == '\n' || self.peek() == '\'' {
            return Err(self.error("invalid char literal"));
        }

        let value = match self.advance() {
            '\\' => self.escape()?,
            other => other,
        };

        if self.peek() != '\'' {
            return Err(self.error("char literal not terminated"));
        }
        self.advance();
        Ok(TokenKind::Char(value))
    }

    fn string_literal(&mut self) -> Result<TokenKind, LexError> {
        let mut value = String::new();
        loop {
            if self.is_at_end() || self.peek() == '\n' {
                return Err(self.error("string literal not terminated"));
            }
            match self.advance() {
                '"' => return Ok(TokenKind::String(value)),
                '\\' => value.push(self.escape()?),
                other => value.push(other),
            }
        }
    }

    fn raw_string_literal(&mut self) -> Result<TokenKind, LexError> {
        let mut value = String::new();
        loop {
            if self.is_at_end() {
                return Err(self.error("raw string literal not terminated"));
            }
            match self.advance() {
                '`' => return Ok(TokenKind::RawString(value)),
                other => value.push(other),
            }
        }
    }

    fn escape(&mut self) -> Result<char, LexError> {
        if self.is_at_end() {
            return Err(self.error("escape sequence not terminated"));
        }
        match self.advance() {
            'n' => Ok('\n'),
            'r' => Ok('\r'),
            't' => Ok('\t'),
            '0' => Ok('\0'),
            '\\' => Ok('\\'),
            '\'' => Ok('\''),
            '"' => Ok('"'),
            other => Err(self.error(format!("unknown escape sequence '\\{}'", other))),
        }
    }

    fn identifier(&mut self) -> TokenKind {
        while is_ident_continue(self.peek()) {
            self.advance();
        }
        TokenKind::Ident(self.current_lexeme())
    }

    fn make_token(&self, kind: TokenKind) -> Token {
        Token::new(
            kind,
            self.current_lexeme(),
            self.token_line,
            self.token_column,
        )
    }

    fn error(&self, message: impl Into<String>) -> LexError {
        LexError::new(message, self.token_line, self.token_column)
    }

    fn start_token(&mut self) {
        self.start = self.current;
        self.token_line = self.line;
        self.token_column = self.column;
    }

    fn current_lexeme(&self) -> String {
        self.chars[self.start..self.current].iter().collect()
    }

    fn peek(&self) -> char {
        self.peek_at(0)
    }

    fn peek_next(&self) -> char {
        self.peek_at(1)
    }

    fn peek_at(&self, offset: usize) -> char {
        self.chars
            .get(self.current + offset)
            .copied()
            .unwrap_or('\0')
    }

    fn advance(&mut self) -> char {
        let c = self.chars[self.current];
        self.current += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        c
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.chars.len()
    }
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

fn is_ident_continue(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}
