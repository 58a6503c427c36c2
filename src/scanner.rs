use crate::token::{Token, TokenType};
use phf::phf_map;
use std::error::Error;
use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

#[derive(Debug, Clone, PartialEq)]
pub struct ScanError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}] ScanError: {}",
            self.line, self.column, self.message
        )
    }
}

impl Error for ScanError {}

struct Scanner<'a> {
    source: &'a str,
    iter: Peekable<CharIndices<'a>>,
    start: usize,
    line: usize,
    /// Column of the character at byte `column_offset`. Both only move
    /// forward, so every character is counted once.
    column: usize,
    column_offset: usize,
    start_line: usize,
    start_column: usize,
}

pub fn scan_tokens(source: &str) -> Result<Vec<Token>, Vec<ScanError>> {
    let mut scanner = Scanner {
        source,
        iter: source.char_indices().peekable(),
        start: 0,
        line: 1,
        column: 1,
        column_offset: 0,
        start_line: 1,
        start_column: 1,
    };
    let mut tokens: Vec<Token> = Vec::new();
    let mut errors: Vec<ScanError> = Vec::new();

    while let Some((idx, _)) = scanner.iter.peek() {
        scanner.start = *idx;
        scanner.start_line = scanner.line;
        scanner.start_column = scanner.column_at(scanner.start);
        match scanner.scan_token() {
            Ok(Some(token)) => tokens.push(token),
            Ok(None) => (),
            Err(e) => errors.push(e),
        }
    }
    let end = source.len();
    tokens.push(Token::new(
        TokenType::EOF,
        "",
        scanner.line,
        scanner.column_at(end),
    ));
    if errors.is_empty() {
        Ok(tokens)
    } else {
        Err(errors)
    }
}

impl<'a> Scanner<'a> {
    fn scan_token(&mut self) -> Result<Option<Token>, ScanError> {
        let c = match self.iter.next() {
            Some((_, c)) => c,
            None => return Ok(None),
        };
        match c {
            '(' => Ok(Some(self.token(TokenType::LeftParen))),
            ')' => Ok(Some(self.token(TokenType::RightParen))),
            '{' => Ok(Some(self.token(TokenType::LeftBrace))),
            '}' => Ok(Some(self.token(TokenType::RightBrace))),
            '[' => Ok(Some(self.token(TokenType::LeftBracket))),
            ']' => Ok(Some(self.token(TokenType::RightBracket))),
            ':' => Ok(Some(self.token(TokenType::Colon))),
            ',' => Ok(Some(self.token(TokenType::Comma))),
            '.' => Ok(Some(self.token(TokenType::Dot))),
            '-' => Ok(Some(self.token(TokenType::Minus))),
            '+' => Ok(Some(self.token(TokenType::Plus))),
            ';' => Ok(Some(self.token(TokenType::Semicolon))),
            '*' => Ok(Some(self.token(TokenType::Star))),
            '!' => Ok(Some(self.either('=', TokenType::BangEqual, TokenType::Bang))),
            '=' => Ok(Some(self.either('=', TokenType::EqualEqual, TokenType::Equal))),
            '<' => Ok(Some(self.either('=', TokenType::LessEqual, TokenType::Less))),
            '>' => Ok(Some(self.either(
                '=',
                TokenType::GreaterEqual,
                TokenType::Greater,
            ))),
            '/' => {
                if self.next_if('/') {
                    while let Some((_, c)) = self.iter.peek() {
                        if *c == '\n' {
                            break;
                        }
                        self.iter.next();
                    }
                    Ok(None)
                } else {
                    Ok(Some(self.token(TokenType::Slash)))
                }
            }
            ' ' | '\r' | '\t' => Ok(None),
            '\n' => {
                self.newline();
                Ok(None)
            }
            '"' => self.string().map(Some),
            '0'..='9' => Ok(Some(self.number())),
            'a'..='z' | 'A'..='Z' | '_' => Ok(Some(self.identifier())),
            _ => Err(self.error(format!("Unexpected character '{}'.", c))),
        }
    }
    fn current(&mut self) -> usize {
        match self.iter.peek() {
            None => self.source.len(),
            Some((idx, _)) => *idx,
        }
    }
    fn column_at(&mut self, offset: usize) -> usize {
        self.column += self.source[self.column_offset..offset].chars().count();
        self.column_offset = offset;
        self.column
    }
    fn newline(&mut self) {
        self.line += 1;
        self.column = 1;
        self.column_offset = self.current();
    }
    fn token(&mut self, token_type: TokenType) -> Token {
        let current = self.current();
        Token::new(
            token_type,
            &self.source[self.start..current],
            self.start_line,
            self.start_column,
        )
    }
    fn either(&mut self, expected: char, matched: TokenType, otherwise: TokenType) -> Token {
        if self.next_if(expected) {
            self.token(matched)
        } else {
            self.token(otherwise)
        }
    }
    fn next_if(&mut self, expected: char) -> bool {
        self.iter.next_if(|(_, c)| *c == expected).is_some()
    }
    fn error(&self, message: String) -> ScanError {
        ScanError {
            line: self.start_line,
            column: self.start_column,
            message,
        }
    }
    fn string(&mut self) -> Result<Token, ScanError> {
        loop {
            match self.iter.next() {
                None => return Err(self.error("Unterminated string.".to_string())),
                Some((_, '"')) => break,
                Some((_, '\n')) => self.newline(),
                Some(_) => (),
            }
        }
        let current = self.current();
        Ok(Token::new(
            TokenType::String,
            &self.source[self.start + 1..current - 1],
            self.start_line,
            self.start_column,
        ))
    }
    fn digits(&mut self) {
        while self.iter.next_if(|(_, c)| c.is_ascii_digit()).is_some() {}
    }
    fn number(&mut self) -> Token {
        self.digits();
        if let Some((_, '.')) = self.iter.peek() {
            let mut lookahead = self.iter.clone();
            lookahead.next();
            if let Some((_, c)) = lookahead.peek() {
                if c.is_ascii_digit() {
                    self.iter.next();
                    self.digits();
                }
            }
        }
        self.token(TokenType::Number)
    }
    fn identifier(&mut self) -> Token {
        while self
            .iter
            .next_if(|(_, c)| c.is_ascii_alphanumeric() || *c == '_')
            .is_some()
        {}
        let current = self.current();
        match KEYWORDS.get(&self.source[self.start..current]) {
            None => self.token(TokenType::Identifier),
            Some(x) => self.token(*x),
        }
    }
}

static KEYWORDS: phf::Map<&'static str, TokenType> = phf_map! {
    "and" => TokenType::And,
    "break" => TokenType::Break,
    "class" => TokenType::Class,
    "continue" => TokenType::Continue,
    "else" => TokenType::Else,
    "false" => TokenType::False,
    "for" => TokenType::For,
    "fun" => TokenType::Fun,
    "if" => TokenType::If,
    "let" => TokenType::Let,
    "module" => TokenType::Module,
    "nil" => TokenType::Nil,
    "or" => TokenType::Or,
    "print" => TokenType::Print,
    "return" => TokenType::Return,
    "super" => TokenType::Super,
    "this" => TokenType::This,
    "true" => TokenType::True,
    "var" => TokenType::Var,
    "while" => TokenType::While,
};
