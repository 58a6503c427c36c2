use std::fmt;
use std::rc::Rc;
use strum_macros::Display;

#[rustfmt::skip]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum TokenType {
    // Single-character tokens.
    LeftParen, RightParen, LeftBrace, RightBrace, LeftBracket, RightBracket,
    Colon, Comma, Dot, Minus, Plus, Semicolon, Slash, Star,

    // One or two character tokens.
    Bang, BangEqual,
    Equal, EqualEqual,
    Greater, GreaterEqual,
    Less, LessEqual,

    // Literals.
    Identifier, String, Number,

    // Keywords.
    And, Break, Class, Continue, Else, False, Fun, For, If, Let, Module, Nil, Or,
    Print, Return, Super, This, True, Var, While,

    EOF,

    // Synthesized by the interpreter, never produced by the scanner.
    Implicit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tokentype: TokenType,
    pub lexeme: Rc<str>,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn new(tokentype: TokenType, lexeme: &str, line: usize, column: usize) -> Token {
        Token {
            tokentype,
            lexeme: Rc::from(lexeme),
            line,
            column,
        }
    }

    /// A token that does not come from source text, positioned at `at` so that
    /// errors raised through it still point somewhere useful.
    pub fn implicit(lexeme: &str, at: &Token) -> Token {
        Token::new(TokenType::Implicit, lexeme, at.line, at.column)
    }

    pub fn is_eof(&self) -> bool {
        self.tokentype == TokenType::EOF
    }
}

/// Writes the `[line, column] Kind: message at 'lexeme'` form shared by every
/// diagnostic in the crate.
pub fn report(f: &mut fmt::Formatter<'_>, kind: &str, token: &Token, message: &str) -> fmt::Result {
    if token.is_eof() {
        write!(
            f,
            "[{}, {}] {}: {} at end",
            token.line, token.column, kind, message
        )
    } else {
        write!(
            f,
            "[{}, {}] {}: {} at '{}'",
            token.line, token.column, kind, message, token.lexeme
        )
    }
}
