use crate::ast::{Expression, FunctionDecl, Literal, Statement};
use crate::token::{report, Token, TokenType};
use std::cell::Cell;
use std::error::Error;
use std::fmt;
use std::rc::Rc;

const MAX_ARGUMENTS: usize = 255;

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub token: Token,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        report(f, "ParseError", &self.token, &self.message)
    }
}

impl Error for ParseError {}

type ParseResult<T> = Result<T, ParseError>;

pub fn parse(tokens: &[Token]) -> Result<Vec<Statement>, Vec<ParseError>> {
    Parser::new(tokens).parse()
}

pub struct Parser<'a> {
    tokens: &'a [Token],
    current: usize,
    errors: Vec<ParseError>,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token]) -> Parser<'a> {
        Parser {
            tokens,
            current: 0,
            errors: Vec::new(),
        }
    }
    pub fn parse(mut self) -> Result<Vec<Statement>, Vec<ParseError>> {
        let mut statements: Vec<Statement> = Vec::new();
        while !self.is_at_end() {
            if let Some(stmt) = self.declaration() {
                statements.push(stmt);
            }
        }
        if self.errors.is_empty() {
            Ok(statements)
        } else {
            Err(self.errors)
        }
    }
    fn declaration(&mut self) -> Option<Statement> {
        let result = match self.peek().tokentype {
            TokenType::Var => {
                self.advance();
                self.var_declaration()
            }
            TokenType::Let => {
                self.advance();
                self.let_declaration()
            }
            TokenType::Class => {
                self.advance();
                self.class_declaration()
            }
            TokenType::Module => {
                self.advance();
                self.module_declaration()
            }
            TokenType::Fun if self.peek_next().tokentype == TokenType::Identifier => {
                let keyword = self.advance().clone();
                self.function(keyword).map(Statement::Function)
            }
            _ => self.statement(),
        };
        match result {
            Ok(stmt) => Some(stmt),
            Err(err) => {
                self.errors.push(err);
                self.synchronize();
                None
            }
        }
    }
    fn var_declaration(&mut self) -> ParseResult<Statement> {
        let name = self.consume(TokenType::Identifier, "Expect variable name.")?;
        let initializer = if self.matches(TokenType::Equal) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenType::Semicolon, "Expect ';' after variable declaration.")?;
        Ok(Statement::Var { name, initializer })
    }
    fn let_declaration(&mut self) -> ParseResult<Statement> {
        let name = self.consume(TokenType::Identifier, "Expect variable name.")?;
        self.consume(TokenType::Equal, "Expect '=' after 'let' binding name.")?;
        let initializer = self.expression()?;
        self.consume(TokenType::Semicolon, "Expect ';' after variable declaration.")?;
        Ok(Statement::Let { name, initializer })
    }
    fn class_declaration(&mut self) -> ParseResult<Statement> {
        let name = self.consume(TokenType::Identifier, "Expect class name.")?;
        let superclass = if self.matches(TokenType::Less) {
            Some(self.call()?)
        } else {
            None
        };
        self.consume(TokenType::LeftBrace, "Expect '{' before class body.")?;
        let mut methods = Vec::new();
        while !self.check(TokenType::RightBrace) && !self.is_at_end() {
            let keyword = self.peek().clone();
            methods.push(self.function(keyword)?);
        }
        self.consume(TokenType::RightBrace, "Expect '}' after class body.")?;
        Ok(Statement::Class {
            name,
            superclass,
            methods,
        })
    }
    fn module_declaration(&mut self) -> ParseResult<Statement> {
        let name = self.consume(TokenType::Identifier, "Expect module name.")?;
        self.consume(TokenType::LeftBrace, "Expect '{' before module body.")?;
        let body = self.block_body()?;
        Ok(Statement::Module { name, body })
    }
    fn function(&mut self, keyword: Token) -> ParseResult<Rc<FunctionDecl>> {
        let name = self.consume(TokenType::Identifier, "Expect function name.")?;
        self.function_rest(keyword, Some(name))
    }
    fn function_rest(&mut self, keyword: Token, name: Option<Token>) -> ParseResult<Rc<FunctionDecl>> {
        self.consume(TokenType::LeftParen, "Expect '(' after function name.")?;
        let mut params = Vec::new();
        if !self.check(TokenType::RightParen) {
            loop {
                if params.len() >= MAX_ARGUMENTS {
                    return Err(self.error_at_current("Can't have more than 255 parameters."));
                }
                params.push(self.consume(TokenType::Identifier, "Expect parameter name.")?);
                if !self.matches(TokenType::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenType::RightParen, "Expect ')' after parameters.")?;
        self.consume(TokenType::LeftBrace, "Expect '{' before function body.")?;
        let body = self.block_body()?;
        Ok(Rc::new(FunctionDecl {
            keyword,
            name,
            params,
            body,
        }))
    }
    fn statement(&mut self) -> ParseResult<Statement> {
        match self.peek().tokentype {
            TokenType::If => {
                self.advance();
                self.if_statement()
            }
            TokenType::Print => {
                self.advance();
                self.print_statement()
            }
            TokenType::LeftBrace => {
                self.advance();
                Ok(Statement::Block(self.block_body()?))
            }
            TokenType::While => {
                self.advance();
                self.while_statement()
            }
            TokenType::For => {
                self.advance();
                self.for_statement()
            }
            TokenType::Return => {
                let keyword = self.advance().clone();
                self.return_statement(keyword)
            }
            TokenType::Break => {
                let keyword = self.advance().clone();
                self.consume(TokenType::Semicolon, "Expect ';' after 'break'.")?;
                Ok(Statement::Break(keyword))
            }
            TokenType::Continue => {
                let keyword = self.advance().clone();
                self.consume(TokenType::Semicolon, "Expect ';' after 'continue'.")?;
                Ok(Statement::Continue(keyword))
            }
            _ => self.expression_statement(),
        }
    }
    fn for_statement(&mut self) -> ParseResult<Statement> {
        self.consume(TokenType::LeftParen, "Expect '(' after 'for'.")?;
        let initializer = match self.peek().tokentype {
            TokenType::Semicolon => {
                self.advance();
                None
            }
            TokenType::Var => {
                self.advance();
                Some(self.var_declaration()?)
            }
            TokenType::Let => {
                self.advance();
                Some(self.let_declaration()?)
            }
            _ => Some(self.expression_statement()?),
        };

        let condition = if self.check(TokenType::Semicolon) {
            Expression::Literal(Literal::Boolean(true))
        } else {
            self.expression()?
        };
        self.consume(TokenType::Semicolon, "Expect ';' after loop condition.")?;

        let increment = if self.check(TokenType::RightParen) {
            None
        } else {
            Some(self.expression()?)
        };
        self.consume(TokenType::RightParen, "Expect ')' after for clauses.")?;

        let body = self.statement()?;
        let mut block = Vec::new();
        if let Some(x) = initializer {
            block.push(x);
        }
        block.push(Statement::While {
            condition,
            body: Box::new(body),
            increment,
        });
        Ok(Statement::Block(block))
    }
    fn while_statement(&mut self) -> ParseResult<Statement> {
        self.consume(TokenType::LeftParen, "Expect '(' after 'while'.")?;
        let condition = self.expression()?;
        self.consume(TokenType::RightParen, "Expect ')' after while condition.")?;
        let body = self.statement()?;
        Ok(Statement::While {
            condition,
            body: Box::new(body),
            increment: None,
        })
    }
    fn if_statement(&mut self) -> ParseResult<Statement> {
        self.consume(TokenType::LeftParen, "Expect '(' after 'if'.")?;
        let condition = self.expression()?;
        self.consume(TokenType::RightParen, "Expect ')' after if condition.")?;
        let then_branch = Box::new(self.statement()?);
        let else_branch = if self.matches(TokenType::Else) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Ok(Statement::If {
            condition,
            then_branch,
            else_branch,
        })
    }
    fn return_statement(&mut self, keyword: Token) -> ParseResult<Statement> {
        let value = if self.check(TokenType::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.consume(TokenType::Semicolon, "Expect ';' after return value.")?;
        Ok(Statement::Return { keyword, value })
    }
    /// Parses declarations up to and including the closing brace. Errors inside
    /// are recorded and skipped so one bad statement does not hide the rest.
    fn block_body(&mut self) -> ParseResult<Vec<Statement>> {
        let mut statements: Vec<Statement> = Vec::new();
        while !self.check(TokenType::RightBrace) && !self.is_at_end() {
            if let Some(stmt) = self.declaration() {
                statements.push(stmt);
            }
        }
        self.consume(TokenType::RightBrace, "Expect '}' after block.")?;
        Ok(statements)
    }
    fn print_statement(&mut self) -> ParseResult<Statement> {
        let expr = self.expression()?;
        self.consume(TokenType::Semicolon, "Expect ';' after value.")?;
        Ok(Statement::Print(expr))
    }
    fn expression_statement(&mut self) -> ParseResult<Statement> {
        let expr = self.expression()?;
        self.consume(TokenType::Semicolon, "Expect ';' after expression.")?;
        Ok(Statement::Expression(expr))
    }
    fn expression(&mut self) -> ParseResult<Expression> {
        self.assignment()
    }
    fn assignment(&mut self) -> ParseResult<Expression> {
        let expr = self.or()?;
        if !self.check(TokenType::Equal) {
            return Ok(expr);
        }
        let equals = self.advance().clone();
        let value = Box::new(self.assignment()?);
        match expr {
            Expression::Variable { name, .. } => Ok(Expression::Assign {
                name,
                value,
                depth: Cell::new(None),
            }),
            Expression::Get { object, name } => Ok(Expression::Set {
                object,
                name,
                value,
            }),
            Expression::Index {
                object,
                bracket,
                index,
            } => Ok(Expression::SetIndex {
                object,
                bracket,
                index,
                value,
            }),
            _ => Err(ParseError {
                message: "Invalid assignment target.".to_string(),
                token: equals,
            }),
        }
    }
    fn or(&mut self) -> ParseResult<Expression> {
        let mut expr = self.and()?;
        while self.matches(TokenType::Or) {
            let operator = self.previous().clone();
            let right = self.and()?;
            expr = Expression::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }
    fn and(&mut self) -> ParseResult<Expression> {
        let mut expr = self.equality()?;
        while self.matches(TokenType::And) {
            let operator = self.previous().clone();
            let right = self.equality()?;
            expr = Expression::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }
    fn binary(
        &mut self,
        operators: &[TokenType],
        operand: fn(&mut Self) -> ParseResult<Expression>,
    ) -> ParseResult<Expression> {
        let mut expr = operand(self)?;
        while operators.contains(&self.peek().tokentype) {
            let operator = self.advance().clone();
            let right = operand(self)?;
            expr = Expression::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }
    fn equality(&mut self) -> ParseResult<Expression> {
        self.binary(
            &[TokenType::BangEqual, TokenType::EqualEqual],
            Self::comparison,
        )
    }
    fn comparison(&mut self) -> ParseResult<Expression> {
        self.binary(
            &[
                TokenType::Greater,
                TokenType::GreaterEqual,
                TokenType::Less,
                TokenType::LessEqual,
            ],
            Self::addition,
        )
    }
    fn addition(&mut self) -> ParseResult<Expression> {
        self.binary(&[TokenType::Minus, TokenType::Plus], Self::multiplication)
    }
    fn multiplication(&mut self) -> ParseResult<Expression> {
        self.binary(&[TokenType::Slash, TokenType::Star], Self::unary)
    }
    fn unary(&mut self) -> ParseResult<Expression> {
        match self.peek().tokentype {
            TokenType::Bang | TokenType::Minus => {
                let operator = self.advance().clone();
                let right = self.unary()?;
                Ok(Expression::Unary {
                    operator,
                    right: Box::new(right),
                })
            }
            _ => self.call(),
        }
    }
    fn call(&mut self) -> ParseResult<Expression> {
        let mut expr = self.primary()?;
        loop {
            match self.peek().tokentype {
                TokenType::LeftParen => {
                    self.advance();
                    expr = self.finish_call(expr)?;
                }
                TokenType::Dot => {
                    self.advance();
                    let name =
                        self.consume(TokenType::Identifier, "Expect property name after '.'.")?;
                    expr = Expression::Get {
                        object: Box::new(expr),
                        name,
                    };
                }
                TokenType::LeftBracket => {
                    let bracket = self.advance().clone();
                    let index = self.expression()?;
                    self.consume(TokenType::RightBracket, "Expect ']' after index.")?;
                    expr = Expression::Index {
                        object: Box::new(expr),
                        bracket,
                        index: Box::new(index),
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }
    fn finish_call(&mut self, callee: Expression) -> ParseResult<Expression> {
        let mut arguments = Vec::new();
        if !self.check(TokenType::RightParen) {
            loop {
                if arguments.len() >= MAX_ARGUMENTS {
                    return Err(self.error_at_current("Can't have more than 255 arguments."));
                }
                arguments.push(self.expression()?);
                if !self.matches(TokenType::Comma) {
                    break;
                }
            }
        }
        let paren = self.consume(TokenType::RightParen, "Expect ')' after arguments.")?;
        Ok(Expression::Call {
            callee: Box::new(callee),
            paren,
            arguments,
        })
    }
    fn primary(&mut self) -> ParseResult<Expression> {
        let token = self.peek().clone();
        match token.tokentype {
            TokenType::False => {
                self.advance();
                Ok(Expression::Literal(Literal::Boolean(false)))
            }
            TokenType::True => {
                self.advance();
                Ok(Expression::Literal(Literal::Boolean(true)))
            }
            TokenType::Nil => {
                self.advance();
                Ok(Expression::Literal(Literal::Nil))
            }
            TokenType::Number => {
                self.advance();
                match token.lexeme.parse::<f64>() {
                    Ok(n) => Ok(Expression::Literal(Literal::Number(n))),
                    Err(_) => Err(ParseError {
                        message: "Invalid number literal.".to_string(),
                        token,
                    }),
                }
            }
            TokenType::String => {
                self.advance();
                Ok(Expression::Literal(Literal::String(token.lexeme)))
            }
            TokenType::Identifier => {
                self.advance();
                Ok(Expression::Variable {
                    name: token,
                    depth: Cell::new(None),
                })
            }
            TokenType::This => {
                self.advance();
                Ok(Expression::This {
                    keyword: token,
                    depth: Cell::new(None),
                })
            }
            TokenType::Super => {
                self.advance();
                self.consume(TokenType::Dot, "Expect '.' after 'super'.")?;
                let method =
                    self.consume(TokenType::Identifier, "Expect superclass method name.")?;
                Ok(Expression::Super {
                    keyword: token,
                    method,
                    depth: Cell::new(None),
                })
            }
            TokenType::Fun => {
                self.advance();
                let name = if self.check(TokenType::Identifier) {
                    Some(self.advance().clone())
                } else {
                    None
                };
                Ok(Expression::Function(self.function_rest(token, name)?))
            }
            TokenType::LeftBracket => {
                self.advance();
                self.array(token)
            }
            TokenType::LeftParen => {
                self.advance();
                let expr = self.expression()?;
                self.consume(TokenType::RightParen, "Expect ')' after expression.")?;
                Ok(Expression::Grouping(Box::new(expr)))
            }
            _ => Err(self.error_at_current("Expect expression.")),
        }
    }
    /// `[a, b]`, `[n: a, b]` or `[n:]`.
    fn array(&mut self, bracket: Token) -> ParseResult<Expression> {
        let mut size = None;
        let mut elements = Vec::new();
        if !self.check(TokenType::RightBracket) {
            let first = self.expression()?;
            if self.matches(TokenType::Colon) {
                size = Some(Box::new(first));
                if !self.check(TokenType::RightBracket) {
                    elements.push(self.expression()?);
                }
            } else {
                elements.push(first);
            }
            while self.matches(TokenType::Comma) {
                elements.push(self.expression()?);
            }
        }
        self.consume(TokenType::RightBracket, "Expect ']' after array elements.")?;
        Ok(Expression::Array {
            bracket,
            size,
            elements,
        })
    }
    fn synchronize(&mut self) {
        self.advance();
        while !self.is_at_end() {
            if let TokenType::Semicolon = self.previous().tokentype {
                return;
            }
            match self.peek().tokentype {
                TokenType::Class
                | TokenType::Fun
                | TokenType::Var
                | TokenType::Let
                | TokenType::Module
                | TokenType::For
                | TokenType::If
                | TokenType::While
                | TokenType::Print
                | TokenType::Return
                | TokenType::Break
                | TokenType::Continue => return,
                _ => (),
            }
            self.advance();
        }
    }
    fn check(&self, tokentype: TokenType) -> bool {
        self.peek().tokentype == tokentype
    }
    fn matches(&mut self, tokentype: TokenType) -> bool {
        if self.check(tokentype) {
            self.advance();
            true
        } else {
            false
        }
    }
    fn consume(&mut self, tokentype: TokenType, message: &str) -> ParseResult<Token> {
        if self.check(tokentype) {
            Ok(self.advance().clone())
        } else {
            Err(self.error_at_current(message))
        }
    }
    fn advance(&mut self) -> &'a Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }
    fn is_at_end(&self) -> bool {
        self.peek().is_eof()
    }
    fn peek(&self) -> &'a Token {
        // The scanner always terminates the stream with EOF, which is never
        // advanced past.
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }
    fn peek_next(&self) -> &'a Token {
        &self.tokens[(self.current + 1).min(self.tokens.len() - 1)]
    }
    fn previous(&self) -> &'a Token {
        &self.tokens[self.current.saturating_sub(1)]
    }
    fn error_at_current(&self, message: &str) -> ParseError {
        ParseError {
            message: message.to_string(),
            token: self.peek().clone(),
        }
    }
}
