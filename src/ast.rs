use crate::token::Token;
use std::cell::Cell;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Nil,
    Boolean(bool),
    Number(f64),
    String(Rc<str>),
}

/// Lexical distance from a use site to its declaring scope, filled in by the
/// resolver. `None` means the name lives in the globals.
pub type Depth = Cell<Option<usize>>;

#[derive(Debug)]
pub enum Expression {
    Literal(Literal),
    Grouping(Box<Expression>),
    Unary {
        operator: Token,
        right: Box<Expression>,
    },
    Binary {
        left: Box<Expression>,
        operator: Token,
        right: Box<Expression>,
    },
    Logical {
        left: Box<Expression>,
        operator: Token,
        right: Box<Expression>,
    },
    Variable {
        name: Token,
        depth: Depth,
    },
    Assign {
        name: Token,
        value: Box<Expression>,
        depth: Depth,
    },
    Call {
        callee: Box<Expression>,
        paren: Token,
        arguments: Vec<Expression>,
    },
    Get {
        object: Box<Expression>,
        name: Token,
    },
    Set {
        object: Box<Expression>,
        name: Token,
        value: Box<Expression>,
    },
    This {
        keyword: Token,
        depth: Depth,
    },
    Super {
        keyword: Token,
        method: Token,
        depth: Depth,
    },
    Function(Rc<FunctionDecl>),
    Array {
        bracket: Token,
        size: Option<Box<Expression>>,
        elements: Vec<Expression>,
    },
    Index {
        object: Box<Expression>,
        bracket: Token,
        index: Box<Expression>,
    },
    SetIndex {
        object: Box<Expression>,
        bracket: Token,
        index: Box<Expression>,
        value: Box<Expression>,
    },
}

/// A function body shared between the syntax tree and every closure created
/// from it. Lambdas have no name.
#[derive(Debug)]
pub struct FunctionDecl {
    pub keyword: Token,
    pub name: Option<Token>,
    pub params: Vec<Token>,
    pub body: Vec<Statement>,
}

impl FunctionDecl {
    pub fn is_named(&self, name: &str) -> bool {
        self.name.as_ref().map_or(false, |n| &*n.lexeme == name)
    }
}

#[derive(Debug)]
pub enum Statement {
    Print(Expression),
    Expression(Expression),
    Var {
        name: Token,
        initializer: Option<Expression>,
    },
    Let {
        name: Token,
        initializer: Expression,
    },
    Block(Vec<Statement>),
    If {
        condition: Expression,
        then_branch: Box<Statement>,
        else_branch: Option<Box<Statement>>,
    },
    While {
        condition: Expression,
        body: Box<Statement>,
        increment: Option<Expression>,
    },
    Function(Rc<FunctionDecl>),
    Class {
        name: Token,
        superclass: Option<Expression>,
        methods: Vec<Rc<FunctionDecl>>,
    },
    Return {
        keyword: Token,
        value: Option<Expression>,
    },
    Break(Token),
    Continue(Token),
    Module {
        name: Token,
        body: Vec<Statement>,
    },
}

pub struct AstPrinter {}

impl AstPrinter {
    fn parenthesize(&self, name: &str, args: &[&Expression]) -> String {
        let mut x = String::from("(");
        x.push_str(name);
        for arg in args {
            x.push(' ');
            x.push_str(&self.print(arg));
        }
        x.push(')');
        x
    }

    pub fn print(&self, expr: &Expression) -> String {
        match expr {
            Expression::Literal(x) => match x {
                Literal::Nil => "nil".to_string(),
                Literal::Boolean(b) => b.to_string(),
                Literal::Number(n) => n.to_string(),
                Literal::String(s) => format!("\"{}\"", s),
            },
            Expression::Grouping(x) => self.parenthesize("group", &[&**x]),
            Expression::Unary { operator, right } => self.parenthesize(&operator.lexeme, &[&**right]),
            Expression::Binary {
                left,
                operator,
                right,
            }
            | Expression::Logical {
                left,
                operator,
                right,
            } => self.parenthesize(&operator.lexeme, &[&**left, &**right]),
            Expression::Variable { name, .. } => name.lexeme.to_string(),
            Expression::Assign { name, value, .. } => {
                format!("(assign {} {})", name.lexeme, self.print(value))
            }
            Expression::Call {
                callee, arguments, ..
            } => {
                let mut args: Vec<&Expression> = vec![&**callee];
                args.extend(arguments.iter());
                self.parenthesize("call", &args)
            }
            Expression::Get { object, name } => {
                format!("(. {} {})", self.print(object), name.lexeme)
            }
            Expression::Set {
                object,
                name,
                value,
            } => format!(
                "(set {} {} {})",
                self.print(object),
                name.lexeme,
                self.print(value)
            ),
            Expression::This { .. } => "this".to_string(),
            Expression::Super { method, .. } => format!("(super {})", method.lexeme),
            Expression::Function(decl) => match &decl.name {
                Some(name) => format!("(fun {})", name.lexeme),
                None => "(fun)".to_string(),
            },
            Expression::Array { size, elements, .. } => {
                let elements: Vec<&Expression> = elements.iter().collect();
                match size {
                    Some(size) => {
                        format!(
                            "(array {} {})",
                            self.print(size),
                            self.parenthesize("list", &elements)
                        )
                    }
                    None => self.parenthesize("list", &elements),
                }
            }
            Expression::Index { object, index, .. } => self.parenthesize("[]", &[&**object, &**index]),
            Expression::SetIndex {
                object,
                index,
                value,
                ..
            } => self.parenthesize("[]=", &[&**object, &**index, &**value]),
        }
    }
}
