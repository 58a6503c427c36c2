use crate::ast::{Depth, Expression, FunctionDecl, Statement};
use crate::token::{report, Token};
use log::debug;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub struct ResolverError {
    pub message: String,
    pub token: Token,
}

impl fmt::Display for ResolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        report(f, "ResolveError", &self.token, &self.message)
    }
}

impl Error for ResolverError {}

#[derive(Clone, Copy, Debug, PartialEq)]
enum FunctionType {
    None,
    Function,
    Initializer,
    Method,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum ClassType {
    None,
    Class,
    Subclass,
}

#[derive(Clone, Copy, Debug)]
struct Binding {
    defined: bool,
    assignable: bool,
}

/// Static pass that annotates every variable, assignment, `this` and `super`
/// with the number of scopes between the use and its declaration.
pub struct Resolver {
    scopes: Vec<BTreeMap<Rc<str>, Binding>>,
    current_function: FunctionType,
    current_class: ClassType,
    loop_depth: usize,
    resolved: usize,
    errors: Vec<ResolverError>,
}

pub fn resolve(statements: &[Statement]) -> Result<(), Vec<ResolverError>> {
    Resolver::new().resolve(statements)
}

impl Resolver {
    pub fn new() -> Resolver {
        Resolver {
            scopes: Vec::new(),
            current_function: FunctionType::None,
            current_class: ClassType::None,
            loop_depth: 0,
            resolved: 0,
            errors: Vec::new(),
        }
    }

    /// Resolves a whole program. The outermost scope stands for the globals;
    /// names not found anywhere are left for a global lookup at runtime.
    pub fn resolve(mut self, statements: &[Statement]) -> Result<(), Vec<ResolverError>> {
        self.begin_scope();
        self.resolve_statements(statements);
        self.end_scope();
        debug!(
            "resolved {} reference(s), {} error(s)",
            self.resolved,
            self.errors.len()
        );
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }

    fn resolve_statements(&mut self, statements: &[Statement]) {
        for statement in statements {
            self.resolve_statement(statement);
        }
    }

    fn resolve_statement(&mut self, statement: &Statement) {
        match statement {
            Statement::Print(expr) | Statement::Expression(expr) => self.resolve_expr(expr),
            Statement::Var { name, initializer } => {
                self.declare(name, true);
                if let Some(initializer) = initializer {
                    self.resolve_expr(initializer);
                }
                self.define(name);
            }
            Statement::Let { name, initializer } => {
                self.declare(name, false);
                self.resolve_expr(initializer);
                self.define(name);
            }
            Statement::Block(statements) => {
                self.begin_scope();
                self.resolve_statements(statements);
                self.end_scope();
            }
            Statement::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(condition);
                self.resolve_statement(then_branch);
                if let Some(else_branch) = else_branch {
                    self.resolve_statement(else_branch);
                }
            }
            Statement::While {
                condition,
                body,
                increment,
            } => {
                self.resolve_expr(condition);
                self.loop_depth += 1;
                self.resolve_statement(body);
                self.loop_depth -= 1;
                if let Some(increment) = increment {
                    self.resolve_expr(increment);
                }
            }
            Statement::Function(declaration) => {
                if let Some(name) = &declaration.name {
                    self.declare(name, true);
                    self.define(name);
                }
                self.resolve_function(declaration, FunctionType::Function);
            }
            Statement::Class {
                name,
                superclass,
                methods,
            } => self.resolve_class(name, superclass.as_ref(), methods),
            Statement::Return { keyword, value } => {
                if self.current_function == FunctionType::None {
                    self.error(keyword, "Can't return from top-level code.");
                }
                if let Some(value) = value {
                    if self.current_function == FunctionType::Initializer {
                        self.error(keyword, "Can't return a value from an initializer.");
                    }
                    self.resolve_expr(value);
                }
            }
            Statement::Break(keyword) => {
                if self.loop_depth == 0 {
                    self.error(keyword, "Can't use 'break' outside of a loop.");
                }
            }
            Statement::Continue(keyword) => {
                if self.loop_depth == 0 {
                    self.error(keyword, "Can't use 'continue' outside of a loop.");
                }
            }
            Statement::Module { name, body } => {
                let enclosing_loop = std::mem::replace(&mut self.loop_depth, 0);
                self.begin_scope();
                self.resolve_statements(body);
                self.end_scope();
                self.loop_depth = enclosing_loop;
                self.declare(name, false);
                self.define(name);
            }
        }
    }

    fn resolve_class(
        &mut self,
        name: &Token,
        superclass: Option<&Expression>,
        methods: &[Rc<FunctionDecl>],
    ) {
        let enclosing_class = self.current_class;
        self.current_class = ClassType::Class;
        self.declare(name, true);
        self.define(name);
        if let Some(superclass) = superclass {
            if let Expression::Variable {
                name: superclass_name,
                ..
            } = superclass
            {
                if superclass_name.lexeme == name.lexeme {
                    self.error(superclass_name, "A class can't inherit from itself.");
                }
            }
            self.current_class = ClassType::Subclass;
            self.resolve_expr(superclass);
            self.begin_scope();
            self.bind_implicit("super");
        }
        self.begin_scope();
        self.bind_implicit("this");
        for method in methods {
            let kind = if method.is_named("init") {
                FunctionType::Initializer
            } else {
                FunctionType::Method
            };
            self.resolve_function(method, kind);
        }
        self.end_scope();
        if superclass.is_some() {
            self.end_scope();
        }
        self.current_class = enclosing_class;
    }

    fn resolve_function(&mut self, declaration: &FunctionDecl, kind: FunctionType) {
        let enclosing_function = self.current_function;
        let enclosing_loop = std::mem::replace(&mut self.loop_depth, 0);
        self.current_function = kind;
        self.begin_scope();
        for param in &declaration.params {
            self.declare(param, true);
            self.define(param);
        }
        self.resolve_statements(&declaration.body);
        self.end_scope();
        self.loop_depth = enclosing_loop;
        self.current_function = enclosing_function;
    }

    fn resolve_expr(&mut self, expr: &Expression) {
        match expr {
            Expression::Literal(_) => {}
            Expression::Grouping(inner) => self.resolve_expr(inner),
            Expression::Unary { right, .. } => self.resolve_expr(right),
            Expression::Binary { left, right, .. } | Expression::Logical { left, right, .. } => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            }
            Expression::Variable { name, depth } => {
                let uninitialized = self
                    .scopes
                    .last()
                    .and_then(|scope| scope.get(&name.lexeme))
                    .map_or(false, |binding| !binding.defined);
                if uninitialized {
                    self.error(name, "Can't read local variable in its own initializer.");
                }
                self.resolve_local(name, depth, false);
            }
            Expression::Assign { name, value, depth } => {
                self.resolve_expr(value);
                self.resolve_local(name, depth, true);
            }
            Expression::Call {
                callee, arguments, ..
            } => {
                self.resolve_expr(callee);
                for argument in arguments {
                    self.resolve_expr(argument);
                }
            }
            Expression::Get { object, .. } => self.resolve_expr(object),
            Expression::Set { object, value, .. } => {
                self.resolve_expr(value);
                self.resolve_expr(object);
            }
            Expression::This { keyword, depth } => {
                if self.current_class == ClassType::None {
                    self.error(keyword, "Can't use 'this' outside of a class.");
                } else {
                    self.resolve_local(keyword, depth, false);
                }
            }
            Expression::Super { keyword, depth, .. } => match self.current_class {
                ClassType::None => self.error(keyword, "Can't use 'super' outside of a class."),
                ClassType::Class => {
                    self.error(keyword, "Can't use 'super' in a class with no superclass.")
                }
                ClassType::Subclass => self.resolve_local(keyword, depth, false),
            },
            Expression::Function(declaration) => match &declaration.name {
                // A named lambda sees its own name in a scope of its own.
                Some(name) => {
                    self.begin_scope();
                    self.declare(name, false);
                    self.define(name);
                    self.resolve_function(declaration, FunctionType::Function);
                    self.end_scope();
                }
                None => self.resolve_function(declaration, FunctionType::Function),
            },
            Expression::Array { size, elements, .. } => {
                if let Some(size) = size {
                    self.resolve_expr(size);
                }
                for element in elements {
                    self.resolve_expr(element);
                }
            }
            Expression::Index { object, index, .. } => {
                self.resolve_expr(object);
                self.resolve_expr(index);
            }
            Expression::SetIndex {
                object,
                index,
                value,
                ..
            } => {
                self.resolve_expr(object);
                self.resolve_expr(index);
                self.resolve_expr(value);
            }
        }
    }

    fn begin_scope(&mut self) {
        self.scopes.push(BTreeMap::new());
    }

    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &Token, assignable: bool) {
        let duplicate = match self.scopes.last_mut() {
            Some(scope) if scope.contains_key(&name.lexeme) => true,
            Some(scope) => {
                scope.insert(
                    name.lexeme.clone(),
                    Binding {
                        defined: false,
                        assignable,
                    },
                );
                false
            }
            None => false,
        };
        if duplicate {
            self.error(
                name,
                &format!("Symbol '{}' is already declared in this scope.", name.lexeme),
            );
        }
    }

    fn define(&mut self, name: &Token) {
        if let Some(binding) = self
            .scopes
            .last_mut()
            .and_then(|scope| scope.get_mut(&name.lexeme))
        {
            binding.defined = true;
        }
    }

    fn bind_implicit(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(
                Rc::from(name),
                Binding {
                    defined: true,
                    assignable: false,
                },
            );
        }
    }

    fn resolve_local(&mut self, name: &Token, depth: &Depth, assigning: bool) {
        let found = self
            .scopes
            .iter()
            .rev()
            .enumerate()
            .find_map(|(distance, scope)| {
                scope
                    .get(&name.lexeme)
                    .map(|binding| (distance, binding.assignable))
            });
        if let Some((distance, assignable)) = found {
            if assigning && !assignable {
                self.error(
                    name,
                    &format!("Can't assign to read-only binding '{}'.", name.lexeme),
                );
            }
            depth.set(Some(distance));
            self.resolved += 1;
        }
    }

    fn error(&mut self, token: &Token, message: &str) {
        self.errors.push(ResolverError {
            message: message.to_string(),
            token: token.clone(),
        });
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Resolver::new()
    }
}
