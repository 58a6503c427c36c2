use crate::ast::{Depth, Expression, FunctionDecl, Literal, Statement};
use crate::callable::{natives, Callable, LoxFunction};
use crate::class::Class;
use crate::environment::Environment;
use crate::token::{report, Token, TokenType};
use crate::tracker::{Release, Tracker};
use crate::value::{Array, Module, Value};
use log::{debug, error};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::io::Write;
use std::rc::{Rc, Weak};

/// Nested calls allowed before "Stack overflow." is raised. Needs a host
/// stack of about `crate::STACK_SIZE`.
pub const MAX_CALL_DEPTH: usize = 5_000;
const MAX_ARRAY_SIZE: f64 = 16_777_216.0;

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub message: String,
    pub token: Option<Token>,
}

impl RuntimeError {
    pub fn new(message: &str, token: Option<&Token>) -> RuntimeError {
        RuntimeError {
            message: message.to_string(),
            token: token.cloned(),
        }
    }
    /// Gives a position to errors raised where none was known, such as inside
    /// a native function.
    fn or_at(mut self, token: &Token) -> RuntimeError {
        if self.token.is_none() {
            self.token = Some(token.clone());
        }
        self
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.token {
            Some(token) => report(f, "RuntimeError", token, &self.message),
            None => write!(f, "RuntimeError: {}", self.message),
        }
    }
}

impl Error for RuntimeError {}

/// Everything that unwinds out of `execute`/`evaluate`. Only `Runtime` is a
/// real error; the rest are caught by the nearest function call or loop.
#[derive(Debug, thiserror::Error)]
pub enum ErrorType {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("'return' escaped its function")]
    Return(Value),
    #[error("'break' escaped its loop")]
    Break,
    #[error("'continue' escaped its loop")]
    Continue,
}

type Evaluation = Result<Value, ErrorType>;
type Execution = Result<(), ErrorType>;

pub struct Interpreter<'w> {
    globals: Environment,
    out: &'w mut dyn Write,
    tracker: Tracker,
    call_depth: usize,
}

impl<'w> Interpreter<'w> {
    pub fn new(out: &'w mut dyn Write) -> Interpreter<'w> {
        let globals = Environment::new();
        for native in natives() {
            globals.bind(native.name, Value::Callable(Callable::Native(native)));
        }
        Interpreter {
            globals,
            out,
            tracker: Tracker::new(),
            call_depth: 0,
        }
    }

    pub fn globals(&self) -> &Environment {
        &self.globals
    }

    /// Runs top-level statements in the global scope, stopping at the first
    /// runtime error.
    pub fn interpret(&mut self, statements: &[Statement]) -> Result<(), RuntimeError> {
        let globals = self.globals.clone();
        for statement in statements {
            match self.execute(statement, &globals) {
                Ok(()) => {}
                Err(ErrorType::Runtime(e)) => return Err(e),
                Err(signal) => {
                    error!("{} at the top level", signal);
                    return Err(RuntimeError::new(&signal.to_string(), None));
                }
            }
        }
        Ok(())
    }

    pub(crate) fn track(&mut self, handle: Weak<dyn Release>) {
        self.tracker.track(handle);
    }

    /// Runs `statements` directly in `env`. Callers decide whether that is a
    /// fresh block scope or a function's parameter scope.
    pub fn execute_block(&mut self, statements: &[Statement], env: &Environment) -> Execution {
        for statement in statements {
            self.execute(statement, env)?;
        }
        Ok(())
    }

    pub fn execute(&mut self, statement: &Statement, env: &Environment) -> Execution {
        match statement {
            Statement::Print(expr) => {
                let value = self.evaluate(expr, env)?;
                writeln!(self.out, "{}", value).map_err(|e| {
                    RuntimeError::new(&format!("Failed to write output: {}.", e), None)
                })?;
                Ok(())
            }
            Statement::Expression(expr) => {
                self.evaluate(expr, env)?;
                Ok(())
            }
            Statement::Var { name, initializer } => {
                let value = match initializer {
                    Some(expr) => self.evaluate(expr, env)?,
                    None => Value::Nil,
                };
                env.define(name, value)?;
                Ok(())
            }
            Statement::Let { name, initializer } => {
                let value = self.evaluate(initializer, env)?;
                env.define_read_only(name, value)?;
                Ok(())
            }
            Statement::Block(statements) => self.execute_block(statements, &env.new_child()),
            Statement::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition, env)?.is_truthy() {
                    self.execute(then_branch, env)
                } else if let Some(else_branch) = else_branch {
                    self.execute(else_branch, env)
                } else {
                    Ok(())
                }
            }
            Statement::While {
                condition,
                body,
                increment,
            } => {
                while self.evaluate(condition, env)?.is_truthy() {
                    match self.execute(body, env) {
                        Ok(()) | Err(ErrorType::Continue) => {}
                        Err(ErrorType::Break) => break,
                        Err(e) => return Err(e),
                    }
                    if let Some(increment) = increment {
                        self.evaluate(increment, env)?;
                    }
                }
                Ok(())
            }
            Statement::Function(declaration) => {
                let function = self.make_function(declaration, env, false);
                if let Some(name) = &declaration.name {
                    env.define(name, Value::Callable(Callable::Function(function)))?;
                }
                Ok(())
            }
            Statement::Class {
                name,
                superclass,
                methods,
            } => self.class_declaration(name, superclass.as_ref(), methods, env),
            Statement::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.evaluate(expr, env)?,
                    None => Value::Nil,
                };
                Err(ErrorType::Return(value))
            }
            Statement::Break(_) => Err(ErrorType::Break),
            Statement::Continue(_) => Err(ErrorType::Continue),
            Statement::Module { name, body } => {
                let namespace = env.new_child();
                self.track(namespace.downgrade());
                self.execute_block(body, &namespace)?;
                debug!("materialized module '{}'", name.lexeme);
                env.define_read_only(name, Value::Module(Module::new(&name.lexeme, namespace)))?;
                Ok(())
            }
        }
    }

    fn class_declaration(
        &mut self,
        name: &Token,
        superclass: Option<&Expression>,
        methods: &[Rc<FunctionDecl>],
        env: &Environment,
    ) -> Execution {
        let superclass = match superclass {
            Some(expr) => match self.evaluate(expr, env)? {
                Value::Callable(Callable::Class(class)) => Some(class),
                _ => {
                    let at = match expr {
                        Expression::Variable { name, .. } => name,
                        _ => name,
                    };
                    return Err(RuntimeError::new("Superclass must be a class.", Some(at)).into());
                }
            },
            None => None,
        };
        // Every method shares one closure; for subclasses it binds `super`.
        let closure = match &superclass {
            Some(class) => env.new_child_with("super", Value::Callable(Callable::Class(class.clone()))),
            None => env.clone(),
        };
        let mut table = BTreeMap::new();
        for method in methods {
            if let Some(method_name) = &method.name {
                let function = self.make_function(method, &closure, method.is_named("init"));
                table.insert(method_name.lexeme.clone(), function);
            }
        }
        let class = Class::new(name.clone(), superclass, table);
        debug!("defined {:?}", class);
        env.define(name, Value::Callable(Callable::Class(class)))?;
        Ok(())
    }

    fn make_function(
        &mut self,
        declaration: &Rc<FunctionDecl>,
        closure: &Environment,
        is_initializer: bool,
    ) -> LoxFunction {
        self.track(closure.downgrade());
        LoxFunction::new(declaration.clone(), closure.clone(), is_initializer)
    }

    fn look_up(&self, name: &Token, depth: &Depth, env: &Environment) -> Result<Value, RuntimeError> {
        match depth.get() {
            Some(distance) => env.access_at(distance, name),
            None => self.globals.access(name),
        }
    }

    pub fn evaluate(&mut self, expr: &Expression, env: &Environment) -> Evaluation {
        match expr {
            Expression::Literal(literal) => Ok(match literal {
                Literal::Nil => Value::Nil,
                Literal::Boolean(b) => Value::Boolean(*b),
                Literal::Number(n) => Value::Number(*n),
                Literal::String(s) => Value::String(s.clone()),
            }),
            Expression::Grouping(inner) => self.evaluate(inner, env),
            Expression::Unary { operator, right } => {
                let right = self.evaluate(right, env)?;
                Ok(unary(operator, right)?)
            }
            Expression::Binary {
                left,
                operator,
                right,
            } => {
                let left = self.evaluate(left, env)?;
                let right = self.evaluate(right, env)?;
                Ok(binary(operator, left, right)?)
            }
            Expression::Logical {
                left,
                operator,
                right,
            } => {
                let left = self.evaluate(left, env)?;
                match operator.tokentype {
                    TokenType::Or if left.is_truthy() => Ok(left),
                    TokenType::And if !left.is_truthy() => Ok(left),
                    _ => self.evaluate(right, env),
                }
            }
            Expression::Variable { name, depth } => Ok(self.look_up(name, depth, env)?),
            Expression::Assign { name, value, depth } => {
                let value = self.evaluate(value, env)?;
                match depth.get() {
                    Some(distance) => env.assign_at(distance, name, value.clone())?,
                    None => self.globals.assign(name, value.clone())?,
                }
                Ok(value)
            }
            Expression::Call {
                callee,
                paren,
                arguments,
            } => {
                let callee = self.evaluate(callee, env)?;
                let mut values = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    values.push(self.evaluate(argument, env)?);
                }
                let callable = match callee {
                    Value::Callable(callable) => callable,
                    _ => {
                        return Err(RuntimeError::new(
                            "Can only call functions and classes.",
                            Some(paren),
                        )
                        .into())
                    }
                };
                if callable.arity() != values.len() {
                    return Err(RuntimeError::new(
                        &format!(
                            "Expected {} arguments but got {}.",
                            callable.arity(),
                            values.len()
                        ),
                        Some(paren),
                    )
                    .into());
                }
                if self.call_depth >= MAX_CALL_DEPTH {
                    return Err(RuntimeError::new("Stack overflow.", Some(paren)).into());
                }
                self.call_depth += 1;
                let result = callable.call(self, values);
                self.call_depth -= 1;
                result.map_err(|e| match e {
                    ErrorType::Runtime(e) => ErrorType::Runtime(e.or_at(paren)),
                    other => other,
                })
            }
            Expression::Get { object, name } => match self.evaluate(object, env)? {
                Value::Instance(instance) => Ok(instance.get(name)?),
                Value::Module(module) => module
                    .environment()
                    .get_local(&name.lexeme)
                    .ok_or_else(|| ErrorType::from(undefined_property(name))),
                _ => Err(no_properties(name).into()),
            },
            Expression::Set {
                object,
                name,
                value,
            } => match self.evaluate(object, env)? {
                Value::Instance(instance) => {
                    let value = self.evaluate(value, env)?;
                    instance.set(name, value.clone());
                    Ok(value)
                }
                Value::Module(module) => {
                    let value = self.evaluate(value, env)?;
                    if module.environment().is_read_only(&name.lexeme) {
                        return Err(RuntimeError::new(
                            &format!("Can't assign to read-only binding '{}'.", name.lexeme),
                            Some(name),
                        )
                        .into());
                    }
                    if module.environment().assign_local(name, value.clone()) {
                        Ok(value)
                    } else {
                        Err(undefined_property(name).into())
                    }
                }
                _ => Err(no_properties(name).into()),
            },
            Expression::This { keyword, depth } => Ok(self.look_up(keyword, depth, env)?),
            Expression::Super {
                keyword,
                method,
                depth,
            } => {
                let distance = depth
                    .get()
                    .ok_or_else(|| RuntimeError::new("Unresolved 'super'.", Some(keyword)))?;
                let superclass = match env.access_at(distance, keyword)? {
                    Value::Callable(Callable::Class(class)) => class,
                    _ => {
                        return Err(
                            RuntimeError::new("Superclass must be a class.", Some(keyword)).into(),
                        )
                    }
                };
                // `this` always lives one scope inside the `super` binding.
                let this = Token::implicit("this", keyword);
                let instance = match env.access_at(distance.saturating_sub(1), &this)? {
                    Value::Instance(instance) => instance,
                    _ => {
                        return Err(RuntimeError::new("'this' is not an instance.", Some(keyword))
                            .into())
                    }
                };
                match superclass.find_method(&method.lexeme) {
                    Some(found) => Ok(Value::Callable(Callable::Function(found.bind(&instance)))),
                    None => Err(undefined_property(method).into()),
                }
            }
            Expression::Function(declaration) => match &declaration.name {
                Some(name) => {
                    let scope = env.new_child();
                    let function = Value::Callable(Callable::Function(
                        self.make_function(declaration, &scope, false),
                    ));
                    scope.define_read_only(name, function.clone())?;
                    Ok(function)
                }
                None => {
                    let function = self.make_function(declaration, env, false);
                    Ok(Value::Callable(Callable::Function(function)))
                }
            },
            Expression::Array {
                bracket,
                size,
                elements,
            } => {
                let size = match size {
                    Some(size) => {
                        let size = integer(&self.evaluate(size, env)?, "Array size", bracket)?;
                        if size < 0.0 {
                            return Err(RuntimeError::new(
                                "Array size must not be negative.",
                                Some(bracket),
                            )
                            .into());
                        }
                        if size > MAX_ARRAY_SIZE {
                            return Err(
                                RuntimeError::new("Array size is too large.", Some(bracket)).into(),
                            );
                        }
                        Some(size as usize)
                    }
                    None => None,
                };
                let mut values = Vec::with_capacity(size.unwrap_or(elements.len()));
                for element in elements {
                    values.push(self.evaluate(element, env)?);
                }
                if let Some(size) = size {
                    if size < values.len() {
                        return Err(RuntimeError::new(
                            &format!(
                                "Array of size {} cannot hold {} initializers.",
                                size,
                                values.len()
                            ),
                            Some(bracket),
                        )
                        .into());
                    }
                    values.resize(size, Value::Nil);
                }
                let array = Array::new(values);
                self.track(array.downgrade());
                Ok(Value::Array(array))
            }
            Expression::Index {
                object,
                bracket,
                index,
            } => {
                let array = indexable(self.evaluate(object, env)?, bracket)?;
                let index = self.evaluate(index, env)?;
                let index = checked_index(&index, &array, bracket)?;
                array
                    .get(index)
                    .ok_or_else(|| ErrorType::from(out_of_bounds(index as f64, &array, bracket)))
            }
            Expression::SetIndex {
                object,
                bracket,
                index,
                value,
            } => {
                let array = indexable(self.evaluate(object, env)?, bracket)?;
                let index = self.evaluate(index, env)?;
                let index = checked_index(&index, &array, bracket)?;
                let value = self.evaluate(value, env)?;
                if array.set(index, value.clone()) {
                    Ok(value)
                } else {
                    Err(out_of_bounds(index as f64, &array, bracket).into())
                }
            }
        }
    }
}

impl Drop for Interpreter<'_> {
    fn drop(&mut self) {
        let globals = self.globals.downgrade();
        self.tracker.track(globals);
        debug!("releasing {} live object(s)", self.tracker.live());
        self.tracker.release_all();
    }
}

fn undefined_property(name: &Token) -> RuntimeError {
    RuntimeError::new(
        &format!("Undefined property '{}'.", name.lexeme),
        Some(name),
    )
}

fn no_properties(name: &Token) -> RuntimeError {
    RuntimeError::new("Only instances and modules have properties.", Some(name))
}

fn unary(operator: &Token, right: Value) -> Result<Value, RuntimeError> {
    match operator.tokentype {
        TokenType::Bang => Ok(Value::Boolean(!right.is_truthy())),
        TokenType::Minus => match right {
            Value::Number(n) => Ok(Value::Number(-n)),
            _ => Err(RuntimeError::new("Operand must be a number.", Some(operator))),
        },
        _ => Err(unknown_operator(operator)),
    }
}

fn binary(operator: &Token, left: Value, right: Value) -> Result<Value, RuntimeError> {
    match operator.tokentype {
        TokenType::EqualEqual => return Ok(Value::Boolean(left == right)),
        TokenType::BangEqual => return Ok(Value::Boolean(left != right)),
        TokenType::Plus => {
            return match (&left, &right) {
                (Value::Number(l), Value::Number(r)) => Ok(Value::Number(l + r)),
                (Value::String(l), Value::String(r)) => {
                    let mut joined = String::with_capacity(l.len() + r.len());
                    joined.push_str(l);
                    joined.push_str(r);
                    Ok(Value::String(Rc::from(joined)))
                }
                _ => Err(RuntimeError::new(
                    "Operands must be two numbers or two strings.",
                    Some(operator),
                )),
            }
        }
        _ => {}
    }
    let (l, r) = match (left, right) {
        (Value::Number(l), Value::Number(r)) => (l, r),
        _ => return Err(RuntimeError::new("Operands must be numbers.", Some(operator))),
    };
    match operator.tokentype {
        TokenType::Minus => Ok(Value::Number(l - r)),
        TokenType::Star => Ok(Value::Number(l * r)),
        TokenType::Slash => Ok(Value::Number(l / r)),
        TokenType::Greater => Ok(Value::Boolean(l > r)),
        TokenType::GreaterEqual => Ok(Value::Boolean(l >= r)),
        TokenType::Less => Ok(Value::Boolean(l < r)),
        TokenType::LessEqual => Ok(Value::Boolean(l <= r)),
        _ => Err(unknown_operator(operator)),
    }
}

fn unknown_operator(operator: &Token) -> RuntimeError {
    RuntimeError::new(
        &format!("Unknown operator '{}'.", operator.lexeme),
        Some(operator),
    )
}

/// A number with no fractional part, still as an `f64` so that callers can
/// range-check it before converting.
fn integer(value: &Value, what: &str, at: &Token) -> Result<f64, RuntimeError> {
    match value {
        Value::Number(n) if n.is_finite() && n.fract() == 0.0 => Ok(*n),
        Value::Number(_) => Err(RuntimeError::new(
            &format!("{} must be an integer.", what),
            Some(at),
        )),
        _ => Err(RuntimeError::new(
            &format!("{} must be a number.", what),
            Some(at),
        )),
    }
}

fn indexable(value: Value, bracket: &Token) -> Result<Array, RuntimeError> {
    match value {
        Value::Array(array) => Ok(array),
        other => Err(RuntimeError::new(
            &format!("Can only index arrays, not {}.", other.type_name()),
            Some(bracket),
        )),
    }
}

fn checked_index(index: &Value, array: &Array, bracket: &Token) -> Result<usize, RuntimeError> {
    let index = integer(index, "Index", bracket)?;
    if index < 0.0 || index >= array.len() as f64 {
        return Err(out_of_bounds(index, array, bracket));
    }
    Ok(index as usize)
}

fn out_of_bounds(index: f64, array: &Array, bracket: &Token) -> RuntimeError {
    RuntimeError::new(
        &format!(
            "Index {} is out of bounds for array of length {}.",
            index,
            array.len()
        ),
        Some(bracket),
    )
}
