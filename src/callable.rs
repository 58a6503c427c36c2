use crate::ast::FunctionDecl;
use crate::class::Class;
use crate::environment::Environment;
use crate::instance::Instance;
use crate::interpreter::{ErrorType, Interpreter, RuntimeError};
use crate::token::Token;
use crate::value::Value;
use log::trace;
use std::fmt;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Anything that can appear to the left of `(...)`.
#[derive(Clone, Debug)]
pub enum Callable {
    Function(LoxFunction),
    Class(Class),
    Native(NativeFunction),
}

impl Callable {
    pub fn arity(&self) -> usize {
        match self {
            Callable::Function(f) => f.arity(),
            Callable::Class(c) => c.arity(),
            Callable::Native(n) => n.arity,
        }
    }
    pub fn call(
        &self,
        interpreter: &mut Interpreter<'_>,
        arguments: Vec<Value>,
    ) -> Result<Value, ErrorType> {
        trace!("call {} with {} argument(s)", self, arguments.len());
        match self {
            Callable::Function(f) => f.call(interpreter, arguments),
            Callable::Class(c) => c.call(interpreter, arguments),
            Callable::Native(n) => (n.function)(&arguments)
                .map_err(|message| ErrorType::from(RuntimeError::new(&message, None))),
        }
    }
    pub fn equals(&self, other: &Callable) -> bool {
        match (self, other) {
            (Callable::Function(a), Callable::Function(b)) => a.equals(b),
            (Callable::Class(a), Callable::Class(b)) => a.equals(b),
            (Callable::Native(a), Callable::Native(b)) => a.name == b.name,
            _ => false,
        }
    }
}

impl fmt::Display for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Function(x) => write!(f, "{}", x),
            Callable::Class(x) => write!(f, "{}", x),
            Callable::Native(x) => write!(f, "{}", x),
        }
    }
}

#[derive(Clone)]
pub struct LoxFunction {
    data: Rc<LoxFunctionImpl>,
}

struct LoxFunctionImpl {
    declaration: Rc<FunctionDecl>,
    closure: Environment,
    is_initializer: bool,
}

impl fmt::Display for LoxFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.data.declaration.name {
            Some(name) => write!(f, "<fn {}>", name.lexeme),
            None => write!(f, "<fn>"),
        }
    }
}

impl fmt::Debug for LoxFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoxFunction")
            .field("name", &self.data.declaration.name.as_ref().map(|n| &n.lexeme))
            .field("arity", &self.arity())
            .field("is_initializer", &self.data.is_initializer)
            .finish()
    }
}

impl LoxFunction {
    pub fn new(
        declaration: Rc<FunctionDecl>,
        closure: Environment,
        is_initializer: bool,
    ) -> LoxFunction {
        LoxFunction {
            data: Rc::new(LoxFunctionImpl {
                declaration,
                closure,
                is_initializer,
            }),
        }
    }
    /// Runs the body in a fresh scope whose parent is the captured closure,
    /// not the caller's scope.
    pub fn call(
        &self,
        interpreter: &mut Interpreter<'_>,
        arguments: Vec<Value>,
    ) -> Result<Value, ErrorType> {
        let declaration = &self.data.declaration;
        let environment = self.data.closure.new_child();
        for (param, value) in declaration.params.iter().zip(arguments) {
            environment.define(param, value)?;
        }
        match interpreter.execute_block(&declaration.body, &environment) {
            Ok(()) => self.finish(Value::Nil),
            Err(ErrorType::Return(value)) => self.finish(value),
            Err(e) => Err(e),
        }
    }
    /// Initializers always yield the instance, whatever the body returned.
    fn finish(&self, value: Value) -> Result<Value, ErrorType> {
        if self.data.is_initializer {
            let this = Token::implicit("this", &self.data.declaration.keyword);
            Ok(self.data.closure.access_at(0, &this)?)
        } else {
            Ok(value)
        }
    }
    /// A copy of this method whose closure has one extra scope binding `this`.
    pub fn bind(&self, instance: &Instance) -> LoxFunction {
        let environment = self
            .data
            .closure
            .new_child_with("this", Value::Instance(instance.clone()));
        LoxFunction::new(
            self.data.declaration.clone(),
            environment,
            self.data.is_initializer,
        )
    }
    pub fn arity(&self) -> usize {
        self.data.declaration.params.len()
    }
    pub fn is_initializer(&self) -> bool {
        self.data.is_initializer
    }
    pub fn equals(&self, other: &LoxFunction) -> bool {
        Rc::ptr_eq(&self.data, &other.data)
    }
}

#[derive(Clone)]
pub struct NativeFunction {
    pub name: &'static str,
    pub arity: usize,
    pub function: fn(&[Value]) -> Result<Value, String>,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFunction({})", self.name)
    }
}

impl fmt::Display for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<native fn {}>", self.name)
    }
}

fn clock(_: &[Value]) -> Result<Value, String> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| Value::Number(elapsed.as_secs_f64()))
        .map_err(|e| format!("Clock error: {}", e))
}

fn len(arguments: &[Value]) -> Result<Value, String> {
    match arguments.first() {
        Some(Value::Array(array)) => Ok(Value::Number(array.len() as f64)),
        Some(Value::String(string)) => Ok(Value::Number(string.chars().count() as f64)),
        Some(other) => Err(format!(
            "len() expects an array or a string, got {}.",
            other.type_name()
        )),
        None => Err("len() expects one argument.".to_string()),
    }
}

/// Functions installed in the global scope of every interpreter.
pub fn natives() -> Vec<NativeFunction> {
    vec![
        NativeFunction {
            name: "clock",
            arity: 0,
            function: clock,
        },
        NativeFunction {
            name: "len",
            arity: 1,
            function: len,
        },
    ]
}

#[cfg(test)]
mod callable_tests {
    use crate::callable::natives;
    use crate::value::{Array, Value};

    fn native(name: &str) -> fn(&[Value]) -> Result<Value, String> {
        natives()
            .into_iter()
            .find(|n| n.name == name)
            .map(|n| n.function)
            .unwrap()
    }

    #[test]
    fn clock_is_positive() {
        match native("clock")(&[]) {
            Ok(Value::Number(t)) => assert!(t > 0.0),
            other => panic!("unexpected clock result {:?}", other),
        }
    }

    #[test]
    fn len_of_arrays_and_strings() {
        let len = native("len");
        let array = Array::new(vec![Value::Nil; 3]);
        assert_eq!(len(&[Value::Array(array)]), Ok(Value::Number(3.0)));
        assert_eq!(len(&[Value::from("héllo")]), Ok(Value::Number(5.0)));
        assert_eq!(
            len(&[Value::Nil]),
            Err("len() expects an array or a string, got nil.".to_string())
        );
    }
}
