use crate::callable::Callable;
use crate::environment::Environment;
use crate::instance::Instance;
use crate::tracker::Release;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

/// A runtime value. Scalars compare by content; every heap variant is a shared
/// handle and compares by identity.
#[derive(Clone, Debug)]
pub enum Value {
    Nil,
    Boolean(bool),
    Number(f64),
    String(Rc<str>),
    Callable(Callable),
    Instance(Instance),
    Array(Array),
    Module(Module),
}

impl Value {
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Boolean(x) => *x,
            _ => true,
        }
    }
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Callable(_) => "callable",
            Value::Instance(_) => "instance",
            Value::Array(_) => "array",
            Value::Module(_) => "module",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Callable(a), Value::Callable(b)) => a.equals(b),
            (Value::Instance(a), Value::Instance(b)) => a.equals(b),
            (Value::Array(a), Value::Array(b)) => a.equals(b),
            (Value::Module(a), Value::Module(b)) => a.equals(b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Boolean(x) => write!(f, "{}", x),
            Value::Number(x) => write!(f, "{}", x),
            Value::String(x) => write!(f, "{}", x),
            Value::Callable(x) => write!(f, "{}", x),
            Value::Instance(x) => write!(f, "{}", x),
            Value::Array(x) => write!(f, "{}", x),
            Value::Module(x) => write!(f, "{}", x),
        }
    }
}

impl From<bool> for Value {
    fn from(x: bool) -> Value {
        Value::Boolean(x)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Value {
        Value::Number(x)
    }
}

impl From<&str> for Value {
    fn from(x: &str) -> Value {
        Value::String(Rc::from(x))
    }
}

/// A fixed-length, mutable sequence shared by every value that refers to it.
#[derive(Clone)]
pub struct Array {
    data: Rc<RefCell<Vec<Value>>>,
}

impl Array {
    pub fn new(elements: Vec<Value>) -> Array {
        Array {
            data: Rc::new(RefCell::new(elements)),
        }
    }
    pub fn len(&self) -> usize {
        self.data.borrow().len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.borrow().is_empty()
    }
    pub fn get(&self, index: usize) -> Option<Value> {
        self.data.borrow().get(index).cloned()
    }
    /// Returns false, leaving the array untouched, when `index` is out of
    /// bounds.
    pub fn set(&self, index: usize, value: Value) -> bool {
        match self.data.borrow_mut().get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
    pub fn equals(&self, other: &Array) -> bool {
        Rc::ptr_eq(&self.data, &other.data)
    }
    pub(crate) fn downgrade(&self) -> Weak<dyn Release> {
        let weak: Weak<RefCell<Vec<Value>>> = Rc::downgrade(&self.data);
        weak
    }
}

impl Release for RefCell<Vec<Value>> {
    fn release(&self) {
        if let Ok(mut data) = self.try_borrow_mut() {
            let elements = std::mem::take(&mut *data);
            drop(data);
            drop(elements);
        }
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.data.try_borrow() {
            Ok(data) => write!(f, "Array(len = {})", data.len()),
            Err(_) => write!(f, "Array(..)"),
        }
    }
}

impl fmt::Display for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Held exclusively while printing, so an array reached again through
        // its own elements prints opaquely instead of recursing.
        let data = match self.data.try_borrow_mut() {
            Ok(data) => data,
            Err(_) => return write!(f, "[...]"),
        };
        write!(f, "[")?;
        for (i, element) in data.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", element)?;
        }
        write!(f, "]")
    }
}

/// A named namespace produced by a `module` declaration.
#[derive(Clone, Debug)]
pub struct Module {
    name: Rc<str>,
    environment: Environment,
}

impl Module {
    pub fn new(name: &str, environment: Environment) -> Module {
        Module {
            name: Rc::from(name),
            environment,
        }
    }
    pub fn environment(&self) -> &Environment {
        &self.environment
    }
    pub fn equals(&self, other: &Module) -> bool {
        self.environment.equals(&other.environment)
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<module {}>", self.name)
    }
}
