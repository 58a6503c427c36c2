use crate::callable::LoxFunction;
use crate::instance::Instance;
use crate::interpreter::{ErrorType, Interpreter};
use crate::token::Token;
use crate::value::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

#[derive(Clone)]
pub struct Class {
    data: Rc<ClassImpl>,
}

struct ClassImpl {
    name: Token,
    superclass: Option<Class>,
    methods: BTreeMap<Rc<str>, LoxFunction>,
}

impl Class {
    pub fn new(
        name: Token,
        superclass: Option<Class>,
        methods: BTreeMap<Rc<str>, LoxFunction>,
    ) -> Class {
        Class {
            data: Rc::new(ClassImpl {
                name,
                superclass,
                methods,
            }),
        }
    }
    pub fn name(&self) -> Rc<str> {
        self.data.name.lexeme.clone()
    }
    pub fn superclass(&self) -> Option<&Class> {
        self.data.superclass.as_ref()
    }
    /// Searches this class, then each superclass in turn.
    pub fn find_method(&self, name: &str) -> Option<LoxFunction> {
        let mut class = self;
        loop {
            if let Some(method) = class.data.methods.get(name) {
                return Some(method.clone());
            }
            class = class.data.superclass.as_ref()?;
        }
    }
    pub fn arity(&self) -> usize {
        self.find_method("init").map_or(0, |init| init.arity())
    }
    /// Constructs an instance, running `init` on it when one is found.
    pub fn call(
        &self,
        interpreter: &mut Interpreter<'_>,
        arguments: Vec<Value>,
    ) -> Result<Value, ErrorType> {
        let instance = Instance::new(self.clone());
        interpreter.track(instance.downgrade());
        if let Some(init) = self.find_method("init") {
            init.bind(&instance).call(interpreter, arguments)?;
        }
        Ok(Value::Instance(instance))
    }
    pub fn equals(&self, other: &Class) -> bool {
        Rc::ptr_eq(&self.data, &other.data)
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<class {}>", self.data.name.lexeme)
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.data.name.lexeme)
            .field("superclass", &self.data.superclass.as_ref().map(|s| s.name()))
            .field("methods", &self.data.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}
