use crate::callable::Callable;
use crate::class::Class;
use crate::interpreter::RuntimeError;
use crate::token::Token;
use crate::tracker::Release;
use crate::value::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

#[derive(Clone)]
pub struct Instance {
    data: Rc<RefCell<InstanceImpl>>,
}

struct InstanceImpl {
    class: Class,
    fields: BTreeMap<Rc<str>, Value>,
}

impl Instance {
    pub fn new(class: Class) -> Instance {
        Instance {
            data: Rc::new(RefCell::new(InstanceImpl {
                class,
                fields: BTreeMap::new(),
            })),
        }
    }
    /// Fields shadow methods. A method found on the class (or an ancestor) is
    /// returned bound to this instance.
    pub fn get(&self, name: &Token) -> Result<Value, RuntimeError> {
        if let Some(value) = self.data.borrow().fields.get(&name.lexeme) {
            return Ok(value.clone());
        }
        let class = self.class();
        match class.find_method(&name.lexeme) {
            Some(method) => Ok(Value::Callable(Callable::Function(method.bind(self)))),
            None => Err(RuntimeError::new(
                &format!("Undefined property '{}'.", name.lexeme),
                Some(name),
            )),
        }
    }
    pub fn set(&self, name: &Token, value: Value) {
        self.data
            .borrow_mut()
            .fields
            .insert(name.lexeme.clone(), value);
    }
    pub fn class(&self) -> Class {
        self.data.borrow().class.clone()
    }
    pub fn equals(&self, other: &Instance) -> bool {
        Rc::ptr_eq(&self.data, &other.data)
    }
    pub(crate) fn downgrade(&self) -> Weak<dyn Release> {
        let weak: Weak<RefCell<InstanceImpl>> = Rc::downgrade(&self.data);
        weak
    }
}

impl Release for RefCell<InstanceImpl> {
    fn release(&self) {
        if let Ok(mut data) = self.try_borrow_mut() {
            let fields = std::mem::take(&mut data.fields);
            drop(data);
            drop(fields);
        }
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} instance>", self.class().name())
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.data.try_borrow() {
            Ok(data) => f
                .debug_struct("Instance")
                .field("class", &data.class.name())
                .field("fields", &data.fields.keys().collect::<Vec<_>>())
                .finish(),
            Err(_) => write!(f, "Instance(..)"),
        }
    }
}
