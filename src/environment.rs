use crate::interpreter::RuntimeError;
use crate::token::Token;
use crate::tracker::Release;
use crate::value::Value;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::{Rc, Weak};

/// One lexical scope. Handles are shared: a block, every closure created in
/// it and every nested scope all point at the same bindings.
#[derive(Clone)]
pub struct Environment {
    data: Rc<RefCell<EnvironmentImpl>>,
}

struct EnvironmentImpl {
    values: BTreeMap<Rc<str>, Value>,
    read_only: BTreeSet<Rc<str>>,
    enclosing: Option<Environment>,
}

fn undefined(name: &Token) -> RuntimeError {
    RuntimeError::new(
        &format!("'{}' is an undefined symbol.", name.lexeme),
        Some(name),
    )
}

impl Environment {
    pub fn new() -> Environment {
        Environment {
            data: Rc::new(RefCell::new(EnvironmentImpl {
                values: BTreeMap::new(),
                read_only: BTreeSet::new(),
                enclosing: None,
            })),
        }
    }
    pub fn new_child(&self) -> Environment {
        Environment {
            data: Rc::new(RefCell::new(EnvironmentImpl {
                values: BTreeMap::new(),
                read_only: BTreeSet::new(),
                enclosing: Some(self.clone()),
            })),
        }
    }
    /// A child scope holding a single binding, as used for `this` on bound
    /// methods and `super` on subclass method closures.
    pub fn new_child_with(&self, name: &str, value: Value) -> Environment {
        let child = self.new_child();
        child.bind(name, value);
        child
    }
    /// Inserts or overwrites without the redefinition check. Only for bindings
    /// the interpreter itself installs.
    pub(crate) fn bind(&self, name: &str, value: Value) {
        self.data.borrow_mut().values.insert(Rc::from(name), value);
    }
    pub fn enclosing(&self) -> Option<Environment> {
        self.data.borrow().enclosing.clone()
    }
    /// Binds a new name in this scope. Shadowing only ever happens by creating
    /// a child scope, so a second definition here is an error.
    pub fn define(&self, name: &Token, value: Value) -> Result<(), RuntimeError> {
        let mut data = self.data.borrow_mut();
        if data.values.contains_key(&name.lexeme) {
            return Err(RuntimeError::new(
                &format!(
                    "Symbol '{}' is already defined in this scope.",
                    name.lexeme
                ),
                Some(name),
            ));
        }
        data.values.insert(name.lexeme.clone(), value);
        Ok(())
    }
    /// Like `define`, for `let` and module names. Assignments through
    /// `assign_local` still succeed; callers that bypass the resolver check
    /// `is_read_only` first.
    pub fn define_read_only(&self, name: &Token, value: Value) -> Result<(), RuntimeError> {
        self.define(name, value)?;
        self.data.borrow_mut().read_only.insert(name.lexeme.clone());
        Ok(())
    }
    pub fn is_read_only(&self, name: &str) -> bool {
        self.data.borrow().read_only.contains(name)
    }
    pub fn assign(&self, name: &Token, value: Value) -> Result<(), RuntimeError> {
        let mut env = self.clone();
        loop {
            if env.assign_local(name, value.clone()) {
                return Ok(());
            }
            match env.enclosing() {
                Some(next) => env = next,
                None => return Err(undefined(name)),
            }
        }
    }
    pub fn access(&self, name: &Token) -> Result<Value, RuntimeError> {
        let mut env = self.clone();
        loop {
            if let Some(value) = env.get_local(&name.lexeme) {
                return Ok(value);
            }
            match env.enclosing() {
                Some(next) => env = next,
                None => return Err(undefined(name)),
            }
        }
    }
    /// Follows `distance` enclosing links; zero is this scope.
    pub fn ancestor(&self, distance: usize) -> Option<Environment> {
        let mut env = self.clone();
        for _ in 0..distance {
            env = env.enclosing()?;
        }
        Some(env)
    }
    fn ancestor_or_err(&self, depth: usize, name: &Token) -> Result<Environment, RuntimeError> {
        self.ancestor(depth).ok_or_else(|| {
            RuntimeError::new(
                &format!(
                    "No enclosing scope at depth {} for '{}'.",
                    depth, name.lexeme
                ),
                Some(name),
            )
        })
    }
    /// Reads a resolved name. Only the scope `depth` links out is consulted: a
    /// miss there means the resolver and the scope chain disagree.
    pub fn access_at(&self, depth: usize, name: &Token) -> Result<Value, RuntimeError> {
        self.ancestor_or_err(depth, name)?
            .get_local(&name.lexeme)
            .ok_or_else(|| undefined(name))
    }
    pub fn assign_at(&self, depth: usize, name: &Token, value: Value) -> Result<(), RuntimeError> {
        if self.ancestor_or_err(depth, name)?.assign_local(name, value) {
            Ok(())
        } else {
            Err(undefined(name))
        }
    }
    pub fn get_local(&self, name: &str) -> Option<Value> {
        self.data.borrow().values.get(name).cloned()
    }
    /// Overwrites an existing binding in this scope only.
    pub fn assign_local(&self, name: &Token, value: Value) -> bool {
        match self.data.borrow_mut().values.get_mut(&name.lexeme) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
    pub fn equals(&self, other: &Environment) -> bool {
        Rc::ptr_eq(&self.data, &other.data)
    }
    pub(crate) fn downgrade(&self) -> Weak<dyn Release> {
        let weak: Weak<RefCell<EnvironmentImpl>> = Rc::downgrade(&self.data);
        weak
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::new()
    }
}

impl Release for RefCell<EnvironmentImpl> {
    fn release(&self) {
        if let Ok(mut data) = self.try_borrow_mut() {
            data.read_only.clear();
            let values = std::mem::take(&mut data.values);
            let enclosing = data.enclosing.take();
            drop(data);
            drop(values);
            drop(enclosing);
        }
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.data.try_borrow() {
            Ok(data) => f
                .debug_struct("Environment")
                .field("names", &data.values.keys().collect::<Vec<_>>())
                .field("enclosed", &data.enclosing.is_some())
                .finish(),
            Err(_) => write!(f, "Environment(..)"),
        }
    }
}
