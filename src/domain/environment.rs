//! Chained lexical scopes.
//!
//! `define` always binds in the scope it is called on. `get` and `set` walk
//! the parent chain; `set` never creates a binding.

use crate::domain::error::RuntimeError;
use crate::domain::value::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

pub type EnvRef = Rc<RefCell<Environment>>;

#[derive(Debug, Default)]
pub struct Environment {
    values: BTreeMap<String, Value>,
    parent: Option<EnvRef>,
}

impl Environment {
    pub fn new_global() -> EnvRef {
        Rc::new(RefCell::new(Environment::default()))
    }

    pub fn with_parent(parent: &EnvRef) -> EnvRef {
        Rc::new(RefCell::new(Environment {
            values: BTreeMap::new(),
            parent: Some(Rc::clone(parent)),
        }))
    }

    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// Errors carry line 0; the interpreter fills in the call site.
    pub fn get(&self, name: &str) -> Result<Value, RuntimeError> {
        if let Some(value) = self.values.get(name) {
            return Ok(value.clone());
        }
        match &self.parent {
            Some(parent) => parent.borrow().get(name),
            None => Err(RuntimeError::UndefinedVariable {
                name: name.to_string(),
                line: 0,
            }),
        }
    }

    pub fn set(&mut self, name: &str, value: Value) -> Result<(), RuntimeError> {
        if let Some(slot) = self.values.get_mut(name) {
            *slot = value;
            return Ok(());
        }
        match &self.parent {
            Some(parent) => parent.borrow_mut().set(name, value),
            None => Err(RuntimeError::UndefinedVariable {
                name: name.to_string(),
                line: 0,
            }),
        }
    }

    #[cfg(test)]
    pub(crate) fn contains_local(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Bindings of this scope only, sorted by name.
    pub fn bindings(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Drop every binding. Used to break closure reference cycles on teardown.
    pub fn clear(&mut self) {
        self.values.clear();
    }
}
