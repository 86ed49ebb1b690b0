use std::{cell::RefCell, rc::Rc};

use indexmap::IndexMap;

use crate::{diagnostics::Halt, value::Object};

pub type EnvironmentRef = Rc<RefCell<Environment>>;

/// One lexical scope. Lookups walk outwards through `parent`.
#[derive(Default)]
pub struct Environment {
    parent: Option<EnvironmentRef>,
    bindings: IndexMap<String, Object>,
}

impl Environment {
    pub fn new() -> EnvironmentRef {
        Rc::new(RefCell::new(Self::default()))
    }

    pub fn with_parent(parent: EnvironmentRef) -> EnvironmentRef {
        Rc::new(RefCell::new(Self {
            parent: Some(parent),
            bindings: IndexMap::new(),
        }))
    }

    /// Binds `name` in this scope, replacing any earlier binding here.
    pub fn define(&mut self, name: String, value: Object) {
        self.bindings.insert(name, value);
    }

    pub fn assign(env: &EnvironmentRef, name: &str, value: Object) -> Result<(), Halt> {
        let parent = {
            let mut scope = env.borrow_mut();
            if let Some(slot) = scope.bindings.get_mut(name) {
                *slot = value;
                return Ok(());
            }
            scope.parent.clone()
        };
        match parent {
            Some(parent) => Environment::assign(&parent, name, value),
            None => Err(undefined(name)),
        }
    }

    pub fn get(env: &EnvironmentRef, name: &str) -> Result<Object, Halt> {
        let parent = {
            let scope = env.borrow();
            if let Some(value) = scope.bindings.get(name) {
                return Ok(value.clone());
            }
            scope.parent.clone()
        };
        match parent {
            Some(parent) => Environment::get(&parent, name),
            None => Err(undefined(name)),
        }
    }
}

fn undefined(name: &str) -> Halt {
    Halt::raise(format!("Undefined variable '{name}'"))
}

/// The program-wide mapping from names to objects.
///
/// Exactly one exists per batch run or REPL session. It is owned by the runner
/// and lent to every statement evaluation, so each statement sees every effect
/// of the statements evaluated before it. It is deliberately not `Clone`.
pub struct Namespace {
    root: EnvironmentRef,
}

impl Namespace {
    pub fn new() -> Self {
        Self {
            root: Environment::new(),
        }
    }

    pub fn define(&mut self, name: impl Into<String>, value: Object) {
        self.root.borrow_mut().define(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<Object> {
        self.root.borrow().bindings.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.root.borrow().bindings.contains_key(name)
    }

    /// Names in definition order.
    pub fn names(&self) -> Vec<String> {
        self.root.borrow().bindings.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.root.borrow().bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn scope(&self) -> EnvironmentRef {
        Rc::clone(&self.root)
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new()
    }
}
