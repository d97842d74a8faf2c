//! Lexical environments.
//!
//! A scope maps names to bindings and links to its parent. `None` as a binding value marks
//! the temporal dead zone of a `let`, `const` or `class` binding that has not run yet.
//! Engine-private bindings (`this`, `%home`, ...) live alongside user names; their spelling
//! can never collide with an identifier.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::runtime::value::Value;
use crate::syntax::Name;

pub type ScopeRef = Rc<RefCell<Scope>>;

pub const THIS: &str = "this";
pub const HOME: &str = "%home";
pub const CONSTRUCTOR: &str = "%ctor";
pub const NEW_TARGET: &str = "%new_target";
pub const PENDING_THIS: &str = "%pending_this";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    Function,
    Block,
}

#[derive(Debug, Clone)]
pub struct Binding {
    pub value: Option<Value>,
    pub mutable: bool,
}

#[derive(Debug)]
pub struct Scope {
    pub kind: ScopeKind,
    bindings: HashMap<Name, Binding>,
    parent: Option<ScopeRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupError {
    NotDefined,
    Uninitialized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignError {
    Uninitialized,
    Constant,
}

impl Scope {
    pub fn new(kind: ScopeKind, parent: Option<ScopeRef>) -> Self {
        Self {
            kind,
            bindings: HashMap::new(),
            parent,
        }
    }

    pub fn declare(&mut self, name: Name, value: Option<Value>, mutable: bool) {
        self.bindings.insert(name, Binding { value, mutable });
    }

    pub fn has_own(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn parent(&self) -> Option<ScopeRef> {
        self.parent.clone()
    }

    /// Snapshot of the bindings named in `names`, used to give each loop iteration its own copy.
    pub fn copy_bindings(&self, names: &[Name]) -> Vec<(Name, Binding)> {
        names
            .iter()
            .filter_map(|name| self.bindings.get(name).map(|b| (name.clone(), b.clone())))
            .collect()
    }

    /// Drops every binding; used by the heap to break reference cycles at teardown.
    pub fn clear(&mut self) {
        self.bindings.clear();
        self.parent = None;
    }
}

pub fn new_scope(kind: ScopeKind, parent: Option<&ScopeRef>) -> ScopeRef {
    Rc::new(RefCell::new(Scope::new(kind, parent.cloned())))
}

pub fn lookup(scope: &ScopeRef, name: &str) -> Result<Value, LookupError> {
    let mut current = Some(scope.clone());
    while let Some(env) = current {
        let env = env.borrow();
        if let Some(binding) = env.bindings.get(name) {
            return binding.value.clone().ok_or(LookupError::Uninitialized);
        }
        current = env.parent.clone();
    }
    Err(LookupError::NotDefined)
}

/// Assigns to the nearest binding of `name`. Unknown names become globals.
pub fn assign(scope: &ScopeRef, name: &str, value: Value) -> Result<(), AssignError> {
    let mut current = scope.clone();
    loop {
        let parent = {
            let mut env = current.borrow_mut();
            if let Some(binding) = env.bindings.get_mut(name) {
                if binding.value.is_none() {
                    return Err(AssignError::Uninitialized);
                }
                if !binding.mutable {
                    return Err(AssignError::Constant);
                }
                binding.value = Some(value);
                return Ok(());
            }
            match env.parent.clone() {
                Some(parent) => parent,
                None => {
                    env.declare(Rc::from(name), Some(value), true);
                    return Ok(());
                }
            }
        };
        current = parent;
    }
}

/// Ends the temporal dead zone of the nearest binding of `name`.
pub fn initialize(scope: &ScopeRef, name: &str, value: Value) {
    let mut current = Some(scope.clone());
    while let Some(env) = current {
        let mut env = env.borrow_mut();
        if let Some(binding) = env.bindings.get_mut(name) {
            binding.value = Some(value);
            return;
        }
        current = env.parent.clone();
    }
}

/// Nearest enclosing function (or global) scope, where `var` bindings live.
pub fn function_scope(scope: &ScopeRef) -> ScopeRef {
    let mut current = scope.clone();
    loop {
        let parent = {
            let env = current.borrow();
            if env.kind != ScopeKind::Block {
                return current.clone();
            }
            env.parent.clone()
        };
        match parent {
            Some(parent) => current = parent,
            None => return current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(text: &str) -> Name {
        Rc::from(text)
    }

    #[test]
    fn inner_scopes_see_outer_bindings() {
        let global = new_scope(ScopeKind::Global, None);
        global.borrow_mut().declare(name("x"), Some(Value::from(1.0)), true);
        let block = new_scope(ScopeKind::Block, Some(&global));
        assert!(matches!(lookup(&block, "x"), Ok(Value::Number(n)) if n == 1.0));
        assert_eq!(lookup(&block, "y").err(), Some(LookupError::NotDefined));
    }

    #[test]
    fn dead_zone_and_constants_are_enforced() {
        let global = new_scope(ScopeKind::Global, None);
        global.borrow_mut().declare(name("later"), None, true);
        global.borrow_mut().declare(name("fixed"), Some(Value::Null), false);
        assert_eq!(lookup(&global, "later").err(), Some(LookupError::Uninitialized));
        assert_eq!(assign(&global, "later", Value::Null), Err(AssignError::Uninitialized));
        assert_eq!(assign(&global, "fixed", Value::Null), Err(AssignError::Constant));
    }

    #[test]
    fn undeclared_assignment_creates_a_global() {
        let global = new_scope(ScopeKind::Global, None);
        let func = new_scope(ScopeKind::Function, Some(&global));
        assert!(assign(&func, "leaked", Value::Bool(true)).is_ok());
        assert!(global.borrow().has_own("leaked"));
        assert!(Rc::ptr_eq(&function_scope(&new_scope(ScopeKind::Block, Some(&func))), &func));
    }
}
