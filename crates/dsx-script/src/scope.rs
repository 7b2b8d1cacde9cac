//! Scopes
//!
//! Name resolution for expressions. A scope layers three binding sets: the
//! compile-wide globals, the bindings local to a module instance, and the
//! local bindings of the enclosing module (exposed as `$parent`).

use crate::value::{Map, Value};
use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;

/// Name of the binding that exposes the enclosing module's locals
pub const PARENT_BINDING: &str = "$parent";

/// Binding set
pub type Bindings = Map;

/// Expression scope
///
/// Cloning a scope shares its local bindings; [`Scope::fork`] gives a node
/// its own shallow copy.
#[derive(Clone, Default)]
pub struct Scope {
    global: Rc<Bindings>,
    local: Rc<RefCell<Bindings>>,
    parent: Option<Rc<RefCell<Bindings>>>,
}

impl Scope {
    /// Top-level scope of a compilation
    pub fn new(global: Bindings, local: Bindings) -> Self {
        Self {
            global: Rc::new(global),
            local: Rc::new(RefCell::new(local)),
            parent: None,
        }
    }

    /// Scope of a nested module instance: same globals, `params` as its
    /// locals, and this scope's locals as its parent.
    pub fn child(&self, params: Bindings) -> Self {
        Self {
            global: Rc::clone(&self.global),
            local: Rc::new(RefCell::new(params)),
            parent: Some(Rc::clone(&self.local)),
        }
    }

    /// Same globals and parent, private shallow copy of the locals
    pub fn fork(&self) -> Self {
        Self {
            global: Rc::clone(&self.global),
            local: Rc::new(RefCell::new(self.local.borrow().clone())),
            parent: self.parent.clone(),
        }
    }

    /// Whether both scopes write to the same local bindings
    pub fn shares_locals_with(&self, other: &Scope) -> bool {
        Rc::ptr_eq(&self.local, &other.local)
    }

    pub fn global(&self) -> &Bindings {
        &self.global
    }

    pub fn local(&self) -> Ref<'_, Bindings> {
        self.local.borrow()
    }

    pub fn set_local(&self, name: impl Into<String>, value: Value) {
        self.local.borrow_mut().insert(name.into(), value);
    }

    /// Merge bindings into the locals, later entries winning
    pub fn extend_local(&self, bindings: impl IntoIterator<Item = (String, Value)>) {
        self.local.borrow_mut().extend(bindings);
    }

    /// Snapshot of the parent locals, or `undefined` at the top level
    pub fn parent_object(&self) -> Value {
        match &self.parent {
            Some(parent) => Value::from(parent.borrow().clone()),
            None => Value::Undefined,
        }
    }

    /// Resolve a name: locals, then globals, then `$parent`
    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.local.borrow().get(name) {
            return Some(value.clone());
        }
        if let Some(value) = self.global.get(name) {
            return Some(value.clone());
        }
        if name == PARENT_BINDING && self.parent.is_some() {
            return Some(self.parent_object());
        }
        None
    }

    /// All visible bindings as one object, locals shadowing globals
    pub fn to_object(&self) -> Value {
        let mut merged = Map::with_capacity(self.global.len() + 1);
        if self.parent.is_some() {
            merged.insert(PARENT_BINDING.to_string(), self.parent_object());
        }
        merged.extend(self.global.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged.extend(self.local.borrow().iter().map(|(k, v)| (k.clone(), v.clone())));
        Value::from(merged)
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("global", &self.global.keys().collect::<Vec<_>>())
            .field("local", &self.local.borrow().keys().cloned().collect::<Vec<_>>())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings(pairs: &[(&str, i32)]) -> Bindings {
        pairs.iter().map(|(k, v)| (k.to_string(), Value::from(*v))).collect()
    }

    #[test]
    fn test_lookup_order() {
        let scope = Scope::new(bindings(&[("a", 1), ("b", 2)]), bindings(&[("a", 10)]));
        assert_eq!(scope.lookup("a"), Some(Value::from(10)));
        assert_eq!(scope.lookup("b"), Some(Value::from(2)));
        assert_eq!(scope.lookup("c"), None);
        assert_eq!(scope.lookup(PARENT_BINDING), None);
    }

    #[test]
    fn test_fork_isolates_locals() {
        let scope = Scope::new(Bindings::new(), bindings(&[("x", 1)]));
        let shared = scope.clone();
        let forked = scope.fork();

        forked.set_local("x", Value::from(2));
        shared.set_local("y", Value::from(3));

        assert_eq!(scope.lookup("x"), Some(Value::from(1)));
        assert_eq!(scope.lookup("y"), Some(Value::from(3)));
        assert_eq!(forked.lookup("x"), Some(Value::from(2)));
        assert_eq!(forked.lookup("y"), None);
        assert!(shared.shares_locals_with(&scope));
        assert!(!forked.shares_locals_with(&scope));
    }

    #[test]
    fn test_child_scope_exposes_parent() {
        let scope = Scope::new(bindings(&[("g", 1)]), bindings(&[("title", 5)]));
        let child = scope.child(bindings(&[("size", 3)]));

        assert_eq!(child.lookup("g"), Some(Value::from(1)));
        assert_eq!(child.lookup("title"), None);
        let parent = child.lookup(PARENT_BINDING).unwrap();
        assert_eq!(parent.as_object().unwrap().get("title"), Some(&Value::from(5)));
    }

    #[test]
    fn test_to_object_merges() {
        let scope = Scope::new(bindings(&[("a", 1), ("b", 2)]), bindings(&[("b", 3)]));
        let object = scope.to_object();
        let map = object.as_object().unwrap();
        assert_eq!(map.get("a"), Some(&Value::from(1)));
        assert_eq!(map.get("b"), Some(&Value::from(3)));
    }
}
