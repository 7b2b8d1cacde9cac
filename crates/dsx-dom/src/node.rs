//! Template Nodes
//!
//! Reference-counted element/text tree. Parents own their children; the
//! parent link is weak. Besides markup, every node carries the compile-time
//! state the processor attaches to it: its scope and a deletion mark.

use dsx_script::Scope;
use indexmap::IndexMap;
use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

/// Shared handle to a node
pub type Handle = Rc<Node>;

/// Attribute name to value, in source order
pub type Attributes = IndexMap<String, String>;

/// Node-specific data
pub enum NodeData {
    Element {
        name: Box<str>,
        attrs: RefCell<Attributes>,
    },
    Text {
        contents: RefCell<String>,
    },
}

/// Template node
pub struct Node {
    pub data: NodeData,
    parent: RefCell<Weak<Node>>,
    children: RefCell<Vec<Handle>>,
    scope: RefCell<Option<Scope>>,
    scope_owned: Cell<bool>,
    deleted: Cell<bool>,
}

impl Node {
    fn new(data: NodeData) -> Handle {
        Rc::new(Self {
            data,
            parent: RefCell::new(Weak::new()),
            children: RefCell::default(),
            scope: RefCell::default(),
            scope_owned: Cell::new(false),
            deleted: Cell::new(false),
        })
    }

    /// Create an element. Tag and attribute names are trimmed and lower-cased.
    pub fn element(name: &str, attrs: Attributes) -> Handle {
        let attrs = attrs
            .into_iter()
            .map(|(key, value)| (key.trim().to_ascii_lowercase(), value))
            .collect();
        Self::new(NodeData::Element {
            name: name.trim().to_ascii_lowercase().into(),
            attrs: RefCell::new(attrs),
        })
    }

    /// Create a text node
    pub fn text(contents: impl Into<String>) -> Handle {
        Self::new(NodeData::Text {
            contents: RefCell::new(contents.into()),
        })
    }

    #[inline]
    pub fn is_element(&self) -> bool {
        matches!(self.data, NodeData::Element { .. })
    }

    #[inline]
    pub fn is_text(&self) -> bool {
        matches!(self.data, NodeData::Text { .. })
    }

    /// Tag name of an element
    pub fn name(&self) -> Option<&str> {
        match &self.data {
            NodeData::Element { name, .. } => Some(name),
            NodeData::Text { .. } => None,
        }
    }

    pub fn has_name(&self, tag: &str) -> bool {
        self.name() == Some(tag)
    }

    // ------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------

    /// Attributes of an element (empty for text)
    pub fn attrs(&self) -> Option<Ref<'_, Attributes>> {
        match &self.data {
            NodeData::Element { attrs, .. } => Some(attrs.borrow()),
            NodeData::Text { .. } => None,
        }
    }

    pub fn attr(&self, name: &str) -> Option<String> {
        self.attrs()?.get(name).cloned()
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs().is_some_and(|attrs| attrs.contains_key(name))
    }

    /// Attribute names in document order
    pub fn attr_names(&self) -> Vec<String> {
        self.attrs()
            .map(|attrs| attrs.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Set an attribute, keeping the position of an existing one
    pub fn set_attr(&self, name: &str, value: impl Into<String>) {
        if let NodeData::Element { attrs, .. } = &self.data {
            attrs.borrow_mut().insert(name.to_string(), value.into());
        }
    }

    /// Remove an attribute, keeping the order of the rest
    pub fn remove_attr(&self, name: &str) -> Option<String> {
        match &self.data {
            NodeData::Element { attrs, .. } => attrs.borrow_mut().shift_remove(name),
            NodeData::Text { .. } => None,
        }
    }

    // ------------------------------------------------------------------
    // Text
    // ------------------------------------------------------------------

    /// Contents of a text node
    pub fn text_contents(&self) -> Option<String> {
        match &self.data {
            NodeData::Text { contents } => Some(contents.borrow().clone()),
            NodeData::Element { .. } => None,
        }
    }

    pub fn set_text(&self, text: impl Into<String>) {
        if let NodeData::Text { contents } = &self.data {
            *contents.borrow_mut() = text.into();
        }
    }

    /// Concatenated contents of the text children
    pub fn inner_text(&self) -> String {
        self.children
            .borrow()
            .iter()
            .filter_map(|child| child.text_contents())
            .collect()
    }

    // ------------------------------------------------------------------
    // Tree
    // ------------------------------------------------------------------

    pub fn parent(&self) -> Option<Handle> {
        self.parent.borrow().upgrade()
    }

    pub fn children(&self) -> Ref<'_, Vec<Handle>> {
        self.children.borrow()
    }

    pub fn child(&self, index: usize) -> Option<Handle> {
        self.children.borrow().get(index).cloned()
    }

    pub fn child_count(&self) -> usize {
        self.children.borrow().len()
    }

    pub fn append(self: &Rc<Self>, child: Handle) {
        *child.parent.borrow_mut() = Rc::downgrade(self);
        self.children.borrow_mut().push(child);
    }

    /// Insert at `index`, clamped to the child count
    pub fn insert(self: &Rc<Self>, index: usize, child: Handle) {
        *child.parent.borrow_mut() = Rc::downgrade(self);
        let mut children = self.children.borrow_mut();
        let index = index.min(children.len());
        children.insert(index, child);
    }

    /// Detach the child at `index`
    pub fn remove_child(&self, index: usize) -> Option<Handle> {
        let mut children = self.children.borrow_mut();
        if index >= children.len() {
            return None;
        }
        let child = children.remove(index);
        *child.parent.borrow_mut() = Weak::new();
        Some(child)
    }

    /// Position among the parent's children
    pub fn index_in_parent(self: &Rc<Self>) -> Option<usize> {
        let parent = self.parent()?;
        let children = parent.children.borrow();
        children.iter().position(|child| Rc::ptr_eq(child, self))
    }

    /// Put `replacement` where this node is. Fails for detached nodes.
    pub fn replace_with(self: &Rc<Self>, replacement: Handle) -> bool {
        let (Some(parent), Some(index)) = (self.parent(), self.index_in_parent()) else {
            return false;
        };
        *replacement.parent.borrow_mut() = Rc::downgrade(&parent);
        let previous = std::mem::replace(&mut parent.children.borrow_mut()[index], replacement);
        *previous.parent.borrow_mut() = Weak::new();
        true
    }

    /// Deep copy of this subtree, detached
    ///
    /// Markup and deletion marks are copied. An owned scope gets its own
    /// copy of the local bindings; a shared scope stays shared.
    pub fn deep_clone(&self) -> Handle {
        let data = match &self.data {
            NodeData::Element { name, attrs } => NodeData::Element {
                name: name.clone(),
                attrs: RefCell::new(attrs.borrow().clone()),
            },
            NodeData::Text { contents } => NodeData::Text {
                contents: RefCell::new(contents.borrow().clone()),
            },
        };
        let copy = Node::new(data);

        let scope = self.scope.borrow().as_ref().map(|scope| {
            if self.scope_owned.get() { scope.fork() } else { scope.clone() }
        });
        *copy.scope.borrow_mut() = scope;
        copy.scope_owned.set(self.scope_owned.get());
        copy.deleted.set(self.deleted.get());

        for child in self.children.borrow().iter() {
            copy.append(child.deep_clone());
        }
        copy
    }

    // ------------------------------------------------------------------
    // Compile state
    // ------------------------------------------------------------------

    pub fn scope(&self) -> Option<Scope> {
        self.scope.borrow().clone()
    }

    /// Attach a scope. `owned` records that the node holds a private copy.
    pub fn set_scope(&self, scope: Scope, owned: bool) {
        *self.scope.borrow_mut() = Some(scope);
        self.scope_owned.set(owned);
    }

    pub fn scope_owned(&self) -> bool {
        self.scope_owned.get()
    }

    /// Mark for removal by the walk over the parent's children
    pub fn mark_deleted(&self) {
        self.deleted.set(true);
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.get()
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.data {
            NodeData::Element { name, attrs } => f
                .debug_struct("Element")
                .field("name", name)
                .field("attrs", &*attrs.borrow())
                .field("children", &*self.children.borrow())
                .finish(),
            NodeData::Text { contents } => f.debug_tuple("Text").field(&*contents.borrow()).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsx_script::{Bindings, Value};

    fn attrs(pairs: &[(&str, &str)]) -> Attributes {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_names_are_normalized() {
        let node = Node::element(" DIV ", attrs(&[("Class", "a"), (" ID", "main")]));
        assert_eq!(node.name(), Some("div"));
        assert_eq!(node.attr("class").as_deref(), Some("a"));
        assert_eq!(node.attr("id").as_deref(), Some("main"));
    }

    #[test]
    fn test_remove_attr_keeps_order() {
        let node = Node::element("p", attrs(&[("a", "1"), ("b", "2"), ("c", "3")]));
        assert_eq!(node.remove_attr("b").as_deref(), Some("2"));
        assert_eq!(node.attr_names(), vec!["a", "c"]);
        node.set_attr("a", "x");
        assert_eq!(node.attr_names(), vec!["a", "c"]);
    }

    #[test]
    fn test_append_insert_remove() {
        let parent = Node::element("ul", Attributes::new());
        let first = Node::element("li", Attributes::new());
        let second = Node::text("two");
        parent.append(first.clone());
        parent.append(second.clone());
        parent.insert(1, Node::text("middle"));

        assert_eq!(parent.child_count(), 3);
        assert_eq!(second.index_in_parent(), Some(2));
        assert!(Rc::ptr_eq(&first.parent().unwrap(), &parent));

        let removed = parent.remove_child(0).unwrap();
        assert!(removed.parent().is_none());
        assert_eq!(second.index_in_parent(), Some(1));
        assert!(parent.remove_child(5).is_none());
    }

    #[test]
    fn test_replace_with() {
        let parent = Node::element("div", Attributes::new());
        let old = Node::element("ds-card", Attributes::new());
        parent.append(Node::text("before"));
        parent.append(old.clone());

        let new = Node::element("section", Attributes::new());
        assert!(old.replace_with(new.clone()));
        assert_eq!(new.index_in_parent(), Some(1));
        assert!(old.parent().is_none());
        assert!(!old.replace_with(Node::text("x")));
    }

    #[test]
    fn test_deep_clone_fixes_parents() {
        let root = Node::element("div", attrs(&[("id", "a")]));
        let child = Node::element("span", Attributes::new());
        child.append(Node::text("hi"));
        root.append(child);

        let copy = root.deep_clone();
        assert!(copy.parent().is_none());
        let copied_child = copy.child(0).unwrap();
        assert!(Rc::ptr_eq(&copied_child.parent().unwrap(), &copy));
        assert!(!Rc::ptr_eq(&copied_child, &root.child(0).unwrap()));

        copy.set_attr("id", "b");
        assert_eq!(root.attr("id").as_deref(), Some("a"));
        assert_eq!(copied_child.inner_text(), "hi");
    }

    #[test]
    fn test_deep_clone_scope_copy() {
        let scope = Scope::new(Bindings::new(), Bindings::new());

        let owned = Node::element("li", Attributes::new());
        owned.set_scope(scope.fork(), true);
        let copy = owned.deep_clone();
        copy.scope().unwrap().set_local("item", Value::from(1));
        assert!(owned.scope().unwrap().lookup("item").is_none());
        assert!(copy.scope_owned());

        let shared = Node::element("li", Attributes::new());
        shared.set_scope(scope.clone(), false);
        let copy = shared.deep_clone();
        assert!(copy.scope().unwrap().shares_locals_with(&scope));
    }

    #[test]
    fn test_deletion_mark() {
        let node = Node::text("x");
        assert!(!node.is_deleted());
        node.mark_deleted();
        assert!(node.is_deleted());
        assert_eq!(node.text_contents().as_deref(), Some("x"));
    }
}
