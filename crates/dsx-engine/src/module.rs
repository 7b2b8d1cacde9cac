//! Modules
//!
//! A module is one parsed template source with its scope: the entry document
//! or an instance of a referenced module. Processed children are recorded in
//! order for output generation.

use dsx_dom::{BuildError, Handle, ParsedDocument};
use dsx_script::Scope;
use std::cell::{Ref, RefCell};

#[derive(Debug)]
pub struct Module {
    /// Module type, `None` for the entry document
    pub name: Option<String>,
    /// Instance id (`mod-...`), `None` for the entry document
    pub id: Option<String>,
    pub scope: Scope,
    root: RefCell<Handle>,
    pub scripts: Vec<Handle>,
    pub styles: Vec<Handle>,
    pub server_scripts: Vec<Handle>,
    /// Doctype and processing instructions written before the root
    pub instructions: Vec<String>,
    children: RefCell<Vec<Module>>,
}

impl Module {
    fn new(
        name: Option<String>,
        id: Option<String>,
        document: ParsedDocument,
        scope: Scope,
    ) -> Result<Self, BuildError> {
        let root = document.root.ok_or(BuildError::MissingRoot)?;
        Ok(Self {
            name,
            id,
            scope,
            root: RefCell::new(root),
            scripts: document.scripts,
            styles: document.styles,
            server_scripts: document.server_scripts,
            instructions: document.instructions,
            children: RefCell::default(),
        })
    }

    /// The entry document
    pub fn entry(document: ParsedDocument, scope: Scope) -> Result<Self, BuildError> {
        Self::new(None, None, document, scope)
    }

    /// An instance of module `name`
    pub fn instance(name: &str, id: String, document: ParsedDocument, scope: Scope) -> Result<Self, BuildError> {
        Self::new(Some(name.to_string()), Some(id), document, scope)
    }

    pub fn root(&self) -> Handle {
        self.root.borrow().clone()
    }

    /// Replace the root, for a root element that was itself a module reference
    pub fn set_root(&self, root: Handle) {
        *self.root.borrow_mut() = root;
    }

    /// Child module instances in expansion order
    pub fn children(&self) -> Ref<'_, Vec<Module>> {
        self.children.borrow()
    }

    pub fn add_child(&self, child: Module) {
        self.children.borrow_mut().push(child);
    }
}
