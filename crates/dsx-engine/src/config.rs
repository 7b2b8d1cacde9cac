//! Compiler Configuration

use dsx_dom::Layout;

/// What a `for` directive does when its source is not a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NonCollectionPolicy {
    /// Render nothing for the node
    #[default]
    Remove,
    /// Leave the node in place, rendered once
    Keep,
}

/// Compiler configuration options
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Output layout
    pub layout: Layout,

    /// Most directives bound on a single node
    pub max_directive_binds: usize,

    /// `for` over a value that is not an array or object
    pub non_collection_for: NonCollectionPolicy,

    /// Extension of module files for the directory resolver
    pub module_extension: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            layout: Layout::Pretty,
            max_directive_binds: 16,
            non_collection_for: NonCollectionPolicy::Remove,
            module_extension: "dsxm".into(),
        }
    }
}

impl CompileOptions {
    pub fn compact(mut self) -> Self {
        self.layout = Layout::Compact;
        self
    }

    pub fn max_directive_binds(mut self, limit: usize) -> Self {
        self.max_directive_binds = limit;
        self
    }

    pub fn non_collection_for(mut self, policy: NonCollectionPolicy) -> Self {
        self.non_collection_for = policy;
        self
    }
}
