//! Tree Builder
//!
//! Builds node trees from markup events and classifies the top-level
//! elements of a source.
//!
//! Text is stored in markup form: decoded character data is re-encoded on
//! entry, except inside raw-text elements (`script`, `style`), whose text is
//! kept verbatim and trimmed. Whitespace-only text is dropped and other text
//! has its whitespace runs collapsed.

use crate::entities;
use crate::node::{Attributes, Handle, Node};
use crate::tags;
use crate::tokenizer::{self, MarkupSink};
use std::rc::Rc;

/// Attribute that turns a top-level `<script>` into a server script
pub const SERVER_ATTRIBUTE: &str = "server";

/// Required root tag of an entry document
pub const ENTRY_ROOT_TAG: &str = "html";

/// Structural error in a template source
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("template has no root element")]
    MissingRoot,

    #[error("root tag of entry template is not html (found `{0}`)")]
    RootNotHtml(String),

    #[error("only one root tag is allowed in entry template")]
    MultipleRoots,
}

/// Parsed template source
#[derive(Debug, Default)]
pub struct ParsedDocument {
    /// Document root element
    pub root: Option<Handle>,
    /// Top-level client scripts
    pub scripts: Vec<Handle>,
    /// Top-level `<style>` and stylesheet `<link>` elements
    pub styles: Vec<Handle>,
    /// Top-level `<script server>` elements
    pub server_scripts: Vec<Handle>,
    /// Root-level processing instructions and doctypes
    pub instructions: Vec<String>,
}

/// Parse an entry document: a single `html` root, optionally preceded by
/// processing instructions.
pub fn parse_entry(source: &str) -> Result<ParsedDocument, BuildError> {
    let mut builder = TreeBuilder::new(Mode::Entry);
    tokenizer::tokenize(source, &mut builder);
    let document = builder.finish()?;
    if document.root.is_none() {
        return Err(BuildError::MissingRoot);
    }
    tracing::debug!(instructions = document.instructions.len(), "parsed entry template");
    Ok(document)
}

/// Parse a module source: scripts, styles and one root element at the top
/// level.
pub fn parse_module(source: &str) -> Result<ParsedDocument, BuildError> {
    let mut builder = TreeBuilder::new(Mode::Module);
    tokenizer::tokenize(source, &mut builder);
    let document = builder.finish()?;
    if document.root.is_none() {
        return Err(BuildError::MissingRoot);
    }
    tracing::debug!(
        scripts = document.scripts.len(),
        styles = document.styles.len(),
        server_scripts = document.server_scripts.len(),
        "parsed module template"
    );
    Ok(document)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Entry,
    Module,
}

struct TreeBuilder {
    mode: Mode,
    document: ParsedDocument,
    error: Option<BuildError>,
    open: Vec<Handle>,
    pending_text: String,
}

impl TreeBuilder {
    fn new(mode: Mode) -> Self {
        Self {
            mode,
            document: ParsedDocument::default(),
            error: None,
            open: Vec::new(),
            pending_text: String::new(),
        }
    }

    fn finish(mut self) -> Result<ParsedDocument, BuildError> {
        self.flush_text();
        self.open.clear();
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.document),
        }
    }

    fn fail(&mut self, error: BuildError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn classify(&mut self, node: &Handle) {
        let name = node.name().unwrap_or_default();
        match self.mode {
            Mode::Entry => {
                if self.document.root.is_some() {
                    self.fail(BuildError::MultipleRoots);
                } else if name != ENTRY_ROOT_TAG {
                    self.fail(BuildError::RootNotHtml(name.to_string()));
                } else {
                    self.document.root = Some(Rc::clone(node));
                }
            }
            Mode::Module => {
                if name == "script" {
                    if node.has_attr(SERVER_ATTRIBUTE) {
                        self.document.server_scripts.push(Rc::clone(node));
                    } else {
                        self.document.scripts.push(Rc::clone(node));
                    }
                } else if is_style(node) {
                    self.document.styles.push(Rc::clone(node));
                } else if self.document.root.is_some() {
                    tracing::warn!(tag = name, "ignoring extra root element in module");
                } else {
                    self.document.root = Some(Rc::clone(node));
                }
            }
        }
    }

    fn flush_text(&mut self) {
        if self.pending_text.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.pending_text);
        let Some(parent) = self.open.last() else {
            return;
        };

        let raw = parent.name().is_some_and(tags::is_raw_text);
        let contents = if raw {
            text.trim().to_string()
        } else if text.trim().is_empty() {
            String::new()
        } else {
            entities::encode(&collapse_whitespace(&text)).into_owned()
        };
        if !contents.is_empty() {
            parent.append(Node::text(contents));
        }
    }
}

impl MarkupSink for TreeBuilder {
    fn open_tag(&mut self, name: &str, attrs: Attributes) {
        self.flush_text();
        let attrs = attrs
            .into_iter()
            .map(|(key, value)| (key, entities::encode(&value).into_owned()))
            .collect();
        let node = Node::element(name, attrs);

        match self.open.last() {
            Some(parent) => parent.append(Rc::clone(&node)),
            None => self.classify(&node),
        }
        self.open.push(node);
    }

    fn close_tag(&mut self, name: &str) {
        self.flush_text();
        let name = name.trim().to_ascii_lowercase();
        // stray end tags are ignored; a matching one closes everything above it
        if let Some(position) = self.open.iter().rposition(|node| node.has_name(&name)) {
            self.open.truncate(position);
        }
    }

    fn text(&mut self, text: &str) {
        if !self.open.is_empty() {
            self.pending_text.push_str(text);
        }
    }

    fn processing_instruction(&mut self, _name: &str, data: &str) {
        if self.open.is_empty() && self.mode == Mode::Entry {
            self.document.instructions.push(data.to_string());
        }
    }
}

/// `<style>`, or a `<link>` to a stylesheet
fn is_style(node: &Node) -> bool {
    let attr_is = |name: &str, expected: &str| {
        node.attr(name)
            .is_some_and(|value| value.trim().eq_ignore_ascii_case(expected))
    };
    node.has_name("style") || (node.has_name("link") && (attr_is("rel", "stylesheet") || attr_is("type", "text/css")))
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}
