//! Output Generator
//!
//! Turns a processed module tree into the final document: module roots get
//! their ids, module scripts and styles are merged into the entry `head`,
//! and the tree is serialized.

use crate::module::Module;
use dsx_dom::{Attributes, BuildError, Handle, Layout, Node, serialize};

/// Prefix of the per-module script wrapper functions
const WRAPPER_PREFIX: &str = "__mod_";

/// Scripts and styles collected across the module tree
#[derive(Default)]
struct Assets {
    external_scripts: Vec<Handle>,
    script_sources: Vec<String>,
    inline_scripts: Vec<String>,
    external_styles: Vec<Handle>,
    style_sources: Vec<String>,
    inline_styles: Vec<String>,
}

impl Assets {
    fn is_empty(&self) -> bool {
        self.external_scripts.is_empty()
            && self.inline_scripts.is_empty()
            && self.external_styles.is_empty()
            && self.inline_styles.is_empty()
    }

    fn collect(&mut self, module: &Module) {
        for style in &module.styles {
            self.add_style(style);
        }
        self.add_scripts(module);
        for child in module.children().iter() {
            self.collect(child);
        }
    }

    fn add_style(&mut self, style: &Handle) {
        if let Some(href) = non_empty_attr(style, "href") {
            if !self.style_sources.contains(&href) {
                self.style_sources.push(href);
                clear_children(style);
                self.external_styles.push(style.clone());
            }
            return;
        }
        let text = style.inner_text();
        if !text.trim().is_empty() && !self.inline_styles.contains(&text) {
            self.inline_styles.push(text);
        }
    }

    fn add_scripts(&mut self, module: &Module) {
        let mut blocks = Vec::new();
        for script in &module.scripts {
            if let Some(src) = non_empty_attr(script, "src") {
                if !self.script_sources.contains(&src) {
                    self.script_sources.push(src);
                    clear_children(script);
                    self.external_scripts.push(script.clone());
                }
                continue;
            }
            let text = script.inner_text();
            if !text.trim().is_empty() {
                blocks.push(text);
            }
        }
        if blocks.is_empty() {
            return;
        }

        let (Some(name), Some(id)) = (&module.name, &module.id) else {
            // entry documents keep their scripts in place
            return;
        };
        let wrapper = format!("{WRAPPER_PREFIX}{}", identifier(name));
        let definition = format!("var {wrapper} = function(__mod_id) {{\n{}\n}}", blocks.join("\n"));
        if !self.inline_scripts.contains(&definition) {
            self.inline_scripts.push(definition);
        }
        self.inline_scripts.push(format!("{wrapper}(\"{id}\");"));
    }

    /// Append to `head`: external styles, the merged style block, external
    /// scripts, the merged script block
    fn inject(self, head: &Handle) {
        for style in self.external_styles {
            head.append(style);
        }
        if !self.inline_styles.is_empty() {
            head.append(merged_block("style", "text/css", &self.inline_styles));
        }
        for script in self.external_scripts {
            head.append(script);
        }
        if !self.inline_scripts.is_empty() {
            head.append(merged_block("script", "text/javascript", &self.inline_scripts));
        }
    }
}

fn non_empty_attr(node: &Handle, name: &str) -> Option<String> {
    let value = node.attr(name)?;
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn clear_children(node: &Handle) {
    while node.remove_child(0).is_some() {}
}

fn merged_block(tag: &str, kind: &str, blocks: &[String]) -> Handle {
    let mut attrs = Attributes::new();
    attrs.insert("type".into(), kind.into());
    let node = Node::element(tag, attrs);
    node.append(Node::text(format!("\n{}\n", blocks.join("\n"))));
    node
}

/// Module type as a JavaScript identifier fragment
fn identifier(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '$' { c } else { '_' })
        .collect()
}

fn assign_ids(module: &Module) {
    if let Some(id) = &module.id {
        let root = module.root();
        if root.is_element() && !root.has_attr("id") {
            root.set_attr("id", id.as_str());
        }
    }
    for child in module.children().iter() {
        assign_ids(child);
    }
}

/// `head` child of `root`, created as the first child when missing
fn head_of(root: &Handle) -> Handle {
    if let Some(head) = root.children().iter().find(|child| child.has_name("head")) {
        return head.clone();
    }
    let head = Node::element("head", Attributes::new());
    root.insert(0, head.clone());
    head
}

/// Final markup for the processed `entry` module
pub fn generate(entry: &Module, layout: Layout) -> Result<String, BuildError> {
    let root = entry.root();
    match root.name() {
        Some(name) if name == dsx_dom::builder::ENTRY_ROOT_TAG => {}
        other => return Err(BuildError::RootNotHtml(other.unwrap_or_default().to_string())),
    }

    assign_ids(entry);

    let mut assets = Assets::default();
    for child in entry.children().iter() {
        assets.collect(child);
    }
    if !assets.is_empty() {
        tracing::debug!(
            scripts = assets.external_scripts.len() + assets.inline_scripts.len(),
            styles = assets.external_styles.len() + assets.inline_styles.len(),
            "injecting module assets"
        );
        assets.inject(&head_of(&root));
    }

    Ok(serialize(&entry.instructions, &root, layout))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier() {
        assert_eq!(identifier("user-card"), "user_card");
        assert_eq!(identifier("nav.item"), "nav_item");
        assert_eq!(identifier("plain"), "plain");
    }

    #[test]
    fn test_existing_head_is_reused() {
        let root = Node::element("html", Attributes::new());
        let body = Node::element("body", Attributes::new());
        let head = Node::element("head", Attributes::new());
        root.append(body);
        root.append(head.clone());
        assert!(std::rc::Rc::ptr_eq(&head_of(&root), &head));
        assert_eq!(root.child_count(), 2);
    }

    #[test]
    fn test_head_created_first() {
        let root = Node::element("html", Attributes::new());
        root.append(Node::element("body", Attributes::new()));
        let head = head_of(&root);
        assert_eq!(root.child_count(), 2);
        assert!(std::rc::Rc::ptr_eq(&root.child(0).unwrap(), &head));
    }

    #[test]
    fn test_merged_block() {
        let block = merged_block("style", "text/css", &["a{}".to_string(), "b{}".to_string()]);
        assert_eq!(block.attr("type").as_deref(), Some("text/css"));
        assert_eq!(block.inner_text(), "\na{}\nb{}\n");
    }
}
