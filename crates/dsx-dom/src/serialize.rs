//! Serializer
//!
//! Writes a node tree back out as markup. Stored text and attribute values
//! are already in markup form and are written as they are.

use crate::node::{Node, NodeData};
use crate::tags;
use std::fmt::Write;

const INDENT: &str = "  ";

/// Output layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layout {
    /// One element per line, two-space indentation; elements holding only
    /// text stay on one line
    #[default]
    Pretty,
    /// No added whitespace
    Compact,
}

/// Serialize `root`, preceded by root-level instructions such as the doctype
pub fn serialize(instructions: &[String], root: &Node, layout: Layout) -> String {
    let mut out = String::with_capacity(1024);
    for instruction in instructions {
        let _ = write!(out, "<{instruction}>");
        if layout == Layout::Pretty {
            out.push('\n');
        }
    }
    write_node(&mut out, root, 0, layout);
    out
}

fn write_node(out: &mut String, node: &Node, depth: usize, layout: Layout) {
    let pretty = layout == Layout::Pretty;
    if pretty {
        for _ in 0..depth {
            out.push_str(INDENT);
        }
    }

    let (name, attrs) = match &node.data {
        NodeData::Text { contents } => {
            out.push_str(&contents.borrow());
            if pretty {
                out.push('\n');
            }
            return;
        }
        NodeData::Element { name, attrs } => (name, attrs),
    };

    out.push('<');
    out.push_str(name);
    for (key, value) in attrs.borrow().iter() {
        let _ = write!(out, " {key}=\"{value}\"");
    }
    out.push('>');

    if !tags::is_void(name) {
        let children = node.children();
        let children: Vec<_> = children.iter().filter(|child| !child.is_deleted()).collect();
        let inline = !pretty || children.iter().all(|child| child.is_text());

        if inline {
            for child in &children {
                match child.text_contents() {
                    Some(text) => out.push_str(&text),
                    None => write_node(out, child, 0, layout),
                }
            }
        } else {
            out.push('\n');
            for child in &children {
                write_node(out, child, depth + 1, layout);
            }
            for _ in 0..depth {
                out.push_str(INDENT);
            }
        }
        let _ = write!(out, "</{name}>");
    }

    if pretty {
        out.push('\n');
    }
}
