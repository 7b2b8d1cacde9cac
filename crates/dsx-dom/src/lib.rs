//! DSX DOM
//!
//! Document tree for DSX templates:
//! - `node`: element/text nodes with compile-time scope and deletion state
//! - `tokenizer`: html5ever tokenizer driven through a markup event sink
//! - `builder`: entry and module trees, with top-level classification
//! - `serialize`: pretty and compact markup output

pub mod builder;
pub mod entities;
mod node;
pub mod serialize;
pub mod tags;
pub mod tokenizer;

pub use builder::{BuildError, ParsedDocument, parse_entry, parse_module};
pub use node::{Attributes, Handle, Node, NodeData};
pub use serialize::{Layout, serialize};
