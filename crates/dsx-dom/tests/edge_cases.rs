//! Edge case tests for dsx-dom
//!
//! Malformed markup, odd whitespace and serialization round trips.

use dsx_dom::{BuildError, Layout, parse_entry, parse_module, serialize};

fn render(source: &str) -> String {
    let document = parse_entry(source).unwrap();
    serialize(&document.instructions, &document.root.unwrap(), Layout::Compact)
}

// ============================================================================
// EMPTY AND MINIMAL INPUT
// ============================================================================

#[test]
fn test_only_whitespace() {
    assert_eq!(parse_entry("   \t\n\r\n   ").unwrap_err(), BuildError::MissingRoot);
}

#[test]
fn test_only_doctype() {
    assert_eq!(parse_entry("<!DOCTYPE html>").unwrap_err(), BuildError::MissingRoot);
}

#[test]
fn test_minimal_document() {
    assert_eq!(render("<html></html>"), "<html></html>");
}

// ============================================================================
// MALFORMED MARKUP
// ============================================================================

#[test]
fn test_unclosed_tags_close_at_end() {
    assert_eq!(render("<html><div><p><span>text"), "<html><div><p><span>text</span></p></div></html>");
}

#[test]
fn test_mismatched_tags() {
    assert_eq!(render("<html><div><p></div></p></html>"), "<html><div><p></p></div></html>");
}

#[test]
fn test_extra_closing_tags() {
    assert_eq!(render("<html><div></div></div></div></html>"), "<html><div></div></html>");
}

#[test]
fn test_text_after_root_is_ignored() {
    assert_eq!(render("<html><p>a</p></html> trailing"), "<html><p>a</p></html>");
}

#[test]
fn test_comments_are_dropped() {
    assert_eq!(render("<html><!-- hidden --><p>a</p></html>"), "<html><p>a</p></html>");
}

// ============================================================================
// TEXT
// ============================================================================

#[test]
fn test_whitespace_collapse() {
    assert_eq!(
        render("<html><p>\n   many\t\tspaces\n here  </p></html>"),
        "<html><p> many spaces here </p></html>"
    );
}

#[test]
fn test_entities_survive() {
    assert_eq!(
        render("<html><p title=\"&quot;x&quot;\">&lt;b&gt; &copy;</p></html>"),
        "<html><p title=\"&quot;x&quot;\">&lt;b&gt; \u{00A9}</p></html>"
    );
}

#[test]
fn test_script_text_is_verbatim() {
    assert_eq!(
        render("<html><script>\n  if (a < b) { go('&amp;'); }\n</script></html>"),
        "<html><script>if (a < b) { go('&amp;'); }</script></html>"
    );
}

#[test]
fn test_uppercase_tags_and_attributes() {
    assert_eq!(render("<HTML><BODY ID=\"x\"></BODY></HTML>"), "<html><body id=\"x\"></body></html>");
}

// ============================================================================
// MODULES
// ============================================================================

#[test]
fn test_module_root_after_assets() {
    let document = parse_module("<style>a{}</style><script>go()</script><nav><a href=\"/\">home</a></nav>").unwrap();
    let root = document.root.unwrap();
    assert_eq!(serialize(&[], &root, Layout::Compact), "<nav><a href=\"/\">home</a></nav>");
}

#[test]
fn test_module_instructions_are_ignored() {
    let document = parse_module("<!DOCTYPE html><div></div>").unwrap();
    assert!(document.instructions.is_empty());
}

#[test]
fn test_module_with_only_text() {
    assert_eq!(parse_module("hello").unwrap_err(), BuildError::MissingRoot);
}
