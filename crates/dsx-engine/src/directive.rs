//! Directives
//!
//! Structural attributes that rewrite the tree before rendering:
//! `ds-if`, `ds-elseif`, `ds-else` and `ds-for`.

use crate::config::{CompileOptions, NonCollectionPolicy};
use crate::interpolate::{directive_source, evaluate_or_null};
use dsx_dom::Handle;
use dsx_script::{Value, is_identifier};

/// Prefix shared by directive attributes and module references
pub const DIRECTIVE_PREFIX: &str = "ds-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    If,
    ElseIf,
    Else,
    For,
}

impl Directive {
    /// Directive named by an attribute
    pub fn from_attribute(name: &str) -> Option<Self> {
        match name.strip_prefix(DIRECTIVE_PREFIX)? {
            "if" => Some(Directive::If),
            "elseif" => Some(Directive::ElseIf),
            "else" => Some(Directive::Else),
            "for" => Some(Directive::For),
            _ => None,
        }
    }

    pub fn attribute(self) -> &'static str {
        match self {
            Directive::If => "ds-if",
            Directive::ElseIf => "ds-elseif",
            Directive::Else => "ds-else",
            Directive::For => "ds-for",
        }
    }

    /// Apply to `node`, whose directive attribute has been removed
    pub async fn bind(self, node: &Handle, value: &str, options: &CompileOptions) {
        match self {
            Directive::If | Directive::ElseIf => bind_if(node, value).await,
            Directive::Else => {}
            Directive::For => bind_for(node, value, options).await,
        }
    }
}

/// Whether `node` carries any directive attribute
pub fn has_directives(node: &Handle) -> bool {
    next_directive(node).is_some()
}

/// First directive attribute in document order
fn next_directive(node: &Handle) -> Option<(Directive, String)> {
    let attrs = node.attrs()?;
    attrs
        .keys()
        .find_map(|key| Directive::from_attribute(key).map(|directive| (directive, key.clone())))
}

/// Bind the directives of `node` one at a time until none remain or the
/// node is deleted
pub async fn bind_directives(node: &Handle, options: &CompileOptions) {
    for _ in 0..options.max_directive_binds {
        let Some((directive, attribute)) = next_directive(node) else {
            return;
        };
        let value = node.remove_attr(&attribute).unwrap_or_default();
        tracing::trace!(directive = %attribute, value = %value, "binding directive");
        directive.bind(node, &value, options).await;
        if node.is_deleted() {
            return;
        }
    }
    if has_directives(node) {
        tracing::warn!(
            limit = options.max_directive_binds,
            tag = node.name().unwrap_or_default(),
            "directive limit reached, remaining directives ignored"
        );
    }
}

async fn bind_if(node: &Handle, value: &str) {
    let Some(scope) = node.scope() else {
        return;
    };
    let condition = evaluate_or_null(&directive_source(value), &scope).await;
    if !condition.is_truthy() {
        node.mark_deleted();
        return;
    }

    // the rest of the chain loses
    let (Some(parent), Some(index)) = (node.parent(), node.index_in_parent()) else {
        return;
    };
    let siblings: Vec<Handle> = parent.children().iter().skip(index + 1).cloned().collect();
    for sibling in siblings {
        let continues_chain = !sibling.has_attr(Directive::If.attribute())
            && (sibling.has_attr(Directive::ElseIf.attribute()) || sibling.has_attr(Directive::Else.attribute()));
        if !continues_chain {
            break;
        }
        sibling.mark_deleted();
    }
}

/// `item in expr` or `item, key in expr`
#[derive(Debug, PartialEq, Eq)]
struct ForClause<'a> {
    item: &'a str,
    key: Option<&'a str>,
    source: &'a str,
}

fn parse_for_clause(clause: &str) -> Option<ForClause<'_>> {
    let (names, source) = split_in(clause)?;
    let mut names = names.split(',').map(str::trim);
    let item = names.next()?;
    let key = names.next();
    if names.next().is_some() || !is_identifier(item) || key.is_some_and(|key| !is_identifier(key)) {
        return None;
    }
    let source = source.trim();
    (!source.is_empty()).then_some(ForClause { item, key, source })
}

/// Split at the first `in` surrounded by whitespace
fn split_in(clause: &str) -> Option<(&str, &str)> {
    let bytes = clause.as_bytes();
    let mut search = 0;
    while let Some(found) = clause[search..].find("in") {
        let at = search + found;
        let before = at.checked_sub(1).map(|i| bytes[i]);
        let after = bytes.get(at + 2).copied();
        if before.is_some_and(|b| b.is_ascii_whitespace()) && after.is_some_and(|b| b.is_ascii_whitespace()) {
            return Some((&clause[..at], &clause[at + 2..]));
        }
        search = at + 2;
    }
    None
}

async fn bind_for(node: &Handle, value: &str, options: &CompileOptions) {
    let (Some(parent), Some(index)) = (node.parent(), node.index_in_parent()) else {
        tracing::warn!("ds-for on a node without parent is ignored");
        return;
    };
    let Some(scope) = node.scope() else {
        return;
    };
    let source = directive_source(value);
    let Some(clause) = parse_for_clause(&source) else {
        tracing::warn!(clause = %source, "malformed ds-for clause");
        return;
    };

    let entries: Vec<(Value, Value)> = match evaluate_or_null(clause.source, &scope).await {
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| (Value::from(i), item.clone()))
            .collect(),
        Value::Object(map) => map
            .iter()
            .map(|(key, item)| (Value::from(key.as_str()), item.clone()))
            .collect(),
        other => {
            tracing::debug!(source = clause.source, kind = other.type_of(), "ds-for over a non-collection");
            if options.non_collection_for == NonCollectionPolicy::Remove {
                node.mark_deleted();
            }
            return;
        }
    };

    for (offset, (key, item)) in entries.into_iter().enumerate() {
        let copy = node.deep_clone();
        if let Some(scope) = copy.scope() {
            scope.set_local(clause.item, item.resolve().await);
            if let Some(name) = clause.key {
                scope.set_local(name, key);
            }
        }
        parent.insert(index + 1 + offset, copy);
    }
    node.mark_deleted();
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsx_dom::{Attributes, Node};
    use dsx_script::{Bindings, Scope};

    fn element(name: &str, attrs: &[(&str, &str)]) -> Handle {
        Node::element(name, attrs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect::<Attributes>())
    }

    fn scope(pairs: Vec<(&str, Value)>) -> Scope {
        Scope::new(Bindings::new(), pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    fn bind(node: &Handle, scope: &Scope) {
        node.set_scope(scope.fork(), true);
        smol::block_on(bind_directives(node, &CompileOptions::default()));
    }

    #[test]
    fn test_directive_names() {
        assert_eq!(Directive::from_attribute("ds-if"), Some(Directive::If));
        assert_eq!(Directive::from_attribute("ds-elseif"), Some(Directive::ElseIf));
        assert_eq!(Directive::from_attribute("ds-card"), None);
        assert_eq!(Directive::from_attribute("if"), None);
    }

    #[test]
    fn test_for_clause() {
        assert_eq!(
            parse_for_clause("item in items"),
            Some(ForClause { item: "item", key: None, source: "items" })
        );
        assert_eq!(
            parse_for_clause(" row , i  in\tdata.rows "),
            Some(ForClause { item: "row", key: Some("i"), source: "data.rows" })
        );
        assert_eq!(
            parse_for_clause("x in index in list"),
            Some(ForClause { item: "x", key: None, source: "index in list" })
        );
        assert_eq!(parse_for_clause("items"), None);
        assert_eq!(parse_for_clause("1x in items"), None);
        assert_eq!(parse_for_clause("a, b, c in items"), None);
        assert_eq!(parse_for_clause("class in items"), None);
        assert_eq!(parse_for_clause("item in "), None);
    }

    #[test]
    fn test_if_chain() {
        let scope = scope(vec![("a", Value::from(false)), ("b", Value::from(true))]);
        let parent = element("div", &[]);
        let first = element("p", &[("ds-if", "a")]);
        let second = element("p", &[("ds-elseif", "{{ b }}")]);
        let third = element("p", &[("ds-else", "")]);
        for node in [&first, &second, &third] {
            parent.append(node.clone());
        }

        bind(&first, &scope);
        assert!(first.is_deleted());
        assert!(!first.has_attr("ds-if"));

        bind(&second, &scope);
        assert!(!second.is_deleted());
        assert!(third.is_deleted());
    }

    #[test]
    fn test_true_if_stops_at_next_chain() {
        let scope = scope(vec![]);
        let parent = element("div", &[]);
        let first = element("p", &[("ds-if", "true")]);
        let other = element("p", &[("ds-if", "true")]);
        let orphan = element("p", &[("ds-else", "")]);
        for node in [&first, &other, &orphan] {
            parent.append(node.clone());
        }

        bind(&first, &scope);
        assert!(!other.is_deleted());
        assert!(!orphan.is_deleted());
    }

    #[test]
    fn test_for_over_array() {
        let items = Value::from(vec![Value::from("A"), Value::from("B")]);
        let scope = scope(vec![("items", items)]);
        let parent = element("ul", &[]);
        let stencil = element("li", &[("ds-for", "item, i in items"), ("class", "row")]);
        parent.append(stencil.clone());

        bind(&stencil, &scope);
        assert!(stencil.is_deleted());
        assert_eq!(parent.child_count(), 3);

        let first = parent.child(1).unwrap();
        let second = parent.child(2).unwrap();
        assert_eq!(first.attr("class").as_deref(), Some("row"));
        assert!(!first.has_attr("ds-for"));
        assert_eq!(first.scope().unwrap().lookup("item"), Some(Value::from("A")));
        assert_eq!(first.scope().unwrap().lookup("i"), Some(Value::from(0)));
        assert_eq!(second.scope().unwrap().lookup("item"), Some(Value::from("B")));
        assert!(stencil.scope().unwrap().lookup("item").is_none());
    }

    #[test]
    fn test_for_over_object_keys() {
        let object: Value = [("x", Value::from(1)), ("y", Value::from(2))].into_iter().collect();
        let scope = scope(vec![("point", object)]);
        let parent = element("dl", &[]);
        let stencil = element("dt", &[("ds-for", "v, k in point")]);
        parent.append(stencil.clone());

        bind(&stencil, &scope);
        let keys: Vec<Value> = (1..3)
            .map(|i| parent.child(i).unwrap().scope().unwrap().lookup("k").unwrap())
            .collect();
        assert_eq!(keys, vec![Value::from("x"), Value::from("y")]);
    }

    #[test]
    fn test_for_over_non_collection() {
        let scope = scope(vec![("n", Value::from(3))]);

        let parent = element("div", &[]);
        let removed = element("p", &[("ds-for", "x in n")]);
        parent.append(removed.clone());
        bind(&removed, &scope);
        assert!(removed.is_deleted());
        assert_eq!(parent.child_count(), 1);

        let kept = element("p", &[("ds-for", "x in n")]);
        parent.append(kept.clone());
        kept.set_scope(scope.fork(), true);
        let options = CompileOptions::default().non_collection_for(NonCollectionPolicy::Keep);
        smol::block_on(bind_directives(&kept, &options));
        assert!(!kept.is_deleted());
    }

    #[test]
    fn test_malformed_for_is_ignored() {
        let scope = scope(vec![]);
        let parent = element("div", &[]);
        let node = element("p", &[("ds-for", "nonsense")]);
        parent.append(node.clone());
        bind(&node, &scope);
        assert!(!node.is_deleted());
        assert!(!node.has_attr("ds-for"));
        assert_eq!(parent.child_count(), 1);
    }

    #[test]
    fn test_for_then_if_binds_on_clones() {
        let items = Value::from(vec![Value::from(1), Value::from(2)]);
        let scope = scope(vec![("items", items)]);
        let parent = element("ul", &[]);
        let stencil = element("li", &[("ds-for", "n in items"), ("ds-if", "n > 1")]);
        parent.append(stencil.clone());

        bind(&stencil, &scope);
        // the stencil stops binding once deleted; clones keep `ds-if`
        let first = parent.child(1).unwrap();
        assert!(first.has_attr("ds-if"));
        smol::block_on(bind_directives(&first, &CompileOptions::default()));
        assert!(first.is_deleted());
    }

    #[test]
    fn test_bind_limit() {
        let scope = scope(vec![]);
        let node = element("p", &[("ds-else", ""), ("ds-if", "true")]);
        node.set_scope(scope, true);
        let options = CompileOptions::default().max_directive_binds(1);
        smol::block_on(bind_directives(&node, &options));
        assert!(node.has_attr("ds-if"));
        assert!(!node.has_attr("ds-else"));
    }
}
