//! Placeholders
//!
//! `{{ expr }}` inserts the escaped string form of a value, `{{= expr }}`
//! inserts it as is. Failed evaluations are logged and insert nothing, as do
//! `null` and `undefined`.
//!
//! Markup text and attribute values are stored entity-encoded, so their
//! expression sources are decoded before evaluation. Raw text (scripts and
//! styles) is used verbatim and never escaped.

use dsx_dom::entities;
use dsx_script::{Scope, Value, evaluate};
use futures_util::future::join_all;
use std::collections::HashMap;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";
const RAW_MARKER: char = '=';

enum Segment<'a> {
    Literal(&'a str),
    Placeholder { text: &'a str, source: &'a str, raw: bool },
}

fn segments(text: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find(OPEN) {
        let Some(close) = rest[open + OPEN.len()..].find(CLOSE) else {
            break;
        };
        let end = open + OPEN.len() + close + CLOSE.len();
        let inner = &rest[open + OPEN.len()..end - CLOSE.len()];
        let (source, raw) = match inner.strip_prefix(RAW_MARKER) {
            Some(source) => (source, true),
            None => (inner, false),
        };
        if open > 0 {
            segments.push(Segment::Literal(&rest[..open]));
        }
        segments.push(Segment::Placeholder {
            text: &rest[open..end],
            source,
            raw,
        });
        rest = &rest[end..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Literal(rest));
    }
    segments
}

/// Source of a value that consists of exactly one placeholder
fn whole_placeholder(text: &str) -> Option<&str> {
    let inner = text.strip_prefix(OPEN)?.strip_suffix(CLOSE)?;
    if inner.contains(CLOSE) {
        return None;
    }
    Some(inner.strip_prefix(RAW_MARKER).unwrap_or(inner))
}

/// Evaluate `source`, logging failures as `null`
pub async fn evaluate_or_null(source: &str, scope: &Scope) -> Value {
    match evaluate(source.trim(), scope).await {
        Ok(value) => value.resolve().await,
        Err(error) => {
            tracing::warn!(expression = source.trim(), %error, "failed to evaluate expression");
            Value::Null
        }
    }
}

/// String form used for substitution
fn display(value: &Value) -> String {
    if value.is_nullish() { String::new() } else { value.to_string() }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Form {
    /// Entity-encoded text
    Markup,
    /// Verbatim text
    Raw,
}

async fn substitute(text: &str, scope: &Scope, form: Form) -> String {
    let segments = segments(text);
    if !segments.iter().any(|s| matches!(s, Segment::Placeholder { .. })) {
        return text.to_string();
    }

    // each distinct placeholder is evaluated once, all of them together
    let mut unique: Vec<(&str, &str, bool)> = Vec::new();
    for segment in &segments {
        if let Segment::Placeholder { text, source, raw } = segment {
            if !unique.iter().any(|(seen, _, _)| seen == text) {
                unique.push((*text, *source, *raw));
            }
        }
    }
    let rendered = join_all(unique.iter().map(|&(_, source, raw)| async move {
        match form {
            Form::Markup => {
                let value = evaluate_or_null(&entities::decode(source), scope).await;
                let text = display(&value);
                if raw { text } else { entities::encode(&text).into_owned() }
            }
            Form::Raw => display(&evaluate_or_null(source, scope).await),
        }
    }))
    .await;
    let rendered: HashMap<&str, String> = unique.iter().map(|(text, _, _)| *text).zip(rendered).collect();

    let mut out = String::with_capacity(text.len());
    for segment in &segments {
        match segment {
            Segment::Literal(literal) => out.push_str(literal),
            Segment::Placeholder { text, .. } => {
                if let Some(value) = rendered.get(text) {
                    out.push_str(value);
                }
            }
        }
    }
    out
}

/// Substitute placeholders in entity-encoded text, keeping it encoded
pub async fn substitute_markup(text: &str, scope: &Scope) -> String {
    substitute(text, scope, Form::Markup).await
}

/// Substitute placeholders in script or style text
pub async fn substitute_raw(text: &str, scope: &Scope) -> String {
    substitute(text, scope, Form::Raw).await
}

/// New value of an element attribute
pub async fn evaluate_attribute(value: &str, scope: &Scope) -> String {
    substitute_markup(value.trim(), scope).await
}

/// Module parameter from an attribute value
///
/// A lone placeholder passes the value through with its type; anything
/// else becomes the decoded string with placeholders substituted.
pub async fn evaluate_parameter(value: &str, scope: &Scope) -> Value {
    let decoded = entities::decode(value.trim());
    match whole_placeholder(&decoded) {
        Some(source) => evaluate_or_null(source, scope).await,
        None => Value::from(substitute_raw(&decoded, scope).await),
    }
}

/// Expression source of a directive value: bare or wrapped in `{{ }}`
pub fn directive_source(value: &str) -> String {
    let decoded = entities::decode(value.trim());
    whole_placeholder(&decoded).unwrap_or(&*decoded).trim().to_string()
}

/// `data-attr` to `dataAttr`
pub fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        if c == '-' {
            upper = !out.is_empty();
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsx_script::{Bindings, Function};

    fn scope() -> Scope {
        let local: Bindings = [
            ("name", Value::from("Ada <admin>")),
            ("count", Value::from(3)),
            ("html", Value::from("<b>bold</b>")),
            ("nothing", Value::Null),
            ("items", Value::from(vec![Value::from(1), Value::from(2)])),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        Scope::new(Bindings::new(), local)
    }

    #[test]
    fn test_markup_substitution_escapes() {
        let text = smol::block_on(substitute_markup("Hi {{ name }}, you have {{count}} new", &scope()));
        assert_eq!(text, "Hi Ada &lt;admin&gt;, you have 3 new");
    }

    #[test]
    fn test_raw_placeholder() {
        let text = smol::block_on(substitute_markup("{{= html }} and {{ html }}", &scope()));
        assert_eq!(text, "<b>bold</b> and &lt;b&gt;bold&lt;/b&gt;");
    }

    #[test]
    fn test_encoded_expression_source() {
        // stored text has `<` encoded
        let text = smol::block_on(substitute_markup("{{ count &lt; 5 ? &quot;few&quot; : &quot;many&quot; }}", &scope()));
        assert_eq!(text, "few");
    }

    #[test]
    fn test_nullish_and_failures_insert_nothing() {
        let text = smol::block_on(substitute_markup("[{{ nothing }}][{{ missing }}][{{ 1 + }}][{{ count() }}]", &scope()));
        assert_eq!(text, "[][][][]");
    }

    #[test]
    fn test_repeated_placeholders_evaluate_once() {
        let calls = std::rc::Rc::new(std::cell::Cell::new(0));
        let counter = calls.clone();
        let tick = Function::native("tick", move |_, _| {
            counter.set(counter.get() + 1);
            Ok(Value::from(counter.get()))
        });
        let scope = Scope::new(Bindings::new(), [("tick".to_string(), Value::from(tick))].into_iter().collect());
        let text = smol::block_on(substitute_markup("{{ tick() }}-{{ tick() }}", &scope));
        assert_eq!(text, "1-1");
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_raw_text_substitution() {
        let text = smol::block_on(substitute_raw("var n = {{ count }}; var s = '{{ name }}';", &scope()));
        assert_eq!(text, "var n = 3; var s = 'Ada <admin>';");
    }

    #[test]
    fn test_unterminated_placeholder_is_text() {
        let text = smol::block_on(substitute_markup("a {{ count", &scope()));
        assert_eq!(text, "a {{ count");
    }

    #[test]
    fn test_attribute_values() {
        let scope = scope();
        assert_eq!(smol::block_on(evaluate_attribute(" {{ name }} ", &scope)), "Ada &lt;admin&gt;");
        assert_eq!(smol::block_on(evaluate_attribute("item-{{ count }}", &scope)), "item-3");
        assert_eq!(smol::block_on(evaluate_attribute("plain &amp; text", &scope)), "plain &amp; text");
    }

    #[test]
    fn test_parameters_keep_types() {
        let scope = scope();
        assert_eq!(
            smol::block_on(evaluate_parameter("{{ items }}", &scope)),
            Value::from(vec![Value::from(1), Value::from(2)])
        );
        assert_eq!(smol::block_on(evaluate_parameter("{{ count }}", &scope)), Value::from(3));
        assert_eq!(smol::block_on(evaluate_parameter("n={{ count }} &amp; more", &scope)), Value::from("n=3 & more"));
        assert_eq!(smol::block_on(evaluate_parameter("literal", &scope)), Value::from("literal"));
    }

    #[test]
    fn test_directive_source() {
        assert_eq!(directive_source(" count &gt; 1 "), "count > 1");
        assert_eq!(directive_source("{{ count > 1 }}"), "count > 1");
        assert_eq!(directive_source("item in {{ items }}"), "item in {{ items }}");
    }

    #[test]
    fn test_camel_case() {
        assert_eq!(camel_case("user-name"), "userName");
        assert_eq!(camel_case("data-item-id"), "dataItemId");
        assert_eq!(camel_case("plain"), "plain");
        assert_eq!(camel_case("-lead"), "lead");
    }
}
