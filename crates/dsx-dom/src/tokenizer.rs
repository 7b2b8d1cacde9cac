//! Markup Tokenizer
//!
//! Drives html5ever's tokenizer (not its tree builder, which would insert
//! implied `head`/`body` elements) and reports markup events to a
//! [`MarkupSink`].

use crate::node::Attributes;
use crate::tags::{self, TextMode};
use html5ever::tendril::StrTendril;
use html5ever::tokenizer::states::RawKind;
use html5ever::tokenizer::{
    BufferQueue, Doctype, TagKind, Token, TokenSink, TokenSinkResult, Tokenizer, TokenizerOpts,
};
use html5ever::interface::TokenizerResult;
use std::cell::RefCell;

/// Receiver of markup events
///
/// Character references are already decoded in text and attribute values.
pub trait MarkupSink {
    fn open_tag(&mut self, name: &str, attrs: Attributes);
    fn close_tag(&mut self, name: &str);
    fn text(&mut self, text: &str);
    /// Doctypes and `<?...?>` blocks. `data` is the full inner text,
    /// e.g. `!DOCTYPE html`.
    fn processing_instruction(&mut self, name: &str, data: &str);
}

/// Tokenize `source` into `sink`
///
/// Self-closing and void tags are closed immediately; end tags of void
/// elements are dropped.
pub fn tokenize<S: MarkupSink>(source: &str, sink: &mut S) {
    let adapter = Adapter {
        sink: RefCell::new(sink),
    };
    let tokenizer = Tokenizer::new(adapter, TokenizerOpts::default());
    let queue = BufferQueue::default();
    queue.push_back(StrTendril::from_slice(source));
    // feed returns early on a script pause; drain the queue
    while let TokenizerResult::Script(()) = tokenizer.feed(&queue) {}
    tokenizer.end();
}

struct Adapter<'a, S> {
    sink: RefCell<&'a mut S>,
}

impl<S: MarkupSink> TokenSink for Adapter<'_, S> {
    type Handle = ();

    fn process_token(&self, token: Token, line_number: u64) -> TokenSinkResult<()> {
        let mut sink = self.sink.borrow_mut();
        match token {
            Token::TagToken(tag) => {
                let name: &str = &tag.name;
                match tag.kind {
                    TagKind::StartTag => {
                        let attrs: Attributes = tag
                            .attrs
                            .iter()
                            .map(|attr| (attr.name.local.to_string(), attr.value.to_string()))
                            .collect();
                        sink.open_tag(name, attrs);
                        if tag.self_closing || tags::is_void(name) {
                            sink.close_tag(name);
                            return TokenSinkResult::Continue;
                        }
                        match tags::text_mode(name) {
                            TextMode::Script => return TokenSinkResult::RawData(RawKind::ScriptData),
                            TextMode::Raw => return TokenSinkResult::RawData(RawKind::Rawtext),
                            TextMode::Escapable => return TokenSinkResult::RawData(RawKind::Rcdata),
                            TextMode::Normal => {}
                        }
                    }
                    TagKind::EndTag if tags::is_void(name) => {}
                    TagKind::EndTag => sink.close_tag(name),
                }
            }
            Token::CharacterTokens(text) => sink.text(&text),
            Token::CommentToken(comment) => {
                // html5ever reads `<?...?>` as a bogus comment starting at `?`
                if comment.starts_with('?') {
                    let data = comment.trim_end();
                    let name = data.split_whitespace().next().unwrap_or(data);
                    sink.processing_instruction(name, data);
                }
            }
            Token::DoctypeToken(doctype) => {
                sink.processing_instruction("!doctype", &doctype_text(&doctype));
            }
            Token::ParseError(error) => {
                tracing::trace!(line = line_number, %error, "markup parse error");
            }
            _ => {}
        }
        TokenSinkResult::Continue
    }
}

fn doctype_text(doctype: &Doctype) -> String {
    let mut text = String::from("!DOCTYPE");
    if let Some(name) = &doctype.name {
        text.push(' ');
        text.push_str(name);
    }
    let public: Option<&str> = doctype.public_id.as_deref();
    let system: Option<&str> = doctype.system_id.as_deref();
    match (public, system) {
        (Some(public), Some(system)) => text.push_str(&format!(" PUBLIC \"{public}\" \"{system}\"")),
        (Some(public), None) => text.push_str(&format!(" PUBLIC \"{public}\"")),
        (None, Some(system)) => text.push_str(&format!(" SYSTEM \"{system}\"")),
        (None, None) => {}
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl MarkupSink for Recorder {
        fn open_tag(&mut self, name: &str, attrs: Attributes) {
            let attrs: Vec<String> = attrs.iter().map(|(k, v)| format!("{k}={v}")).collect();
            self.events.push(format!("open {name} [{}]", attrs.join(" ")));
        }
        fn close_tag(&mut self, name: &str) {
            self.events.push(format!("close {name}"));
        }
        fn text(&mut self, text: &str) {
            match self.events.last_mut() {
                Some(last) if last.starts_with("text ") => last.push_str(text),
                _ => self.events.push(format!("text {text}")),
            }
        }
        fn processing_instruction(&mut self, name: &str, data: &str) {
            self.events.push(format!("pi {name} {data}"));
        }
    }

    fn events(source: &str) -> Vec<String> {
        let mut recorder = Recorder::default();
        tokenize(source, &mut recorder);
        recorder.events
    }

    #[test]
    fn test_tags_and_text() {
        assert_eq!(
            events("<DIV Class=\"a\">Hi &amp; bye<br></div>"),
            vec!["open div [class=a]", "text Hi & bye", "open br []", "close br", "close div"]
        );
    }

    #[test]
    fn test_self_closing_and_void_end_tags() {
        assert_eq!(
            events("<ds-card title=\"x\"/><img src=a></img>"),
            vec!["open ds-card [title=x]", "close ds-card", "open img [src=a]", "close img"]
        );
    }

    #[test]
    fn test_script_contents_are_raw() {
        assert_eq!(
            events("<script>if (a < b && c) { x = '<p>'; }</script>"),
            vec!["open script []", "text if (a < b && c) { x = '<p>'; }", "close script"]
        );
    }

    #[test]
    fn test_markup_after_scripts_is_delivered() {
        assert_eq!(
            events("<script>a()</script><script>b()</script><p>after</p>"),
            vec![
                "open script []",
                "text a()",
                "close script",
                "open script []",
                "text b()",
                "close script",
                "open p []",
                "text after",
                "close p",
            ]
        );
    }

    #[test]
    fn test_title_decodes_but_ignores_markup() {
        assert_eq!(
            events("<title><b>A &amp; B</b></title>"),
            vec!["open title []", "text <b>A & B</b>", "close title"]
        );
    }

    #[test]
    fn test_doctype_and_instructions() {
        assert_eq!(
            events("<!DOCTYPE html><?xml version=\"1.0\"?><!-- note --><html></html>"),
            vec![
                "pi !doctype !DOCTYPE html",
                "pi ?xml ?xml version=\"1.0\"?",
                "open html []",
                "close html",
            ]
        );
    }
}
