//! Tag Tables

/// How the tokenizer reads the contents of an element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMode {
    /// Markup and character references
    Normal,
    /// Character references but no markup (`title`, `textarea`)
    Escapable,
    /// Neither markup nor references, kept verbatim (`style`)
    Raw,
    /// Script data (`script`)
    Script,
}

/// Elements that have no contents and no end tag
pub fn is_void(tag: &str) -> bool {
    matches!(
        tag,
        "area"
            | "base"
            | "br"
            | "col"
            | "embed"
            | "hr"
            | "img"
            | "input"
            | "link"
            | "meta"
            | "param"
            | "source"
            | "track"
            | "wbr"
    )
}

pub fn text_mode(tag: &str) -> TextMode {
    match tag {
        "script" => TextMode::Script,
        "style" => TextMode::Raw,
        "title" | "textarea" => TextMode::Escapable,
        _ => TextMode::Normal,
    }
}

/// Elements whose text is stored and written verbatim
pub fn is_raw_text(tag: &str) -> bool {
    matches!(text_mode(tag), TextMode::Raw | TextMode::Script)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_void_elements() {
        assert!(is_void("br"));
        assert!(is_void("link"));
        assert!(!is_void("div"));
        assert!(!is_void("script"));
    }

    #[test]
    fn test_text_modes() {
        assert_eq!(text_mode("script"), TextMode::Script);
        assert_eq!(text_mode("title"), TextMode::Escapable);
        assert!(is_raw_text("style"));
        assert!(!is_raw_text("textarea"));
    }
}
