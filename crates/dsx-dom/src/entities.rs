//! HTML Entities
//!
//! Encoding for text and attribute values, and decoding of named and
//! numeric character references.
//!
//! Uses Cow so clean input is returned without copying.

use memchr::{memchr, memchr2, memchr3};
use std::borrow::Cow;

/// Escape `& < > " '`
pub fn encode(text: &str) -> Cow<'_, str> {
    let bytes = text.as_bytes();
    if memchr3(b'&', b'<', b'>', bytes).is_none() && memchr2(b'"', b'\'', bytes).is_none() {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len() + 16);
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Replace character references with the characters they name
///
/// Unknown or malformed references are kept as written.
pub fn decode(text: &str) -> Cow<'_, str> {
    if memchr(b'&', text.as_bytes()).is_none() {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = memchr(b'&', rest.as_bytes()) {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let decoded = memchr(b';', rest.as_bytes())
            .filter(|&semi| semi <= MAX_REFERENCE_LEN)
            .and_then(|semi| decode_reference(&rest[1..semi]).map(|c| (c, semi)));
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Longest reference body considered, `&` through `;` exclusive
const MAX_REFERENCE_LEN: usize = 12;

fn decode_reference(reference: &str) -> Option<char> {
    if let Some(numeric) = reference.strip_prefix('#') {
        let code = match numeric.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => numeric.parse::<u32>().ok()?,
        };
        return match code {
            0 => Some('\u{FFFD}'),
            _ => char::from_u32(code),
        };
    }

    let c = match reference {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{00A0}',
        "copy" => '\u{00A9}',
        "reg" => '\u{00AE}',
        "trade" => '\u{2122}',
        "deg" => '\u{00B0}',
        "middot" => '\u{00B7}',
        "times" => '\u{00D7}',
        "divide" => '\u{00F7}',
        "laquo" => '\u{00AB}',
        "raquo" => '\u{00BB}',
        "euro" => '\u{20AC}',
        "pound" => '\u{00A3}',
        "yen" => '\u{00A5}',
        "cent" => '\u{00A2}',
        "sect" => '\u{00A7}',
        "para" => '\u{00B6}',
        "bull" => '\u{2022}',
        "mdash" => '\u{2014}',
        "ndash" => '\u{2013}',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "ldquo" => '\u{201C}',
        "rdquo" => '\u{201D}',
        "hellip" => '\u{2026}',
        "larr" => '\u{2190}',
        "rarr" => '\u{2192}',
        "uarr" => '\u{2191}',
        "darr" => '\u{2193}',
        _ => return None,
    };
    Some(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode() {
        assert_eq!(encode("plain text"), "plain text");
        assert!(matches!(encode("plain"), Cow::Borrowed(_)));
        assert_eq!(encode("a < b && c > \"d\" 'e'"), "a &lt; b &amp;&amp; c &gt; &quot;d&quot; &#39;e&#39;");
    }

    #[test]
    fn test_decode_named_and_numeric() {
        assert_eq!(decode("a &lt; b &amp;&amp; c &gt; &quot;d&quot;"), "a < b && c > \"d\"");
        assert_eq!(decode("&#39;x&#x27;&#X41;"), "'x'A");
        assert_eq!(decode("&copy; 2024 &mdash; ok"), "\u{00A9} 2024 \u{2014} ok");
    }

    #[test]
    fn test_decode_keeps_unknown_references() {
        assert_eq!(decode("fish & chips"), "fish & chips");
        assert_eq!(decode("&bogus; &#xZZ; &"), "&bogus; &#xZZ; &");
        assert_eq!(decode("a && b; c"), "a && b; c");
    }

    #[test]
    fn test_encode_decode_inverse() {
        let text = "if (a < b && c != 'x') { d = \"y\"; }";
        assert_eq!(decode(&encode(text)), text);
    }
}
