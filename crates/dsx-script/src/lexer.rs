//! Lexer
//!
//! Tokenizes template expressions and server-script source.

use crate::token::{Span, Token, TokenKind, keyword_from_str};
use std::iter::Peekable;
use std::str::Chars;

/// Source lexer
///
/// Produces one token at a time. Template literal continuations after a
/// `${ ... }` substitution are scanned on request by the parser through
/// [`Lexer::continue_template`]. Regular expression literals are never
/// produced on their own; see [`Lexer::continue_regex`].
pub struct Lexer<'src> {
    source: &'src str,
    chars: Peekable<Chars<'src>>,
    pos: u32,
}

impl<'src> Lexer<'src> {
    /// Create a new lexer for the given source code
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            chars: source.chars().peekable(),
            pos: 0,
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn peek_next(&self) -> Option<char> {
        let mut iter = self.source[self.pos as usize..].chars();
        iter.next();
        iter.next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        self.pos += c.len_utf8() as u32;
        Some(c)
    }

    /// Consume the next character when it equals `expected`
    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') if self.peek_next() == Some('/') => {
                    while self.peek().is_some_and(|c| c != '\n') {
                        self.advance();
                    }
                }
                Some('/') if self.peek_next() == Some('*') => {
                    self.advance();
                    self.advance();
                    while self.peek().is_some() {
                        if self.peek() == Some('*') && self.peek_next() == Some('/') {
                            self.advance();
                            self.advance();
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    /// Get the next token
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace_and_comments();

        let start = self.pos;
        let Some(c) = self.advance() else {
            return Token::new(TokenKind::Eof, Span::new(start, start));
        };

        let kind = match c {
            c if is_identifier_start(c) => self.scan_identifier(start),
            '0'..='9' => self.scan_number(start),
            '"' | '\'' => self.scan_string(c),
            '`' => self.scan_template(),

            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ';' => TokenKind::Semicolon,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '~' => TokenKind::Tilde,
            '#' => TokenKind::Hash,

            '.' => {
                if self.peek() == Some('.') && self.peek_next() == Some('.') {
                    self.advance();
                    self.advance();
                    TokenKind::DotDotDot
                } else if matches!(self.peek(), Some('0'..='9')) {
                    self.scan_number(start)
                } else {
                    TokenKind::Dot
                }
            }

            '?' => {
                if self.eat('?') {
                    if self.eat('=') {
                        TokenKind::CompoundEq
                    } else {
                        TokenKind::QuestionQuestion
                    }
                } else if self.peek() == Some('.') && !matches!(self.peek_next(), Some('0'..='9')) {
                    self.advance();
                    TokenKind::QuestionDot
                } else {
                    TokenKind::Question
                }
            }

            '+' => {
                if self.eat('+') {
                    TokenKind::PlusPlus
                } else if self.eat('=') {
                    TokenKind::CompoundEq
                } else {
                    TokenKind::Plus
                }
            }

            '-' => {
                if self.eat('-') {
                    TokenKind::MinusMinus
                } else if self.eat('=') {
                    TokenKind::CompoundEq
                } else {
                    TokenKind::Minus
                }
            }

            '*' => {
                if self.eat('*') {
                    if self.eat('=') {
                        TokenKind::CompoundEq
                    } else {
                        TokenKind::StarStar
                    }
                } else if self.eat('=') {
                    TokenKind::CompoundEq
                } else {
                    TokenKind::Star
                }
            }

            '/' => self.compound_or(TokenKind::Slash),
            '%' => self.compound_or(TokenKind::Percent),
            '^' => self.compound_or(TokenKind::Caret),

            '<' => {
                if self.eat('<') {
                    self.compound_or(TokenKind::LShift)
                } else if self.eat('=') {
                    TokenKind::LessThanEq
                } else {
                    TokenKind::LessThan
                }
            }

            '>' => {
                if self.eat('>') {
                    if self.eat('>') {
                        self.compound_or(TokenKind::URShift)
                    } else {
                        self.compound_or(TokenKind::RShift)
                    }
                } else if self.eat('=') {
                    TokenKind::GreaterThanEq
                } else {
                    TokenKind::GreaterThan
                }
            }

            '=' => {
                if self.eat('=') {
                    if self.eat('=') {
                        TokenKind::EqEqEq
                    } else {
                        TokenKind::EqEq
                    }
                } else if self.eat('>') {
                    TokenKind::Arrow
                } else {
                    TokenKind::Eq
                }
            }

            '!' => {
                if self.eat('=') {
                    if self.eat('=') {
                        TokenKind::NotEqEq
                    } else {
                        TokenKind::NotEq
                    }
                } else {
                    TokenKind::Bang
                }
            }

            '&' => {
                if self.eat('&') {
                    self.compound_or(TokenKind::AmpersandAmpersand)
                } else {
                    self.compound_or(TokenKind::Ampersand)
                }
            }

            '|' => {
                if self.eat('|') {
                    self.compound_or(TokenKind::PipePipe)
                } else {
                    self.compound_or(TokenKind::Pipe)
                }
            }

            _ => TokenKind::Error(format!("unexpected character: {c}").into()),
        };

        Token::new(kind, Span::new(start, self.pos))
    }

    fn compound_or(&mut self, plain: TokenKind) -> TokenKind {
        if self.eat('=') { TokenKind::CompoundEq } else { plain }
    }

    fn scan_identifier(&mut self, start: u32) -> TokenKind {
        while self.peek().is_some_and(is_identifier_part) {
            self.advance();
        }
        let text = &self.source[start as usize..self.pos as usize];
        keyword_from_str(text).unwrap_or_else(|| TokenKind::Identifier(text.into()))
    }

    fn scan_number(&mut self, start: u32) -> TokenKind {
        if self.source.as_bytes().get(start as usize) == Some(&b'0') {
            let radix = match self.peek() {
                Some('x' | 'X') => Some(16),
                Some('o' | 'O') => Some(8),
                Some('b' | 'B') => Some(2),
                _ => None,
            };
            if let Some(radix) = radix {
                return self.scan_radix_number(start, radix);
            }
        }

        while matches!(self.peek(), Some('0'..='9' | '_')) {
            self.advance();
        }
        if self.peek() == Some('.') && !matches!(self.peek_next(), Some('.')) {
            self.advance();
            while matches!(self.peek(), Some('0'..='9' | '_')) {
                self.advance();
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            self.advance();
            if matches!(self.peek(), Some('+' | '-')) {
                self.advance();
            }
            while matches!(self.peek(), Some('0'..='9' | '_')) {
                self.advance();
            }
        }

        let text = &self.source[start as usize..self.pos as usize];
        match text.replace('_', "").parse::<f64>() {
            Ok(n) => TokenKind::Number(n),
            Err(_) => TokenKind::Error(format!("invalid number: {text}").into()),
        }
    }

    fn scan_radix_number(&mut self, start: u32, radix: u32) -> TokenKind {
        self.advance(); // x / o / b
        while self.peek().is_some_and(|c| c == '_' || c.is_digit(radix)) {
            self.advance();
        }
        let digits = self.source[(start + 2) as usize..self.pos as usize].replace('_', "");
        match u64::from_str_radix(&digits, radix) {
            Ok(n) => TokenKind::Number(n as f64),
            Err(_) => TokenKind::Error("invalid number literal".into()),
        }
    }

    fn scan_string(&mut self, quote: char) -> TokenKind {
        let mut value = String::new();

        while let Some(c) = self.peek() {
            if c == quote {
                self.advance();
                return TokenKind::String(value.into());
            } else if c == '\\' {
                self.advance();
                if !self.scan_escape(&mut value) {
                    break;
                }
            } else if c == '\n' {
                return TokenKind::Error("unterminated string".into());
            } else {
                value.push(c);
                self.advance();
            }
        }

        TokenKind::Error("unterminated string".into())
    }

    /// Decode one escape sequence after a backslash. False at end of input.
    fn scan_escape(&mut self, value: &mut String) -> bool {
        match self.advance() {
            Some('n') => value.push('\n'),
            Some('r') => value.push('\r'),
            Some('t') => value.push('\t'),
            Some('b') => value.push('\u{8}'),
            Some('f') => value.push('\u{c}'),
            Some('v') => value.push('\u{b}'),
            Some('0') => value.push('\0'),
            Some('\n') => {}
            Some('x') => {
                if let Some(c) = self.scan_hex_escape(2).and_then(char::from_u32) {
                    value.push(c);
                }
            }
            Some('u') => {
                let code = if self.eat('{') {
                    self.scan_unicode_escape_braces()
                } else {
                    self.scan_hex_escape(4)
                };
                if let Some(c) = code.and_then(char::from_u32) {
                    value.push(c);
                }
            }
            Some(c) => value.push(c),
            None => return false,
        }
        true
    }

    fn scan_hex_escape(&mut self, count: usize) -> Option<u32> {
        let start = self.pos;
        for _ in 0..count {
            if self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.advance();
            } else {
                return None;
            }
        }
        u32::from_str_radix(&self.source[start as usize..self.pos as usize], 16).ok()
    }

    fn scan_unicode_escape_braces(&mut self) -> Option<u32> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
            self.advance();
        }
        let end = self.pos;
        if self.eat('}') {
            u32::from_str_radix(&self.source[start as usize..end as usize], 16).ok()
        } else {
            None
        }
    }

    /// Scan template characters up to the closing backtick or the next
    /// `${`. Returns the cooked text and whether a substitution follows.
    fn scan_template_chunk(&mut self) -> Result<(String, bool), TokenKind> {
        let mut value = String::new();

        while let Some(c) = self.peek() {
            match c {
                '`' => {
                    self.advance();
                    return Ok((value, false));
                }
                '$' if self.peek_next() == Some('{') => {
                    self.advance();
                    self.advance();
                    return Ok((value, true));
                }
                '\\' => {
                    self.advance();
                    if !self.scan_escape(&mut value) {
                        break;
                    }
                }
                _ => {
                    value.push(c);
                    self.advance();
                }
            }
        }

        Err(TokenKind::Error("unterminated template literal".into()))
    }

    fn scan_template(&mut self) -> TokenKind {
        match self.scan_template_chunk() {
            Ok((text, true)) => TokenKind::TemplateHead(text.into()),
            Ok((text, false)) => TokenKind::NoSubstitutionTemplate(text.into()),
            Err(error) => error,
        }
    }

    /// Continue a template literal after the `}` closing a substitution.
    ///
    /// `start` is the offset of that `}`.
    pub fn continue_template(&mut self, start: u32) -> Token {
        let kind = match self.scan_template_chunk() {
            Ok((text, true)) => TokenKind::TemplateMiddle(text.into()),
            Ok((text, false)) => TokenKind::TemplateTail(text.into()),
            Err(error) => error,
        };
        Token::new(kind, Span::new(start, self.pos))
    }

    /// Finish a regular expression literal whose opening `/` (or `/=`)
    /// has already been returned as a token starting at `start`.
    pub fn continue_regex(&mut self, start: u32) -> Token {
        let mut in_class = false;
        let kind = loop {
            match self.advance() {
                None | Some('\n') => break TokenKind::Error("unterminated regular expression".into()),
                Some('\\') => {
                    self.advance();
                }
                Some('[') => in_class = true,
                Some(']') => in_class = false,
                Some('/') if !in_class => break TokenKind::RegExp,
                Some(_) => {}
            }
        };
        while self.peek().is_some_and(is_identifier_part) {
            self.advance();
        }
        Token::new(kind, Span::new(start, self.pos))
    }
}

fn is_identifier_start(c: char) -> bool {
    c == '_' || c == '$' || c.is_alphabetic()
}

fn is_identifier_part(c: char) -> bool {
    c == '_' || c == '$' || c.is_alphanumeric()
}

/// Check that `name` is a single identifier that is not a reserved word
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(is_identifier_start)
        && chars.all(is_identifier_part)
        && keyword_from_str(name).is_none()
}
