//! Token Types
//!
//! Token definitions shared by the expression parser and the server-script
//! identifier scan.

/// Source span (byte offsets)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Slice of `source` covered by this span
    pub fn text(self, source: &str) -> &str {
        source
            .get(self.start as usize..self.end as usize)
            .unwrap_or_default()
    }
}

/// Token with kind and span
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Token kinds
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    Number(f64),
    String(Box<str>),
    Boolean(bool),
    Null,
    Undefined,

    Identifier(Box<str>),

    // Reserved words
    Await,
    Break,
    Case,
    Catch,
    Class,
    Const,
    Continue,
    Debugger,
    Default,
    Delete,
    Do,
    Else,
    Enum,
    Export,
    Extends,
    Finally,
    For,
    Function,
    If,
    Import,
    In,
    Instanceof,
    Let,
    New,
    Return,
    Static,
    Super,
    Switch,
    This,
    Throw,
    Try,
    Typeof,
    Var,
    Void,
    While,
    With,
    Yield,

    // Punctuators
    LBrace,           // {
    RBrace,           // }
    LParen,           // (
    RParen,           // )
    LBracket,         // [
    RBracket,         // ]
    Dot,              // .
    DotDotDot,        // ...
    Semicolon,        // ;
    Comma,            // ,
    Colon,            // :
    Question,         // ?
    QuestionDot,      // ?.
    QuestionQuestion, // ??
    Arrow,            // =>
    Hash,             // #

    // Operators
    Plus,               // +
    Minus,              // -
    Star,               // *
    StarStar,           // **
    Slash,              // /
    Percent,            // %
    PlusPlus,           // ++
    MinusMinus,         // --
    LessThan,           // <
    LessThanEq,         // <=
    GreaterThan,        // >
    GreaterThanEq,      // >=
    EqEq,               // ==
    NotEq,              // !=
    EqEqEq,             // ===
    NotEqEq,            // !==
    Ampersand,          // &
    Pipe,               // |
    Caret,              // ^
    Tilde,              // ~
    AmpersandAmpersand, // &&
    PipePipe,           // ||
    Bang,               // !
    LShift,             // <<
    RShift,             // >>
    URShift,            // >>>

    // Assignment
    Eq,        // =
    CompoundEq, // += -= *= and friends

    // Template literals
    TemplateHead(Box<str>),
    TemplateMiddle(Box<str>),
    TemplateTail(Box<str>),
    NoSubstitutionTemplate(Box<str>),

    // Server scripts only
    RegExp, // /body/flags

    // Special
    Eof,
    Error(Box<str>),
}

impl TokenKind {
    /// Whether a `/` following this token opens a regular expression
    /// literal rather than dividing
    pub fn allows_regex(&self) -> bool {
        !matches!(
            self,
            TokenKind::Number(_)
                | TokenKind::String(_)
                | TokenKind::Boolean(_)
                | TokenKind::Null
                | TokenKind::Undefined
                | TokenKind::Identifier(_)
                | TokenKind::This
                | TokenKind::Super
                | TokenKind::RParen
                | TokenKind::RBracket
                | TokenKind::PlusPlus
                | TokenKind::MinusMinus
                | TokenKind::TemplateTail(_)
                | TokenKind::NoSubstitutionTemplate(_)
                | TokenKind::RegExp
        )
    }

    /// Binary operator precedence (higher = binds tighter), 0 if not binary
    pub fn precedence(&self) -> u8 {
        match self {
            TokenKind::PipePipe | TokenKind::QuestionQuestion => 4,
            TokenKind::AmpersandAmpersand => 5,
            TokenKind::Pipe => 6,
            TokenKind::Caret => 7,
            TokenKind::Ampersand => 8,
            TokenKind::EqEq | TokenKind::NotEq | TokenKind::EqEqEq | TokenKind::NotEqEq => 9,
            TokenKind::LessThan
            | TokenKind::LessThanEq
            | TokenKind::GreaterThan
            | TokenKind::GreaterThanEq
            | TokenKind::In
            | TokenKind::Instanceof => 10,
            TokenKind::LShift | TokenKind::RShift | TokenKind::URShift => 11,
            TokenKind::Plus | TokenKind::Minus => 12,
            TokenKind::Star | TokenKind::Slash | TokenKind::Percent => 13,
            TokenKind::StarStar => 14,
            _ => 0,
        }
    }

    /// Source spelling of a word-like token, usable as a property name
    /// after `.` (`a.default`, `list.new`).
    pub fn property_name(&self) -> Option<&str> {
        match self {
            TokenKind::Identifier(name) => Some(name),
            TokenKind::Boolean(true) => Some("true"),
            TokenKind::Boolean(false) => Some("false"),
            TokenKind::Null => Some("null"),
            TokenKind::Undefined => Some("undefined"),
            _ => KEYWORDS
                .iter()
                .find(|(_, kind)| kind == self)
                .map(|(word, _)| *word),
        }
    }
}

const KEYWORDS: &[(&str, TokenKind)] = &[
    ("await", TokenKind::Await),
    ("break", TokenKind::Break),
    ("case", TokenKind::Case),
    ("catch", TokenKind::Catch),
    ("class", TokenKind::Class),
    ("const", TokenKind::Const),
    ("continue", TokenKind::Continue),
    ("debugger", TokenKind::Debugger),
    ("default", TokenKind::Default),
    ("delete", TokenKind::Delete),
    ("do", TokenKind::Do),
    ("else", TokenKind::Else),
    ("enum", TokenKind::Enum),
    ("export", TokenKind::Export),
    ("extends", TokenKind::Extends),
    ("finally", TokenKind::Finally),
    ("for", TokenKind::For),
    ("function", TokenKind::Function),
    ("if", TokenKind::If),
    ("import", TokenKind::Import),
    ("in", TokenKind::In),
    ("instanceof", TokenKind::Instanceof),
    ("let", TokenKind::Let),
    ("new", TokenKind::New),
    ("return", TokenKind::Return),
    ("static", TokenKind::Static),
    ("super", TokenKind::Super),
    ("switch", TokenKind::Switch),
    ("this", TokenKind::This),
    ("throw", TokenKind::Throw),
    ("try", TokenKind::Try),
    ("typeof", TokenKind::Typeof),
    ("var", TokenKind::Var),
    ("void", TokenKind::Void),
    ("while", TokenKind::While),
    ("with", TokenKind::With),
    ("yield", TokenKind::Yield),
];

/// Keywords lookup table
pub fn keyword_from_str(s: &str) -> Option<TokenKind> {
    match s {
        "true" => Some(TokenKind::Boolean(true)),
        "false" => Some(TokenKind::Boolean(false)),
        "null" => Some(TokenKind::Null),
        "undefined" => Some(TokenKind::Undefined),
        _ => KEYWORDS
            .iter()
            .find(|(word, _)| *word == s)
            .map(|(_, kind)| kind.clone()),
    }
}
