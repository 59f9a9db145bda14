// kscript-parser - Tokens for kerboscript
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Token types and the token record produced by the lexer.

use std::fmt;
use std::rc::Rc;

/// Every kind of token the lexer can produce.
///
/// Declaration order doubles as the tie-break priority: when two token types
/// match the same number of characters, the one declared first wins. Keywords
/// therefore sit ahead of `Identifier`, and `E` sits behind it so a lone `e`
/// is an identifier unless the parser explicitly asks for an exponent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TokenType {
    // =========================================================================
    // Operators
    // =========================================================================
    PlusMinus,
    Mult,
    Div,
    Power,
    Not,
    And,
    Or,
    TrueFalse,
    Comparator,

    // =========================================================================
    // Keywords
    // =========================================================================
    Set,
    To,
    Is,
    If,
    Else,
    Until,
    Step,
    Do,
    Lock,
    Unlock,
    Print,
    At,
    On,
    Toggle,
    Wait,
    When,
    Then,
    Off,
    Stage,
    ClearScreen,
    Add,
    Remove,
    Log,
    Break,
    Preserve,
    Declare,
    Defined,
    Local,
    Global,
    Parameter,
    Function,
    Return,
    Switch,
    Copy,
    From,
    Rename,
    Volume,
    File,
    Delete,
    Edit,
    Run,
    Once,
    Compile,
    List,
    Reboot,
    Shutdown,
    For,
    Unset,
    In,
    All,

    // =========================================================================
    // Punctuation
    // =========================================================================
    BracketOpen,
    BracketClose,
    CurlyOpen,
    CurlyClose,
    SquareOpen,
    SquareClose,
    Comma,
    Colon,
    ArrayIndex,
    AtSign,

    // =========================================================================
    // Literals and names
    // =========================================================================
    Identifier,
    FileIdent,
    E,
    Double,
    Integer,
    String,
    Eoi,

    // =========================================================================
    // Special
    // =========================================================================
    Eof,
    Whitespace,
    CommentLine,
    /// A single character no pattern matched.
    Error,
}

/// Keyword spellings, matched case-insensitively as prefixes.
pub(crate) const KEYWORDS: &[(TokenType, &str)] = &[
    (TokenType::Not, "not"),
    (TokenType::And, "and"),
    (TokenType::Or, "or"),
    (TokenType::Set, "set"),
    (TokenType::To, "to"),
    (TokenType::Is, "is"),
    (TokenType::If, "if"),
    (TokenType::Else, "else"),
    (TokenType::Until, "until"),
    (TokenType::Step, "step"),
    (TokenType::Do, "do"),
    (TokenType::Lock, "lock"),
    (TokenType::Unlock, "unlock"),
    (TokenType::Print, "print"),
    (TokenType::At, "at"),
    (TokenType::On, "on"),
    (TokenType::Toggle, "toggle"),
    (TokenType::Wait, "wait"),
    (TokenType::When, "when"),
    (TokenType::Then, "then"),
    (TokenType::Off, "off"),
    (TokenType::Stage, "stage"),
    (TokenType::ClearScreen, "clearscreen"),
    (TokenType::Add, "add"),
    (TokenType::Remove, "remove"),
    (TokenType::Log, "log"),
    (TokenType::Break, "break"),
    (TokenType::Preserve, "preserve"),
    (TokenType::Declare, "declare"),
    (TokenType::Defined, "defined"),
    (TokenType::Local, "local"),
    (TokenType::Global, "global"),
    (TokenType::Parameter, "parameter"),
    (TokenType::Function, "function"),
    (TokenType::Return, "return"),
    (TokenType::Switch, "switch"),
    (TokenType::Copy, "copy"),
    (TokenType::From, "from"),
    (TokenType::Rename, "rename"),
    (TokenType::Volume, "volume"),
    (TokenType::File, "file"),
    (TokenType::Delete, "delete"),
    (TokenType::Edit, "edit"),
    (TokenType::Run, "run"),
    (TokenType::Once, "once"),
    (TokenType::Compile, "compile"),
    (TokenType::List, "list"),
    (TokenType::Reboot, "reboot"),
    (TokenType::Shutdown, "shutdown"),
    (TokenType::For, "for"),
    (TokenType::Unset, "unset"),
    (TokenType::In, "in"),
    (TokenType::All, "all"),
];

impl TokenType {
    /// Token types scanned when the parser does not restrict the expected set.
    ///
    /// `FileIdent` and `E` are excluded: both would swallow ordinary
    /// identifiers and are only requested in the positions that need them.
    pub fn default_set() -> &'static [TokenType] {
        use TokenType::*;
        &[
            PlusMinus, Mult, Div, Power, Not, And, Or, TrueFalse, Comparator, Set, To, Is, If,
            Else, Until, Step, Do, Lock, Unlock, Print, At, On, Toggle, Wait, When, Then, Off,
            Stage, ClearScreen, Add, Remove, Log, Break, Preserve, Declare, Defined, Local,
            Global, Parameter, Function, Return, Switch, Copy, From, Rename, Volume, File,
            Delete, Edit, Run, Once, Compile, List, Reboot, Shutdown, For, Unset, In, All,
            BracketOpen, BracketClose, CurlyOpen, CurlyClose, SquareOpen, SquareClose, Comma,
            Colon, ArrayIndex, AtSign, Identifier, Double, Integer, String, Eoi,
        ]
    }

    /// Token types that are consumed silently between real tokens.
    pub fn is_skipped(self) -> bool {
        matches!(self, TokenType::Whitespace | TokenType::CommentLine)
    }

    /// Whether this token type is a reserved word.
    pub fn is_keyword(self) -> bool {
        KEYWORDS.iter().any(|(ty, _)| *ty == self)
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenType::PlusMinus => "'+' or '-'",
            TokenType::Mult => "'*'",
            TokenType::Div => "'/'",
            TokenType::Power => "'^'",
            TokenType::TrueFalse => "true/false",
            TokenType::Comparator => "comparison operator",
            TokenType::BracketOpen => "'('",
            TokenType::BracketClose => "')'",
            TokenType::CurlyOpen => "'{'",
            TokenType::CurlyClose => "'}'",
            TokenType::SquareOpen => "'['",
            TokenType::SquareClose => "']'",
            TokenType::Comma => "','",
            TokenType::Colon => "':'",
            TokenType::ArrayIndex => "'#'",
            TokenType::AtSign => "'@'",
            TokenType::Identifier => "identifier",
            TokenType::FileIdent => "file name",
            TokenType::E => "exponent",
            TokenType::Double => "number",
            TokenType::Integer => "integer",
            TokenType::String => "string",
            TokenType::Eoi => "'.'",
            TokenType::Eof => "end of input",
            TokenType::Whitespace => "whitespace",
            TokenType::CommentLine => "comment",
            TokenType::Error => "unrecognised character",
            keyword => {
                let word = KEYWORDS
                    .iter()
                    .find(|(ty, _)| ty == keyword)
                    .map(|(_, w)| *w)
                    .unwrap_or("keyword");
                return write!(f, "'{}'", word.to_uppercase());
            }
        };
        write!(f, "{}", text)
    }
}

/// A token with its source position.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenType,
    /// Exact source text of the token.
    pub text: String,
    /// File the token came from.
    pub file: Rc<str>,
    /// Line number (1-indexed).
    pub line: usize,
    /// Column number (1-indexed).
    pub column: usize,
    /// Byte offset of the first character.
    pub start: usize,
    /// Byte offset one past the last character.
    pub end: usize,
    /// Whitespace and comments consumed immediately before this token.
    pub skipped: Vec<Token>,
}

impl Token {
    /// True if the token's text equals `word`, ignoring ASCII case.
    pub fn is_word(&self, word: &str) -> bool {
        self.text.eq_ignore_ascii_case(word)
    }

    /// True if something was skipped between the previous token and this one.
    pub fn follows_gap(&self) -> bool {
        !self.skipped.is_empty()
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenType::Eof => write!(f, "end of input"),
            _ => write!(f, "'{}'", self.text),
        }
    }
}
