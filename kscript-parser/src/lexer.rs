// kscript-parser - Lexer for kerboscript
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Longest-match lexer (tokeniser) for kerboscript source code.
//!
//! Every token type has a matcher that reports how many bytes of the
//! remaining input it would consume. The lexer picks the longest match among
//! the expected types and breaks ties by [`TokenType`] declaration order.
//! Whitespace and line comments are consumed on the way and attached to the
//! next real token as its `skipped` list.

use std::rc::Rc;

use log::trace;

use crate::token::{KEYWORDS, Token, TokenType};

/// Converts source text into tokens on demand.
///
/// The lexer never fails. Input that no pattern matches produces a one
/// character [`TokenType::Error`] token and the end of input produces
/// [`TokenType::Eof`]; the parser decides whether either is a problem.
pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    line: usize,
    file: Rc<str>,
}

impl<'a> Lexer<'a> {
    /// Create a lexer for `input`, reporting positions against `file`.
    pub fn new(input: &'a str, file: &str) -> Self {
        Lexer {
            input,
            pos: 0,
            line: 1,
            file: Rc::from(file),
        }
    }

    /// Override the file name and line number used for following tokens.
    pub fn set_position(&mut self, file: &str, line: usize) {
        self.file = Rc::from(file);
        self.line = line;
    }

    /// Peek at the next token without consuming it.
    ///
    /// `expected` restricts the candidate token types; an empty slice means
    /// the default set from [`TokenType::default_set`].
    pub fn look_ahead(&self, expected: &[TokenType]) -> Token {
        let candidates = if expected.is_empty() {
            TokenType::default_set()
        } else {
            expected
        };

        let mut pos = self.pos;
        let mut line = self.line;
        let mut skipped = Vec::new();

        loop {
            let rest = &self.input[pos..];
            if rest.is_empty() {
                let mut tok = self.make_token(TokenType::Eof, pos, pos, line);
                tok.skipped = skipped;
                return tok;
            }

            // Skip-list types always take part, whatever was asked for.
            let skip = [TokenType::Whitespace, TokenType::CommentLine];
            let best = best_match(candidates.iter().chain(skip.iter()).copied(), rest);

            let (kind, len) = match best {
                Some(found) => found,
                None => {
                    let width = rest.chars().next().map(char::len_utf8).unwrap_or(1);
                    (TokenType::Error, width)
                }
            };

            let tok = self.make_token(kind, pos, pos + len, line);
            if kind.is_skipped() {
                line += count_newlines(&tok.text);
                pos += len;
                skipped.push(tok);
                continue;
            }

            let mut tok = tok;
            tok.skipped = skipped;
            return tok;
        }
    }

    /// Consume and return the next token.
    pub fn scan(&mut self, expected: &[TokenType]) -> Token {
        let tok = self.look_ahead(expected);
        self.pos = tok.end;
        self.line = tok.line + count_newlines(&tok.text);
        self.file = tok.file.clone();
        trace!(
            "scanned {:?} {:?} at {}:{}",
            tok.kind, tok.text, tok.line, tok.column
        );
        tok
    }

    /// Consume the next token from the default set.
    pub fn next_token(&mut self) -> Token {
        self.scan(&[])
    }

    /// Collect all remaining tokens (excluding the final EOF).
    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            if token.kind == TokenType::Eof {
                break;
            }
            tokens.push(token);
        }
        tokens
    }

    /// Current line number (1-indexed).
    pub fn line(&self) -> usize {
        self.line
    }

    /// Byte offset of the next unconsumed character.
    pub fn position(&self) -> usize {
        self.pos
    }

    // ========================================================================
    // Internal helpers
    // ========================================================================

    fn make_token(&self, kind: TokenType, start: usize, end: usize, line: usize) -> Token {
        let line_start = self.input[..start].rfind('\n').map(|i| i + 1).unwrap_or(0);
        let column = self.input[line_start..start].chars().count() + 1;
        Token {
            kind,
            text: self.input[start..end].to_string(),
            file: self.file.clone(),
            line,
            column,
            start,
            end,
            skipped: Vec::new(),
        }
    }
}

/// Pick the longest match, preferring the earlier-declared type on a tie.
fn best_match(
    candidates: impl Iterator<Item = TokenType>,
    rest: &str,
) -> Option<(TokenType, usize)> {
    let mut best: Option<(TokenType, usize)> = None;
    for kind in candidates {
        let Some(len) = match_len(kind, rest) else {
            continue;
        };
        if len == 0 {
            continue;
        }
        best = match best {
            Some((b_kind, b_len)) if b_len > len || (b_len == len && b_kind < kind) => {
                Some((b_kind, b_len))
            }
            _ => Some((kind, len)),
        };
    }
    best
}

fn count_newlines(text: &str) -> usize {
    text.bytes().filter(|&b| b == b'\n').count()
}

/// Length in bytes of the match of `kind` at the start of `rest`, if any.
pub(crate) fn match_len(kind: TokenType, rest: &str) -> Option<usize> {
    let bytes = rest.as_bytes();
    let first = *bytes.first()?;
    match kind {
        TokenType::PlusMinus => matches!(first, b'+' | b'-').then_some(1),
        TokenType::Mult => (first == b'*').then_some(1),
        TokenType::Div => (first == b'/').then_some(1),
        TokenType::Power => (first == b'^').then_some(1),
        TokenType::TrueFalse => match_word(rest, "true").or_else(|| match_word(rest, "false")),
        TokenType::Comparator => ["<>", ">=", "<=", "=", ">", "<"]
            .iter()
            .find(|op| rest.starts_with(*op))
            .map(|op| op.len()),
        TokenType::BracketOpen => (first == b'(').then_some(1),
        TokenType::BracketClose => (first == b')').then_some(1),
        TokenType::CurlyOpen => (first == b'{').then_some(1),
        TokenType::CurlyClose => (first == b'}').then_some(1),
        TokenType::SquareOpen => (first == b'[').then_some(1),
        TokenType::SquareClose => (first == b']').then_some(1),
        TokenType::Comma => (first == b',').then_some(1),
        TokenType::Colon => (first == b':').then_some(1),
        TokenType::ArrayIndex => (first == b'#').then_some(1),
        TokenType::AtSign => (first == b'@').then_some(1),
        TokenType::Eoi => (first == b'.').then_some(1),
        TokenType::Identifier => match_identifier(rest),
        TokenType::FileIdent => match_file_ident(rest),
        TokenType::E => match_exponent(bytes),
        TokenType::Integer => match_digits(bytes),
        TokenType::Double => match_double(bytes),
        TokenType::String => match_string(rest),
        TokenType::Whitespace => {
            let len: usize = rest
                .chars()
                .take_while(|c| c.is_whitespace())
                .map(char::len_utf8)
                .sum();
            (len > 0).then_some(len)
        }
        TokenType::CommentLine => {
            if !rest.starts_with("//") {
                return None;
            }
            Some(rest.find('\n').map(|i| i + 1).unwrap_or(rest.len()))
        }
        TokenType::Eof | TokenType::Error => None,
        keyword => {
            let word = KEYWORDS.iter().find(|(ty, _)| *ty == keyword)?.1;
            match_word(rest, word)
        }
    }
}

fn match_word(rest: &str, word: &str) -> Option<usize> {
    let head = rest.get(..word.len())?;
    head.eq_ignore_ascii_case(word).then_some(word.len())
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

fn is_ident_char(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

fn match_identifier(rest: &str) -> Option<usize> {
    let mut chars = rest.chars();
    let first = chars.next()?;
    if !is_ident_start(first) {
        return None;
    }
    let tail: usize = chars
        .take_while(|c| is_ident_char(*c))
        .map(char::len_utf8)
        .sum();
    Some(first.len_utf8() + tail)
}

/// An identifier followed by at least one `.identifier` segment.
fn match_file_ident(rest: &str) -> Option<usize> {
    let mut len = match_identifier(rest)?;
    let mut segments = 0;
    while rest[len..].starts_with('.') {
        match match_identifier(&rest[len + 1..]) {
            Some(seg) => {
                len += 1 + seg;
                segments += 1;
            }
            None => break,
        }
    }
    (segments > 0).then_some(len)
}

/// `e` or `E` that is really followed by an exponent value.
fn match_exponent(bytes: &[u8]) -> Option<usize> {
    if !matches!(bytes.first(), Some(b'e' | b'E')) {
        return None;
    }
    let digit_at = if matches!(bytes.get(1), Some(b'+' | b'-')) {
        2
    } else {
        1
    };
    bytes
        .get(digit_at)
        .filter(|b| b.is_ascii_digit())
        .map(|_| 1)
}

fn match_digits(bytes: &[u8]) -> Option<usize> {
    let len = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
    (len > 0).then_some(len)
}

fn match_double(bytes: &[u8]) -> Option<usize> {
    let int_len = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
    if bytes.get(int_len) != Some(&b'.') {
        return None;
    }
    let frac_len = match_digits(&bytes[int_len + 1..])?;
    Some(int_len + 1 + frac_len)
}

/// A double-quoted string; `""` inside stands for one quote character.
fn match_string(rest: &str) -> Option<usize> {
    let bytes = rest.as_bytes();
    if bytes.first() != Some(&b'"') {
        return None;
    }
    let mut i = 1;
    while i < bytes.len() {
        if bytes[i] == b'"' {
            if bytes.get(i + 1) == Some(&b'"') {
                i += 2;
                continue;
            }
            return Some(i + 1);
        }
        i += 1;
    }
    None
}
