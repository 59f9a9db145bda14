// kscript-compiler - Compile errors for kerboscript
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Error types for the compiler and the script facade.

use std::fmt;

use kscript_parser::{NodeId, ParseError, ParseTree};

/// What went wrong during compilation.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
    /// PRESERVE used outside a trigger body.
    PreserveOutsideTrigger,
    /// BREAK used outside a loop.
    BreakOutsideLoop,
    /// RETURN used outside a function.
    ReturnOutsideFunction,
    /// DECLARE GLOBAL PARAMETER.
    GlobalParameter,
    /// A parameter without a default after one with a default.
    MandatoryAfterDefaulted,
    /// @LAZYGLOBAL after the first statement or inside a block.
    MisplacedLazyGlobal,
    /// A directive other than @LAZYGLOBAL.
    UnknownDirective(String),
    /// A parse node the code generator has no rule for.
    UnknownNode(String),
    /// A suffix segment that is not an identifier.
    InvalidSuffix(String),
    /// A numeric literal that does not fit any number type.
    InvalidNumber(String),
    /// DEFINED applied to something other than a name.
    InvalidDefined(String),
    /// Declaring a name owned by a built-in function or bound variable.
    ClobberBuiltin(String),
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::PreserveOutsideTrigger => {
                write!(f, "PRESERVE can only be used inside a trigger body")
            }
            ErrorKind::BreakOutsideLoop => write!(f, "BREAK can only be used inside a loop"),
            ErrorKind::ReturnOutsideFunction => {
                write!(f, "RETURN can only be used inside a function")
            }
            ErrorKind::GlobalParameter => write!(f, "a parameter cannot be GLOBAL"),
            ErrorKind::MandatoryAfterDefaulted => {
                write!(f, "defaulted parameter before mandatory parameter")
            }
            ErrorKind::MisplacedLazyGlobal => write!(
                f,
                "@LAZYGLOBAL must come before any statement and outside any block"
            ),
            ErrorKind::UnknownDirective(name) => write!(f, "unknown directive @{}", name),
            ErrorKind::UnknownNode(kind) => write!(f, "cannot compile {}", kind),
            ErrorKind::InvalidSuffix(text) => {
                write!(f, "'{}' is not a valid suffix name", text)
            }
            ErrorKind::InvalidNumber(text) => write!(f, "invalid number '{}'", text),
            ErrorKind::InvalidDefined(text) => {
                write!(f, "DEFINED needs a variable name, found '{}'", text)
            }
            ErrorKind::ClobberBuiltin(name) => write!(
                f,
                "'{}' is a built-in name and cannot be redefined",
                name
            ),
        }
    }
}

/// A compile error at a source position.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileError {
    pub kind: ErrorKind,
    pub line: u32,
    pub column: u32,
}

impl CompileError {
    pub fn new(kind: ErrorKind, line: u32, column: u32) -> Self {
        CompileError { kind, line, column }
    }

    /// Error positioned at the leftmost token of `node`.
    ///
    /// `start_line` is the line the script text starts at in its file.
    pub fn at_node(kind: ErrorKind, tree: &ParseTree, node: NodeId, start_line: u32) -> Self {
        let (line, column) = node_position(tree, node, start_line);
        CompileError { kind, line, column }
    }

    /// Render the error against the script text it came from.
    pub fn render(&self, src: &str, path: Option<&str>) -> String {
        render_at("compile error", &self.kind.to_string(), self.line, self.column, src, path)
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}:{}", self.kind, self.line, self.column)
    }
}

impl std::error::Error for CompileError {}

/// Result type for compilation.
pub type Result<T> = std::result::Result<T, CompileError>;

/// Any error the script facade can report.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptError {
    Parse(ParseError),
    Compile(CompileError),
}

impl ScriptError {
    pub fn line(&self) -> usize {
        match self {
            ScriptError::Parse(e) => e.line,
            ScriptError::Compile(e) => e.line as usize,
        }
    }

    pub fn render(&self, src: &str, path: Option<&str>) -> String {
        match self {
            ScriptError::Parse(e) => render_at(
                "parse error",
                &e.message,
                e.line as u32,
                e.column as u32,
                src,
                path,
            ),
            ScriptError::Compile(e) => e.render(src, path),
        }
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptError::Parse(e) => write!(f, "{}", e),
            ScriptError::Compile(e) => write!(f, "Compile error: {}", e),
        }
    }
}

impl std::error::Error for ScriptError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScriptError::Parse(e) => Some(e),
            ScriptError::Compile(e) => Some(e),
        }
    }
}

impl From<ParseError> for ScriptError {
    fn from(e: ParseError) -> Self {
        ScriptError::Parse(e)
    }
}

impl From<CompileError> for ScriptError {
    fn from(e: CompileError) -> Self {
        ScriptError::Compile(e)
    }
}

/// Source line and column of the leftmost token under `node`.
pub(crate) fn node_position(tree: &ParseTree, node: NodeId, start_line: u32) -> (u32, u32) {
    match tree.first_token(node) {
        Some(tok) => (
            (tok.line as u32 + start_line).saturating_sub(1),
            tok.column as u32,
        ),
        None => (0, 0),
    }
}

// ============================================================================
// Internal helpers
// ============================================================================

fn render_at(
    kind: &str,
    message: &str,
    line: u32,
    column: u32,
    src: &str,
    path: Option<&str>,
) -> String {
    let loc = match path {
        Some(p) => format!("{}:{}:{}", p, line, column),
        None => format!("{}:{}", line, column),
    };
    let mut out = format!("{}: {}\n --> {}", kind, message, loc);

    let src_line = (line as usize)
        .checked_sub(1)
        .and_then(|idx| src.lines().nth(idx));
    if let Some(text) = src_line {
        let pad = " ".repeat(column.saturating_sub(1) as usize);
        out.push_str(&format!("\n{}\n{}^", text, pad));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_points_at_column() {
        let err = CompileError::new(ErrorKind::BreakOutsideLoop, 2, 3);
        let text = err.render("print 1.\n  break.\n", Some("boot.ks"));
        assert_eq!(
            text,
            "compile error: BREAK can only be used inside a loop\n --> boot.ks:2:3\n  break.\n  ^"
        );
    }

    #[test]
    fn test_render_without_source_line() {
        let err = CompileError::new(ErrorKind::GlobalParameter, 9, 1);
        let text = err.render("", None);
        assert_eq!(text, "compile error: a parameter cannot be GLOBAL\n --> 9:1");
    }

    #[test]
    fn test_script_error_from_parse() {
        let parse = ParseError {
            message: "Unexpected '}' (expected a statement)".into(),
            file: "x.ks".into(),
            line: 1,
            column: 1,
        };
        let err: ScriptError = parse.into();
        assert_eq!(err.line(), 1);
        assert!(err.render("}", Some("x.ks")).starts_with("parse error: Unexpected"));
    }
}
