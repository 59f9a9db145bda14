// kscript-compiler - Script facade for kerboscript
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! The `Script` struct - main entry point for compiling kerboscript.

use indexmap::IndexMap;
use log::{debug, warn};

use kscript_parser::parse_program;

use crate::code_part::CodePart;
use crate::compiler::compile_tree;
use crate::context::Context;
use crate::error::ScriptError;
use crate::options::CompilerOptions;

/// Compiles kerboscript source into code parts.
///
/// A `Script` keeps named [`Context`]s alive between compiles, so a
/// program compiled in several pieces (an interactive session, a file
/// compiled line by line) can refer back to the functions, locks and
/// triggers of earlier pieces.
///
/// # Example
///
/// ```rust
/// use kscript_compiler::{CompilerOptions, Script};
///
/// let mut script = Script::new();
/// let options = CompilerOptions::standard();
/// let parts = script
///     .compile("boot.ks", 1, "print \"hello\".", "", &options)
///     .unwrap();
/// assert_eq!(parts.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct Script {
    contexts: IndexMap<String, Context>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile `source` and return the code parts it produced.
    ///
    /// `start_line` is the line of `file` the text starts at. An empty
    /// `context_id` compiles into a throwaway context; any other id
    /// compiles into the context of that name, creating it on first use.
    ///
    /// Parts come out in load order: new functions and locks, new triggers,
    /// new subprogram trampolines, then the main part.
    ///
    /// # Errors
    ///
    /// Returns the first parse or compile error. A failed compile leaves the
    /// named context as it was before the call.
    pub fn compile(
        &mut self,
        file: &str,
        start_line: u32,
        source: &str,
        context_id: &str,
        options: &CompilerOptions,
    ) -> Result<Vec<CodePart>, ScriptError> {
        let tree = parse_program(source, file).map_err(|mut e| {
            e.line = (e.line + start_line as usize).saturating_sub(1);
            ScriptError::Parse(e)
        })?;

        let mut scratch = Context::new();
        let ctx = if context_id.is_empty() {
            &mut scratch
        } else {
            self.contexts.entry(context_id.to_string()).or_default()
        };
        debug!(
            "compiling {} into {}",
            file,
            if context_id.is_empty() { "<fresh>" } else { context_id }
        );

        let snapshot = ctx.clone();
        let main = match compile_tree(ctx, options, tree, file, start_line) {
            Ok(main) => main,
            Err(e) => {
                *ctx = snapshot;
                return Err(e.into());
            }
        };

        let mut parts = ctx.user_functions.take_new_parts(file);
        parts.extend(ctx.triggers.take_new_parts(file));
        parts.extend(ctx.subprograms.take_new_parts(file));
        parts.push(main);
        Ok(parts)
    }

    /// Forget the context named `context_id`.
    pub fn clear_context(&mut self, context_id: &str) {
        if self.contexts.shift_remove(context_id).is_none() {
            warn!("no context named {}", context_id);
        }
    }

    /// The context named `context_id`, if any compile created it.
    pub fn context(&self, context_id: &str) -> Option<&Context> {
        self.contexts.get(context_id)
    }

    /// Whether `text` is a complete command: every brace and parenthesis
    /// closed, not counting those inside strings or `//` comments.
    pub fn is_command_complete(text: &str) -> bool {
        let mut depth: i32 = 0;
        for line in text.lines() {
            let mut in_string = false;
            let mut chars = line.chars().peekable();
            while let Some(ch) = chars.next() {
                match ch {
                    '"' => in_string = !in_string,
                    _ if in_string => {}
                    '/' if chars.peek() == Some(&'/') => break,
                    '{' | '(' => depth += 1,
                    '}' | ')' => depth -= 1,
                    _ => {}
                }
            }
        }
        depth <= 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_complete() {
        assert!(Script::is_command_complete("print 1."));
        assert!(!Script::is_command_complete("if x {"));
        assert!(Script::is_command_complete("if x {\n print 1.\n}"));
        assert!(Script::is_command_complete("print \"{\"."));
        assert!(Script::is_command_complete("print 1. // {"));
        assert!(!Script::is_command_complete("print max(1,"));
    }

    #[test]
    fn test_named_context_persists() {
        let mut script = Script::new();
        let options = CompilerOptions::new();
        script
            .compile("a.ks", 1, "function f { return 1. }", "repl", &options)
            .unwrap();
        let ctx = script.context("repl").unwrap();
        assert!(ctx.user_functions.contains("f", 0));

        script.clear_context("repl");
        assert!(script.context("repl").is_none());
    }

    #[test]
    fn test_fresh_context_is_not_kept() {
        let mut script = Script::new();
        script
            .compile("a.ks", 1, "print 1.", "", &CompilerOptions::new())
            .unwrap();
        assert!(script.context("").is_none());
    }

    #[test]
    fn test_parse_error_line_is_offset() {
        let mut script = Script::new();
        let err = script
            .compile("a.ks", 10, "print 1.\nprint (.", "", &CompilerOptions::new())
            .unwrap_err();
        assert!(matches!(err, ScriptError::Parse(_)));
        assert_eq!(err.line(), 11);
    }

    #[test]
    fn test_failed_compile_rolls_back() {
        let mut script = Script::new();
        let options = CompilerOptions::new();
        script.compile("a.ks", 1, "print 1.", "s", &options).unwrap();
        let labels = script.context("s").unwrap().label_count();
        let err = script
            .compile("a.ks", 1, "function g { print 2. } break.", "s", &options)
            .unwrap_err();
        assert!(matches!(err, ScriptError::Compile(_)));
        let ctx = script.context("s").unwrap();
        assert_eq!(ctx.label_count(), labels);
        assert!(!ctx.user_functions.contains("g", 0));
    }
}
