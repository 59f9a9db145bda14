// kscript-compiler - Common test utilities
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Shared helpers for compiler integration tests.
//!
//! # Usage
//!
//! In your test file, add:
//! ```ignore
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

pub use kscript_compiler::{
    CodePart, CompilerOptions, ErrorKind, Instruction, OpCode, Script, ScriptError, Value,
};

/// Compile `src` into a fresh context with default options.
pub fn compile(src: &str) -> Vec<CodePart> {
    compile_with(src, &CompilerOptions::new())
}

/// Compile `src` into a fresh context.
pub fn compile_with(src: &str, options: &CompilerOptions) -> Vec<CodePart> {
    Script::new()
        .compile("test.ks", 1, src, "", options)
        .unwrap_or_else(|e| panic!("compile failed for {:?}: {}", src, e))
}

/// The compile error `src` produces.
pub fn compile_err(src: &str) -> kscript_compiler::CompileError {
    compile_err_with(src, &CompilerOptions::new())
}

pub fn compile_err_with(src: &str, options: &CompilerOptions) -> kscript_compiler::CompileError {
    match Script::new().compile("test.ks", 1, src, "", options) {
        Ok(_) => panic!("expected a compile error for {:?}", src),
        Err(ScriptError::Compile(e)) => e,
        Err(ScriptError::Parse(e)) => panic!("unexpected parse error for {:?}: {}", src, e),
    }
}

/// The main part, which always comes last.
pub fn main_part(parts: &[CodePart]) -> &CodePart {
    parts.last().expect("no parts")
}

/// Opcodes of the main section.
pub fn main_ops(src: &str) -> Vec<OpCode> {
    let parts = compile(src);
    main_part(&parts).main.iter().map(|i| i.op.clone()).collect()
}

/// Every instruction of every part, in part order.
pub fn all_instructions(parts: &[CodePart]) -> Vec<&Instruction> {
    parts.iter().flat_map(|p| p.instructions()).collect()
}

/// The instruction carrying `label` in any part.
pub fn find_label<'a>(parts: &'a [CodePart], label: &str) -> Option<&'a Instruction> {
    parts.iter().find_map(|p| p.find_label(label))
}

/// Position of the first instruction matching `pred`.
pub fn position(code: &[&Instruction], pred: impl Fn(&OpCode) -> bool) -> Option<usize> {
    code.iter().position(|i| pred(&i.op))
}
