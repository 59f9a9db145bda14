// kscript-compiler - Bytecode compiler for kerboscript
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Compiles kerboscript parse trees into labeled stack-machine code.
//!
//! The entry point for most callers is [`Script`], which parses, compiles and
//! hands back [`CodePart`]s in load order. Branch targets stay symbolic;
//! resolving labels to addresses is the job of whatever loads the parts.

pub mod code_part;
pub mod compiler;
pub mod context;
pub mod error;
pub mod expr;
pub mod opcode;
pub mod options;
pub mod scope;
pub mod script;
pub mod symbols;

pub use code_part::CodePart;
pub use compiler::{Compiler, compile_tree};
pub use context::Context;
pub use error::{CompileError, ErrorKind, Result, ScriptError};
pub use opcode::{Instruction, OpCode, Value};
pub use options::{BindingLookup, BuiltinNames, CompilerOptions, FunctionLookup};
pub use script::Script;
