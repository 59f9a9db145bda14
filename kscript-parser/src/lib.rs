// kscript-parser - Lexer and parser for kerboscript
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! # kscript-parser
//!
//! Tokenizer and parser for kerboscript, the scripting language of the kOS
//! autopilot. Produces an arena [`ParseTree`] that the compiler walks.

pub mod lexer;
pub mod parser;
pub mod token;
pub mod tree;

pub use lexer::Lexer;
pub use parser::{ParseError, Parser, parse_program};
pub use token::{Token, TokenType};
pub use tree::{Ancestors, NodeId, NodeKind, ParseNode, ParseTree};
