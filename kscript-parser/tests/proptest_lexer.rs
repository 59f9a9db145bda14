// kscript-parser - Property-based tests for the lexer and parser
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Property-based tests for tokenizing and parsing.
//!
//! Tests the following properties:
//! - Token and skipped text together reproduce the input exactly
//! - Line numbers never go backwards
//! - Plain names lex as a single identifier
//! - The parser never panics, whatever the input

use kscript_parser::{Lexer, TokenType, parse_program};
use proptest::prelude::*;

// =============================================================================
// Strategies
// =============================================================================

/// Arbitrary text biased towards kerboscript punctuation.
fn arb_source() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            Just("set ".to_string()),
            Just("to ".to_string()),
            Just("print ".to_string()),
            Just("if ".to_string()),
            Just(". ".to_string()),
            Just("{".to_string()),
            Just("}".to_string()),
            Just("(".to_string()),
            Just(")".to_string()),
            Just("\"str\"".to_string()),
            Just("// note\n".to_string()),
            Just("\n".to_string()),
            "[a-z]{1,6}",
            "[0-9]{1,4}",
            "[ -~]",
        ],
        0..40,
    )
    .prop_map(|parts| parts.concat())
}

fn arb_name() -> impl Strategy<Value = String> {
    "[a-z_][a-z0-9_]{0,10}"
}

fn is_reserved(name: &str) -> bool {
    Lexer::new(name, "prop")
        .tokenize()
        .first()
        .map(|t| t.kind != TokenType::Identifier)
        .unwrap_or(true)
}

// =============================================================================
// Lexer properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Every byte of input ends up in exactly one token or skipped token.
    #[test]
    fn tokens_cover_input(src in arb_source()) {
        let mut lexer = Lexer::new(&src, "prop");
        let mut rebuilt = String::new();
        loop {
            let tok = lexer.next_token();
            for s in &tok.skipped {
                rebuilt.push_str(&s.text);
            }
            if tok.kind == TokenType::Eof {
                break;
            }
            rebuilt.push_str(&tok.text);
        }
        prop_assert_eq!(rebuilt, src);
    }

    /// Lines only move forward.
    #[test]
    fn line_numbers_are_monotonic(src in arb_source()) {
        let tokens = Lexer::new(&src, "prop").tokenize();
        for pair in tokens.windows(2) {
            prop_assert!(pair[0].line <= pair[1].line);
        }
    }

    /// A name that is not a reserved word lexes as one identifier.
    #[test]
    fn names_are_identifiers(name in arb_name()) {
        prop_assume!(!is_reserved(&name));
        let tokens = Lexer::new(&name, "prop").tokenize();
        prop_assert_eq!(tokens.len(), 1);
        prop_assert_eq!(tokens[0].kind, TokenType::Identifier);
        prop_assert_eq!(&tokens[0].text, &name);
    }

    /// Integer literals lex as a single integer token.
    #[test]
    fn integers_lex_whole(n in any::<u32>()) {
        let text = n.to_string();
        let tokens = Lexer::new(&text, "prop").tokenize();
        prop_assert_eq!(tokens.len(), 1);
        prop_assert_eq!(tokens[0].kind, TokenType::Integer);
    }
}

// =============================================================================
// Parser properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Parsing either succeeds or reports an error with a real position.
    #[test]
    fn parser_never_panics(src in arb_source()) {
        match parse_program(&src, "prop") {
            Ok(tree) => prop_assert!(tree.node_count() >= 1),
            Err(e) => {
                prop_assert!(e.line >= 1);
                prop_assert!(e.column >= 1);
                prop_assert_eq!(e.file, "prop");
            }
        }
    }

    /// A generated assignment always parses into one statement.
    #[test]
    fn simple_assignments_parse(name in arb_name(), value in any::<i32>()) {
        prop_assume!(!is_reserved(&name));
        let src = format!("set {} to {}.", name, value);
        let tree = parse_program(&src, "prop").unwrap();
        prop_assert_eq!(tree.children(tree.root()).len(), 1);
    }
}
