// kscript-compiler - Property-based tests for code generation
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Property-based tests over programs stitched from valid statements.
//!
//! Tests the following properties:
//! - Compiling the same text into fresh contexts gives identical parts
//! - Every branch and relocatable push names a label that exists
//! - Labels are unique across all parts of one compile
//! - Recompiling into a named context only ships what is new

mod common;
use common::*;

use proptest::prelude::*;
use std::collections::HashSet;

// =============================================================================
// Strategies
// =============================================================================

const SNIPPETS: &[&str] = &[
    "print 1.",
    "set x to 2 * y.",
    "if x > 1 { print x. } else { print 0. }",
    "until x > 3 { set x to x + 1. if x = 2 { break. } }",
    "function f { parameter a, b is 2. return a + b. }",
    "lock l to x * 2.",
    "lock throttle to 0.5.",
    "unlock all.",
    "when x > 5 then { print \"hi\". preserve. }",
    "on y { print y. }",
    "for i in xs { print i. }",
    "wait until x > 2.",
    "wait 1.",
    "set g to { parameter q. return q * 2. }.",
    "print f(1) + l.",
    "from { local k is 0. } until k > 3 step { set k to k + 1. } do { print k. }",
    "{ local z is 1. print z. }",
    "if true { function h { return 3. } print h(). }",
    "toggle sas.",
    "print ship:orbit:apoapsis.",
];

fn arb_program() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(SNIPPETS), 1..8)
        .prop_map(|parts| parts.join("\n"))
}

fn labels(parts: &[CodePart]) -> Vec<String> {
    all_instructions(parts)
        .iter()
        .map(|i| i.label.clone())
        .collect()
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_compile_is_deterministic(src in arb_program()) {
        let first = compile(&src);
        let second = compile(&src);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_destinations_resolve(src in arb_program()) {
        let parts = compile(&src);
        let known: HashSet<String> = labels(&parts).into_iter().collect();
        for ins in all_instructions(&parts) {
            if ins.op.needs_destination() {
                prop_assert!(
                    known.contains(&ins.dest_label),
                    "{} at {} jumps to unknown label {:?}",
                    ins.op,
                    ins.label,
                    ins.dest_label
                );
            }
        }
    }

    #[test]
    fn prop_labels_are_unique(src in arb_program()) {
        let parts = compile(&src);
        let all = labels(&parts);
        let unique: HashSet<&String> = all.iter().collect();
        prop_assert_eq!(unique.len(), all.len());
    }

    #[test]
    fn prop_recompile_ships_only_main(src in arb_program()) {
        // Functions nested in blocks belong to scopes that are new each time
        prop_assume!(!src.contains("function h"));
        let mut script = Script::new();
        let options = CompilerOptions::new();
        script.compile("prop.ks", 1, &src, "ctx", &options).unwrap();
        let again = script.compile("prop.ks", 1, &src, "ctx", &options).unwrap();
        prop_assert_eq!(again.len(), 1);
    }
}
