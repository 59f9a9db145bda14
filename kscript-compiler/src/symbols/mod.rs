// kscript-compiler - Symbol collections for kerboscript
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Registries for everything the compiler emits out of line.
//!
//! Each collection is create-or-fetch by identity, remembers which entries
//! appeared since the last flush and hands out their code parts on request.

pub mod subprogram;
pub mod trigger;
pub mod user_function;

pub use subprogram::{Subprogram, SubprogramCollection};
pub use trigger::{Trigger, TriggerCollection, TriggerKind, lock_trigger_identity, trigger_identity};
pub use user_function::{
    DEFAULT_FRAGMENT, SYSTEM_LOCKS, UserFunction, UserFunctionCollection, identity,
};

use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

use kscript_parser::Token;

/// Memoization key for a run of source tokens.
///
/// Token text is compared case-insensitively. Token boundaries count, so
/// `notx` and `not x` get different keys. The key never collides with
/// [`DEFAULT_FRAGMENT`].
pub fn content_hash<'a>(tokens: impl IntoIterator<Item = &'a Token>) -> u64 {
    let mut hasher = FxHasher::default();
    for token in tokens {
        token.kind.hash(&mut hasher);
        hasher.write(token.text.to_lowercase().as_bytes());
        hasher.write_u8(0xff);
    }
    match hasher.finish() {
        DEFAULT_FRAGMENT => 1,
        h => h,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kscript_parser::Lexer;

    fn hash_of(src: &str) -> u64 {
        let tokens = Lexer::new(src, "test.ks").tokenize();
        content_hash(&tokens)
    }

    #[test]
    fn test_content_hash_is_stable_and_case_insensitive() {
        assert_eq!(hash_of("set x to 1."), hash_of("SET X TO 1."));
        assert_eq!(hash_of("x + 1"), hash_of("x+1"));
        assert_ne!(hash_of("x+1"), hash_of("x+2"));
        assert_ne!(content_hash(std::iter::empty()), DEFAULT_FRAGMENT);
    }

    #[test]
    fn test_content_hash_sees_token_boundaries() {
        assert_ne!(hash_of("notx"), hash_of("not x"));
        assert_ne!(hash_of("ab"), hash_of("a b"));
    }
}
