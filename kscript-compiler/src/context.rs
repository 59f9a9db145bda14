// kscript-compiler - Compile context for kerboscript
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! State shared by successive compiles.
//!
//! A [`Context`] outlives the parse trees compiled into it. It owns the label
//! counter, the scope archive and every symbol collection, so an interactive
//! session can refer to functions, locks and triggers defined by earlier
//! input. Counters only increase; clearing means replacing the context.

use crate::scope::ScopeArchive;
use crate::symbols::{SubprogramCollection, TriggerCollection, UserFunctionCollection};

#[derive(Debug, Clone, Default)]
pub struct Context {
    label_index: u32,
    pub scopes: ScopeArchive,
    pub user_functions: UserFunctionCollection,
    pub triggers: TriggerCollection,
    pub subprograms: SubprogramCollection,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the next instruction label.
    pub fn next_label(&mut self) -> String {
        self.label_index += 1;
        format_label(self.label_index)
    }

    /// The label [`next_label`](Self::next_label) will hand out, without
    /// taking it.
    pub fn peek_label(&self) -> String {
        format_label(self.label_index + 1)
    }

    /// Number of labels handed out so far.
    pub fn label_count(&self) -> u32 {
        self.label_index
    }

    /// Forget everything compiled so far.
    pub fn clear(&mut self) {
        *self = Context::new();
    }
}

fn format_label(index: u32) -> String {
    format!("@{:04}", index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peek_does_not_advance() {
        let mut ctx = Context::new();
        assert_eq!(ctx.peek_label(), "@0001");
        assert_eq!(ctx.peek_label(), "@0001");
        assert_eq!(ctx.next_label(), "@0001");
        assert_eq!(ctx.next_label(), "@0002");
        assert_eq!(ctx.label_count(), 2);
    }

    #[test]
    fn test_clear_resets_counters() {
        let mut ctx = Context::new();
        ctx.next_label();
        ctx.scopes.allocate(0);
        ctx.user_functions.get_or_create("f", 0);
        ctx.clear();
        assert_eq!(ctx.label_count(), 0);
        assert_eq!(ctx.scopes.peek_next_id(), 1);
        assert!(ctx.user_functions.is_empty());
    }
}
