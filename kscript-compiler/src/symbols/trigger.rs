// kscript-compiler - Triggers for kerboscript
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Triggers: micro-functions the VM polls once per tick.
//!
//! A trigger returns true to stay registered and false to be removed.

use im::Vector;
use indexmap::IndexMap;
use log::debug;

use crate::code_part::CodePart;
use crate::opcode::Instruction;

/// The construct a trigger was compiled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    /// `ON var`: fires when the value changes.
    On,
    /// `WHEN cond THEN`: fires when the condition holds.
    When,
    /// `WAIT UNTIL cond`: removes itself once the condition holds.
    WaitUntil,
    /// Companion of a system lock, re-evaluates it every tick.
    LockPoll,
}

impl TriggerKind {
    pub fn prefix(self) -> &'static str {
        match self {
            TriggerKind::On => "on",
            TriggerKind::When => "when",
            TriggerKind::WaitUntil => "wait",
            TriggerKind::LockPoll => "lock",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Trigger {
    identifier: String,
    kind: TriggerKind,
    pub code: Vector<Instruction>,
}

impl Trigger {
    pub fn new(identifier: impl Into<String>, kind: TriggerKind) -> Self {
        Trigger {
            identifier: identifier.into(),
            kind,
            code: Vector::new(),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn kind(&self) -> TriggerKind {
        self.kind
    }

    pub fn is_initialized(&self) -> bool {
        !self.code.is_empty()
    }

    /// Entry label, empty until the body has been compiled.
    pub fn function_label(&self) -> &str {
        self.code.front().map(|ins| ins.label.as_str()).unwrap_or("")
    }

    /// Local holding the keep decision while the body runs.
    pub fn keep_name(&self) -> String {
        format!("{}-keep", self.identifier)
    }

    /// Global remembering the last value an ON trigger saw.
    pub fn old_value_name(&self) -> String {
        format!("{}-old", self.identifier)
    }

    pub fn code_part(&self, source: &str) -> CodePart {
        let mut part = CodePart::new(source);
        part.functions = self.code.clone();
        part
    }
}

/// Identity of a trigger compiled from statement text in a scope.
pub fn trigger_identity(kind: TriggerKind, hash: u64, scope_id: u32) -> String {
    format!("{}-{:016x}`{}", kind.prefix(), hash, scope_id)
}

/// Identity of the companion trigger of a system lock.
pub fn lock_trigger_identity(lock_identifier: &str) -> String {
    format!("{}-{}", TriggerKind::LockPoll.prefix(), lock_identifier)
}

/// Every trigger known to a context.
#[derive(Debug, Clone, Default)]
pub struct TriggerCollection {
    triggers: IndexMap<String, Trigger>,
    new_triggers: Vec<String>,
}

impl TriggerCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.triggers.contains_key(identifier)
    }

    pub fn get_or_create(&mut self, identifier: &str, kind: TriggerKind) -> &mut Trigger {
        if !self.triggers.contains_key(identifier) {
            debug!("registering trigger {}", identifier);
            self.new_triggers.push(identifier.to_string());
        }
        self.triggers
            .entry(identifier.to_string())
            .or_insert_with(|| Trigger::new(identifier, kind))
    }

    pub fn get(&self, identifier: &str) -> Option<&Trigger> {
        self.triggers.get(identifier)
    }

    pub fn get_mut(&mut self, identifier: &str) -> Option<&mut Trigger> {
        self.triggers.get_mut(identifier)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Trigger> {
        self.triggers.values()
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    /// Parts for the triggers created since the last call.
    pub fn take_new_parts(&mut self, source: &str) -> Vec<CodePart> {
        let parts = self
            .new_triggers
            .iter()
            .filter_map(|id| self.triggers.get(id))
            .map(|t| t.code_part(source))
            .collect();
        self.new_triggers.clear();
        parts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::OpCode;

    #[test]
    fn test_identities() {
        assert_eq!(
            trigger_identity(TriggerKind::When, 0xab, 2),
            "when-00000000000000ab`2"
        );
        assert_eq!(lock_trigger_identity("throttle`0"), "lock-throttle`0");
    }

    #[test]
    fn test_function_label_and_names() {
        let mut t = Trigger::new("on-1`0", TriggerKind::On);
        assert_eq!(t.function_label(), "");
        assert!(!t.is_initialized());
        let mut ins = Instruction::new(OpCode::Nop);
        ins.label = "@0004".into();
        t.code.push_back(ins);
        assert_eq!(t.function_label(), "@0004");
        assert_eq!(t.keep_name(), "on-1`0-keep");
        assert_eq!(t.old_value_name(), "on-1`0-old");
    }

    #[test]
    fn test_new_parts_flush() {
        let mut triggers = TriggerCollection::new();
        triggers.get_or_create("when-1`0", TriggerKind::When);
        triggers.get_or_create("when-1`0", TriggerKind::When);
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers.take_new_parts("x").len(), 1);
        assert!(triggers.take_new_parts("x").is_empty());
    }
}
