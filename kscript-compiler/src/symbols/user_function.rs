// kscript-compiler - User functions and locks for kerboscript
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! User functions and locks.
//!
//! Both are called through a pointer variable holding a delegate. A lock is
//! a function whose body is one expression; it also has a default body that
//! returns the variable of the same name, used while the lock is released.

use im::Vector;
use indexmap::IndexMap;
use log::debug;

use kscript_parser::NodeId;

use crate::code_part::CodePart;
use crate::opcode::Instruction;

/// Locks the host polls every tick through a companion trigger.
pub const SYSTEM_LOCKS: [&str; 4] = ["throttle", "steering", "wheelthrottle", "wheelsteering"];

/// Fragment key of a lock's default body.
pub const DEFAULT_FRAGMENT: u64 = 0;

#[derive(Debug, Clone)]
pub struct UserFunction {
    identifier: String,
    name: String,
    scope_id: u32,
    pointer: String,
    default_label: String,
    /// Declared with FUNCTION rather than LOCK.
    pub is_function: bool,
    /// Block the declaration lives in; `None` for file level.
    pub scope_node: Option<NodeId>,
    /// Code storing the entry delegate into the pointer.
    pub initialization: Vector<Instruction>,
    fragments: IndexMap<u64, Vector<Instruction>>,
    new_fragments: Vec<u64>,
    current: Option<u64>,
    /// Fragment the initialization stores into the pointer.
    pointed: Option<u64>,
    repointed: bool,
}

impl UserFunction {
    pub fn new(name: &str, scope_id: u32) -> Self {
        let name = name.to_lowercase();
        let identifier = identity(&name, scope_id);
        UserFunction {
            pointer: format!("{}*", identifier),
            default_label: format!("{}-default", identifier),
            identifier,
            name,
            scope_id,
            is_function: false,
            scope_node: None,
            initialization: Vector::new(),
            fragments: IndexMap::new(),
            new_fragments: Vec::new(),
            current: None,
            pointed: None,
            repointed: false,
        }
    }

    /// `name`scope`, unique per context.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope_id(&self) -> u32 {
        self.scope_id
    }

    /// Variable holding the delegate the function is called through.
    pub fn pointer_identifier(&self) -> &str {
        &self.pointer
    }

    pub fn default_label(&self) -> &str {
        &self.default_label
    }

    /// A function once it has a body; a lock once its default body exists.
    pub fn is_initialized(&self) -> bool {
        if self.is_function {
            self.current.is_some()
        } else {
            self.has_fragment(DEFAULT_FRAGMENT)
        }
    }

    pub fn is_system_lock(&self) -> bool {
        !self.is_function && SYSTEM_LOCKS.contains(&self.name.as_str())
    }

    /// Whether the declaration belongs to file level.
    pub fn is_global(&self) -> bool {
        self.scope_node.is_none()
    }

    pub fn has_fragment(&self, hash: u64) -> bool {
        self.fragments.contains_key(&hash)
    }

    /// Store the compiled body for `hash` and make it the current one.
    pub fn add_fragment(&mut self, hash: u64, code: Vector<Instruction>) {
        if self.fragments.insert(hash, code).is_none() {
            self.new_fragments.push(hash);
        }
        if hash != DEFAULT_FRAGMENT {
            self.current = Some(hash);
        }
    }

    /// Entry label of the fragment for `hash`.
    pub fn fragment_label(&self, hash: u64) -> Option<&str> {
        self.fragments
            .get(&hash)
            .and_then(|code| code.front())
            .map(|ins| ins.label.as_str())
    }

    /// Entry label of the most recently compiled body.
    pub fn func_label(&self) -> Option<&str> {
        self.current.and_then(|hash| self.fragment_label(hash))
    }

    /// Make an existing fragment the current body.
    pub fn set_current(&mut self, hash: u64) {
        if self.fragments.contains_key(&hash) {
            self.current = Some(hash);
        }
    }

    /// Whether the initialization already stores the fragment for `hash`.
    pub fn points_at(&self, hash: u64) -> bool {
        self.pointed == Some(hash)
    }

    /// Replace the initialization with `init`, which stores the fragment
    /// for `hash`. The next flush ships it even if no fragment is new.
    pub fn repoint(&mut self, hash: u64, init: Vector<Instruction>) {
        self.initialization = init;
        self.pointed = Some(hash);
        self.repointed = true;
    }

    /// New fragments or a changed initialization wait to be flushed.
    pub fn has_pending_code(&self) -> bool {
        !self.new_fragments.is_empty() || self.repointed
    }

    pub fn clear_new_fragments(&mut self) {
        self.new_fragments.clear();
        self.repointed = false;
    }

    /// Everything this function owns as one code part.
    pub fn code_part(&self, source: &str) -> CodePart {
        let mut part = CodePart::new(source);
        if self.is_global() {
            part.initialization = self.initialization.clone();
        }
        for code in self.fragments.values() {
            part.functions.append(code.clone());
        }
        part
    }

    /// Fragments added since the last flush, plus the re-pointing
    /// initialization of a file-level function.
    pub fn take_new_fragments_part(&mut self, source: &str) -> CodePart {
        let mut part = CodePart::new(source);
        if self.is_function && self.is_global() {
            part.initialization = self.initialization.clone();
        }
        self.repointed = false;
        for hash in self.new_fragments.drain(..) {
            if let Some(code) = self.fragments.get(&hash) {
                part.functions.append(code.clone());
            }
        }
        part
    }
}

/// Every user function and lock known to a context.
#[derive(Debug, Clone, Default)]
pub struct UserFunctionCollection {
    funcs: IndexMap<String, UserFunction>,
    new_funcs: Vec<String>,
}

impl UserFunctionCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str, scope_id: u32) -> bool {
        self.funcs.contains_key(&identity(name, scope_id))
    }

    /// Get or create the function `name` declared in `scope_id`.
    pub fn get_or_create(&mut self, name: &str, scope_id: u32) -> &mut UserFunction {
        let key = identity(name, scope_id);
        if !self.funcs.contains_key(&key) {
            debug!("registering user function {}", key);
            self.new_funcs.push(key.clone());
        }
        self.funcs
            .entry(key)
            .or_insert_with(|| UserFunction::new(name, scope_id))
    }

    pub fn get(&self, name: &str, scope_id: u32) -> Option<&UserFunction> {
        self.funcs.get(&identity(name, scope_id))
    }

    pub fn get_mut(&mut self, name: &str, scope_id: u32) -> Option<&mut UserFunction> {
        self.funcs.get_mut(&identity(name, scope_id))
    }

    pub fn by_identifier(&self, identifier: &str) -> Option<&UserFunction> {
        self.funcs.get(identifier)
    }

    pub fn by_identifier_mut(&mut self, identifier: &str) -> Option<&mut UserFunction> {
        self.funcs.get_mut(identifier)
    }

    /// Created since the last [`take_new_parts`](Self::take_new_parts).
    pub fn is_new(&self, identifier: &str) -> bool {
        self.new_funcs.iter().any(|id| id == identifier)
    }

    pub fn iter(&self) -> impl Iterator<Item = &UserFunction> {
        self.funcs.values()
    }

    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }

    /// Code for everything added since the last call.
    ///
    /// New functions contribute their whole part; older ones that gained a
    /// fragment or were re-pointed contribute just the new fragments and
    /// their initialization.
    pub fn take_new_parts(&mut self, source: &str) -> Vec<CodePart> {
        let mut parts = Vec::new();
        for key in &self.new_funcs {
            if let Some(func) = self.funcs.get(key) {
                parts.push(func.code_part(source));
            }
        }
        for (key, func) in self.funcs.iter_mut() {
            if self.new_funcs.contains(key) {
                func.clear_new_fragments();
            } else if func.has_pending_code() {
                parts.push(func.take_new_fragments_part(source));
            }
        }
        self.new_funcs.clear();
        parts
    }

    /// Parts for every known function.
    pub fn parts(&self, source: &str) -> Vec<CodePart> {
        self.funcs.values().map(|f| f.code_part(source)).collect()
    }
}

/// Identity key of a function or lock declared in a scope.
pub fn identity(name: &str, scope_id: u32) -> String {
    format!("{}`{}", name.to_lowercase(), scope_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::OpCode;

    fn fragment(label: &str) -> Vector<Instruction> {
        let mut ins = Instruction::new(OpCode::Nop);
        ins.label = label.to_string();
        Vector::unit(ins)
    }

    #[test]
    fn test_identity_and_names() {
        let f = UserFunction::new("Throttle", 0);
        assert_eq!(f.identifier(), "throttle`0");
        assert_eq!(f.pointer_identifier(), "throttle`0*");
        assert_eq!(f.default_label(), "throttle`0-default");
        assert!(f.is_system_lock());
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let mut funcs = UserFunctionCollection::new();
        funcs.get_or_create("f", 3).is_function = true;
        assert!(funcs.get_or_create("F", 3).is_function);
        assert_eq!(funcs.len(), 1);
        assert!(funcs.contains("f", 3));
        assert!(!funcs.contains("f", 4));
    }

    #[test]
    fn test_fragments_and_labels() {
        let mut f = UserFunction::new("x", 0);
        assert!(f.func_label().is_none());
        f.add_fragment(DEFAULT_FRAGMENT, fragment("@0001"));
        assert!(f.func_label().is_none());
        f.add_fragment(42, fragment("@0002"));
        assert_eq!(f.func_label(), Some("@0002"));
        assert_eq!(f.fragment_label(DEFAULT_FRAGMENT), Some("@0001"));
        assert!(f.has_fragment(42));
    }

    #[test]
    fn test_new_parts_bookkeeping() {
        let mut funcs = UserFunctionCollection::new();
        let f = funcs.get_or_create("f", 0);
        f.is_function = true;
        f.add_fragment(1, fragment("@0001"));
        assert!(funcs.is_new("f`0"));

        let parts = funcs.take_new_parts("a.ks");
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].functions.len(), 1);
        assert!(!funcs.is_new("f`0"));
        assert!(funcs.take_new_parts("a.ks").is_empty());

        // A later compile redefines the body
        funcs.get_mut("f", 0).unwrap().add_fragment(2, fragment("@0009"));
        let parts = funcs.take_new_parts("b.ks");
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].functions[0].label, "@0009");
        assert_eq!(funcs.get("f", 0).unwrap().func_label(), Some("@0009"));
    }

    #[test]
    fn test_repoint_without_new_fragment() {
        let mut funcs = UserFunctionCollection::new();
        let f = funcs.get_or_create("f", 0);
        f.is_function = true;
        f.add_fragment(1, fragment("@0001"));
        f.repoint(1, fragment("@0002"));
        f.add_fragment(2, fragment("@0003"));
        f.repoint(2, fragment("@0004"));
        funcs.take_new_parts("a.ks");

        let f = funcs.get_mut("f", 0).unwrap();
        assert!(f.points_at(2));
        f.set_current(1);
        f.repoint(1, fragment("@0005"));
        assert!(f.has_pending_code());

        let parts = funcs.take_new_parts("b.ks");
        assert_eq!(parts.len(), 1);
        assert!(parts[0].functions.is_empty());
        assert_eq!(parts[0].initialization[0].label, "@0005");
        assert!(funcs.take_new_parts("c.ks").is_empty());
    }
}
