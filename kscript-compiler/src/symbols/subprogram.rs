// kscript-compiler - Subprograms for kerboscript
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Subprograms loaded into the caller's address space by RUN.
//!
//! Each gets a trampoline: on first call it loads the program and caches the
//! entry point in a pointer variable, later calls jump straight through it.

use im::Vector;
use indexmap::IndexMap;
use log::debug;

use crate::code_part::CodePart;
use crate::opcode::Instruction;

#[derive(Debug, Clone)]
pub struct Subprogram {
    name: String,
    pointer: String,
    pub function_code: Vector<Instruction>,
    pub initialization: Vector<Instruction>,
}

impl Subprogram {
    pub fn new(name: &str) -> Self {
        Subprogram {
            name: name.to_string(),
            pointer: format!("prog-{}*", name.to_lowercase()),
            function_code: Vector::new(),
            initialization: Vector::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Variable caching the loaded program's entry point.
    pub fn pointer_identifier(&self) -> &str {
        &self.pointer
    }

    /// Entry label of the trampoline, empty until compiled.
    pub fn function_label(&self) -> &str {
        self.function_code
            .front()
            .map(|ins| ins.label.as_str())
            .unwrap_or("")
    }

    pub fn is_initialized(&self) -> bool {
        !self.function_code.is_empty()
    }

    pub fn code_part(&self, source: &str) -> CodePart {
        let mut part = CodePart::new(source);
        part.initialization = self.initialization.clone();
        part.functions = self.function_code.clone();
        part
    }
}

#[derive(Debug, Clone, Default)]
pub struct SubprogramCollection {
    programs: IndexMap<String, Subprogram>,
    new_programs: Vec<String>,
}

impl SubprogramCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.programs.contains_key(&name.to_lowercase())
    }

    pub fn get_or_create(&mut self, name: &str) -> &mut Subprogram {
        let key = name.to_lowercase();
        if !self.programs.contains_key(&key) {
            debug!("registering subprogram {}", name);
            self.new_programs.push(key.clone());
        }
        self.programs
            .entry(key)
            .or_insert_with(|| Subprogram::new(name))
    }

    pub fn get(&self, name: &str) -> Option<&Subprogram> {
        self.programs.get(&name.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    pub fn take_new_parts(&mut self, source: &str) -> Vec<CodePart> {
        let parts = self
            .new_programs
            .iter()
            .filter_map(|key| self.programs.get(key))
            .map(|p| p.code_part(source))
            .collect();
        self.new_programs.clear();
        parts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_case_insensitive() {
        let mut progs = SubprogramCollection::new();
        progs.get_or_create("Lib");
        assert!(progs.contains("lib"));
        assert_eq!(progs.get("LIB").unwrap().pointer_identifier(), "prog-lib*");
        assert_eq!(progs.get("lib").unwrap().name(), "Lib");
        assert_eq!(progs.take_new_parts("x").len(), 1);
        assert!(progs.take_new_parts("x").is_empty());
    }
}
