// kscript-compiler - Code parts for kerboscript
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Compiled code parts.

use std::fmt::Write as _;

use im::Vector;

use crate::opcode::Instruction;

/// The compiler's output unit.
///
/// A part has three sections: `initialization` runs once when the part is
/// loaded, `main` is the program body and `functions` holds function and
/// trigger bodies that are only ever entered through their labels.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodePart {
    /// File the code was compiled from.
    pub source_name: String,
    pub initialization: Vector<Instruction>,
    pub main: Vector<Instruction>,
    pub functions: Vector<Instruction>,
}

impl CodePart {
    /// Create a new empty code part.
    pub fn new(source_name: impl Into<String>) -> Self {
        CodePart {
            source_name: source_name.into(),
            ..CodePart::default()
        }
    }

    /// Total instruction count over all sections.
    pub fn len(&self) -> usize {
        self.initialization.len() + self.main.len() + self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All instructions in load order: initialization, functions, main.
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.initialization
            .iter()
            .chain(self.functions.iter())
            .chain(self.main.iter())
    }

    /// Find the instruction carrying `label`.
    pub fn find_label(&self, label: &str) -> Option<&Instruction> {
        self.instructions().find(|ins| ins.label == label)
    }

    /// Human-readable listing of every section, one instruction per line.
    pub fn listing(&self) -> String {
        let mut out = String::new();
        let sections = [
            ("initialization", &self.initialization),
            ("functions", &self.functions),
            ("main", &self.main),
        ];
        for (name, code) in sections {
            if code.is_empty() {
                continue;
            }
            let _ = writeln!(out, "; {} ({})", name, self.source_name);
            for ins in code {
                let _ = writeln!(out, "{:>4}:{:<3} {}", ins.line, ins.column, ins);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::{OpCode, Value};

    fn labeled(label: &str, op: OpCode) -> Instruction {
        let mut ins = Instruction::new(op);
        ins.label = label.to_string();
        ins
    }

    #[test]
    fn test_len_and_order() {
        let mut part = CodePart::new("boot.ks");
        part.main.push_back(labeled("@0003", OpCode::Nop));
        part.initialization
            .push_back(labeled("@0001", OpCode::Push(Value::Int(0))));
        part.functions.push_back(labeled("@0002", OpCode::Return(0)));
        assert_eq!(part.len(), 3);
        let labels: Vec<_> = part.instructions().map(|i| i.label.as_str()).collect();
        assert_eq!(labels, vec!["@0001", "@0002", "@0003"]);
        assert!(part.find_label("@0002").is_some());
        assert!(part.find_label("@0009").is_none());
    }

    #[test]
    fn test_listing_skips_empty_sections() {
        let mut part = CodePart::new("boot.ks");
        part.main.push_back(labeled("@0001", OpCode::Nop));
        let text = part.listing();
        assert!(text.contains("; main (boot.ks)"));
        assert!(!text.contains("functions"));
        assert!(text.contains("@0001"));
    }
}
