// kscript-compiler - Instruction emission for kerboscript
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Instruction emission with symbolic labels.
//!
//! Every instruction gets a label when it is appended. Forward branches are
//! emitted with an empty destination and patched later with the label the
//! next instruction *will* get, which is why the emitter can peek at the next
//! label without taking it. A patched branch may point one past the last
//! instruction of a section; the section is then closed with a `Nop` so the
//! target exists.

use crate::error::Result;
use crate::expr::Expr;
use crate::opcode::{Instruction, OpCode, Value};

/// Surface the control-flow helpers need from a code generator.
pub(crate) trait Emitter {
    /// Append `op` to the current section and return its index there.
    fn emit(&mut self, op: OpCode) -> usize;

    /// Label the next appended instruction will get.
    fn peek_label(&self) -> String;

    /// Set the destination of the instruction at `index`.
    fn set_destination(&mut self, index: usize, label: &str);

    /// Record that a branch targets the next instruction.
    fn mark_branch_target(&mut self);

    /// Compile an expression.
    fn compile_expr(&mut self, expr: &Expr) -> Result<()>;

    /// Append a branch to a known label.
    fn emit_branch(&mut self, op: OpCode, label: &str) -> usize {
        let index = self.emit(op);
        self.set_destination(index, label);
        index
    }

    /// Point every instruction in `indices` at the next instruction.
    fn patch_to_next(&mut self, indices: &[usize]) {
        let label = self.peek_label();
        for &index in indices {
            self.set_destination(index, &label);
        }
        self.mark_branch_target();
    }
}

/// Unresolved exits of one loop.
#[derive(Debug, Default)]
pub(crate) struct BreakList {
    /// Scope depth when the loop was entered.
    pub depth: u16,
    /// Jumps to the first instruction after the loop.
    pub jumps: Vec<usize>,
    /// `PopScope` instructions holding the absolute depth at the break.
    pub scope_pops: Vec<usize>,
}

impl BreakList {
    pub fn new(depth: u16) -> Self {
        BreakList {
            depth,
            ..Default::default()
        }
    }
}

/// One instruction list under construction plus the state that is local to
/// it: loops, scope depth and the enclosing function or trigger.
#[derive(Debug, Default)]
pub(crate) struct Section {
    pub code: Vec<Instruction>,
    /// A branch targets the instruction after the current end.
    pub branch_pending: bool,
    pub break_lists: Vec<BreakList>,
    /// Scopes pushed so far in this section.
    pub depth: u16,
    /// Depth right after the enclosing function pushed its own scope.
    pub function_depth: Option<u16>,
    /// Keep-flag names of the triggers being compiled, innermost last.
    pub keep_names: Vec<String>,
}

impl Section {
    /// Make the break-site depths of `list` relative to the loop entry.
    pub fn settle_scope_pops(&mut self, list: &BreakList) {
        for &index in &list.scope_pops {
            let op = self.code.get_mut(index).map(|ins| &mut ins.op);
            if let Some(OpCode::PopScope(depth)) = op {
                *depth = depth.saturating_sub(list.depth);
            }
        }
    }
}

/// Control flow written against [`Emitter`].
pub(crate) mod control {
    use super::*;

    /// Compile `cond`, then the then-branch, then the optional else-branch.
    pub fn compile_if<E, T, F>(
        emitter: &mut E,
        cond: &Expr,
        then_branch: T,
        else_branch: Option<F>,
    ) -> Result<()>
    where
        E: Emitter + ?Sized,
        T: FnOnce(&mut E) -> Result<()>,
        F: FnOnce(&mut E) -> Result<()>,
    {
        emitter.compile_expr(cond)?;
        let else_jump = emitter.emit(OpCode::BranchIfFalse);
        then_branch(emitter)?;

        match else_branch {
            Some(else_branch) => {
                let end_jump = emitter.emit(OpCode::Jump);
                emitter.patch_to_next(&[else_jump]);
                else_branch(emitter)?;
                emitter.patch_to_next(&[end_jump]);
            }
            None => emitter.patch_to_next(&[else_jump]),
        }
        Ok(())
    }

    /// `a and b and ...`: the first false operand short-circuits.
    pub fn compile_and<E: Emitter + ?Sized>(emitter: &mut E, operands: &[Expr]) -> Result<()> {
        short_circuit(emitter, operands, OpCode::BranchIfFalse, false)
    }

    /// `a or b or ...`: the first true operand short-circuits.
    pub fn compile_or<E: Emitter + ?Sized>(emitter: &mut E, operands: &[Expr]) -> Result<()> {
        short_circuit(emitter, operands, OpCode::BranchIfTrue, true)
    }

    /// All operands share one short-circuit label that pushes
    /// `short_value`; falling through every test pushes its opposite.
    fn short_circuit<E: Emitter + ?Sized>(
        emitter: &mut E,
        operands: &[Expr],
        branch: OpCode,
        short_value: bool,
    ) -> Result<()> {
        let mut shorts = Vec::with_capacity(operands.len());
        for operand in operands {
            emitter.compile_expr(operand)?;
            shorts.push(emitter.emit(branch.clone()));
        }
        emitter.emit(OpCode::Push(Value::Bool(!short_value)));
        let end_jump = emitter.emit(OpCode::Jump);

        emitter.patch_to_next(&shorts);
        emitter.emit(OpCode::Push(Value::Bool(short_value)));
        emitter.patch_to_next(&[end_jump]);
        Ok(())
    }
}
