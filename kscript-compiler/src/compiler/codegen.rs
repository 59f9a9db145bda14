// kscript-compiler - Expression code generation for kerboscript
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Expressions.
//!
//! Operands are pushed left to right and the operator consumes them. Calls
//! push an argument marker first so the callee can tell where its arguments
//! end.

use kscript_parser::NodeId;

use super::Compiler;
use super::emit::{Emitter, control};
use crate::error::Result;
use crate::expr::{CompareOp, Expr, ExprVisitor, Scalar};
use crate::opcode::{OpCode, Value};

impl Compiler<'_> {
    fn compile_binary(&mut self, lhs: &Expr, rhs: &Expr, op: OpCode) -> Result<()> {
        self.compile_expr(lhs)?;
        self.compile_expr(rhs)?;
        self.emit(op);
        Ok(())
    }

    fn compile_args(&mut self, args: &[Expr]) -> Result<()> {
        self.emit(OpCode::Push(Value::ArgMarker));
        args.iter().try_for_each(|arg| self.compile_expr(arg))
    }

    /// Pointer variable of the user function or lock `name` seen from
    /// `node`, with whether it is a lock.
    fn user_pointer(&self, name: &str, node: NodeId) -> Option<(String, bool)> {
        self.resolve(name, node)
            .map(|f| (f.pointer_identifier().to_string(), !f.is_function))
    }
}

impl ExprVisitor for Compiler<'_> {
    type Output = Result<()>;

    fn visit_or(&mut self, _expr: &Expr, operands: &[Expr]) -> Result<()> {
        control::compile_or(self, operands)
    }

    fn visit_and(&mut self, _expr: &Expr, operands: &[Expr]) -> Result<()> {
        control::compile_and(self, operands)
    }

    fn visit_compare(&mut self, _expr: &Expr, op: CompareOp, lhs: &Expr, rhs: &Expr) -> Result<()> {
        let op = match op {
            CompareOp::Gt => OpCode::CompareGt,
            CompareOp::Lt => OpCode::CompareLt,
            CompareOp::Gte => OpCode::CompareGte,
            CompareOp::Lte => OpCode::CompareLte,
            CompareOp::Equal => OpCode::CompareEqual,
            CompareOp::NotEqual => OpCode::CompareNe,
        };
        self.compile_binary(lhs, rhs, op)
    }

    fn visit_add(&mut self, _expr: &Expr, lhs: &Expr, rhs: &Expr) -> Result<()> {
        self.compile_binary(lhs, rhs, OpCode::Add)
    }

    fn visit_subtract(&mut self, _expr: &Expr, lhs: &Expr, rhs: &Expr) -> Result<()> {
        self.compile_binary(lhs, rhs, OpCode::Subtract)
    }

    fn visit_multiply(&mut self, _expr: &Expr, lhs: &Expr, rhs: &Expr) -> Result<()> {
        self.compile_binary(lhs, rhs, OpCode::Multiply)
    }

    fn visit_divide(&mut self, _expr: &Expr, lhs: &Expr, rhs: &Expr) -> Result<()> {
        self.compile_binary(lhs, rhs, OpCode::Divide)
    }

    fn visit_power(&mut self, _expr: &Expr, lhs: &Expr, rhs: &Expr) -> Result<()> {
        self.compile_binary(lhs, rhs, OpCode::Power)
    }

    fn visit_negate(&mut self, _expr: &Expr, operand: &Expr) -> Result<()> {
        self.compile_expr(operand)?;
        self.emit(OpCode::Negate);
        Ok(())
    }

    fn visit_not(&mut self, _expr: &Expr, operand: &Expr) -> Result<()> {
        self.compile_expr(operand)?;
        self.emit(OpCode::Not);
        Ok(())
    }

    fn visit_defined(&mut self, _expr: &Expr, name: &str) -> Result<()> {
        self.emit(OpCode::Push(Value::string(name)));
        self.emit(OpCode::Exists);
        Ok(())
    }

    fn visit_get_suffix(&mut self, _expr: &Expr, target: &Expr, name: &str) -> Result<()> {
        self.compile_expr(target)?;
        self.emit(OpCode::GetMember(name.to_string()));
        Ok(())
    }

    fn visit_call_suffix(
        &mut self,
        _expr: &Expr,
        target: &Expr,
        name: &str,
        args: &[Expr],
    ) -> Result<()> {
        self.compile_expr(target)?;
        self.emit(OpCode::GetMethod(name.to_string()));
        self.compile_args(args)?;
        self.emit(OpCode::Call(String::new()));
        Ok(())
    }

    fn visit_suffix_address(&mut self, _expr: &Expr, target: &Expr, name: &str) -> Result<()> {
        self.compile_expr(target)?;
        self.emit(OpCode::GetMethod(name.to_string()));
        Ok(())
    }

    fn visit_get_index(&mut self, _expr: &Expr, target: &Expr, index: &Expr) -> Result<()> {
        self.compile_binary(target, index, OpCode::GetIndex)
    }

    /// User functions and locks are called through their pointer, anything
    /// else by name.
    fn visit_direct_call(&mut self, expr: &Expr, name: &str, args: &[Expr]) -> Result<()> {
        let callee = match self.user_pointer(name, expr.node) {
            Some((pointer, _)) => pointer,
            None if self.calls_builtin(name) => format!("{}()", name),
            None => name.to_string(),
        };
        self.compile_args(args)?;
        self.emit(OpCode::Call(callee));
        Ok(())
    }

    fn visit_indirect_call(&mut self, _expr: &Expr, target: &Expr, args: &[Expr]) -> Result<()> {
        self.compile_expr(target)?;
        self.compile_args(args)?;
        self.emit(OpCode::Call(String::new()));
        Ok(())
    }

    fn visit_function_address(&mut self, expr: &Expr, name: &str) -> Result<()> {
        let value = match self.user_pointer(name, expr.node) {
            Some((pointer, _)) => pointer,
            None => format!("{}()", name),
        };
        self.emit(OpCode::Push(Value::identifier(value)));
        Ok(())
    }

    fn visit_lambda(&mut self, _expr: &Expr, block: NodeId) -> Result<()> {
        let label = self
            .entry_labels
            .get(&block)
            .cloned()
            .ok_or_else(|| self.unknown_node(block))?;
        self.emit_branch(OpCode::PushDelegateRelocateLater { with_closure: true }, &label);
        Ok(())
    }

    fn visit_scalar(&mut self, _expr: &Expr, value: Scalar) -> Result<()> {
        let value = match value {
            Scalar::Int(n) => Value::Int(n),
            Scalar::Double(d) => Value::Double(d),
        };
        self.emit(OpCode::Push(value));
        Ok(())
    }

    fn visit_string(&mut self, _expr: &Expr, value: &str) -> Result<()> {
        self.emit(OpCode::Push(Value::string(value)));
        Ok(())
    }

    fn visit_bool(&mut self, _expr: &Expr, value: bool) -> Result<()> {
        self.emit(OpCode::Push(Value::Bool(value)));
        Ok(())
    }

    /// A locked name reads through the lock; anything else is a variable.
    fn visit_identifier(&mut self, expr: &Expr, name: &str) -> Result<()> {
        match self.user_pointer(name, expr.node) {
            Some((pointer, true)) => {
                self.emit(OpCode::Push(Value::ArgMarker));
                self.emit(OpCode::Call(pointer));
            }
            _ => {
                self.emit(OpCode::Push(Value::identifier(name)));
            }
        }
        Ok(())
    }
}
