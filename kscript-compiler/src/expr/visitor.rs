// kscript-compiler - Expression visitor for kerboscript
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Visitor trait over [`Expr`] trees.
//!
//! One method per expression kind; [`walk`] does the dispatch. Visitors
//! decide themselves whether and when to descend into operands.

use kscript_parser::NodeId;

use super::{CompareOp, Expr, ExprKind, Scalar};

pub trait ExprVisitor {
    type Output;

    fn visit_or(&mut self, expr: &Expr, operands: &[Expr]) -> Self::Output;
    fn visit_and(&mut self, expr: &Expr, operands: &[Expr]) -> Self::Output;
    fn visit_compare(&mut self, expr: &Expr, op: CompareOp, lhs: &Expr, rhs: &Expr)
    -> Self::Output;
    fn visit_add(&mut self, expr: &Expr, lhs: &Expr, rhs: &Expr) -> Self::Output;
    fn visit_subtract(&mut self, expr: &Expr, lhs: &Expr, rhs: &Expr) -> Self::Output;
    fn visit_multiply(&mut self, expr: &Expr, lhs: &Expr, rhs: &Expr) -> Self::Output;
    fn visit_divide(&mut self, expr: &Expr, lhs: &Expr, rhs: &Expr) -> Self::Output;
    fn visit_power(&mut self, expr: &Expr, lhs: &Expr, rhs: &Expr) -> Self::Output;
    fn visit_negate(&mut self, expr: &Expr, operand: &Expr) -> Self::Output;
    fn visit_not(&mut self, expr: &Expr, operand: &Expr) -> Self::Output;
    fn visit_defined(&mut self, expr: &Expr, name: &str) -> Self::Output;
    fn visit_get_suffix(&mut self, expr: &Expr, target: &Expr, name: &str) -> Self::Output;
    fn visit_call_suffix(
        &mut self,
        expr: &Expr,
        target: &Expr,
        name: &str,
        args: &[Expr],
    ) -> Self::Output;
    fn visit_suffix_address(&mut self, expr: &Expr, target: &Expr, name: &str) -> Self::Output;
    fn visit_get_index(&mut self, expr: &Expr, target: &Expr, index: &Expr) -> Self::Output;
    fn visit_direct_call(&mut self, expr: &Expr, name: &str, args: &[Expr]) -> Self::Output;
    fn visit_indirect_call(&mut self, expr: &Expr, target: &Expr, args: &[Expr])
    -> Self::Output;
    fn visit_function_address(&mut self, expr: &Expr, name: &str) -> Self::Output;
    fn visit_lambda(&mut self, expr: &Expr, block: NodeId) -> Self::Output;
    fn visit_scalar(&mut self, expr: &Expr, value: Scalar) -> Self::Output;
    fn visit_string(&mut self, expr: &Expr, value: &str) -> Self::Output;
    fn visit_bool(&mut self, expr: &Expr, value: bool) -> Self::Output;
    fn visit_identifier(&mut self, expr: &Expr, name: &str) -> Self::Output;
}

/// Dispatch `expr` to the matching visitor method.
pub fn walk<V: ExprVisitor>(visitor: &mut V, expr: &Expr) -> V::Output {
    match &expr.kind {
        ExprKind::Or(items) => visitor.visit_or(expr, items),
        ExprKind::And(items) => visitor.visit_and(expr, items),
        ExprKind::Compare(op, lhs, rhs) => visitor.visit_compare(expr, *op, lhs, rhs),
        ExprKind::Add(lhs, rhs) => visitor.visit_add(expr, lhs, rhs),
        ExprKind::Subtract(lhs, rhs) => visitor.visit_subtract(expr, lhs, rhs),
        ExprKind::Multiply(lhs, rhs) => visitor.visit_multiply(expr, lhs, rhs),
        ExprKind::Divide(lhs, rhs) => visitor.visit_divide(expr, lhs, rhs),
        ExprKind::Power(lhs, rhs) => visitor.visit_power(expr, lhs, rhs),
        ExprKind::Negate(operand) => visitor.visit_negate(expr, operand),
        ExprKind::Not(operand) => visitor.visit_not(expr, operand),
        ExprKind::Defined(name) => visitor.visit_defined(expr, name),
        ExprKind::GetSuffix(target, name) => visitor.visit_get_suffix(expr, target, name),
        ExprKind::CallSuffix(target, name, args) => {
            visitor.visit_call_suffix(expr, target, name, args)
        }
        ExprKind::SuffixAddress(target, name) => {
            visitor.visit_suffix_address(expr, target, name)
        }
        ExprKind::GetIndex(target, index) => visitor.visit_get_index(expr, target, index),
        ExprKind::DirectCall(name, args) => visitor.visit_direct_call(expr, name, args),
        ExprKind::IndirectCall(target, args) => visitor.visit_indirect_call(expr, target, args),
        ExprKind::FunctionAddress(name) => visitor.visit_function_address(expr, name),
        ExprKind::Lambda(block) => visitor.visit_lambda(expr, *block),
        ExprKind::Scalar(value) => visitor.visit_scalar(expr, *value),
        ExprKind::Str(value) => visitor.visit_string(expr, value),
        ExprKind::Bool(value) => visitor.visit_bool(expr, *value),
        ExprKind::Identifier(name) => visitor.visit_identifier(expr, name),
    }
}
