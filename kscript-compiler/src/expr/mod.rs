// kscript-compiler - Expression tree for kerboscript
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Canonical expression tree built from parse subtrees.

pub mod builder;
pub mod visitor;

pub use builder::ExpressionBuilder;
pub use visitor::{ExprVisitor, walk};

use kscript_parser::NodeId;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Gt,
    Lt,
    Gte,
    Lte,
    Equal,
    NotEqual,
}

impl CompareOp {
    pub fn from_text(text: &str) -> Option<Self> {
        Some(match text {
            ">" => CompareOp::Gt,
            "<" => CompareOp::Lt,
            ">=" => CompareOp::Gte,
            "<=" => CompareOp::Lte,
            "=" => CompareOp::Equal,
            "<>" => CompareOp::NotEqual,
            _ => return None,
        })
    }
}

/// Numeric literal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Int(i32),
    Double(f64),
}

/// One expression node together with the parse node it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub node: NodeId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    // Logic, n-ary so a chain short-circuits to one label
    Or(Vec<Expr>),
    And(Vec<Expr>),

    // Binary
    Compare(CompareOp, Box<Expr>, Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Subtract(Box<Expr>, Box<Expr>),
    Multiply(Box<Expr>, Box<Expr>),
    Divide(Box<Expr>, Box<Expr>),
    Power(Box<Expr>, Box<Expr>),

    // Unary
    Negate(Box<Expr>),
    Not(Box<Expr>),
    /// `DEFINED name`.
    Defined(String),

    // Suffixes
    /// `target:name`.
    GetSuffix(Box<Expr>, String),
    /// `target:name(args)`.
    CallSuffix(Box<Expr>, String, Vec<Expr>),
    /// `target:name@`.
    SuffixAddress(Box<Expr>, String),
    /// `target[index]` and `target#index`.
    GetIndex(Box<Expr>, Box<Expr>),

    // Calls
    /// `name(args)`.
    DirectCall(String, Vec<Expr>),
    /// Call of a delegate produced by another expression.
    IndirectCall(Box<Expr>, Vec<Expr>),
    /// `name@`.
    FunctionAddress(String),
    /// `{ ... }` used as a value; holds the block node.
    Lambda(NodeId),

    // Atoms
    Scalar(Scalar),
    Str(String),
    Bool(bool),
    Identifier(String),
}

impl Expr {
    pub fn new(kind: ExprKind, node: NodeId) -> Self {
        Expr { kind, node }
    }

    /// The identifier name if this is a bare identifier.
    pub fn as_identifier(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Identifier(name) => Some(name),
            _ => None,
        }
    }
}
