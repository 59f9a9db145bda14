// kscript-compiler - Instruction set for kerboscript
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Instruction definitions.
//!
//! Branch targets stay symbolic: an [`Instruction`] names its destination by
//! label and resolving labels to addresses is left to the linker that loads
//! the code parts.

use std::fmt;

/// A value pushed by [`OpCode::Push`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Double(f64),
    Bool(bool),
    Str(String),
    /// Variable reference, resolved by the VM when evaluated.
    Identifier(String),
    /// Marks the bottom of a call's argument list.
    ArgMarker,
    Null,
}

impl Value {
    pub fn identifier(name: impl Into<String>) -> Self {
        Value::Identifier(name.into())
    }

    pub fn string(text: impl Into<String>) -> Self {
        Value::Str(text.into())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Double(d) => write!(f, "{:?}", d),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Str(s) => write!(f, "\"{}\"", s),
            Value::Identifier(name) => write!(f, "${}", name),
            Value::ArgMarker => write!(f, "<argstart>"),
            Value::Null => write!(f, "<null>"),
        }
    }
}

/// VM instructions.
///
/// Instructions operate on a value stack. Anything that transfers control
/// reads its target from the owning [`Instruction`]'s `dest_label`.
#[derive(Debug, Clone, PartialEq)]
pub enum OpCode {
    // =========================================================================
    // Constants & Stack
    // =========================================================================
    /// Push a value onto the stack.
    Push(Value),

    /// Push the address of `dest_label`, filled in at link time.
    PushRelocateLater,

    /// Push a callable delegate for the function at `dest_label`.
    PushDelegateRelocateLater { with_closure: bool },

    /// Pop top value from stack.
    Pop,

    /// Duplicate top value on stack.
    Dup,

    /// Swap the two topmost values.
    Swap,

    /// Replace an identifier on top of the stack by its value.
    Eval,

    // =========================================================================
    // Variables
    // =========================================================================
    /// Pop and bind, updating an existing binding or creating a global.
    Store(String),

    /// Pop and bind in the innermost scope.
    StoreLocal(String),

    /// Pop and bind in the global scope.
    StoreGlobal(String),

    /// Pop and update an existing binding; fails if there is none.
    StoreExist(String),

    /// Pop a name, push whether it is bound.
    Exists,

    /// Pop a name and remove its binding. An empty name removes everything.
    Unset,

    // =========================================================================
    // Suffixes & Indexing
    // =========================================================================
    /// Replace the object on top with its member.
    GetMember(String),

    /// Like `GetMember`, for a member about to be called.
    GetMethod(String),

    /// Pop value and object, assign the member.
    SetMember(String),

    /// Pop index and collection, push the element.
    GetIndex,

    /// Pop value, index and collection, assign the element.
    SetIndex,

    // =========================================================================
    // Arithmetic & Logic
    // =========================================================================
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
    Negate,
    CompareGt,
    CompareLt,
    CompareGte,
    CompareLte,
    CompareEqual,
    CompareNe,
    Not,
    /// Convert the top value to a boolean.
    Bool,

    // =========================================================================
    // Control Flow
    // =========================================================================
    /// Pop and branch to `dest_label` if false.
    BranchIfFalse,

    /// Pop and branch to `dest_label` if true.
    BranchIfTrue,

    /// Unconditional branch to `dest_label`.
    Jump,

    /// Call a function.
    ///
    /// The payload names a built-in (`print()`), the pointer variable of a
    /// user function (`f`0*`) or is empty for an indirect call through the
    /// value on the stack or through `dest_label`.
    Call(String),

    /// Pop the return value, pop `n` scopes, push the value and return.
    Return(u16),

    // =========================================================================
    // Scopes & Arguments
    // =========================================================================
    /// Enter a lexical scope.
    PushScope { id: u32, parent_id: u32 },

    /// Leave `n` lexical scopes.
    PopScope(u16),

    /// Pop the argument marker; fails if arguments remain.
    ArgBottom,

    /// Push whether the argument marker is on top.
    TestArgBottom,

    // =========================================================================
    // Triggers
    // =========================================================================
    /// Pop an address and register it as a trigger.
    ///
    /// A blocking trigger suspends the program until the trigger is removed.
    AddTrigger { blocking: bool },

    /// Pop an address and unregister its trigger.
    RemoveTrigger,

    /// Pop a duration in seconds and suspend.
    Wait,

    /// Branch landing pad.
    Nop,
}

impl OpCode {
    /// Returns true if this instruction branches to its `dest_label`.
    #[inline]
    pub fn is_branch(&self) -> bool {
        matches!(
            self,
            OpCode::BranchIfFalse | OpCode::BranchIfTrue | OpCode::Jump
        )
    }

    /// Returns true if this instruction needs a `dest_label` to be complete.
    #[inline]
    pub fn needs_destination(&self) -> bool {
        self.is_branch()
            || matches!(
                self,
                OpCode::PushRelocateLater | OpCode::PushDelegateRelocateLater { .. }
            )
    }

    /// Net change in operand stack depth after this instruction runs.
    ///
    /// `None` when the depth depends on runtime state: calls consume however
    /// many arguments sit above the marker, and returns unwind the frame.
    #[inline]
    pub fn stack_effect(&self) -> Option<i8> {
        Some(match self {
            // Push 1
            OpCode::Push(_)
            | OpCode::PushRelocateLater
            | OpCode::PushDelegateRelocateLater { .. }
            | OpCode::Dup
            | OpCode::TestArgBottom => 1,

            // Pop 1
            OpCode::Pop
            | OpCode::Store(_)
            | OpCode::StoreLocal(_)
            | OpCode::StoreGlobal(_)
            | OpCode::StoreExist(_)
            | OpCode::Unset
            | OpCode::BranchIfFalse
            | OpCode::BranchIfTrue
            | OpCode::ArgBottom
            | OpCode::AddTrigger { .. }
            | OpCode::RemoveTrigger
            | OpCode::Wait => -1,

            // Neutral (pop 1, push 1)
            OpCode::Swap
            | OpCode::Eval
            | OpCode::Exists
            | OpCode::GetMember(_)
            | OpCode::GetMethod(_)
            | OpCode::Negate
            | OpCode::Not
            | OpCode::Bool => 0,

            // Pop 2, push 1
            OpCode::GetIndex
            | OpCode::Add
            | OpCode::Subtract
            | OpCode::Multiply
            | OpCode::Divide
            | OpCode::Power
            | OpCode::CompareGt
            | OpCode::CompareLt
            | OpCode::CompareGte
            | OpCode::CompareLte
            | OpCode::CompareEqual
            | OpCode::CompareNe => -1,

            // Pop 2
            OpCode::SetMember(_) => -2,

            // Pop 3
            OpCode::SetIndex => -3,

            OpCode::Jump
            | OpCode::PushScope { .. }
            | OpCode::PopScope(_)
            | OpCode::Nop => 0,

            // Depends on the callee
            OpCode::Call(_) | OpCode::Return(_) => return None,
        })
    }

    /// Mnemonic used in listings.
    pub fn name(&self) -> &'static str {
        match self {
            OpCode::Push(_) => "push",
            OpCode::PushRelocateLater => "pushrelocatelater",
            OpCode::PushDelegateRelocateLater { .. } => "pushdelegaterelocatelater",
            OpCode::Pop => "pop",
            OpCode::Dup => "dup",
            OpCode::Swap => "swap",
            OpCode::Eval => "eval",
            OpCode::Store(_) => "store",
            OpCode::StoreLocal(_) => "storelocal",
            OpCode::StoreGlobal(_) => "storeglobal",
            OpCode::StoreExist(_) => "storeexist",
            OpCode::Exists => "exists",
            OpCode::Unset => "unset",
            OpCode::GetMember(_) => "getmember",
            OpCode::GetMethod(_) => "getmethod",
            OpCode::SetMember(_) => "setmember",
            OpCode::GetIndex => "getindex",
            OpCode::SetIndex => "setindex",
            OpCode::Add => "add",
            OpCode::Subtract => "sub",
            OpCode::Multiply => "mult",
            OpCode::Divide => "div",
            OpCode::Power => "pow",
            OpCode::Negate => "neg",
            OpCode::CompareGt => "gt",
            OpCode::CompareLt => "lt",
            OpCode::CompareGte => "gte",
            OpCode::CompareLte => "lte",
            OpCode::CompareEqual => "eq",
            OpCode::CompareNe => "ne",
            OpCode::Not => "not",
            OpCode::Bool => "bool",
            OpCode::BranchIfFalse => "br.false",
            OpCode::BranchIfTrue => "br.true",
            OpCode::Jump => "jump",
            OpCode::Call(_) => "call",
            OpCode::Return(_) => "return",
            OpCode::PushScope { .. } => "pushscope",
            OpCode::PopScope(_) => "popscope",
            OpCode::ArgBottom => "argbottom",
            OpCode::TestArgBottom => "testargbottom",
            OpCode::AddTrigger { .. } => "addtrigger",
            OpCode::RemoveTrigger => "removetrigger",
            OpCode::Wait => "wait",
            OpCode::Nop => "nop",
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())?;
        match self {
            OpCode::Push(v) => write!(f, " {}", v),
            OpCode::PushDelegateRelocateLater { with_closure } => {
                write!(f, " closure={}", with_closure)
            }
            OpCode::Store(n)
            | OpCode::StoreLocal(n)
            | OpCode::StoreGlobal(n)
            | OpCode::StoreExist(n) => write!(f, " ${}", n),
            OpCode::GetMember(n) | OpCode::GetMethod(n) | OpCode::SetMember(n) => {
                write!(f, " :{}", n)
            }
            OpCode::Call(dest) if dest.is_empty() => write!(f, " <indirect>"),
            OpCode::Call(dest) if dest.ends_with("()") => write!(f, " {}", dest),
            OpCode::Call(dest) => write!(f, " ${}", dest),
            OpCode::Return(depth) => write!(f, " {}", depth),
            OpCode::PushScope { id, parent_id } => write!(f, " {} {}", id, parent_id),
            OpCode::PopScope(n) => write!(f, " {}", n),
            OpCode::AddTrigger { blocking } => write!(f, " blocking={}", blocking),
            _ => Ok(()),
        }
    }
}

/// One labeled instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// This instruction's own label, `@0001` style.
    pub label: String,
    /// Target label for branches, relocations and label-addressed calls.
    pub dest_label: String,
    /// Source line (1-indexed), 0 when synthesized.
    pub line: u32,
    /// Source column (1-indexed), 0 when synthesized.
    pub column: u32,
    pub op: OpCode,
}

impl Instruction {
    pub fn new(op: OpCode) -> Self {
        Instruction {
            label: String::new(),
            dest_label: String::new(),
            line: 0,
            column: 0,
            op,
        }
    }

    /// Instruction with a destination label already set.
    pub fn with_dest(op: OpCode, dest: impl Into<String>) -> Self {
        Instruction {
            dest_label: dest.into(),
            ..Instruction::new(op)
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<8} {}", self.label, self.op)?;
        if !self.dest_label.is_empty() {
            write!(f, " -> {}", self.dest_label)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_classification() {
        assert!(OpCode::Jump.is_branch());
        assert!(OpCode::BranchIfFalse.is_branch());
        assert!(!OpCode::Call(String::new()).is_branch());
        assert!(OpCode::PushRelocateLater.needs_destination());
        assert!(!OpCode::Nop.needs_destination());
    }

    #[test]
    fn test_stack_effects() {
        assert_eq!(OpCode::Push(Value::Int(1)).stack_effect(), Some(1));
        assert_eq!(OpCode::Add.stack_effect(), Some(-1));
        assert_eq!(OpCode::SetIndex.stack_effect(), Some(-3));
        assert_eq!(OpCode::Call("print()".into()).stack_effect(), None);
        assert_eq!(OpCode::Return(1).stack_effect(), None);
    }

    #[test]
    fn test_display() {
        let mut ins = Instruction::with_dest(OpCode::BranchIfFalse, "@0007");
        ins.label = "@0003".into();
        assert_eq!(ins.to_string(), "@0003    br.false -> @0007");
        assert_eq!(
            OpCode::Push(Value::identifier("x")).to_string(),
            "push $x"
        );
        assert_eq!(OpCode::Call(String::new()).to_string(), "call <indirect>");
        assert_eq!(OpCode::Call("f`0*".into()).to_string(), "call $f`0*");
        assert_eq!(OpCode::Call("print()".into()).to_string(), "call print()");
        assert_eq!(OpCode::StoreLocal("x".into()).to_string(), "storelocal $x");
        assert_eq!(OpCode::Push(Value::Double(2.0)).to_string(), "push 2.0");
    }
}
