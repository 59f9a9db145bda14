// kscript-compiler - Statement code generation for kerboscript
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Statements.
//!
//! Most statements that talk to the host (PRINT, STAGE, COPY, ...) compile
//! to a call of the matching built-in function whose result is discarded.

use log::{trace, warn};

use kscript_parser::{NodeId, NodeKind, TokenType};

use super::Compiler;
use super::emit::{BreakList, Emitter, control};
use crate::error::{ErrorKind, Result};
use crate::expr::{Expr, ExprKind};
use crate::opcode::{OpCode, Value};
use crate::symbols::{Trigger, TriggerKind, UserFunction, lock_trigger_identity};

/// One name of a DECLARE PARAMETER list.
struct Parameter {
    node: NodeId,
    name: String,
    default: Option<NodeId>,
}

/// What UNLOCK needs to know about one lock.
struct Unlocked {
    name: String,
    pointer: String,
    default_label: String,
    companion: String,
    is_global: bool,
    is_system: bool,
}

impl From<&UserFunction> for Unlocked {
    fn from(lock: &UserFunction) -> Self {
        Unlocked {
            name: lock.name().to_string(),
            pointer: lock.pointer_identifier().to_string(),
            default_label: lock.default_label().to_string(),
            companion: lock_trigger_identity(lock.identifier()),
            is_global: lock.is_global(),
            is_system: lock.is_system_lock(),
        }
    }
}

impl Compiler<'_> {
    // ========================================================================
    // Program structure
    // ========================================================================

    pub(super) fn compile_root(&mut self) -> Result<()> {
        let root = self.tree.root();
        self.set_position(root);
        if self.options.is_called_from_run {
            let scope = self.scope_of(root)?;
            self.push_scope(scope);
            self.initialize_scoped_functions(scope.id);
            self.compile_statements(root, true)?;
            self.emit(OpCode::Push(Value::Int(0)));
            self.emit(OpCode::Return(1));
        } else {
            self.emit(OpCode::Push(Value::ArgMarker));
            self.compile_statements(root, true)?;
        }
        Ok(())
    }

    /// Compile the statements directly under `parent`.
    ///
    /// With `arg_bottom`, `ArgBottom` follows the last parameter declaration,
    /// or comes first when there is none.
    pub(super) fn compile_statements(&mut self, parent: NodeId, arg_bottom: bool) -> Result<()> {
        let stmts: Vec<NodeId> = self
            .tree
            .node_children(parent)
            .filter(|&n| self.tree.kind(n).is_statement())
            .collect();
        let last_param = stmts.iter().rposition(|&s| {
            self.tree.kind(s) == NodeKind::DeclareStmt
                && self
                    .tree
                    .find_child(s, NodeKind::DeclareParameterClause)
                    .is_some()
        });

        if arg_bottom && last_param.is_none() {
            self.emit(OpCode::ArgBottom);
        }
        for (i, stmt) in stmts.into_iter().enumerate() {
            self.compile_statement(stmt)?;
            if arg_bottom && last_param == Some(i) {
                self.set_position(stmt);
                self.emit(OpCode::ArgBottom);
            }
        }
        Ok(())
    }

    pub(super) fn compile_statement(&mut self, stmt: NodeId) -> Result<()> {
        self.set_position(stmt);
        trace!("statement {:?} at {}:{}", self.tree.kind(stmt), self.line, self.column);
        match self.tree.kind(stmt) {
            NodeKind::EmptyStmt | NodeKind::Directive => Ok(()),
            NodeKind::InstructionBlock => self.compile_block(stmt),
            NodeKind::SetStmt => self.compile_set(stmt),
            NodeKind::ToggleStmt => self.compile_toggle(stmt),
            NodeKind::IdentifierLedStmt => self.compile_identifier_led(stmt),
            NodeKind::IfStmt => self.compile_if(stmt),
            NodeKind::UntilStmt => self.compile_until(stmt),
            NodeKind::ForStmt => self.compile_for(stmt),
            NodeKind::BreakStmt => self.compile_break(stmt),
            NodeKind::ReturnStmt => self.compile_return(stmt),
            NodeKind::PreserveStmt => self.compile_preserve(stmt),
            NodeKind::DeclareStmt => self.compile_declare(stmt),
            NodeKind::UnlockStmt => self.compile_unlock(stmt),
            NodeKind::OnStmt | NodeKind::WhenStmt => self.compile_trigger_activation(stmt),
            NodeKind::WaitStmt => self.compile_wait(stmt),
            NodeKind::PrintStmt => self.compile_print(stmt),
            NodeKind::StageStmt => self.call_builtin("stage", |_| Ok(())),
            NodeKind::ClearStmt => self.call_builtin("clearscreen", |_| Ok(())),
            NodeKind::RebootStmt => self.call_builtin("reboot", |_| Ok(())),
            NodeKind::ShutdownStmt => self.call_builtin("shutdown", |_| Ok(())),
            NodeKind::AddStmt => self.compile_unary_builtin(stmt, "add"),
            NodeKind::RemoveStmt => self.compile_unary_builtin(stmt, "remove"),
            NodeKind::EditStmt => self.compile_unary_builtin(stmt, "edit"),
            NodeKind::SwitchStmt => self.compile_unary_builtin(stmt, "switch"),
            NodeKind::LogStmt => self.compile_log(stmt),
            NodeKind::CopyStmt => self.compile_copy(stmt),
            NodeKind::RenameStmt => self.compile_rename(stmt),
            NodeKind::DeleteStmt => self.compile_optional_pair(stmt, "delete"),
            NodeKind::CompileStmt => self.compile_optional_pair(stmt, "load"),
            NodeKind::ListStmt => self.compile_list(stmt),
            NodeKind::UnsetStmt => self.compile_unset(stmt),
            NodeKind::RunStmt => self.compile_run(stmt),
            _ => Err(self.unknown_node(stmt)),
        }
    }

    fn compile_block(&mut self, block: NodeId) -> Result<()> {
        let scope = self.scope_of(block)?;
        self.push_scope(scope);
        self.initialize_scoped_functions(scope.id);
        self.compile_statements(block, false)?;
        self.pop_scope();
        Ok(())
    }

    // ========================================================================
    // Assignment
    // ========================================================================

    fn compile_set(&mut self, stmt: NodeId) -> Result<()> {
        let [target, value] = self.operands(stmt)[..] else {
            return Err(self.unknown_node(stmt));
        };
        let target = self.build_expr(target)?;
        let value = self.build_expr(value)?;
        // Setting a locked name releases the lock first
        if let ExprKind::Identifier(name) = &target.kind {
            let lock = self
                .resolve(name, stmt)
                .filter(|f| !f.is_function)
                .map(Unlocked::from);
            if let Some(lock) = lock {
                self.emit_unlock(lock, stmt)?;
            }
        }
        self.compile_assignment(&target, |c| c.compile_expr(&value))
    }

    fn compile_toggle(&mut self, stmt: NodeId) -> Result<()> {
        let Some(&target) = self.operands(stmt).first() else {
            return Err(self.unknown_node(stmt));
        };
        let target = self.build_expr(target)?;
        let current = target.clone();
        self.compile_assignment(&target, |c| {
            c.compile_expr(&current)?;
            c.emit(OpCode::Not);
            Ok(())
        })
    }

    /// `x on.`, `x off.` or an expression evaluated for its side effects.
    fn compile_identifier_led(&mut self, stmt: NodeId) -> Result<()> {
        let Some(&node) = self.operands(stmt).first() else {
            return Err(self.unknown_node(stmt));
        };
        let expr = self.build_expr(node)?;
        let switch = if self.has_token(stmt, TokenType::On) {
            Some(true)
        } else if self.has_token(stmt, TokenType::Off) {
            Some(false)
        } else {
            None
        };
        match switch {
            Some(value) => self.compile_assignment(&expr, |c| {
                c.emit(OpCode::Push(Value::Bool(value)));
                Ok(())
            }),
            None => {
                self.compile_expr(&expr)?;
                self.emit(OpCode::Pop);
                Ok(())
            }
        }
    }

    /// Store the value produced by `value` into `target`.
    fn compile_assignment<F>(&mut self, target: &Expr, value: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        match &target.kind {
            ExprKind::Identifier(name) => {
                value(self)?;
                let op = if self.lazy_global {
                    OpCode::Store(name.clone())
                } else {
                    OpCode::StoreExist(name.clone())
                };
                self.emit(op);
            }
            ExprKind::GetSuffix(object, member) => {
                self.compile_expr(object)?;
                value(self)?;
                self.emit(OpCode::SetMember(member.clone()));
            }
            ExprKind::GetIndex(collection, index) => {
                self.compile_expr(collection)?;
                self.compile_expr(index)?;
                value(self)?;
                self.emit(OpCode::SetIndex);
            }
            _ => {
                let text = self.tree.text(target.node);
                return Err(self.error(ErrorKind::InvalidSuffix(text), target.node));
            }
        }
        Ok(())
    }

    // ========================================================================
    // Control flow
    // ========================================================================

    fn compile_if(&mut self, stmt: NodeId) -> Result<()> {
        let operands = self.operands(stmt);
        let (cond, then_branch, else_branch) = match operands[..] {
            [cond, then_branch] => (cond, then_branch, None),
            [cond, then_branch, else_branch] => (cond, then_branch, Some(else_branch)),
            _ => return Err(self.unknown_node(stmt)),
        };
        let cond = self.build_expr(cond)?;
        control::compile_if(
            self,
            &cond,
            |c| c.compile_statement(then_branch),
            else_branch.map(|node| move |c: &mut Self| c.compile_statement(node)),
        )
    }

    fn compile_until(&mut self, stmt: NodeId) -> Result<()> {
        let [cond, body] = self.operands(stmt)[..] else {
            return Err(self.unknown_node(stmt));
        };
        let cond = self.build_expr(cond)?;

        let entry = self.peek_label();
        self.section
            .break_lists
            .push(BreakList::new(self.section.depth));
        self.compile_expr(&cond)?;
        self.emit(OpCode::Not);
        let exit = self.emit(OpCode::BranchIfFalse);
        if let Some(list) = self.section.break_lists.last_mut() {
            list.jumps.push(exit);
        }
        self.compile_statement(body)?;
        self.emit_branch(OpCode::Jump, &entry);
        self.close_loop();
        Ok(())
    }

    /// `FOR var IN collection body`, driven by the collection's iterator.
    fn compile_for(&mut self, stmt: NodeId) -> Result<()> {
        let [collection, body] = self.operands(stmt)[..] else {
            return Err(self.unknown_node(stmt));
        };
        let var = self
            .token_word(stmt, TokenType::Identifier)
            .ok_or_else(|| self.unknown_node(stmt))?;
        let iterator = format!("{}-iterator", var);
        let collection = self.build_expr(collection)?;
        let scope = self.scope_of(stmt)?;

        self.push_scope(scope);
        self.compile_expr(&collection)?;
        self.emit(OpCode::GetMember("iterator".into()));
        self.emit(OpCode::StoreLocal(iterator.clone()));

        let entry = self.peek_label();
        self.section
            .break_lists
            .push(BreakList::new(self.section.depth));
        self.emit(OpCode::Push(Value::identifier(iterator.as_str())));
        self.emit(OpCode::GetMember("next".into()));
        let exit = self.emit(OpCode::BranchIfFalse);
        if let Some(list) = self.section.break_lists.last_mut() {
            list.jumps.push(exit);
        }
        self.emit(OpCode::Push(Value::identifier(iterator.as_str())));
        self.emit(OpCode::GetMember("value".into()));
        self.emit(OpCode::StoreLocal(var.clone()));
        self.compile_statement(body)?;
        self.emit_branch(OpCode::Jump, &entry);
        self.close_loop();

        // Breaks land here too
        self.set_position(stmt);
        self.emit(OpCode::Push(Value::identifier(iterator.as_str())));
        self.emit(OpCode::GetMember("reset".into()));
        self.emit(OpCode::Pop);
        self.emit(OpCode::Push(Value::string(iterator)));
        self.emit(OpCode::Unset);
        self.emit(OpCode::Push(Value::string(var)));
        self.emit(OpCode::Unset);
        self.pop_scope();
        Ok(())
    }

    /// Resolve the innermost loop's exits to the next instruction.
    fn close_loop(&mut self) {
        if let Some(list) = self.section.break_lists.pop() {
            self.section.settle_scope_pops(&list);
            self.patch_to_next(&list.jumps);
        }
    }

    fn compile_break(&mut self, stmt: NodeId) -> Result<()> {
        if self.section.break_lists.is_empty() {
            return Err(self.error(ErrorKind::BreakOutsideLoop, stmt));
        }
        let pop = self.emit(OpCode::PopScope(self.section.depth));
        let jump = self.emit(OpCode::Jump);
        if let Some(list) = self.section.break_lists.last_mut() {
            list.scope_pops.push(pop);
            list.jumps.push(jump);
        }
        Ok(())
    }

    fn compile_return(&mut self, stmt: NodeId) -> Result<()> {
        if self.section.function_depth.is_none() {
            return Err(self.error(ErrorKind::ReturnOutsideFunction, stmt));
        }
        match self.operands(stmt).first() {
            Some(&value) => {
                let value = self.build_expr(value)?;
                self.compile_expr(&value)?;
            }
            None => {
                self.emit(OpCode::Push(Value::Int(0)));
            }
        }
        self.emit(OpCode::Return(self.return_depth()));
        Ok(())
    }

    fn compile_preserve(&mut self, stmt: NodeId) -> Result<()> {
        let Some(keep) = self.section.keep_names.last().cloned() else {
            return Err(self.error(ErrorKind::PreserveOutsideTrigger, stmt));
        };
        self.emit(OpCode::Push(Value::Bool(true)));
        self.emit(OpCode::Store(keep));
        Ok(())
    }

    // ========================================================================
    // Declarations
    // ========================================================================

    fn compile_declare(&mut self, stmt: NodeId) -> Result<()> {
        let Some(clause) = self.operands(stmt).first().copied() else {
            return Err(self.unknown_node(stmt));
        };
        match self.tree.kind(clause) {
            NodeKind::DeclareIdentifierClause => self.compile_declare_identifier(stmt, clause),
            NodeKind::DeclareParameterClause => self.compile_parameters(stmt, clause),
            NodeKind::DeclareLockClause => self.compile_lock_site(stmt, clause),
            // Functions are stored when their scope is entered
            NodeKind::DeclareFunctionClause => Ok(()),
            _ => Err(self.unknown_node(clause)),
        }
    }

    fn compile_declare_identifier(&mut self, stmt: NodeId, clause: NodeId) -> Result<()> {
        let name = self
            .token_word(clause, TokenType::Identifier)
            .ok_or_else(|| self.unknown_node(clause))?;
        self.check_clobber(&name, clause)?;
        let Some(&value) = self.operands(clause).first() else {
            return Err(self.unknown_node(clause));
        };
        let value = self.build_expr(value)?;
        self.compile_expr(&value)?;
        if self.has_token(stmt, TokenType::Global) {
            self.emit(OpCode::StoreGlobal(name));
        } else {
            self.emit(OpCode::StoreLocal(name));
        }
        Ok(())
    }

    fn parameters(&self, clause: NodeId) -> Vec<Parameter> {
        let mut params: Vec<Parameter> = Vec::new();
        for &child in self.tree.children(clause) {
            match self.tree.token(child) {
                Some(tok) if tok.kind == TokenType::Identifier => params.push(Parameter {
                    node: child,
                    name: tok.text.to_lowercase(),
                    default: None,
                }),
                Some(_) => {}
                None => {
                    if let Some(last) = params.last_mut() {
                        last.default = Some(child);
                    }
                }
            }
        }
        params
    }

    /// Pop each parameter off the argument stack into a local. A defaulted
    /// parameter only evaluates its default when the caller ran out of
    /// arguments.
    fn compile_parameters(&mut self, stmt: NodeId, clause: NodeId) -> Result<()> {
        if self.has_token(stmt, TokenType::Global) {
            return Err(self.error(ErrorKind::GlobalParameter, stmt));
        }
        let params = self.parameters(clause);
        let mut seen_default = false;
        for param in &params {
            if param.default.is_some() {
                seen_default = true;
            } else if seen_default {
                return Err(self.error(ErrorKind::MandatoryAfterDefaulted, param.node));
            }
            self.check_clobber(&param.name, param.node)?;
        }

        for param in params {
            self.set_position(param.node);
            match param.default {
                None => {
                    self.emit(OpCode::StoreLocal(param.name));
                }
                Some(default) => {
                    let default = self.build_expr(default)?;
                    self.emit(OpCode::TestArgBottom);
                    let given = self.emit(OpCode::BranchIfFalse);
                    self.compile_expr(&default)?;
                    self.patch_to_next(&[given]);
                    self.emit(OpCode::StoreLocal(param.name));
                }
            }
        }
        Ok(())
    }

    /// Point the lock at the body compiled for this declaration.
    fn compile_lock_site(&mut self, stmt: NodeId, clause: NodeId) -> Result<()> {
        let name = self.declared_name(clause)?;
        let (scope_id, _) = self.declaration_placement(stmt, &name, true);
        let Some(func) = self.ctx.user_functions.get(&name, scope_id) else {
            return Err(self.unknown_node(clause));
        };
        let pointer = func.pointer_identifier().to_string();
        let is_global = func.is_global();
        let is_system = func.is_system_lock();
        let companion = lock_trigger_identity(func.identifier());
        let entry = self
            .entry_labels
            .get(&clause)
            .cloned()
            .ok_or_else(|| self.unknown_node(clause))?;

        self.emit_branch(OpCode::PushDelegateRelocateLater { with_closure: true }, &entry);
        if is_global {
            self.emit(OpCode::StoreGlobal(pointer));
        } else {
            self.emit(OpCode::Store(pointer));
        }

        if is_system {
            self.call_builtin("toggleflybywire", |c| {
                c.emit(OpCode::Push(Value::string(name.as_str())));
                c.emit(OpCode::Push(Value::Bool(true)));
                Ok(())
            })?;
            let label = self.companion_label(&companion, clause)?;
            self.emit_branch(OpCode::PushRelocateLater, &label);
            self.emit(OpCode::AddTrigger { blocking: false });
        }
        Ok(())
    }

    fn companion_label(&self, identifier: &str, node: NodeId) -> Result<String> {
        self.ctx
            .triggers
            .get(identifier)
            .map(|t| t.function_label().to_string())
            .filter(|label| !label.is_empty())
            .ok_or_else(|| self.unknown_node(node))
    }

    /// Point locks back at their default bodies.
    fn compile_unlock(&mut self, stmt: NodeId) -> Result<()> {
        let chain = self.scope_chain(stmt);
        let named = self.token_word(stmt, TokenType::Identifier);
        let locks: Vec<Unlocked> = match named {
            Some(name) => chain
                .iter()
                .find_map(|&id| {
                    self.ctx
                        .user_functions
                        .get(&name, id)
                        .filter(|f| !f.is_function)
                })
                .map(Unlocked::from)
                .into_iter()
                .collect(),
            None => self
                .ctx
                .user_functions
                .iter()
                .filter(|f| !f.is_function && chain.contains(&f.scope_id()))
                .map(Unlocked::from)
                .collect(),
        };
        if locks.is_empty() {
            warn!(
                "{}:{}: nothing to unlock in '{}'",
                self.line,
                self.column,
                self.tree.text(stmt)
            );
            // Keeps the statement's line in the listing
            trace!("unlock at {}:{} compiled to nop", self.line, self.column);
            self.emit(OpCode::Nop);
            return Ok(());
        }

        for lock in locks {
            self.emit_unlock(lock, stmt)?;
        }
        Ok(())
    }

    /// Point one lock back at its default body. A system lock also stops
    /// flying by wire and drops its polling trigger.
    fn emit_unlock(&mut self, lock: Unlocked, stmt: NodeId) -> Result<()> {
        self.emit_branch(
            OpCode::PushDelegateRelocateLater {
                with_closure: false,
            },
            &lock.default_label,
        );
        if lock.is_global {
            self.emit(OpCode::StoreGlobal(lock.pointer));
        } else {
            self.emit(OpCode::Store(lock.pointer));
        }
        if lock.is_system {
            self.call_builtin("toggleflybywire", |c| {
                c.emit(OpCode::Push(Value::string(lock.name.as_str())));
                c.emit(OpCode::Push(Value::Bool(false)));
                Ok(())
            })?;
            let label = self.companion_label(&lock.companion, stmt)?;
            self.emit_branch(OpCode::PushRelocateLater, &label);
            self.emit(OpCode::RemoveTrigger);
        }
        Ok(())
    }

    // ========================================================================
    // Triggers
    // ========================================================================

    fn trigger_label(&self, stmt: NodeId) -> Result<String> {
        self.entry_labels
            .get(&stmt)
            .cloned()
            .ok_or_else(|| self.unknown_node(stmt))
    }

    /// Register an ON or WHEN trigger. ON first records the current value so
    /// only later changes fire it.
    fn compile_trigger_activation(&mut self, stmt: NodeId) -> Result<()> {
        let Some((id, kind)) = self.trigger_key(stmt) else {
            return Err(self.unknown_node(stmt));
        };
        if kind == TriggerKind::On {
            let Some(&target) = self.operands(stmt).first() else {
                return Err(self.unknown_node(stmt));
            };
            let target = self.build_expr(target)?;
            self.compile_expr(&target)?;
            let old = Trigger::new(id, kind).old_value_name();
            self.emit(OpCode::StoreGlobal(old));
        }
        let label = self.trigger_label(stmt)?;
        self.emit_branch(OpCode::PushRelocateLater, &label);
        self.emit(OpCode::AddTrigger { blocking: false });
        Ok(())
    }

    fn compile_wait(&mut self, stmt: NodeId) -> Result<()> {
        if self.has_token(stmt, TokenType::Until) {
            let label = self.trigger_label(stmt)?;
            self.emit_branch(OpCode::PushRelocateLater, &label);
            self.emit(OpCode::AddTrigger { blocking: true });
            return Ok(());
        }
        let Some(&duration) = self.operands(stmt).first() else {
            return Err(self.unknown_node(stmt));
        };
        let duration = self.build_expr(duration)?;
        self.compile_expr(&duration)?;
        self.emit(OpCode::Wait);
        Ok(())
    }

    // ========================================================================
    // Built-in calls
    // ========================================================================

    /// Call the built-in `name` with the arguments `args` pushes and drop
    /// its result.
    fn call_builtin<F>(&mut self, name: &str, args: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        self.emit(OpCode::Push(Value::ArgMarker));
        args(self)?;
        self.emit(OpCode::Call(format!("{}()", name)));
        self.emit(OpCode::Pop);
        Ok(())
    }

    /// Built operands of `stmt`, in source order.
    fn operand_exprs(&self, stmt: NodeId) -> Result<Vec<Expr>> {
        self.operands(stmt)
            .into_iter()
            .map(|n| self.build_expr(n))
            .collect()
    }

    fn compile_unary_builtin(&mut self, stmt: NodeId, name: &str) -> Result<()> {
        let args = self.operand_exprs(stmt)?;
        let [arg] = &args[..] else {
            return Err(self.unknown_node(stmt));
        };
        self.call_builtin(name, |c| c.compile_expr(arg))
    }

    fn compile_print(&mut self, stmt: NodeId) -> Result<()> {
        let args = self.operand_exprs(stmt)?;
        let name = match args.len() {
            1 => "print",
            3 => "printat",
            _ => return Err(self.unknown_node(stmt)),
        };
        self.call_builtin(name, |c| args.iter().try_for_each(|a| c.compile_expr(a)))
    }

    fn compile_log(&mut self, stmt: NodeId) -> Result<()> {
        let args = self.operand_exprs(stmt)?;
        let [text, file] = &args[..] else {
            return Err(self.unknown_node(stmt));
        };
        self.call_builtin("logfile", |c| {
            c.compile_expr(text)?;
            c.compile_expr(file)
        })
    }

    /// `COPY file FROM|TO volume`.
    fn compile_copy(&mut self, stmt: NodeId) -> Result<()> {
        let args = self.operand_exprs(stmt)?;
        let [file, volume] = &args[..] else {
            return Err(self.unknown_node(stmt));
        };
        let direction = if self.has_token(stmt, TokenType::From) {
            "from"
        } else {
            "to"
        };
        self.call_builtin("copy", |c| {
            c.compile_expr(file)?;
            c.emit(OpCode::Push(Value::string(direction)));
            c.compile_expr(volume)
        })
    }

    /// `RENAME [VOLUME|FILE] old TO new`.
    fn compile_rename(&mut self, stmt: NodeId) -> Result<()> {
        let args = self.operand_exprs(stmt)?;
        let [old, new] = &args[..] else {
            return Err(self.unknown_node(stmt));
        };
        let what = if self.has_token(stmt, TokenType::Volume) {
            "volume"
        } else {
            "file"
        };
        self.call_builtin("rename", |c| {
            c.emit(OpCode::Push(Value::string(what)));
            c.compile_expr(old)?;
            c.compile_expr(new)
        })
    }

    /// DELETE and COMPILE: one required argument and an optional second one
    /// passed as null when absent.
    fn compile_optional_pair(&mut self, stmt: NodeId, name: &str) -> Result<()> {
        let args = self.operand_exprs(stmt)?;
        let (first, second) = match &args[..] {
            [first] => (first, None),
            [first, second] => (first, Some(second)),
            _ => return Err(self.unknown_node(stmt)),
        };
        self.call_builtin(name, |c| {
            c.compile_expr(first)?;
            match second {
                Some(second) => c.compile_expr(second),
                None => {
                    c.emit(OpCode::Push(Value::Null));
                    Ok(())
                }
            }
        })
    }

    /// `LIST`, `LIST things` prints; `LIST things IN var` stores the list.
    fn compile_list(&mut self, stmt: NodeId) -> Result<()> {
        let names: Vec<String> = self
            .tree
            .children(stmt)
            .iter()
            .filter_map(|&c| self.tree.token(c))
            .filter(|t| t.kind == TokenType::Identifier)
            .map(|t| t.text.to_lowercase())
            .collect();
        match &names[..] {
            [] => self.call_builtin("printlist", |c| {
                c.emit(OpCode::Push(Value::string("files")));
                Ok(())
            }),
            [what] => self.call_builtin("printlist", |c| {
                c.emit(OpCode::Push(Value::string(what.as_str())));
                Ok(())
            }),
            [what, var] => {
                self.emit(OpCode::Push(Value::ArgMarker));
                self.emit(OpCode::Push(Value::string(what.as_str())));
                self.emit(OpCode::Call("buildlist()".into()));
                let op = if self.lazy_global {
                    OpCode::Store(var.clone())
                } else {
                    OpCode::StoreExist(var.clone())
                };
                self.emit(op);
                Ok(())
            }
            _ => Err(self.unknown_node(stmt)),
        }
    }

    fn compile_unset(&mut self, stmt: NodeId) -> Result<()> {
        match self.token_word(stmt, TokenType::Identifier) {
            Some(name) => self.emit(OpCode::Push(Value::string(name))),
            None => self.emit(OpCode::Push(Value::Null)),
        };
        self.emit(OpCode::Unset);
        Ok(())
    }

    /// RUN either through the program's trampoline or through the `run()`
    /// built-in.
    fn compile_run(&mut self, stmt: NodeId) -> Result<()> {
        let args = match self.tree.find_child(stmt, NodeKind::ArgList) {
            Some(list) => self.build_args(list)?,
            None => Vec::new(),
        };

        if self.runs_in_place(stmt) {
            let label = self
                .entry_labels
                .get(&stmt)
                .cloned()
                .ok_or_else(|| self.unknown_node(stmt))?;
            self.emit(OpCode::Push(Value::ArgMarker));
            for arg in &args {
                self.compile_expr(arg)?;
            }
            self.emit_branch(OpCode::Call(String::new()), &label);
            self.emit(OpCode::Pop);
            return Ok(());
        }

        let name = self.program_name(stmt)?;
        let volume = self
            .tree
            .node_children(stmt)
            .find(|&n| self.tree.kind(n) != NodeKind::ArgList)
            .map(|n| self.build_expr(n))
            .transpose()?;
        let once = self.has_token(stmt, TokenType::Once);
        self.call_builtin("run", |c| {
            c.emit(OpCode::Push(Value::string(name)));
            match &volume {
                Some(volume) => c.compile_expr(volume)?,
                None => {
                    c.emit(OpCode::Push(Value::Null));
                }
            }
            c.emit(OpCode::Push(Value::Bool(once)));
            args.iter().try_for_each(|a| c.compile_expr(a))
        })
    }
}
