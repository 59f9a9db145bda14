// kscript-compiler - Symbol prepass for kerboscript
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Registration and out-of-line bodies.
//!
//! The prepass first registers every lock, function, trigger and
//! subprogram in the tree so forward references resolve. It then compiles
//! their bodies in post-order: a body nested inside another one is
//! finished before its container, because the container stores the inner
//! entry label when its scope is entered.
//!
//! Function, lock and trigger bodies are memoized by a hash of their source
//! text. Compiling the same text under the same identity again reuses the
//! existing body and its label.

use log::debug;

use kscript_parser::{NodeId, NodeKind, TokenType};

use super::Compiler;
use super::emit::Emitter;
use crate::error::Result;
use crate::opcode::{OpCode, Value};
use crate::symbols::{
    DEFAULT_FRAGMENT, Trigger, TriggerKind, content_hash, identity, lock_trigger_identity,
    trigger_identity,
};

impl Compiler<'_> {
    // ========================================================================
    // Registration
    // ========================================================================

    pub(super) fn register_symbols(&mut self) -> Result<()> {
        for node in self.tree.descendants(self.tree.root()) {
            match self.tree.kind(node) {
                NodeKind::DeclareFunctionClause => self.register_user_function(node, true)?,
                NodeKind::DeclareLockClause => self.register_user_function(node, false)?,
                NodeKind::OnStmt | NodeKind::WhenStmt | NodeKind::WaitStmt => {
                    if let Some((id, kind)) = self.trigger_key(node) {
                        self.ctx.triggers.get_or_create(&id, kind);
                    }
                }
                NodeKind::RunStmt if self.runs_in_place(node) => {
                    let name = self.program_name(node)?;
                    self.ctx.subprograms.get_or_create(&name);
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn register_user_function(&mut self, clause: NodeId, is_function: bool) -> Result<()> {
        let name = self.declared_name(clause)?;
        self.check_clobber(&name, clause)?;
        let stmt = self.tree.parent(clause).unwrap_or(clause);
        let (scope_id, scope_node) = self.declaration_placement(stmt, &name, !is_function);
        let func = self.ctx.user_functions.get_or_create(&name, scope_id);
        func.is_function = is_function;
        func.scope_node = scope_node;
        Ok(())
    }

    /// Name declared by a function or lock clause.
    pub(super) fn declared_name(&self, clause: NodeId) -> Result<String> {
        self.token_word(clause, TokenType::Identifier)
            .ok_or_else(|| self.unknown_node(clause))
    }

    /// Identity of the trigger compiled from `stmt`, if it makes one.
    pub(super) fn trigger_key(&self, stmt: NodeId) -> Option<(String, TriggerKind)> {
        let kind = match self.tree.kind(stmt) {
            NodeKind::OnStmt => TriggerKind::On,
            NodeKind::WhenStmt => TriggerKind::When,
            NodeKind::WaitStmt if self.has_token(stmt, TokenType::Until) => TriggerKind::WaitUntil,
            _ => return None,
        };
        let hash = content_hash(self.tree.tokens(stmt));
        let scope = self.scopes.declaring_scope(&self.tree, stmt);
        Some((trigger_identity(kind, hash, scope), kind))
    }

    /// Whether a RUN statement goes through a subprogram trampoline.
    pub(super) fn runs_in_place(&self, stmt: NodeId) -> bool {
        self.options.load_programs_in_same_address_space && !self.has_token(stmt, TokenType::On)
    }

    /// Program name of a RUN statement, unquoted.
    pub(super) fn program_name(&self, stmt: NodeId) -> Result<String> {
        self.tree
            .children(stmt)
            .iter()
            .filter_map(|&c| self.tree.token(c))
            .find(|t| {
                matches!(
                    t.kind,
                    TokenType::FileIdent | TokenType::Identifier | TokenType::String
                )
            })
            .map(|t| match t.kind {
                TokenType::String => t.text.trim_matches('"').to_string(),
                _ => t.text.clone(),
            })
            .ok_or_else(|| self.unknown_node(stmt))
    }

    // ========================================================================
    // Bodies
    // ========================================================================

    pub(super) fn compile_fragments(&mut self) -> Result<()> {
        for node in self.post_order() {
            match self.tree.kind(node) {
                NodeKind::DeclareFunctionClause => self.compile_function(node)?,
                NodeKind::DeclareLockClause => self.compile_lock(node)?,
                NodeKind::OnStmt | NodeKind::WhenStmt | NodeKind::WaitStmt => {
                    self.compile_trigger(node)?
                }
                NodeKind::RunStmt if self.runs_in_place(node) => self.compile_trampoline(node)?,
                NodeKind::InstructionBlock if self.is_lambda(node) => self.compile_lambda(node)?,
                _ => {}
            }
        }
        Ok(())
    }

    fn post_order(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.tree.node_count());
        let mut stack = vec![(self.tree.root(), false)];
        while let Some((node, expanded)) = stack.pop() {
            if expanded {
                out.push(node);
                continue;
            }
            stack.push((node, true));
            stack.extend(self.tree.children(node).iter().rev().map(|&c| (c, false)));
        }
        out
    }

    fn is_lambda(&self, block: NodeId) -> bool {
        self.tree
            .parent(block)
            .is_some_and(|p| self.tree.kind(p) == NodeKind::Atom)
    }

    /// Body shared by functions and lambdas: push the block's scope, store
    /// parameters, run the statements and return 0 if nothing returned
    /// earlier.
    pub(super) fn compile_function_body(&mut self, block: NodeId) -> Result<()> {
        let scope = self.scope_of(block)?;
        self.set_position(block);
        self.push_scope(scope);
        self.section.function_depth = Some(self.section.depth);
        self.initialize_scoped_functions(scope.id);
        self.compile_statements(block, true)?;
        self.emit(OpCode::Push(Value::Int(0)));
        self.emit(OpCode::Return(self.return_depth()));
        Ok(())
    }

    fn compile_function(&mut self, clause: NodeId) -> Result<()> {
        let name = self.declared_name(clause)?;
        let stmt = self.tree.parent(clause).unwrap_or(clause);
        let (scope_id, _) = self.declaration_placement(stmt, &name, false);
        let block = self
            .tree
            .find_child(clause, NodeKind::InstructionBlock)
            .ok_or_else(|| self.unknown_node(clause))?;
        let hash = content_hash(self.tree.tokens(block));
        let key = identity(&name, scope_id);

        let known = self
            .ctx
            .user_functions
            .by_identifier(&key)
            .is_some_and(|f| f.has_fragment(hash));
        let code = if known {
            debug!("reusing body of {}", key);
            None
        } else {
            Some(self.in_section(|c| c.compile_function_body(block))?)
        };

        let Some(func) = self.ctx.user_functions.by_identifier_mut(&key) else {
            return Err(self.unknown_node(clause));
        };
        match code {
            Some(code) => func.add_fragment(hash, code),
            None => func.set_current(hash),
        }
        if !func.is_global() || func.points_at(hash) {
            return Ok(());
        }

        // File-level function: (re)point it when the part loads
        let pointer = func.pointer_identifier().to_string();
        let label = func.func_label().unwrap_or_default().to_string();
        let init = self.in_section(|c| {
            c.set_position(clause);
            c.emit_branch(OpCode::PushDelegateRelocateLater { with_closure: true }, &label);
            c.emit(OpCode::StoreGlobal(pointer));
            Ok(())
        })?;
        if let Some(func) = self.ctx.user_functions.by_identifier_mut(&key) {
            func.repoint(hash, init);
        }
        Ok(())
    }

    fn compile_lambda(&mut self, block: NodeId) -> Result<()> {
        let code = self.in_section(|c| c.compile_function_body(block))?;
        if let Some(entry) = code.front() {
            self.entry_labels.insert(block, entry.label.clone());
        }
        self.lambdas.append(code);
        Ok(())
    }

    fn compile_lock(&mut self, clause: NodeId) -> Result<()> {
        let name = self.declared_name(clause)?;
        let stmt = self.tree.parent(clause).unwrap_or(clause);
        let (scope_id, _) = self.declaration_placement(stmt, &name, true);
        let key = identity(&name, scope_id);

        let initialized = self
            .ctx
            .user_functions
            .by_identifier(&key)
            .is_some_and(|f| f.is_initialized());
        if !initialized {
            self.initialize_lock(&key, &name, clause)?;
        }

        let expr_node = self
            .tree
            .node_children(clause)
            .next()
            .ok_or_else(|| self.unknown_node(clause))?;
        let hash = content_hash(self.tree.tokens(expr_node));
        let known = self
            .ctx
            .user_functions
            .by_identifier(&key)
            .is_some_and(|f| f.has_fragment(hash));
        let code = if known {
            debug!("reusing lock body of {}", key);
            None
        } else {
            let scope = self.scope_of(clause)?;
            let expr = self.build_expr(expr_node)?;
            Some(self.in_section(|c| {
                c.set_position(clause);
                c.push_scope(scope);
                c.emit(OpCode::ArgBottom);
                c.compile_expr(&expr)?;
                c.emit(OpCode::Return(1));
                Ok(())
            })?)
        };

        let Some(func) = self.ctx.user_functions.by_identifier_mut(&key) else {
            return Err(self.unknown_node(clause));
        };
        match code {
            Some(code) => func.add_fragment(hash, code),
            None => func.set_current(hash),
        }
        if let Some(label) = func.fragment_label(hash) {
            self.entry_labels.insert(clause, label.to_string());
        }
        Ok(())
    }

    /// First sight of a lock: the default body returning the variable of
    /// the same name, the pointer initialization for file-level locks and
    /// the polling trigger for system locks.
    fn initialize_lock(&mut self, key: &str, name: &str, clause: NodeId) -> Result<()> {
        let Some(func) = self.ctx.user_functions.by_identifier(key) else {
            return Err(self.unknown_node(clause));
        };
        let default_label = func.default_label().to_string();
        let pointer = func.pointer_identifier().to_string();
        let is_global = func.is_global();
        let is_system = func.is_system_lock();

        let mut default = self.in_section(|c| {
            c.set_position(clause);
            c.emit(OpCode::ArgBottom);
            c.emit(OpCode::Push(Value::identifier(name)));
            c.emit(OpCode::Return(0));
            Ok(())
        })?;
        if let Some(entry) = default.front_mut() {
            entry.label = default_label.clone();
        }

        let init = if is_global {
            Some(self.in_section(|c| {
                c.set_position(clause);
                c.emit_branch(
                    OpCode::PushDelegateRelocateLater {
                        with_closure: false,
                    },
                    &default_label,
                );
                c.emit(OpCode::StoreGlobal(pointer.clone()));
                Ok(())
            })?)
        } else {
            None
        };

        if let Some(func) = self.ctx.user_functions.by_identifier_mut(key) {
            func.add_fragment(DEFAULT_FRAGMENT, default);
            if let Some(init) = init {
                func.initialization = init;
            }
        }

        if is_system {
            let trigger_id = lock_trigger_identity(key);
            let code = self.in_section(|c| {
                c.set_position(clause);
                c.emit(OpCode::Push(Value::ArgMarker));
                c.emit(OpCode::Call(pointer.clone()));
                c.emit(OpCode::StoreGlobal(name.to_string()));
                c.emit(OpCode::Push(Value::Bool(true)));
                c.emit(OpCode::Return(0));
                Ok(())
            })?;
            self.ctx
                .triggers
                .get_or_create(&trigger_id, TriggerKind::LockPoll)
                .code = code;
        }
        Ok(())
    }

    fn compile_trigger(&mut self, stmt: NodeId) -> Result<()> {
        let Some((id, kind)) = self.trigger_key(stmt) else {
            return Ok(());
        };
        let compiled = self
            .ctx
            .triggers
            .get(&id)
            .is_some_and(Trigger::is_initialized);
        if !compiled {
            let names = Trigger::new(id.clone(), kind);
            let keep = names.keep_name();
            let old = names.old_value_name();
            let code = self.in_section(|c| {
                c.set_position(stmt);
                match kind {
                    TriggerKind::On => c.compile_on_body(stmt, &keep, &old),
                    TriggerKind::When => c.compile_when_body(stmt, &keep),
                    TriggerKind::WaitUntil => c.compile_wait_body(stmt),
                    TriggerKind::LockPoll => Ok(()),
                }
            })?;
            self.ctx.triggers.get_or_create(&id, kind).code = code;
        } else {
            debug!("reusing trigger {}", id);
        }

        if let Some(trigger) = self.ctx.triggers.get(&id) {
            self.entry_labels
                .insert(stmt, trigger.function_label().to_string());
        }
        Ok(())
    }

    /// `ON var body`: fires whenever the value differs from the last poll.
    fn compile_on_body(&mut self, stmt: NodeId, keep: &str, old: &str) -> Result<()> {
        let [target, body] = self.operands(stmt)[..] else {
            return Err(self.unknown_node(stmt));
        };
        let target = self.build_expr(target)?;
        let scope = self.scope_of(stmt)?;

        self.push_scope(scope);
        self.section.function_depth = Some(self.section.depth);
        self.emit(OpCode::Push(Value::identifier(old)));
        self.compile_expr(&target)?;
        self.emit(OpCode::Dup);
        self.emit(OpCode::StoreGlobal(old.to_string()));
        self.emit(OpCode::CompareEqual);
        let fire = self.emit(OpCode::BranchIfFalse);
        self.emit_keep_polling();
        self.patch_to_next(&[fire]);
        self.compile_fired_body(body, keep)
    }

    /// `WHEN cond THEN body`: fires once the condition holds.
    fn compile_when_body(&mut self, stmt: NodeId, keep: &str) -> Result<()> {
        let [cond, body] = self.operands(stmt)[..] else {
            return Err(self.unknown_node(stmt));
        };
        let cond = self.build_expr(cond)?;
        let scope = self.scope_of(stmt)?;

        self.push_scope(scope);
        self.section.function_depth = Some(self.section.depth);
        self.compile_expr(&cond)?;
        let fire = self.emit(OpCode::BranchIfTrue);
        self.emit_keep_polling();
        self.patch_to_next(&[fire]);
        self.compile_fired_body(body, keep)
    }

    /// `WAIT UNTIL cond`: polls until the condition holds, then removes
    /// itself, which releases the waiting program.
    fn compile_wait_body(&mut self, stmt: NodeId) -> Result<()> {
        let Some(&cond) = self.operands(stmt).first() else {
            return Err(self.unknown_node(stmt));
        };
        let cond = self.build_expr(cond)?;

        self.compile_expr(&cond)?;
        let done = self.emit(OpCode::BranchIfTrue);
        self.emit(OpCode::Push(Value::Bool(true)));
        self.emit(OpCode::Return(0));
        self.patch_to_next(&[done]);
        self.emit(OpCode::Push(Value::Bool(false)));
        self.emit(OpCode::Return(0));
        Ok(())
    }

    /// Not fired this tick: stay registered.
    fn emit_keep_polling(&mut self) {
        self.emit(OpCode::Push(Value::Bool(true)));
        self.emit(OpCode::Return(self.return_depth()));
    }

    /// Fired: run the body and let the keep flag decide. The flag starts
    /// false, only PRESERVE sets it.
    fn compile_fired_body(&mut self, body: NodeId, keep: &str) -> Result<()> {
        self.emit(OpCode::Push(Value::Bool(false)));
        self.emit(OpCode::StoreLocal(keep.to_string()));
        self.section.keep_names.push(keep.to_string());
        self.compile_statement(body)?;
        self.section.keep_names.pop();
        self.emit(OpCode::Push(Value::identifier(keep)));
        self.emit(OpCode::Return(self.return_depth()));
        Ok(())
    }

    /// Loader for a program run in the caller's address space: the first
    /// call loads it and caches its entry point, later calls go straight
    /// through the cached pointer.
    fn compile_trampoline(&mut self, stmt: NodeId) -> Result<()> {
        let name = self.program_name(stmt)?;
        let Some(program) = self.ctx.subprograms.get(&name) else {
            return Err(self.unknown_node(stmt));
        };

        if !program.is_initialized() {
            let pointer = program.pointer_identifier().to_string();
            let code = self.in_section(|c| {
                c.set_position(stmt);
                c.emit(OpCode::Push(Value::identifier(pointer.as_str())));
                c.emit(OpCode::Push(Value::Int(0)));
                c.emit(OpCode::CompareEqual);
                let loaded = c.emit(OpCode::BranchIfFalse);
                c.emit(OpCode::Push(Value::ArgMarker));
                c.emit(OpCode::Push(Value::string(name.as_str())));
                c.emit(OpCode::Push(Value::Null));
                c.emit(OpCode::Call("load()".into()));
                c.emit(OpCode::StoreGlobal(pointer.clone()));
                c.patch_to_next(&[loaded]);
                c.emit(OpCode::Call(pointer.clone()));
                c.emit(OpCode::Return(0));
                Ok(())
            })?;
            let init = self.in_section(|c| {
                c.set_position(stmt);
                c.emit(OpCode::Push(Value::Int(0)));
                c.emit(OpCode::StoreGlobal(pointer.clone()));
                Ok(())
            })?;
            let program = self.ctx.subprograms.get_or_create(&name);
            program.function_code = code;
            program.initialization = init;
        }

        if let Some(program) = self.ctx.subprograms.get(&name) {
            self.entry_labels
                .insert(stmt, program.function_label().to_string());
        }
        Ok(())
    }
}
