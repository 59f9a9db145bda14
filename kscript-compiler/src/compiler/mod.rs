// kscript-compiler - Code generation for kerboscript
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Code generation.
//!
//! One compile runs in phases over a single parse tree:
//!
//! 1. Rewriting: single-child expression rules are spliced out and FROM
//!    loops become UNTIL loops ([`sugar`]).
//! 2. Scopes: every scope-opening node gets a scope record.
//! 3. Prepass: every lock, function, trigger and subprogram is registered,
//!    then their bodies are compiled innermost first, so any later
//!    reference finds an entry label.
//! 4. Main: the program itself.
//!
//! Out-of-line bodies land in the [`Context`] collections; the main program
//! and any lambdas form the returned [`CodePart`].

mod codegen;
mod emit;
mod prepass;
mod statements;
pub mod sugar;

use im::Vector;
use log::{debug, trace};
use rustc_hash::FxHashMap;

use kscript_parser::{NodeId, NodeKind, ParseTree, TokenType};

use crate::code_part::CodePart;
use crate::context::Context;
use crate::error::{CompileError, ErrorKind, Result, node_position};
use crate::expr::{Expr, ExpressionBuilder, walk};
use crate::opcode::{Instruction, OpCode};
use crate::options::CompilerOptions;
use crate::scope::{GLOBAL_SCOPE, Scope, ScopeMap, assign_scopes};
use crate::symbols::{SYSTEM_LOCKS, UserFunction};

use emit::{Emitter, Section};

/// Compiles one parse tree into a [`Context`].
pub struct Compiler<'c> {
    ctx: &'c mut Context,
    options: &'c CompilerOptions,
    tree: ParseTree,
    scopes: ScopeMap,
    source_name: String,
    start_line: u32,
    /// Whether assignment may create a global.
    lazy_global: bool,
    /// Entry labels of out-of-line bodies, by the node they were compiled
    /// from.
    entry_labels: FxHashMap<NodeId, String>,
    /// Lambda bodies, shipped in the main part.
    lambdas: Vector<Instruction>,
    section: Section,
    line: u32,
    column: u32,
}

impl<'c> Compiler<'c> {
    /// `start_line` is the line of the file the tree's text starts at.
    pub fn new(
        ctx: &'c mut Context,
        options: &'c CompilerOptions,
        tree: ParseTree,
        source_name: &str,
        start_line: u32,
    ) -> Self {
        Compiler {
            ctx,
            options,
            tree,
            scopes: ScopeMap::default(),
            source_name: source_name.to_string(),
            start_line,
            lazy_global: true,
            entry_labels: FxHashMap::default(),
            lambdas: Vector::new(),
            section: Section::default(),
            line: 0,
            column: 0,
        }
    }

    /// Run every phase and return the main part.
    pub fn compile(mut self) -> Result<CodePart> {
        debug!("compiling {}", self.source_name);
        sugar::normalize(&mut self.tree);
        sugar::desugar_from_loops(&mut self.tree);

        self.scopes = assign_scopes(
            &self.tree,
            &mut self.ctx.scopes,
            !self.options.is_called_from_run,
        );
        debug!("{} scopes assigned", self.scopes.len());

        self.read_directives()?;
        self.register_symbols()?;
        self.compile_fragments()?;

        let main = self.in_section(|c| c.compile_root())?;
        debug!(
            "{}: {} main instructions, {} lambda instructions",
            self.source_name,
            main.len(),
            self.lambdas.len()
        );

        let mut part = CodePart::new(self.source_name);
        part.main = main;
        part.functions = self.lambdas;
        Ok(part)
    }

    // ========================================================================
    // Sections
    // ========================================================================

    /// Compile into a fresh section and return its instructions.
    ///
    /// The enclosing section and source position are restored afterwards.
    fn in_section<F>(&mut self, build: F) -> Result<Vector<Instruction>>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        let outer = std::mem::take(&mut self.section);
        let position = (self.line, self.column);
        let result = build(self).map(|()| self.close_section());
        self.section = outer;
        (self.line, self.column) = position;
        result
    }

    fn close_section(&mut self) -> Vector<Instruction> {
        if self.section.branch_pending || self.section.code.is_empty() {
            self.emit(OpCode::Nop);
        }
        std::mem::take(&mut self.section.code).into_iter().collect()
    }

    fn push_scope(&mut self, scope: Scope) {
        self.emit(OpCode::PushScope {
            id: scope.id,
            parent_id: scope.parent_id,
        });
        self.section.depth += 1;
    }

    fn pop_scope(&mut self) {
        self.emit(OpCode::PopScope(1));
        self.section.depth = self.section.depth.saturating_sub(1);
    }

    /// Scopes a RETURN at the current point has to pop.
    fn return_depth(&self) -> u16 {
        let entry = self.section.function_depth.unwrap_or(self.section.depth);
        1 + self.section.depth.saturating_sub(entry)
    }

    // ========================================================================
    // Tree access
    // ========================================================================

    fn set_position(&mut self, node: NodeId) {
        (self.line, self.column) = node_position(&self.tree, node, self.start_line);
    }

    fn error(&self, kind: ErrorKind, node: NodeId) -> CompileError {
        CompileError::at_node(kind, &self.tree, node, self.start_line)
    }

    fn unknown_node(&self, node: NodeId) -> CompileError {
        self.error(ErrorKind::UnknownNode(format!("{:?}", self.tree.kind(node))), node)
    }

    fn build_expr(&self, node: NodeId) -> Result<Expr> {
        ExpressionBuilder::new(&self.tree, self.start_line).build(node)
    }

    fn build_args(&self, list: NodeId) -> Result<Vec<Expr>> {
        ExpressionBuilder::new(&self.tree, self.start_line).build_args(list)
    }

    /// Non-token children of `node`.
    fn operands(&self, node: NodeId) -> Vec<NodeId> {
        self.tree.node_children(node).collect()
    }

    fn has_token(&self, node: NodeId, ty: TokenType) -> bool {
        self.tree.find_token_child(node, ty).is_some()
    }

    /// Lowercased text of the first `ty` token directly under `node`.
    fn token_word(&self, node: NodeId, ty: TokenType) -> Option<String> {
        self.tree
            .find_token_child(node, ty)
            .and_then(|t| self.tree.token(t))
            .map(|t| t.text.to_lowercase())
    }

    fn scope_of(&self, node: NodeId) -> Result<Scope> {
        self.scopes
            .scope_of(node)
            .ok_or_else(|| self.unknown_node(node))
    }

    // ========================================================================
    // Directives
    // ========================================================================

    /// Validate every directive and apply @LAZYGLOBAL.
    fn read_directives(&mut self) -> Result<()> {
        let root = self.tree.root();
        let directives: Vec<NodeId> = self
            .tree
            .descendants(root)
            .into_iter()
            .filter(|&n| self.tree.kind(n) == NodeKind::Directive)
            .collect();

        for node in directives {
            let name = self
                .token_word(node, TokenType::Identifier)
                .unwrap_or_default();
            if name != "lazyglobal" {
                return Err(self.error(ErrorKind::UnknownDirective(name), node));
            }
            if !self.leads_program(node) {
                return Err(self.error(ErrorKind::MisplacedLazyGlobal, node));
            }
            self.lazy_global = self.has_token(node, TokenType::On);
            debug!("lazyglobal {}", self.lazy_global);
        }
        Ok(())
    }

    /// Whether `node` sits at file level with only directives before it.
    fn leads_program(&self, node: NodeId) -> bool {
        let root = self.tree.root();
        if self.tree.parent(node) != Some(root) {
            return false;
        }
        self.tree
            .children(root)
            .iter()
            .take_while(|&&c| c != node)
            .all(|&c| matches!(self.tree.kind(c), NodeKind::Directive | NodeKind::EmptyStmt))
    }

    // ========================================================================
    // Symbols
    // ========================================================================

    /// Scope ids visible from `node`, innermost first, ending with global.
    fn scope_chain(&self, node: NodeId) -> Vec<u32> {
        let mut chain = Vec::new();
        let mut id = self.scopes.lookup(&self.tree, node);
        loop {
            chain.push(id);
            if id == GLOBAL_SCOPE {
                return chain;
            }
            id = self
                .ctx
                .scopes
                .get(id)
                .map(|s| s.parent_id)
                .unwrap_or(GLOBAL_SCOPE);
        }
    }

    /// The function or lock `name` as seen from `node`.
    fn resolve(&self, name: &str, node: NodeId) -> Option<&UserFunction> {
        self.scope_chain(node)
            .into_iter()
            .find_map(|id| self.ctx.user_functions.get(name, id))
    }

    /// Scope a function or lock declared by `stmt` belongs to, and the block
    /// whose entry stores its pointer (`None` when it is global).
    ///
    /// File-level declarations are global unless marked LOCAL; anything
    /// inside a block belongs to that block unless marked GLOBAL. System
    /// locks are always global.
    fn declaration_placement(&self, stmt: NodeId, name: &str, is_lock: bool) -> (u32, Option<NodeId>) {
        if self.has_token(stmt, TokenType::Global) || (is_lock && SYSTEM_LOCKS.contains(&name)) {
            return (GLOBAL_SCOPE, None);
        }
        let root = self.tree.root();
        let block = self
            .tree
            .ancestors(stmt)
            .skip(1)
            .find(|&n| n == root || self.tree.kind(n) == NodeKind::InstructionBlock)
            .unwrap_or(root);
        if block == root && !self.has_token(stmt, TokenType::Local) {
            return (GLOBAL_SCOPE, None);
        }
        match self.scopes.scope_of(block) {
            Some(scope) if !scope.is_global() => (scope.id, Some(block)),
            _ => (GLOBAL_SCOPE, None),
        }
    }

    /// Reject a declaration that would hide a built-in.
    fn check_clobber(&self, name: &str, node: NodeId) -> Result<()> {
        if self.options.allow_clobber_builtins {
            return Ok(());
        }
        let clobbers = self.options.is_builtin_function(name)
            || (self.options.is_bound_variable(name) && !SYSTEM_LOCKS.contains(&name));
        if clobbers {
            return Err(self.error(ErrorKind::ClobberBuiltin(name.to_string()), node));
        }
        Ok(())
    }

    /// Whether a call to `name` goes to a built-in function.
    ///
    /// Without a function lookup every unresolved call is taken as one.
    fn calls_builtin(&self, name: &str) -> bool {
        self.options
            .func_manager
            .as_ref()
            .is_none_or(|lookup| lookup.exists(name))
    }

    /// Store the pointers of the functions and locks that live in
    /// `scope_id`, right after the scope was pushed.
    fn initialize_scoped_functions(&mut self, scope_id: u32) {
        let inits: Vec<(bool, String, String)> = self
            .ctx
            .user_functions
            .iter()
            .filter(|f| !f.is_global() && f.scope_id() == scope_id)
            .filter_map(|f| {
                let label = if f.is_function {
                    f.func_label()?.to_string()
                } else {
                    f.default_label().to_string()
                };
                Some((f.is_function, label, f.pointer_identifier().to_string()))
            })
            .collect();

        for (with_closure, label, pointer) in inits {
            trace!("initializing {} in scope {}", pointer, scope_id);
            self.emit_branch(OpCode::PushDelegateRelocateLater { with_closure }, &label);
            self.emit(OpCode::StoreLocal(pointer));
        }
    }
}

impl Emitter for Compiler<'_> {
    fn emit(&mut self, op: OpCode) -> usize {
        let mut ins = Instruction::new(op);
        ins.label = self.ctx.next_label();
        ins.line = self.line;
        ins.column = self.column;
        trace!("{}", ins);
        self.section.code.push(ins);
        self.section.branch_pending = false;
        self.section.code.len() - 1
    }

    fn peek_label(&self) -> String {
        self.ctx.peek_label()
    }

    fn set_destination(&mut self, index: usize, label: &str) {
        if let Some(ins) = self.section.code.get_mut(index) {
            ins.dest_label = label.to_string();
        }
    }

    fn mark_branch_target(&mut self) {
        self.section.branch_pending = true;
    }

    fn compile_expr(&mut self, expr: &Expr) -> Result<()> {
        let position = (self.line, self.column);
        self.set_position(expr.node);
        let result = walk(self, expr);
        (self.line, self.column) = position;
        result
    }
}

/// Compile `tree` into `ctx` and return the main part.
pub fn compile_tree(
    ctx: &mut Context,
    options: &CompilerOptions,
    tree: ParseTree,
    source_name: &str,
    start_line: u32,
) -> Result<CodePart> {
    Compiler::new(ctx, options, tree, source_name, start_line).compile()
}
