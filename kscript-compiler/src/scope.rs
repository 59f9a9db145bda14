// kscript-compiler - Lexical scopes for kerboscript
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Scope records and the scope-assignment pass.
//!
//! Every scope-opening parse node gets exactly one [`Scope`] before code
//! generation starts. Ids come from a counter that lives in the
//! [`ScopeArchive`] and only ever increases, so trees compiled one after the
//! other into the same context never share an id. Id 0 is the global scope.

use indexmap::IndexMap;
use log::trace;
use rustc_hash::FxHashMap;

use kscript_parser::{NodeId, NodeKind, ParseTree};

/// The global scope id.
pub const GLOBAL_SCOPE: u32 = 0;

/// One lexical scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scope {
    pub id: u32,
    pub parent_id: u32,
    /// Nesting depth below the global scope.
    pub depth: u16,
}

impl Scope {
    pub fn global() -> Self {
        Scope {
            id: GLOBAL_SCOPE,
            parent_id: GLOBAL_SCOPE,
            depth: 0,
        }
    }

    pub fn is_global(&self) -> bool {
        self.id == GLOBAL_SCOPE
    }
}

/// Every scope ever allocated in a context, by id.
#[derive(Debug, Clone)]
pub struct ScopeArchive {
    next_id: u32,
    scopes: IndexMap<u32, Scope>,
}

impl ScopeArchive {
    pub fn new() -> Self {
        let mut scopes = IndexMap::new();
        scopes.insert(GLOBAL_SCOPE, Scope::global());
        ScopeArchive { next_id: 1, scopes }
    }

    /// Allocate a fresh scope nested in `parent_id`.
    pub fn allocate(&mut self, parent_id: u32) -> Scope {
        let depth = self.get(parent_id).map(|p| p.depth + 1).unwrap_or(1);
        let scope = Scope {
            id: self.next_id,
            parent_id,
            depth,
        };
        self.next_id += 1;
        self.scopes.insert(scope.id, scope);
        scope
    }

    pub fn get(&self, id: u32) -> Option<&Scope> {
        self.scopes.get(&id)
    }

    /// Number of scopes allocated so far, the global scope included.
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// The id the next allocation will get.
    pub fn peek_next_id(&self) -> u32 {
        self.next_id
    }
}

impl Default for ScopeArchive {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-tree map from scope-opening nodes to their scope.
#[derive(Debug, Clone, Default)]
pub struct ScopeMap {
    by_node: FxHashMap<NodeId, Scope>,
}

impl ScopeMap {
    /// The scope opened by `node` itself, if it opens one.
    pub fn scope_of(&self, node: NodeId) -> Option<Scope> {
        self.by_node.get(&node).copied()
    }

    /// Id of the innermost scope enclosing `node`, `node` included.
    pub fn lookup(&self, tree: &ParseTree, node: NodeId) -> u32 {
        tree.ancestors(node)
            .find_map(|n| self.by_node.get(&n))
            .map(|s| s.id)
            .unwrap_or(GLOBAL_SCOPE)
    }

    /// Id of the scope a declaration at `node` belongs to.
    ///
    /// Starts from the parent, so a node that opens its own scope is placed
    /// in the enclosing one.
    pub fn declaring_scope(&self, tree: &ParseTree, node: NodeId) -> u32 {
        tree.parent(node)
            .map(|p| self.lookup(tree, p))
            .unwrap_or(GLOBAL_SCOPE)
    }

    pub fn len(&self) -> usize {
        self.by_node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_node.is_empty()
    }
}

/// Whether `kind` opens a lexical scope.
pub fn opens_scope(kind: NodeKind) -> bool {
    matches!(
        kind,
        NodeKind::InstructionBlock
            | NodeKind::DeclareLockClause
            | NodeKind::ForStmt
            | NodeKind::OnStmt
            | NodeKind::WhenStmt
    )
}

/// Assign a scope to every scope-opening node of `tree`.
///
/// With `root_is_global` the root maps to the global scope instead of
/// getting a fresh id.
pub fn assign_scopes(tree: &ParseTree, archive: &mut ScopeArchive, root_is_global: bool) -> ScopeMap {
    let mut map = ScopeMap::default();
    let root = tree.root();
    let root_scope = if root_is_global {
        Scope::global()
    } else {
        archive.allocate(GLOBAL_SCOPE)
    };
    map.by_node.insert(root, root_scope);

    let mut stack = vec![root_scope.id];
    for &child in tree.children(root) {
        visit(tree, child, archive, &mut map, &mut stack);
    }
    map
}

// ============================================================================
// Internal helpers
// ============================================================================

fn visit(
    tree: &ParseTree,
    node: NodeId,
    archive: &mut ScopeArchive,
    map: &mut ScopeMap,
    stack: &mut Vec<u32>,
) {
    if tree.token(node).is_some() {
        return;
    }
    let opened = opens_scope(tree.kind(node));
    if opened {
        let parent = stack.last().copied().unwrap_or(GLOBAL_SCOPE);
        let scope = archive.allocate(parent);
        trace!(
            "scope {} (parent {}) for {:?} {}",
            scope.id,
            parent,
            tree.kind(node),
            node
        );
        map.by_node.insert(node, scope);
        stack.push(scope.id);
    }
    for &child in tree.children(node) {
        visit(tree, child, archive, map, stack);
    }
    if opened {
        stack.pop();
    }
}
