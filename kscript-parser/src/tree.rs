// kscript-parser - Parse tree for kerboscript
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Arena-allocated parse tree.
//!
//! Nodes live in a single `Vec` owned by [`ParseTree`] and refer to each other
//! by [`NodeId`]. Children are listed top-down; the parent link is a plain
//! index used for ancestor walks, not an ownership edge.

use std::fmt;

use crate::token::{Token, TokenType};

/// Index of a node in its [`ParseTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Grammar rule (or terminal) a node was produced by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// A terminal carrying the token of the given type.
    Token(TokenType),

    // =========================================================================
    // Program structure
    // =========================================================================
    Start,
    Directive,
    InstructionBlock,
    EmptyStmt,

    // =========================================================================
    // Statements
    // =========================================================================
    SetStmt,
    IfStmt,
    UntilStmt,
    FromLoop,
    UnlockStmt,
    PrintStmt,
    OnStmt,
    ToggleStmt,
    WaitStmt,
    WhenStmt,
    StageStmt,
    ClearStmt,
    AddStmt,
    RemoveStmt,
    LogStmt,
    BreakStmt,
    PreserveStmt,
    DeclareStmt,
    DeclareParameterClause,
    DeclareFunctionClause,
    DeclareLockClause,
    DeclareIdentifierClause,
    ReturnStmt,
    SwitchStmt,
    CopyStmt,
    RenameStmt,
    DeleteStmt,
    EditStmt,
    RunStmt,
    CompileStmt,
    ListStmt,
    RebootStmt,
    ShutdownStmt,
    ForStmt,
    UnsetStmt,
    IdentifierLedStmt,

    // =========================================================================
    // Expressions
    // =========================================================================
    ArgList,
    Expr,
    AndExpr,
    CompareExpr,
    ArithExpr,
    MultDivExpr,
    UnaryExpr,
    Factor,
    Suffix,
    SuffixTerm,
    FunctionTrailer,
    ArrayTrailer,
    Atom,
    SciNumber,
}

impl NodeKind {
    /// Expression nonterminals that may collapse to their only child.
    pub fn is_expression_chain(self) -> bool {
        matches!(
            self,
            NodeKind::Expr
                | NodeKind::AndExpr
                | NodeKind::CompareExpr
                | NodeKind::ArithExpr
                | NodeKind::MultDivExpr
                | NodeKind::UnaryExpr
                | NodeKind::Factor
                | NodeKind::Suffix
                | NodeKind::SuffixTerm
        )
    }

    /// Statement-level nodes, i.e. everything a block may directly contain.
    pub fn is_statement(self) -> bool {
        !matches!(
            self,
            NodeKind::Token(_)
                | NodeKind::Start
                | NodeKind::DeclareParameterClause
                | NodeKind::DeclareFunctionClause
                | NodeKind::DeclareLockClause
                | NodeKind::DeclareIdentifierClause
                | NodeKind::ArgList
                | NodeKind::FunctionTrailer
                | NodeKind::ArrayTrailer
                | NodeKind::Atom
                | NodeKind::SciNumber
        ) && !self.is_expression_chain()
    }
}

/// A single node.
#[derive(Debug, Clone)]
pub struct ParseNode {
    pub kind: NodeKind,
    pub children: Vec<NodeId>,
    pub parent: Option<NodeId>,
    /// Present on terminals only.
    pub token: Option<Token>,
}

/// The whole tree for one source text.
#[derive(Debug, Clone)]
pub struct ParseTree {
    nodes: Vec<ParseNode>,
    root: NodeId,
}

impl ParseTree {
    /// Create a tree holding only an empty root of the given kind.
    pub fn new(root_kind: NodeKind) -> Self {
        let root = ParseNode {
            kind: root_kind,
            children: Vec::new(),
            parent: None,
            token: None,
        };
        ParseTree {
            nodes: vec![root],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of nodes in the arena, detached ones included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// True if the root has no children.
    pub fn is_empty(&self) -> bool {
        self.node(self.root).children.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &ParseNode {
        &self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.node(id).kind
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn child(&self, id: NodeId, index: usize) -> Option<NodeId> {
        self.node(id).children.get(index).copied()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn token(&self, id: NodeId) -> Option<&Token> {
        self.node(id).token.as_ref()
    }

    /// Type of the token on a terminal node.
    pub fn token_type(&self, id: NodeId) -> Option<TokenType> {
        self.token(id).map(|t| t.kind)
    }

    /// True if `id` is a terminal of type `ty`.
    pub fn is_token(&self, id: NodeId, ty: TokenType) -> bool {
        self.token_type(id) == Some(ty)
    }

    /// First child that is a terminal of type `ty`.
    pub fn find_token_child(&self, id: NodeId, ty: TokenType) -> Option<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .find(|&c| self.is_token(c, ty))
    }

    /// First child that is a nonterminal of kind `kind`.
    pub fn find_child(&self, id: NodeId, kind: NodeKind) -> Option<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .find(|&c| self.kind(c) == kind)
    }

    /// Children that are not bare tokens.
    pub fn node_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id)
            .iter()
            .copied()
            .filter(|&c| self.token(c).is_none())
    }

    /// Leftmost token in the subtree rooted at `id`.
    pub fn first_token(&self, id: NodeId) -> Option<&Token> {
        if let Some(tok) = self.token(id) {
            return Some(tok);
        }
        self.children(id).iter().find_map(|&c| self.first_token(c))
    }

    /// Walk from `id` up to the root, `id` included.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: Some(id),
        }
    }

    /// Concatenated token text of the whole subtree, without skipped text.
    pub fn text(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        if let Some(tok) = self.token(id) {
            out.push_str(&tok.text);
        }
        for &c in self.children(id) {
            self.collect_text(c, out);
        }
    }

    /// Tokens of the subtree rooted at `id`, in source order.
    pub fn tokens(&self, id: NodeId) -> impl Iterator<Item = &Token> + '_ {
        self.descendants(id)
            .into_iter()
            .filter_map(move |n| self.token(n))
    }

    /// Pre-order list of the subtree rooted at `id`.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            out.push(n);
            stack.extend(self.children(n).iter().rev());
        }
        out
    }

    // ========================================================================
    // Construction and rewriting
    // ========================================================================

    /// Add a nonterminal as the last child of `parent`.
    pub fn add_node(&mut self, kind: NodeKind, parent: NodeId) -> NodeId {
        let id = self.alloc(kind, Some(parent), None);
        self.nodes[parent.index()].children.push(id);
        id
    }

    /// Add a terminal as the last child of `parent`.
    pub fn add_token(&mut self, token: Token, parent: NodeId) -> NodeId {
        let id = self.alloc(NodeKind::Token(token.kind), Some(parent), Some(token));
        self.nodes[parent.index()].children.push(id);
        id
    }

    /// Add a node that is not attached anywhere yet.
    pub fn add_detached(&mut self, kind: NodeKind) -> NodeId {
        self.alloc(kind, None, None)
    }

    /// Replace the child list of `id`, re-parenting every new child.
    pub fn set_children(&mut self, id: NodeId, children: Vec<NodeId>) {
        for &c in &children {
            self.nodes[c.index()].parent = Some(id);
        }
        self.nodes[id.index()].children = children;
    }

    pub fn set_kind(&mut self, id: NodeId, kind: NodeKind) {
        self.nodes[id.index()].kind = kind;
    }

    /// Put `new` where `old` sits in its parent's child list.
    pub fn replace_child(&mut self, parent: NodeId, old: NodeId, new: NodeId) {
        let children = &mut self.nodes[parent.index()].children;
        if let Some(slot) = children.iter_mut().find(|c| **c == old) {
            *slot = new;
            self.nodes[new.index()].parent = Some(parent);
            self.nodes[old.index()].parent = None;
        }
    }

    fn alloc(&mut self, kind: NodeKind, parent: Option<NodeId>, token: Option<Token>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(ParseNode {
            kind,
            children: Vec::new(),
            parent,
            token,
        });
        id
    }

    /// Indented outline of the tree, one node per line.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.dump_node(self.root, 0, &mut out);
        out
    }

    fn dump_node(&self, id: NodeId, depth: usize, out: &mut String) {
        let pad = "  ".repeat(depth);
        match self.token(id) {
            Some(tok) => out.push_str(&format!("{}{:?} {:?}\n", pad, tok.kind, tok.text)),
            None => out.push_str(&format!("{}{:?}\n", pad, self.kind(id))),
        }
        for &c in self.children(id) {
            self.dump_node(c, depth + 1, out);
        }
    }
}

/// Iterator returned by [`ParseTree::ancestors`].
pub struct Ancestors<'a> {
    tree: &'a ParseTree,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.tree.parent(current);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn tok(kind: TokenType, text: &str) -> Token {
        Token {
            kind,
            text: text.to_string(),
            file: Rc::from("test"),
            line: 1,
            column: 1,
            start: 0,
            end: text.len(),
            skipped: Vec::new(),
        }
    }

    #[test]
    fn test_parent_links_and_ancestors() {
        let mut tree = ParseTree::new(NodeKind::Start);
        let block = tree.add_node(NodeKind::InstructionBlock, tree.root());
        let stmt = tree.add_node(NodeKind::BreakStmt, block);
        tree.add_token(tok(TokenType::Break, "break"), stmt);

        assert_eq!(tree.parent(stmt), Some(block));
        let chain: Vec<_> = tree.ancestors(stmt).collect();
        assert_eq!(chain, vec![stmt, block, tree.root()]);
    }

    #[test]
    fn test_text_concatenates_tokens() {
        let mut tree = ParseTree::new(NodeKind::Start);
        let stmt = tree.add_node(NodeKind::PrintStmt, tree.root());
        tree.add_token(tok(TokenType::Print, "print"), stmt);
        tree.add_token(tok(TokenType::Integer, "1"), stmt);
        tree.add_token(tok(TokenType::Eoi, "."), stmt);
        assert_eq!(tree.text(stmt), "print1.");
        assert_eq!(tree.first_token(stmt).map(|t| t.text.as_str()), Some("print"));
    }

    #[test]
    fn test_replace_child_reparents() {
        let mut tree = ParseTree::new(NodeKind::Start);
        let old = tree.add_node(NodeKind::FromLoop, tree.root());
        let new = tree.add_detached(NodeKind::InstructionBlock);
        tree.replace_child(tree.root(), old, new);
        assert_eq!(tree.children(tree.root()), &[new]);
        assert_eq!(tree.parent(new), Some(tree.root()));
        assert_eq!(tree.parent(old), None);
    }
}
