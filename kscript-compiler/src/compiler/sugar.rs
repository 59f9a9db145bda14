// kscript-compiler - Tree rewriting for kerboscript
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Parse tree rewrites that run before scopes are assigned.
//!
//! [`normalize`] splices out expression rules that only wrap a single
//! child, so `1` reaches the expression builder as a number rather than as
//! nine nested chain nodes. [`desugar_from_loops`] turns
//!
//! ```text
//! FROM { init } UNTIL cond STEP { step } DO body
//! ```
//!
//! into the equivalent
//!
//! ```text
//! { init UNTIL cond { body step } }
//! ```
//!
//! reusing the original tokens so positions in errors still point at the
//! source.

use log::trace;

use kscript_parser::{NodeId, NodeKind, ParseTree};

/// Splice out every single-child expression chain node.
pub fn normalize(tree: &mut ParseTree) {
    let root = tree.root();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        let children = tree.children(node).to_vec();
        for child in children {
            let mut target = child;
            while tree.kind(target).is_expression_chain() && tree.children(target).len() == 1 {
                target = tree.children(target)[0];
            }
            if target != child {
                tree.replace_child(node, child, target);
            }
            stack.push(target);
        }
    }
}

/// Rewrite every FROM loop into a block holding an UNTIL loop.
pub fn desugar_from_loops(tree: &mut ParseTree) {
    let loops: Vec<NodeId> = tree
        .descendants(tree.root())
        .into_iter()
        .filter(|&n| tree.kind(n) == NodeKind::FromLoop)
        .collect();
    for node in loops {
        rewrite_from(tree, node);
    }
}

// ============================================================================
// Internal helpers
// ============================================================================

/// Children of a FROM loop:
/// `FROM init UNTIL cond STEP step DO body`.
fn rewrite_from(tree: &mut ParseTree, node: NodeId) {
    let &[_, init, until_kw, cond, _, step, _, body] = tree.children(node) else {
        return;
    };
    trace!("desugaring FROM loop {}", node);

    let (step_open, step_body, step_close) = split_block(tree, step);
    let mut loop_children = vec![step_open, body];
    loop_children.extend(step_body);
    loop_children.extend(step_close);
    let loop_block = tree.add_detached(NodeKind::InstructionBlock);
    tree.set_children(loop_block, loop_children);

    let until = tree.add_detached(NodeKind::UntilStmt);
    tree.set_children(until, vec![until_kw, cond, loop_block]);

    let (init_open, init_body, init_close) = split_block(tree, init);
    let mut outer = vec![init_open];
    outer.extend(init_body);
    outer.push(until);
    outer.extend(init_close);
    tree.set_kind(node, NodeKind::InstructionBlock);
    tree.set_children(node, outer);
}

/// Opening brace, statements and closing brace of a block.
fn split_block(tree: &ParseTree, block: NodeId) -> (NodeId, Vec<NodeId>, Option<NodeId>) {
    let children = tree.children(block);
    let open = children.first().copied().unwrap_or(block);
    let close = children.last().copied().filter(|&c| c != open);
    let inner = match children.len() {
        0..=2 => Vec::new(),
        n => children[1..n - 1].to_vec(),
    };
    (open, inner, close)
}
