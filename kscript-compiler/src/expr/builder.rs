// kscript-compiler - Expression builder for kerboscript
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Builds [`Expr`] trees from normalized parse subtrees.
//!
//! Operator chains fold left to right, `and`/`or` chains become one n-ary
//! node, and suffix chains unfold into nested suffix, call and index nodes.
//! The builder expects single-child expression rules to have been spliced
//! out already, but copes with them being present.

use num_traits::Num;

use kscript_parser::{NodeId, NodeKind, ParseTree, TokenType};

use super::{CompareOp, Expr, ExprKind, Scalar};
use crate::error::{CompileError, ErrorKind, Result};

pub struct ExpressionBuilder<'t> {
    tree: &'t ParseTree,
    start_line: u32,
}

impl<'t> ExpressionBuilder<'t> {
    pub fn new(tree: &'t ParseTree, start_line: u32) -> Self {
        ExpressionBuilder { tree, start_line }
    }

    /// Build the expression rooted at `node`.
    pub fn build(&self, node: NodeId) -> Result<Expr> {
        match self.tree.kind(node) {
            NodeKind::Expr => self.build_logic(node, true),
            NodeKind::AndExpr => self.build_logic(node, false),
            NodeKind::CompareExpr
            | NodeKind::ArithExpr
            | NodeKind::MultDivExpr
            | NodeKind::Factor => self.build_binary(node),
            NodeKind::UnaryExpr => self.build_unary(node),
            NodeKind::Suffix => self.build_suffix(node),
            NodeKind::SuffixTerm => self.build_term(node, None),
            NodeKind::Atom => self.build_atom(node),
            NodeKind::SciNumber => self.build_number(node),
            NodeKind::Token(TokenType::Identifier) => {
                Ok(Expr::new(ExprKind::Identifier(self.text(node)), node))
            }
            other => Err(self.error(ErrorKind::UnknownNode(format!("{:?}", other)), node)),
        }
    }

    // ========================================================================
    // Operators
    // ========================================================================

    fn build_logic(&self, node: NodeId, is_or: bool) -> Result<Expr> {
        let mut operands = self
            .tree
            .node_children(node)
            .map(|c| self.build(c))
            .collect::<Result<Vec<_>>>()?;
        if operands.len() == 1 {
            return Ok(operands.remove(0));
        }
        let kind = if is_or {
            ExprKind::Or(operands)
        } else {
            ExprKind::And(operands)
        };
        Ok(Expr::new(kind, node))
    }

    fn build_binary(&self, node: NodeId) -> Result<Expr> {
        let children = self.tree.children(node);
        let Some((&first, rest)) = children.split_first() else {
            return Err(self.error(ErrorKind::UnknownNode("empty expression".into()), node));
        };
        let mut lhs = self.build(first)?;
        for pair in rest.chunks(2) {
            let [op, operand] = pair else {
                return Err(self.error(ErrorKind::UnknownNode("dangling operator".into()), node));
            };
            let rhs = Box::new(self.build(*operand)?);
            let lhs_box = Box::new(lhs);
            let text = self.token_text(*op);
            let kind = match text.as_str() {
                "+" => ExprKind::Add(lhs_box, rhs),
                "-" => ExprKind::Subtract(lhs_box, rhs),
                "*" => ExprKind::Multiply(lhs_box, rhs),
                "/" => ExprKind::Divide(lhs_box, rhs),
                "^" => ExprKind::Power(lhs_box, rhs),
                other => match CompareOp::from_text(other) {
                    Some(cmp) => ExprKind::Compare(cmp, lhs_box, rhs),
                    None => {
                        return Err(self.error(ErrorKind::UnknownNode(other.to_string()), *op));
                    }
                },
            };
            lhs = Expr::new(kind, node);
        }
        Ok(lhs)
    }

    fn build_unary(&self, node: NodeId) -> Result<Expr> {
        let children = self.tree.children(node);
        let (op, operand) = match children {
            [operand] => (None, *operand),
            [op, operand] => (self.tree.token_type(*op), *operand),
            _ => return Err(self.error(ErrorKind::UnknownNode("unary".into()), node)),
        };
        let inner = self.build(operand)?;
        let kind = match op {
            None => return Ok(inner),
            Some(TokenType::PlusMinus) if self.token_text(children[0]) == "+" => {
                return Ok(inner);
            }
            Some(TokenType::PlusMinus) => ExprKind::Negate(Box::new(inner)),
            Some(TokenType::Not) => ExprKind::Not(Box::new(inner)),
            Some(TokenType::Defined) => match inner.kind {
                ExprKind::Identifier(name) => ExprKind::Defined(name),
                _ => {
                    let text = self.tree.text(operand);
                    return Err(self.error(ErrorKind::InvalidDefined(text), operand));
                }
            },
            Some(other) => {
                return Err(self.error(ErrorKind::UnknownNode(format!("{:?}", other)), node));
            }
        };
        Ok(Expr::new(kind, node))
    }

    // ========================================================================
    // Suffix chains
    // ========================================================================

    fn build_suffix(&self, node: NodeId) -> Result<Expr> {
        let mut terms = self.tree.node_children(node);
        let Some(first) = terms.next() else {
            return Err(self.error(ErrorKind::UnknownNode("empty suffix".into()), node));
        };
        let mut expr = self.build_term(first, None)?;
        for term in terms {
            expr = self.build_term(term, Some(expr))?;
        }
        Ok(expr)
    }

    /// One `atom trailer*` segment, applied to `target` when it follows a
    /// colon.
    fn build_term(&self, term: NodeId, target: Option<Expr>) -> Result<Expr> {
        let (atom, trailers): (NodeId, &[NodeId]) = match self.tree.kind(term) {
            NodeKind::SuffixTerm => match self.tree.children(term).split_first() {
                Some((atom, trailers)) => (*atom, trailers),
                None => return Err(self.error(ErrorKind::UnknownNode("empty term".into()), term)),
            },
            _ => (term, &[]),
        };

        let mut trailers = trailers.iter().copied().peekable();
        let leading_call = trailers
            .peek()
            .copied()
            .filter(|&t| self.tree.kind(t) == NodeKind::FunctionTrailer);

        let mut expr = match target {
            None => match (self.atom_identifier(atom), leading_call) {
                (Some(name), Some(trailer)) => {
                    trailers.next();
                    let kind = match self.call_args(trailer)? {
                        Some(args) => ExprKind::DirectCall(name, args),
                        None => ExprKind::FunctionAddress(name),
                    };
                    Expr::new(kind, term)
                }
                _ => self.build(atom)?,
            },
            Some(target) => {
                let Some(name) = self.atom_identifier(atom) else {
                    let text = self.tree.text(atom);
                    return Err(self.error(ErrorKind::InvalidSuffix(text), atom));
                };
                let kind = match leading_call {
                    Some(trailer) => {
                        trailers.next();
                        match self.call_args(trailer)? {
                            Some(args) => ExprKind::CallSuffix(Box::new(target), name, args),
                            None => ExprKind::SuffixAddress(Box::new(target), name),
                        }
                    }
                    None => ExprKind::GetSuffix(Box::new(target), name),
                };
                Expr::new(kind, term)
            }
        };

        for trailer in trailers {
            let kind = match self.tree.kind(trailer) {
                NodeKind::FunctionTrailer => match self.call_args(trailer)? {
                    Some(args) => ExprKind::IndirectCall(Box::new(expr), args),
                    None => {
                        let text = self.tree.text(trailer);
                        return Err(self.error(ErrorKind::InvalidSuffix(text), trailer));
                    }
                },
                NodeKind::ArrayTrailer => {
                    let index = self.index_expr(trailer)?;
                    ExprKind::GetIndex(Box::new(expr), Box::new(index))
                }
                other => {
                    return Err(self.error(ErrorKind::UnknownNode(format!("{:?}", other)), trailer));
                }
            };
            expr = Expr::new(kind, term);
        }
        Ok(expr)
    }

    /// Arguments of a call trailer, or `None` for the `@` address trailer.
    fn call_args(&self, trailer: NodeId) -> Result<Option<Vec<Expr>>> {
        if self
            .tree
            .find_token_child(trailer, TokenType::AtSign)
            .is_some()
        {
            return Ok(None);
        }
        let Some(list) = self.tree.find_child(trailer, NodeKind::ArgList) else {
            return Ok(Some(Vec::new()));
        };
        self.build_args(list).map(Some)
    }

    /// Build every expression of an argument list.
    pub fn build_args(&self, list: NodeId) -> Result<Vec<Expr>> {
        self.tree
            .node_children(list)
            .map(|c| self.build(c))
            .collect()
    }

    fn index_expr(&self, trailer: NodeId) -> Result<Expr> {
        if let Some(inner) = self.tree.node_children(trailer).next() {
            return self.build(inner);
        }
        // `#` form: the index is the token after the hash
        let Some(&tok) = self.tree.children(trailer).get(1) else {
            return Err(self.error(ErrorKind::UnknownNode("index".into()), trailer));
        };
        match self.tree.token_type(tok) {
            Some(TokenType::Integer) => {
                let text = self.token_text(tok);
                let scalar = self.parse_scalar(&text, tok)?;
                Ok(Expr::new(ExprKind::Scalar(scalar), tok))
            }
            _ => Ok(Expr::new(ExprKind::Identifier(self.text(tok)), tok)),
        }
    }

    // ========================================================================
    // Atoms
    // ========================================================================

    fn build_atom(&self, node: NodeId) -> Result<Expr> {
        let children = self.tree.children(node);
        match children {
            [only] => match self.tree.kind(*only) {
                NodeKind::Token(TokenType::TrueFalse) => {
                    let value = self.token_text(*only).eq_ignore_ascii_case("true");
                    Ok(Expr::new(ExprKind::Bool(value), node))
                }
                NodeKind::Token(TokenType::Identifier) => {
                    Ok(Expr::new(ExprKind::Identifier(self.text(*only)), node))
                }
                NodeKind::Token(TokenType::String) => {
                    let value = unquote(&self.token_text(*only));
                    Ok(Expr::new(ExprKind::Str(value), node))
                }
                NodeKind::InstructionBlock => Ok(Expr::new(ExprKind::Lambda(*only), node)),
                _ => self.build(*only),
            },
            [_, inner, _] => self.build(*inner),
            _ => Err(self.error(ErrorKind::UnknownNode("atom".into()), node)),
        }
    }

    fn build_number(&self, node: NodeId) -> Result<Expr> {
        let children = self.tree.children(node);
        let Some(&mantissa) = children.first() else {
            return Err(self.error(ErrorKind::UnknownNode("number".into()), node));
        };
        let text = self.token_text(mantissa);
        if children.len() == 1 {
            let scalar = self.parse_scalar(&text, node)?;
            return Ok(Expr::new(ExprKind::Scalar(scalar), node));
        }

        // Exponent form: mantissa E [sign] digits
        let exponent_text: String = children[2..]
            .iter()
            .map(|&c| self.token_text(c))
            .collect();
        let full = self.tree.text(node);
        let base = <f64 as Num>::from_str_radix(&text, 10)
            .map_err(|_| self.error(ErrorKind::InvalidNumber(full.clone()), node))?;
        let exponent = <i32 as Num>::from_str_radix(&exponent_text, 10)
            .map_err(|_| self.error(ErrorKind::InvalidNumber(full), node))?;
        let value = base * 10f64.powi(exponent);
        Ok(Expr::new(ExprKind::Scalar(Scalar::Double(value)), node))
    }

    /// Integer first, then floating point.
    fn parse_scalar(&self, text: &str, node: NodeId) -> Result<Scalar> {
        if let Ok(n) = <i32 as Num>::from_str_radix(text, 10) {
            return Ok(Scalar::Int(n));
        }
        <f64 as Num>::from_str_radix(text, 10)
            .map(Scalar::Double)
            .map_err(|_| self.error(ErrorKind::InvalidNumber(text.to_string()), node))
    }

    // ========================================================================
    // Internal helpers
    // ========================================================================

    /// Lowercased name if `atom` is a bare identifier.
    fn atom_identifier(&self, atom: NodeId) -> Option<String> {
        match self.tree.kind(atom) {
            NodeKind::Atom => match self.tree.children(atom) {
                [only] if self.tree.is_token(*only, TokenType::Identifier) => {
                    Some(self.text(*only))
                }
                _ => None,
            },
            NodeKind::Token(TokenType::Identifier) => Some(self.text(atom)),
            _ => None,
        }
    }

    fn token_text(&self, node: NodeId) -> String {
        self.tree
            .token(node)
            .map(|t| t.text.clone())
            .unwrap_or_default()
    }

    /// Lowercased token text, for names.
    fn text(&self, node: NodeId) -> String {
        self.token_text(node).to_lowercase()
    }

    fn error(&self, kind: ErrorKind, node: NodeId) -> CompileError {
        CompileError::at_node(kind, self.tree, node, self.start_line)
    }
}

/// Strip the surrounding quotes and undouble embedded ones.
fn unquote(text: &str) -> String {
    let inner = text
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(text);
    inner.replace("\"\"", "\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::sugar::normalize;
    use kscript_parser::parse_program;

    /// Build the expression of `print <src>.`
    fn build(src: &str) -> Result<Expr> {
        let mut tree = parse_program(&format!("print {}.", src), "test").unwrap();
        normalize(&mut tree);
        let stmt = tree.children(tree.root())[0];
        let node = tree.node_children(stmt).next().unwrap();
        ExpressionBuilder::new(&tree, 1).build(node)
    }

    fn kind(src: &str) -> ExprKind {
        build(src).unwrap().kind
    }

    #[test]
    fn test_literals() {
        assert_eq!(kind("42"), ExprKind::Scalar(Scalar::Int(42)));
        assert_eq!(kind("2.5"), ExprKind::Scalar(Scalar::Double(2.5)));
        assert_eq!(kind("1e3"), ExprKind::Scalar(Scalar::Double(1000.0)));
        assert_eq!(kind("TRUE"), ExprKind::Bool(true));
        assert_eq!(kind("\"say \"\"hi\"\"\""), ExprKind::Str("say \"hi\"".into()));
        assert_eq!(kind("Ship"), ExprKind::Identifier("ship".into()));
    }

    #[test]
    fn test_large_integer_falls_back_to_double() {
        assert_eq!(
            kind("3000000000"),
            ExprKind::Scalar(Scalar::Double(3_000_000_000.0))
        );
    }

    #[test]
    fn test_binary_folds_left() {
        // (1 - 2) - 3
        match kind("1 - 2 - 3") {
            ExprKind::Subtract(lhs, rhs) => {
                assert!(matches!(lhs.kind, ExprKind::Subtract(..)));
                assert_eq!(rhs.kind, ExprKind::Scalar(Scalar::Int(3)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_precedence() {
        match kind("1 + 2 * 3") {
            ExprKind::Add(_, rhs) => assert!(matches!(rhs.kind, ExprKind::Multiply(..))),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_logic_chains_are_flat() {
        match kind("a or b or c and d") {
            ExprKind::Or(items) => {
                assert_eq!(items.len(), 3);
                assert!(matches!(items[2].kind, ExprKind::And(ref inner) if inner.len() == 2));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unary() {
        assert!(matches!(kind("-x"), ExprKind::Negate(_)));
        assert_eq!(kind("+x"), ExprKind::Identifier("x".into()));
        assert!(matches!(kind("not x"), ExprKind::Not(_)));
        assert_eq!(kind("defined x"), ExprKind::Defined("x".into()));
        let err = build("defined 1").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::InvalidDefined(_)));
    }

    #[test]
    fn test_suffix_chain() {
        match kind("ship:orbit:apoapsis") {
            ExprKind::GetSuffix(target, name) => {
                assert_eq!(name, "apoapsis");
                assert!(matches!(target.kind, ExprKind::GetSuffix(_, ref n) if n == "orbit"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_calls_and_addresses() {
        assert!(matches!(kind("f(1, 2)"), ExprKind::DirectCall(ref n, ref a) if n == "f" && a.len() == 2));
        assert_eq!(kind("f@"), ExprKind::FunctionAddress("f".into()));
        assert!(matches!(kind("list:add(1)"), ExprKind::CallSuffix(_, ref n, _) if n == "add"));
        assert!(matches!(kind("list:add@"), ExprKind::SuffixAddress(_, ref n) if n == "add"));
        assert!(matches!(kind("f()()"), ExprKind::IndirectCall(..)));
    }

    #[test]
    fn test_indexing() {
        assert!(matches!(kind("l[1]"), ExprKind::GetIndex(..)));
        match kind("l#2") {
            ExprKind::GetIndex(_, index) => {
                assert_eq!(index.kind, ExprKind::Scalar(Scalar::Int(2)))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_invalid_suffix_name() {
        let err = build("ship:(1)").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::InvalidSuffix(_)));
        assert_eq!(err.line, 1);
    }

    #[test]
    fn test_lambda() {
        assert!(matches!(kind("{ return 1. }"), ExprKind::Lambda(_)));
    }
}
