// kscript-parser - Parser for kerboscript
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Recursive descent parser for kerboscript source code.
//!
//! Builds a [`ParseTree`] in which every grammar rule becomes one node whose
//! children are the rule's tokens and sub-rules in source order. Parsing
//! stops at the first error.

use std::fmt;

use crate::lexer::Lexer;
use crate::token::{Token, TokenType};
use crate::tree::{NodeId, NodeKind, ParseTree};

/// Parser error with position information.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub file: String,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Parse error at {}:{}:{}: {}",
            self.file, self.line, self.column, self.message
        )
    }
}

impl std::error::Error for ParseError {}

type Result<T> = std::result::Result<T, ParseError>;

/// The parser turns tokens into a [`ParseTree`].
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    tree: ParseTree,
}

impl<'a> Parser<'a> {
    /// Create a new parser for the given source code.
    pub fn new(source: &'a str, file: &str) -> Self {
        Parser {
            lexer: Lexer::new(source, file),
            tree: ParseTree::new(NodeKind::Start),
        }
    }

    /// Parse the whole program.
    pub fn parse(mut self) -> Result<ParseTree> {
        let root = self.tree.root();
        loop {
            match self.peek_kind() {
                TokenType::Eof => break,
                TokenType::AtSign => self.parse_directive(root)?,
                _ => self.parse_instruction(root)?,
            }
        }
        Ok(self.tree)
    }

    /// Parse a string (convenience function).
    pub fn parse_str(source: &str, file: &str) -> Result<ParseTree> {
        Parser::new(source, file).parse()
    }

    // ========================================================================
    // Token helpers
    // ========================================================================

    fn peek(&self) -> Token {
        self.lexer.look_ahead(&[])
    }

    fn peek_kind(&self) -> TokenType {
        self.peek().kind
    }

    fn peek_is(&self, ty: TokenType) -> bool {
        self.peek_kind() == ty
    }

    fn error_at(&self, tok: &Token, message: String) -> ParseError {
        ParseError {
            message,
            file: tok.file.to_string(),
            line: tok.line,
            column: tok.column,
        }
    }

    fn unexpected(&self, tok: &Token, wanted: &str) -> ParseError {
        let message = match tok.kind {
            TokenType::Error => format!("Unrecognised character {}", tok),
            _ => format!("Unexpected {} (expected {})", tok, wanted),
        };
        self.error_at(tok, message)
    }

    /// Consume a token of type `ty` and attach it to `parent`.
    fn expect(&mut self, ty: TokenType, parent: NodeId) -> Result<NodeId> {
        let tok = self.peek();
        if tok.kind != ty {
            return Err(self.unexpected(&tok, &ty.to_string()));
        }
        let tok = self.lexer.scan(&[]);
        Ok(self.tree.add_token(tok, parent))
    }

    /// Consume a token from a restricted expected set.
    fn expect_any(&mut self, types: &[TokenType], parent: NodeId, wanted: &str) -> Result<NodeId> {
        let tok = self.lexer.look_ahead(types);
        if !types.contains(&tok.kind) {
            return Err(self.unexpected(&tok, wanted));
        }
        let tok = self.lexer.scan(types);
        Ok(self.tree.add_token(tok, parent))
    }

    /// Consume a token of type `ty` if it is next.
    fn accept(&mut self, ty: TokenType, parent: NodeId) -> Option<NodeId> {
        if self.peek_is(ty) {
            let tok = self.lexer.scan(&[]);
            Some(self.tree.add_token(tok, parent))
        } else {
            None
        }
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn parse_directive(&mut self, parent: NodeId) -> Result<()> {
        let node = self.tree.add_node(NodeKind::Directive, parent);
        self.expect(TokenType::AtSign, node)?;
        self.expect(TokenType::Identifier, node)?;
        self.expect_any(&[TokenType::On, TokenType::Off], node, "ON or OFF")?;
        self.expect(TokenType::Eoi, node)?;
        Ok(())
    }

    fn parse_instruction(&mut self, parent: NodeId) -> Result<()> {
        let tok = self.peek();
        match tok.kind {
            TokenType::CurlyOpen => self.parse_block(parent).map(|_| ()),
            TokenType::Set => self.parse_set(parent),
            TokenType::If => self.parse_if(parent),
            TokenType::Until => self.parse_until(parent),
            TokenType::From => self.parse_from(parent),
            TokenType::Unlock => self.parse_unlock(parent),
            TokenType::Print => self.parse_print(parent),
            TokenType::On => self.parse_on(parent),
            TokenType::Toggle => self.parse_keyword_varident(NodeKind::ToggleStmt, parent),
            TokenType::Wait => self.parse_wait(parent),
            TokenType::When => self.parse_when(parent),
            TokenType::Stage => self.parse_bare(NodeKind::StageStmt, parent),
            TokenType::ClearScreen => self.parse_bare(NodeKind::ClearStmt, parent),
            TokenType::Add => self.parse_keyword_expr(NodeKind::AddStmt, parent),
            TokenType::Remove => self.parse_keyword_expr(NodeKind::RemoveStmt, parent),
            TokenType::Log => self.parse_log(parent),
            TokenType::Break => self.parse_bare(NodeKind::BreakStmt, parent),
            TokenType::Preserve => self.parse_bare(NodeKind::PreserveStmt, parent),
            TokenType::Declare
            | TokenType::Local
            | TokenType::Global
            | TokenType::Parameter
            | TokenType::Function
            | TokenType::Lock => self.parse_declare(parent),
            TokenType::Return => self.parse_return(parent),
            TokenType::Switch => self.parse_switch(parent),
            TokenType::Copy => self.parse_copy(parent),
            TokenType::Rename => self.parse_rename(parent),
            TokenType::Delete => self.parse_delete(parent),
            TokenType::Edit => self.parse_keyword_expr(NodeKind::EditStmt, parent),
            TokenType::Run => self.parse_run(parent),
            TokenType::Compile => self.parse_compile(parent),
            TokenType::List => self.parse_list(parent),
            TokenType::Reboot => self.parse_bare(NodeKind::RebootStmt, parent),
            TokenType::Shutdown => self.parse_bare(NodeKind::ShutdownStmt, parent),
            TokenType::For => self.parse_for(parent),
            TokenType::Unset => self.parse_unset(parent),
            TokenType::AtSign => self.parse_directive(parent),
            TokenType::Eoi => {
                let node = self.tree.add_node(NodeKind::EmptyStmt, parent);
                self.expect(TokenType::Eoi, node)?;
                Ok(())
            }
            TokenType::Identifier
            | TokenType::BracketOpen
            | TokenType::String
            | TokenType::Integer
            | TokenType::Double
            | TokenType::TrueFalse => self.parse_identifier_led(parent),
            _ => Err(self.unexpected(&tok, "a statement")),
        }
    }

    fn parse_block(&mut self, parent: NodeId) -> Result<NodeId> {
        let node = self.tree.add_node(NodeKind::InstructionBlock, parent);
        self.expect(TokenType::CurlyOpen, node)?;
        loop {
            match self.peek_kind() {
                TokenType::CurlyClose => break,
                TokenType::Eof => {
                    let tok = self.peek();
                    return Err(self.unexpected(&tok, "'}'"));
                }
                _ => self.parse_instruction(node)?,
            }
        }
        self.expect(TokenType::CurlyClose, node)?;
        Ok(node)
    }

    /// `KEYWORD .`
    fn parse_bare(&mut self, kind: NodeKind, parent: NodeId) -> Result<()> {
        let node = self.tree.add_node(kind, parent);
        let tok = self.lexer.scan(&[]);
        self.tree.add_token(tok, node);
        self.expect(TokenType::Eoi, node)?;
        Ok(())
    }

    /// `KEYWORD expr .`
    fn parse_keyword_expr(&mut self, kind: NodeKind, parent: NodeId) -> Result<()> {
        let node = self.tree.add_node(kind, parent);
        let tok = self.lexer.scan(&[]);
        self.tree.add_token(tok, node);
        self.parse_expr(node)?;
        self.expect(TokenType::Eoi, node)?;
        Ok(())
    }

    /// `KEYWORD varident .`
    fn parse_keyword_varident(&mut self, kind: NodeKind, parent: NodeId) -> Result<()> {
        let node = self.tree.add_node(kind, parent);
        let tok = self.lexer.scan(&[]);
        self.tree.add_token(tok, node);
        self.parse_suffix(node)?;
        self.expect(TokenType::Eoi, node)?;
        Ok(())
    }

    fn parse_set(&mut self, parent: NodeId) -> Result<()> {
        let node = self.tree.add_node(NodeKind::SetStmt, parent);
        self.expect(TokenType::Set, node)?;
        self.parse_suffix(node)?;
        self.expect(TokenType::To, node)?;
        self.parse_expr(node)?;
        self.expect(TokenType::Eoi, node)?;
        Ok(())
    }

    fn parse_if(&mut self, parent: NodeId) -> Result<()> {
        let node = self.tree.add_node(NodeKind::IfStmt, parent);
        self.expect(TokenType::If, node)?;
        self.parse_expr(node)?;
        self.parse_instruction(node)?;
        if self.accept(TokenType::Else, node).is_some() {
            self.parse_instruction(node)?;
        }
        Ok(())
    }

    fn parse_until(&mut self, parent: NodeId) -> Result<()> {
        let node = self.tree.add_node(NodeKind::UntilStmt, parent);
        self.expect(TokenType::Until, node)?;
        self.parse_expr(node)?;
        self.parse_instruction(node)?;
        Ok(())
    }

    fn parse_from(&mut self, parent: NodeId) -> Result<()> {
        let node = self.tree.add_node(NodeKind::FromLoop, parent);
        self.expect(TokenType::From, node)?;
        self.parse_block(node)?;
        self.expect(TokenType::Until, node)?;
        self.parse_expr(node)?;
        self.expect(TokenType::Step, node)?;
        self.parse_block(node)?;
        self.expect(TokenType::Do, node)?;
        self.parse_instruction(node)?;
        Ok(())
    }

    fn parse_unlock(&mut self, parent: NodeId) -> Result<()> {
        let node = self.tree.add_node(NodeKind::UnlockStmt, parent);
        self.expect(TokenType::Unlock, node)?;
        self.expect_any(
            &[TokenType::Identifier, TokenType::All],
            node,
            "identifier or ALL",
        )?;
        self.expect(TokenType::Eoi, node)?;
        Ok(())
    }

    fn parse_print(&mut self, parent: NodeId) -> Result<()> {
        let node = self.tree.add_node(NodeKind::PrintStmt, parent);
        self.expect(TokenType::Print, node)?;
        self.parse_expr(node)?;
        if self.accept(TokenType::At, node).is_some() {
            self.expect(TokenType::BracketOpen, node)?;
            self.parse_expr(node)?;
            self.expect(TokenType::Comma, node)?;
            self.parse_expr(node)?;
            self.expect(TokenType::BracketClose, node)?;
        }
        self.expect(TokenType::Eoi, node)?;
        Ok(())
    }

    fn parse_on(&mut self, parent: NodeId) -> Result<()> {
        let node = self.tree.add_node(NodeKind::OnStmt, parent);
        self.expect(TokenType::On, node)?;
        self.parse_suffix(node)?;
        self.parse_instruction(node)?;
        Ok(())
    }

    fn parse_wait(&mut self, parent: NodeId) -> Result<()> {
        let node = self.tree.add_node(NodeKind::WaitStmt, parent);
        self.expect(TokenType::Wait, node)?;
        self.accept(TokenType::Until, node);
        self.parse_expr(node)?;
        self.expect(TokenType::Eoi, node)?;
        Ok(())
    }

    fn parse_when(&mut self, parent: NodeId) -> Result<()> {
        let node = self.tree.add_node(NodeKind::WhenStmt, parent);
        self.expect(TokenType::When, node)?;
        self.parse_expr(node)?;
        self.expect(TokenType::Then, node)?;
        self.parse_instruction(node)?;
        Ok(())
    }

    fn parse_log(&mut self, parent: NodeId) -> Result<()> {
        let node = self.tree.add_node(NodeKind::LogStmt, parent);
        self.expect(TokenType::Log, node)?;
        self.parse_expr(node)?;
        self.expect(TokenType::To, node)?;
        self.parse_expr(node)?;
        self.expect(TokenType::Eoi, node)?;
        Ok(())
    }

    fn parse_declare(&mut self, parent: NodeId) -> Result<()> {
        let node = self.tree.add_node(NodeKind::DeclareStmt, parent);
        let has_declare = self.accept(TokenType::Declare, node).is_some();
        let has_scope = self.accept(TokenType::Local, node).is_some()
            || self.accept(TokenType::Global, node).is_some();

        let tok = self.peek();
        match tok.kind {
            TokenType::Parameter => self.parse_parameter_clause(node),
            TokenType::Function => self.parse_function_clause(node),
            TokenType::Lock => self.parse_lock_clause(node),
            TokenType::Identifier if has_declare || has_scope => {
                self.parse_identifier_clause(node)
            }
            _ => Err(self.unexpected(&tok, "PARAMETER, FUNCTION, LOCK or identifier")),
        }
    }

    fn parse_parameter_clause(&mut self, parent: NodeId) -> Result<()> {
        let node = self.tree.add_node(NodeKind::DeclareParameterClause, parent);
        self.expect(TokenType::Parameter, node)?;
        loop {
            self.expect(TokenType::Identifier, node)?;
            if self.accept(TokenType::Is, node).is_some()
                || self.accept(TokenType::To, node).is_some()
            {
                self.parse_expr(node)?;
            }
            if self.accept(TokenType::Comma, node).is_none() {
                break;
            }
        }
        self.expect(TokenType::Eoi, node)?;
        Ok(())
    }

    fn parse_function_clause(&mut self, parent: NodeId) -> Result<()> {
        let node = self.tree.add_node(NodeKind::DeclareFunctionClause, parent);
        self.expect(TokenType::Function, node)?;
        self.expect(TokenType::Identifier, node)?;
        self.parse_block(node)?;
        Ok(())
    }

    fn parse_lock_clause(&mut self, parent: NodeId) -> Result<()> {
        let node = self.tree.add_node(NodeKind::DeclareLockClause, parent);
        self.expect(TokenType::Lock, node)?;
        self.expect(TokenType::Identifier, node)?;
        self.expect(TokenType::To, node)?;
        self.parse_expr(node)?;
        self.expect(TokenType::Eoi, node)?;
        Ok(())
    }

    fn parse_identifier_clause(&mut self, parent: NodeId) -> Result<()> {
        let node = self.tree.add_node(NodeKind::DeclareIdentifierClause, parent);
        self.expect(TokenType::Identifier, node)?;
        self.expect_any(&[TokenType::Is, TokenType::To], node, "IS or TO")?;
        self.parse_expr(node)?;
        self.expect(TokenType::Eoi, node)?;
        Ok(())
    }

    fn parse_return(&mut self, parent: NodeId) -> Result<()> {
        let node = self.tree.add_node(NodeKind::ReturnStmt, parent);
        self.expect(TokenType::Return, node)?;
        if !self.peek_is(TokenType::Eoi) {
            self.parse_expr(node)?;
        }
        self.expect(TokenType::Eoi, node)?;
        Ok(())
    }

    fn parse_switch(&mut self, parent: NodeId) -> Result<()> {
        let node = self.tree.add_node(NodeKind::SwitchStmt, parent);
        self.expect(TokenType::Switch, node)?;
        self.expect(TokenType::To, node)?;
        self.parse_expr(node)?;
        self.expect(TokenType::Eoi, node)?;
        Ok(())
    }

    fn parse_copy(&mut self, parent: NodeId) -> Result<()> {
        let node = self.tree.add_node(NodeKind::CopyStmt, parent);
        self.expect(TokenType::Copy, node)?;
        self.parse_expr(node)?;
        self.expect_any(&[TokenType::From, TokenType::To], node, "FROM or TO")?;
        self.parse_expr(node)?;
        self.expect(TokenType::Eoi, node)?;
        Ok(())
    }

    fn parse_rename(&mut self, parent: NodeId) -> Result<()> {
        let node = self.tree.add_node(NodeKind::RenameStmt, parent);
        self.expect(TokenType::Rename, node)?;
        if self.accept(TokenType::Volume, node).is_none() {
            self.accept(TokenType::File, node);
        }
        self.parse_expr(node)?;
        self.expect(TokenType::To, node)?;
        self.parse_expr(node)?;
        self.expect(TokenType::Eoi, node)?;
        Ok(())
    }

    fn parse_delete(&mut self, parent: NodeId) -> Result<()> {
        let node = self.tree.add_node(NodeKind::DeleteStmt, parent);
        self.expect(TokenType::Delete, node)?;
        self.parse_expr(node)?;
        if self.accept(TokenType::From, node).is_some() {
            self.parse_expr(node)?;
        }
        self.expect(TokenType::Eoi, node)?;
        Ok(())
    }

    fn parse_run(&mut self, parent: NodeId) -> Result<()> {
        let node = self.tree.add_node(NodeKind::RunStmt, parent);
        self.expect(TokenType::Run, node)?;
        self.accept(TokenType::Once, node);
        self.expect_any(
            &[TokenType::FileIdent, TokenType::Identifier, TokenType::String],
            node,
            "program name",
        )?;
        if self.accept(TokenType::BracketOpen, node).is_some() {
            if !self.peek_is(TokenType::BracketClose) {
                self.parse_arglist(node)?;
            }
            self.expect(TokenType::BracketClose, node)?;
        }
        if self.accept(TokenType::On, node).is_some() {
            self.parse_expr(node)?;
        }
        self.expect(TokenType::Eoi, node)?;
        Ok(())
    }

    fn parse_compile(&mut self, parent: NodeId) -> Result<()> {
        let node = self.tree.add_node(NodeKind::CompileStmt, parent);
        self.expect(TokenType::Compile, node)?;
        self.parse_expr(node)?;
        if self.accept(TokenType::To, node).is_some() {
            self.parse_expr(node)?;
        }
        self.expect(TokenType::Eoi, node)?;
        Ok(())
    }

    fn parse_list(&mut self, parent: NodeId) -> Result<()> {
        let node = self.tree.add_node(NodeKind::ListStmt, parent);
        self.expect(TokenType::List, node)?;
        if self.accept(TokenType::Identifier, node).is_some()
            && self.accept(TokenType::In, node).is_some()
        {
            self.expect(TokenType::Identifier, node)?;
        }
        self.expect(TokenType::Eoi, node)?;
        Ok(())
    }

    fn parse_for(&mut self, parent: NodeId) -> Result<()> {
        let node = self.tree.add_node(NodeKind::ForStmt, parent);
        self.expect(TokenType::For, node)?;
        self.expect(TokenType::Identifier, node)?;
        self.expect(TokenType::In, node)?;
        self.parse_suffix(node)?;
        self.parse_instruction(node)?;
        Ok(())
    }

    fn parse_unset(&mut self, parent: NodeId) -> Result<()> {
        let node = self.tree.add_node(NodeKind::UnsetStmt, parent);
        self.expect(TokenType::Unset, node)?;
        self.expect_any(
            &[TokenType::Identifier, TokenType::All],
            node,
            "identifier or ALL",
        )?;
        self.expect(TokenType::Eoi, node)?;
        Ok(())
    }

    fn parse_identifier_led(&mut self, parent: NodeId) -> Result<()> {
        let node = self.tree.add_node(NodeKind::IdentifierLedStmt, parent);
        self.parse_suffix(node)?;
        if self.accept(TokenType::On, node).is_none() {
            self.accept(TokenType::Off, node);
        }
        self.expect(TokenType::Eoi, node)?;
        Ok(())
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn parse_expr(&mut self, parent: NodeId) -> Result<()> {
        self.parse_chain(
            NodeKind::Expr,
            parent,
            &[TokenType::Or],
            Self::parse_and,
        )
    }

    fn parse_and(&mut self, parent: NodeId) -> Result<()> {
        self.parse_chain(
            NodeKind::AndExpr,
            parent,
            &[TokenType::And],
            Self::parse_compare,
        )
    }

    fn parse_compare(&mut self, parent: NodeId) -> Result<()> {
        self.parse_chain(
            NodeKind::CompareExpr,
            parent,
            &[TokenType::Comparator],
            Self::parse_arith,
        )
    }

    fn parse_arith(&mut self, parent: NodeId) -> Result<()> {
        self.parse_chain(
            NodeKind::ArithExpr,
            parent,
            &[TokenType::PlusMinus],
            Self::parse_multdiv,
        )
    }

    fn parse_multdiv(&mut self, parent: NodeId) -> Result<()> {
        self.parse_chain(
            NodeKind::MultDivExpr,
            parent,
            &[TokenType::Mult, TokenType::Div],
            Self::parse_unary,
        )
    }

    fn parse_unary(&mut self, parent: NodeId) -> Result<()> {
        let node = self.tree.add_node(NodeKind::UnaryExpr, parent);
        if matches!(
            self.peek_kind(),
            TokenType::PlusMinus | TokenType::Not | TokenType::Defined
        ) {
            let tok = self.lexer.scan(&[]);
            self.tree.add_token(tok, node);
        }
        self.parse_factor(node)
    }

    fn parse_factor(&mut self, parent: NodeId) -> Result<()> {
        self.parse_chain(
            NodeKind::Factor,
            parent,
            &[TokenType::Power],
            Self::parse_suffix,
        )
    }

    fn parse_suffix(&mut self, parent: NodeId) -> Result<()> {
        self.parse_chain(
            NodeKind::Suffix,
            parent,
            &[TokenType::Colon],
            Self::parse_suffixterm,
        )
    }

    /// `operand (op operand)*` as a single flat node.
    fn parse_chain(
        &mut self,
        kind: NodeKind,
        parent: NodeId,
        operators: &[TokenType],
        operand: fn(&mut Self, NodeId) -> Result<()>,
    ) -> Result<()> {
        let node = self.tree.add_node(kind, parent);
        operand(self, node)?;
        while operators.contains(&self.peek_kind()) {
            let tok = self.lexer.scan(&[]);
            self.tree.add_token(tok, node);
            operand(self, node)?;
        }
        Ok(())
    }

    fn parse_suffixterm(&mut self, parent: NodeId) -> Result<()> {
        let node = self.tree.add_node(NodeKind::SuffixTerm, parent);
        self.parse_atom(node)?;
        loop {
            match self.peek_kind() {
                TokenType::BracketOpen => {
                    let trailer = self.tree.add_node(NodeKind::FunctionTrailer, node);
                    self.expect(TokenType::BracketOpen, trailer)?;
                    if !self.peek_is(TokenType::BracketClose) {
                        self.parse_arglist(trailer)?;
                    }
                    self.expect(TokenType::BracketClose, trailer)?;
                }
                TokenType::AtSign => {
                    let trailer = self.tree.add_node(NodeKind::FunctionTrailer, node);
                    self.expect(TokenType::AtSign, trailer)?;
                }
                TokenType::SquareOpen => {
                    let trailer = self.tree.add_node(NodeKind::ArrayTrailer, node);
                    self.expect(TokenType::SquareOpen, trailer)?;
                    self.parse_expr(trailer)?;
                    self.expect(TokenType::SquareClose, trailer)?;
                }
                TokenType::ArrayIndex => {
                    let trailer = self.tree.add_node(NodeKind::ArrayTrailer, node);
                    self.expect(TokenType::ArrayIndex, trailer)?;
                    self.expect_any(
                        &[TokenType::Integer, TokenType::Identifier],
                        trailer,
                        "index",
                    )?;
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn parse_arglist(&mut self, parent: NodeId) -> Result<()> {
        let node = self.tree.add_node(NodeKind::ArgList, parent);
        self.parse_expr(node)?;
        while self.accept(TokenType::Comma, node).is_some() {
            self.parse_expr(node)?;
        }
        Ok(())
    }

    fn parse_atom(&mut self, parent: NodeId) -> Result<()> {
        let tok = self.peek();
        match tok.kind {
            TokenType::Integer | TokenType::Double => self.parse_sci_number(parent),
            TokenType::TrueFalse | TokenType::Identifier | TokenType::String => {
                let node = self.tree.add_node(NodeKind::Atom, parent);
                let tok = self.lexer.scan(&[]);
                self.tree.add_token(tok, node);
                Ok(())
            }
            TokenType::BracketOpen => {
                let node = self.tree.add_node(NodeKind::Atom, parent);
                self.expect(TokenType::BracketOpen, node)?;
                self.parse_expr(node)?;
                self.expect(TokenType::BracketClose, node)?;
                Ok(())
            }
            TokenType::CurlyOpen => {
                let node = self.tree.add_node(NodeKind::Atom, parent);
                self.parse_block(node)?;
                Ok(())
            }
            _ => Err(self.unexpected(&tok, "an expression")),
        }
    }

    /// Number with an optional adjacent exponent, e.g. `1.5e-3`.
    fn parse_sci_number(&mut self, parent: NodeId) -> Result<()> {
        let node = self.tree.add_node(NodeKind::SciNumber, parent);
        let tok = self.lexer.scan(&[]);
        self.tree.add_token(tok, node);

        let e = self.lexer.look_ahead(&[TokenType::E]);
        if e.kind != TokenType::E || e.follows_gap() {
            return Ok(());
        }
        let e = self.lexer.scan(&[TokenType::E]);
        self.tree.add_token(e, node);
        self.accept(TokenType::PlusMinus, node);
        self.expect(TokenType::Integer, node)?;
        Ok(())
    }
}

/// Parse a whole program (convenience function).
pub fn parse_program(source: &str, file: &str) -> Result<ParseTree> {
    Parser::parse_str(source, file)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> ParseTree {
        parse_program(src, "test").unwrap()
    }

    fn top_kinds(tree: &ParseTree) -> Vec<NodeKind> {
        tree.children(tree.root())
            .iter()
            .map(|&c| tree.kind(c))
            .collect()
    }

    #[test]
    fn test_empty_input() {
        let tree = parse("");
        assert!(tree.is_empty());
        let tree = parse("  // nothing here\n");
        assert!(tree.is_empty());
    }

    #[test]
    fn test_statement_kinds() {
        let tree = parse("set x to 1. print x. stage. clearscreen. x on.");
        assert_eq!(
            top_kinds(&tree),
            vec![
                NodeKind::SetStmt,
                NodeKind::PrintStmt,
                NodeKind::StageStmt,
                NodeKind::ClearStmt,
                NodeKind::IdentifierLedStmt,
            ]
        );
    }

    #[test]
    fn test_if_else() {
        let tree = parse("if x > 1 { print 1. } else { print 2. }");
        let stmt = tree.children(tree.root())[0];
        assert_eq!(tree.kind(stmt), NodeKind::IfStmt);
        let blocks: Vec<_> = tree
            .node_children(stmt)
            .filter(|&c| tree.kind(c) == NodeKind::InstructionBlock)
            .collect();
        assert_eq!(blocks.len(), 2);
        assert!(tree.find_token_child(stmt, TokenType::Else).is_some());
    }

    #[test]
    fn test_declarations() {
        let tree = parse(
            "declare parameter a, b is 2. local x is 1. global y to 2. \
             function f { return 1. } lock z to x + 1. declare local function g { }",
        );
        let kinds: Vec<_> = tree
            .children(tree.root())
            .iter()
            .map(|&c| tree.kind(tree.node_children(c).next().unwrap()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                NodeKind::DeclareParameterClause,
                NodeKind::DeclareIdentifierClause,
                NodeKind::DeclareIdentifierClause,
                NodeKind::DeclareFunctionClause,
                NodeKind::DeclareLockClause,
                NodeKind::DeclareFunctionClause,
            ]
        );
    }

    #[test]
    fn test_bare_identifier_declaration_needs_prefix() {
        // `x is 1.` is not a declaration
        assert!(parse_program("x is 1.", "test").is_err());
    }

    #[test]
    fn test_suffix_chain_and_trailers() {
        let tree = parse("print ship:parts[0]:name(1, 2)#3.");
        let text = tree.text(tree.root());
        assert_eq!(text, "printship:parts[0]:name(1,2)#3.");
    }

    #[test]
    fn test_scientific_number_needs_adjacent_exponent() {
        let tree = parse("print 1.5e-3.");
        let sci = tree
            .descendants(tree.root())
            .into_iter()
            .find(|&n| tree.kind(n) == NodeKind::SciNumber)
            .unwrap();
        assert_eq!(tree.text(sci), "1.5e-3");

        // An `else` after a number is not an exponent
        let tree = parse("if x = 1 print 1. else print 2.");
        assert_eq!(top_kinds(&tree), vec![NodeKind::IfStmt]);
    }

    #[test]
    fn test_run_with_file_name_and_args() {
        let tree = parse("run once lib.ks(1, \"a\") on \"archive\".");
        let stmt = tree.children(tree.root())[0];
        assert_eq!(tree.kind(stmt), NodeKind::RunStmt);
        assert!(tree.find_token_child(stmt, TokenType::Once).is_some());
        let name = tree.find_token_child(stmt, TokenType::FileIdent).unwrap();
        assert_eq!(tree.token(name).unwrap().text, "lib.ks");
        assert!(tree.find_child(stmt, NodeKind::ArgList).is_some());
    }

    #[test]
    fn test_from_loop() {
        let tree = parse("from { local i is 0. } until i > 3 step { set i to i + 1. } do { print i. }");
        let stmt = tree.children(tree.root())[0];
        assert_eq!(tree.kind(stmt), NodeKind::FromLoop);
        let blocks = tree
            .node_children(stmt)
            .filter(|&c| tree.kind(c) == NodeKind::InstructionBlock)
            .count();
        assert_eq!(blocks, 3);
    }

    #[test]
    fn test_directive() {
        let tree = parse("@lazyglobal off. print 1.");
        assert_eq!(
            top_kinds(&tree),
            vec![NodeKind::Directive, NodeKind::PrintStmt]
        );
    }

    #[test]
    fn test_lambda_atom() {
        let tree = parse("set f to { return 1. }.");
        let atom = tree
            .descendants(tree.root())
            .into_iter()
            .find(|&n| tree.kind(n) == NodeKind::Atom)
            .unwrap();
        assert_eq!(
            tree.kind(tree.children(atom)[0]),
            NodeKind::InstructionBlock
        );
    }

    #[test]
    fn test_error_position() {
        let err = parse_program("print 1.\nset x to .", "boot.ks").unwrap_err();
        assert_eq!(err.file, "boot.ks");
        assert_eq!(err.line, 2);
        assert_eq!(err.column, 10);
        assert!(err.message.contains("expected an expression"));
    }

    #[test]
    fn test_unclosed_block() {
        let err = parse_program("if x { print 1.", "test").unwrap_err();
        assert!(err.message.contains("end of input"));
    }

    #[test]
    fn test_unrecognised_character() {
        let err = parse_program("print 1 ? 2.", "test").unwrap_err();
        assert!(err.message.contains("Unrecognised character"));
    }

    #[test]
    fn test_parent_links() {
        let tree = parse("until false { break. }");
        for id in tree.descendants(tree.root()) {
            for &c in tree.children(id) {
                assert_eq!(tree.parent(c), Some(id));
            }
        }
    }
}
