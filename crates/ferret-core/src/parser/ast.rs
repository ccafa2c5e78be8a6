//! Arena-backed AST for the PHP subset the analysis understands
//!
//! Nodes live in an `id_arena::Arena`; parent links are stored out-of-band in
//! a side table keyed by node id, keeping the tree itself acyclic.

use id_arena::{Arena, Id};
use std::collections::HashMap;

pub type NodeId = Id<Node>;

#[derive(Debug)]
pub struct Node {
    pub id: NodeId,
    /// 1-based source line of the node's first token.
    pub line: usize,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Concat,
}

impl AssignOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignOp::Assign => "=",
            AssignOp::Add => "+=",
            AssignOp::Sub => "-=",
            AssignOp::Mul => "*=",
            AssignOp::Div => "/=",
            AssignOp::Concat => ".=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Concat,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Identical,
    NotIdentical,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
    Coalesce,
    BitAnd,
    BitOr,
    BitXor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncDecOp {
    Inc,
    Dec,
}

#[derive(Debug)]
pub enum NodeKind {
    Program { body: Vec<NodeId> },
    InlineHtml { text: String },
    Block { body: Vec<NodeId> },
    /// `echo`, `print`, and `<?=` all normalize to this.
    Echo { args: Vec<NodeId> },
    ExprStmt { expr: NodeId },
    If { cond: NodeId, then_branch: NodeId, else_branch: Option<NodeId> },
    While { cond: NodeId, body: NodeId },
    For { init: Vec<NodeId>, cond: Vec<NodeId>, step: Vec<NodeId>, body: NodeId },
    Foreach { source: NodeId, key: Option<NodeId>, value: NodeId, body: NodeId },
    Switch { subject: NodeId, cases: Vec<NodeId> },
    Case { test: Option<NodeId>, body: Vec<NodeId> },
    FunctionDecl { name: String, params: Vec<NodeId>, body: NodeId },
    ClassDecl { name: String, members: Vec<NodeId> },
    Param { name: String, by_ref: bool, default: Option<NodeId> },
    Return { value: Option<NodeId> },
    Break,
    Continue,
    Global { vars: Vec<NodeId> },
    Unset { args: Vec<NodeId> },
    Isset { args: Vec<NodeId> },
    Empty { arg: NodeId },
    /// `$name`; the name carries no sigil. Superglobals appear here too.
    Variable { name: String },
    PropertyFetch { target: NodeId, property: String },
    Index { target: NodeId, index: Option<NodeId> },
    FunctionCall { name: String, args: Vec<NodeId> },
    MethodCall { target: NodeId, method: String, args: Vec<NodeId> },
    StaticCall { class: String, method: String, args: Vec<NodeId> },
    New { class: String, args: Vec<NodeId> },
    ArrayLiteral { entries: Vec<NodeId> },
    ArrayEntry { key: Option<NodeId>, value: NodeId },
    Assign { op: AssignOp, target: NodeId, value: NodeId },
    Binary { op: BinaryOp, left: NodeId, right: NodeId },
    Unary { op: UnaryOp, operand: NodeId },
    IncDec { op: IncDecOp, prefix: bool, target: NodeId },
    Ternary { cond: NodeId, then_branch: Option<NodeId>, else_branch: NodeId },
    StringLiteral { value: String },
    /// Double-quoted string with `$var` interpolation; parts are
    /// `StringPart`, `Variable`, `Index`, or `PropertyFetch` nodes.
    InterpolatedString { parts: Vec<NodeId> },
    StringPart { text: String },
    Number { raw: String },
    Bool { value: bool },
    Null,
    Constant { name: String },
}

impl NodeKind {
    /// Child node ids in source order. Exhaustive over the variant set so a
    /// new node kind is a compile-time concern for every traversal.
    pub fn children(&self) -> Vec<NodeId> {
        match self {
            NodeKind::Program { body } | NodeKind::Block { body } => body.clone(),
            NodeKind::InlineHtml { .. } => Vec::new(),
            NodeKind::Echo { args } => args.clone(),
            NodeKind::ExprStmt { expr } => vec![*expr],
            NodeKind::If { cond, then_branch, else_branch } => {
                let mut out = vec![*cond, *then_branch];
                out.extend(else_branch.iter().copied());
                out
            }
            NodeKind::While { cond, body } => vec![*cond, *body],
            NodeKind::For { init, cond, step, body } => {
                let mut out = init.clone();
                out.extend(cond.iter().copied());
                out.extend(step.iter().copied());
                out.push(*body);
                out
            }
            NodeKind::Foreach { source, key, value, body } => {
                let mut out = vec![*source];
                out.extend(key.iter().copied());
                out.push(*value);
                out.push(*body);
                out
            }
            NodeKind::Switch { subject, cases } => {
                let mut out = vec![*subject];
                out.extend(cases.iter().copied());
                out
            }
            NodeKind::Case { test, body } => {
                let mut out: Vec<NodeId> = test.iter().copied().collect();
                out.extend(body.iter().copied());
                out
            }
            NodeKind::FunctionDecl { params, body, .. } => {
                let mut out = params.clone();
                out.push(*body);
                out
            }
            NodeKind::ClassDecl { members, .. } => members.clone(),
            NodeKind::Param { default, .. } => default.iter().copied().collect(),
            NodeKind::Return { value } => value.iter().copied().collect(),
            NodeKind::Break | NodeKind::Continue => Vec::new(),
            NodeKind::Global { vars } => vars.clone(),
            NodeKind::Unset { args } | NodeKind::Isset { args } => args.clone(),
            NodeKind::Empty { arg } => vec![*arg],
            NodeKind::Variable { .. } => Vec::new(),
            NodeKind::PropertyFetch { target, .. } => vec![*target],
            NodeKind::Index { target, index } => {
                let mut out = vec![*target];
                out.extend(index.iter().copied());
                out
            }
            NodeKind::FunctionCall { args, .. } => args.clone(),
            NodeKind::MethodCall { target, args, .. } => {
                let mut out = vec![*target];
                out.extend(args.iter().copied());
                out
            }
            NodeKind::StaticCall { args, .. } => args.clone(),
            NodeKind::New { args, .. } => args.clone(),
            NodeKind::ArrayLiteral { entries } => entries.clone(),
            NodeKind::ArrayEntry { key, value } => {
                let mut out: Vec<NodeId> = key.iter().copied().collect();
                out.push(*value);
                out
            }
            NodeKind::Assign { target, value, .. } => vec![*target, *value],
            NodeKind::Binary { left, right, .. } => vec![*left, *right],
            NodeKind::Unary { operand, .. } => vec![*operand],
            NodeKind::IncDec { target, .. } => vec![*target],
            NodeKind::Ternary { cond, then_branch, else_branch } => {
                let mut out = vec![*cond];
                out.extend(then_branch.iter().copied());
                out.push(*else_branch);
                out
            }
            NodeKind::StringLiteral { .. } => Vec::new(),
            NodeKind::InterpolatedString { parts } => parts.clone(),
            NodeKind::StringPart { .. } => Vec::new(),
            NodeKind::Number { .. }
            | NodeKind::Bool { .. }
            | NodeKind::Null
            | NodeKind::Constant { .. } => Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct Ast {
    arena: Arena<Node>,
    root: NodeId,
    parents: HashMap<NodeId, NodeId>,
}

impl Ast {
    pub(crate) fn new(arena: Arena<Node>, root: NodeId) -> Self {
        let mut ast = Self {
            arena,
            root,
            parents: HashMap::new(),
        };
        ast.link_parents();
        ast
    }

    fn link_parents(&mut self) {
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            for child in self.arena[id].kind.children() {
                self.parents.insert(child, id);
                stack.push(child);
            }
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.arena[id]
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.parents.get(&id).copied()
    }

    /// Walks parent links from `id` (exclusive) up to the root.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            ast: self,
            current: self.parent(id),
        }
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.arena.iter().map(|(_, node)| node)
    }

    pub fn node_count(&self) -> usize {
        self.arena.len()
    }
}

pub struct Ancestors<'a> {
    ast: &'a Ast,
    current: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.current?;
        self.current = self.ast.parent(current);
        Some(current)
    }
}

/// Builder used by the parser while nodes are being produced.
#[derive(Debug, Default)]
pub(crate) struct AstBuilder {
    arena: Arena<Node>,
}

impl AstBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, line: usize, kind: NodeKind) -> NodeId {
        self.arena.alloc_with_id(|id| Node { id, line, kind })
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.arena[id].kind
    }

    pub fn line(&self, id: NodeId) -> usize {
        self.arena[id].line
    }

    pub fn finish(self, root: NodeId) -> Ast {
        Ast::new(self.arena, root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_links_reach_the_root() {
        let mut builder = AstBuilder::new();
        let var = builder.alloc(1, NodeKind::Variable { name: "x".into() });
        let echo = builder.alloc(1, NodeKind::Echo { args: vec![var] });
        let root = builder.alloc(1, NodeKind::Program { body: vec![echo] });
        let ast = builder.finish(root);

        assert_eq!(ast.parent(var), Some(echo));
        assert_eq!(ast.parent(echo), Some(root));
        assert_eq!(ast.parent(root), None);

        let chain: Vec<NodeId> = ast.ancestors(var).collect();
        assert_eq!(chain, vec![echo, root]);
    }

    #[test]
    fn children_cover_compound_nodes() {
        let mut builder = AstBuilder::new();
        let cond = builder.alloc(1, NodeKind::Bool { value: true });
        let body = builder.alloc(1, NodeKind::Block { body: vec![] });
        let stmt = builder.alloc(
            1,
            NodeKind::If {
                cond,
                then_branch: body,
                else_branch: None,
            },
        );
        let root = builder.alloc(1, NodeKind::Program { body: vec![stmt] });
        let ast = builder.finish(root);

        assert_eq!(ast.node(stmt).kind.children(), vec![cond, body]);
        assert_eq!(ast.node_count(), 4);
    }
}
