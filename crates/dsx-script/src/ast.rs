//! Abstract Syntax Tree
//!
//! Arena-allocated expression nodes.

use crate::token::Span;

/// AST Node ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

/// Abstract Syntax Tree container
#[derive(Debug, Default)]
pub struct Ast {
    nodes: Vec<AstNode>,
    root: Option<NodeId>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: AstNode) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn get(&self, id: NodeId) -> Option<&AstNode> {
        self.nodes.get(id.0 as usize)
    }

    pub fn span(&self, id: NodeId) -> Span {
        self.get(id).map(|node| node.span).unwrap_or_default()
    }

    pub fn set_root(&mut self, id: NodeId) {
        self.root = Some(id);
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }
}

/// AST Node
#[derive(Debug, Clone)]
pub struct AstNode {
    pub kind: AstNodeKind,
    pub span: Span,
}

impl AstNode {
    pub fn new(kind: AstNodeKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// AST Node kinds
#[derive(Debug, Clone)]
pub enum AstNodeKind {
    Identifier { name: Box<str> },
    Literal { value: LiteralValue },
    ArrayExpression { elements: Vec<Option<NodeId>> },
    UnaryExpression { operator: UnaryOp, argument: NodeId },
    BinaryExpression { operator: BinaryOp, left: NodeId, right: NodeId },
    LogicalExpression { operator: LogicalOp, left: NodeId, right: NodeId },
    ConditionalExpression { test: NodeId, consequent: NodeId, alternate: NodeId },
    CallExpression { callee: NodeId, arguments: Vec<NodeId> },
    NewExpression { callee: NodeId, arguments: Vec<NodeId> },
    MemberExpression { object: NodeId, property: NodeId, computed: bool, optional: bool },
    SequenceExpression { expressions: Vec<NodeId> },
    TemplateLiteral { quasis: Vec<Box<str>>, expressions: Vec<NodeId> },
    ThisExpression,
}

impl AstNodeKind {
    /// Node type name used in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            AstNodeKind::Identifier { .. } => "Identifier",
            AstNodeKind::Literal { .. } => "Literal",
            AstNodeKind::ArrayExpression { .. } => "ArrayExpression",
            AstNodeKind::UnaryExpression { .. } => "UnaryExpression",
            AstNodeKind::BinaryExpression { .. } => "BinaryExpression",
            AstNodeKind::LogicalExpression { .. } => "LogicalExpression",
            AstNodeKind::ConditionalExpression { .. } => "ConditionalExpression",
            AstNodeKind::CallExpression { .. } => "CallExpression",
            AstNodeKind::NewExpression { .. } => "NewExpression",
            AstNodeKind::MemberExpression { .. } => "MemberExpression",
            AstNodeKind::SequenceExpression { .. } => "SequenceExpression",
            AstNodeKind::TemplateLiteral { .. } => "TemplateLiteral",
            AstNodeKind::ThisExpression => "ThisExpression",
        }
    }
}

#[derive(Debug, Clone)]
pub enum LiteralValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Box<str>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Minus,
    Plus,
    Not,
    BitwiseNot,
    Typeof,
    Void,
    Delete,
}

impl UnaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            UnaryOp::Minus => "-",
            UnaryOp::Plus => "+",
            UnaryOp::Not => "!",
            UnaryOp::BitwiseNot => "~",
            UnaryOp::Typeof => "typeof",
            UnaryOp::Void => "void",
            UnaryOp::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    LessThan,
    LessThanEq,
    GreaterThan,
    GreaterThanEq,
    Equal,
    NotEqual,
    StrictEqual,
    StrictNotEqual,
    LeftShift,
    RightShift,
    UnsignedRightShift,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    In,
    Instanceof,
}

impl BinaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
            BinaryOp::LessThan => "<",
            BinaryOp::LessThanEq => "<=",
            BinaryOp::GreaterThan => ">",
            BinaryOp::GreaterThanEq => ">=",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::StrictEqual => "===",
            BinaryOp::StrictNotEqual => "!==",
            BinaryOp::LeftShift => "<<",
            BinaryOp::RightShift => ">>",
            BinaryOp::UnsignedRightShift => ">>>",
            BinaryOp::BitwiseAnd => "&",
            BinaryOp::BitwiseOr => "|",
            BinaryOp::BitwiseXor => "^",
            BinaryOp::In => "in",
            BinaryOp::Instanceof => "instanceof",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    NullishCoalescing,
}
