//! Abstract syntax tree produced by the parser.

use crate::lexer::Span;

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub items: Vec<Item>,
}

/// Top-level item: an import, export, function declaration, or a bare
/// statement (only function declarations and imports may appear at module
/// scope per the grammar; statements are nested inside function bodies, but
/// `Item::Statement` lets a source file be a flat script with no `fn main`).
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Import(ImportDecl),
    Function(FunctionDecl),
    Statement(Statement),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportDecl {
    pub names: Vec<String>,
    pub module: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<String>,
    pub body: Block,
    pub exported: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub statements: Vec<Statement>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Let {
        name: String,
        value: Expression,
        exported: bool,
        span: Span,
    },
    Print {
        value: Expression,
        span: Span,
    },
    Read {
        var: String,
        span: Span,
    },
    If {
        condition: Expression,
        then_branch: Block,
        else_branch: Option<Block>,
        span: Span,
    },
    While {
        condition: Expression,
        body: Block,
        span: Span,
    },
    Return {
        value: Option<Expression>,
        span: Span,
    },
    Throw {
        value: Expression,
        span: Span,
    },
    TryCatch {
        try_block: Block,
        catch_name: Option<String>,
        catch_block: Block,
        span: Span,
    },
    Expr {
        value: Expression,
        span: Span,
    },
}

impl Statement {
    pub fn span(&self) -> Span {
        match self {
            Statement::Let { span, .. }
            | Statement::Print { span, .. }
            | Statement::Read { span, .. }
            | Statement::If { span, .. }
            | Statement::While { span, .. }
            | Statement::Return { span, .. }
            | Statement::Throw { span, .. }
            | Statement::TryCatch { span, .. }
            | Statement::Expr { span, .. } => *span,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Number {
        value: i64,
        span: Span,
    },
    StringLit {
        value: String,
        span: Span,
    },
    Ident {
        name: String,
        span: Span,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
        span: Span,
    },
    Negate {
        value: Box<Expression>,
        span: Span,
    },
    Call {
        callee: String,
        args: Vec<Expression>,
        span: Span,
    },
    ArrayLit {
        elements: Vec<Expression>,
        span: Span,
    },
    ArrayAccess {
        array: Box<Expression>,
        index: Box<Expression>,
        span: Span,
    },
    /// `target = value`; `target` must be an `Ident` or `ArrayAccess` once it
    /// reaches the parser's own validation (see `Parser::parse_assignment`),
    /// so downstream consumers (codegen) can assume that invariant rather
    /// than re-checking it.
    Assignment {
        target: Box<Expression>,
        value: Box<Expression>,
        span: Span,
    },
}

impl Expression {
    pub fn span(&self) -> Span {
        match self {
            Expression::Number { span, .. }
            | Expression::StringLit { span, .. }
            | Expression::Ident { span, .. }
            | Expression::Binary { span, .. }
            | Expression::Negate { span, .. }
            | Expression::Call { span, .. }
            | Expression::ArrayLit { span, .. }
            | Expression::ArrayAccess { span, .. }
            | Expression::Assignment { span, .. } => *span,
        }
    }

    /// True for the two shapes `Assignment`'s target is allowed to take.
    pub fn is_assignable(&self) -> bool {
        matches!(self, Expression::Ident { .. } | Expression::ArrayAccess { .. })
    }
}
