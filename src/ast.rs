//! The abstract syntax tree: a closed hierarchy of statement and expression
//! variants. Traversal is an exhaustive `match` per pass rather than virtual
//! dispatch; the semantic passes write annotations (`sym`, `scope`, `ty`,
//! `is_left_value`, `const_value`) into the nodes in a fixed pass order, and
//! no annotation is read before the pass that produces it has run.

use crate::scope::ScopeId;
use crate::symbol::SymbolId;
use crate::token::{Op, Position};
use crate::types::Type;

/// Root of the AST. The program body is itself a block; `sym` is the
/// synthetic entry-function symbol attached by the Enter pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub body: Block,
    pub sym: Option<SymbolId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub stmts: Vec<Statement>,
    pub scope: Option<ScopeId>,
    pub pos: Position,
}

impl Block {
    pub fn new(stmts: Vec<Statement>, pos: Position) -> Self {
        Self {
            stmts,
            scope: None,
            pos,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    FunctionDecl(FunctionDecl),
    VariableDecl(VariableDecl),
    If(IfStatement),
    For(ForStatement),
    Return(ReturnStatement),
    Block(Block),
    Expr(ExpressionStatement),
    /// Placeholder produced by parser error recovery.
    Error(Position),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type_name: Option<String>,
    pub body: Block,
    pub sym: Option<SymbolId>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub type_name: Option<String>,
    pub sym: Option<SymbolId>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDecl {
    pub name: String,
    pub type_name: Option<String>,
    pub init: Option<Expression>,
    pub sym: Option<SymbolId>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfStatement {
    pub condition: Expression,
    pub then_stmt: Box<Statement>,
    pub else_stmt: Option<Box<Statement>>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForStatement {
    pub init: Option<ForInit>,
    pub condition: Option<Expression>,
    pub increment: Option<Expression>,
    pub body: Box<Statement>,
    /// Scope holding the loop variable; it encloses the body.
    pub scope: Option<ScopeId>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ForInit {
    Decl(VariableDecl),
    Expr(Expression),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReturnStatement {
    pub exp: Option<Expression>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionStatement {
    pub exp: Expression,
    pub pos: Position,
}

/// An expression node: the variant plus the annotations the semantic passes
/// fill in.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub kind: ExprKind,
    pub pos: Position,
    /// Inferred type, written by the TypeChecker pass.
    pub ty: Option<Type>,
    /// Valid assignment/increment target, written by LeftValueAttributor.
    pub is_left_value: bool,
    /// Compile-time constant value, written by the optional ConstFolder.
    pub const_value: Option<ConstValue>,
}

impl Expression {
    pub fn new(kind: ExprKind, pos: Position) -> Self {
        Self {
            kind,
            pos,
            ty: None,
            is_left_value: false,
            const_value: None,
        }
    }

    /// Placeholder produced by parser error recovery.
    pub fn error(pos: Position) -> Self {
        Self::new(ExprKind::Error, pos)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    IntegerLiteral(i64),
    DecimalLiteral(f64),
    StringLiteral(String),
    BooleanLiteral(bool),
    NullLiteral,
    Variable {
        name: String,
        sym: Option<SymbolId>,
    },
    Binary {
        op: Op,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    Unary {
        op: Op,
        is_prefix: bool,
        operand: Box<Expression>,
    },
    Call(FunctionCall),
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub args: Vec<Expression>,
    pub sym: Option<SymbolId>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Integer(i64),
    Decimal(f64),
    String(String),
    Boolean(bool),
}
