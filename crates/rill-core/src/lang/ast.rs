//! AST for rillscript.

use std::sync::Arc;

/// A parsed module: the body of one imperative cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub body: Vec<Stmt>,
}

/// A statement with its source line.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub line: usize,
    pub kind: StmtKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// Bare expression evaluated for effect.
    Expr(Expr),
    /// `x = e` or `a, b = e1, e2`.
    Assign { target: Target, value: Expr },
    /// `x += e` and friends.
    AugAssign {
        name: String,
        op: BinOp,
        value: Expr,
    },
    /// `fn name(params) { ... }`; binds a function value.
    FnDef(Arc<Function>),
    Return(Option<Expr>),
    If {
        /// `(condition, body)` for the `if` and each `else if`.
        branches: Vec<(Expr, Vec<Stmt>)>,
        else_body: Option<Vec<Stmt>>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    For {
        target: String,
        iter: Expr,
        body: Vec<Stmt>,
    },
    Break,
    Continue,
}

/// Assignment target.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Name(String),
    /// `a, b = ...` destructuring; every element is a plain name.
    Tuple(Vec<String>),
}

impl Target {
    /// Names bound by this target.
    pub fn names(&self) -> Vec<&str> {
        match self {
            Target::Name(n) => vec![n.as_str()],
            Target::Tuple(ns) => ns.iter().map(String::as_str).collect(),
        }
    }
}

/// A user-defined function.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
    pub line: usize,
}

/// An expression with its source line.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub line: usize,
    pub kind: ExprKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,
    List(Vec<Expr>),
    Name(String),
    Unary {
        op: UnOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Index {
        obj: Box<Expr>,
        index: Box<Expr>,
    },
    /// Calls target a name: a builtin or a function bound in scope.
    Call {
        func: String,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinOp {
    /// Operator spelling for error messages.
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "and",
            BinOp::Or => "or",
        }
    }
}
