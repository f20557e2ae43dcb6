//! AST types for Mini (declarations, statements, expressions).

use crate::span::Span;
use std::fmt;

/// Root of a compilation unit: top-level statements in source order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Program {
    pub statements: Vec<Stmt>,
    pub span: Span,
}

/// A name at a specific source location (declaration or use).
#[derive(Clone, Debug, PartialEq)]
pub struct Identifier {
    pub name: String,
    pub span: Span,
}

impl Identifier {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeclKind {
    Let,
    Const,
}

impl DeclKind {
    pub fn keyword(self) -> &'static str {
        match self {
            DeclKind::Let => "let",
            DeclKind::Const => "const",
        }
    }
}

/// `let name = init;` or `const name = init;`
#[derive(Clone, Debug, PartialEq)]
pub struct VariableDecl {
    pub span: Span,
    pub kind: DeclKind,
    pub name: Identifier,
    pub initializer: Option<Expr>,
}

/// `function name(params) { body }`
#[derive(Clone, Debug, PartialEq)]
pub struct FunctionDecl {
    pub span: Span,
    pub name: Identifier,
    pub params: Vec<Identifier>,
    pub body: Block,
}

/// Block: `{ stmts }`
#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub span: Span,
    pub statements: Vec<Stmt>,
}

/// Statement.
#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    VariableDeclaration(VariableDecl),
    FunctionDeclaration(FunctionDecl),
    Block(Block),
    If {
        span: Span,
        test: Expr,
        then: Box<Stmt>,
        else_: Option<Box<Stmt>>,
    },
    Return {
        span: Span,
        value: Option<Expr>,
    },
    Print {
        span: Span,
        value: Expr,
    },
    Expression {
        span: Span,
        expression: Expr,
    },
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::VariableDeclaration(d) => d.span,
            Stmt::FunctionDeclaration(f) => f.span,
            Stmt::Block(b) => b.span,
            Stmt::If { span, .. }
            | Stmt::Return { span, .. }
            | Stmt::Print { span, .. }
            | Stmt::Expression { span, .. } => *span,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
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

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
        }
    }

    pub fn is_comparison(self) -> bool {
        !matches!(self, BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div)
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

impl UnOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnOp::Neg => "-",
            UnOp::Not => "!",
        }
    }
}

impl fmt::Display for UnOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Literal value carried by a `Literal` expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(n) => write!(f, "{}", n),
            Literal::Float(x) => {
                if x.fract() == 0.0 && x.is_finite() {
                    write!(f, "{:.1}", x)
                } else {
                    write!(f, "{}", x)
                }
            }
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Str(s) => write!(f, "\"{}\"", escape_str(s)),
        }
    }
}

/// Escape a string for a double-quoted literal (inverse of the lexer's escapes).
pub fn escape_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}

/// Expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Binary {
        span: Span,
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        span: Span,
        op: UnOp,
        operand: Box<Expr>,
    },
    /// Call of a named function: `f(a, b)`
    Call {
        span: Span,
        callee: Identifier,
        args: Vec<Expr>,
    },
    /// Assignment: `x = expr`
    Assign {
        span: Span,
        target: Identifier,
        value: Box<Expr>,
    },
    Literal {
        span: Span,
        value: Literal,
    },
    Identifier(Identifier),
}

impl Expr {
    /// Span of this expression in source.
    pub fn span(&self) -> Span {
        match self {
            Expr::Binary { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Call { span, .. }
            | Expr::Assign { span, .. }
            | Expr::Literal { span, .. } => *span,
            Expr::Identifier(id) => id.span,
        }
    }
}
