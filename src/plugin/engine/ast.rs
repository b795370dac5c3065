//! 语法树

use crate::plugin::value::Value;

/// 文件内位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Default)]
pub struct SourceUnit {
    pub items: Vec<Item>,
}

#[derive(Debug, Clone)]
pub enum Item {
    /// `@repository "..."` / `@depends "..."`
    Directive {
        name: String,
        value: String,
        span: Span,
    },
    /// `var name = expr`
    Global { name: String, init: Expr, span: Span },
    Function(FunctionDecl),
}

#[derive(Debug, Clone)]
pub struct Annotation {
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub type_name: String,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Block,
    pub annotations: Vec<Annotation>,
    pub span: Span,
}

pub type Block = Vec<Stmt>;

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Let { name: String, value: Expr },
    Set { name: String, value: Expr },
    Log(Expr),
    Emit(Expr),
    Fail(Expr),
    Return(Option<Expr>),
    If {
        cond: Expr,
        then: Block,
        otherwise: Option<Block>,
    },
    Expr(Expr),
}

impl StmtKind {
    /// 执行后控制流不会落到下一条语句
    pub fn diverges(&self) -> bool {
        match self {
            StmtKind::Return(_) | StmtKind::Fail(_) => true,
            StmtKind::If {
                then,
                otherwise: Some(otherwise),
                ..
            } => block_diverges(then) && block_diverges(otherwise),
            _ => false,
        }
    }
}

pub fn block_diverges(block: &Block) -> bool {
    block.iter().any(|s| s.kind.diverges())
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Literal(Value),
    Name(String),
    Call { name: String, args: Vec<Expr> },
    Unary { op: UnaryOp, expr: Box<Expr> },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}
