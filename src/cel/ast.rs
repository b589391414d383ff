//! Expression tree produced by the parser
//!
//! Macros (`has`, `all`, `exists`, ...) are expanded at parse time, so the
//! checker and evaluator never see them as plain calls.

/// A node plus the byte offset of the token it was built from
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub offset: usize,
    pub kind: ExprKind,
    height: usize,
}

impl Expr {
    pub(crate) fn new(offset: usize, kind: ExprKind) -> Self {
        let height = kind.child_height() + 1;
        Self {
            offset,
            kind,
            height,
        }
    }

    /// Longest path from this node to a leaf, counting both ends
    pub fn height(&self) -> usize {
        self.height
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    Ident(String),
    /// `operand.field`; `test_only` marks a `has(operand.field)` presence test
    Select {
        operand: Box<Expr>,
        field: String,
        test_only: bool,
    },
    Index {
        operand: Box<Expr>,
        index: Box<Expr>,
    },
    /// Global call when `target` is `None`, member call otherwise
    Call {
        target: Option<Box<Expr>>,
        function: String,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Conditional {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    List(Vec<Expr>),
    Map(Vec<(Expr, Expr)>),
    /// Expanded iteration macro. For `map` with three arguments `filter` holds
    /// the predicate and `body` the transform.
    Comprehension {
        kind: Macro,
        range: Box<Expr>,
        variable: String,
        filter: Option<Box<Expr>>,
        body: Box<Expr>,
    },
}

impl ExprKind {
    fn child_height(&self) -> usize {
        match self {
            ExprKind::Literal(_) | ExprKind::Ident(_) => 0,
            ExprKind::Select { operand, .. } | ExprKind::Unary { operand, .. } => operand.height,
            ExprKind::Index { operand, index } => operand.height.max(index.height),
            ExprKind::Call { target, args, .. } => {
                tallest(target.as_deref().into_iter().chain(args))
            }
            ExprKind::Binary { lhs, rhs, .. } => lhs.height.max(rhs.height),
            ExprKind::Conditional {
                condition,
                then,
                otherwise,
            } => condition.height.max(then.height).max(otherwise.height),
            ExprKind::List(items) => tallest(items),
            ExprKind::Map(entries) => tallest(entries.iter().flat_map(|(k, v)| [k, v])),
            ExprKind::Comprehension {
                range,
                filter,
                body,
                ..
            } => tallest([&**range, &**body].into_iter().chain(filter.as_deref())),
        }
    }
}

fn tallest<'a>(exprs: impl IntoIterator<Item = &'a Expr>) -> usize {
    exprs.into_iter().map(Expr::height).max().unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Double(f64),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

impl UnaryOp {
    pub fn overload_name(&self) -> &'static str {
        match self {
            UnaryOp::Not => "!_",
            UnaryOp::Neg => "-_",
        }
    }
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
    In,
    And,
    Or,
}

impl BinaryOp {
    /// Operator name in the form CEL uses for overload diagnostics
    pub fn overload_name(&self) -> &'static str {
        match self {
            BinaryOp::Add => "_+_",
            BinaryOp::Sub => "_-_",
            BinaryOp::Mul => "_*_",
            BinaryOp::Div => "_/_",
            BinaryOp::Rem => "_%_",
            BinaryOp::Eq => "_==_",
            BinaryOp::Ne => "_!=_",
            BinaryOp::Lt => "_<_",
            BinaryOp::Le => "_<=_",
            BinaryOp::Gt => "_>_",
            BinaryOp::Ge => "_>=_",
            BinaryOp::In => "@in",
            BinaryOp::And => "_&&_",
            BinaryOp::Or => "_||_",
        }
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem
        )
    }

    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Macro {
    All,
    Exists,
    ExistsOne,
    Map,
    Filter,
}

impl Macro {
    pub(crate) fn from_name(name: &str) -> Option<Self> {
        match name {
            "all" => Some(Macro::All),
            "exists" => Some(Macro::Exists),
            "exists_one" => Some(Macro::ExistsOne),
            "map" => Some(Macro::Map),
            "filter" => Some(Macro::Filter),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Macro::All => "all",
            Macro::Exists => "exists",
            Macro::ExistsOne => "exists_one",
            Macro::Map => "map",
            Macro::Filter => "filter",
        }
    }
}
