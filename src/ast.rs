use crate::value::Value;

#[derive(Debug, PartialEq, Clone)]
pub enum Expr {
    Literal(Value),
    /// A bound name: a `__x`/`__s` placeholder or a local symbol.
    Name(String),
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// `a < b <= c`, evaluated pairwise like Python.
    Compare(Box<Expr>, Vec<(CompareOp, Expr)>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

impl Expr {
    /// The value of a self-contained literal: numbers (optionally signed),
    /// strings, booleans, `None`, and lists, tuples and dicts of those.
    /// Anything referencing a name or using an operator yields `None`.
    #[must_use]
    pub fn literal_value(&self) -> Option<Value> {
        match self {
            Expr::Literal(v) => Some(v.clone()),
            Expr::Unary(op @ (UnaryOp::Neg | UnaryOp::Pos), inner) => match inner.as_ref() {
                Expr::Literal(Value::Int(i)) => Some(Value::Int(match op {
                    UnaryOp::Neg => i.checked_neg()?,
                    _ => *i,
                })),
                Expr::Literal(Value::Float(f)) => Some(Value::Float(match op {
                    UnaryOp::Neg => -f,
                    _ => *f,
                })),
                _ => None,
            },
            Expr::List(items) => Some(Value::List(literal_items(items)?)),
            Expr::Tuple(items) => Some(Value::Tuple(literal_items(items)?)),
            Expr::Dict(pairs) => {
                let mut out = Vec::with_capacity(pairs.len());
                for (k, v) in pairs {
                    out.push((k.literal_value()?, v.literal_value()?));
                }
                Some(Value::Dict(out))
            }
            _ => None,
        }
    }
}

fn literal_items(items: &[Expr]) -> Option<Vec<Value>> {
    items.iter().map(Expr::literal_value).collect()
}
