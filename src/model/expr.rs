//! A minimal stand-in for the typed P4 expression tree the mid-end would
//! supply (the P4 frontend/mid-end is out of scope, specification §1). Just
//! enough structure for instruction selection (§4.5) and the write-context
//! classifier (§4.1) to operate on: field references, constants,
//! action-data references, binary/unary ops, slices, a ternary mux, and
//! extern calls with argument directions.

use crate::common::bitvec::BitRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    And,
    Or,
    Xor,
    Add,
    SatAddU,
    SatAddS,
    Sub,
    SatSubU,
    SatSubS,
    Shl,
    ShrU,
    ShrS,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LtS,
    LeS,
    GtS,
    GeS,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Field(u32, BitRange),
    ActionArg(String, BitRange),
    Const(i64, u32),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    BinOp(BinOp, Box<Expr>, Box<Expr>),
    /// `cond ? t : f`.
    Mux(Box<Expr>, Box<Expr>, Box<Expr>),
    Slice(Box<Expr>, BitRange),
    /// `(hi ++ lo) >> shift`, the funnel-shift source pattern (§4.5).
    Concat(Box<Expr>, Box<Expr>),
    HashDist(String, u32),
    RandomNumber(u32),
    AttachedOutput(String, u32),
}

impl Expr {
    pub fn width(&self) -> u32 {
        match self {
            Expr::Field(_, r) => r.size(),
            Expr::ActionArg(_, r) => r.size(),
            Expr::Const(_, w) => *w,
            Expr::Not(e) | Expr::Neg(e) => e.width(),
            Expr::BinOp(_, l, _) => l.width(),
            Expr::Mux(_, t, _) => t.width(),
            Expr::Slice(_, r) => r.size(),
            Expr::Concat(hi, lo) => hi.width() + lo.width(),
            Expr::HashDist(_, w) => *w,
            Expr::RandomNumber(w) => *w,
            Expr::AttachedOutput(_, w) => *w,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgMode {
    In,
    Out,
    InOut,
}

/// One statement inside an action body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Assign { dst: Expr, src: Expr },
    ExternCall { name: String, args: Vec<(Expr, ArgMode)> },
    Invalidate { dst: Expr },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub name: String,
    pub body: Vec<Stmt>,
}
