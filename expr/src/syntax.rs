// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The typed expression tree used for guards, filters and terms.

use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

use crate::types::Type;

/// A float literal with structural (bitwise) equality, so that expressions can
/// be hashed and used as keys.
#[derive(Clone, Copy, Debug)]
pub struct Float(pub f64);

impl PartialEq for Float {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for Float {}

impl Hash for Float {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state)
    }
}

impl PartialOrd for Float {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Float {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Unary operators
#[allow(missing_docs)]
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, PartialOrd, Ord)]
pub enum UOp {
    Not,
    Neg,
}

/// Binary operators
#[allow(missing_docs)]
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, PartialOrd, Ord)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinOp {
    /// The surface syntax of the operator.
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::Eq => "==",
            BinOp::Neq => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
        }
    }

    #[allow(missing_docs)]
    pub fn is_arith(&self) -> bool {
        matches!(
            self,
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod
        )
    }

    #[allow(missing_docs)]
    pub fn is_order(&self) -> bool {
        matches!(self, BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge)
    }

    /// `a op b` and `b op a` always agree.
    pub fn is_commutative(&self) -> bool {
        matches!(
            self,
            BinOp::Add | BinOp::Mul | BinOp::And | BinOp::Or | BinOp::Eq | BinOp::Neq
        )
    }

    /// The relation that holds exactly when this one does not.
    pub fn complement(&self) -> Option<BinOp> {
        match self {
            BinOp::Eq => Some(BinOp::Neq),
            BinOp::Neq => Some(BinOp::Eq),
            BinOp::Lt => Some(BinOp::Ge),
            BinOp::Ge => Some(BinOp::Lt),
            BinOp::Le => Some(BinOp::Gt),
            BinOp::Gt => Some(BinOp::Le),
            _ => None,
        }
    }
}

/// Built-in function returning the global arrival index of a quantified event.
pub const INDEX_FN: &str = "index";
/// Built-in function returning the length of a collection or string.
pub const SIZE_FN: &str = "size";
/// Variable holding the number of existential witnesses seen so far.
pub const NUM_EXISTS_VAR: &str = "_num_e_exists_";

/// A typed expression.
///
/// Leaves whose type is not determined by their shape (variables, accesses,
/// calls) carry their type; [`Expr::ty`] computes it for the rest.
#[derive(PartialEq, Eq, Clone, Debug, Hash, PartialOrd, Ord)]
pub enum Expr {
    #[allow(missing_docs)]
    Bool(bool),
    /// Always non-negative when produced by the parser or [`Expr::int`];
    /// negative constants are `Neg` of a literal.
    Int(i64),
    #[allow(missing_docs)]
    Float(Float),
    #[allow(missing_docs)]
    Str(String),
    /// An element of a declared enumeration
    EnumElem {
        #[allow(missing_docs)]
        enum_name: String,
        #[allow(missing_docs)]
        elem: String,
    },
    /// A reference to a quantified event variable bound to an event type
    Event {
        /// Variable name, e.g. `e0`
        name: String,
        /// Event type the variable ranges over
        event: String,
    },
    /// Any other variable in scope (configuration fields, witness counts)
    Var {
        #[allow(missing_docs)]
        name: String,
        #[allow(missing_docs)]
        ty: Type,
    },
    /// Named field access
    Field {
        #[allow(missing_docs)]
        base: Box<Expr>,
        #[allow(missing_docs)]
        field: String,
        #[allow(missing_docs)]
        ty: Type,
    },
    /// Positional tuple access
    TupleIndex {
        #[allow(missing_docs)]
        base: Box<Expr>,
        #[allow(missing_docs)]
        index: usize,
        #[allow(missing_docs)]
        ty: Type,
    },
    /// Call of a built-in or program-declared function or predicate
    Call {
        #[allow(missing_docs)]
        func: String,
        #[allow(missing_docs)]
        args: Vec<Expr>,
        #[allow(missing_docs)]
        ty: Type,
    },
    #[allow(missing_docs)]
    Unary(UOp, Box<Expr>),
    #[allow(missing_docs)]
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Smart constructor for integer literals, keeping literals non-negative.
    /// `i64::MIN` has no non-negative counterpart and saturates to
    /// `-i64::MAX`.
    pub fn int(i: i64) -> Self {
        if i < 0 {
            let abs = i.checked_neg().unwrap_or(i64::MAX);
            Self::Unary(UOp::Neg, Box::new(Self::Int(abs)))
        } else {
            Self::Int(i)
        }
    }

    #[allow(missing_docs)]
    pub fn event(name: &str, event: &str) -> Self {
        Self::Event {
            name: name.to_string(),
            event: event.to_string(),
        }
    }

    #[allow(missing_docs)]
    pub fn field(base: Expr, field: &str, ty: Type) -> Self {
        Self::Field {
            base: Box::new(base),
            field: field.to_string(),
            ty,
        }
    }

    #[allow(missing_docs)]
    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        Self::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    /// `index(e)` for a quantified event variable.
    pub fn index_of(name: &str, event: &str) -> Self {
        Self::Call {
            func: INDEX_FN.to_string(),
            args: vec![Self::event(name, event)],
            ty: Type::Int,
        }
    }

    /// Smart constructor for negation. Cancels double negation and flips
    /// relations into their complement.
    pub fn not(e: Expr) -> Self {
        match e {
            Self::Unary(UOp::Not, body) => *body,
            Self::Binary(op, lhs, rhs) => match op.complement() {
                Some(flipped) => Self::Binary(flipped, lhs, rhs),
                None => Self::Unary(UOp::Not, Box::new(Self::Binary(op, lhs, rhs))),
            },
            _ => Self::Unary(UOp::Not, Box::new(e)),
        }
    }

    /// Whether `self` and `other` can never hold together and one always
    /// holds, judged structurally (`p`/`!p`, `a < b`/`a >= b`, ...).
    pub fn is_complement_of(&self, other: &Expr) -> bool {
        &Self::not(self.clone()) == other || &Self::not(other.clone()) == self
    }

    /// The type of this expression. Assumes the expression is well-typed,
    /// which the parser guarantees.
    pub fn ty(&self) -> Type {
        match self {
            Expr::Bool(_) => Type::Bool,
            Expr::Int(_) => Type::Int,
            Expr::Float(_) => Type::Float,
            Expr::Str(_) => Type::String,
            Expr::EnumElem { enum_name, .. } => Type::Enum(enum_name.clone()),
            Expr::Event { event, .. } => Type::Event(event.clone()),
            Expr::Var { ty, .. }
            | Expr::Field { ty, .. }
            | Expr::TupleIndex { ty, .. }
            | Expr::Call { ty, .. } => ty.clone(),
            Expr::Unary(UOp::Not, _) => Type::Bool,
            Expr::Unary(UOp::Neg, e) => e.ty(),
            Expr::Binary(op, lhs, _) => {
                if op.is_arith() {
                    lhs.ty()
                } else {
                    Type::Bool
                }
            }
        }
    }

    /// Immediate subexpressions.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Bool(_)
            | Expr::Int(_)
            | Expr::Float(_)
            | Expr::Str(_)
            | Expr::EnumElem { .. }
            | Expr::Event { .. }
            | Expr::Var { .. } => vec![],
            Expr::Field { base, .. } | Expr::TupleIndex { base, .. } => vec![base],
            Expr::Call { args, .. } => args.iter().collect(),
            Expr::Unary(_, e) => vec![e],
            Expr::Binary(_, lhs, rhs) => vec![lhs, rhs],
        }
    }

    /// Names of the quantified event variables this expression mentions.
    pub fn free_events(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_events(&mut out);
        out
    }

    fn collect_events(&self, out: &mut BTreeSet<String>) {
        if let Expr::Event { name, .. } = self {
            out.insert(name.clone());
        }
        for c in self.children() {
            c.collect_events(out);
        }
    }

    /// Names of the plain variables this expression mentions.
    pub fn free_vars(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_vars(&mut out);
        out
    }

    fn collect_vars(&self, out: &mut BTreeSet<String>) {
        if let Expr::Var { name, .. } = self {
            out.insert(name.clone());
        }
        for c in self.children() {
            c.collect_vars(out);
        }
    }

    /// Nesting depth of arithmetic: leaves and accesses have depth 0.
    pub fn term_depth(&self) -> usize {
        match self {
            Expr::Binary(op, lhs, rhs) if op.is_arith() => {
                1 + lhs.term_depth().max(rhs.term_depth())
            }
            Expr::Unary(UOp::Neg, e) => e.term_depth(),
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x() -> Expr {
        Expr::field(Expr::event("e0", "eReq"), "x", Type::Int)
    }

    #[test]
    fn test_not() {
        let lt = Expr::binary(BinOp::Lt, x(), Expr::int(0));
        assert_eq!(
            Expr::not(lt.clone()),
            Expr::binary(BinOp::Ge, x(), Expr::int(0))
        );
        assert_eq!(Expr::not(Expr::not(lt.clone())), lt);
        let call = Expr::Call {
            func: "ok".to_string(),
            args: vec![x()],
            ty: Type::Bool,
        };
        assert_eq!(Expr::not(Expr::not(call.clone())), call);
    }

    #[test]
    fn test_complement() {
        let gt = Expr::binary(BinOp::Gt, x(), Expr::int(0));
        let le = Expr::binary(BinOp::Le, x(), Expr::int(0));
        let lt = Expr::binary(BinOp::Lt, x(), Expr::int(0));
        assert!(gt.is_complement_of(&le));
        assert!(le.is_complement_of(&gt));
        assert!(!gt.is_complement_of(&lt));
    }

    #[test]
    fn test_free_events() {
        let e = Expr::binary(
            BinOp::Lt,
            Expr::index_of("e0", "eReq"),
            Expr::index_of("e1", "eResp"),
        );
        let events: Vec<_> = e.free_events().into_iter().collect();
        assert_eq!(events, vec!["e0".to_string(), "e1".to_string()]);
        assert_eq!(e.ty(), Type::Bool);
    }

    #[test]
    fn test_negative_literal() {
        assert_eq!(
            Expr::int(-3),
            Expr::Unary(UOp::Neg, Box::new(Expr::Int(3)))
        );
        assert_eq!(Expr::int(-3).ty(), Type::Int);
        assert_eq!(
            Expr::int(i64::MIN),
            Expr::Unary(UOp::Neg, Box::new(Expr::Int(i64::MAX)))
        );
    }
}
