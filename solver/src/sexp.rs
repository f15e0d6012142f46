// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Converts expressions to S-expressions.
//!
//! Access paths (`e0.id`, `e1.pair.0`, `index(e0)`, configuration variables)
//! are opaque to the solver: each becomes an uninterpreted constant named by
//! its canonical text. Program-declared functions become uninterpreted
//! functions. Both are sound for implication checking.

use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use expr::program::Program;
use expr::syntax::{BinOp, Expr, UOp, INDEX_FN};
use expr::types::Type;
use smtlib::proc::SolverError;
use expr::printer::decimal;
use smtlib::sexp::{app, atom_dec, atom_i, atom_s, sexp_l, string_lit, Sexp};

/// Uninterpreted sort standing for machine references.
pub const MACHINE_SORT: &str = "Machine";

/// Reasons an implication cannot be decided by the solver. All of them are
/// recoverable: callers fall back to a syntactic check.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The expression mentions a value of a type with no SMT encoding.
    #[error("type {0} has no SMT encoding")]
    UnsupportedType(Type),
    /// The expression has no SMT encoding.
    #[error("cannot encode `{0}`")]
    UnsupportedExpr(String),
    /// The solver answered unknown.
    #[error("solver returned unknown: {0}")]
    Unknown(String),
    /// The solver process failed.
    #[error(transparent)]
    Solver(#[from] SolverError),
}

/// Convert a type to an SMT sort.
pub fn sort(program: &Program, ty: &Type) -> Result<Sexp, BridgeError> {
    match ty {
        Type::Bool => Ok(atom_s("Bool")),
        Type::Int => Ok(atom_s("Int")),
        Type::Float => Ok(atom_s("Real")),
        Type::String => Ok(atom_s("String")),
        Type::Machine => Ok(atom_s(MACHINE_SORT)),
        Type::Enum(name) => match program.enum_decl(name) {
            Some(decl) if !decl.elements.is_empty() => Ok(atom_s(name)),
            _ => Err(BridgeError::UnsupportedType(ty.clone())),
        },
        _ => Err(BridgeError::UnsupportedType(ty.clone())),
    }
}

/// Top-level declarations every session needs: the machine sort and one
/// datatype per non-empty enumeration.
pub fn session_declarations(program: &Program) -> Vec<Sexp> {
    let mut decls = vec![app("declare-sort", [atom_s(MACHINE_SORT), atom_i(0)])];
    for decl in program.enums.iter().filter(|e| !e.elements.is_empty()) {
        let ctors = sexp_l(decl.elements.iter().map(|el| sexp_l([atom_s(el)])));
        decls.push(app(
            "declare-datatypes",
            [
                sexp_l([sexp_l([atom_s(&decl.name), atom_i(0)])]),
                sexp_l([ctors]),
            ],
        ));
    }
    decls
}

/// An encoded expression together with the names of the symbols it needs
/// declared.
#[derive(Debug, Clone)]
pub struct Encoded {
    /// The SMT term
    pub term: Sexp,
    /// Constants and functions the term mentions
    pub symbols: BTreeSet<String>,
}

/// Encoding state for one quantifier header: memoized terms and the
/// declarations of every symbol seen so far.
#[derive(Debug, Default)]
pub struct Context {
    terms: BTreeMap<Expr, Encoded>,
    decls: BTreeMap<String, Sexp>,
}

fn is_access_path(e: &Expr) -> bool {
    match e {
        Expr::Var { .. } => true,
        Expr::Field { base, .. } | Expr::TupleIndex { base, .. } => {
            matches!(**base, Expr::Event { .. }) || is_access_path(base)
        }
        Expr::Call { func, args, .. } => {
            func == INDEX_FN && matches!(args.as_slice(), [Expr::Event { .. }])
        }
        _ => false,
    }
}

impl Context {
    /// Encode `e`, reusing the memoized result for structurally equal
    /// expressions.
    pub fn encode(&mut self, program: &Program, e: &Expr) -> Result<Encoded, BridgeError> {
        if let Some(enc) = self.terms.get(e) {
            return Ok(enc.clone());
        }
        let mut symbols = BTreeSet::new();
        let term = self.term(program, e, &mut symbols)?;
        let enc = Encoded { term, symbols };
        self.terms.insert(e.clone(), enc.clone());
        Ok(enc)
    }

    /// The declaration command of a symbol seen by [`Context::encode`].
    pub fn declaration(&self, symbol: &str) -> Option<&Sexp> {
        self.decls.get(symbol)
    }

    fn term(
        &mut self,
        program: &Program,
        e: &Expr,
        symbols: &mut BTreeSet<String>,
    ) -> Result<Sexp, BridgeError> {
        let unsupported = || BridgeError::UnsupportedExpr(e.to_string());
        if is_access_path(e) {
            let name = e.to_string();
            let s = sort(program, &e.ty())?;
            self.decls
                .entry(name.clone())
                .or_insert_with(|| app("declare-const", [atom_s(&name), s]));
            symbols.insert(name.clone());
            return Ok(atom_s(name));
        }
        let mut term = |e: &Expr| self.term(program, e, symbols);
        Ok(match e {
            Expr::Bool(b) => atom_s(if *b { "true" } else { "false" }),
            Expr::Int(i) => atom_i(usize::try_from(*i).map_err(|_| unsupported())?),
            Expr::Float(f) => {
                if !f.0.is_finite() || f.0 < 0.0 {
                    return Err(unsupported());
                }
                atom_dec(decimal(f.0))
            }
            Expr::Str(s) => string_lit(s),
            Expr::EnumElem { enum_name, elem } => {
                sort(program, &Type::Enum(enum_name.clone()))?;
                atom_s(elem)
            }
            Expr::Event { .. } | Expr::Var { .. } | Expr::Field { .. } | Expr::TupleIndex { .. } => {
                return Err(unsupported())
            }
            Expr::Call { func, args, ty } => {
                let decl = program.function(func).ok_or_else(unsupported)?;
                let params = decl
                    .params
                    .iter()
                    .map(|t| sort(program, t))
                    .collect::<Result<Vec<_>, _>>()?;
                let ret = sort(program, ty)?;
                let args = args.iter().map(&mut term).collect::<Result<Vec<_>, _>>()?;
                self.decls.entry(func.clone()).or_insert_with(|| {
                    app("declare-fun", [atom_s(func), sexp_l(params), ret])
                });
                symbols.insert(func.clone());
                app(func, args)
            }
            Expr::Unary(UOp::Not, x) => app("not", [term(x)?]),
            Expr::Unary(UOp::Neg, x) => app("-", [term(x)?]),
            Expr::Binary(op, x, y) => {
                let args = [term(x)?, term(y)?];
                let head = match op {
                    BinOp::Add => "+",
                    BinOp::Sub => "-",
                    BinOp::Mul => "*",
                    BinOp::Div if x.ty() == Type::Float => "/",
                    BinOp::Div => "div",
                    BinOp::Mod => "mod",
                    BinOp::And => "and",
                    BinOp::Or => "or",
                    BinOp::Eq => "=",
                    BinOp::Neq => "distinct",
                    BinOp::Lt => "<",
                    BinOp::Le => "<=",
                    BinOp::Gt => ">",
                    BinOp::Ge => ">=",
                };
                app(head, args)
            }
        })
    }
}

/// `(and ..)` of the given terms, `true` when there are none.
pub fn conjunction(terms: Vec<Sexp>) -> Sexp {
    match terms.len() {
        // the solver can error if no arguments are provided like `(and)`
        0 => atom_s("true"),
        1 => terms.into_iter().next().unwrap_or_else(|| atom_s("true")),
        _ => app("and", terms),
    }
}

/// The query whose unsatisfiability means `lhs` implies `rhs`.
pub fn negated_implication(lhs: Vec<Sexp>, rhs: Vec<Sexp>) -> Sexp {
    app(
        "assert",
        [app("not", [app("=>", [conjunction(lhs), conjunction(rhs)])])],
    )
}
