// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Canonical textual form of expressions.
//!
//! The printed text is the identity of a predicate everywhere downstream
//! (deduplication, solver caches, the miner's predicate ids), so printing is
//! deterministic and `parse(print(e)) == e` for every expression the parser
//! can produce: nested binary operations are always parenthesized, top-level
//! ones never are.

use itertools::Itertools;
use std::fmt;

use crate::syntax::{Expr, UOp};

/// A float in plain decimal notation, the shortest text that reads back as
/// the same value. The literal grammar has no exponents, so neither does this.
pub fn decimal(x: f64) -> String {
    let mut s = x.to_string();
    if x.is_finite() && !s.contains('.') {
        s.push_str(".0");
    }
    s
}

fn operand(e: &Expr) -> String {
    match e {
        Expr::Binary(..) | Expr::Unary(..) => format!("({e})"),
        _ => e.to_string(),
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Bool(b) => write!(f, "{b}"),
            Expr::Int(i) => write!(f, "{i}"),
            Expr::Float(x) => write!(f, "{}", decimal(x.0)),
            Expr::Str(s) => write!(f, "\"{s}\""),
            Expr::EnumElem { elem, .. } => write!(f, "{elem}"),
            Expr::Event { name, .. } | Expr::Var { name, .. } => write!(f, "{name}"),
            Expr::Field { base, field, .. } => write!(f, "{}.{field}", operand(base)),
            Expr::TupleIndex { base, index, .. } => write!(f, "{}.{index}", operand(base)),
            Expr::Call { func, args, .. } => write!(f, "{func}({})", args.iter().join(", ")),
            Expr::Unary(op, e) => {
                let op = match op {
                    UOp::Not => "!",
                    UOp::Neg => "-",
                };
                match **e {
                    // `-(-1)` rather than `--1`
                    Expr::Binary(..) | Expr::Unary(..) => write!(f, "{op}({e})"),
                    _ => write!(f, "{op}{e}"),
                }
            }
            Expr::Binary(op, lhs, rhs) => {
                let side = |e: &Expr| match e {
                    Expr::Binary(..) => format!("({e})"),
                    _ => e.to_string(),
                };
                write!(f, "{} {} {}", side(lhs), op.symbol(), side(rhs))
            }
        }
    }
}

/// Render an expression to its canonical text.
pub fn render(e: &Expr) -> String {
    e.to_string()
}

/// Join predicate texts as a conjunction, the way invariants are displayed.
pub fn conjunction<I, S>(preds: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    preds
        .into_iter()
        .map(|s| s.as_ref().to_string())
        .join(" ∧ ")
}

#[cfg(test)]
mod tests {
    use super::{decimal, render};
    use crate::parser::parse;
    use crate::program::Program;
    use crate::scope::Scope;
    use crate::syntax::NUM_EXISTS_VAR;
    use crate::types::Type;

    fn program() -> Program {
        Program::from_json(
            r#"{
            "enums": [{"name": "Status", "elements": ["OK", "ERR"]}],
            "events": [
                {"name": "eReq", "payload": {"named": [["id", "int"], ["amount", "float"], ["tags", {"seq": "string"}]]}},
                {"name": "eResp", "payload": {"named": [["id", "int"], ["status", {"enum": "Status"}], ["pair", {"tuple": ["int", "bool"]}]]}}
            ],
            "functions": [{"name": "valid", "params": ["int", "int"], "ret": "bool"}]
        }"#,
        )
        .unwrap()
    }

    fn reprint(s: &str) -> String {
        let p = program();
        let scope = Scope::new(&p)
            .with_event("e0", "eReq")
            .with_event("e1", "eResp")
            .with_var(NUM_EXISTS_VAR, Type::Int);
        render(&parse(s, &scope).unwrap())
    }

    #[test]
    fn test_printer() {
        insta::assert_display_snapshot!(reprint("e0.id==e1.id"), @"e0.id == e1.id");
        insta::assert_display_snapshot!(reprint("e0.id + e1.id + 1 < 3"), @"((e0.id + e1.id) + 1) < 3");
        insta::assert_display_snapshot!(reprint("!(e0.id < 2)"), @"!(e0.id < 2)");
        insta::assert_display_snapshot!(reprint("- -3 < e0.id"), @"-(-3) < e0.id");
        insta::assert_display_snapshot!(reprint("(e1.pair).1"), @"e1.pair.1");
        insta::assert_display_snapshot!(reprint("valid( e0.id ,e1.id)"), @"valid(e0.id, e1.id)");
        insta::assert_display_snapshot!(reprint("e0.amount >= 2.50"), @"e0.amount >= 2.5");
    }

    #[test]
    fn test_roundtrip() {
        let p = program();
        let scope = Scope::new(&p)
            .with_event("e0", "eReq")
            .with_event("e1", "eResp")
            .with_var(NUM_EXISTS_VAR, Type::Int);
        for s in [
            "e0.id == e1.id",
            "index(e0) < index(e1)",
            "e1.status == OK",
            "e1.status != ERR && e1.pair.1",
            "e0.amount * 2.0 <= -e0.amount",
            "-(e0.id % 3) == 0",
            "size(e0.tags) > 0 || !(e1.pair.0 > e0.id)",
            "valid(e0.id - 1, e1.id)",
            "_num_e_exists_ >= 2",
            "e0.id - (e1.id - 1) == 0",
            "\"a b\" == \"a b\"",
            "e0.amount > 12345678901234567890.0",
            "e0.amount < 0.00000012",
        ] {
            let e = parse(s, &scope).unwrap_or_else(|err| panic!("`{s}` did not parse: {err}"));
            let printed = render(&e);
            assert_eq!(
                parse(&printed, &scope).unwrap(),
                e,
                "`{s}` does not roundtrip (printed as `{printed}`)"
            );
        }
    }

    #[test]
    fn test_decimal() {
        assert_eq!(decimal(2.0), "2.0");
        assert_eq!(decimal(0.5), "0.5");
        assert_eq!(decimal(1.2345678901234567e19), "12345678901234567000.0");
        assert_eq!(decimal(1.2e-7), "0.00000012");
    }
}
