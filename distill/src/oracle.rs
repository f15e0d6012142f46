// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Deciding implication between conjunctions of predicates.

use solver::SmtBridge;

use crate::hint::QuantifierHeader;
use crate::store::Preds;

/// Decides whether `AND(lhs)` implies `AND(rhs)` for predicates under one
/// quantifier header. Answers must be sound; they may be incomplete.
pub trait Oracle {
    fn implies(&mut self, header: &QuantifierHeader, lhs: &Preds, rhs: &Preds) -> bool;

    fn equivalent(&mut self, header: &QuantifierHeader, a: &Preds, b: &Preds) -> bool {
        self.implies(header, a, b) && self.implies(header, b, a)
    }
}

/// Implication as set containment: every predicate on the right appears on
/// the left.
#[derive(Debug, Clone, Copy, Default)]
pub struct Syntactic;

impl Oracle for Syntactic {
    fn implies(&mut self, _header: &QuantifierHeader, lhs: &Preds, rhs: &Preds) -> bool {
        rhs.is_subset(lhs)
    }
}

impl<'a> Oracle for SmtBridge<'a> {
    fn implies(&mut self, header: &QuantifierHeader, lhs: &Preds, rhs: &Preds) -> bool {
        match SmtBridge::implies(self, &header.to_string(), &lhs.exprs(), &rhs.exprs()) {
            Ok(answer) => answer,
            Err(err) => {
                log::warn!("falling back to syntactic implication: {err}");
                Syntactic.implies(header, lhs, rhs)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use expr::program::Program;
    use solver::BridgeConf;
    use test_log::test;

    use crate::hint::Hint;

    fn program() -> Program {
        Program::from_json(
            r#"{"events": [{"name": "eReq", "payload": {"named": [["x", "int"], ["tags", {"seq": "int"}]]}}]}"#,
        )
        .unwrap()
    }

    fn preds(p: &Program, h: &Hint, ss: &[&str]) -> Preds {
        ss.iter().map(|s| h.parse(p, s).unwrap()).collect()
    }

    #[test]
    fn test_syntactic() {
        let p = program();
        let h = Hint::new("h", vec!["eReq".to_string()], 0, None).unwrap();
        let strong = preds(&p, &h, &["e0.x > 1", "e0.x < 5"]);
        let weak = preds(&p, &h, &["e0.x > 1"]);
        assert!(Syntactic.implies(&h.header(), &strong, &weak));
        assert!(!Syntactic.implies(&h.header(), &weak, &strong));
        // sound but incomplete
        assert!(!Syntactic.implies(&h.header(), &weak, &preds(&p, &h, &["e0.x > 0"])));
    }

    #[test]
    fn test_bridge_falls_back() {
        let p = program();
        let Ok(mut bridge) = BridgeConf::default().launch(&p) else {
            eprintln!("z3 not available, skipping test");
            return;
        };
        let h = Hint::new("h", vec!["eReq".to_string()], 0, None).unwrap();
        let weak = preds(&p, &h, &["e0.x > 1"]);
        assert!(Oracle::implies(&mut bridge, &h.header(), &weak, &preds(&p, &h, &["e0.x > 0"])));
        // `size` cannot be encoded, so only containment counts
        let sized = preds(&p, &h, &["size(e0.tags) > 1", "e0.x > 1"]);
        assert!(Oracle::implies(&mut bridge, &h.header(), &sized, &weak));
        assert!(!Oracle::implies(
            &mut bridge,
            &h.header(),
            &sized,
            &preds(&p, &h, &["size(e0.tags) > 0"])
        ));
        assert!(Oracle::equivalent(
            &mut bridge,
            &h.header(),
            &preds(&p, &h, &["e0.x >= 2"]),
            &weak
        ));
    }
}
