// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Implication queries against one long-lived solver process.

use std::collections::BTreeSet;

use expr::program::Program;
use expr::Expr;
use smtlib::proc::{SatResp, SmtProc, SolverError};

use crate::conf::BridgeConf;
use crate::hashmap::HashMap;
use crate::sexp::{negated_implication, session_declarations, BridgeError, Context};

type CacheKey = (String, BTreeSet<String>, BTreeSet<String>);

/// Decides `AND(lhs) => AND(rhs)` for sets of expressions grouped under a
/// context key (the quantifier header).
///
/// Every query runs inside its own push/pop scope, so the solver never carries
/// assertions from one query to the next. Answers are cached by the canonical
/// text of both sides, as sets; they stay valid across solver resets.
pub struct SmtBridge<'a> {
    program: &'a Program,
    conf: BridgeConf,
    proc: SmtProc,
    contexts: HashMap<String, Context>,
    cache: HashMap<CacheKey, bool>,
    since_reset: usize,
    queries: usize,
}

impl<'a> SmtBridge<'a> {
    /// Launch the solver and declare the program's sorts.
    pub fn new(program: &'a Program, conf: BridgeConf) -> Result<Self, BridgeError> {
        let proc = SmtProc::new(conf.solver.clone(), conf.tee.as_deref())?;
        let mut bridge = Self {
            program,
            conf,
            proc,
            contexts: HashMap::default(),
            cache: HashMap::default(),
            since_reset: 0,
            queries: 0,
        };
        bridge.declare_session()?;
        Ok(bridge)
    }

    fn declare_session(&mut self) -> Result<(), BridgeError> {
        for decl in session_declarations(self.program) {
            self.proc.send(&decl)?;
        }
        Ok(())
    }

    /// Clear the solver's assertion stack and redeclare the session sorts.
    pub fn reset(&mut self) -> Result<(), BridgeError> {
        log::info!("resetting solver after {} queries", self.since_reset);
        self.proc.reset()?;
        self.declare_session()?;
        self.since_reset = 0;
        Ok(())
    }

    /// Number of queries that reached the solver so far.
    pub fn queries(&self) -> usize {
        self.queries
    }

    /// Whether `AND(lhs)` implies `AND(rhs)` under context `key`.
    pub fn implies(&mut self, key: &str, lhs: &[&Expr], rhs: &[&Expr]) -> Result<bool, BridgeError> {
        let lhs_text: BTreeSet<String> = lhs.iter().map(|e| e.to_string()).collect();
        let rhs_text: BTreeSet<String> = rhs.iter().map(|e| e.to_string()).collect();
        if rhs_text.is_subset(&lhs_text) {
            return Ok(true);
        }
        let cache_key = (key.to_string(), lhs_text, rhs_text);
        if let Some(&answer) = self.cache.get(&cache_key) {
            return Ok(answer);
        }

        let ctx = self.contexts.entry(key.to_string()).or_default();
        let mut symbols = BTreeSet::new();
        let mut encode = |es: &[&Expr]| {
            es.iter()
                .map(|e| {
                    let enc = ctx.encode(self.program, e)?;
                    symbols.extend(enc.symbols);
                    Ok(enc.term)
                })
                .collect::<Result<Vec<_>, BridgeError>>()
        };
        let lhs = encode(lhs)?;
        let rhs = encode(rhs)?;
        let mut decls = Vec::with_capacity(symbols.len());
        for s in &symbols {
            if let Some(d) = ctx.declaration(s) {
                decls.push(d.clone());
            }
        }

        if self.since_reset >= self.conf.reset_interval {
            self.reset()?;
        }
        self.since_reset += 1;
        self.queries += 1;

        self.proc.comment_with(|| {
            let (header, lhs, rhs) = &cache_key;
            format!("[{header}] {lhs:?} implies {rhs:?}")
        });
        self.proc.push()?;
        let resp = (|| -> Result<SatResp, SolverError> {
            for d in &decls {
                self.proc.send(d)?;
            }
            self.proc.send(&negated_implication(lhs, rhs))?;
            self.proc.check_sat()
        })();
        // pop even when the query failed, so nothing leaks into later queries
        let popped = self.proc.pop();
        let answer = match resp? {
            SatResp::Unsat => true,
            SatResp::Sat => false,
            SatResp::Unknown(reason) => {
                popped?;
                return Err(BridgeError::Unknown(reason));
            }
        };
        popped?;
        self.cache.insert(cache_key, answer);
        Ok(answer)
    }

    /// Whether the two sets imply each other.
    pub fn equivalent(&mut self, key: &str, a: &[&Expr], b: &[&Expr]) -> Result<bool, BridgeError> {
        Ok(self.implies(key, a, b)? && self.implies(key, b, a)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conf::BridgeConf;
    use expr::{parse, Scope};
    use test_log::test;

    fn program() -> Program {
        Program::from_json(
            r#"{
            "enums": [{"name": "Status", "elements": ["OK", "ERR"]}],
            "events": [
                {"name": "eReq", "payload": {"named": [["id", "int"], ["amount", "float"], ["tags", {"seq": "int"}]]}},
                {"name": "eResp", "payload": {"named": [["id", "int"], ["status", {"enum": "Status"}]]}}
            ]
        }"#,
        )
        .unwrap()
    }

    fn launch(program: &Program, reset_interval: usize) -> Option<SmtBridge<'_>> {
        let mut conf = BridgeConf::default();
        conf.reset_interval = reset_interval;
        match conf.launch(program) {
            Ok(bridge) => Some(bridge),
            Err(err) => {
                eprintln!("could not launch z3 ({err}), skipping test");
                None
            }
        }
    }

    fn exprs(p: &Program, ss: &[&str]) -> Vec<Expr> {
        let scope = Scope::new(p)
            .with_event("e0", "eReq")
            .with_event("e1", "eResp");
        ss.iter().map(|s| parse(s, &scope).unwrap()).collect()
    }

    fn implies(bridge: &mut SmtBridge, lhs: &[Expr], rhs: &[Expr]) -> bool {
        let lhs: Vec<&Expr> = lhs.iter().collect();
        let rhs: Vec<&Expr> = rhs.iter().collect();
        bridge.implies("eReq eResp", &lhs, &rhs).unwrap()
    }

    #[test]
    fn test_implies() {
        let p = program();
        let Some(mut bridge) = launch(&p, 1000) else { return };
        let strong = exprs(&p, &["e0.id > 3", "e1.id == e0.id"]);
        let weak = exprs(&p, &["e1.id > 0"]);
        assert!(implies(&mut bridge, &strong, &weak));
        assert!(!implies(&mut bridge, &weak, &strong));
        let status = exprs(&p, &["e1.status != OK"]);
        let err = exprs(&p, &["e1.status == ERR"]);
        assert!(implies(&mut bridge, &status, &err));
        // empty conjunctions are true
        assert!(implies(&mut bridge, &weak, &[]));
        assert!(!implies(&mut bridge, &[], &weak));
    }

    #[test]
    fn test_float_literals() {
        let p = program();
        let Some(mut bridge) = launch(&p, 1000) else { return };
        let half = exprs(&p, &["e0.amount / 2.0 > 0.5"]);
        let one = exprs(&p, &["e0.amount > 1.0"]);
        assert!(implies(&mut bridge, &half, &one));
        let huge = exprs(&p, &["e0.amount > 12345678901234567890.0"]);
        assert!(implies(&mut bridge, &huge, &one));
        assert!(!implies(&mut bridge, &one, &huge));
        // decided by the solver, not the syntactic fallback
        assert_eq!(bridge.queries(), 3);
    }

    #[test]
    fn test_cache_and_reset() {
        let p = program();
        let Some(mut bridge) = launch(&p, 2) else { return };
        let a = exprs(&p, &["e0.id > 3", "e0.id < 10"]);
        let b = exprs(&p, &["e0.id >= 4"]);
        let c = exprs(&p, &["e1.status == OK"]);
        assert!(implies(&mut bridge, &a, &b));
        // same sets in another order hit the cache
        let a_rev: Vec<Expr> = a.iter().rev().cloned().collect();
        assert!(implies(&mut bridge, &a_rev, &b));
        assert_eq!(bridge.queries(), 1);
        // syntactic subsets never reach the solver
        assert!(implies(&mut bridge, &a, &a[..1]));
        assert_eq!(bridge.queries(), 1);
        assert!(!implies(&mut bridge, &b, &c));
        // the third query runs after a reset, which must redeclare the enum
        assert!(!implies(&mut bridge, &c, &b));
        assert!(implies(&mut bridge, &c, &exprs(&p, &["e1.status != ERR"])));
        assert_eq!(bridge.queries(), 4);
    }

    #[test]
    fn test_unsupported_is_an_error() {
        let p = program();
        let Some(mut bridge) = launch(&p, 1000) else { return };
        let sized = exprs(&p, &["size(e0.tags) > 0"]);
        let lhs: Vec<&Expr> = sized.iter().collect();
        let rhs = exprs(&p, &["e0.id > 0"]);
        let rhs: Vec<&Expr> = rhs.iter().collect();
        assert!(matches!(
            bridge.implies("eReq eResp", &lhs, &rhs),
            Err(BridgeError::UnsupportedExpr(_))
        ));
        // the solver is still usable afterwards
        assert!(implies(&mut bridge, &exprs(&p, &["e0.id > 1"]), &exprs(&p, &["e0.id > 0"])));
    }
}
