// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Enumerates the terms and predicates handed to the miner for a hint.
//!
//! Depth-0 terms are the scalar leaves of every quantified event's payload,
//! `index(e)` for every quantified event, and the configuration fields. Terms
//! of depth `d` combine two numeric terms of the same type, one of them of
//! depth `d - 1`, with an arithmetic operator. Predicates compare two terms of
//! the same type, compare enum-typed terms against each element, apply the
//! program's boolean predicates, and include boolean terms as they are.

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use expr::program::Program;
use expr::syntax::{BinOp, Expr, INDEX_FN};
use expr::types::Type;
use solver::hashmap::HashMap;

use crate::error::DistillError;
use crate::hint::Hint;

/// A term or predicate as the miner sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definition {
    pub id: usize,
    /// Canonical text
    pub repr: String,
    #[serde(rename = "type")]
    pub ty: String,
    /// Argument slots of the quantified events it mentions.
    pub events: Vec<usize>,
}

/// Everything generated for one hint at one term depth.
#[derive(Debug, Clone)]
pub struct Definitions {
    pub hint: Hint,
    pub depth: usize,
    pub terms: Vec<Expr>,
    pub predicates: Vec<Expr>,
    ids: HashMap<String, usize>,
}

fn is_index(e: &Expr) -> bool {
    matches!(e, Expr::Call { func, .. } if func == INDEX_FN)
}

/// Scalar leaves reachable from `base` of type `ty`.
fn leaves(base: Expr, ty: &Type, out: &mut Vec<Expr>) {
    match ty {
        Type::Named(fields) => {
            for (name, fty) in fields {
                leaves(Expr::field(base.clone(), name, fty.clone()), fty, out);
            }
        }
        Type::Tuple(tys) => {
            for (index, t) in tys.iter().enumerate() {
                let e = Expr::TupleIndex {
                    base: Box::new(base.clone()),
                    index,
                    ty: t.clone(),
                };
                leaves(e, t, out);
            }
        }
        t if t.is_scalar() => out.push(base),
        _ => {}
    }
}

fn event_leaves(name: &str, event: &str, payload: &Type) -> Vec<Expr> {
    let mut out = vec![];
    let ev = Expr::event(name, event);
    match payload {
        Type::Named(_) => leaves(ev, payload, &mut out),
        Type::Null => {}
        // scalar or tuple payloads are reached through `payload`
        _ => leaves(Expr::field(ev, "payload", payload.clone()), payload, &mut out),
    }
    out
}

fn event_slots(hint: &Hint, e: &Expr) -> Vec<usize> {
    let vars = hint.vars();
    e.free_events()
        .iter()
        .filter_map(|name| vars.iter().find(|v| &v.name == name).map(|v| v.order))
        .collect()
}

/// Generate terms and predicates for `hint` at term depth `depth`.
pub fn generate(program: &Program, hint: &Hint, depth: usize) -> Definitions {
    let mut levels: Vec<Vec<Expr>> = vec![];
    let mut level0 = vec![];
    for v in hint.vars() {
        if let Some(decl) = program.event(&v.event) {
            level0.extend(event_leaves(&v.name, &v.event, &decl.payload));
        }
        level0.push(Expr::index_of(&v.name, &v.event));
    }
    for (name, ty) in hint.config_fields(program) {
        if ty.is_scalar() {
            level0.push(Expr::Var { name, ty });
        }
    }
    levels.push(level0.into_iter().unique().collect());

    for d in 1..=depth {
        let below: Vec<&Expr> = levels.iter().flatten().collect();
        let previous = &levels[d - 1];
        let mut level = vec![];
        for a in previous {
            for b in &below {
                if a == *b
                    || is_index(a)
                    || is_index(b)
                    || a.ty() != b.ty()
                    || !a.ty().is_numeric()
                {
                    continue;
                }
                for op in [BinOp::Add, BinOp::Sub, BinOp::Mul, BinOp::Div, BinOp::Mod] {
                    if op == BinOp::Mod && a.ty() != Type::Int {
                        continue;
                    }
                    level.push(Expr::binary(op, a.clone(), (*b).clone()));
                    level.push(Expr::binary(op, (*b).clone(), a.clone()));
                }
            }
        }
        // commutative operators produce both orders; keep the first
        let mut seen = std::collections::BTreeSet::new();
        let level = level
            .into_iter()
            .filter(|e| match e {
                Expr::Binary(op, x, y) if op.is_commutative() => {
                    let key = if x <= y {
                        (*op, x.clone(), y.clone())
                    } else {
                        (*op, y.clone(), x.clone())
                    };
                    seen.insert(key)
                }
                _ => true,
            })
            .unique()
            .collect();
        levels.push(level);
    }
    let terms: Vec<Expr> = levels.into_iter().flatten().unique().collect();

    let mut predicates = vec![];
    for (i, a) in terms.iter().enumerate() {
        if a.ty() == Type::Bool {
            predicates.push(a.clone());
        }
        if let Type::Enum(name) = a.ty() {
            if let Some(decl) = program.enum_decl(&name) {
                for elem in &decl.elements {
                    let el = Expr::EnumElem {
                        enum_name: name.clone(),
                        elem: elem.clone(),
                    };
                    predicates.push(Expr::binary(BinOp::Eq, a.clone(), el));
                }
            }
        }
        for b in &terms[i + 1..] {
            // arrival indices are only compared with each other
            if a.ty() != b.ty() || is_index(a) != is_index(b) {
                continue;
            }
            predicates.push(Expr::binary(BinOp::Eq, a.clone(), b.clone()));
            if a.ty().is_numeric() {
                predicates.push(Expr::binary(BinOp::Lt, a.clone(), b.clone()));
                predicates.push(Expr::binary(BinOp::Lt, b.clone(), a.clone()));
            }
        }
    }
    for f in program.functions.iter().filter(|f| f.is_predicate()) {
        let candidates: Vec<Vec<&Expr>> = f
            .params
            .iter()
            .map(|t| {
                terms
                    .iter()
                    .filter(|e| &e.ty() == t && !is_index(e))
                    .collect()
            })
            .collect();
        if f.params.is_empty() || candidates.iter().any(|c| c.is_empty()) {
            continue;
        }
        for args in candidates.into_iter().multi_cartesian_product() {
            predicates.push(Expr::Call {
                func: f.name.clone(),
                args: args.into_iter().cloned().collect(),
                ty: Type::Bool,
            });
        }
    }
    // a predicate over configuration fields alone says nothing about events
    let predicates: Vec<Expr> = predicates
        .into_iter()
        .filter(|p| !p.free_events().is_empty())
        .unique()
        .collect();

    let ids = predicates
        .iter()
        .enumerate()
        .map(|(i, p)| (p.to_string(), i))
        .collect();
    Definitions {
        hint: hint.clone(),
        depth,
        terms,
        predicates,
        ids,
    }
}

impl Definitions {
    /// Largest number of quantified events a single predicate mentions.
    pub fn max_arity(&self) -> usize {
        self.predicates
            .iter()
            .map(|p| p.free_events().len())
            .max()
            .unwrap_or(0)
    }

    pub fn predicate_defs(&self) -> Vec<Definition> {
        self.predicates
            .iter()
            .enumerate()
            .map(|(id, p)| Definition {
                id,
                repr: p.to_string(),
                ty: p.ty().to_string(),
                events: event_slots(&self.hint, p),
            })
            .collect()
    }

    pub fn term_defs(&self) -> Vec<Definition> {
        self.terms
            .iter()
            .enumerate()
            .map(|(id, t)| Definition {
                id,
                repr: t.to_string(),
                ty: t.ty().to_string(),
                events: event_slots(&self.hint, t),
            })
            .collect()
    }

    /// The id of a predicate given as text, after canonicalization.
    pub fn predicate_id(&self, program: &Program, text: &str) -> Result<usize, DistillError> {
        let invalid = |msg: String| DistillError::InvalidHint {
            hint: self.hint.name.clone(),
            msg,
        };
        let e = self
            .hint
            .parse(program, text)
            .map_err(|err| invalid(format!("predicate `{text}`: {err}")))?;
        self.ids
            .get(&e.to_string())
            .copied()
            .ok_or_else(|| invalid(format!("predicate `{e}` is not generated at depth {}", self.depth)))
    }

    /// Write the predicate and term definition files.
    pub fn write(&self, predicates: &Path, terms: &Path) -> Result<(), DistillError> {
        for path in [predicates, terms] {
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir).map_err(DistillError::io(dir))?;
            }
        }
        let json = serde_json::to_string_pretty(&self.predicate_defs())?;
        fs::write(predicates, json).map_err(DistillError::io(predicates))?;
        let json = serde_json::to_string_pretty(&self.term_defs())?;
        fs::write(terms, json).map_err(DistillError::io(terms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program() -> Program {
        Program::from_json(
            r#"{
            "enums": [{"name": "Status", "elements": ["OK", "ERR"]}],
            "events": [
                {"name": "eReq", "payload": {"named": [["id", "int"], ["tags", {"seq": "int"}]]}},
                {"name": "eResp", "payload": {"named": [["id", "int"], ["status", {"enum": "Status"}]]}},
                {"name": "eTick", "payload": "int"},
                {"name": "eConfig", "payload": {"named": [["limit", "int"]]}}
            ],
            "functions": [{"name": "valid", "params": ["int"], "ret": "bool"}]
        }"#,
        )
        .unwrap()
    }

    fn texts(es: &[Expr]) -> Vec<String> {
        es.iter().map(|e| e.to_string()).collect()
    }

    #[test]
    fn test_depth_zero() {
        let p = program();
        let h = Hint::new("h", vec!["eReq".to_string(), "eResp".to_string()], 0, None).unwrap();
        let defs = generate(&p, &h, 0);
        assert_eq!(
            texts(&defs.terms),
            vec!["e0.id", "index(e0)", "e1.id", "e1.status", "index(e1)"]
        );
        insta::assert_snapshot!(texts(&defs.predicates).join("\n"), @r###"
        e0.id == e1.id
        e0.id < e1.id
        e1.id < e0.id
        index(e0) == index(e1)
        index(e0) < index(e1)
        index(e1) < index(e0)
        e1.status == OK
        e1.status == ERR
        valid(e0.id)
        valid(e1.id)
        "###);
        assert_eq!(defs.max_arity(), 2);
        assert_eq!(defs.predicate_id(&p, "e1.status == ERR").unwrap(), 7);
        assert_eq!(defs.predicate_id(&p, "(e1.status == ERR)").unwrap(), 7);
        assert!(defs.predicate_id(&p, "e1.id == 3").is_err());
    }

    #[test]
    fn test_deeper_terms() {
        let p = program();
        let mut h = Hint::new("h", vec!["eTick".to_string()], 0, Some("eConfig".to_string())).unwrap();
        h.term_depth = Some(1);
        let defs = generate(&p, &h, 1);
        let terms = texts(&defs.terms);
        assert_eq!(&terms[..3], &["e0.payload", "index(e0)", "limit"]);
        assert!(terms.contains(&"e0.payload + limit".to_string()));
        assert!(!terms.contains(&"limit + e0.payload".to_string()));
        assert!(terms.contains(&"limit - e0.payload".to_string()));
        assert!(terms.contains(&"e0.payload % limit".to_string()));
        assert!(!terms.iter().any(|t| t.contains("index(e0) +")));
        // predicates over `limit` alone are dropped
        assert!(defs.predicates.iter().all(|p| !p.free_events().is_empty()));
        assert!(texts(&defs.predicates).contains(&"e0.payload < limit".to_string()));
        assert_eq!(defs.max_arity(), 1);
    }

    #[test]
    fn test_write() {
        let p = program();
        let h = Hint::new("h", vec!["eReq".to_string(), "eResp".to_string()], 0, None).unwrap();
        let defs = generate(&p, &h, 0);
        let dir = tempfile::tempdir().unwrap();
        let preds = dir.path().join("out/proj.predicates.json");
        let terms = dir.path().join("out/proj.terms.json");
        defs.write(&preds, &terms).unwrap();
        let read: Vec<Definition> =
            serde_json::from_str(&fs::read_to_string(&preds).unwrap()).unwrap();
        assert_eq!(read.len(), defs.predicates.len());
        assert_eq!(read[0].repr, "e0.id == e1.id");
        assert_eq!(read[0].events, vec![0, 1]);
        assert_eq!(read[0].ty, "bool");
        let read: Vec<Definition> =
            serde_json::from_str(&fs::read_to_string(&terms).unwrap()).unwrap();
        assert_eq!(read[3].repr, "e1.status");
        assert_eq!(read[3].ty, "Status");
    }
}
