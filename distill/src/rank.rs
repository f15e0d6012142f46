// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Ordering of the surviving records for output.

use std::cmp::Ordering;

use crate::hint::QuantifierHeader;
use crate::store::{DistillerStore, Record};

/// A filter relating more events is more interesting; a filter mined over and
/// over is less so.
fn filter_score(store: &DistillerStore, header: &QuantifierHeader, text: &str, events: usize) -> f64 {
    let frequency = store.frequency(header, text).max(1);
    events as f64 / frequency as f64
}

/// The average score of a record's filters.
pub fn score(store: &DistillerStore, record: &Record) -> f64 {
    if record.filters.is_empty() {
        return 0.0;
    }
    let header = record.hint.header();
    let total: f64 = record
        .filters
        .iter()
        .map(|(text, e)| filter_score(store, &header, text, e.free_events().len()))
        .sum();
    total / record.filters.len() as f64
}

/// All records, best first. Ties are broken by the record's text so the
/// order is deterministic.
pub fn ranked(store: &DistillerStore) -> Vec<&Record> {
    let mut scored: Vec<(f64, String, &Record)> = store
        .records()
        .map(|r| (score(store, r), r.to_string(), r))
        .collect();
    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.1.cmp(&b.1))
    });
    scored.into_iter().map(|(_, _, r)| r).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hint::Hint;
    use crate::oracle::{Oracle, Syntactic};
    use crate::store::Preds;
    use expr::program::Program;

    #[test]
    fn test_ranking() {
        let p = Program::from_json(
            r#"{"events": [
                {"name": "eReq", "payload": {"named": [["id", "int"], ["x", "int"]]}},
                {"name": "eResp", "payload": {"named": [["id", "int"]]}}
            ]}"#,
        )
        .unwrap();
        let h = Hint::new("h", vec!["eReq".to_string(), "eResp".to_string()], 0, None).unwrap();
        let preds = |ss: &[&str]| -> Preds { ss.iter().map(|s| h.parse(&p, s).unwrap()).collect() };

        let mut store = DistillerStore::new();
        let relational = preds(&["e0.id == e1.id"]);
        let local = preds(&["e0.x > 0"]);
        let common = preds(&["e1.id > 0"]);
        let header = h.header();
        store.observe(&mut Syntactic, &header, &relational);
        store.observe(&mut Syntactic, &header, &local);
        for _ in 0..4 {
            store.observe(&mut Syntactic, &header, &common);
        }
        store.push(Record::new(h.clone(), Preds::new(), local.clone()));
        store.push(Record::new(h.clone(), preds(&["e0.x > 1"]), common.clone()));
        store.push(Record::new(h.clone(), Preds::new(), relational.clone()));

        let order: Vec<String> = ranked(&store).iter().map(|r| r.filters.to_string()).collect();
        assert_eq!(order, vec!["e0.id == e1.id", "e0.x > 0", "e1.id > 0"]);
        assert_eq!(score(&store, ranked(&store)[2]), 0.25);
    }

    /// Treats `a > b` and `b < a` as the same predicate.
    struct Flipped;

    impl Oracle for Flipped {
        fn implies(&mut self, _: &QuantifierHeader, lhs: &Preds, rhs: &Preds) -> bool {
            let flip = |t: &str| match t.split_once(" > ") {
                Some((a, b)) => format!("{b} < {a}"),
                None => t.to_string(),
            };
            rhs.texts()
                .all(|t| lhs.texts().any(|l| l == t || flip(l) == t || l == flip(t)))
        }
    }

    #[test]
    fn test_equivalent_filters_share_frequency() {
        let p = Program::from_json(
            r#"{"events": [{"name": "eReq", "payload": {"named": [["id", "int"]]}}]}"#,
        )
        .unwrap();
        let h = Hint::new("h", vec!["eReq".to_string()], 0, None).unwrap();
        let preds = |ss: &[&str]| -> Preds { ss.iter().map(|s| h.parse(&p, s).unwrap()).collect() };

        let mut store = DistillerStore::new();
        let header = h.header();
        store.observe(&mut Flipped, &header, &preds(&["e0.id > 0"]));
        store.observe(&mut Flipped, &header, &preds(&["0 < e0.id"]));
        store.observe(&mut Flipped, &header, &preds(&["e0.id < 5"]));
        assert_eq!(store.frequency(&header, "e0.id > 0"), 2);
        assert_eq!(store.frequency(&header, "0 < e0.id"), 2);
        assert_eq!(store.frequency(&header, "e0.id < 5"), 1);

        let r = Record::new(h.clone(), Preds::new(), preds(&["0 < e0.id"]));
        assert_eq!(score(&store, &r), 0.5);
    }
}
