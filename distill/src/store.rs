// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Candidate records, grouped by quantifier header.

use std::collections::{btree_map, BTreeMap, BTreeSet};
use std::fmt;

use expr::printer::conjunction;
use expr::Expr;

use crate::hint::{Hint, QuantifierHeader};
use crate::oracle::Oracle;

/// A conjunction of predicates, identified by their canonical text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preds(BTreeMap<String, Expr>);

impl Preds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a predicate; false if an identical one was present.
    pub fn insert(&mut self, e: Expr) -> bool {
        self.0.insert(e.to_string(), e).is_none()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, text: &str) -> bool {
        self.0.contains_key(text)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Expr> {
        self.0.iter()
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|s| s.as_str())
    }

    pub fn exprs(&self) -> Vec<&Expr> {
        self.0.values().collect()
    }

    pub fn remove(&mut self, text: &str) -> Option<Expr> {
        self.0.remove(text)
    }

    pub fn is_subset(&self, other: &Preds) -> bool {
        self.0.keys().all(|k| other.0.contains_key(k))
    }

    pub fn intersects(&self, other: &Preds) -> bool {
        self.0.keys().any(|k| other.0.contains_key(k))
    }

    /// Remove every predicate of `other`; true if something was removed.
    pub fn remove_all(&mut self, other: &Preds) -> bool {
        let before = self.0.len();
        self.0.retain(|k, _| !other.0.contains_key(k));
        self.0.len() != before
    }

    pub fn extend(&mut self, other: &Preds) {
        for (k, e) in &other.0 {
            self.0.entry(k.clone()).or_insert_with(|| e.clone());
        }
    }
}

impl FromIterator<Expr> for Preds {
    fn from_iter<I: IntoIterator<Item = Expr>>(iter: I) -> Self {
        let mut preds = Preds::new();
        for e in iter {
            preds.insert(e);
        }
        preds
    }
}

impl fmt::Display for Preds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", conjunction(self.texts()))
    }
}

/// One mined invariant: `guards -> filters` under the hint's quantifiers.
/// Several records of an existential header with the same guards stand for
/// the disjunction of their filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub guards: Preds,
    pub filters: Preds,
    /// The hint that produced the record.
    pub hint: Hint,
}

impl Record {
    pub fn new(hint: Hint, guards: Preds, filters: Preds) -> Self {
        Self {
            guards,
            filters,
            hint,
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self
            .hint
            .invariant_header(&self.guards.to_string(), &self.filters.to_string());
        write!(f, "{s}")
    }
}

/// Filters mined under one header that are equivalent to each other.
#[derive(Debug, Clone)]
struct Observed {
    filter: Preds,
    texts: BTreeSet<String>,
    count: usize,
}

/// All candidate records of a session, bucketed by quantifier header, and the
/// number of times each filter predicate was mined.
#[derive(Debug, Clone, Default)]
pub struct DistillerStore {
    pub(crate) buckets: BTreeMap<QuantifierHeader, Vec<Record>>,
    observed: BTreeMap<QuantifierHeader, Vec<Observed>>,
}

impl DistillerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything, for an independent run.
    pub fn clear(&mut self) {
        self.buckets.clear();
        self.observed.clear();
    }

    pub fn bucket(&self, header: &QuantifierHeader) -> &[Record] {
        self.buckets.get(header).map(|b| b.as_slice()).unwrap_or(&[])
    }

    pub fn headers(&self) -> impl Iterator<Item = &QuantifierHeader> {
        self.buckets.keys()
    }

    /// Every record, bucket by bucket.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.buckets.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(|b| b.len()).sum()
    }

    pub fn push(&mut self, record: Record) {
        self.buckets
            .entry(record.hint.header())
            .or_default()
            .push(record);
    }

    /// Count one more observation of each filter. A filter equivalent to one
    /// mined before under the same header counts towards that one.
    pub fn observe(&mut self, oracle: &mut impl Oracle, header: &QuantifierHeader, filters: &Preds) {
        let classes = self.observed.entry(header.clone()).or_default();
        for (text, e) in filters.iter() {
            let single: Preds = [e.clone()].into_iter().collect();
            let found = classes
                .iter()
                .position(|c| c.texts.contains(text))
                .or_else(|| {
                    classes
                        .iter()
                        .position(|c| oracle.equivalent(header, &c.filter, &single))
                });
            match found {
                Some(i) => {
                    classes[i].texts.insert(text.clone());
                    classes[i].count += 1;
                }
                None => classes.push(Observed {
                    filter: single,
                    texts: BTreeSet::from([text.clone()]),
                    count: 1,
                }),
            }
        }
    }

    /// How often a filter, or one equivalent to it, was mined under
    /// `header`, across all runs.
    pub fn frequency(&self, header: &QuantifierHeader, text: &str) -> usize {
        self.observed
            .get(header)
            .and_then(|classes| classes.iter().find(|c| c.texts.contains(text)))
            .map_or(0, |c| c.count)
    }
}
