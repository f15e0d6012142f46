// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The fixpoint that reduces mined candidates to a non-redundant set.
//!
//! Records are compared pairwise within a bucket. With guards `G` and filters
//! `F`, record `i` is subsumed by `j` when `G_i => G_j` and `F_j => F_i`. Under
//! a forall-only header, records with equivalent guards are merged into one
//! whose filters are the union. When one guard set is strictly stronger and
//! the filters overlap, the shared filters are dropped from the stronger
//! guarded record for forall-only headers and from the weaker guarded one for
//! headers with existentials. Records deriving equivalent filters under guard
//! sets that differ only by a complementary pair are resolved into one guard
//! set. A filter set already derived under fewer existentials over the same
//! events is removed from buckets with more existentials.

use expr::program::Program;

use crate::error::DistillError;
use crate::hint::{Hint, QuantifierHeader};
use crate::oracle::Oracle;
use crate::store::{DistillerStore, Preds, Record};

/// What happened to a candidate handed to [`DistillerStore::update_mined_specs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing of the candidate survived the existing records.
    Subsumed,
    /// An existing record implies the candidate.
    Dropped,
    /// The candidate's filters were merged into a record with the same guards.
    Merged,
    /// The candidate implies existing records and took their place.
    Replaced,
    /// The candidate was added as a new record.
    Added,
}

/// Remove a complementary pair `p` in `a` and `!p` in `b` if what remains of
/// the two sets is equal; both sets are then replaced by the remainder.
pub fn resolve(a: &mut Preds, b: &mut Preds) -> bool {
    for (ta, ea) in a.iter() {
        for (tb, eb) in b.iter() {
            if !ea.is_complement_of(eb) {
                continue;
            }
            let mut ra = a.clone();
            ra.remove(ta);
            let mut rb = b.clone();
            rb.remove(tb);
            if ra == rb {
                *a = ra;
                *b = rb;
                return true;
            }
        }
    }
    false
}

/// Drop the filters shared by two records whose guards are strictly ordered.
fn subtract_overlap(forall_only: bool, stronger: &mut Preds, weaker: &mut Preds) -> bool {
    if forall_only {
        stronger.remove_all(weaker)
    } else {
        weaker.remove_all(stronger)
    }
}

fn reduce_bucket(oracle: &mut impl Oracle, header: &QuantifierHeader, bucket: &mut Vec<Record>) -> bool {
    let forall_only = header.existentials == 0;
    let before = bucket.len();
    bucket.retain(|r| !r.filters.is_empty());
    bucket.retain(|r| {
        let tautology = oracle.implies(header, &r.guards, &r.filters);
        if tautology {
            log::debug!("[Tautology] {r}");
        }
        !tautology
    });
    let mut changed = bucket.len() != before;

    let mut removed = vec![false; bucket.len()];
    for i in 0..bucket.len() {
        for j in (i + 1)..bucket.len() {
            if removed[i] {
                break;
            }
            if removed[j] {
                continue;
            }
            let (left, right) = bucket.split_at_mut(j);
            let (ri, rj) = (&mut left[i], &mut right[0]);
            let i_to_j = oracle.implies(header, &ri.guards, &rj.guards);
            let j_to_i = oracle.implies(header, &rj.guards, &ri.guards);
            if forall_only && i_to_j && j_to_i {
                log::debug!("[Merged] {rj} into {ri}");
                ri.filters.extend(&rj.filters);
                removed[j] = true;
                changed = true;
            } else if i_to_j && oracle.implies(header, &rj.filters, &ri.filters) {
                log::debug!("[Subsumed] {ri} by {rj}");
                removed[i] = true;
                changed = true;
            } else if j_to_i && oracle.implies(header, &ri.filters, &rj.filters) {
                log::debug!("[Subsumed] {rj} by {ri}");
                removed[j] = true;
                changed = true;
            } else if i_to_j && !j_to_i {
                changed |= subtract_overlap(forall_only, &mut ri.filters, &mut rj.filters);
            } else if j_to_i && !i_to_j {
                changed |= subtract_overlap(forall_only, &mut rj.filters, &mut ri.filters);
            }
        }
    }
    let mut removed = removed.into_iter();
    bucket.retain(|_| !removed.next().unwrap_or(false));
    changed
}

fn resolve_bucket(oracle: &mut impl Oracle, header: &QuantifierHeader, bucket: &mut [Record]) -> bool {
    let mut changed = false;
    for j in 1..bucket.len() {
        let (left, right) = bucket.split_at_mut(j);
        let rj = &mut right[0];
        for ri in left.iter_mut() {
            if oracle.equivalent(header, &ri.filters, &rj.filters)
                && resolve(&mut ri.guards, &mut rj.guards)
            {
                log::debug!("[Resolved] {ri} with {rj}");
                changed = true;
            }
        }
    }
    changed
}

impl DistillerStore {
    /// Remove records whose filters were already derived with fewer
    /// existentials over the same events.
    pub fn clear_up_existentials(&mut self) -> bool {
        let existential: Vec<QuantifierHeader> = self
            .buckets
            .keys()
            .filter(|k| k.existentials > 0)
            .cloned()
            .collect();
        let mut changed = false;
        for header in existential {
            let lower: Vec<Preds> = self
                .buckets
                .iter()
                .filter(|(k, _)| k.same_events(&header) && k.existentials < header.existentials)
                .flat_map(|(_, b)| b.iter().map(|r| r.filters.clone()))
                .collect();
            if lower.is_empty() {
                continue;
            }
            if let Some(bucket) = self.buckets.get_mut(&header) {
                let before = bucket.len();
                bucket.retain(|r| {
                    let absorbed = lower.contains(&r.filters);
                    if absorbed {
                        log::debug!("[Absorbed] {r}");
                    }
                    !absorbed
                });
                changed |= bucket.len() != before;
            }
        }
        changed
    }

    /// Simplify every bucket until nothing changes. Returns whether anything
    /// changed.
    pub fn do_chores(&mut self, oracle: &mut impl Oracle) -> bool {
        let mut changed_any = false;
        loop {
            let mut changed = false;
            for (header, bucket) in self.buckets.iter_mut() {
                changed |= reduce_bucket(oracle, header, bucket);
                changed |= resolve_bucket(oracle, header, bucket);
            }
            changed |= self.clear_up_existentials();
            self.buckets.retain(|_, b| !b.is_empty());
            if !changed {
                return changed_any;
            }
            changed_any = true;
        }
    }

    /// Merge one mined candidate into the store and simplify.
    pub fn update_mined_specs(
        &mut self,
        oracle: &mut impl Oracle,
        hint: &Hint,
        guards: Preds,
        filters: Preds,
    ) -> Outcome {
        self.do_chores(oracle);
        let outcome = self.merge_candidate(oracle, hint, guards, filters);
        self.do_chores(oracle);
        outcome
    }

    fn merge_candidate(
        &mut self,
        oracle: &mut impl Oracle,
        hint: &Hint,
        mut guards: Preds,
        mut filters: Preds,
    ) -> Outcome {
        let header = hint.header();
        let forall_only = header.existentials == 0;
        let shown = hint.invariant_header(&guards.to_string(), &filters.to_string());
        let bucket = self.buckets.entry(header.clone()).or_default();

        for r in bucket.iter_mut() {
            if oracle.equivalent(&header, &r.filters, &filters) {
                resolve(&mut r.guards, &mut guards);
            }
        }

        for r in bucket.iter() {
            if oracle.implies(&header, &guards, &r.guards)
                && oracle.implies(&header, &r.filters, &filters)
            {
                log::info!("[Drop][Subsumed] {shown} by {r}");
                return Outcome::Dropped;
            }
        }

        let mut replaced = vec![];
        for (i, r) in bucket.iter().enumerate() {
            if oracle.implies(&header, &r.guards, &guards)
                && oracle.implies(&header, &filters, &r.filters)
            {
                log::info!("[Replaced] {shown} subsumes {r}");
                replaced.push(i);
            }
        }
        if !replaced.is_empty() {
            for i in replaced.into_iter().rev() {
                bucket.remove(i);
            }
            bucket.push(Record::new(hint.clone(), guards, filters));
            return Outcome::Replaced;
        }

        if forall_only {
            for r in bucket.iter_mut() {
                if oracle.equivalent(&header, &r.guards, &guards) {
                    r.filters.extend(&filters);
                    log::info!("[Drop][Merged] {shown} into {r}");
                    return Outcome::Merged;
                }
            }
        }

        for r in bucket.iter_mut() {
            let new_stronger = oracle.implies(&header, &guards, &r.guards);
            let old_stronger = oracle.implies(&header, &r.guards, &guards);
            if new_stronger && !old_stronger {
                subtract_overlap(forall_only, &mut filters, &mut r.filters);
            } else if old_stronger && !new_stronger {
                subtract_overlap(forall_only, &mut r.filters, &mut filters);
            }
        }
        if filters.is_empty() {
            log::info!("[Subsumed] {shown}");
            return Outcome::Subsumed;
        }

        bucket.push(Record::new(hint.clone(), guards, filters));
        Outcome::Added
    }

    /// Parse and merge one candidate of a miner run. A guard that does not
    /// parse is fatal, since guards come from our own generator; a filter
    /// that does not parse is dropped.
    pub fn ingest(
        &mut self,
        oracle: &mut impl Oracle,
        program: &Program,
        hint: &Hint,
        guards: &[String],
        filters: &[String],
    ) -> Result<Outcome, DistillError> {
        let mut parsed_guards = Preds::new();
        for text in guards {
            let e = hint
                .parse(program, text)
                .map_err(|err| DistillError::GuardParse {
                    text: text.clone(),
                    err,
                })?;
            parsed_guards.insert(e);
        }
        let mut parsed_filters = Preds::new();
        for text in filters {
            match hint.parse(program, text) {
                Ok(e) => {
                    parsed_filters.insert(e);
                }
                Err(err) => log::warn!("dropping filter `{text}`: {err}"),
            }
        }
        self.observe(oracle, &hint.header(), &parsed_filters);
        Ok(self.update_mined_specs(oracle, hint, parsed_guards, parsed_filters))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::Syntactic;
    use solver::BridgeConf;
    use test_log::test;

    fn program() -> Program {
        Program::from_json(
            r#"{
            "events": [
                {"name": "eReq", "payload": {"named": [["a", "int"], ["b", "int"], ["c", "int"], ["w", "int"], ["x", "int"], ["y", "int"], ["z", "int"]]}},
                {"name": "eResp", "payload": {"named": [["id", "int"]]}}
            ]
        }"#,
        )
        .unwrap()
    }

    fn hint(existentials: usize) -> Hint {
        Hint::new(
            "h",
            vec!["eReq".to_string(), "eResp".to_string()],
            existentials,
            None,
        )
        .unwrap()
    }

    fn preds(p: &Program, h: &Hint, ss: &[&str]) -> Preds {
        ss.iter().map(|s| h.parse(p, s).unwrap()).collect()
    }

    fn record(p: &Program, h: &Hint, guards: &[&str], filters: &[&str]) -> Record {
        Record::new(h.clone(), preds(p, h, guards), preds(p, h, filters))
    }

    /// The store as text, one record per line.
    fn show(store: &DistillerStore) -> String {
        store
            .records()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_resolution() {
        let p = program();
        let h = hint(0);
        let mut store = DistillerStore::new();
        store.push(record(&p, &h, &["e0.a > 0", "e0.b > 0"], &["e0.c > 0"]));
        store.push(record(&p, &h, &["e0.a <= 0", "e0.b > 0"], &["e0.c > 0"]));
        assert!(store.do_chores(&mut Syntactic));
        insta::assert_snapshot!(show(&store), @"∀e0: eReq ∀e1: eResp :: e0.b > 0 -> e0.c > 0");
    }

    #[test]
    fn test_resolution_keeps_distinguishing_guards() {
        let p = program();
        let h = hint(0);
        let mut store = DistillerStore::new();
        store.push(record(&p, &h, &["e0.a > 0", "e0.b > 0"], &["e0.c > 0"]));
        store.push(record(&p, &h, &["e0.a <= 0", "e0.w > 0"], &["e0.c > 0"]));
        assert!(!store.do_chores(&mut Syntactic));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_weak_guard_preference() {
        let p = program();
        let h = hint(0);
        let mut store = DistillerStore::new();
        store.push(record(&p, &h, &["e0.x > 0", "e0.x < 10"], &["e0.y > 0"]));
        store.push(record(&p, &h, &["e0.x > 0"], &["e0.y > 0"]));
        store.do_chores(&mut Syntactic);
        insta::assert_snapshot!(show(&store), @"∀e0: eReq ∀e1: eResp :: e0.x > 0 -> e0.y > 0");
    }

    #[test]
    fn test_subsumption_is_uniform() {
        let p = program();
        let h = hint(1);
        let mut store = DistillerStore::new();
        store.push(record(&p, &h, &["e0.x > 0", "e0.w > 0"], &["e0.y > e1.id"]));
        store.push(record(&p, &h, &["e0.x > 0"], &["e0.y > e1.id", "e0.z > e1.id"]));
        store.do_chores(&mut Syntactic);
        insta::assert_snapshot!(show(&store), @"∀e0: eReq ∃e1: eResp :: e0.x > 0 -> e0.y > e1.id ∧ e0.z > e1.id");
    }

    #[test]
    fn test_merge_forall_only() {
        let p = program();
        let h = hint(0);
        let mut store = DistillerStore::new();
        store.push(record(&p, &h, &["e0.x > 0"], &["e0.y > 0"]));
        store.push(record(&p, &h, &["e0.x > 0"], &["e0.z > 0"]));
        store.do_chores(&mut Syntactic);
        insta::assert_snapshot!(show(&store), @"∀e0: eReq ∀e1: eResp :: e0.x > 0 -> e0.y > 0 ∧ e0.z > 0");

        // under existentials the two records are a disjunction
        let h = hint(1);
        let mut store = DistillerStore::new();
        store.push(record(&p, &h, &["e0.x > 0"], &["e0.y == e1.id"]));
        store.push(record(&p, &h, &["e0.x > 0"], &["e0.z == e1.id"]));
        assert!(!store.do_chores(&mut Syntactic));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_overlap_subtraction() {
        let p = program();
        let h = hint(0);
        let mut store = DistillerStore::new();
        store.push(record(&p, &h, &["e0.x > 0"], &["e0.y > 0"]));
        store.push(record(&p, &h, &["e0.x > 0", "e0.w > 0"], &["e0.y > 0", "e0.z > 0"]));
        store.do_chores(&mut Syntactic);
        insta::assert_snapshot!(show(&store), @r###"
        ∀e0: eReq ∀e1: eResp :: e0.x > 0 -> e0.y > 0
        ∀e0: eReq ∀e1: eResp :: e0.w > 0 ∧ e0.x > 0 -> e0.z > 0
        "###);

        // with existentials the weaker guard gives up the shared filter
        let h = hint(1);
        let mut store = DistillerStore::new();
        store.push(record(&p, &h, &["e0.x > 0"], &["e0.y > e1.id", "e0.a > e1.id"]));
        store.push(record(&p, &h, &["e0.x > 0", "e0.w > 0"], &["e0.y > e1.id", "e0.z > e1.id"]));
        store.do_chores(&mut Syntactic);
        insta::assert_snapshot!(show(&store), @r###"
        ∀e0: eReq ∃e1: eResp :: e0.x > 0 -> e0.a > e1.id
        ∀e0: eReq ∃e1: eResp :: e0.w > 0 ∧ e0.x > 0 -> e0.y > e1.id ∧ e0.z > e1.id
        "###);
    }

    #[test]
    fn test_tautology_and_empty() {
        let p = program();
        let h = hint(0);
        let mut store = DistillerStore::new();
        store.push(record(&p, &h, &["e0.x > 0", "e0.y > 0"], &["e0.y > 0"]));
        store.push(record(&p, &h, &["e0.x > 0"], &[]));
        assert!(store.do_chores(&mut Syntactic));
        assert_eq!(store.len(), 0);
        assert_eq!(store.headers().count(), 0);
    }

    #[test]
    fn test_clear_up_existentials() {
        let p = program();
        let forall = hint(0);
        let exists = hint(1);
        let mut store = DistillerStore::new();
        store.push(record(&p, &forall, &["e0.x > 0"], &["e0.y == e1.id"]));
        store.push(record(&p, &exists, &["e0.w > 0"], &["e0.y == e1.id"]));
        store.push(record(&p, &exists, &["e0.w > 0"], &["e0.z == e1.id"]));
        store.do_chores(&mut Syntactic);
        assert_eq!(store.bucket(&forall.header()).len(), 1);
        insta::assert_snapshot!(
            store.bucket(&exists.header())[0].to_string(),
            @"∀e0: eReq ∃e1: eResp :: e0.w > 0 -> e0.z == e1.id"
        );
        assert_eq!(store.bucket(&exists.header()).len(), 1);
    }

    #[test]
    fn test_idempotence() {
        let p = program();
        let h = hint(0);
        let mut store = DistillerStore::new();
        for (g, f) in [
            (vec!["e0.x > 0"], vec!["e0.y > 0", "e0.z > 0"]),
            (vec!["e0.x > 0", "e0.w > 0"], vec!["e0.z > 0", "e0.a > 0"]),
            (vec!["e0.a > 0", "e0.b > 0"], vec!["e0.c > 0"]),
            (vec!["e0.a <= 0", "e0.b > 0"], vec!["e0.c > 0"]),
            (vec!["e0.w > 0"], vec!["e0.w > 0"]),
        ] {
            store.push(record(&p, &h, &g, &f));
        }
        store.do_chores(&mut Syntactic);
        let once = show(&store);
        assert!(!store.do_chores(&mut Syntactic));
        assert_eq!(show(&store), once);
    }

    #[test]
    fn test_update_mined_specs() {
        let p = program();
        let h = hint(0);
        let mut store = DistillerStore::new();
        let mut update = |store: &mut DistillerStore, g: &[&str], f: &[&str]| {
            store.update_mined_specs(&mut Syntactic, &h, preds(&p, &h, g), preds(&p, &h, f))
        };
        assert_eq!(update(&mut store, &["e0.x > 0"], &["e0.y > 0"]), Outcome::Added);
        assert_eq!(
            update(&mut store, &["e0.x > 0", "e0.w > 0"], &["e0.y > 0"]),
            Outcome::Dropped
        );
        assert_eq!(update(&mut store, &["e0.x > 0"], &["e0.z > 0"]), Outcome::Merged);
        assert_eq!(
            update(&mut store, &[], &["e0.y > 0", "e0.z > 0"]),
            Outcome::Replaced
        );
        insta::assert_snapshot!(show(&store), @"∀e0: eReq ∀e1: eResp :: e0.y > 0 ∧ e0.z > 0");
        assert_eq!(update(&mut store, &["e0.a > 0"], &["e0.c > 0"]), Outcome::Added);
        assert_eq!(update(&mut store, &["e0.b > 0"], &["e0.w > 0"]), Outcome::Added);
        // everything the candidate derives is already derived under weaker guards
        assert_eq!(
            update(&mut store, &["e0.a > 0", "e0.b > 0"], &["e0.c > 0", "e0.w > 0"]),
            Outcome::Subsumed
        );
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_ingest() {
        let p = program();
        let h = hint(0);
        let mut store = DistillerStore::new();
        let outcome = store
            .ingest(
                &mut Syntactic,
                &p,
                &h,
                &["e0.x > 0".to_string()],
                &["e0.y > 0".to_string(), "e0.nope > 0".to_string()],
            )
            .unwrap();
        assert_eq!(outcome, Outcome::Added);
        assert_eq!(store.frequency(&h.header(), "e0.y > 0"), 1);
        assert!(matches!(
            store.ingest(&mut Syntactic, &p, &h, &["e2.x > 0".to_string()], &[]),
            Err(DistillError::GuardParse { .. })
        ));
    }

    #[test]
    fn test_semantic_merge() {
        let p = program();
        let Ok(mut bridge) = BridgeConf::default().launch(&p) else {
            eprintln!("z3 not available, skipping test");
            return;
        };
        let h = hint(0);
        let mut store = DistillerStore::new();
        store.push(record(&p, &h, &["e0.x > 1"], &["e0.y > 0"]));
        store.push(record(&p, &h, &["e0.x >= 2"], &["e0.z > 0"]));
        // implied by the guard, dropped as a tautology
        store.push(record(&p, &h, &["e0.x > 5"], &["e0.x > 0"]));
        store.do_chores(&mut bridge);
        assert_eq!(store.len(), 1);
        let r = store.records().next().unwrap();
        assert_eq!(r.filters.len(), 2);
    }
}
