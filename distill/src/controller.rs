// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The hint search controller.
//!
//! For a hint, term depths are tried in increasing order. At each depth the
//! predicate/term definitions are generated; if they are the same as at the
//! previous depth the hint has converged and widening stops. Otherwise every
//! arity/guards/filters combination of the hint is handed to the miner and the
//! results are merged into the [`DistillerStore`].

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use expr::printer::conjunction;
use expr::program::Program;
use solver::hashmap::{HashMap, HashSet};

use crate::codegen::{self, Definitions};
use crate::config::DistillConfig;
use crate::error::DistillError;
use crate::explore;
use crate::files::{
    append_header, parse_results, read_header_index, write_record_to, HeaderRecord,
    InvariantLog, MinedCandidate,
};
use crate::hint::{FamilyKey, Hint, SearchKey};
use crate::miner::{self, MinerStatus};
use crate::oracle::Oracle;
use crate::store::DistillerStore;
use crate::traces::{trace_files, TraceIndex};

/// What generating definitions for a hint led to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileStatus {
    /// Definitions are written and the miner can run.
    Ready,
    /// Same number of terms and predicates as at the previous depth.
    Converged,
    /// No traces are indexed for the hint's events.
    NoTraces,
}

/// Session statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stats {
    /// Candidates reported by the miner
    pub mined: usize,
    /// Candidates for which the miner's pruning kept extra properties
    pub distilled: usize,
    /// Distinct invariants logged
    pub learned: usize,
    /// Invariants in the final listing
    pub recorded: usize,
    pub elapsed: Duration,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# invariants discovered: {}", self.mined)?;
        writeln!(f, "# invariants distilled: {}", self.distilled)?;
        writeln!(f, "# invariants after pruning: {}", self.recorded)?;
        write!(
            f,
            "time elapsed: {}",
            humantime::format_duration(miner::round(self.elapsed))
        )
    }
}

/// Drives the miner over hints and owns the store of mined candidates for one
/// session.
pub struct Driver<'a, O: Oracle> {
    program: &'a Program,
    cfg: &'a DistillConfig,
    oracle: O,
    store: DistillerStore,
    traces: Option<TraceIndex>,
    log: InvariantLog,
    /// Definitions of the hint compiled last
    defs: Option<Definitions>,
    /// Ids of the current hint's fixed guard and filter predicates
    fixed: (Vec<usize>, Vec<usize>),
    explored: HashSet<SearchKey>,
    searched: HashSet<FamilyKey>,
    /// (terms, predicates) generated at the last depth, by hint name
    /// Last compiled depth and (terms, predicates) counts per hint
    counts: HashMap<String, (usize, (usize, usize))>,
    /// Results stored for replay so far
    stored: usize,
    mined: usize,
    distilled: usize,
    start: Instant,
}

impl<'a, O: Oracle> Driver<'a, O> {
    pub fn new(
        program: &'a Program,
        cfg: &'a DistillConfig,
        oracle: O,
    ) -> Result<Self, DistillError> {
        let traces = match &cfg.trace_dir {
            Some(dir) => Some(TraceIndex::load(dir)?),
            None => None,
        };
        let stored = read_header_index(&cfg.header_index_file())?.len();
        Ok(Self {
            program,
            cfg,
            oracle,
            store: DistillerStore::new(),
            traces,
            log: InvariantLog::new(cfg.distilled_file(), cfg.stepback_file()),
            defs: None,
            fixed: (vec![], vec![]),
            explored: HashSet::default(),
            searched: HashSet::default(),
            counts: HashMap::default(),
            stored,
            mined: 0,
            distilled: 0,
            start: Instant::now(),
        })
    }

    pub fn store(&self) -> &DistillerStore {
        &self.store
    }

    pub fn into_store(self) -> DistillerStore {
        self.store
    }

    fn output_dir(&self) -> Result<(), DistillError> {
        let dir = &self.cfg.output_dir;
        fs::create_dir_all(dir).map_err(DistillError::io(dir))
    }

    /// Start a fresh session: move the invariant logs of the previous one
    /// aside and forget its replay state.
    pub fn start_session(&mut self) -> Result<(), DistillError> {
        self.output_dir()?;
        self.log.rotate()?;
        let index = self.cfg.header_index_file();
        if index.exists() {
            fs::remove_file(&index).map_err(DistillError::io(&index))?;
        }
        let results = self.cfg.stored_results_dir();
        if results.exists() {
            fs::remove_dir_all(&results).map_err(DistillError::io(&results))?;
        }
        self.stored = 0;
        self.store.clear();
        Ok(())
    }

    /// Generate and write the predicate/term definitions of `hint` at its
    /// term depth (0 if unset).
    pub fn compile_hint(&mut self, hint: &Hint) -> Result<CompileStatus, DistillError> {
        if let Some(index) = &self.traces {
            if index.folder_for(hint).is_none() {
                log::warn!(
                    "no trace indexed for this event combination: {}, skipping",
                    hint.events().join(", ")
                );
                return Ok(CompileStatus::NoTraces);
            }
        }
        let depth = hint.term_depth.unwrap_or(0);
        let defs = codegen::generate(self.program, hint, depth);
        let counts = (defs.terms.len(), defs.predicates.len());
        // converged when a deeper compilation adds nothing
        let previous = self.counts.insert(hint.name.clone(), (depth, counts));
        if matches!(previous, Some((d, c)) if d < depth && c == counts) {
            log::info!("term depth limit reached, done for {}", hint.name);
            self.defs = None;
            return Ok(CompileStatus::Converged);
        }
        self.output_dir()?;
        defs.write(&self.cfg.predicates_file(), &self.cfg.terms_file())?;
        let ids = |preds: &[String]| {
            preds
                .iter()
                .map(|p| defs.predicate_id(self.program, p))
                .collect::<Result<Vec<_>, _>>()
        };
        self.fixed = (ids(&hint.guard_predicates)?, ids(&hint.filter_predicates)?);
        log::info!(
            "generated {} terms and {} predicates for {} at depth {depth}",
            counts.0,
            counts.1,
            hint.name
        );
        self.defs = Some(defs);
        Ok(CompileStatus::Ready)
    }

    /// Run the miner once for the current combination of `hint`, unless that
    /// combination was explored already.
    pub fn run_spec_miner(&mut self, hint: &Hint) -> Result<(), DistillError> {
        let mut hint = hint.clone();
        let depth = *hint.term_depth.get_or_insert(0);
        let compiled = self
            .defs
            .as_ref()
            .is_some_and(|d| d.hint == hint && d.hint.name == hint.name && d.depth == depth);
        if !compiled && self.compile_hint(&hint)? != CompileStatus::Ready {
            return Ok(());
        }
        if !self.explored.insert(hint.search_key()) {
            log::info!("search space already explored: {}, skipping", hint.name);
            return Ok(());
        }
        log::info!("running {hint}");
        self.invoke(&hint)
    }

    /// Widen `hint` over term depths and, at each depth, over all its
    /// arity/guards/filters combinations.
    pub fn parameter_search(&mut self, hint: &Hint) -> Result<(), DistillError> {
        if hint.exact {
            return self.run_spec_miner(hint);
        }
        let family = hint.family_key();
        if self.searched.contains(&family) {
            log::info!("search space already explored: {}, skipping", hint.name);
            return Ok(());
        }
        let depths = match hint.term_depth {
            Some(d) => d..=d,
            None => 0..=self.cfg.term_depth,
        };
        for depth in depths {
            let mut h = hint.clone();
            h.term_depth = Some(depth);
            h.reset_search();
            if self.compile_hint(&h)? != CompileStatus::Ready {
                break;
            }
            let max_arity = self.defs.as_ref().map_or(0, |d| d.max_arity());
            while h.has_next(self.cfg, max_arity) {
                self.run_spec_miner(&h)?;
                h.next(self.cfg, max_arity);
            }
        }
        self.searched.insert(family);
        Ok(())
    }

    /// Search every hint the program's control flow suggests, all of them at
    /// one term depth before moving on to the next.
    pub fn auto_explore(&mut self) -> Result<(), DistillError> {
        let hints = explore::propose_hints(self.program);
        for depth in 0..=self.cfg.term_depth {
            for hint in &hints {
                let mut h = hint.clone();
                h.term_depth = Some(depth);
                self.parameter_search(&h)?;
            }
        }
        Ok(())
    }

    fn traces_for(&self, hint: &Hint) -> Result<Option<Vec<PathBuf>>, DistillError> {
        let Some(index) = &self.traces else {
            log::warn!("no trace folder given, skipping {}", hint.name);
            return Ok(None);
        };
        match index.folder_for(hint) {
            Some(folder) => Ok(Some(trace_files(&folder)?)),
            None => {
                log::warn!(
                    "no trace indexed for this event combination: {}, skipping",
                    hint.events().join(", ")
                );
                Ok(None)
            }
        }
    }

    /// One miner run for the compiled hint, followed by aggregation of its
    /// results. Miner failures skip the run.
    fn invoke(&mut self, hint: &Hint) -> Result<(), DistillError> {
        let Some(traces) = self.traces_for(hint)? else {
            return Ok(());
        };
        let results = self.cfg.results_file();
        if results.exists() {
            fs::remove_file(&results).map_err(DistillError::io(&results))?;
        }
        let mining = self.cfg.mining_dir();
        fs::create_dir_all(&mining).map_err(DistillError::io(&mining))?;
        let (guard_ids, filter_ids) = &self.fixed;
        let args = miner::miner_args(self.cfg, hint, guard_ids, filter_ids, &traces);
        match miner::run(&self.cfg.miner, &args) {
            Ok(MinerStatus::Finished) => {}
            Ok(MinerStatus::TimedOut) => {
                log::warn!("miner timed out on {}, skipping", hint.name);
                return Ok(());
            }
            Err(err) => {
                log::warn!("{err}, skipping {}", hint.name);
                return Ok(());
            }
        }
        if !results.exists() {
            log::warn!("miner left no results for {}, skipping", hint.name);
            return Ok(());
        }
        self.prune_and_aggregate(hint, &results)?;
        self.store.do_chores(&mut self.oracle);
        let recorded = write_record_to(&self.store, &self.cfg.running_file())?;
        log::info!("currently mined: {} invariant(s)", self.log.learned());
        log::info!("currently recorded: {recorded} invariant(s)");
        Ok(())
    }

    /// Store a result file for replay and merge its candidates.
    pub fn prune_and_aggregate(
        &mut self,
        hint: &Hint,
        results: &Path,
    ) -> Result<(), DistillError> {
        let candidates = parse_results(results)?;
        let stored = self.cfg.stored_results_file(self.stored);
        let dir = self.cfg.stored_results_dir();
        fs::create_dir_all(&dir).map_err(DistillError::io(&dir))?;
        fs::copy(results, &stored).map_err(DistillError::io(&stored))?;
        append_header(&self.cfg.header_index_file(), &HeaderRecord::from_hint(hint))?;
        self.stored += 1;
        self.aggregate(hint, candidates)
    }

    /// Properties that parse under the hint are kept as extra filters; the
    /// rest are only logged.
    fn aggregate(
        &mut self,
        hint: &Hint,
        candidates: Vec<MinedCandidate>,
    ) -> Result<(), DistillError> {
        self.mined += candidates.len();
        for c in candidates {
            let (keep, stepback): (Vec<String>, Vec<String>) = c
                .properties
                .iter()
                .cloned()
                .partition(|p| hint.parse(self.program, p).is_ok());
            let filters: Vec<String> = c.filters.iter().chain(keep.iter()).cloned().collect();
            let outcome = self
                .store
                .ingest(&mut self.oracle, self.program, hint, &c.guards, &filters)?;
            log::debug!("{outcome:?}: {}", conjunction(&filters));
            if !keep.is_empty() {
                self.distilled += 1;
            }
            self.log.write_invs(
                hint,
                &conjunction(&c.guards),
                &conjunction(&c.filters),
                &keep,
                &stepback,
            )?;
        }
        Ok(())
    }

    /// Rebuild the store from the header index and the stored results of a
    /// previous session, without running the miner. Returns the number of
    /// hints replayed.
    pub fn replay(&mut self) -> Result<usize, DistillError> {
        self.output_dir()?;
        self.log.rotate()?;
        let records = read_header_index(&self.cfg.header_index_file())?;
        for (i, record) in records.iter().enumerate() {
            let hint = record.to_hint(&format!("replay_{i}"))?;
            let candidates = parse_results(&self.cfg.stored_results_file(i))?;
            self.aggregate(&hint, candidates)?;
            self.store.do_chores(&mut self.oracle);
        }
        log::info!("replayed {} hints", records.len());
        Ok(records.len())
    }

    /// Write the final invariant listing and report statistics.
    pub fn finish(&mut self) -> Result<Stats, DistillError> {
        self.store.do_chores(&mut self.oracle);
        self.output_dir()?;
        let path = self.cfg.invariants_file();
        let recorded = write_record_to(&self.store, &path)?;
        let stats = Stats {
            mined: self.mined,
            distilled: self.distilled,
            learned: self.log.learned(),
            recorded,
            elapsed: self.start.elapsed(),
        };
        log::info!("writing pruned invariants to {}", path.display());
        for line in stats.to_string().lines() {
            log::info!("{line}");
        }
        Ok(stats)
    }
}
