// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration of a distillation session and the layout of its output
//! directory.

use std::path::PathBuf;

use crate::miner::MinerConf;

/// Bounds of the hint search and where to put what it produces.
#[derive(Debug, Clone)]
pub struct DistillConfig {
    /// Stem of the predicate/term definition files handed to the miner.
    pub project: String,
    /// Largest term depth explored when a hint does not fix one.
    pub term_depth: usize,
    /// Largest number of guard predicates per candidate.
    pub max_guards: usize,
    /// Largest number of filter predicates per existential candidate.
    pub max_filters: usize,
    /// Pruning level passed through to the miner.
    pub pruning_level: usize,
    pub output_dir: PathBuf,
    /// Indexed trace folder, required to run the miner.
    pub trace_dir: Option<PathBuf>,
    pub verbose: bool,
    pub miner: MinerConf,
}

impl Default for DistillConfig {
    fn default() -> Self {
        Self {
            project: "project".to_string(),
            term_depth: 1,
            max_guards: 2,
            max_filters: 2,
            pruning_level: 3,
            output_dir: PathBuf::from("distill-outputs"),
            trace_dir: None,
            verbose: false,
            miner: MinerConf::default(),
        }
    }
}

impl DistillConfig {
    pub fn predicates_file(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}.predicates.json", self.project))
    }

    pub fn terms_file(&self) -> PathBuf {
        self.output_dir.join(format!("{}.terms.json", self.project))
    }

    /// Directory the miner writes its results to.
    pub fn mining_dir(&self) -> PathBuf {
        self.output_dir.join("mining")
    }

    /// The result file of the last miner run.
    pub fn results_file(&self) -> PathBuf {
        self.mining_dir().join("results.txt")
    }

    /// One record per explored hint, in exploration order.
    pub fn header_index_file(&self) -> PathBuf {
        self.output_dir.join("headers.txt")
    }

    /// Copies of every miner result of the session, for replay.
    pub fn stored_results_dir(&self) -> PathBuf {
        self.output_dir.join("results")
    }

    /// The stored result file of the `i`-th explored hint.
    pub fn stored_results_file(&self, i: usize) -> PathBuf {
        self.stored_results_dir().join(format!("{i}.txt"))
    }

    pub fn distilled_file(&self) -> PathBuf {
        self.output_dir.join("distilled_invs.txt")
    }

    pub fn stepback_file(&self) -> PathBuf {
        self.output_dir.join("stepback_invs.txt")
    }

    /// Invariants recorded so far, rewritten after every miner run.
    pub fn running_file(&self) -> PathBuf {
        self.output_dir.join("inv_running.txt")
    }

    /// The final invariant listing.
    pub fn invariants_file(&self) -> PathBuf {
        self.output_dir.join("invariants.txt")
    }

    /// Where synthesized monitors are written.
    pub fn monitors_file(&self) -> PathBuf {
        self.output_dir.join("monitors.p")
    }
}
