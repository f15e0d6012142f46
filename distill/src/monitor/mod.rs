// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Monitors for distilled invariants.
//!
//! A monitor keeps a history of every quantified event type. When an event
//! bound to a universal variable arrives, every combination of universal
//! positions involving it is checked: if the guards hold, a forall-only
//! invariant asserts its filters directly, and an existential one searches the
//! histories for witnesses. Combinations without a witness wait in `Pending`
//! and are re-tested whenever an event bound to an existential variable
//! arrives. The monitor is *hot* while `Pending` is non-empty and *cold*
//! otherwise; ending a run hot is a liveness violation.
//!
//! [`emit`] renders a monitor as a P specification machine and [`runtime`]
//! runs it directly over a recorded trace.

use itertools::Itertools;
use std::collections::BTreeMap;
use thiserror::Error;

use expr::program::Program;
use expr::semantics::EvalError;
use expr::syntax::{Expr, NUM_EXISTS_VAR};
use expr::types::Type;

use crate::hint::Hint;
use crate::rank::ranked;
use crate::store::{DistillerStore, Record};

pub mod emit;
pub mod runtime;

/// A monitor for one surviving invariant.
#[derive(Debug, Clone)]
pub struct MonitorDef {
    /// `{hint}_{counter}`
    pub name: String,
    /// The invariant as listed in the invariant file
    pub invariant: String,
    pub hint: Hint,
    pub guards: Vec<Expr>,
    pub filters: Vec<Expr>,
    /// Filters on the number of witnesses, over `_num_e_exists_`
    pub meta_filters: Vec<Expr>,
    pub config_fields: Vec<(String, Type)>,
    /// Payload types of the quantified and configuration events
    pub payloads: BTreeMap<String, Type>,
}

impl MonitorDef {
    /// Distinct quantified event types, in quantifier order.
    pub fn events(&self) -> Vec<String> {
        self.hint.events().iter().unique().cloned().collect()
    }

    pub fn payload(&self, event: &str) -> Type {
        self.payloads.get(event).cloned().unwrap_or_default()
    }
}

/// The monitor of `record`, numbered `counter`.
pub fn synthesize(program: &Program, record: &Record, counter: usize) -> MonitorDef {
    let hint = record.hint.clone();
    let (meta_filters, filters): (Vec<Expr>, Vec<Expr>) = record
        .filters
        .iter()
        .map(|(_, e)| e.clone())
        .partition(|e| e.free_vars().contains(NUM_EXISTS_VAR));
    let payloads = hint
        .events()
        .iter()
        .chain(hint.config_event.iter())
        .filter_map(|e| program.event(e))
        .map(|decl| (decl.name.clone(), decl.payload.clone()))
        .collect();
    MonitorDef {
        name: format!("{}_{counter}", hint.name),
        invariant: record.to_string(),
        guards: record.guards.iter().map(|(_, e)| e.clone()).collect(),
        filters,
        meta_filters,
        config_fields: hint.config_fields(program),
        payloads,
        hint,
    }
}

/// Monitors for every surviving invariant, best ranked first.
pub fn synthesize_all(program: &Program, store: &DistillerStore) -> Vec<MonitorDef> {
    ranked(store)
        .into_iter()
        .filter(|r| !r.filters.is_empty())
        .enumerate()
        .map(|(i, r)| synthesize(program, r, i))
        .collect()
}

/// A run of a monitor that violates its invariant.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MonitorError {
    #[error("{monitor}: event {index} ({event}) violates {invariant}")]
    Violation {
        monitor: String,
        event: String,
        index: usize,
        invariant: String,
    },
    #[error("{monitor}: run ended with {pending} obligation(s) of {invariant} unmet")]
    Liveness {
        monitor: String,
        pending: usize,
        invariant: String,
    },
    #[error("{monitor}: could not evaluate {invariant}: {err}")]
    Eval {
        monitor: String,
        invariant: String,
        #[source]
        err: EvalError,
    },
}
