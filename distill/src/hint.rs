// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Hints: points in the invariant search space.

use itertools::Itertools;
use std::fmt;
use std::hash::{Hash, Hasher};

use expr::program::{HintDecl, Program};
use expr::syntax::NUM_EXISTS_VAR;
use expr::types::Type;
use expr::{parse, Expr, ParseError, Scope};

use crate::config::DistillConfig;
use crate::error::DistillError;

/// A quantified event variable of a hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventVar {
    /// `e{order}`
    pub name: String,
    pub event: String,
    /// Argument slot of the variable
    pub order: usize,
    /// Universal (forall) or existential.
    pub universal: bool,
}

/// The partition key of candidate records: quantified event types in order,
/// how many of them are existential, and the configuration event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QuantifierHeader {
    pub events: Vec<String>,
    pub existentials: usize,
    pub config: Option<String>,
}

impl QuantifierHeader {
    /// Headers over the same event types and configuration, whatever their
    /// existential counts.
    pub fn same_events(&self, other: &QuantifierHeader) -> bool {
        self.events == other.events && self.config == other.config
    }
}

impl fmt::Display for QuantifierHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let universals = self.events.len() - self.existentials;
        let quantified = self
            .events
            .iter()
            .enumerate()
            .map(|(i, e)| format!("{}{e}", if i < universals { "∀" } else { "∃" }))
            .join(" ");
        write!(f, "{quantified}")?;
        if let Some(config) = &self.config {
            write!(f, " | {config}")?;
        }
        Ok(())
    }
}

/// Identifies a hint family: every (arity, guards, filters) combination of
/// one hint at one term depth.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FamilyKey {
    pub header: QuantifierHeader,
    pub term_depth: Option<usize>,
    pub guard_predicates: Vec<String>,
    pub filter_predicates: Vec<String>,
}

/// Identifies a single miner run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SearchKey {
    pub family: FamilyKey,
    pub arity: usize,
    pub num_guards: usize,
    pub num_filters: usize,
}

/// A point in the search space.
///
/// Equality (and hashing) only looks at the quantified event types, the
/// configuration event and the number of existentials: varying the term depth
/// or arity yields copies of the same logical hint.
#[derive(Debug, Clone)]
pub struct Hint {
    pub name: String,
    events: Vec<String>,
    existentials: usize,
    pub config_event: Option<String>,
    /// `None` until the search picks a depth.
    pub term_depth: Option<usize>,
    /// Number of quantified events a predicate combination may span.
    pub arity: usize,
    pub num_guards: usize,
    pub num_filters: usize,
    /// Fixed guard predicates, as text.
    pub guard_predicates: Vec<String>,
    /// Fixed filter predicates, as text.
    pub filter_predicates: Vec<String>,
    /// Run exactly as specified, without widening.
    pub exact: bool,
    /// Supplied by the operator rather than discovered.
    pub user: bool,
}

impl PartialEq for Hint {
    fn eq(&self, other: &Self) -> bool {
        self.events == other.events
            && self.config_event == other.config_event
            && self.existentials == other.existentials
    }
}

impl Eq for Hint {}

impl Hash for Hint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.events.hash(state);
        self.config_event.hash(state);
        self.existentials.hash(state);
    }
}

impl Hint {
    /// A hint over `events`, the last `existentials` of which are existential.
    pub fn new(
        name: &str,
        events: Vec<String>,
        existentials: usize,
        config_event: Option<String>,
    ) -> Result<Self, DistillError> {
        if events.is_empty() {
            return Err(DistillError::InvalidHint {
                hint: name.to_string(),
                msg: "no quantified events".to_string(),
            });
        }
        if existentials >= events.len() {
            return Err(DistillError::InvalidHint {
                hint: name.to_string(),
                msg: format!(
                    "{existentials} existentials leave no universal among {} events",
                    events.len()
                ),
            });
        }
        Ok(Self {
            name: name.to_string(),
            events,
            existentials,
            config_event,
            term_depth: None,
            arity: 1,
            num_guards: 0,
            num_filters: 1,
            guard_predicates: vec![],
            filter_predicates: vec![],
            exact: false,
            user: false,
        })
    }

    /// Build an operator-supplied hint, checking it against the program.
    pub fn from_decl(program: &Program, decl: &HintDecl) -> Result<Self, DistillError> {
        let invalid = |msg: String| DistillError::InvalidHint {
            hint: decl.name.clone(),
            msg,
        };
        for e in &decl.quantified {
            if program.event(e).is_none() {
                return Err(invalid(format!("undeclared event {e}")));
            }
        }
        if let Some(config) = &decl.config_event {
            match program.event(config) {
                None => return Err(invalid(format!("undeclared config event {config}"))),
                Some(e) if !matches!(e.payload, Type::Named(_)) => {
                    return Err(invalid(format!(
                        "config event {config} must carry a named tuple"
                    )))
                }
                Some(_) => {}
            }
        }
        let mut hint = Self::new(
            &decl.name,
            decl.quantified.clone(),
            decl.existentials,
            decl.config_event.clone(),
        )?;
        hint.guard_predicates = decl.guard_predicates.clone();
        hint.filter_predicates = decl.filter_predicates.clone();
        hint.term_depth = decl.term_depth;
        hint.exact = decl.exact;
        hint.user = true;
        Ok(hint)
    }

    /// Quantified event types, universals first.
    pub fn events(&self) -> &[String] {
        &self.events
    }

    pub fn existentials(&self) -> usize {
        self.existentials
    }

    pub fn vars(&self) -> Vec<EventVar> {
        let universals = self.events.len() - self.existentials;
        self.events
            .iter()
            .enumerate()
            .map(|(i, e)| EventVar {
                name: format!("e{i}"),
                event: e.clone(),
                order: i,
                universal: i < universals,
            })
            .collect()
    }

    pub fn forall_vars(&self) -> Vec<EventVar> {
        self.vars().into_iter().filter(|v| v.universal).collect()
    }

    pub fn exists_vars(&self) -> Vec<EventVar> {
        self.vars().into_iter().filter(|v| !v.universal).collect()
    }

    /// Distinct event types of the universal variables, in order.
    pub fn forall_events(&self) -> Vec<String> {
        self.forall_vars().into_iter().map(|v| v.event).unique().collect()
    }

    /// Distinct event types of the existential variables, in order.
    pub fn exists_events(&self) -> Vec<String> {
        self.exists_vars().into_iter().map(|v| v.event).unique().collect()
    }

    pub fn header(&self) -> QuantifierHeader {
        QuantifierHeader {
            events: self.events.clone(),
            existentials: self.existentials,
            config: self.config_event.clone(),
        }
    }

    pub fn family_key(&self) -> FamilyKey {
        FamilyKey {
            header: self.header(),
            term_depth: self.term_depth,
            guard_predicates: self.guard_predicates.clone(),
            filter_predicates: self.filter_predicates.clone(),
        }
    }

    pub fn search_key(&self) -> SearchKey {
        SearchKey {
            family: self.family_key(),
            arity: self.arity,
            num_guards: self.num_guards,
            num_filters: self.num_filters,
        }
    }

    /// Configuration fields, which are in scope as plain variables.
    pub fn config_fields(&self, program: &Program) -> Vec<(String, Type)> {
        let payload = self
            .config_event
            .as_ref()
            .and_then(|c| program.event(c))
            .map(|e| &e.payload);
        match payload {
            Some(Type::Named(fields)) => fields.clone(),
            _ => vec![],
        }
    }

    /// The names a predicate of this hint may mention.
    pub fn scope<'p>(&self, program: &'p Program) -> Scope<'p> {
        let mut scope = Scope::new(program);
        for v in self.vars() {
            scope = scope.with_event(&v.name, &v.event);
        }
        for (name, ty) in self.config_fields(program) {
            scope = scope.with_var(&name, ty);
        }
        if self.existentials > 0 {
            scope = scope.with_var(NUM_EXISTS_VAR, Type::Int);
        }
        scope
    }

    /// Parse a predicate of this hint.
    pub fn parse(&self, program: &Program, text: &str) -> Result<Expr, ParseError> {
        parse(text, &self.scope(program))
    }

    /// Start the arity/guards/filters enumeration over.
    pub fn reset_search(&mut self) {
        self.arity = 1;
        self.num_guards = 0;
        self.num_filters = 1;
    }

    /// Whether the current combination is still within bounds.
    pub fn has_next(&self, cfg: &DistillConfig, max_arity: usize) -> bool {
        self.arity <= max_arity
            && self.num_guards <= cfg.max_guards
            && (self.existentials == 0 || self.num_filters <= cfg.max_filters)
    }

    /// Advance to the next combination: filter count fastest (existential
    /// hints only), then guard count, then arity.
    pub fn next(&mut self, cfg: &DistillConfig, max_arity: usize) {
        if self.arity > max_arity {
            return;
        }
        if self.existentials > 0 && self.num_filters < cfg.max_filters {
            self.num_filters += 1;
            return;
        }
        self.num_filters = 1;
        if self.num_guards < cfg.max_guards {
            self.num_guards += 1;
            return;
        }
        self.num_guards = 0;
        self.arity += 1;
    }

    /// Render an invariant of this hint with display names for the
    /// quantified events.
    pub fn invariant_header(&self, guards: &str, filters: &str) -> String {
        let quantifiers = self
            .vars()
            .iter()
            .map(|v| {
                let q = if v.universal { "∀" } else { "∃" };
                format!("{q}{}: {}", v.name, v.event)
            })
            .join(" ");
        let config = match &self.config_event {
            Some(c) => format!("[{c}] "),
            None => String::new(),
        };
        if guards.is_empty() {
            format!("{config}{quantifiers} :: {filters}")
        } else {
            format!("{config}{quantifiers} :: {guards} -> {filters}")
        }
    }
}

impl fmt::Display for Hint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.header())?;
        if let Some(d) = self.term_depth {
            write!(f, " depth={d}")?;
        }
        write!(
            f,
            " arity={} guards={}",
            self.arity, self.num_guards
        )?;
        if self.existentials > 0 {
            write!(f, " filters={}", self.num_filters)?;
        }
        if self.exact {
            write!(f, " exact")?;
        }
        Ok(())
    }
}
